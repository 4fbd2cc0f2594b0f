mod decision;
mod errors;
mod invoker;
mod parser;
mod reflection;
mod registry;
mod runner;


pub use decision::Decision;
pub use errors::AgentError;
pub use registry::ToolRegistry;
pub use runner::{Agent, AgentOptions, TurnOutcome};
