mod error;
mod interface;
mod process;

pub use error::ToolInvokeError;
pub use interface::{ToolDescriptor, ToolSession};
pub use process::McpSession;
