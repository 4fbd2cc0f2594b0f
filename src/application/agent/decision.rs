use serde_json::{Map, Value};

/// Structured outcome of one model turn: either a tool invocation request
/// or the final answer for the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Invoke {
        tool: String,
        args: Map<String, Value>,
    },
    Final {
        answer: String,
    },
}
