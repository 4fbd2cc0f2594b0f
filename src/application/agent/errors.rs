use crate::application::tooling::ToolInvokeError;
use crate::infrastructure::model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("tool '{tool}' invocation failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: ToolInvokeError,
    },
    #[error("model produced no parsable decision: {0}")]
    MalformedDecision(String),
}

impl AgentError {
    /// Malformed decisions abort only the current turn; everything else is
    /// fatal for the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AgentError::MalformedDecision(_))
    }
}
