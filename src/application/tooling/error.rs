use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolInvokeError {
    #[error("failed to spawn tool host '{host}': {source}")]
    Spawn {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("tool host '{host}' transport error: {message}")]
    Transport { host: String, message: String },
    #[error("tool host '{host}' returned invalid JSON: {source}")]
    InvalidJson {
        host: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("tool host '{host}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        host: String,
        code: i64,
        message: String,
    },
    #[error("tool host '{host}' terminated unexpectedly")]
    Terminated { host: String },
    #[error("tool host '{host}' request cancelled")]
    Cancelled { host: String },
}
