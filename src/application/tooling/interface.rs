use async_trait::async_trait;
use serde_json::Value;

use super::error::ToolInvokeError;

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
}

#[async_trait]
pub trait ToolSession: Send + Sync {
    async fn list_tools(&self) -> Vec<ToolDescriptor>;

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, ToolInvokeError>;
}
