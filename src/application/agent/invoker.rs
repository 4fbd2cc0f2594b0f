use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::registry::ToolRegistry;
use crate::application::tooling::{ToolInvokeError, ToolSession};

/// Dispatches invoke decisions against the registry and the remote session,
/// returning the observation text to append to the conversation.
pub(crate) struct ToolInvoker {
    registry: ToolRegistry,
    session: Arc<dyn ToolSession>,
}

impl ToolInvoker {
    pub fn new(registry: ToolRegistry, session: Arc<dyn ToolSession>) -> Self {
        Self { registry, session }
    }

    /// An unregistered name yields a synthetic observation without touching
    /// the session. Remote failures are not caught here.
    pub async fn invoke(
        &self,
        tool: &str,
        args: Map<String, Value>,
    ) -> Result<String, ToolInvokeError> {
        if !self.registry.contains(tool) {
            debug!(tool, "decision named a tool absent from the registry");
            return Ok(format!("(unknown tool {tool})"));
        }

        let result = self.session.call_tool(tool, Value::Object(args)).await?;
        info!(tool, "Tool executed");
        Ok(format!("[tool:{tool}] {}", extract_payload(&result)))
    }
}

/// First text content block of the response, or a serialized dump of the
/// whole response when no text is present.
fn extract_payload(result: &Value) -> String {
    if let Some(blocks) = result.get("content").and_then(Value::as_array) {
        for block in blocks {
            let is_text = block
                .get("type")
                .and_then(Value::as_str)
                .map(|kind| kind.eq_ignore_ascii_case("text"))
                .unwrap_or(false);
            if is_text {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        return trimmed.to_string();
                    }
                }
            }
        }
    }

    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_first_text_content_block() {
        let result = json!({
            "content": [
                { "type": "image", "data": "..." },
                { "type": "text", "text": "  21.5 degrees, light wind  " },
                { "type": "text", "text": "second block" }
            ]
        });
        assert_eq!(extract_payload(&result), "21.5 degrees, light wind");
    }

    #[test]
    fn falls_back_to_serialized_response() {
        let result = json!({ "structuredContent": { "joke": "no content array" } });
        assert_eq!(
            extract_payload(&result),
            r#"{"structuredContent":{"joke":"no content array"}}"#
        );
    }

    #[test]
    fn empty_text_blocks_do_not_count_as_payload() {
        let result = json!({ "content": [ { "type": "text", "text": "   " } ] });
        // serde_json orders object keys alphabetically
        assert_eq!(
            extract_payload(&result),
            r#"{"content":[{"text":"   ","type":"text"}]}"#
        );
    }
}
