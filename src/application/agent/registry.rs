use std::collections::HashMap;

use crate::application::tooling::ToolDescriptor;

/// Tool catalogue discovered from the remote session at bootstrap.
/// Immutable for the session lifetime.
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        let index = tools
            .iter()
            .enumerate()
            .map(|(position, tool)| (tool.name.clone(), position))
            .collect();
        Self { tools, index }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|position| &self.tools[*position])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Composes the session system prompt: the decision output contract plus
    /// an enumeration of the discovered tools. An extra instruction from the
    /// configuration is appended at the end when present.
    pub fn system_prompt(&self, extra_instruction: Option<&str>) -> String {
        let mut lines = vec![
            "You are a helpful assistant with access to remote tools.".to_string(),
            "Every response must be a single JSON object without commentary or code fences."
                .to_string(),
            "To invoke a tool, output ONLY: {\"action\":\"tool_name\",\"args\":{...}}.".to_string(),
            "When you are ready to answer, output ONLY: {\"action\":\"final\",\"answer\":\"...\"}."
                .to_string(),
            "When a request matches a tool, always call the tool instead of answering from your own knowledge."
                .to_string(),
        ];

        if self.tools.is_empty() {
            lines.push("No tools are currently available.".to_string());
        } else {
            lines.push("Available tools:".to_string());
            for tool in &self.tools {
                lines.push(describe(tool));
            }
        }

        if let Some(extra) = extra_instruction {
            let extra = extra.trim();
            if !extra.is_empty() {
                lines.push(extra.to_string());
            }
        }

        lines.join("\n")
    }
}

fn describe(tool: &ToolDescriptor) -> String {
    let mut line = format!("- {}", tool.name);
    if let Some(description) = &tool.description {
        line.push_str(&format!(": {description}"));
    }
    if let Some(schema) = &tool.input_schema {
        let compact = serde_json::to_string(schema).unwrap_or_default();
        line.push_str(&format!(" Input schema: {compact}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn descriptor(name: &str, description: Option<&str>, schema: Option<Value>) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: description.map(String::from),
            input_schema: schema,
        }
    }

    #[test]
    fn lookup_is_exact_by_name() {
        let registry = ToolRegistry::new(vec![
            descriptor("get_weather", Some("Current weather."), None),
            descriptor("random_joke", None, None),
        ]);
        assert!(registry.contains("get_weather"));
        assert!(!registry.contains("GET_WEATHER"));
        assert!(!registry.contains("dance_party"));
        assert_eq!(registry.names(), vec!["get_weather", "random_joke"]);
    }

    #[test]
    fn system_prompt_states_contract_and_tools() {
        let registry = ToolRegistry::new(vec![descriptor(
            "get_weather",
            Some("Current weather at coordinates."),
            Some(json!({"type": "object"})),
        )]);
        let prompt = registry.system_prompt(None);
        assert!(prompt.contains(r#"{"action":"tool_name","args":{...}}"#));
        assert!(prompt.contains(r#"{"action":"final","answer":"..."}"#));
        assert!(prompt.contains("- get_weather: Current weather at coordinates."));
        assert!(prompt.contains(r#"{"type":"object"}"#));
    }

    #[test]
    fn system_prompt_mentions_missing_tools_and_extra_instruction() {
        let registry = ToolRegistry::new(Vec::new());
        let prompt = registry.system_prompt(Some("Answer in one sentence."));
        assert!(registry.is_empty());
        assert!(prompt.contains("No tools are currently available."));
        assert!(prompt.ends_with("Answer in one sentence."));
    }
}
