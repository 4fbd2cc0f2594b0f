use std::sync::Arc;

use tracing::{debug, info, warn};

use super::decision::Decision;
use super::errors::AgentError;
use super::invoker::ToolInvoker;
use super::parser::parse_decision;
use super::reflection::reflect;
use super::registry::ToolRegistry;
use crate::application::tooling::ToolSession;
use crate::domain::types::ChatMessage;
use crate::infrastructure::model::{ModelError, ModelProvider, ModelRequest};

const DEFAULT_MAX_TOOL_STEPS: usize = 4;
const REPAIR_PROMPT: &str = "Return ONLY valid JSON.";

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tool_steps: usize,
}

impl AgentOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.2,
            max_tool_steps: DEFAULT_MAX_TOOL_STEPS,
        }
    }
}

/// Result of one user turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Reflected final answer, already appended to history.
    Answered(String),
    /// The dispatch cap was reached before the model produced an answer;
    /// nothing is printed for this turn.
    CapExhausted,
}

/// The per-turn decision/dispatch loop. Holds the model handle and the
/// tool invoker; the conversation history is owned by the caller and
/// threaded through each turn.
pub struct Agent<P: ModelProvider> {
    provider: Arc<P>,
    invoker: ToolInvoker,
    options: AgentOptions,
}

impl<P: ModelProvider> Agent<P> {
    pub fn new(
        provider: Arc<P>,
        session: Arc<dyn ToolSession>,
        registry: ToolRegistry,
        options: AgentOptions,
    ) -> Self {
        Self {
            provider,
            invoker: ToolInvoker::new(registry, session),
            options,
        }
    }

    /// Runs one user turn to completion. Expects the user message to be the
    /// last entry of `history`; appends tool observations and the final
    /// answer as assistant messages.
    pub async fn run_turn(
        &self,
        history: &mut Vec<ChatMessage>,
    ) -> Result<TurnOutcome, AgentError> {
        for step in 0..self.options.max_tool_steps {
            debug!(step, "Requesting decision from model");
            match self.decide(history).await? {
                Decision::Final { answer } => {
                    info!("Model produced a final answer; running reflection");
                    let answer =
                        reflect(self.provider.as_ref(), &self.options.model, answer).await?;
                    history.push(ChatMessage::assistant(answer.clone()));
                    return Ok(TurnOutcome::Answered(answer));
                }
                Decision::Invoke { tool, args } => {
                    info!(tool = %tool, "Model requested tool invocation");
                    let observation = self
                        .invoker
                        .invoke(&tool, args)
                        .await
                        .map_err(|source| AgentError::Tool {
                            tool: tool.clone(),
                            source,
                        })?;
                    history.push(ChatMessage::assistant(observation));
                }
            }
        }

        warn!(
            cap = self.options.max_tool_steps,
            "Turn ended without a final answer; tool dispatch cap reached"
        );
        Ok(TurnOutcome::CapExhausted)
    }

    async fn decide(&self, history: &[ChatMessage]) -> Result<Decision, AgentError> {
        let response = self
            .provider
            .chat(ModelRequest {
                model: self.options.model.clone(),
                messages: history.to_vec(),
                temperature: self.options.temperature,
            })
            .await?;
        let raw = response.message.content;

        match parse_decision(&raw) {
            Ok(decision) => Ok(decision),
            Err(err) => {
                debug!(%err, output = raw.as_str(), "Model output did not parse as a decision; requesting repair");
                let repaired = self.repair(&raw).await?;
                parse_decision(&repaired).map_err(|err| {
                    debug!(%err, output = repaired.as_str(), "Repair attempt also failed to parse");
                    AgentError::MalformedDecision(err.to_string())
                })
            }
        }
    }

    /// Exactly one repair round-trip: the drifted output is sent back with a
    /// JSON-only instruction at zero temperature.
    async fn repair(&self, raw: &str) -> Result<String, ModelError> {
        let request = ModelRequest {
            model: self.options.model.clone(),
            messages: vec![ChatMessage::system(REPAIR_PROMPT), ChatMessage::user(raw)],
            temperature: 0.0,
        };
        Ok(self.provider.chat(request).await?.message.content)
    }
}
