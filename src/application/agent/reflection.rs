use tracing::debug;

use crate::domain::types::ChatMessage;
use crate::infrastructure::model::{ModelError, ModelProvider, ModelRequest};

const REVIEW_PROMPT: &str =
    "Check for mistakes or missing tool calls. If fine, reply 'looks good'; else give corrected answer.";
const APPROVAL_REPLY: &str = "looks good";

/// Single fixed-depth review pass over a candidate answer, run at zero
/// temperature. An approving reply keeps the candidate; anything else
/// replaces it verbatim.
pub(crate) async fn reflect<P: ModelProvider>(
    provider: &P,
    model: &str,
    candidate: String,
) -> Result<String, ModelError> {
    let request = ModelRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(REVIEW_PROMPT),
            ChatMessage::user(candidate.clone()),
        ],
        temperature: 0.0,
    };
    let review = provider.chat(request).await?.message.content;

    if review.trim().eq_ignore_ascii_case(APPROVAL_REPLY) {
        debug!("Reflection approved the candidate answer");
        Ok(candidate)
    } else {
        debug!("Reflection replaced the candidate answer");
        Ok(review)
    }
}
