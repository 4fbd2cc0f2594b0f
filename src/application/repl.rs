use thiserror::Error;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::application::agent::{Agent, AgentError, TurnOutcome};
use crate::domain::types::ChatMessage;
use crate::infrastructure::model::ModelProvider;

#[derive(Debug, Error)]
pub enum ReplError {
    #[error("console I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Interactive console loop. Owns the conversation history for the life of
/// the process; one user turn fully completes before the next prompt.
///
/// Returns `Ok(())` on user-initiated exit or EOF. A fatal agent error
/// (model backend or remote tool call) is returned to the caller, which is
/// responsible for releasing the tool session.
pub async fn run<P: ModelProvider>(
    agent: &Agent<P>,
    mut history: Vec<ChatMessage>,
) -> Result<(), ReplError> {
    let stdin = BufReader::new(io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = io::stdout();

    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() || is_exit_command(input) {
            info!("User ended the session");
            break;
        }

        history.push(ChatMessage::user(input));

        match agent.run_turn(&mut history).await {
            Ok(TurnOutcome::Answered(answer)) => {
                stdout
                    .write_all(format!("Agent: {answer}\n").as_bytes())
                    .await?;
                stdout.flush().await?;
            }
            Ok(TurnOutcome::CapExhausted) => {}
            Err(err) if err.is_recoverable() => {
                debug!(%err, "Turn aborted; awaiting next input");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

fn is_exit_command(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_keywords_are_case_insensitive() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("QUIT"));
        assert!(is_exit_command("Quit"));
        assert!(!is_exit_command("quit please"));
        assert!(!is_exit_command("continue"));
    }
}
