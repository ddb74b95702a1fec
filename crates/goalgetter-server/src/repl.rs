//! Interactive terminal session against the orchestrator.

use goalgetter_core::core_types::ThreadKey;
use goalgetter_core::diagnostics::MemoryStatus;
use goalgetter_core::orchestrator::TurnOrchestrator;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const MEMORY_COMMAND: &str = "check memory";

pub fn format_status(status: &MemoryStatus) -> String {
    let last_activity = status
        .last_activity
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "Thread: {}\nHas memory: {}\nMessages: {}\nCheckpoints: {}\nLast activity: {}\nStorage: {}",
        status.thread_id,
        status.has_memory,
        status.message_count,
        status.checkpoint_count,
        last_activity,
        status.storage.as_str()
    )
}

/// Reads lines from `input` until EOF or `exit`/`quit`, running each one as a
/// turn for `user_id` and writing replies to `output`.
pub async fn run_session<R, W>(
    orchestrator: &TurnOrchestrator,
    user_id: &str,
    input: R,
    output: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let thread_key = ThreadKey::for_user(user_id)?;
    output
        .write_all(
            format!(
                "Goalgetter chat for user {} (thread {}). Type '{}', or 'exit' to leave.\n",
                user_id, thread_key, MEMORY_COMMAND
            )
            .as_bytes(),
        )
        .await?;

    let mut lines = input.lines();
    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if line.eq_ignore_ascii_case(MEMORY_COMMAND) {
            let text = match orchestrator.memory_status(&thread_key).await {
                Ok(status) => format_status(&status),
                Err(e) => format!("Memory check failed: {}", e),
            };
            output.write_all(format!("{}\n", text).as_bytes()).await?;
            continue;
        }

        let outcome = orchestrator.chat(user_id, line).await?;
        log::debug!(
            "Turn finished: {} messages, {} forwarded, tier {:?}",
            outcome.diagnostics.message_count,
            outcome.diagnostics.forwarded_count,
            outcome.diagnostics.trim_tier
        );
        output
            .write_all(format!("{}\n", outcome.reply).as_bytes())
            .await?;
    }

    output.write_all(b"Goodbye!\n").await?;
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use goalgetter_core::errors::AgentError;
    use goalgetter_core::memory::InMemoryCheckpointStore;
    use goalgetter_core::reasoning::{ReasoningRequest, ReasoningStep};
    use std::io::Cursor;
    use std::sync::Arc;

    struct Upper;

    #[async_trait]
    impl ReasoningStep for Upper {
        async fn invoke(&self, request: &ReasoningRequest) -> Result<String, AgentError> {
            Ok(request.message.to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_session_runs_turns_and_reports_memory() {
        let orchestrator =
            TurnOrchestrator::new(Arc::new(InMemoryCheckpointStore::new()), Arc::new(Upper));
        let input = Cursor::new("hello\n\ncheck memory\nquit\nnever sent\n");
        let mut output = Vec::new();

        run_session(&orchestrator, "123", input, &mut output)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("HELLO\n"));
        assert!(text.contains("Thread: user_123"));
        assert!(text.contains("Messages: 2"));
        assert!(text.contains("Checkpoints: 1"));
        assert!(!text.contains("NEVER SENT"));
        assert!(text.ends_with("Goodbye!\n"));
    }

    #[tokio::test]
    async fn test_session_ends_on_eof() {
        let orchestrator =
            TurnOrchestrator::new(Arc::new(InMemoryCheckpointStore::new()), Arc::new(Upper));
        let mut output = Vec::new();
        run_session(&orchestrator, "9", Cursor::new(""), &mut output)
            .await
            .unwrap();
        assert!(String::from_utf8(output).unwrap().ends_with("Goodbye!\n"));
    }
}
