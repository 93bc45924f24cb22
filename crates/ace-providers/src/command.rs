//! An agent executor that shells out to a program.
//!
//! The request goes to the program's stdin. Execution context travels in
//! environment variables:
//!
//! - `ACE_TRACE_ID`: id of the trace being captured
//! - `ACE_PLAYBOOK_CONTEXT`: rendered playbook
//! - `ACE_PRIORITY_CONTEXT`: caller-supplied priority context, if any
//!
//! Stdout is read as an `AgentResponse` JSON object when it is one, as any
//! other JSON value otherwise, and as plain text when it is not JSON.

use std::{
    io::{self, Write},
    path::PathBuf,
    process::{Command, Stdio},
    thread,
};

use tracing::debug;

use ace_contracts::error::{AceError, AceResult};
use ace_core::traits::{AgentExecutor, AgentResponse, ExecutionOptions};

const CAPABILITY: &str = "agent";
const STDERR_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct CommandAgentExecutor {
    program: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
}

impl CommandAgentExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    fn failure(&self, reason: impl std::fmt::Display) -> AceError {
        AceError::Capability {
            capability: CAPABILITY.to_string(),
            reason: format!("{}: {reason}", self.program),
        }
    }
}

/// Interpret a program's stdout as an agent response.
pub fn parse_agent_output(stdout: &str) -> AgentResponse {
    let trimmed = stdout.trim();
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) if value.get("output").is_some() => serde_json::from_value::<AgentResponse>(value.clone())
            .unwrap_or_else(|_| AgentResponse::from_output(value)),
        Ok(value) => AgentResponse::from_output(value),
        Err(_) => AgentResponse::from_output(serde_json::Value::String(trimmed.to_string())),
    }
}

impl AgentExecutor for CommandAgentExecutor {
    fn send(&self, request: &str, options: &ExecutionOptions) -> AceResult<AgentResponse> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("ACE_PLAYBOOK_CONTEXT", &options.playbook_context);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        if let Some(trace_id) = &options.trace_id {
            command.env("ACE_TRACE_ID", trace_id.as_str());
        }
        if let Some(priority) = &options.priority_context {
            command.env("ACE_PRIORITY_CONTEXT", priority);
        }

        let mut child = command.spawn().map_err(|e| self.failure(format!("failed to start: {e}")))?;
        // Stdin is fed from its own thread while stdout and stderr drain.
        let writer = child.stdin.take().map(|mut stdin| {
            let request = request.to_string();
            thread::spawn(move || stdin.write_all(request.as_bytes()))
        });
        let output = child
            .wait_with_output()
            .map_err(|e| self.failure(format!("failed to collect output: {e}")))?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // The program exited without reading its input.
                Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!(program = %self.program, "agent closed stdin early");
                }
                Ok(Err(e)) => return Err(self.failure(format!("failed to write request: {e}"))),
                Err(_) => return Err(self.failure("request writer panicked")),
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(STDERR_CHARS).collect();
            return Err(self.failure(format!("exited with {}: {excerpt}", output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(program = %self.program, bytes = output.stdout.len(), "agent process finished");
        Ok(parse_agent_output(&stdout))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use ace_contracts::{agent::TraceId, error::ErrorKind};

    use super::*;

    // ── Output parsing ────────────────────────────────────────────────────────

    #[test]
    fn structured_output_keeps_observations() {
        let response = parse_agent_output(
            r#"{"output":{"files":2},"reasoning":["read schema"],"decisions":["add index"],"resource_usage":812}"#,
        );
        assert_eq!(response.output, json!({"files": 2}));
        assert_eq!(response.reasoning, Some(vec!["read schema".to_string()]));
        assert_eq!(response.decisions, Some(vec!["add index".to_string()]));
        assert_eq!(response.resource_usage, Some(812));
    }

    #[test]
    fn other_json_and_text_become_the_output() {
        assert_eq!(parse_agent_output("[1, 2]").output, json!([1, 2]));
        assert_eq!(parse_agent_output("  all done\n").output, json!("all done"));
        // An object with a malformed observation still keeps its content.
        let odd = parse_agent_output(r#"{"output":"x","reasoning":"not a list"}"#);
        assert_eq!(odd.output, json!({"output": "x", "reasoning": "not a list"}));
        assert!(odd.reasoning.is_none());
    }

    // ── Process execution ─────────────────────────────────────────────────────

    #[cfg(unix)]
    #[test]
    fn request_goes_to_stdin() {
        let executor = CommandAgentExecutor::new("sh").with_args(["-c", "cat"]);
        let response = executor.send("add a migration", &ExecutionOptions::default()).unwrap();
        assert_eq!(response.output, json!("add a migration"));
    }

    #[cfg(unix)]
    #[test]
    fn large_request_echoed_back_does_not_stall() {
        let request = "x".repeat(1 << 20);
        let executor = CommandAgentExecutor::new("sh").with_args(["-c", "cat"]);
        let response = executor.send(&request, &ExecutionOptions::default()).unwrap();
        assert_eq!(response.output.as_str().map(str::len), Some(request.len()));
    }

    #[cfg(unix)]
    #[test]
    fn program_ignoring_a_large_request_still_succeeds() {
        let request = "y".repeat(1 << 20);
        let executor = CommandAgentExecutor::new("sh").with_args(["-c", "echo done"]);
        let response = executor.send(&request, &ExecutionOptions::default()).unwrap();
        assert_eq!(response.output, json!("done"));
    }

    #[cfg(unix)]
    #[test]
    fn context_travels_in_environment() {
        let executor = CommandAgentExecutor::new("sh")
            .with_args(["-c", r#"printf '{"output":"%s|%s"}' "$ACE_TRACE_ID" "$ACE_PRIORITY_CONTEXT""#]);
        let options = ExecutionOptions {
            priority_context: Some("q3".to_string()),
            playbook_context: "no existing playbook".to_string(),
            trace_id: Some(TraceId::new("trace_20250101_000000_000001")),
        };
        let response = executor.send("ignored", &options).unwrap();
        assert_eq!(response.output, json!("trace_20250101_000000_000001|q3"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_is_a_capability_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let executor = CommandAgentExecutor::new("sh")
            .with_args(["-c", "echo boom >&2; exit 3"])
            .with_workdir(tmp.path());
        let err = executor.send("x", &ExecutionOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capability);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn missing_program_is_a_capability_error() {
        let executor = CommandAgentExecutor::new("ace-definitely-not-installed");
        let err = executor.send("x", &ExecutionOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capability);
    }
}
