//! Command dispatch, completion polling, and result retrieval.
//!
//! One invocation is one relay submission plus the unique object-store key
//! prefix its streams are mirrored under. The dispatcher walks
//! `Submitted -> Polling -> {Succeeded, Failed, TimedOut}` and always sweeps
//! the invocation's artifacts on the way out.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use sandbox::{ExecOutcome, Result, SandboxError};
use tracing::{debug, warn};

use crate::config::CloudConfig;
use crate::janitor;
use crate::retrieve::{Fetched, MAX_EXEC_OUTPUT_BYTES, read_or_blank};
use crate::services::{CommandRelay, CommandSpec, CommandState, InvocationStatus, ObjectStore};

/// Default execution budget when the caller supplies no timeout.
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// One status poll per second; the attempt budget IS the timeout.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Returncode reported when the relay ends an invocation without a code.
const FAILURE_RETURNCODE: i32 = 1;

/// Marker the relay agent emits when the shell refuses to execute (exit
/// 126). Heuristic text match; isolated here so a structured marker can
/// replace it.
const EXEC_FAILURE_MARKER: &str = "failed to run commands: exit status 126";

const SUFFIX_LEN: usize = 8;

/// Operation names segmenting per-invocation key prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Exec,
    ReadFile,
    WriteFile,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Exec => "exec",
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
        }
    }
}

pub(crate) fn random_suffix_with(rng: &mut impl Rng) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect()
}

fn random_suffix() -> String {
    random_suffix_with(&mut rand::thread_rng())
}

/// Key prefix unique to one invocation:
/// `{config_prefix}{operation}/{timestamp}-{suffix}/`.
///
/// Uniqueness, not access control, is what keeps concurrent invocations
/// from colliding in the shared bucket, so the random suffix matters even
/// when two calls land in the same second.
pub(crate) fn invocation_prefix(
    config_prefix: &str,
    operation: Operation,
    timestamp: &str,
    suffix: &str,
) -> String {
    format!(
        "{config_prefix}{operation}/{timestamp}-{suffix}/",
        operation = operation.as_str()
    )
}

pub(crate) fn fresh_prefix(config_prefix: &str, operation: Operation) -> String {
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    invocation_prefix(config_prefix, operation, &timestamp, &random_suffix())
}

/// Assemble the POSIX shell batch for an exec request: exported environment
/// variables, optional working directory, then the command itself, all
/// shell-quoted.
pub(crate) fn build_script(
    cmd: &[String],
    env: &[(String, String)],
    cwd: Option<&str>,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(env.len() + 2);
    for (key, value) in env {
        lines.push(format!(
            "export {}={}",
            shell_words::quote(key),
            shell_words::quote(value)
        ));
    }
    if let Some(dir) = cwd {
        lines.push(format!("cd {}", shell_words::quote(dir)));
    }
    lines.push(shell_words::join(cmd));
    lines
}

/// Key under which the relay mirrors one stream of one invocation.
fn stream_key(prefix: &str, command_id: &str, instance_id: &str, stream: &str) -> String {
    format!("{prefix}{command_id}/{instance_id}/{stream}")
}

fn is_permission_denied(stderr: &str) -> bool {
    stderr.contains(EXEC_FAILURE_MARKER)
}

enum Completion {
    Terminal(InvocationStatus),
    /// Attempt budget spent with the relay still reporting progress.
    StillRunning,
}

/// Borrowed per-call view of one environment's clients.
pub(crate) struct Dispatcher<'a> {
    pub(crate) relay: &'a dyn CommandRelay,
    pub(crate) store: &'a dyn ObjectStore,
    pub(crate) config: &'a CloudConfig,
    pub(crate) instance_id: &'a str,
}

impl Dispatcher<'_> {
    /// Submit a command batch, poll it to a terminal state, retrieve its
    /// streams, and sweep its artifacts.
    pub(crate) async fn run(
        &self,
        commands: Vec<String>,
        operation: Operation,
        timeout_secs: u64,
    ) -> Result<ExecOutcome> {
        let prefix = fresh_prefix(&self.config.key_prefix, operation);
        let spec = CommandSpec {
            instance_id: self.instance_id,
            commands: &commands,
            timeout_secs,
            output_bucket: &self.config.bucket,
            output_key_prefix: &prefix,
        };

        let command_id = self
            .relay
            .send_command(&spec)
            .await
            .map_err(|e| SandboxError::Service(e.to_string()))?;

        debug!(command_id = %command_id, prefix = %prefix, "command submitted");

        let stdout_key = stream_key(&prefix, &command_id, self.instance_id, "stdout");
        let stderr_key = stream_key(&prefix, &command_id, self.instance_id, "stderr");

        let result = match self.await_completion(&command_id, timeout_secs).await {
            Ok(Completion::Terminal(status)) => {
                self.finish(status, &stdout_key, &stderr_key).await
            }
            Ok(Completion::StillRunning) => {
                warn!(command_id = %command_id, timeout_secs, "command still in progress at timeout, cancelling");
                if let Err(e) = self
                    .relay
                    .cancel_command(&command_id, &[self.instance_id.to_string()])
                    .await
                {
                    // cancellation is best-effort; its failure never
                    // replaces the timeout the caller needs to see
                    warn!(command_id = %command_id, error = %e, "cancel failed");
                }
                Err(SandboxError::ExecutionTimeout { timeout_secs })
            }
            Err(e) => Err(e),
        };

        janitor::delete_object_best_effort(self.store, &self.config.bucket, &stdout_key).await;
        janitor::delete_object_best_effort(self.store, &self.config.bucket, &stderr_key).await;
        janitor::delete_prefix_best_effort(self.store, &self.config.bucket, &prefix).await;

        result
    }

    /// Poll relay status once per second until terminal, with an attempt
    /// budget equal to the caller's timeout in seconds. There is no
    /// independent clock-based cutoff.
    async fn await_completion(&self, command_id: &str, timeout_secs: u64) -> Result<Completion> {
        let attempts = timeout_secs.max(1);
        for attempt in 1..=attempts {
            let status = self
                .relay
                .invocation_status(command_id, self.instance_id)
                .await
                .map_err(|e| SandboxError::Service(e.to_string()))?;

            if status.state.is_terminal() {
                debug!(command_id = %command_id, state = %status.state, "command terminal");
                return Ok(Completion::Terminal(status));
            }

            if attempt < attempts {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
        Ok(Completion::StillRunning)
    }

    /// Retrieve both streams and turn a relay-terminal status into an
    /// outcome or a typed failure.
    async fn finish(
        &self,
        status: InvocationStatus,
        stdout_key: &str,
        stderr_key: &str,
    ) -> Result<ExecOutcome> {
        let stdout = self.fetch_stream(stdout_key).await?;
        let stderr = self.fetch_stream(stderr_key).await?;

        if status.state != CommandState::Success && is_permission_denied(&stderr) {
            return Err(SandboxError::PermissionDenied(stderr));
        }

        let returncode = status.response_code.unwrap_or(match status.state {
            CommandState::Success => 0,
            _ => FAILURE_RETURNCODE,
        });

        Ok(ExecOutcome {
            success: returncode == 0,
            returncode,
            stdout,
            stderr,
        })
    }

    async fn fetch_stream(&self, key: &str) -> Result<String> {
        match read_or_blank(self.store, &self.config.bucket, key, MAX_EXEC_OUTPUT_BYTES).await? {
            Fetched::Complete(content) => Ok(content),
            Fetched::Truncated(partial) => Err(SandboxError::OutputTruncated {
                limit_bytes: MAX_EXEC_OUTPUT_BYTES,
                output: Some(partial),
            }),
        }
    }
}
