#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The control plane rejected instance creation or the instance never
    /// reached running. Not retried: provisioning failures are rarely
    /// transient.
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// The remote agent never registered online within the retry budget.
    #[error("agent never came online: {0}")]
    ReadinessTimeout(String),

    /// The command did not reach a terminal state within the caller's
    /// timeout. Distinct from a nonzero exit so callers can tell slow
    /// commands from crashed ones. The in-flight command has been cancelled
    /// best-effort.
    #[error("command execution timed out after {timeout_secs}s")]
    ExecutionTimeout { timeout_secs: u64 },

    /// The shell refused to execute the command (exit 126).
    #[error("permission denied executing command: {0}")]
    PermissionDenied(String),

    /// A retrieved stream exceeded the configured size ceiling. `output`
    /// holds the truncated prefix for exec output and is `None` for file
    /// reads, which must not leak partial content.
    #[error("output exceeded {limit_bytes} byte limit")]
    OutputTruncated {
        limit_bytes: usize,
        output: Option<String>,
    },

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A call to one of the external services failed.
    #[error("service failure: {0}")]
    Service(String),

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
