/// A single batch command to run inside a sandbox.
pub struct ExecRequest<'a> {
    /// Command and arguments, joined and shell-quoted by the backend.
    pub cmd: &'a [String],
    /// Environment variables exported before the command runs.
    pub env: &'a [(String, String)],
    /// Working directory to `cd` into first.
    pub cwd: Option<&'a str>,
    /// Wall-clock budget in seconds. Backends apply their own default when
    /// unset.
    pub timeout_secs: Option<u64>,
}

impl<'a> ExecRequest<'a> {
    pub fn new(cmd: &'a [String]) -> Self {
        Self {
            cmd,
            env: &[],
            cwd: None,
            timeout_secs: None,
        }
    }
}

/// Result of one completed command. Produced once per invocation; immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub success: bool,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}
