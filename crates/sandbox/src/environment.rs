use async_trait::async_trait;

use crate::error::{Result, SandboxError};
use crate::types::{ExecOutcome, ExecRequest};

/// An isolated remote execution environment, one per sample.
///
/// Each call is a single sequential pipeline of blocking round-trips; the
/// backend never parallelizes sub-requests. Concurrency lives at the caller's
/// layer, with one environment (and one instance) per sample.
#[async_trait]
pub trait SandboxEnvironment: Send + Sync {
    /// Identifier of the compute instance backing this environment.
    fn instance_id(&self) -> &str;

    /// Run a command batch to completion or timeout.
    async fn exec(&self, request: &ExecRequest<'_>) -> Result<ExecOutcome>;

    /// Read a remote file as raw bytes.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Read a remote file and decode it as UTF-8.
    async fn read_file_text(&self, path: &str) -> Result<String> {
        let bytes = self.read_file(path).await?;
        String::from_utf8(bytes)
            .map_err(|e| SandboxError::Io(format!("invalid utf-8 in {path}: {e}")))
    }

    /// Write `contents` to a remote file, creating parent directories.
    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()>;
}
