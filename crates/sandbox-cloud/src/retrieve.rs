use sandbox::{Result, SandboxError};
use tracing::debug;

use crate::services::{ObjectStore, StoreError};

/// Ceiling on captured stdout/stderr per stream (10 MiB).
pub const MAX_EXEC_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Ceiling on file reads through the transfer bridge (100 MiB).
pub const MAX_READ_FILE_BYTES: usize = 100 * 1024 * 1024;

/// Outcome of a size-limited stream fetch.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Fetched {
    /// Full content, under the limit. An absent object is an empty string:
    /// the relay simply creates no object when a stream is empty, and that
    /// must not be conflated with a retrieval error.
    Complete(String),
    /// First `limit` bytes of an object at or over the limit.
    Truncated(String),
}

/// Outcome of a size-limited file fetch. Stricter policy than exec output:
/// absence is reported, and an oversized file yields no partial content.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FileFetch {
    Complete(Vec<u8>),
    TooLarge,
    Absent,
}

/// Fetch a stream object, bounded to `limit` bytes.
///
/// A metadata probe runs first so oversized objects are range-limited on
/// the wire rather than downloaded whole and cut locally.
pub(crate) async fn read_or_blank(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    limit: usize,
) -> Result<Fetched> {
    let size = match store.head_object(bucket, key).await {
        Ok(size) => size,
        Err(StoreError::NotFound(_)) => {
            debug!(key, "object absent, treating as empty stream");
            return Ok(Fetched::Complete(String::new()));
        }
        Err(e) => return Err(service_error(key, &e)),
    };

    if size >= limit as u64 {
        let body = store
            .get_object(bucket, key, Some(0..limit as u64))
            .await
            .map_err(|e| service_error(key, &e))?;
        return Ok(Fetched::Truncated(decode_truncated(&body)));
    }

    match store.get_object(bucket, key, None).await {
        Ok(body) => Ok(Fetched::Complete(decode(&body))),
        // deleted between probe and fetch: still an empty stream
        Err(StoreError::NotFound(_)) => Ok(Fetched::Complete(String::new())),
        Err(e) => Err(service_error(key, &e)),
    }
}

/// Fetch an uploaded file, bounded to `limit` bytes.
///
/// Oversized files are not downloaded at all; the caller surfaces a
/// truncation error carrying no content.
pub(crate) async fn fetch_file(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    limit: usize,
) -> Result<FileFetch> {
    let size = match store.head_object(bucket, key).await {
        Ok(size) => size,
        Err(StoreError::NotFound(_)) => return Ok(FileFetch::Absent),
        Err(e) => return Err(service_error(key, &e)),
    };

    if size >= limit as u64 {
        return Ok(FileFetch::TooLarge);
    }

    match store.get_object(bucket, key, None).await {
        Ok(body) => Ok(FileFetch::Complete(body)),
        Err(StoreError::NotFound(_)) => Ok(FileFetch::Absent),
        Err(e) => Err(service_error(key, &e)),
    }
}

fn decode(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

/// Decode a range-cut body. The byte cut can land mid-character; the
/// dangling fragment is dropped rather than surfaced as U+FFFD.
fn decode_truncated(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(s) => s.to_owned(),
        Err(e) if e.error_len().is_none() => decode(&body[..e.valid_up_to()]),
        Err(_) => decode(body),
    }
}

fn service_error(key: &str, e: &StoreError) -> SandboxError {
    SandboxError::Service(format!("retrieving {key}: {e}"))
}
