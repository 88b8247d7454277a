//! File read/write over the exec path.
//!
//! The instance has no network path to the caller, so file content moves
//! through the object store: a presigned URL on one side, a remote `curl`
//! driven through the command dispatcher on the other.

use std::time::Duration;

use sandbox::{ExecOutcome, Result, SandboxError};
use tracing::info;

use crate::invocation::{DEFAULT_TIMEOUT_SECS, Dispatcher, Operation, build_script, fresh_prefix};
use crate::janitor;
use crate::retrieve::{FileFetch, MAX_READ_FILE_BYTES, fetch_file};
use crate::services::PresignMethod;

/// Presigned URLs only need to outlive one remote curl invocation.
const PRESIGN_TTL: Duration = Duration::from_secs(60);

/// Marker the remote script prints on stderr before refusing a directory.
const DIRECTORY_MARKER: &str = "Is a directory";

/// Remote script: refuse directories, then upload `path` to the presigned
/// URL, failing on HTTP errors.
fn upload_script(path: &str, url: &str) -> Vec<String> {
    vec![
        "#!/bin/sh".to_string(),
        "set -e".to_string(),
        directory_guard(path),
        shell_words::join([
            "curl",
            "--fail-with-body",
            "--verbose",
            "--upload-file",
            path,
            url,
        ]),
    ]
}

/// Remote script: refuse writing over a directory, then download the
/// presigned URL to `path`, failing on HTTP errors.
fn download_script(path: &str, url: &str) -> Vec<String> {
    vec![
        "#!/bin/sh".to_string(),
        "set -e".to_string(),
        directory_guard(path),
        shell_words::join([
            "curl",
            "--fail-with-body",
            "--verbose",
            "--output",
            path,
            url,
        ]),
    ]
}

fn directory_guard(path: &str) -> String {
    format!(
        "test -d {} && echo '{DIRECTORY_MARKER}' 1>&2 && exit 1",
        shell_words::quote(path)
    )
}

/// Heuristic mapping of a failed remote upload to an error. The remote
/// channel is plain stderr text, so anything that is not the directory
/// marker is reported as file-not-found even though other causes exist.
fn classify_read_failure(path: &str, outcome: &ExecOutcome) -> SandboxError {
    if outcome.stderr.contains(DIRECTORY_MARKER) {
        SandboxError::IsADirectory(path.to_string())
    } else {
        SandboxError::FileNotFound(format!("failed to read {path}: {}", outcome.stderr))
    }
}

/// Heuristic mapping of a failed remote download to an error.
fn classify_write_failure(path: &str, outcome: &ExecOutcome) -> SandboxError {
    if outcome.stderr.to_lowercase().contains("directory") {
        SandboxError::IsADirectory(path.to_string())
    } else {
        SandboxError::Io(format!("failed to write {path}: {}", outcome.stderr))
    }
}

/// Parent directory of a remote POSIX path, if it has one.
fn parent_dir(path: &str) -> Option<String> {
    match path.rsplit_once('/') {
        Some(("", _)) => Some("/".to_string()),
        Some((parent, _)) => Some(parent.to_string()),
        None => None,
    }
}

pub(crate) async fn read_file(dispatcher: &Dispatcher<'_>, path: &str) -> Result<Vec<u8>> {
    let store = dispatcher.store;
    let config = dispatcher.config;

    let file_key = format!(
        "{}{path}",
        fresh_prefix(&config.key_prefix, Operation::ReadFile)
    );
    let url = store
        .presign_url(PresignMethod::Put, &config.bucket, &file_key, PRESIGN_TTL)
        .await
        .map_err(|e| SandboxError::Service(e.to_string()))?;

    let outcome = dispatcher
        .run(upload_script(path, &url), Operation::Exec, DEFAULT_TIMEOUT_SECS)
        .await?;
    if !outcome.success {
        return Err(classify_read_failure(path, &outcome));
    }

    let fetched = fetch_file(store, &config.bucket, &file_key, MAX_READ_FILE_BYTES).await;
    janitor::delete_object_best_effort(store, &config.bucket, &file_key).await;

    match fetched? {
        FileFetch::Complete(bytes) => Ok(bytes),
        FileFetch::TooLarge => Err(SandboxError::OutputTruncated {
            limit_bytes: MAX_READ_FILE_BYTES,
            output: None,
        }),
        FileFetch::Absent => Err(SandboxError::FileNotFound(format!(
            "{path} was not uploaded from the instance"
        ))),
    }
}

pub(crate) async fn write_file(
    dispatcher: &Dispatcher<'_>,
    path: &str,
    contents: &[u8],
) -> Result<()> {
    let store = dispatcher.store;
    let config = dispatcher.config;

    // the parent directory must exist before the remote curl writes into it
    if let Some(parent) = parent_dir(path) {
        let mkdir = vec!["mkdir".to_string(), "-p".to_string(), parent.clone()];
        let outcome = dispatcher
            .run(
                build_script(&mkdir, &[], None),
                Operation::Exec,
                DEFAULT_TIMEOUT_SECS,
            )
            .await?;
        if !outcome.success {
            return Err(SandboxError::Io(format!(
                "failed to create directory {parent}: {}",
                outcome.stderr
            )));
        }
    }

    let file_key = format!(
        "{}{path}",
        fresh_prefix(&config.key_prefix, Operation::WriteFile)
    );
    store
        .put_object(&config.bucket, &file_key, contents.to_vec())
        .await
        .map_err(|e| SandboxError::Service(e.to_string()))?;
    let url = match store
        .presign_url(PresignMethod::Get, &config.bucket, &file_key, PRESIGN_TTL)
        .await
    {
        Ok(url) => url,
        Err(e) => {
            // the object is already staged; sweep it before bailing
            janitor::delete_object_best_effort(store, &config.bucket, &file_key).await;
            return Err(SandboxError::Service(e.to_string()));
        }
    };

    let result = dispatcher
        .run(
            download_script(path, &url),
            Operation::WriteFile,
            DEFAULT_TIMEOUT_SECS,
        )
        .await;

    // the staged object is deleted however the remote script fared
    janitor::delete_object_best_effort(store, &config.bucket, &file_key).await;

    let outcome = result?;
    if outcome.success {
        info!(path, "file written to instance");
        Ok(())
    } else {
        Err(classify_write_failure(path, &outcome))
    }
}
