//! Best-effort deletion of per-invocation object-store artifacts.
//!
//! Cleanup failures are logged and swallowed at the point of occurrence so
//! they can never mask the real result of the command they follow. The
//! explicit `_best_effort` names mark every call site as non-propagating.

use tracing::{debug, warn};

use crate::services::ObjectStore;

pub(crate) async fn delete_object_best_effort(store: &dyn ObjectStore, bucket: &str, key: &str) {
    match store.delete_object(bucket, key).await {
        Ok(()) => debug!(key, "deleted object"),
        Err(e) => warn!(key, error = %e, "failed to delete object"),
    }
}

pub(crate) async fn delete_prefix_best_effort(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
) {
    match store.delete_prefix(bucket, prefix).await {
        Ok(()) => debug!(prefix, "deleted objects under prefix"),
        Err(e) => warn!(prefix, error = %e, "failed to delete objects under prefix"),
    }
}
