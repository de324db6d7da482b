//! Remote collaborators the sync engine talks to.

use crate::error::{RemoteError, Result, SyncError};
use crate::model::IssueDocument;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Remote object storage for report photos
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `key` and return the public URL.
    ///
    /// Uploading the same key twice must not create a second object.
    async fn upload(&self, bytes: Vec<u8>, key: &str, mime: &str)
        -> std::result::Result<String, RemoteError>;
}

/// Remote structured store for issue documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the document keyed by `id` and return its remote id.
    ///
    /// A document that already exists under `id` counts as success.
    async fn write(&self, id: &str, document: &IssueDocument)
        -> std::result::Result<String, RemoteError>;
}

/// Run a remote call bounded by `timeout` and abandoned on cancellation.
///
/// A timeout is reported as a transient failure.
pub(crate) async fn guarded<T, F>(
    what: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, RemoteError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SyncError::Cancelled),
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(inner) => inner.map_err(SyncError::from),
            Err(_) => Err(SyncError::Transient(format!(
                "{what} timed out after {}ms",
                timeout.as_millis()
            ))),
        },
    }
}
