//! Offline-first submission and sync pipeline for FixMyArea issue reports.
//!
//! - [`ReportSubmitter`] validates drafts and queues them locally
//! - [`LocalReportStore`] keeps the queue on disk, crash-safe
//! - [`SyncEngine`] uploads the photo, then writes the issue document
//! - [`SyncCoordinator`] drains the queue in the background with retries
//!
//! Remote services are reached through the [`ObjectStorage`] and
//! [`DocumentStore`] traits; HTTP implementations live in
//! `fixmyarea-api-client`.
//!
//! # Example
//!
//! ```rust,no_run
//! use fixmyarea_sync::{Identity, LocalReportStore, ReportDraft, ReportSubmitter};
//! use std::sync::Arc;
//!
//! # fn main() -> fixmyarea_sync::Result<()> {
//! let store = Arc::new(LocalReportStore::open("/tmp/fixmyarea")?);
//! let submitter = ReportSubmitter::new(store);
//!
//! let id = submitter.submit(
//!     &Identity::new("user-1"),
//!     ReportDraft::new("Streetlight out on Road 12", "electricity"),
//! )?;
//! println!("queued {id}");
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod model;
pub mod ports;
pub mod store;
pub mod submitter;
pub mod uploader;

#[cfg(test)]
mod testing;

pub use coordinator::{SyncCoordinator, SyncEvent, SyncHandle};
pub use engine::{Outcome, Reconciled, SyncEngine};
pub use error::{RemoteError, Result, SyncError};
pub use model::{
    FailureReason, Identity, IssueDocument, QueuedReport, RemoteAsset, ReportDraft, ReportId,
    ReportState, Transition,
};
pub use ports::{DocumentStore, ObjectStorage};
pub use store::{Access, LocalReportStore, StoreCounts};
pub use submitter::ReportSubmitter;
pub use uploader::AssetUploader;
