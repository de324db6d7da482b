//! One processing attempt for one report.
//!
//! [`SyncEngine::process`] picks a queued report up from whatever state was
//! last persisted and drives it as far as it can: upload the photo, then
//! write the issue document. Every step is written to the store before the
//! next network call, so a crash resumes where it stopped and a finished
//! upload is never repeated.

use crate::error::{Result, SyncError};
use crate::model::{FailureReason, IssueDocument, QueuedReport, RemoteAsset, ReportId, ReportState};
use crate::ports::{guarded, DocumentStore, ObjectStorage};
use crate::store::LocalReportStore;
use crate::uploader::AssetUploader;
use chrono::{DateTime, Utc};
use fixmyarea_core::clock::Clock;
use fixmyarea_core::config::AppConfig;
use fixmyarea_core::retry::RetryConfig;
use fixmyarea_telemetry::{metrics, names, Timer};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Result of [`SyncEngine::process`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Stored remotely and removed from the queue
    Committed { remote_id: String, attempts: u32 },
    /// Transient failure; the report waits until `at`
    RetryScheduled {
        attempt: u32,
        at: DateTime<Utc>,
        error: String,
    },
    /// Moved to the failed archive
    Failed { reason: FailureReason },
    /// Stopped by its cancellation token; progress so far is kept
    Cancelled,
    /// Still backing off
    NotDue { at: DateTime<Utc> },
    /// Already in the failed archive; nothing done
    Archived,
}

/// What the reconciliation pass found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Reconciled {
    /// Committed records dropped from the queue
    pub committed: usize,
    /// Failed records moved to the archive
    pub archived: usize,
    /// Records that will resume from their stored state
    pub resumable: usize,
}

enum Step {
    Continue(QueuedReport),
    Done(Outcome),
}

/// Drives reports through upload and remote persistence
pub struct SyncEngine {
    store: Arc<LocalReportStore>,
    uploader: AssetUploader,
    documents: Arc<dyn DocumentStore>,
    retry: RetryConfig,
    op_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<LocalReportStore>,
        storage: Arc<dyn ObjectStorage>,
        documents: Arc<dyn DocumentStore>,
        config: &AppConfig,
    ) -> Self {
        let op_timeout = config.sync.op_timeout;
        Self {
            clock: store.clock(),
            uploader: AssetUploader::new(storage, &config.upload, op_timeout),
            store,
            documents,
            retry: config.sync.retry.clone(),
            op_timeout,
        }
    }

    pub fn store(&self) -> &Arc<LocalReportStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Backoff policy shared with the coordinator
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Settle records left terminal in the queue by an earlier run
    pub fn reconcile(&self) -> Result<Reconciled> {
        let mut found = Reconciled::default();

        for report in self.store.list_queue() {
            match &report.state {
                ReportState::Committed { .. } => {
                    self.store.remove(report.id)?;
                    found.committed += 1;
                }
                ReportState::Failed { reason } => {
                    self.store.archive_failed(report.id, reason.clone())?;
                    found.archived += 1;
                }
                _ => found.resumable += 1,
            }
        }

        if found != Reconciled::default() {
            info!(
                committed = found.committed,
                archived = found.archived,
                resumable = found.resumable,
                "Reconciled report queue"
            );
        }
        Ok(found)
    }

    /// Run one processing attempt for `id`
    #[instrument(skip(self, cancel), fields(report_id = %id))]
    pub async fn process(&self, id: ReportId, cancel: &CancellationToken) -> Result<Outcome> {
        let report = self.store.get(id)?;
        match &report.state {
            ReportState::Failed { reason } => {
                if self.store.is_archived(id) {
                    return Ok(Outcome::Archived);
                }
                let archived = self.store.archive_failed(id, reason.clone())?;
                return Ok(Outcome::Failed {
                    reason: failure_reason(&archived),
                });
            }
            ReportState::Committed { remote_id, .. } => {
                self.store.remove(id)?;
                return Ok(Outcome::Committed {
                    remote_id: remote_id.clone(),
                    attempts: report.attempt_count,
                });
            }
            _ => {}
        }

        let now = self.clock.now();
        if let Some(at) = report.next_retry_at.filter(|at| *at > now) {
            return Ok(Outcome::NotDue { at });
        }
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let _timer = Timer::start(names::SYNC_ATTEMPT_MS);
        let mut report = self.store.update(id, |r| {
            r.attempt_count += 1;
            r.next_retry_at = None;
        })?;
        debug!(attempt = report.attempt_count, state = %report.state, "Processing report");

        loop {
            let step = match report.state.clone() {
                ReportState::Pending => self.start_upload(&report)?,
                ReportState::UploadingAsset => self.upload(&report, cancel).await?,
                ReportState::AssetUploaded { asset } => {
                    let next = self.store.update(id, |r| r.state = ReportState::Persisting { asset })?;
                    Step::Continue(next)
                }
                ReportState::Persisting { asset } => self.persist(&report, asset, cancel).await?,
                ReportState::Committed { .. } | ReportState::Failed { .. } => {
                    return Err(SyncError::InvalidTransition {
                        id,
                        from: report.state.name(),
                        to: "processing",
                    });
                }
            };

            match step {
                Step::Continue(next) => report = next,
                Step::Done(outcome) => return Ok(outcome),
            }
        }
    }

    fn start_upload(&self, report: &QueuedReport) -> Result<Step> {
        let next_state = if report.draft.photo.is_some() {
            ReportState::UploadingAsset
        } else {
            ReportState::AssetUploaded {
                asset: RemoteAsset::NoPhoto,
            }
        };
        let next = self.store.update(report.id, |r| r.state = next_state)?;
        Ok(Step::Continue(next))
    }

    async fn upload(&self, report: &QueuedReport, cancel: &CancellationToken) -> Result<Step> {
        let Some(photo) = report.draft.photo.as_deref() else {
            return self.fail(report.id, "photo reference missing".to_string());
        };

        match self.uploader.upload(photo, report.id, cancel).await {
            Ok(url) => {
                let next = self.store.update(report.id, |r| {
                    r.state = ReportState::AssetUploaded {
                        asset: RemoteAsset::Hosted { url },
                    };
                    r.last_error = None;
                })?;
                Ok(Step::Continue(next))
            }
            Err(e) => self.handle_failure(report, e, ReportState::Pending),
        }
    }

    async fn persist(
        &self,
        report: &QueuedReport,
        asset: RemoteAsset,
        cancel: &CancellationToken,
    ) -> Result<Step> {
        let document = IssueDocument::from_report(report, &asset);
        let key = report.id.to_string();

        let written = guarded(
            "document write",
            self.op_timeout,
            cancel,
            self.documents.write(&key, &document),
        )
        .await;

        match written {
            Ok(remote_id) => {
                let committed = self.store.update(report.id, |r| {
                    r.state = ReportState::Committed {
                        asset,
                        remote_id: remote_id.clone(),
                    };
                    r.last_error = None;
                })?;
                self.store.remove(report.id)?;
                metrics().increment(names::REPORTS_COMMITTED);
                info!(remote_id, attempts = committed.attempt_count, "Report committed");

                Ok(Step::Done(Outcome::Committed {
                    remote_id,
                    attempts: committed.attempt_count,
                }))
            }
            Err(e) => self.handle_failure(report, e, ReportState::AssetUploaded { asset }),
        }
    }

    /// Map a failed network step onto the lifecycle
    fn handle_failure(
        &self,
        report: &QueuedReport,
        error: SyncError,
        retry_state: ReportState,
    ) -> Result<Step> {
        match error {
            SyncError::Cancelled => {
                metrics().increment(names::SYNC_CANCELLED);
                debug!(state = %report.state, "Attempt cancelled");
                Ok(Step::Done(Outcome::Cancelled))
            }
            SyncError::Transient(message) => self.schedule_retry(report.id, message, retry_state),
            SyncError::Permanent(message) => self.fail(report.id, message),
            other => Err(other),
        }
    }

    fn schedule_retry(&self, id: ReportId, message: String, retry_state: ReportState) -> Result<Step> {
        let current = self.store.get(id)?;
        let attempt = current.attempt_count;

        if self.retry.is_exhausted(attempt) {
            // Leave the in-flight state first so the archive records where it stopped.
            self.store.update(id, |r| r.state = retry_state)?;
            let archived = self.store.archive_failed(
                id,
                FailureReason::RetriesExhausted { attempts: attempt, message },
            )?;
            metrics().increment(names::REPORTS_FAILED);
            return Ok(Step::Done(Outcome::Failed {
                reason: failure_reason(&archived),
            }));
        }

        let delay = self.retry.next_delay(attempt);
        let at = self.clock.now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(0));

        self.store.update(id, |r| {
            r.state = retry_state;
            r.last_error = Some(message.clone());
            r.next_retry_at = Some(at);
        })?;
        metrics().increment(names::SYNC_RETRIES);
        warn!(
            attempt,
            delay_ms = delay.as_millis(),
            error = %message,
            "Transient failure, retry scheduled"
        );

        Ok(Step::Done(Outcome::RetryScheduled {
            attempt,
            at,
            error: message,
        }))
    }

    fn fail(&self, id: ReportId, message: String) -> Result<Step> {
        let archived = self
            .store
            .archive_failed(id, FailureReason::Permanent { message })?;
        metrics().increment(names::REPORTS_FAILED);
        Ok(Step::Done(Outcome::Failed {
            reason: failure_reason(&archived),
        }))
    }
}

fn failure_reason(report: &QueuedReport) -> FailureReason {
    match &report.state {
        ReportState::Failed { reason } => reason.clone(),
        other => FailureReason::Permanent {
            message: format!("unexpected state {other}"),
        },
    }
}
