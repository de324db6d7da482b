//! Accepts drafts into the local queue.
//!
//! Submission is local only: validate, persist as `Pending`, nudge the
//! coordinator, return. Upload and remote writes happen later in the
//! background.

use crate::coordinator::SyncHandle;
use crate::error::{Result, SyncError};
use crate::model::{Identity, KNOWN_CATEGORIES, ReportDraft, ReportId};
use crate::store::LocalReportStore;
use fixmyarea_core::validation::{FieldError, Validator};
use fixmyarea_geo::LocationCapturer;
use fixmyarea_telemetry::{metrics, names};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest accepted description, in characters
pub const MAX_DESCRIPTION_CHARS: usize = 2000;
/// Longest accepted title, in characters
pub const MAX_TITLE_CHARS: usize = 120;

/// Validate a (normalized) draft, returning non-blocking warnings
pub fn validate(draft: &ReportDraft) -> Result<Vec<FieldError>> {
    let mut validator = Validator::new()
        .required("description", &draft.description)
        .max_chars("description", &draft.description, MAX_DESCRIPTION_CHARS)
        .required("category", &draft.category)
        .known_value("category", &draft.category, KNOWN_CATEGORIES);

    if let Some(title) = &draft.title {
        validator = validator.max_chars("title", title, MAX_TITLE_CHARS);
    }
    if let Some(point) = &draft.location {
        validator = validator
            .range("latitude", point.coordinate.latitude, -90.0, 90.0)
            .range("longitude", point.coordinate.longitude, -180.0, 180.0)
            .custom("accuracy", || match point.accuracy_m {
                Some(m) if !m.is_finite() || m < 0.0 => {
                    Some(format!("Accuracy must be a non-negative number of meters (got {m})"))
                }
                _ => None,
            });
    }

    let result = validator.finish();
    if result.is_valid() {
        Ok(result.warnings().to_vec())
    } else {
        Err(SyncError::Validation {
            summary: result.summary(),
            errors: result.errors().to_vec(),
        })
    }
}

/// Front door of the pipeline
pub struct ReportSubmitter {
    store: Arc<LocalReportStore>,
    sync: Option<SyncHandle>,
    capturer: Option<Arc<LocationCapturer>>,
}

impl ReportSubmitter {
    pub fn new(store: Arc<LocalReportStore>) -> Self {
        Self {
            store,
            sync: None,
            capturer: None,
        }
    }

    /// Wake this coordinator after each submission
    #[must_use]
    pub fn with_sync(mut self, handle: SyncHandle) -> Self {
        self.sync = Some(handle);
        self
    }

    /// Use this capturer for drafts submitted without a location
    #[must_use]
    pub fn with_capturer(mut self, capturer: Arc<LocationCapturer>) -> Self {
        self.capturer = Some(capturer);
        self
    }

    /// Validate and enqueue `draft`; returns without touching the network.
    ///
    /// An invalid draft is rejected with [`SyncError::Validation`] and nothing
    /// is written.
    pub fn submit(&self, reporter: &Identity, draft: ReportDraft) -> Result<ReportId> {
        let draft = draft.normalized();
        let warnings = validate(&draft)?;
        for warning in &warnings {
            warn!(field = %warning.field, "{}", warning.message);
        }

        let id = self.store.enqueue(reporter.clone(), draft)?;
        metrics().increment(names::REPORTS_SUBMITTED);
        info!(report_id = %id, reporter = %reporter, "Report queued");

        if let Some(sync) = &self.sync {
            sync.trigger();
        }
        Ok(id)
    }

    /// Like [`submit`](Self::submit), first capturing a location when the
    /// draft has none. Waits at most the capture policy's timeout.
    pub async fn submit_with_location(
        &self,
        reporter: &Identity,
        mut draft: ReportDraft,
    ) -> Result<ReportId> {
        if draft.location.is_none() {
            if let Some(capturer) = &self.capturer {
                draft.location = capturer.capture().await.point();
                if draft.location.is_none() {
                    debug!("No location available, submitting without one");
                }
            }
        }
        self.submit(reporter, draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReportState;
    use chrono::Utc;
    use fixmyarea_geo::{
        CapturePolicy, Coordinate, GeoPoint, LocationFix, StaticLocationProvider,
    };
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<LocalReportStore>, ReportSubmitter) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalReportStore::open(dir.path()).unwrap());
        let submitter = ReportSubmitter::new(store.clone());
        (dir, store, submitter)
    }

    fn reporter() -> Identity {
        Identity::new("user-42")
    }

    #[test]
    fn test_submit_enqueues_pending() {
        let (_dir, store, submitter) = setup();
        let draft = ReportDraft::new("Pothole near school gate", "Road").with_title("Pothole");

        let id = submitter.submit(&reporter(), draft).unwrap();

        let queued = store.get(id).unwrap();
        assert_eq!(queued.state, ReportState::Pending);
        assert_eq!(queued.draft.category, "road");
        assert_eq!(queued.reporter, reporter());
        assert_eq!(queued.attempt_count, 0);
    }

    #[test]
    fn test_rejects_invalid_draft_without_writing() {
        let (_dir, store, submitter) = setup();

        let err = submitter
            .submit(&reporter(), ReportDraft::new("   ", ""))
            .unwrap_err();

        let SyncError::Validation { errors, .. } = err else {
            panic!("expected validation error, got {err:?}");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["description", "category"]);
        assert!(store.list_pending().is_empty());
    }

    #[test]
    fn test_length_and_coordinate_limits() {
        let long = "x".repeat(MAX_DESCRIPTION_CHARS + 1);
        assert!(validate(&ReportDraft::new(long, "road")).is_err());

        let title = "t".repeat(MAX_TITLE_CHARS + 1);
        assert!(validate(&ReportDraft::new("ok", "road").with_title(title)).is_err());

        let off_map = GeoPoint::exact(Coordinate::new(95.0, 10.0));
        assert!(validate(&ReportDraft::new("ok", "road").with_location(off_map)).is_err());

        let negative = GeoPoint::with_accuracy(Coordinate::new(10.0, 10.0), -3.0);
        assert!(validate(&ReportDraft::new("ok", "road").with_location(negative)).is_err());
    }

    #[test]
    fn test_unknown_category_only_warns() {
        let warnings = validate(&ReportDraft::new("Graffiti on wall", "graffiti")).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "category");
    }

    #[tokio::test]
    async fn test_submit_with_location_captures_fix() {
        let (_dir, store, submitter) = setup();
        let fix = LocationFix {
            coordinate: Coordinate::new(22.3569, 91.7832),
            accuracy_m: 12.0,
            captured_at: Utc::now(),
        };
        let capturer = LocationCapturer::new(
            Arc::new(StaticLocationProvider::new(Some(fix))),
            CapturePolicy {
                timeout: Duration::from_millis(100),
                ..CapturePolicy::default()
            },
        );
        let submitter = submitter.with_capturer(Arc::new(capturer));

        let id = submitter
            .submit_with_location(&reporter(), ReportDraft::new("Broken pipe", "water"))
            .await
            .unwrap();

        let location = store.get(id).unwrap().draft.location.unwrap();
        assert_eq!(location.coordinate, fix.coordinate);
        assert_eq!(location.accuracy_m, Some(12.0));
    }

    #[tokio::test]
    async fn test_submit_with_location_tolerates_no_fix() {
        let (_dir, store, submitter) = setup();
        let capturer = LocationCapturer::new(
            Arc::new(StaticLocationProvider::new(None)),
            CapturePolicy::default(),
        );
        let submitter = submitter.with_capturer(Arc::new(capturer));

        let id = submitter
            .submit_with_location(&reporter(), ReportDraft::new("Open drain", "sanitation"))
            .await
            .unwrap();

        assert!(store.get(id).unwrap().draft.location.is_none());
    }
}
