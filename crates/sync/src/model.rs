//! Report data model and lifecycle.
//!
//! A [`QueuedReport`] moves through [`ReportState`]:
//!
//! ```text
//! Pending -> UploadingAsset -> AssetUploaded -> Persisting -> Committed
//!    |            |  (transient: back to Pending)   |  (transient: back to AssetUploaded)
//!    |            +-> Failed                        +-> Failed
//!    +-- no photo --> AssetUploaded
//! ```
//!
//! The uploaded asset lives inside the states that have one, so a report
//! cannot claim an asset before upload or lose it afterwards.

use chrono::{DateTime, Utc};
use fixmyarea_geo::GeoPoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Categories the app offers; others are accepted with a warning
pub const KNOWN_CATEGORIES: &[&str] = &["road", "water", "electricity", "sanitation", "other"];

/// Remote collection holding issue documents
pub const ISSUES_COLLECTION: &str = "issues";

/// Moderation status of a freshly submitted issue
pub const STATUS_PENDING: &str = "pending";

/// Locally generated report id, also the idempotency key for remote writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(Uuid);

impl ReportId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ReportId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Opaque identity of the person filing a report
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// User-authored report content. Not modified after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    pub category: String,
    /// Local photo file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    /// Free-text address or landmark typed by the reporter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReportDraft {
    pub fn new(description: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            title: None,
            description: description.into(),
            category: category.into(),
            photo: None,
            location: None,
            address: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_photo(mut self, photo: impl Into<PathBuf>) -> Self {
        self.photo = Some(photo.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Trim text fields, drop empty optional ones, lowercase the category
    pub fn normalized(mut self) -> Self {
        fn non_empty(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        self.title = non_empty(self.title);
        self.address = non_empty(self.address);
        self.description = self.description.trim().to_string();
        self.category = self.category.trim().to_lowercase();
        self
    }
}

/// Outcome of the upload step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteAsset {
    /// Photo stored remotely
    Hosted { url: String },
    /// Report has no photo; nothing was uploaded
    NoPhoto,
}

impl RemoteAsset {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Hosted { url } => Some(url),
            Self::NoPhoto => None,
        }
    }
}

/// Why a report ended up in the failed archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Rejected in a way retrying cannot fix
    Permanent { message: String },
    /// Gave up after the configured number of attempts
    RetriesExhausted { attempts: u32, message: String },
}

impl FailureReason {
    pub fn message(&self) -> &str {
        match self {
            Self::Permanent { message } | Self::RetriesExhausted { message, .. } => message,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent { message } => write!(f, "{message}"),
            Self::RetriesExhausted { attempts, message } => {
                write!(f, "gave up after {attempts} attempts: {message}")
            }
        }
    }
}

/// Lifecycle state of a queued report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReportState {
    Pending,
    UploadingAsset,
    AssetUploaded { asset: RemoteAsset },
    Persisting { asset: RemoteAsset },
    Committed { asset: RemoteAsset, remote_id: String },
    Failed { reason: FailureReason },
}

/// Lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    StartUpload,
    /// Report has no photo
    SkipUpload,
    UploadSucceeded { url: String },
    /// Transient upload failure; the upload starts over
    UploadFailed,
    StartPersist,
    PersistSucceeded { remote_id: String },
    /// Transient write failure; the uploaded asset is kept
    PersistFailed,
    Fail(FailureReason),
    /// Manual retry of an archived report
    Restore,
}

impl ReportState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UploadingAsset => "uploading_asset",
            Self::AssetUploaded { .. } => "asset_uploaded",
            Self::Persisting { .. } => "persisting",
            Self::Committed { .. } => "committed",
            Self::Failed { .. } => "failed",
        }
    }

    /// Committed and Failed are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed { .. } | Self::Failed { .. })
    }

    /// Resolved asset, present only once the upload step is done
    pub fn asset(&self) -> Option<&RemoteAsset> {
        match self {
            Self::AssetUploaded { asset }
            | Self::Persisting { asset }
            | Self::Committed { asset, .. } => Some(asset),
            _ => None,
        }
    }

    /// State after `transition`, or `None` if it does not apply here
    pub fn apply(&self, transition: Transition) -> Option<ReportState> {
        use ReportState as S;
        use Transition as T;

        match (self, transition) {
            (S::Pending, T::StartUpload) => Some(S::UploadingAsset),
            (S::Pending, T::SkipUpload) => Some(S::AssetUploaded {
                asset: RemoteAsset::NoPhoto,
            }),
            (S::UploadingAsset, T::UploadSucceeded { url }) => Some(S::AssetUploaded {
                asset: RemoteAsset::Hosted { url },
            }),
            (S::UploadingAsset, T::UploadFailed) => Some(S::Pending),
            (S::AssetUploaded { asset }, T::StartPersist) => Some(S::Persisting {
                asset: asset.clone(),
            }),
            (S::Persisting { asset }, T::PersistSucceeded { remote_id }) => Some(S::Committed {
                asset: asset.clone(),
                remote_id,
            }),
            (S::Persisting { asset }, T::PersistFailed) => Some(S::AssetUploaded {
                asset: asset.clone(),
            }),
            (state, T::Fail(reason)) if !state.is_terminal() => Some(S::Failed { reason }),
            (S::Failed { .. }, T::Restore) => Some(S::Pending),
            _ => None,
        }
    }

    /// Whether a stored record may move from `self` to `next`.
    ///
    /// Rewriting the same state is always allowed (bookkeeping updates).
    pub fn can_transition_to(&self, next: &ReportState) -> bool {
        use ReportState as S;

        if self == next {
            return true;
        }
        match (self, next) {
            (S::Pending, S::UploadingAsset)
            | (S::UploadingAsset, S::Pending)
            | (S::Failed { .. }, S::Pending)
            | (
                S::Pending,
                S::AssetUploaded {
                    asset: RemoteAsset::NoPhoto,
                },
            )
            | (
                S::UploadingAsset,
                S::AssetUploaded {
                    asset: RemoteAsset::Hosted { .. },
                },
            ) => true,
            (S::AssetUploaded { asset: a }, S::Persisting { asset: b })
            | (S::Persisting { asset: a }, S::AssetUploaded { asset: b })
            | (S::Persisting { asset: a }, S::Committed { asset: b, .. }) => a == b,
            (state, S::Failed { .. }) => !state.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ReportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A submitted report plus its sync bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedReport {
    pub id: ReportId,
    /// Insertion order
    pub seq: u64,
    pub reporter: Identity,
    pub draft: ReportDraft,
    pub state: ReportState,
    /// Processing attempts so far
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Earliest time the next attempt may start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueuedReport {
    pub fn new(id: ReportId, seq: u64, reporter: Identity, draft: ReportDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            seq,
            reporter,
            draft,
            state: ReportState::Pending,
            attempt_count: 0,
            last_error: None,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// URL of the uploaded photo; `None` before upload and for photo-less reports
    pub fn remote_asset_url(&self) -> Option<&str> {
        self.state.asset().and_then(RemoteAsset::url)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// True if no backoff delay is pending at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.is_none_or(|at| at <= now)
    }
}

/// Remote representation of an issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDocument {
    pub title: String,
    pub description: String,
    pub category: String,
    /// Address text
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_accuracy: Option<f64>,
    pub image_url: Vec<String>,
    pub reporter_id: String,
    pub status: String,
    /// Draft creation time, epoch milliseconds
    pub timestamp: i64,
    pub upvotes: i64,
}

impl IssueDocument {
    pub fn from_report(report: &QueuedReport, asset: &RemoteAsset) -> Self {
        let draft = &report.draft;
        let point = draft.location.as_ref();

        Self {
            title: draft.title.clone().unwrap_or_default(),
            description: draft.description.clone(),
            category: draft.category.clone(),
            location: draft.address.clone().unwrap_or_default(),
            latitude: point.map(|p| p.coordinate.latitude),
            longitude: point.map(|p| p.coordinate.longitude),
            location_accuracy: point.and_then(|p| p.accuracy_m),
            image_url: asset.url().map(str::to_string).into_iter().collect(),
            reporter_id: report.reporter.to_string(),
            status: STATUS_PENDING.to_string(),
            timestamp: draft.created_at.timestamp_millis(),
            upvotes: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixmyarea_geo::Coordinate;
    use proptest::prelude::*;

    fn report(photo: bool) -> QueuedReport {
        let mut draft = ReportDraft::new("Broken streetlight", "electricity");
        if photo {
            draft = draft.with_photo("/tmp/lamp.jpg");
        }
        QueuedReport::new(ReportId::new(), 1, Identity::new("user-1"), draft, Utc::now())
    }

    #[test]
    fn test_happy_path_transitions() {
        let s = ReportState::Pending;
        let s = s.apply(Transition::StartUpload).unwrap();
        let s = s
            .apply(Transition::UploadSucceeded { url: "https://cdn/x.jpg".into() })
            .unwrap();
        let s = s.apply(Transition::StartPersist).unwrap();
        let s = s
            .apply(Transition::PersistSucceeded { remote_id: "x".into() })
            .unwrap();

        assert!(s.is_terminal());
        assert_eq!(s.asset().and_then(RemoteAsset::url), Some("https://cdn/x.jpg"));
    }

    #[test]
    fn test_persist_failure_keeps_asset() {
        let asset = RemoteAsset::Hosted { url: "https://cdn/a".into() };
        let persisting = ReportState::Persisting { asset: asset.clone() };

        let back = persisting.apply(Transition::PersistFailed).unwrap();
        assert_eq!(back, ReportState::AssetUploaded { asset });
    }

    #[test]
    fn test_terminal_states_reject_events() {
        let committed = ReportState::Committed {
            asset: RemoteAsset::NoPhoto,
            remote_id: "r".into(),
        };
        assert!(committed.apply(Transition::StartUpload).is_none());
        assert!(committed
            .apply(Transition::Fail(FailureReason::Permanent { message: "x".into() }))
            .is_none());
    }

    #[test]
    fn test_can_transition_rejects_asset_swap() {
        let a = ReportState::Persisting {
            asset: RemoteAsset::Hosted { url: "https://cdn/a".into() },
        };
        let b = ReportState::AssetUploaded {
            asset: RemoteAsset::Hosted { url: "https://cdn/b".into() },
        };
        assert!(!a.can_transition_to(&b));
        assert!(!ReportState::Pending.can_transition_to(&ReportState::Persisting {
            asset: RemoteAsset::NoPhoto
        }));
    }

    #[test]
    fn test_no_photo_has_no_url() {
        let mut r = report(false);
        r.state = r.state.apply(Transition::SkipUpload).unwrap();

        assert!(r.state.asset().is_some());
        assert_eq!(r.remote_asset_url(), None);
    }

    #[test]
    fn test_normalized_draft() {
        let draft = ReportDraft::new("  Open manhole  ", " Road ")
            .with_title("   ")
            .with_address(" Mirpur 10 ")
            .normalized();

        assert_eq!(draft.description, "Open manhole");
        assert_eq!(draft.category, "road");
        assert_eq!(draft.title, None);
        assert_eq!(draft.address.as_deref(), Some("Mirpur 10"));
    }

    #[test]
    fn test_queued_report_json_shape() {
        let mut r = report(true);
        r.state = ReportState::AssetUploaded {
            asset: RemoteAsset::Hosted { url: "https://cdn/p.jpg".into() },
        };
        let json = serde_json::to_value(&r).unwrap();

        assert_eq!(json["state"]["state"], "asset_uploaded");
        assert_eq!(json["state"]["asset"]["kind"], "hosted");
        assert_eq!(json["state"]["asset"]["url"], "https://cdn/p.jpg");

        let back: QueuedReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_issue_document_fields() {
        let mut r = report(true);
        r.draft.location = Some(GeoPoint::with_accuracy(Coordinate::new(23.8, 90.4), 15.0));
        r.draft.address = Some("Road 7, Dhanmondi".into());
        let asset = RemoteAsset::Hosted { url: "https://cdn/p.jpg".into() };

        let json = serde_json::to_value(IssueDocument::from_report(&r, &asset)).unwrap();

        assert_eq!(json["imageUrl"][0], "https://cdn/p.jpg");
        assert_eq!(json["reporterId"], "user-1");
        assert_eq!(json["location"], "Road 7, Dhanmondi");
        assert_eq!(json["locationAccuracy"], 15.0);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["upvotes"], 0);
        assert_eq!(json["timestamp"], r.draft.created_at.timestamp_millis());
    }

    #[test]
    fn test_issue_document_without_photo_or_location() {
        let r = report(false);
        let doc = IssueDocument::from_report(&r, &RemoteAsset::NoPhoto);

        assert!(doc.image_url.is_empty());
        assert_eq!(doc.latitude, None);
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("latitude").is_none());
    }

    fn transition() -> impl Strategy<Value = Transition> {
        prop_oneof![
            Just(Transition::StartUpload),
            "[a-z]{1,8}".prop_map(|s| Transition::UploadSucceeded {
                url: format!("https://cdn/{s}")
            }),
            Just(Transition::UploadFailed),
            Just(Transition::StartPersist),
            "[a-z]{1,8}".prop_map(|remote_id| Transition::PersistSucceeded { remote_id }),
            Just(Transition::PersistFailed),
            Just(Transition::Fail(FailureReason::Permanent { message: "nope".into() })),
            Just(Transition::Restore),
        ]
    }

    proptest! {
        #[test]
        fn asset_url_present_exactly_in_uploaded_states(
            events in prop::collection::vec(transition(), 0..40)
        ) {
            let mut r = report(true);
            for event in events {
                if let Some(next) = r.state.apply(event) {
                    prop_assert!(r.state.can_transition_to(&next));
                    r.state = next;
                }
                let uploaded = matches!(
                    r.state,
                    ReportState::AssetUploaded { .. }
                        | ReportState::Persisting { .. }
                        | ReportState::Committed { .. }
                );
                prop_assert_eq!(r.remote_asset_url().is_some(), uploaded);
            }
        }
    }
}
