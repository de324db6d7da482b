//! Durable on-device report queue.
//!
//! Layout under the store root:
//!
//! ```text
//! queue/<id>.json    reports still being synced
//! failed/<id>.json   archived reports awaiting manual retry or discard
//! ```
//!
//! Every write goes to a temp file in the target directory, is fsynced and
//! then renamed over the record, so a crash leaves either the old or the new
//! version on disk.
//!
//! [`LocalReportStore::open`] takes an exclusive lock on the directory: one
//! process owns every existing record, and within it an internal mutex
//! serializes mutations. [`LocalReportStore::open_shared`] takes no lock and
//! may only read and enqueue new reports.

use crate::error::{Result, SyncError};
use crate::model::{FailureReason, Identity, QueuedReport, ReportDraft, ReportId, ReportState};
use fixmyarea_core::clock::{Clock, SystemClock};
use fs4::fs_std::FileExt;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

const QUEUE_DIR: &str = "queue";
const FAILED_DIR: &str = "failed";
const TEMP_PREFIX: &str = ".tmp-";
const CORRUPT_SUFFIX: &str = ".corrupt";
const LOCK_FILE: &str = ".lock";

/// How a store handle may use its directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Holds the directory lock; may change any record and recovers on open
    Exclusive,
    /// No lock; reads and enqueues only
    Shared,
}

/// Per-state record counts for status displays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub pending: usize,
    pub uploading: usize,
    pub asset_uploaded: usize,
    pub persisting: usize,
    /// Queued reports waiting out a backoff delay
    pub backing_off: usize,
    pub failed: usize,
}

impl StoreCounts {
    /// Reports still to be synced
    pub fn queued(&self) -> usize {
        self.pending + self.uploading + self.asset_uploaded + self.persisting
    }
}

#[derive(Default)]
struct Inner {
    queue: HashMap<ReportId, QueuedReport>,
    failed: HashMap<ReportId, QueuedReport>,
    next_seq: u64,
}

/// File-backed report queue
pub struct LocalReportStore {
    queue_dir: PathBuf,
    failed_dir: PathBuf,
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    access: Access,
    // Closing the file releases the lock.
    _lock: Option<File>,
}

impl std::fmt::Debug for LocalReportStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalReportStore")
            .field("queue_dir", &self.queue_dir)
            .field("failed_dir", &self.failed_dir)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

impl LocalReportStore {
    /// Open (or create) a store rooted at `dir` and lock it.
    ///
    /// Fails with [`SyncError::StoreLocked`] while another process holds it.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_clock(dir, Arc::new(SystemClock))
    }

    /// Like [`open`](Self::open), with an explicit clock for timestamps
    pub fn open_with_clock(dir: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::open_as(dir.as_ref(), clock, Access::Exclusive)
    }

    /// Open without the lock, for status views and new submissions
    pub fn open_shared(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_as(dir.as_ref(), Arc::new(SystemClock), Access::Shared)
    }

    fn open_as(root: &Path, clock: Arc<dyn Clock>, access: Access) -> Result<Self> {
        let queue_dir = root.join(QUEUE_DIR);
        let failed_dir = root.join(FAILED_DIR);
        fs::create_dir_all(&queue_dir)?;
        fs::create_dir_all(&failed_dir)?;

        let lock = match access {
            Access::Exclusive => Some(lock_dir(root)?),
            Access::Shared => None,
        };
        // Only the lock holder may clean up; a shared reader would race its writes.
        let recover = access == Access::Exclusive;

        let mut queue = load_dir(&queue_dir, recover)?;
        let failed = load_dir(&failed_dir, recover)?;

        // An interrupted archive move leaves the record in both places.
        for id in failed.keys() {
            if queue.remove(id).is_some() && recover {
                warn!(report_id = %id, "Record found in queue and archive, keeping archived copy");
                remove_if_exists(&record_path(&queue_dir, *id))?;
            }
        }

        let next_seq = queue
            .values()
            .chain(failed.values())
            .map(|r| r.seq)
            .max()
            .map_or(1, |seq| seq + 1);

        info!(
            dir = %root.display(),
            queued = queue.len(),
            failed = failed.len(),
            ?access,
            "Opened report store"
        );

        Ok(Self {
            queue_dir,
            failed_dir,
            inner: Mutex::new(Inner {
                queue,
                failed,
                next_seq,
            }),
            clock,
            access,
            _lock: lock,
        })
    }

    /// Whether this handle holds the directory lock
    pub fn access(&self) -> Access {
        self.access
    }

    /// Clock used for timestamps and due checks
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Persist a new report in `Pending` and return its id
    pub fn enqueue(&self, reporter: Identity, draft: ReportDraft) -> Result<ReportId> {
        let mut inner = self.lock();
        let id = ReportId::new();
        let report = QueuedReport::new(id, inner.next_seq, reporter, draft, self.clock.now());

        write_atomic(&self.queue_dir, &report)?;
        inner.next_seq += 1;
        inner.queue.insert(id, report);

        debug!(report_id = %id, "Enqueued report");
        Ok(id)
    }

    /// Non-terminal queued reports in insertion order
    pub fn list_pending(&self) -> Vec<QueuedReport> {
        let inner = self.lock();
        sorted(inner.queue.values().filter(|r| !r.is_terminal()))
    }

    /// Every record in the queue, terminal ones included
    pub fn list_queue(&self) -> Vec<QueuedReport> {
        sorted(self.lock().queue.values())
    }

    /// Archived reports in insertion order
    pub fn list_failed(&self) -> Vec<QueuedReport> {
        sorted(self.lock().failed.values())
    }

    /// Look a report up in the queue or the archive
    pub fn get(&self, id: ReportId) -> Result<QueuedReport> {
        let mut inner = self.lock();
        self.forget_if_gone(&mut inner, id)?;
        inner
            .queue
            .get(&id)
            .or_else(|| inner.failed.get(&id))
            .cloned()
            .ok_or(SyncError::NotFound(id))
    }

    /// True if `id` is in the failed archive
    pub fn is_archived(&self, id: ReportId) -> bool {
        self.lock().failed.contains_key(&id)
    }

    /// Apply `f` to a copy of a queued report and write the result.
    ///
    /// The id, sequence number and draft are fixed; a state change must be a
    /// legal lifecycle transition.
    pub fn update<F>(&self, id: ReportId, f: F) -> Result<QueuedReport>
    where
        F: FnOnce(&mut QueuedReport),
    {
        self.writable("update")?;
        let mut inner = self.lock();
        self.forget_if_gone(&mut inner, id)?;
        let current = inner.queue.get(&id).ok_or(SyncError::NotFound(id))?;

        let mut next = current.clone();
        f(&mut next);
        next.id = current.id;
        next.seq = current.seq;
        next.reporter = current.reporter.clone();
        next.draft = current.draft.clone();
        next.created_at = current.created_at;

        if !current.state.can_transition_to(&next.state) {
            return Err(SyncError::InvalidTransition {
                id,
                from: current.state.name(),
                to: next.state.name(),
            });
        }
        next.updated_at = self.clock.now();

        write_atomic(&self.queue_dir, &next)?;
        inner.queue.insert(id, next.clone());
        Ok(next)
    }

    /// Delete a report from the queue
    pub fn remove(&self, id: ReportId) -> Result<QueuedReport> {
        self.writable("remove")?;
        let mut inner = self.lock();
        self.forget_if_gone(&mut inner, id)?;
        if !inner.queue.contains_key(&id) {
            return Err(SyncError::NotFound(id));
        }
        remove_if_exists(&record_path(&self.queue_dir, id))?;
        inner.queue.remove(&id).ok_or(SyncError::NotFound(id))
    }

    /// Move a queued report into the failed archive
    pub fn archive_failed(&self, id: ReportId, reason: FailureReason) -> Result<QueuedReport> {
        self.writable("archive")?;
        let mut inner = self.lock();
        self.forget_if_gone(&mut inner, id)?;
        let current = inner.queue.get(&id).ok_or(SyncError::NotFound(id))?;

        let next_state = ReportState::Failed {
            reason: reason.clone(),
        };
        if !current.state.can_transition_to(&next_state) {
            return Err(SyncError::InvalidTransition {
                id,
                from: current.state.name(),
                to: next_state.name(),
            });
        }

        let mut archived = current.clone();
        archived.state = next_state;
        archived.last_error = Some(reason.message().to_string());
        archived.next_retry_at = None;
        archived.updated_at = self.clock.now();

        // Archive first: a crash in between leaves a duplicate that open() resolves.
        write_atomic(&self.failed_dir, &archived)?;
        remove_if_exists(&record_path(&self.queue_dir, id))?;
        inner.queue.remove(&id);
        inner.failed.insert(id, archived.clone());

        warn!(report_id = %id, reason = %reason, "Report moved to failed archive");
        Ok(archived)
    }

    /// Put an archived report back in the queue with a fresh attempt budget
    pub fn restore_failed(&self, id: ReportId) -> Result<QueuedReport> {
        self.writable("restore")?;
        let mut inner = self.lock();
        let archived = inner.failed.get(&id).ok_or(SyncError::NotFound(id))?;

        let mut restored = archived.clone();
        restored.state = ReportState::Pending;
        restored.attempt_count = 0;
        restored.last_error = None;
        restored.next_retry_at = None;
        restored.updated_at = self.clock.now();

        write_atomic(&self.queue_dir, &restored)?;
        remove_if_exists(&record_path(&self.failed_dir, id))?;
        inner.failed.remove(&id);
        inner.queue.insert(id, restored.clone());

        info!(report_id = %id, "Restored failed report");
        Ok(restored)
    }

    /// Permanently drop an archived report
    pub fn discard_failed(&self, id: ReportId) -> Result<QueuedReport> {
        self.writable("discard")?;
        let mut inner = self.lock();
        if !inner.failed.contains_key(&id) {
            return Err(SyncError::NotFound(id));
        }
        remove_if_exists(&record_path(&self.failed_dir, id))?;
        info!(report_id = %id, "Discarded failed report");
        inner.failed.remove(&id).ok_or(SyncError::NotFound(id))
    }

    /// Make every queued report due now. Returns how many were waiting.
    pub fn clear_backoff(&self) -> Result<usize> {
        self.writable("clear backoff")?;
        let mut inner = self.lock();
        let now = self.clock.now();
        let mut cleared = 0;

        for report in inner.queue.values_mut() {
            if report.next_retry_at.is_none() {
                continue;
            }
            let mut next = report.clone();
            next.next_retry_at = None;
            next.updated_at = now;
            write_atomic(&self.queue_dir, &next)?;
            *report = next;
            cleared += 1;
        }

        Ok(cleared)
    }

    /// Record counts by state
    pub fn counts(&self) -> StoreCounts {
        let inner = self.lock();
        let now = self.clock.now();
        let mut counts = StoreCounts {
            failed: inner.failed.len(),
            ..StoreCounts::default()
        };

        for report in inner.queue.values() {
            match report.state {
                ReportState::Pending => counts.pending += 1,
                ReportState::UploadingAsset => counts.uploading += 1,
                ReportState::AssetUploaded { .. } => counts.asset_uploaded += 1,
                ReportState::Persisting { .. } => counts.persisting += 1,
                ReportState::Failed { .. } => counts.failed += 1,
                ReportState::Committed { .. } => {}
            }
            if !report.is_due(now) {
                counts.backing_off += 1;
            }
        }
        counts
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writable(&self, operation: &'static str) -> Result<()> {
        match self.access {
            Access::Exclusive => Ok(()),
            Access::Shared => Err(SyncError::ReadOnly(operation)),
        }
    }

    /// Drop a queued record whose file was removed outside this store
    fn forget_if_gone(&self, inner: &mut Inner, id: ReportId) -> Result<()> {
        if inner.queue.contains_key(&id) && !record_path(&self.queue_dir, id).try_exists()? {
            warn!(report_id = %id, "Queued record no longer on disk, dropping it");
            inner.queue.remove(&id);
        }
        Ok(())
    }
}

fn lock_dir(root: &Path) -> Result<File> {
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(root.join(LOCK_FILE))?;

    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => Ok(file),
        Err(e) if is_contended(&e) => Err(SyncError::StoreLocked(root.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}

// flock reports EWOULDBLOCK, LockFileEx reports ERROR_LOCK_VIOLATION (33).
fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock || (cfg!(windows) && err.raw_os_error() == Some(33))
}

fn sorted<'a>(reports: impl Iterator<Item = &'a QueuedReport>) -> Vec<QueuedReport> {
    let mut out: Vec<QueuedReport> = reports.cloned().collect();
    // Shared handles can enqueue with a sequence number the owner also used.
    out.sort_by_key(|r| (r.seq, r.created_at));
    out
}

fn record_path(dir: &Path, id: ReportId) -> PathBuf {
    dir.join(format!("{id}.json"))
}

fn write_atomic(dir: &Path, report: &QueuedReport) -> Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".json")
        .tempfile_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, report)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(record_path(dir, report.id))?;
    sync_dir(dir)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn load_dir(dir: &Path, recover: bool) -> Result<HashMap<ReportId, QueuedReport>> {
    let mut records = HashMap::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if name.starts_with(TEMP_PREFIX) {
            if recover {
                debug!(path = %path.display(), "Removing leftover temp file");
                remove_if_exists(&path)?;
            }
            continue;
        }
        if !name.ends_with(".json") {
            continue;
        }

        match read_record(&path) {
            Ok(report) => {
                records.insert(report.id, report);
            }
            Err(reason) if recover => quarantine(&path, &reason)?,
            Err(reason) => debug!(path = %path.display(), reason, "Skipping unreadable record"),
        }
    }

    Ok(records)
}

fn read_record(path: &Path) -> std::result::Result<QueuedReport, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let report: QueuedReport = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;

    let expected = path.file_stem().and_then(|s| s.to_str());
    if expected != Some(report.id.to_string().as_str()) {
        return Err(format!("record id {} does not match file name", report.id));
    }
    Ok(report)
}

fn quarantine(path: &Path, reason: &str) -> Result<()> {
    let mut target = path.as_os_str().to_owned();
    target.push(CORRUPT_SUFFIX);
    warn!(
        path = %path.display(),
        reason,
        "Unreadable report record, moving it aside"
    );
    fs::rename(path, PathBuf::from(target))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RemoteAsset;
    use fixmyarea_core::clock::ManualClock;
    use std::time::Duration;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> LocalReportStore {
        LocalReportStore::open(dir.path()).unwrap()
    }

    fn draft(text: &str) -> ReportDraft {
        ReportDraft::new(text, "road")
    }

    fn reporter() -> Identity {
        Identity::new("user-1")
    }

    #[test]
    fn test_enqueue_and_list_in_insertion_order() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let a = store.enqueue(reporter(), draft("a")).unwrap();
        let b = store.enqueue(reporter(), draft("b")).unwrap();
        let c = store.enqueue(reporter(), draft("c")).unwrap();

        let ids: Vec<_> = store.list_pending().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a, b, c]);
        assert_eq!(store.get(a).unwrap().state, ReportState::Pending);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = open(&dir);
            let id = store.enqueue(reporter(), draft("survives")).unwrap();
            store
                .update(id, |r| {
                    r.state = ReportState::UploadingAsset;
                    r.attempt_count = 1;
                })
                .unwrap();
            id
        };

        let store = open(&dir);
        let report = store.get(id).unwrap();
        assert_eq!(report.state, ReportState::UploadingAsset);
        assert_eq!(report.attempt_count, 1);

        let next = store.enqueue(reporter(), draft("after")).unwrap();
        assert!(store.get(next).unwrap().seq > report.seq);
    }

    #[test]
    fn test_update_rejects_illegal_transition() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let id = store.enqueue(reporter(), draft("x")).unwrap();

        let err = store
            .update(id, |r| {
                r.state = ReportState::Committed {
                    asset: RemoteAsset::NoPhoto,
                    remote_id: "r".into(),
                };
            })
            .unwrap_err();

        assert!(matches!(err, SyncError::InvalidTransition { from: "pending", .. }));
        assert_eq!(store.get(id).unwrap().state, ReportState::Pending);
    }

    #[test]
    fn test_update_cannot_change_draft() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let id = store.enqueue(reporter(), draft("original")).unwrap();

        let updated = store
            .update(id, |r| r.draft.description = "edited".into())
            .unwrap();
        assert_eq!(updated.draft.description, "original");
    }

    #[test]
    fn test_missing_id_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let ghost = ReportId::new();

        assert!(matches!(store.get(ghost), Err(SyncError::NotFound(_))));
        assert!(matches!(store.update(ghost, |_| {}), Err(SyncError::NotFound(_))));
        assert!(matches!(store.remove(ghost), Err(SyncError::NotFound(_))));
    }

    #[test]
    fn test_archive_restore_discard() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let id = store.enqueue(reporter(), draft("x")).unwrap();
        store.update(id, |r| r.attempt_count = 6).unwrap();

        let reason = FailureReason::RetriesExhausted {
            attempts: 6,
            message: "503".into(),
        };
        store.archive_failed(id, reason).unwrap();
        assert!(store.list_pending().is_empty());
        assert_eq!(store.list_failed().len(), 1);
        assert!(dir.path().join("failed").join(format!("{id}.json")).exists());
        assert!(!dir.path().join("queue").join(format!("{id}.json")).exists());

        let restored = store.restore_failed(id).unwrap();
        assert_eq!(restored.state, ReportState::Pending);
        assert_eq!(restored.attempt_count, 0);
        assert!(store.list_failed().is_empty());

        store
            .archive_failed(id, FailureReason::Permanent { message: "bad".into() })
            .unwrap();
        store.discard_failed(id).unwrap();
        assert!(matches!(store.get(id), Err(SyncError::NotFound(_))));
    }

    #[test]
    fn test_open_quarantines_corrupt_and_removes_temp_files() {
        let dir = TempDir::new().unwrap();
        let good = {
            let store = open(&dir);
            store.enqueue(reporter(), draft("good")).unwrap()
        };
        let queue = dir.path().join("queue");
        let bad_id = ReportId::new();
        fs::write(queue.join(format!("{bad_id}.json")), b"{ truncated").unwrap();
        fs::write(queue.join(".tmp-abc.json"), b"half written").unwrap();

        let store = open(&dir);

        assert_eq!(store.list_pending().len(), 1);
        assert!(store.get(good).is_ok());
        assert!(queue.join(format!("{bad_id}.json.corrupt")).exists());
        assert!(!queue.join(".tmp-abc.json").exists());
    }

    #[test]
    fn test_open_prefers_archived_duplicate() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = open(&dir);
            let id = store.enqueue(reporter(), draft("dup")).unwrap();
            let queued = dir.path().join("queue").join(format!("{id}.json"));
            let copy = fs::read(&queued).unwrap();
            store
                .archive_failed(id, FailureReason::Permanent { message: "x".into() })
                .unwrap();
            // Simulate a crash before the queue copy was removed
            fs::write(&queued, copy).unwrap();
            id
        };

        let store = open(&dir);
        assert!(store.list_pending().is_empty());
        assert!(matches!(store.get(id).unwrap().state, ReportState::Failed { .. }));
    }

    #[test]
    fn test_second_owner_is_refused_until_first_closes() {
        let dir = TempDir::new().unwrap();
        let owner = open(&dir);

        let err = LocalReportStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, SyncError::StoreLocked(_)));

        drop(owner);
        assert!(LocalReportStore::open(dir.path()).is_ok());
    }

    #[test]
    fn test_shared_handle_reads_and_enqueues_only() {
        let dir = TempDir::new().unwrap();
        let owner = open(&dir);
        let queued = owner.enqueue(reporter(), draft("owned")).unwrap();

        let shared = LocalReportStore::open_shared(dir.path()).unwrap();
        assert_eq!(shared.access(), Access::Shared);
        assert!(shared.get(queued).is_ok());
        let added = shared.enqueue(reporter(), draft("from elsewhere")).unwrap();

        assert!(matches!(shared.remove(queued), Err(SyncError::ReadOnly(_))));
        assert!(matches!(shared.clear_backoff(), Err(SyncError::ReadOnly(_))));
        assert!(dir.path().join("queue").join(format!("{queued}.json")).exists());

        drop(owner);
        let reopened = open(&dir);
        assert!(reopened.get(added).is_ok());
        assert_eq!(reopened.list_pending().len(), 2);
    }

    #[test]
    fn test_shared_open_leaves_temp_files_alone() {
        let dir = TempDir::new().unwrap();
        let _owner = open(&dir);
        let temp = dir.path().join("queue").join(".tmp-inflight.json");
        fs::write(&temp, b"being written").unwrap();

        let shared = LocalReportStore::open_shared(dir.path()).unwrap();
        assert!(shared.list_pending().is_empty());
        assert!(temp.exists());
    }

    #[test]
    fn test_record_removed_on_disk_is_not_written_back() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let id = store.enqueue(reporter(), draft("deleted elsewhere")).unwrap();
        let path = dir.path().join("queue").join(format!("{id}.json"));
        fs::remove_file(&path).unwrap();

        let err = store.update(id, |r| r.state = ReportState::UploadingAsset).unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
        assert!(!path.exists());
        assert!(matches!(store.get(id), Err(SyncError::NotFound(_))));
        assert!(store.list_pending().is_empty());
    }

    #[test]
    fn test_clear_backoff_and_counts() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let store = LocalReportStore::open_with_clock(dir.path(), clock.clone()).unwrap();

        let id = store.enqueue(reporter(), draft("x")).unwrap();
        let later = clock.now() + chrono::Duration::seconds(60);
        store.update(id, |r| r.next_retry_at = Some(later)).unwrap();
        store.enqueue(reporter(), draft("y")).unwrap();

        let counts = store.counts();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.backing_off, 1);
        assert_eq!(counts.queued(), 2);

        assert_eq!(store.clear_backoff().unwrap(), 1);
        assert_eq!(store.counts().backing_off, 0);

        clock.advance(Duration::from_secs(5));
        assert!(store.get(id).unwrap().is_due(clock.now()));
    }
}
