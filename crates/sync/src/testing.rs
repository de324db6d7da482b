//! In-memory remote fakes with scripted failures and optional gates.

use crate::error::RemoteError;
use crate::model::IssueDocument;
use crate::ports::{DocumentStore, ObjectStorage};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Minimal JPEG header, enough for type detection
pub(crate) fn write_jpeg(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F']).unwrap();
    path
}

/// Holds calls until they are cancelled, and reports when one is waiting
#[derive(Default)]
pub(crate) struct Gate {
    entered: Notify,
}

impl Gate {
    /// Wait until a call has reached the gate
    pub(crate) async fn entered(&self) {
        self.entered.notified().await;
    }

    async fn pass(&self) {
        self.entered.notify_one();
        std::future::pending::<()>().await;
    }
}

#[derive(Default)]
struct Script {
    failures: VecDeque<RemoteError>,
    delay: Option<Duration>,
}

#[derive(Default)]
pub(crate) struct ScriptedStorage {
    script: Mutex<Script>,
    objects: Mutex<BTreeMap<String, String>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Option<Arc<Gate>>,
    panics: bool,
}

impl ScriptedStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every upload panics, like an adapter bug would
    pub(crate) fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::default()
        }
    }

    pub(crate) fn gated() -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        let storage = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (storage, gate)
    }

    pub(crate) fn fail_next(&self, err: RemoteError) {
        self.script.lock().unwrap().failures.push_back(err);
    }

    pub(crate) fn with_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Stored object keys
    pub(crate) fn objects(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub(crate) fn last_mime(&self) -> Option<String> {
        self.objects.lock().unwrap().values().last().cloned()
    }
}

#[async_trait]
impl ObjectStorage for ScriptedStorage {
    async fn upload(&self, _bytes: Vec<u8>, key: &str, mime: &str) -> Result<String, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!self.panics, "storage adapter bug");
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let (failure, delay) = {
            let mut script = self.script.lock().unwrap();
            (script.failures.pop_front(), script.delay)
        };
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = failure {
            return Err(err);
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), mime.to_string());
        Ok(format!("https://cdn.test/{key}"))
    }
}

#[derive(Default)]
pub(crate) struct ScriptedDocuments {
    failures: Mutex<VecDeque<RemoteError>>,
    documents: Mutex<BTreeMap<String, IssueDocument>>,
    calls: AtomicUsize,
    gate: Option<Arc<Gate>>,
}

impl ScriptedDocuments {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn gated() -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        let docs = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (docs, gate)
    }

    pub(crate) fn fail_next(&self, err: RemoteError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn documents(&self) -> BTreeMap<String, IssueDocument> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for ScriptedDocuments {
    async fn write(&self, id: &str, document: &IssueDocument) -> Result<String, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.failures.lock().unwrap().pop_front();
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        if let Some(err) = failure {
            return Err(err);
        }

        // Create-if-absent: a repeated write keeps the first document
        self.documents
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_insert_with(|| document.clone());
        // Document id, as the Firestore adapter reports it
        Ok(id.to_string())
    }
}
