//! Background sync coordinator.
//!
//! A single task owns the in-flight table, so no report is ever processed by
//! two workers at once. Workers run [`SyncEngine::process`] under a semaphore
//! bounding concurrency; each gets a [`CancellationToken`] that `delete` and
//! `shutdown` trip.
//!
//! An attempt that ends in an error outside the report lifecycle (store I/O,
//! a panicking worker) is backed off here with the same retry policy and
//! attempt cap as remote failures.

use crate::engine::{Outcome, SyncEngine};
use crate::error::{Result, SyncError};
use crate::model::{FailureReason, ReportId};
use chrono::{DateTime, Utc};
use fixmyarea_core::config::SyncConfig;
use fixmyarea_core::retry::RetryConfig;
use fixmyarea_telemetry::{metrics, names};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Progress notifications
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    Started {
        id: ReportId,
        attempt: u32,
    },
    Committed {
        id: ReportId,
        remote_id: String,
        attempts: u32,
    },
    RetryScheduled {
        id: ReportId,
        attempt: u32,
        at: DateTime<Utc>,
        error: String,
    },
    Failed {
        id: ReportId,
        reason: FailureReason,
    },
    Cancelled {
        id: ReportId,
    },
}

type Reply = oneshot::Sender<Result<()>>;

enum Command {
    Trigger,
    Reconnect,
    Delete { id: ReportId, reply: Reply },
    RetryFailed { id: ReportId, reply: Reply },
    DiscardFailed { id: ReportId, reply: Reply },
    WaitIdle { reply: oneshot::Sender<()> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Cloneable handle to a running coordinator
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncHandle {
    /// Ask for a queue scan; never blocks
    pub fn trigger(&self) {
        // A full buffer already holds a pending wake-up.
        let _ = self.commands.try_send(Command::Trigger);
    }

    /// Connectivity is back: drop backoff waits and rescan
    pub async fn reconnect(&self) -> Result<()> {
        self.send(Command::Reconnect).await
    }

    /// Remove a report, cancelling its in-flight attempt first
    pub async fn delete(&self, id: ReportId) -> Result<()> {
        self.request(|reply| Command::Delete { id, reply }).await
    }

    /// Move an archived report back into the queue
    pub async fn retry_failed(&self, id: ReportId) -> Result<()> {
        self.request(|reply| Command::RetryFailed { id, reply }).await
    }

    /// Drop an archived report for good
    pub async fn discard_failed(&self, id: ReportId) -> Result<()> {
        self.request(|reply| Command::DiscardFailed { id, reply }).await
    }

    /// Resolves once nothing is in flight and nothing is due
    pub async fn wait_idle(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::WaitIdle { reply }).await?;
        rx.await.map_err(|_| SyncError::CoordinatorStopped)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Cancel in-flight work and stop the coordinator
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply }).await?;
        rx.await.map_err(|_| SyncError::CoordinatorStopped)
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::CoordinatorStopped)
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply)).await?;
        rx.await.map_err(|_| SyncError::CoordinatorStopped)?
    }
}

struct Finished {
    id: ReportId,
    result: Result<Outcome>,
}

/// Reports completion even if the worker unwinds
struct Completion {
    id: ReportId,
    done: mpsc::UnboundedSender<Finished>,
    result: Option<Result<Outcome>>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        let result = self
            .result
            .take()
            .unwrap_or_else(|| Err(SyncError::Transient("sync worker aborted".to_string())));
        let _ = self.done.send(Finished {
            id: self.id,
            result,
        });
    }
}

/// Consecutive errors for one report
struct Fault {
    errors: u32,
    /// `None` parks the report until reconnect or manual retry
    retry_at: Option<DateTime<Utc>>,
}

impl Fault {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.retry_at.is_some_and(|at| at <= now)
    }
}

/// Starts the background coordinator
pub struct SyncCoordinator {
    engine: Arc<SyncEngine>,
    retry: RetryConfig,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<SyncEvent>,
    semaphore: Arc<Semaphore>,
    poll_interval: Duration,
    in_flight: HashMap<ReportId, CancellationToken>,
    pending_deletes: HashMap<ReportId, Vec<Reply>>,
    faults: HashMap<ReportId, Fault>,
    idle_waiters: Vec<oneshot::Sender<()>>,
    workers: JoinSet<()>,
    done_tx: mpsc::UnboundedSender<Finished>,
    done_rx: mpsc::UnboundedReceiver<Finished>,
}

impl SyncCoordinator {
    /// Spawn the coordinator on the current tokio runtime
    pub fn spawn(engine: Arc<SyncEngine>, config: &SyncConfig) -> SyncHandle {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let coordinator = Self {
            retry: engine.retry().clone(),
            engine,
            commands,
            events: events.clone(),
            semaphore: Arc::new(Semaphore::new(config.workers.max(1))),
            poll_interval: config.poll_interval,
            in_flight: HashMap::new(),
            pending_deletes: HashMap::new(),
            faults: HashMap::new(),
            idle_waiters: Vec::new(),
            workers: JoinSet::new(),
            done_tx,
            done_rx,
        };
        tokio::spawn(coordinator.run());

        SyncHandle {
            commands: commands_tx,
            events,
        }
    }

    async fn run(mut self) {
        match self.engine.reconcile() {
            Ok(found) => debug!(?found, "Startup reconciliation done"),
            Err(e) => error!(error = %e, "Startup reconciliation failed"),
        }

        let shutdown_reply = loop {
            self.dispatch();
            if self.in_flight.is_empty() {
                for waiter in self.idle_waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }

            let wake = self.next_wake();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => break Some(reply),
                    Some(command) => self.handle(command),
                    None => break None,
                },
                Some(finished) = self.done_rx.recv() => self.finish(finished),
                Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Sync worker panicked");
                    }
                }
                () = tokio::time::sleep(wake) => {}
            }
        };

        self.stop().await;
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
        info!("Sync coordinator stopped");
    }

    /// Start workers for due reports, oldest first
    fn dispatch(&mut self) {
        let now = self.engine.clock().now();
        let pending = self.engine.store().list_pending();
        metrics().gauge(names::QUEUE_DEPTH, pending.len() as u64);

        for report in pending {
            let id = report.id;
            if self.in_flight.contains_key(&id) || self.pending_deletes.contains_key(&id) {
                continue;
            }
            if !report.is_due(now) || self.faults.get(&id).is_some_and(|f| !f.is_due(now)) {
                continue;
            }
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                break;
            };

            let token = CancellationToken::new();
            self.in_flight.insert(id, token.clone());
            self.emit(SyncEvent::Started {
                id,
                attempt: report.attempt_count + 1,
            });

            let engine = Arc::clone(&self.engine);
            let mut completion = Completion {
                id,
                done: self.done_tx.clone(),
                result: None,
            };
            self.workers.spawn(async move {
                let _permit = permit;
                completion.result = Some(engine.process(id, &token).await);
            });
        }
    }

    /// Sleep until the earliest backoff expires, bounded by the poll interval
    fn next_wake(&self) -> Duration {
        let now = self.engine.clock().now();
        self.engine
            .store()
            .list_pending()
            .iter()
            .filter_map(|r| r.next_retry_at)
            .chain(self.faults.values().filter_map(|f| f.retry_at))
            .filter(|at| *at > now)
            .filter_map(|at| (at - now).to_std().ok())
            .min()
            .map_or(self.poll_interval, |d| d.min(self.poll_interval))
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Trigger => {}
            Command::Reconnect => {
                self.faults.clear();
                match self.engine.store().clear_backoff() {
                    Ok(cleared) => info!(cleared, "Reconnected, retrying queued reports now"),
                    Err(e) => warn!(error = %e, "Failed to clear backoff"),
                }
            }
            Command::Delete { id, reply } => {
                if let Some(token) = self.in_flight.get(&id) {
                    debug!(report_id = %id, "Cancelling in-flight report for deletion");
                    token.cancel();
                    self.pending_deletes.entry(id).or_default().push(reply);
                } else {
                    self.faults.remove(&id);
                    let _ = reply.send(self.delete_now(id));
                }
            }
            Command::RetryFailed { id, reply } => {
                self.faults.remove(&id);
                let _ = reply.send(self.engine.store().restore_failed(id).map(drop));
            }
            Command::DiscardFailed { id, reply } => {
                let _ = reply.send(self.engine.store().discard_failed(id).map(drop));
            }
            Command::WaitIdle { reply } => self.idle_waiters.push(reply),
            Command::Shutdown { .. } => {}
        }
    }

    fn delete_now(&self, id: ReportId) -> Result<()> {
        let store = self.engine.store();
        match store.remove(id) {
            Err(SyncError::NotFound(_)) => store.discard_failed(id).map(drop),
            other => other.map(drop),
        }?;
        info!(report_id = %id, "Report deleted");
        Ok(())
    }

    fn finish(&mut self, finished: Finished) {
        let Finished { id, result } = finished;
        self.in_flight.remove(&id);

        match result {
            Ok(outcome) => {
                self.faults.remove(&id);
                if let Some(event) = event_for(id, outcome) {
                    self.emit(event);
                }
            }
            Err(SyncError::NotFound(_)) => {
                self.faults.remove(&id);
                debug!(report_id = %id, "Report left the queue during its attempt");
            }
            Err(e) => self.record_fault(id, &e),
        }

        if let Some(replies) = self.pending_deletes.remove(&id) {
            self.faults.remove(&id);
            // A commit can win the race with the cancellation; the report is gone either way.
            let result = match self.delete_now(id) {
                Err(SyncError::NotFound(_)) => Ok(()),
                other => other,
            };
            for reply in replies {
                let _ = reply.send(match &result {
                    Ok(()) => Ok(()),
                    Err(e) => Err(SyncError::Core(fixmyarea_core::Error::store(e.to_string()))),
                });
            }
        }
    }

    /// Back off a report whose attempt errored; archive it once the cap is hit
    fn record_fault(&mut self, id: ReportId, error: &SyncError) {
        let errors = self.faults.get(&id).map_or(0, |f| f.errors) + 1;

        if self.retry.is_exhausted(errors) {
            let reason = FailureReason::RetriesExhausted {
                attempts: errors,
                message: error.to_string(),
            };
            match self.engine.store().archive_failed(id, reason.clone()) {
                Ok(_) => {
                    self.faults.remove(&id);
                    metrics().increment(names::REPORTS_FAILED);
                    self.emit(SyncEvent::Failed { id, reason });
                }
                Err(e) => {
                    error!(report_id = %id, error = %e, "Cannot archive report, parking it until reconnect");
                    self.faults.insert(id, Fault { errors, retry_at: None });
                }
            }
            return;
        }

        let delay = self.retry.next_delay(errors);
        let retry_at = self.engine.clock().now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        warn!(
            report_id = %id,
            errors,
            delay_ms = delay.as_millis(),
            error = %error,
            "Sync attempt failed, backing off"
        );
        self.faults.insert(
            id,
            Fault {
                errors,
                retry_at: Some(retry_at),
            },
        );
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn stop(&mut self) {
        self.commands.close();
        for token in self.in_flight.values() {
            token.cancel();
        }
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Sync worker panicked");
            }
        }
        while let Ok(finished) = self.done_rx.try_recv() {
            self.finish(finished);
        }
    }
}

fn event_for(id: ReportId, outcome: Outcome) -> Option<SyncEvent> {
    match outcome {
        Outcome::Committed { remote_id, attempts } => Some(SyncEvent::Committed {
            id,
            remote_id,
            attempts,
        }),
        Outcome::RetryScheduled { attempt, at, error } => Some(SyncEvent::RetryScheduled {
            id,
            attempt,
            at,
            error,
        }),
        Outcome::Failed { reason } => Some(SyncEvent::Failed { id, reason }),
        Outcome::Cancelled => Some(SyncEvent::Cancelled { id }),
        Outcome::NotDue { .. } | Outcome::Archived => None,
    }
}
