//! `sync` - drain the queue against the remote services

use super::Context;
use crate::Format;
use anyhow::Result;
use fixmyarea_api_client::ApiClient;
use fixmyarea_cli::output::{Status, counts_summary, format_duration};
use fixmyarea_cli::progress;
use fixmyarea_sync::{SyncCoordinator, SyncEngine, SyncEvent, SyncHandle};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub async fn run(ctx: &Context, watch: bool, now: bool, format: Format) -> Result<()> {
    let store = ctx.store()?;
    let client = ApiClient::new()?;
    let engine = SyncEngine::new(
        store.clone(),
        Arc::new(client.cloudinary()?),
        Arc::new(client.firestore()?),
        &ctx.config.app,
    );

    let handle = SyncCoordinator::spawn(Arc::new(engine), &ctx.config.app.sync);
    let events = handle.subscribe();
    if now {
        handle.reconnect().await?;
    }

    let started = Instant::now();
    let result = if watch {
        watch_events(events, format).await
    } else {
        drain(&handle, events, store.counts().queued() as u64, format).await
    };
    handle.shutdown().await?;
    result?;

    let counts = store.counts();
    match format {
        Format::Json => println!(
            "{}",
            serde_json::json!({
                "counts": counts,
                "metrics": fixmyarea_telemetry::metrics().export_json(),
            })
        ),
        Format::Text => {
            Status::info(&format!(
                "{} ({})",
                counts_summary(&counts),
                format_duration(started.elapsed())
            ));
        }
    }
    Ok(())
}

/// Run until the queue has nothing due, showing progress
async fn drain(
    handle: &SyncHandle,
    mut events: broadcast::Receiver<SyncEvent>,
    total: u64,
    format: Format,
) -> Result<()> {
    let bar = (format == Format::Text && total > 0).then(|| progress::sync_progress(total));

    let idle = handle.wait_idle();
    tokio::pin!(idle);
    loop {
        tokio::select! {
            result = &mut idle => {
                if let Some(bar) = &bar {
                    progress::finish_success(bar, "queue drained");
                }
                result?;
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(bar) = &bar {
                        if matches!(event, SyncEvent::Committed { .. } | SyncEvent::Failed { .. }) {
                            bar.inc(1);
                        }
                        bar.set_message(describe(&event));
                    } else if format == Format::Json {
                        print_json(&event)?;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed sync events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    if let Some(bar) = &bar {
                        progress::finish_error(bar, "coordinator stopped");
                    }
                    return Ok(());
                }
            },
        }
    }
}

/// Print events until Ctrl-C; backed-off reports are retried as they come due
async fn watch_events(
    mut events: broadcast::Receiver<SyncEvent>,
    format: Format,
) -> Result<()> {
    if format == Format::Text {
        Status::info("Watching the queue, Ctrl-C to stop");
    }
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping sync");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => match format {
                    Format::Json => print_json(&event)?,
                    Format::Text => print_event(&event),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed sync events");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}

fn describe(event: &SyncEvent) -> String {
    match event {
        SyncEvent::Started { id, attempt } => format!("{id}: attempt {attempt}"),
        SyncEvent::Committed { id, .. } => format!("{id}: committed"),
        SyncEvent::RetryScheduled { id, error, .. } => format!("{id}: will retry ({error})"),
        SyncEvent::Failed { id, reason } => format!("{id}: failed ({reason})"),
        SyncEvent::Cancelled { id } => format!("{id}: cancelled"),
    }
}

fn print_event(event: &SyncEvent) {
    match event {
        SyncEvent::Started { .. } => {}
        SyncEvent::Committed { .. } => Status::success(&describe(event)),
        SyncEvent::RetryScheduled { .. } | SyncEvent::Cancelled { .. } => {
            Status::warning(&describe(event));
        }
        SyncEvent::Failed { .. } => Status::error(&describe(event)),
    }
}

fn print_json(event: &SyncEvent) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
