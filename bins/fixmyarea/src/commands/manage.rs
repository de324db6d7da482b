//! `retry`, `discard` and `delete`
//!
//! These act on the store directly and need its lock, so they are refused
//! while a `sync` process owns the queue.

use super::Context;
use crate::Format;
use anyhow::Result;
use fixmyarea_cli::output::Status;
use fixmyarea_sync::{ReportId, SyncError};
use serde_json::json;

pub fn retry(ctx: &Context, id: ReportId, format: Format) -> Result<()> {
    ctx.store()?.restore_failed(id)?;
    done(format, id, "requeued", &format!("Report {id} moved back into the queue"));
    Ok(())
}

pub fn discard(ctx: &Context, id: ReportId, format: Format) -> Result<()> {
    ctx.store()?.discard_failed(id)?;
    done(format, id, "discarded", &format!("Report {id} discarded"));
    Ok(())
}

pub fn delete(ctx: &Context, id: ReportId, format: Format) -> Result<()> {
    let store = ctx.store()?;
    match store.remove(id) {
        Ok(_) => {}
        Err(SyncError::NotFound(_)) => {
            store.discard_failed(id)?;
        }
        Err(e) => return Err(e.into()),
    }
    done(format, id, "deleted", &format!("Report {id} deleted"));
    Ok(())
}

fn done(format: Format, id: ReportId, action: &str, message: &str) {
    match format {
        Format::Json => println!("{}", json!({ "id": id, "action": action })),
        Format::Text => Status::success(message),
    }
}
