//! `status` - what is queued, backing off or failed

use super::Context;
use crate::Format;
use anyhow::Result;
use fixmyarea_cli::output::{Status, counts_summary, report_line};
use serde_json::json;

pub fn run(ctx: &Context, format: Format) -> Result<()> {
    let store = ctx.shared_store()?;
    let queue = store.list_queue();
    let failed = store.list_failed();
    let counts = store.counts();

    if format == Format::Json {
        let output = json!({
            "counts": counts,
            "queue": queue,
            "failed": failed,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let now = store.clock().now();

    Status::header("Queue");
    if queue.is_empty() {
        println!("  nothing queued");
    }
    for report in &queue {
        println!("  {}", report_line(report, now));
    }

    if !failed.is_empty() {
        Status::header("Failed");
        for report in &failed {
            println!("  {}", report_line(report, now));
        }
        Status::info("`fixmyarea retry <id>` requeues a report, `fixmyarea discard <id>` drops it");
    }

    println!();
    println!("{}", counts_summary(&counts));
    Ok(())
}
