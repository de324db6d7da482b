//! Terminal output utilities
//!
//! Provides consistent formatting for CLI output.

use chrono::{DateTime, Utc};
use fixmyarea_sync::{QueuedReport, ReportState, StoreCounts};
use owo_colors::OwoColorize;

/// Status message helpers
pub struct Status;

impl Status {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Print a warning message
    pub fn warning(message: &str) {
        eprintln!("{} {}", "⚠".yellow(), message);
    }

    /// Print an info message
    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue(), message);
    }

    /// Print a header
    pub fn header(message: &str) {
        println!();
        println!("{}", message.bold());
        println!("{}", "─".repeat(message.chars().count()));
    }
}

/// Colored, fixed-width label for a lifecycle state
pub fn state_badge(state: &ReportState) -> String {
    let label = format!("{:<14}", state.name());
    match state {
        ReportState::Pending => label.dimmed().to_string(),
        ReportState::UploadingAsset | ReportState::Persisting { .. } => label.cyan().to_string(),
        ReportState::AssetUploaded { .. } => label.blue().to_string(),
        ReportState::Committed { .. } => label.green().to_string(),
        ReportState::Failed { .. } => label.red().to_string(),
    }
}

/// One status line for a queued or archived report
pub fn report_line(report: &QueuedReport, now: DateTime<Utc>) -> String {
    let mut line = format!(
        "{} {}  {}",
        state_badge(&report.state),
        report.id,
        truncate(report.draft.title.as_deref().unwrap_or(&report.draft.description), 40),
    );

    if report.attempt_count > 0 {
        line.push_str(&format!(
            "  {}",
            format_count(report.attempt_count as usize, "attempt", "attempts").dimmed()
        ));
    }
    if let Some(at) = report.next_retry_at.filter(|at| *at > now) {
        let wait = (at - now).to_std().unwrap_or_default();
        line.push_str(&format!("  {}", format!("retry in {}", format_duration(wait)).yellow()));
    }
    if let ReportState::Failed { reason } = &report.state {
        line.push_str(&format!("\n    {}", reason.to_string().red()));
    } else if let Some(error) = &report.last_error {
        line.push_str(&format!("\n    {}", error.dimmed()));
    }
    line
}

/// Summary of store counters
pub fn counts_summary(counts: &StoreCounts) -> String {
    let mut parts = vec![format_count(counts.queued(), "report queued", "reports queued")];
    if counts.backing_off > 0 {
        parts.push(format!("{} backing off", counts.backing_off));
    }
    if counts.failed > 0 {
        parts.push(format!("{} failed", counts.failed));
    }
    parts.join(", ")
}

/// Cut `text` to at most `max` characters, marking the cut
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}

/// Format a duration for display
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs_f32();
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        let mins = (secs / 60.0).floor();
        let remaining_secs = secs % 60.0;
        format!("{mins}m {remaining_secs:.0}s")
    }
}

/// Format a count with singular/plural
pub fn format_count(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}
