//! `submit` - validate a report and queue it locally

use super::Context;
use crate::Format;
use anyhow::Result;
use chrono::Utc;
use clap::Args;
use fixmyarea_cli::output::Status;
use fixmyarea_geo::{
    CapturePolicy, Coordinate, GeoPoint, LocationCapturer, LocationFix, StaticLocationProvider,
};
use fixmyarea_sync::submitter::validate;
use fixmyarea_sync::{Identity, ReportDraft, ReportSubmitter};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// What is wrong
    pub description: String,

    /// Issue category (road, water, electricity, sanitation, other)
    #[arg(short, long)]
    pub category: String,

    /// Short headline
    #[arg(short, long)]
    pub title: Option<String>,

    /// Photo of the issue
    #[arg(short, long)]
    pub photo: Option<PathBuf>,

    /// Street address or landmark
    #[arg(short, long)]
    pub address: Option<String>,

    /// Latitude of the issue
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Longitude of the issue
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Accuracy radius in meters when the position comes from a device fix
    #[arg(long, requires = "lat")]
    pub accuracy: Option<f64>,

    /// Reporter identity
    #[arg(short, long, env = "FIXMYAREA_REPORTER")]
    pub reporter: String,
}

pub async fn run(ctx: &Context, args: SubmitArgs, format: Format) -> Result<()> {
    let mut draft = ReportDraft::new(args.description, args.category);
    if let Some(title) = args.title {
        draft = draft.with_title(title);
    }
    if let Some(photo) = args.photo {
        // the queue outlives the working directory
        draft = draft.with_photo(std::path::absolute(&photo).unwrap_or(photo));
    }
    if let Some(address) = args.address {
        draft = draft.with_address(address);
    }

    let mut submitter = ReportSubmitter::new(ctx.shared_store()?);
    if let (Some(lat), Some(lon)) = (args.lat, args.lon) {
        let coordinate = Coordinate::new(lat, lon);
        match args.accuracy {
            // a device reading goes through the capture policy
            Some(accuracy_m) => {
                // typed-in values get the same checks as an exact point
                validate(
                    &draft
                        .clone()
                        .with_location(GeoPoint::with_accuracy(coordinate, accuracy_m)),
                )?;
                let fix = LocationFix {
                    coordinate,
                    accuracy_m,
                    captured_at: Utc::now(),
                };
                let capturer = LocationCapturer::new(
                    Arc::new(StaticLocationProvider::new(Some(fix))),
                    CapturePolicy::from(&ctx.config.app.location),
                );
                submitter = submitter.with_capturer(Arc::new(capturer));
            }
            None => draft = draft.with_location(GeoPoint::exact(coordinate)),
        }
    }

    let reporter = Identity::new(args.reporter);
    let id = submitter.submit_with_location(&reporter, draft).await?;

    match format {
        Format::Json => println!("{}", serde_json::json!({ "id": id, "state": "pending" })),
        Format::Text => {
            Status::success(&format!("Report {id} queued"));
            Status::info("Run `fixmyarea sync` to upload it");
        }
    }
    Ok(())
}
