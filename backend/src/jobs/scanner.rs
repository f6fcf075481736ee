//! Scheduled library scan

use std::sync::Arc;

use tracing::{error, info};

use crate::services::{Pipeline, ScanError, ScanReport};

/// Run the movie pass then the TV pass. A pass whose job slot is taken is skipped.
pub async fn run_scan(pipeline: Arc<Pipeline>) {
    report("movies", &pipeline, pipeline.scan_movies_now().await);
    report("tv", &pipeline, pipeline.scan_tv_now().await);
}

fn report(library: &str, pipeline: &Pipeline, result: Result<ScanReport, ScanError>) {
    match result {
        Ok(report) => info!(
            library,
            discovered = report.discovered,
            indexed = report.indexed,
            failed = report.failed,
            "Scheduled scan completed"
        ),
        Err(ScanError::Busy(e)) => info!(library, reason = %e, "Scheduled scan skipped"),
        Err(e) => {
            error!(library, error = %e, "Scheduled scan failed");
            pipeline.jobs().append(e.to_string());
        }
    }
}
