//! Background job scheduling

pub mod scanner;

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::services::Pipeline;

/// Accept standard 5-field expressions by prefixing a seconds field
pub fn normalize_cron(expression: &str) -> String {
    let expression = expression.trim();
    if expression.split_whitespace().count() == 5 {
        format!("0 {}", expression)
    } else {
        expression.to_string()
    }
}

/// Initialize and start the scan scheduler.
///
/// Returns `Ok(None)` when the expression is invalid; scheduling stays off.
pub async fn start_scheduler(
    cron: &str,
    pipeline: Arc<Pipeline>,
) -> anyhow::Result<Option<JobScheduler>> {
    let schedule = normalize_cron(cron);

    let scan_job = match Job::new_async(schedule.as_str(), move |_uuid, _l| {
        let pipeline = pipeline.clone();
        Box::pin(async move {
            info!("Running scheduled scan");
            scanner::run_scan(pipeline).await;
        })
    }) {
        Ok(job) => job,
        Err(e) => {
            warn!(cron, error = %e, "Invalid scan schedule, scheduling disabled");
            return Ok(None);
        }
    };

    let scheduler = JobScheduler::new().await?;
    scheduler.add(scan_job).await?;
    scheduler.start().await?;

    info!(schedule = %schedule, "Job scheduler started");
    Ok(Some(scheduler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_cron() {
        assert_eq!(normalize_cron("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize_cron(" 0 0 3 * * * "), "0 0 3 * * *");
        assert_eq!(normalize_cron("@hourly"), "@hourly");
    }
}
