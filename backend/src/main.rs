//! Media indexer - scans source folders, matches files against TMDB,
//! transcodes them and keeps the catalog in SQLite.

use std::sync::Arc;

use media_indexer::cli::{CliOptions, RunMode};
use media_indexer::config::Config;
use media_indexer::db::Database;
use media_indexer::jobs;
use media_indexer::media::{FfmpegTranscoder, FfprobeProber};
use media_indexer::services::{
    CleanupQueue, Indexer, JobController, ObjectStorage, Pipeline, PipelineConfig,
    S3ObjectStorage, ScanReport, TmdbClient, logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    logging::init(config.log_file_path.as_deref())?;
    let options = CliOptions::from_args();

    tracing::info!(mode = ?options.run_mode, "Starting media indexer");

    let db = Database::connect(&config.database_url).await?;

    let tmdb = TmdbClient::new(
        config.tmdb_api_key.clone().unwrap_or_default(),
        config.tmdb_language.clone(),
    )?;
    if !tmdb.has_api_key() {
        tracing::warn!("TMDB_API_KEY is not set; every lookup will fail");
    }

    let storage: Option<Arc<dyn ObjectStorage>> = match config.s3.clone() {
        Some(s3) => Some(Arc::new(S3ObjectStorage::new(s3).await?)),
        None => {
            tracing::info!("Object storage not configured; transcoded output stays local");
            None
        }
    };

    let jobs = Arc::new(JobController::new());
    let cleanup = Arc::new(CleanupQueue::new(
        config.cleanup_workers,
        storage,
        jobs.clone(),
    ));
    let indexer = Indexer::new(
        db,
        Arc::new(FfprobeProber::new(config.ffprobe_path.clone(), config.probe_timeout)),
        Arc::new(FfmpegTranscoder::new(
            config.ffmpeg_path.clone(),
            config.transcode_crf,
            config.transcode_scale.clone(),
        )),
        cleanup,
        jobs.clone(),
    );

    let mut pipeline_config = PipelineConfig::new(
        &config.movie_source_folder,
        &config.movie_target_folder,
        &config.tv_source_folder,
        &config.tv_target_folder,
    );
    pipeline_config.resolver_workers = config.resolver_workers;
    let pipeline = Arc::new(Pipeline::new(pipeline_config, Arc::new(tmdb), indexer, jobs));

    match options.run_mode {
        RunMode::ScanMovies => {
            let report = pipeline.scan_movies_now().await?;
            pipeline.wait_for_cleanup().await;
            log_report("movies", report);
        }
        RunMode::ScanTv => {
            let report = pipeline.scan_tv_now().await?;
            pipeline.wait_for_cleanup().await;
            log_report("tv", report);
        }
        RunMode::Serve => {
            let scheduler = match config.scan_cron.as_deref() {
                Some(cron) => jobs::start_scheduler(cron, pipeline.clone()).await?,
                None => {
                    tracing::warn!("SCAN_CRON is not set; no scans are scheduled");
                    None
                }
            };

            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");

            if let Some(mut scheduler) = scheduler {
                scheduler.shutdown().await?;
            }
            pipeline.wait_for_cleanup().await;
        }
    }

    Ok(())
}

fn log_report(library: &str, report: ScanReport) {
    tracing::info!(
        library,
        discovered = report.discovered,
        matched = report.matched,
        indexed = report.indexed,
        failed = report.failed,
        "Scan complete"
    );
}
