//! Scan and upload entry points
//!
//! A scan pass enumerates a source folder, resolves every candidate against
//! the metadata service and indexes the matches one by one. Every pass and
//! every upload runs under the process-wide job slot: the caller-facing
//! methods either start the work on a background task or fail immediately
//! with [`JobError::AlreadyRunning`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use super::indexer::Indexer;
use super::job::{JobController, JobError, JobLog};
use super::metadata::{MetadataMatch, MetadataProvider};
use super::resolver::{DEFAULT_RESOLVER_WORKERS, resolve_episodes, resolve_movies};
use super::tree::{build_movie_tree, build_tv_tree};

pub const SCAN_MOVIES_JOB: &str = "scan movies";
pub const SCAN_TV_JOB: &str = "scan tv";
pub const UPLOAD_MOVIE_JOB: &str = "upload movie";
pub const UPLOAD_TV_JOB: &str = "upload tv";

/// Errors that abort a whole pass
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("destination does not exist")]
    DestinationMissing(PathBuf),

    #[error("failed to enumerate source folder: {0:#}")]
    Enumeration(anyhow::Error),

    #[error(transparent)]
    Busy(#[from] JobError),
}

/// Counters of one finished pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Video files found in the source folder
    pub discovered: usize,
    /// Candidates the metadata service recognised
    pub matched: usize,
    pub indexed: usize,
    pub failed: usize,
}

/// Which half of the library a pass or upload targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Library {
    Movies,
    Tv,
}

/// A file received from a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// Source and destination folders plus resolver width
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub movie_source: PathBuf,
    pub movie_destination: PathBuf,
    pub tv_source: PathBuf,
    pub tv_destination: PathBuf,
    pub resolver_workers: usize,
}

impl PipelineConfig {
    pub fn new(
        movie_source: impl Into<PathBuf>,
        movie_destination: impl Into<PathBuf>,
        tv_source: impl Into<PathBuf>,
        tv_destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            movie_source: movie_source.into(),
            movie_destination: movie_destination.into(),
            tv_source: tv_source.into(),
            tv_destination: tv_destination.into(),
            resolver_workers: DEFAULT_RESOLVER_WORKERS,
        }
    }

    fn source(&self, library: Library) -> &Path {
        match library {
            Library::Movies => &self.movie_source,
            Library::Tv => &self.tv_source,
        }
    }

    fn destination(&self, library: Library) -> &Path {
        match library {
            Library::Movies => &self.movie_destination,
            Library::Tv => &self.tv_destination,
        }
    }
}

/// The ingestion pipeline shared by the CLI and the scheduler
pub struct Pipeline {
    config: PipelineConfig,
    provider: Arc<dyn MetadataProvider>,
    indexer: Indexer,
    jobs: Arc<JobController>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        provider: Arc<dyn MetadataProvider>,
        indexer: Indexer,
        jobs: Arc<JobController>,
    ) -> Self {
        Self {
            config,
            provider,
            indexer,
            jobs,
        }
    }

    /// Start a movie scan in the background
    pub fn scan_movies(self: &Arc<Self>) -> Result<(), JobError> {
        self.spawn_scan(Library::Movies, SCAN_MOVIES_JOB)
    }

    /// Start a TV scan in the background
    pub fn scan_tv(self: &Arc<Self>) -> Result<(), JobError> {
        self.spawn_scan(Library::Tv, SCAN_TV_JOB)
    }

    /// Run a movie scan to completion under the job slot
    pub async fn scan_movies_now(&self) -> Result<ScanReport, ScanError> {
        let _guard = self.jobs.try_start(SCAN_MOVIES_JOB)?;
        self.run_movie_scan().await
    }

    /// Run a TV scan to completion under the job slot
    pub async fn scan_tv_now(&self) -> Result<ScanReport, ScanError> {
        let _guard = self.jobs.try_start(SCAN_TV_JOB)?;
        self.run_tv_scan().await
    }

    /// Movie pass body. The caller is responsible for the job slot.
    pub async fn run_movie_scan(&self) -> Result<ScanReport, ScanError> {
        self.run_scan(Library::Movies).await
    }

    /// TV pass body. The caller is responsible for the job slot.
    pub async fn run_tv_scan(&self) -> Result<ScanReport, ScanError> {
        self.run_scan(Library::Tv).await
    }

    /// Store an uploaded movie file in the movie source folder
    pub fn upload_movie(self: &Arc<Self>, file: UploadedFile) -> Result<(), JobError> {
        self.spawn_upload(Library::Movies, UPLOAD_MOVIE_JOB, file)
    }

    /// Store an uploaded episode file in the TV source folder
    pub fn upload_tv(self: &Arc<Self>, file: UploadedFile) -> Result<(), JobError> {
        self.spawn_upload(Library::Tv, UPLOAD_TV_JOB, file)
    }

    /// Write `file` into the source folder of `library` under a sanitized name
    pub async fn save_upload(&self, library: Library, file: &UploadedFile) -> anyhow::Result<PathBuf> {
        let name = sanitize_filename::sanitize(&file.file_name);
        if name.trim().is_empty() {
            anyhow::bail!("Invalid file name '{}'", file.file_name);
        }

        let source = self.config.source(library);
        tokio::fs::create_dir_all(source)
            .await
            .with_context(|| format!("Failed to create {}", source.display()))?;

        let path = source.join(&name);
        tokio::fs::write(&path, &file.content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        self.jobs.append(format!("Uploaded {}", name));
        Ok(path)
    }

    pub fn job_name(&self) -> String {
        self.jobs.job_name()
    }

    pub fn snapshot(&self) -> Vec<JobLog> {
        self.jobs.snapshot()
    }

    pub fn drain(&self) -> Vec<JobLog> {
        self.jobs.drain()
    }

    pub fn is_running(&self) -> bool {
        self.jobs.is_running()
    }

    pub fn jobs(&self) -> &Arc<JobController> {
        &self.jobs
    }

    /// Wait for queued cleanup tasks (source deletion and uploads)
    pub async fn wait_for_cleanup(&self) {
        self.indexer.cleanup().wait_idle().await;
    }

    fn spawn_scan(self: &Arc<Self>, library: Library, name: &str) -> Result<(), JobError> {
        let guard = self.jobs.try_start(name)?;
        let pipeline = self.clone();

        tokio::spawn(async move {
            if let Err(e) = pipeline.run_scan(library).await {
                error!(job = %guard.name(), error = %e, "Scan failed");
                pipeline.jobs.append(e.to_string());
            }
            guard.release();
        });
        Ok(())
    }

    fn spawn_upload(
        self: &Arc<Self>,
        library: Library,
        name: &str,
        file: UploadedFile,
    ) -> Result<(), JobError> {
        let guard = self.jobs.try_start(name)?;
        let pipeline = self.clone();

        tokio::spawn(async move {
            if let Err(e) = pipeline.save_upload(library, &file).await {
                error!(job = %guard.name(), error = %e, "Upload failed");
                pipeline.jobs.append(format!("{:#}", e));
            }
            guard.release();
        });
        Ok(())
    }

    async fn run_scan(&self, library: Library) -> Result<ScanReport, ScanError> {
        let source = self.config.source(library);
        let destination = self.config.destination(library);

        if !destination.is_dir() {
            warn!(destination = %destination.display(), "Destination folder is missing");
            return Err(ScanError::DestinationMissing(destination.to_path_buf()));
        }

        let candidates = match library {
            Library::Movies => build_movie_tree(source),
            Library::Tv => build_tv_tree(source),
        }
        .map_err(ScanError::Enumeration)?;

        let mut report = ScanReport {
            discovered: candidates.len(),
            ..Default::default()
        };
        self.jobs
            .append(format!("Found {} files in {}", report.discovered, source.display()));

        let workers = self.config.resolver_workers;
        let registry = match library {
            Library::Movies => {
                resolve_movies(candidates, self.provider.as_ref(), workers, &self.jobs).await
            }
            Library::Tv => {
                resolve_episodes(candidates, self.provider.as_ref(), workers, &self.jobs).await
            }
        };
        report.matched = registry.len();

        for (candidate, matched) in registry.into_sorted() {
            let result = match &matched {
                MetadataMatch::Movie(movie) => {
                    self.indexer.index_movie(&candidate, movie, destination).await
                }
                MetadataMatch::Episode(episode) => {
                    self.indexer.index_episode(&candidate, episode, destination).await
                }
            };

            match result {
                Ok(()) => report.indexed += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(file = %candidate.file_name, error = %e, "Indexing failed");
                    self.jobs
                        .append(format!("Failed to index {}: {:#}", candidate.file_name, e));
                }
            }
        }

        info!(
            discovered = report.discovered,
            matched = report.matched,
            indexed = report.indexed,
            failed = report.failed,
            "Scan finished"
        );
        self.jobs.append(format!(
            "Scan finished: {} indexed, {} failed, {} unmatched",
            report.indexed,
            report.failed,
            report.discovered - report.matched
        ));
        Ok(report)
    }
}
