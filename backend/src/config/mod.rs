//! Application configuration management

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::media::probe::DEFAULT_PROBE_TIMEOUT;
use crate::media::transcoder::{DEFAULT_CRF, DEFAULT_SCALE};
use crate::services::cleanup::DEFAULT_CLEANUP_WORKERS;
use crate::services::object_storage::S3Config;
use crate::services::resolver::DEFAULT_RESOLVER_WORKERS;

const DEFAULT_DATABASE_URL: &str = "sqlite://./data/media-indexer.db";
const DEFAULT_S3_REGION: &str = "us-east-1";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite URL, e.g. `sqlite://./data/media-indexer.db`
    pub database_url: String,

    pub movie_source_folder: PathBuf,
    pub movie_target_folder: PathBuf,
    pub tv_source_folder: PathBuf,
    pub tv_target_folder: PathBuf,

    /// TMDB API key
    pub tmdb_api_key: Option<String>,

    /// TMDB response language (e.g. `fr-FR`)
    pub tmdb_language: Option<String>,

    /// Object storage; cleanup keeps local output when unset
    pub s3: Option<S3Config>,

    /// Scan schedule (5 or 6 fields). No scheduling when unset.
    pub scan_cron: Option<String>,

    /// Directory receiving `log.txt`
    pub log_file_path: Option<PathBuf>,

    pub resolver_workers: usize,
    pub cleanup_workers: usize,
    pub probe_timeout: Duration,

    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub transcode_crf: u32,
    pub transcode_scale: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{} is required", key));

        let s3 = match var("S3_BUCKET_NAME") {
            Some(bucket_name) => Some(S3Config {
                bucket_name,
                region: var("S3_REGION").unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
                access_key_id: required("S3_ACCESS_KEY_ID")?,
                secret_access_key: required("S3_SECRET_ACCESS_KEY")?,
                endpoint_url: var("S3_ENDPOINT"),
            }),
            None => None,
        };

        Ok(Self {
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),

            movie_source_folder: required("MOVIE_SOURCE_FOLDER")?.into(),
            movie_target_folder: required("MOVIE_TARGET_FOLDER")?.into(),
            tv_source_folder: required("TV_SOURCE_FOLDER")?.into(),
            tv_target_folder: required("TV_TARGET_FOLDER")?.into(),

            tmdb_api_key: var("TMDB_API_KEY"),
            tmdb_language: var("TMDB_LANGUAGE"),

            s3,

            scan_cron: var("SCAN_CRON"),
            log_file_path: var("LOG_FILE_PATH").map(PathBuf::from),

            resolver_workers: parse_or(var("RESOLVER_WORKERS"), "RESOLVER_WORKERS", DEFAULT_RESOLVER_WORKERS)?,
            cleanup_workers: parse_or(var("CLEANUP_WORKERS"), "CLEANUP_WORKERS", DEFAULT_CLEANUP_WORKERS)?,
            probe_timeout: match var("PROBE_TIMEOUT_SECS") {
                Some(v) => Duration::from_secs(v.parse().context("Invalid PROBE_TIMEOUT_SECS")?),
                None => DEFAULT_PROBE_TIMEOUT,
            },

            ffmpeg_path: var("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_path: var("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".to_string()),
            transcode_crf: parse_or(var("TRANSCODE_CRF"), "TRANSCODE_CRF", DEFAULT_CRF)?,
            transcode_scale: var("TRANSCODE_SCALE").unwrap_or_else(|| DEFAULT_SCALE.to_string()),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v.trim().parse().with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}
