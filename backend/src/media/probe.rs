//! Stream information via ffprobe
//!
//! Runs `ffprobe -print_format json` under a deadline and keeps what the
//! catalog stores: size, duration, video codec, and per-track language and
//! codec (plus bitrate for audio).

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

/// Deadline for one probe when none is configured
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Language recorded when a track has neither a language nor a title tag
pub const UNKNOWN_LANGUAGE: &str = "Unknown";

/// Audio track information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioData {
    /// Uppercased codec name (e.g. "AAC")
    pub codec: String,
    pub language: String,
    /// Bits per second, 0 when unknown
    pub bitrate: i64,
}

/// Subtitle track information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleData {
    pub language: String,
    pub codec: String,
}

/// What the catalog needs to know about a source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaData {
    pub size: i64,
    /// Seconds
    pub duration: f64,
    /// Uppercased codec of the first video stream
    pub codec: String,
    pub audios: Vec<AudioData>,
    pub subtitles: Vec<SubtitleData>,
}

/// Source file inspection
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaData>;
}

/// ffprobe JSON output (subset)
mod ffprobe {
    use super::*;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub format: Option<Format>,
        #[serde(default)]
        pub streams: Vec<Stream>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
        pub size: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_name: Option<String>,
        pub codec_type: Option<String>,
        pub bit_rate: Option<String>,
        pub tags: Option<HashMap<String, String>>,
    }
}

/// Language of a track: the `language` tag, else `title`, else "Unknown"
fn track_language(stream: &ffprobe::Stream) -> String {
    stream
        .tags
        .as_ref()
        .and_then(|tags| tags.get("language").or_else(|| tags.get("title")))
        .cloned()
        .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
}

fn codec(stream: &ffprobe::Stream) -> String {
    stream.codec_name.clone().unwrap_or_default().to_uppercase()
}

/// Convert raw ffprobe JSON into [`MediaData`]
pub fn parse_probe_output(json: &[u8]) -> Result<MediaData> {
    let probe: ffprobe::FfprobeOutput =
        serde_json::from_slice(json).context("Failed to parse ffprobe JSON output")?;

    let format = probe.format.context("ffprobe output has no format section")?;
    let size = format
        .size
        .as_deref()
        .context("ffprobe output has no size")?
        .parse::<i64>()
        .context("Invalid size in ffprobe output")?;
    let duration = format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .context("No video stream found")?;

    let audios = probe
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("audio"))
        .map(|s| AudioData {
            codec: codec(s),
            language: track_language(s),
            bitrate: s
                .bit_rate
                .as_deref()
                .and_then(|b| b.parse::<f64>().ok())
                .map(|b| b as i64)
                .unwrap_or(0),
        })
        .collect();

    let subtitles = probe
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("subtitle"))
        .map(|s| SubtitleData {
            language: track_language(s),
            codec: codec(s),
        })
        .collect();

    Ok(MediaData {
        size,
        duration,
        codec: codec(video),
        audios,
        subtitles,
    })
}

/// [`MediaProber`] backed by the ffprobe executable
pub struct FfprobeProber {
    ffprobe_path: String,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            timeout,
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe", DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<MediaData> {
        debug!(path = %path.display(), "Probing media file with ffprobe");

        if !path.exists() {
            anyhow::bail!("ffprobe failed for '{}': file does not exist", path.display());
        }

        let command = Command::new(&self.ffprobe_path)
            .args(["-v", "error"])
            .args(["-print_format", "json"])
            .args(["-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, command)
            .await
            .map_err(|_| {
                warn!(path = %path.display(), timeout = ?self.timeout, "ffprobe timed out");
                anyhow::anyhow!(
                    "ffprobe timed out after {:?} for '{}'",
                    self.timeout,
                    path.display()
                )
            })?
            .with_context(|| format!("Failed to execute ffprobe for '{}'", path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "ffprobe failed for '{}': {}",
                path.display(),
                if stderr.is_empty() {
                    "no error output"
                } else {
                    stderr.trim()
                }
            );
        }

        parse_probe_output(&output.stdout)
    }
}
