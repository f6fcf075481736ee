//! FFmpeg-based transcoding
//!
//! Splits a source file into one web-friendly video file plus one file per
//! audio and subtitle track, all under `<destination>/<external id>/`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

pub const DEFAULT_CRF: u32 = 15;
pub const DEFAULT_SCALE: &str = "1280:720";

const VIDEO_FILE: &str = "video.mp4";

/// One transcode job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeRequest {
    pub source: PathBuf,
    pub destination_root: PathBuf,
    /// Names the output directory
    pub external_id: i64,
    pub audio_tracks: usize,
    pub subtitle_tracks: usize,
}

impl TranscodeRequest {
    pub fn output_dir(&self) -> PathBuf {
        self.destination_root.join(self.external_id.to_string())
    }
}

/// File names produced inside the output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutput {
    pub video: String,
    pub audios: Vec<String>,
    pub subtitles: Vec<String>,
}

impl TranscodeOutput {
    /// Names ffmpeg writes for `request`
    pub fn for_request(request: &TranscodeRequest) -> Self {
        Self {
            video: VIDEO_FILE.to_string(),
            audios: (0..request.audio_tracks)
                .map(|i| format!("audio_{}.m4a", i))
                .collect(),
            subtitles: (0..request.subtitle_tracks)
                .map(|i| format!("subtitle_{}.vtt", i))
                .collect(),
        }
    }
}

/// Opaque transcoding operation
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, request: &TranscodeRequest) -> Result<TranscodeOutput>;
}

/// [`Transcoder`] backed by the ffmpeg executable
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    crf: u32,
    scale: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, crf: u32, scale: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            crf,
            scale: scale.into(),
        }
    }

    /// Full ffmpeg argument list for `request`
    fn build_args(&self, request: &TranscodeRequest, output: &TranscodeOutput) -> Vec<String> {
        let out_dir = request.output_dir();
        let out = |name: &str| out_dir.join(name).to_string_lossy().to_string();

        let mut args: Vec<String> = vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-i".into(),
            request.source.to_string_lossy().to_string(),
            "-map".into(),
            "0:v:0".into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-crf".into(),
            self.crf.to_string(),
            "-vf".into(),
            format!("scale={}", self.scale),
            "-an".into(),
            "-sn".into(),
            out(&output.video),
        ];

        for (i, name) in output.audios.iter().enumerate() {
            args.extend([
                "-map".into(),
                format!("0:a:{}", i),
                "-c:a".into(),
                "aac".into(),
                "-vn".into(),
                out(name),
            ]);
        }

        for (i, name) in output.subtitles.iter().enumerate() {
            args.extend([
                "-map".into(),
                format!("0:s:{}", i),
                "-c:s".into(),
                "webvtt".into(),
                out(name),
            ]);
        }

        args
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg", DEFAULT_CRF, DEFAULT_SCALE)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, request: &TranscodeRequest) -> Result<TranscodeOutput> {
        let out_dir = request.output_dir();
        tokio::fs::create_dir_all(&out_dir)
            .await
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;

        let output = TranscodeOutput::for_request(request);
        let args = self.build_args(request, &output);
        debug!(source = %request.source.display(), ?args, "Running ffmpeg");

        let result = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute ffmpeg for '{}'", request.source.display()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            anyhow::bail!("FFmpeg failed: {}", stderr.trim());
        }

        info!(
            source = %request.source.display(),
            output = %out_dir.display(),
            audios = output.audios.len(),
            subtitles = output.subtitles.len(),
            "Transcode complete"
        );
        Ok(output)
    }
}

/// Total size in bytes of the regular files below `dir`
pub fn directory_size(dir: &Path) -> Result<u64> {
    let mut size = 0;
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        if entry.file_type().is_file() {
            size += entry
                .metadata()
                .with_context(|| format!("Failed to stat {}", entry.path().display()))?
                .len();
        }
    }
    Ok(size)
}
