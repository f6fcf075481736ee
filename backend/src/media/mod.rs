//! Media inspection and transcoding through the ffmpeg tool suite

pub mod probe;
pub mod transcoder;

pub use probe::{AudioData, FfprobeProber, MediaData, MediaProber, SubtitleData};
pub use transcoder::{FfmpegTranscoder, TranscodeOutput, TranscodeRequest, Transcoder};
