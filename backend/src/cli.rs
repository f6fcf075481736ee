//! Minimal CLI parsing for the run mode.

use std::env;

/// What the process does after startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Run the scheduler until Ctrl-C
    #[default]
    Serve,
    /// One movie pass, then exit
    ScanMovies,
    /// One TV pass, then exit
    ScanTv,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub run_mode: RunMode,
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    /// Last recognised flag wins; unknown arguments are ignored
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = CliOptions::default();
        for arg in args {
            match arg.as_ref() {
                "--serve" => options.run_mode = RunMode::Serve,
                "--scan-movies" => options.run_mode = RunMode::ScanMovies,
                "--scan-tv" => options.run_mode = RunMode::ScanTv,
                other => tracing::debug!(arg = other, "Ignoring unknown argument"),
            }
        }
        options
    }
}
