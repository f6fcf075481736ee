//! Media indexer - scan, match, transcode and catalog movie and TV files

pub mod cli;
pub mod config;
pub mod db;
pub mod jobs;
pub mod media;
pub mod services;
