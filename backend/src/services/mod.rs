//! Ingestion services

pub mod cleanup;
pub mod indexer;
pub mod job;
pub mod logging;
pub mod metadata;
pub mod object_storage;
pub mod pipeline;
pub mod rate_limiter;
pub mod registry;
pub mod resolver;
pub mod sanitizer;
pub mod tmdb;
pub mod tree;

pub use cleanup::{CleanupQueue, CleanupTask};
pub use indexer::Indexer;
pub use job::{JobController, JobError, JobGuard, JobLog};
pub use metadata::{EpisodeMatch, MetadataMatch, MetadataProvider, MovieMatch};
pub use object_storage::{ObjectStorage, S3Config, S3ObjectStorage};
pub use pipeline::{
    Library, Pipeline, PipelineConfig, ScanError, ScanReport, UploadedFile,
};
pub use rate_limiter::{RateLimitConfig, RateLimitedClient};
pub use registry::ResultRegistry;
pub use resolver::{LookupOutcome, resolve_episodes, resolve_movies};
pub use tmdb::TmdbClient;
pub use tree::{CandidateKey, CandidateKind, ScanCandidate, build_movie_tree, build_tv_tree};
