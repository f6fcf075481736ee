//! Bounded-concurrency metadata resolution
//!
//! Looks every candidate up on the metadata service with at most `workers`
//! requests in flight and collects the matches into a [`ResultRegistry`].
//! Misses and lookup errors are reported to the job log and dropped; they
//! never abort the batch.

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::job::JobController;
use super::metadata::{MetadataMatch, MetadataProvider};
use super::registry::ResultRegistry;
use super::tree::{CandidateKind, ScanCandidate};

/// Lookups in flight when no worker count is configured
pub const DEFAULT_RESOLVER_WORKERS: usize = 4;

/// Result of looking up one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Matched(MetadataMatch),
    NotFound,
    LookupError(String),
}

/// Look up a single candidate according to its kind
pub async fn lookup(provider: &dyn MetadataProvider, candidate: &ScanCandidate) -> LookupOutcome {
    let result = match candidate.kind {
        CandidateKind::Movie { year } => provider
            .search_movie(&candidate.title, year)
            .await
            .map(|m| m.map(MetadataMatch::Movie)),
        CandidateKind::Episode { season, episode } => provider
            .search_tv_episode(&candidate.title, season, episode)
            .await
            .map(|m| m.map(MetadataMatch::Episode)),
    };

    match result {
        Ok(Some(matched)) => LookupOutcome::Matched(matched),
        Ok(None) => LookupOutcome::NotFound,
        Err(e) => LookupOutcome::LookupError(format!("{:#}", e)),
    }
}

/// Resolve movie candidates
pub async fn resolve_movies(
    candidates: Vec<ScanCandidate>,
    provider: &dyn MetadataProvider,
    workers: usize,
    jobs: &JobController,
) -> ResultRegistry {
    resolve(candidates, provider, workers, jobs).await
}

/// Resolve TV episode candidates
pub async fn resolve_episodes(
    candidates: Vec<ScanCandidate>,
    provider: &dyn MetadataProvider,
    workers: usize,
    jobs: &JobController,
) -> ResultRegistry {
    resolve(candidates, provider, workers, jobs).await
}

async fn resolve(
    candidates: Vec<ScanCandidate>,
    provider: &dyn MetadataProvider,
    workers: usize,
    jobs: &JobController,
) -> ResultRegistry {
    let registry = ResultRegistry::new();
    let total = candidates.len();

    stream::iter(candidates)
        .map(|candidate| async move {
            let outcome = lookup(provider, &candidate).await;
            (candidate, outcome)
        })
        .buffer_unordered(workers.max(1))
        .for_each(|(candidate, outcome)| {
            match outcome {
                LookupOutcome::Matched(matched) => {
                    debug!(file = %candidate.file_name, id = matched.id(), "Candidate matched");
                    registry.insert(candidate, matched);
                }
                LookupOutcome::NotFound => {
                    jobs.append(format!(
                        "No match found for {} (searched \"{}\")",
                        candidate.file_name, candidate.title
                    ));
                }
                LookupOutcome::LookupError(reason) => {
                    warn!(file = %candidate.file_name, error = %reason, "Metadata lookup failed");
                    jobs.append(format!(
                        "Error while searching {}: {}. Sanitized name was: {}",
                        candidate.file_name, reason, candidate.title
                    ));
                }
            }
            futures::future::ready(())
        })
        .await;

    debug!(total, matched = registry.len(), "Resolution finished");
    registry
}
