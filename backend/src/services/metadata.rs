//! Metadata lookup seam
//!
//! The resolver talks to the external metadata service only through
//! [`MetadataProvider`]; [`super::tmdb::TmdbClient`] is the production
//! implementation.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Movie found on the metadata service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieMatch {
    /// External identifier, the catalog key
    pub id: i64,
    pub name: String,
    /// `YYYY-MM-DD` as returned by the service
    pub release_date: String,
    pub categories: Vec<String>,
}

/// Episode found on the metadata service, bundled with its show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeMatch {
    pub id: i64,
    pub name: String,
    pub release_date: String,
    /// Categories of the parent show
    pub categories: Vec<String>,
    pub tv_show_id: i64,
    pub tv_show_name: String,
    pub tv_show_release_date: String,
    pub season: u32,
    pub episode: u32,
}

/// A resolved candidate, as stored in the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataMatch {
    Movie(MovieMatch),
    Episode(EpisodeMatch),
}

impl MetadataMatch {
    pub fn id(&self) -> i64 {
        match self {
            Self::Movie(m) => m.id,
            Self::Episode(e) => e.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Movie(m) => &m.name,
            Self::Episode(e) => &e.name,
        }
    }
}

/// External metadata service
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// First search hit for `title` (and `year` when known), `None` when nothing matched
    async fn search_movie(&self, title: &str, year: Option<u32>) -> Result<Option<MovieMatch>>;

    /// The given episode of the first show matching `title`
    async fn search_tv_episode(
        &self,
        title: &str,
        season: u32,
        episode: u32,
    ) -> Result<Option<EpisodeMatch>>;
}
