//! TMDB (The Movie Database) API client
//!
//! Base URL: https://api.themoviedb.org/3
//!
//! Rate limiting: TMDB allows ~40 requests per 10 seconds, every request goes
//! through a [`RateLimitedClient`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::metadata::{EpisodeMatch, MetadataProvider, MovieMatch};
use super::rate_limiter::RateLimitedClient;

const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";

/// TMDB API client with rate limiting
pub struct TmdbClient {
    client: RateLimitedClient,
    base_url: String,
    api_key: String,
    language: Option<String>,
}

/// Search result page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbSearchResult<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub total_results: i64,
}

/// Movie (search hit or details)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbMovie {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
    /// Only present in movie details
    #[serde(default)]
    pub genres: Option<Vec<TmdbGenre>>,
}

/// TV show (search hit or details)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbTvShow {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub first_air_date: Option<String>,
    /// Only present in show details
    #[serde(default)]
    pub genres: Option<Vec<TmdbGenre>>,
}

/// Episode details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbEpisode {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub air_date: Option<String>,
    pub season_number: u32,
    pub episode_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbGenre {
    pub id: i64,
    pub name: String,
}

fn genre_names(genres: Option<Vec<TmdbGenre>>) -> Vec<String> {
    genres
        .unwrap_or_default()
        .into_iter()
        .map(|g| g.name)
        .collect()
}

impl TmdbClient {
    /// Create a new TMDB client with the given API key
    pub fn new(api_key: String, language: Option<String>) -> Result<Self> {
        Ok(Self {
            client: RateLimitedClient::for_tmdb()?,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            language,
        })
    }

    /// Point the client at another server (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Check if the client has a valid API key configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// GET `path` and decode the body. `None` on 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, String)],
    ) -> Result<Option<T>> {
        if !self.has_api_key() {
            anyhow::bail!("TMDB API key not configured");
        }

        let url = format!("{}{}", self.base_url, path);
        let mut query: Vec<(&str, String)> = vec![("api_key", self.api_key.clone())];
        if let Some(language) = &self.language {
            query.push(("language", language.clone()));
        }
        query.extend(extra.iter().cloned());

        let response = self.client.get_with_query(&url, &query).await?;

        match response.status().as_u16() {
            404 => return Ok(None),
            401 => anyhow::bail!("TMDB API key is invalid"),
            429 => anyhow::bail!("Rate limited (429)"),
            _ => {}
        }
        if !response.status().is_success() {
            anyhow::bail!("TMDB request {} failed with status: {}", path, response.status());
        }

        let body = response
            .json()
            .await
            .with_context(|| format!("Failed to parse TMDB response for {}", path))?;
        Ok(Some(body))
    }

    /// Search for movies by name
    pub async fn search_movies(&self, query: &str, year: Option<u32>) -> Result<Vec<TmdbMovie>> {
        info!(
            "Searching TMDB for movie '{}'{}",
            query,
            year.map(|y| format!(" ({})", y)).unwrap_or_default()
        );

        let mut params = vec![
            ("query", query.to_string()),
            ("include_adult", "false".to_string()),
        ];
        if let Some(y) = year {
            params.push(("year", y.to_string()));
        }

        let results: Option<TmdbSearchResult<TmdbMovie>> =
            self.get_json("/search/movie", &params).await?;
        let results = results.map(|r| r.results).unwrap_or_default();

        debug!(count = results.len(), "TMDB search returned results");
        Ok(results)
    }

    /// Get movie details by TMDB ID
    pub async fn get_movie(&self, tmdb_id: i64) -> Result<Option<TmdbMovie>> {
        debug!("Fetching movie details from TMDB (ID: {})", tmdb_id);
        self.get_json(&format!("/movie/{}", tmdb_id), &[]).await
    }

    /// Search for TV shows by name
    pub async fn search_tv_shows(&self, query: &str) -> Result<Vec<TmdbTvShow>> {
        info!("Searching TMDB for TV show '{}'", query);

        let results: Option<TmdbSearchResult<TmdbTvShow>> = self
            .get_json("/search/tv", &[("query", query.to_string())])
            .await?;
        Ok(results.map(|r| r.results).unwrap_or_default())
    }

    /// Get TV show details by TMDB ID
    pub async fn get_tv_show(&self, tmdb_id: i64) -> Result<Option<TmdbTvShow>> {
        self.get_json(&format!("/tv/{}", tmdb_id), &[]).await
    }

    /// Get one episode of a show
    pub async fn get_episode(
        &self,
        tv_id: i64,
        season: u32,
        episode: u32,
    ) -> Result<Option<TmdbEpisode>> {
        self.get_json(
            &format!("/tv/{}/season/{}/episode/{}", tv_id, season, episode),
            &[],
        )
        .await
    }
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn search_movie(&self, title: &str, year: Option<u32>) -> Result<Option<MovieMatch>> {
        let Some(hit) = self.search_movies(title, year).await?.into_iter().next() else {
            return Ok(None);
        };

        // Search hits carry genre ids only; the names come from the details
        let categories = match self.get_movie(hit.id).await? {
            Some(details) => genre_names(details.genres),
            None => Vec::new(),
        };

        Ok(Some(MovieMatch {
            id: hit.id,
            name: hit.title,
            release_date: hit.release_date.unwrap_or_default(),
            categories,
        }))
    }

    async fn search_tv_episode(
        &self,
        title: &str,
        season: u32,
        episode: u32,
    ) -> Result<Option<EpisodeMatch>> {
        let Some(hit) = self.search_tv_shows(title).await?.into_iter().next() else {
            return Ok(None);
        };
        let Some(details) = self.get_episode(hit.id, season, episode).await? else {
            debug!(show = %hit.name, season, episode, "Episode not found on TMDB");
            return Ok(None);
        };
        let categories = match self.get_tv_show(hit.id).await? {
            Some(show) => genre_names(show.genres),
            None => Vec::new(),
        };

        Ok(Some(EpisodeMatch {
            id: details.id,
            name: details.name,
            release_date: details.air_date.unwrap_or_default(),
            categories,
            tv_show_id: hit.id,
            tv_show_name: hit.name,
            tv_show_release_date: hit.first_air_date.unwrap_or_default(),
            season,
            episode,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> TmdbClient {
        TmdbClient::new("key".to_string(), Some("fr-FR".to_string()))
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_search_movie_takes_first_hit_with_genres() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .and(query_param("query", "Le Film"))
            .and(query_param("year", "2019"))
            .and(query_param("api_key", "key"))
            .and(query_param("language", "fr-FR"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page": 1,
                "results": [
                    {"id": 42, "title": "Le Film", "release_date": "2019-05-01", "genre_ids": [18]},
                    {"id": 43, "title": "Le Film 2", "release_date": "2021-01-01"}
                ],
                "total_results": 2
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/movie/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 42,
                "title": "Le Film",
                "release_date": "2019-05-01",
                "genres": [{"id": 18, "name": "Drame"}, {"id": 35, "name": "Comédie"}]
            })))
            .mount(&server)
            .await;

        let found = client(&server)
            .await
            .search_movie("Le Film", Some(2019))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.id, 42);
        assert_eq!(found.release_date, "2019-05-01");
        assert_eq!(found.categories, vec!["Drame", "Comédie"]);
    }

    #[tokio::test]
    async fn test_search_movie_without_results() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"results": [], "total_results": 0})),
            )
            .mount(&server)
            .await;

        let found = client(&server).await.search_movie("Nothing", None).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_search_page_without_results_field() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"page": 1})))
            .mount(&server)
            .await;

        let shows = client(&server).await.search_tv_shows("Nothing").await.unwrap();
        assert!(shows.is_empty());
    }

    #[tokio::test]
    async fn test_search_episode_bundles_show() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": 1399, "name": "Show", "first_air_date": "2011-04-17"}],
                "total_results": 1
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/tv/1399/season/2/episode/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 63056,
                "name": "The Episode",
                "air_date": "2012-04-29",
                "season_number": 2,
                "episode_number": 5
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/tv/1399"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 1399,
                "name": "Show",
                "first_air_date": "2011-04-17",
                "genres": [{"id": 18, "name": "Drama"}]
            })))
            .mount(&server)
            .await;

        let found = client(&server)
            .await
            .search_tv_episode("Show", 2, 5)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.id, 63056);
        assert_eq!(found.name, "The Episode");
        assert_eq!(found.tv_show_id, 1399);
        assert_eq!(found.tv_show_release_date, "2011-04-17");
        assert_eq!(found.categories, vec!["Drama"]);
        assert_eq!((found.season, found.episode), (2, 5));
    }

    #[tokio::test]
    async fn test_missing_episode_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": 1, "name": "Show"}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/tv/1/season/9/episode/99"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let found = client(&server).await.search_tv_episode("Show", 9, 99).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_server_errors_are_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).await.search_movie("Le Film", None).await.unwrap_err();
        assert!(err.to_string().contains("invalid"));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_fast() {
        let tmdb = TmdbClient::new(String::new(), None).unwrap();
        assert!(!tmdb.has_api_key());
        assert!(tmdb.search_movie("anything", None).await.is_err());
    }
}
