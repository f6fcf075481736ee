//! Catalog indexing with deduplication by external id
//!
//! Each matched candidate is probed, transcoded into `<destination>/<id>` and
//! written to the catalog together with its file record. An entry that
//! already has a file record is treated as a duplicate: the old record and
//! its output directory are removed before the new transcode.
//!
//! Items are indexed one at a time. Once an item is committed, its source
//! file and output directory are handed to the [`CleanupQueue`].

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, info};

use super::cleanup::{CleanupQueue, CleanupTask};
use super::job::JobController;
use super::metadata::{EpisodeMatch, MovieMatch};
use super::tree::ScanCandidate;
use crate::db::{
    CreateAudio, CreateMediaFile, CreateSubtitle, CreateTvShow, Database, UpsertEpisode,
    UpsertMovie,
};
use crate::media::transcoder::directory_size;
use crate::media::{MediaData, MediaProber, TranscodeRequest, Transcoder};

/// Release date format used by the metadata service
pub const RELEASE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Object key prefix of indexed movies
pub const MOVIES_PREFIX: &str = "movies";

/// Object key prefix of indexed episodes
pub const TV_PREFIX: &str = "tv";

/// Writes matched candidates to the catalog
pub struct Indexer {
    db: Database,
    prober: Arc<dyn MediaProber>,
    transcoder: Arc<dyn Transcoder>,
    cleanup: Arc<CleanupQueue>,
    jobs: Arc<JobController>,
}

impl Indexer {
    pub fn new(
        db: Database,
        prober: Arc<dyn MediaProber>,
        transcoder: Arc<dyn Transcoder>,
        cleanup: Arc<CleanupQueue>,
        jobs: Arc<JobController>,
    ) -> Self {
        Self {
            db,
            prober,
            transcoder,
            cleanup,
            jobs,
        }
    }

    pub fn cleanup(&self) -> &Arc<CleanupQueue> {
        &self.cleanup
    }

    /// Index one movie, replacing any earlier file of the same id
    pub async fn index_movie(
        &self,
        candidate: &ScanCandidate,
        matched: &MovieMatch,
        destination: &Path,
    ) -> Result<()> {
        self.jobs.append(format!("Indexing movie {}", matched.name));

        let release_date = parse_release_date(&matched.release_date)?;
        let data = self.probe(candidate).await?;
        self.cleanup
            .wait_for(&destination.join(matched.id.to_string()))
            .await;

        if let Some(existing) = self.db.movies().get(matched.id).await?
            && let Some(media_file_id) = existing.media_file_id
        {
            self.jobs
                .append(format!("Removing duplicated movie {}", existing.name));
            self.remove_previous(&media_file_id, destination, matched.id)
                .await?;
        }

        let file = self
            .transcode(candidate, &data, matched.id, destination)
            .await?;

        let mut tx = self.db.pool().begin().await?;
        let media_file_id = self.db.media_files().create(&mut tx, &file).await?;
        self.db
            .movies()
            .upsert(
                &mut tx,
                &UpsertMovie {
                    id: matched.id,
                    name: matched.name.clone(),
                    release_date,
                    media_file_id: Some(media_file_id),
                },
            )
            .await?;

        let mut category_ids = Vec::new();
        for name in unique_names(&matched.categories) {
            category_ids.push(self.db.categories().get_or_create(&mut tx, name).await?);
        }
        self.db
            .movies()
            .set_categories(&mut tx, matched.id, &category_ids)
            .await?;
        tx.commit().await.context("Failed to commit movie")?;

        self.finish(candidate, destination, MOVIES_PREFIX, matched.id)
            .await?;
        self.jobs.append(format!(
            "Processed {} - {} {}",
            candidate.file_name,
            matched.name,
            release_year(&matched.release_date)
        ));
        Ok(())
    }

    /// Index one episode, creating its show on first sight
    pub async fn index_episode(
        &self,
        candidate: &ScanCandidate,
        matched: &EpisodeMatch,
        destination: &Path,
    ) -> Result<()> {
        self.jobs.append(format!(
            "Indexing tv show {} - S{:02}E{:02}",
            matched.tv_show_name, matched.season, matched.episode
        ));

        let release_date = parse_release_date(&matched.release_date)?;
        let show_release_date = parse_release_date(&matched.tv_show_release_date)?;
        let data = self.probe(candidate).await?;
        self.cleanup
            .wait_for(&destination.join(matched.id.to_string()))
            .await;

        if self.db.tv_shows().get(matched.tv_show_id).await?.is_none() {
            self.create_show(matched, show_release_date).await?;
        }

        if let Some(existing) = self.db.episodes().get(matched.id).await?
            && let Some(media_file_id) = existing.media_file_id
        {
            self.jobs.append(format!(
                "Removing duplicated tv episode {} {}x{}",
                matched.tv_show_name, existing.nb_season, existing.nb_episode
            ));
            self.remove_previous(&media_file_id, destination, matched.id)
                .await?;
        }

        let file = self
            .transcode(candidate, &data, matched.id, destination)
            .await?;

        let mut tx = self.db.pool().begin().await?;
        let media_file_id = self.db.media_files().create(&mut tx, &file).await?;
        self.db
            .episodes()
            .upsert(
                &mut tx,
                &UpsertEpisode {
                    id: matched.id,
                    tv_show_id: matched.tv_show_id,
                    nb_season: i64::from(matched.season),
                    nb_episode: i64::from(matched.episode),
                    name: matched.name.clone(),
                    release_date,
                    media_file_id: Some(media_file_id),
                },
            )
            .await?;
        tx.commit().await.context("Failed to commit episode")?;

        self.finish(candidate, destination, TV_PREFIX, matched.id)
            .await?;
        self.jobs.append(format!(
            "Processed {} - {} {}",
            candidate.file_name,
            matched.name,
            release_year(&matched.release_date)
        ));
        Ok(())
    }

    async fn probe(&self, candidate: &ScanCandidate) -> Result<MediaData> {
        let path = candidate.path();
        self.prober
            .probe(&path)
            .await
            .with_context(|| format!("Failed to probe {}", path.display()))
    }

    async fn create_show(&self, matched: &EpisodeMatch, release_date: NaiveDate) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        let created = self
            .db
            .tv_shows()
            .create_if_missing(
                &mut tx,
                &CreateTvShow {
                    id: matched.tv_show_id,
                    name: matched.tv_show_name.clone(),
                    release_date,
                },
            )
            .await?;

        if created {
            let mut category_ids = Vec::new();
            for name in unique_names(&matched.categories) {
                category_ids.push(self.db.categories().get_or_create(&mut tx, name).await?);
            }
            self.db
                .tv_shows()
                .set_categories(&mut tx, matched.tv_show_id, &category_ids)
                .await?;
        }
        tx.commit().await.context("Failed to commit tv show")?;

        if created {
            info!(id = matched.tv_show_id, name = %matched.tv_show_name, "Created tv show");
        }
        Ok(())
    }

    /// Drop the old file record and whatever an earlier run left in `<destination>/<id>`
    async fn remove_previous(&self, media_file_id: &str, destination: &Path, id: i64) -> Result<()> {
        self.db.media_files().delete(media_file_id).await?;
        self.jobs
            .append(format!("Removing duplicated file {}", media_file_id));

        let output_dir = destination.join(id.to_string());
        match tokio::fs::remove_dir_all(&output_dir).await {
            Ok(()) => debug!(path = %output_dir.display(), "Removed previous output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to remove {}", output_dir.display()));
            }
        }
        Ok(())
    }

    /// Transcode the source and describe the produced files
    async fn transcode(
        &self,
        candidate: &ScanCandidate,
        data: &MediaData,
        id: i64,
        destination: &Path,
    ) -> Result<CreateMediaFile> {
        let request = TranscodeRequest {
            source: candidate.path(),
            destination_root: destination.to_path_buf(),
            external_id: id,
            audio_tracks: data.audios.len(),
            subtitle_tracks: data.subtitles.len(),
        };
        let output = self.transcoder.transcode(&request).await?;
        let size = directory_size(&request.output_dir())?;

        Ok(CreateMediaFile {
            filename: output.video,
            codec: data.codec.clone(),
            duration: data.duration,
            size: i64::try_from(size).context("Output size overflows")?,
            audios: output
                .audios
                .into_iter()
                .zip(&data.audios)
                .map(|(filename, audio)| CreateAudio {
                    filename,
                    language: audio.language.clone(),
                    codec: audio.codec.clone(),
                    bitrate: audio.bitrate,
                })
                .collect(),
            subtitles: output
                .subtitles
                .into_iter()
                .zip(&data.subtitles)
                .map(|(filename, subtitle)| CreateSubtitle {
                    filename,
                    language: subtitle.language.clone(),
                    codec: subtitle.codec.clone(),
                })
                .collect(),
        })
    }

    async fn finish(
        &self,
        candidate: &ScanCandidate,
        destination: &Path,
        prefix: &str,
        id: i64,
    ) -> Result<()> {
        self.cleanup
            .enqueue(CleanupTask {
                source: candidate.path(),
                output_dir: destination.join(id.to_string()),
                remote_prefix: format!("{}/{}", prefix, id),
            })
            .await
    }
}

fn parse_release_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, RELEASE_DATE_FORMAT)
        .with_context(|| format!("Invalid release date '{}'", value))
}

/// Year part of a release date
fn release_year(release_date: &str) -> &str {
    release_date.split('-').next().unwrap_or_default()
}

/// Names in first-seen order, duplicates dropped
fn unique_names(names: &[String]) -> Vec<&str> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .map(String::as_str)
        .filter(|name| seen.insert(*name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{AudioData, SubtitleData, TranscodeOutput};
    use crate::services::tree::CandidateKind;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProber;

    #[async_trait]
    impl MediaProber for FixedProber {
        async fn probe(&self, _path: &Path) -> Result<MediaData> {
            Ok(MediaData {
                size: 1000,
                duration: 90.5,
                codec: "H264".to_string(),
                audios: vec![AudioData {
                    codec: "AAC".to_string(),
                    language: "fre".to_string(),
                    bitrate: 128_000,
                }],
                subtitles: vec![SubtitleData {
                    language: "eng".to_string(),
                    codec: "SUBRIP".to_string(),
                }],
            })
        }
    }

    /// Writes small placeholder files instead of running ffmpeg
    #[derive(Default)]
    struct FakeTranscoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn transcode(&self, request: &TranscodeRequest) -> Result<TranscodeOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let output = TranscodeOutput::for_request(request);
            let dir = request.output_dir();
            std::fs::create_dir_all(&dir)?;
            std::fs::write(dir.join(&output.video), [0u8; 40])?;
            for name in output.audios.iter().chain(&output.subtitles) {
                std::fs::write(dir.join(name), [0u8; 5])?;
            }
            Ok(output)
        }
    }

    struct Fixture {
        indexer: Indexer,
        db: Database,
        transcoder: Arc<FakeTranscoder>,
        jobs: Arc<JobController>,
        _dir: tempfile::TempDir,
        source: std::path::PathBuf,
        destination: std::path::PathBuf,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let destination = dir.path().join("dest");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&destination).unwrap();

        let db = Database::connect_in_memory().await.unwrap();
        let jobs = Arc::new(JobController::new());
        let transcoder = Arc::new(FakeTranscoder::default());
        let cleanup = Arc::new(CleanupQueue::new(1, None, jobs.clone()));
        let indexer = Indexer::new(
            db.clone(),
            Arc::new(FixedProber),
            transcoder.clone(),
            cleanup,
            jobs.clone(),
        );

        Fixture {
            indexer,
            db,
            transcoder,
            jobs,
            _dir: dir,
            source,
            destination,
        }
    }

    fn candidate(dir: &Path, file_name: &str, kind: CandidateKind) -> ScanCandidate {
        std::fs::write(dir.join(file_name), b"raw").unwrap();
        ScanCandidate {
            dir: dir.to_path_buf(),
            file_name: file_name.to_string(),
            extension: "mkv".to_string(),
            title: "ignored".to_string(),
            kind,
        }
    }

    fn movie_match() -> MovieMatch {
        MovieMatch {
            id: 42,
            name: "Le Film".to_string(),
            release_date: "2019-05-01".to_string(),
            categories: vec!["Drama".to_string(), "Comedy".to_string(), "Drama".to_string()],
        }
    }

    fn episode_match(id: i64, episode: u32) -> EpisodeMatch {
        EpisodeMatch {
            id,
            name: format!("Episode {episode}"),
            release_date: "2015-01-10".to_string(),
            categories: vec!["Crime".to_string()],
            tv_show_id: 7,
            tv_show_name: "Show".to_string(),
            tv_show_release_date: "2015-01-01".to_string(),
            season: 2,
            episode,
        }
    }

    #[tokio::test]
    async fn test_index_movie_writes_entry_file_and_categories() {
        let f = fixture().await;
        let c = candidate(&f.source, "Le.Film.2019.mkv", CandidateKind::Movie { year: Some(2019) });

        f.indexer
            .index_movie(&c, &movie_match(), &f.destination)
            .await
            .unwrap();
        f.indexer.cleanup().wait_idle().await;

        let movie = f.db.movies().get(42).await.unwrap().unwrap();
        assert_eq!(movie.name, "Le Film");
        assert_eq!(movie.release_date, NaiveDate::from_ymd_opt(2019, 5, 1).unwrap());

        let file = f
            .db
            .media_files()
            .get(movie.media_file_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.filename, "video.mp4");
        assert_eq!(file.codec, "H264");
        assert_eq!(file.size, 50);

        let audios = f.db.media_files().list_audios(&file.id).await.unwrap();
        assert_eq!(audios.len(), 1);
        assert_eq!(audios[0].filename, "audio_0.m4a");
        assert_eq!(audios[0].bitrate, 128_000);

        assert_eq!(
            f.db.categories().list_for_movie(42).await.unwrap().len(),
            2
        );
        assert!(!c.path().exists());

        let messages: Vec<_> = f.jobs.snapshot().into_iter().map(|l| l.message).collect();
        assert_eq!(messages.first().unwrap(), "Indexing movie Le Film");
        assert_eq!(messages.last().unwrap(), "Processed Le.Film.2019.mkv - Le Film 2019");
    }

    #[tokio::test]
    async fn test_reindex_replaces_file_and_keeps_created_at() {
        let f = fixture().await;
        let kind = CandidateKind::Movie { year: Some(2019) };

        let first = candidate(&f.source, "Le.Film.2019.mkv", kind.clone());
        f.indexer
            .index_movie(&first, &movie_match(), &f.destination)
            .await
            .unwrap();
        f.indexer.cleanup().wait_idle().await;
        let before = f.db.movies().get(42).await.unwrap().unwrap();

        let second = candidate(&f.source, "Le Film (2019).mkv", kind);
        f.indexer
            .index_movie(&second, &movie_match(), &f.destination)
            .await
            .unwrap();
        f.indexer.cleanup().wait_idle().await;
        let after = f.db.movies().get(42).await.unwrap().unwrap();

        assert_eq!(f.db.movies().count().await.unwrap(), 1);
        assert_eq!(f.db.media_files().count().await.unwrap(), 1);
        assert_eq!(after.created_at, before.created_at);
        assert_ne!(after.media_file_id, before.media_file_id);
        assert_eq!(f.transcoder.calls.load(Ordering::SeqCst), 2);
        assert!(
            f.jobs
                .snapshot()
                .iter()
                .any(|l| l.message == "Removing duplicated movie Le Film")
        );
    }

    #[tokio::test]
    async fn test_invalid_release_date_fails_before_transcode() {
        let f = fixture().await;
        let c = candidate(&f.source, "Broken.mkv", CandidateKind::Movie { year: None });
        let mut matched = movie_match();
        matched.release_date = String::new();

        let err = f
            .indexer
            .index_movie(&c, &matched, &f.destination)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Invalid release date"));
        assert_eq!(f.transcoder.calls.load(Ordering::SeqCst), 0);
        assert!(f.db.movies().get(42).await.unwrap().is_none());
        assert!(c.path().exists());
    }

    #[tokio::test]
    async fn test_index_episodes_creates_show_once() {
        let f = fixture().await;
        let kind = CandidateKind::Episode { season: 2, episode: 5 };

        let e5 = candidate(&f.source, "Show.S02E05.mkv", kind.clone());
        let e6 = candidate(&f.source, "Show.S02E06.mkv", kind);
        f.indexer
            .index_episode(&e5, &episode_match(105, 5), &f.destination)
            .await
            .unwrap();
        f.indexer
            .index_episode(&e6, &episode_match(106, 6), &f.destination)
            .await
            .unwrap();
        f.indexer.cleanup().wait_idle().await;

        assert_eq!(f.db.tv_shows().count().await.unwrap(), 1);
        assert_eq!(
            f.db.categories().list_for_tv_show(7).await.unwrap(),
            vec!["Crime".to_string()]
        );

        let episodes = f.db.episodes().list_by_show(7).await.unwrap();
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].nb_season, 2);
        assert_eq!(episodes[1].nb_episode, 6);
        assert!(f.destination.join("106").join("video.mp4").exists());
        assert!(
            f.jobs
                .snapshot()
                .iter()
                .any(|l| l.message == "Indexing tv show Show - S02E05")
        );
    }

    #[test]
    fn test_unique_names_keeps_first_seen_order() {
        let names = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(unique_names(&names), vec!["b", "a"]);
    }
}
