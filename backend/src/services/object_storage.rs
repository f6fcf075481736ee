//! S3-compatible object storage for transcoded output
//!
//! A transcoded directory is uploaded file by file under a key prefix such as
//! `movies/42` or `tv/63056`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};
use walkdir::WalkDir;

/// S3 connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// For MinIO and other S3-compatible services
    pub endpoint_url: Option<String>,
}

impl S3Config {
    pub fn validate(&self) -> Result<()> {
        if self.bucket_name.trim().is_empty() {
            anyhow::bail!("Bucket name cannot be empty");
        }
        if self.region.trim().is_empty() {
            anyhow::bail!("Region cannot be empty");
        }
        if self.access_key_id.trim().is_empty() {
            anyhow::bail!("Access key ID cannot be empty");
        }
        if self.secret_access_key.trim().is_empty() {
            anyhow::bail!("Secret access key cannot be empty");
        }
        Ok(())
    }
}

/// Remote storage of transcoded directories (mockable in tests)
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload every file below `dir` under `prefix`
    async fn upload_directory(&self, prefix: &str, dir: &Path) -> Result<()>;
}

/// Files below `dir` paired with their object key under `prefix`, sorted by key
pub fn object_keys(prefix: &str, dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    let prefix = prefix.trim_end_matches('/');
    let mut keys = Vec::new();

    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir)?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        keys.push((entry.path().to_path_buf(), format!("{}/{}", prefix, relative)));
    }

    keys.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(keys)
}

/// Production S3 storage
pub struct S3ObjectStorage {
    client: Client,
    bucket_name: String,
}

impl S3ObjectStorage {
    pub async fn new(config: S3Config) -> Result<Self> {
        config.validate()?;

        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "media-indexer",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);
        let custom_endpoint = config.endpoint_url.is_some();
        if let Some(endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        // path-style addressing for custom endpoints
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(custom_endpoint)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket_name: config.bucket_name,
        })
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn upload_directory(&self, prefix: &str, dir: &Path) -> Result<()> {
        let files = object_keys(prefix, dir)?;
        info!(bucket = %self.bucket_name, prefix, files = files.len(), "Uploading directory");

        for (path, key) in files {
            let body = ByteStream::from_path(&path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;

            self.client
                .put_object()
                .bucket(&self.bucket_name)
                .key(&key)
                .body(body)
                .send()
                .await
                .with_context(|| format!("Put object {} failed", key))?;

            debug!(key = %key, "Uploaded object");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config {
            bucket_name: "media".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: "id".to_string(),
            secret_access_key: "secret".to_string(),
            endpoint_url: Some("http://localhost:9000".to_string()),
        }
    }

    #[test]
    fn test_validate() {
        assert!(config().validate().is_ok());

        let mut missing_bucket = config();
        missing_bucket.bucket_name = " ".to_string();
        assert!(missing_bucket.validate().is_err());

        let mut missing_secret = config();
        missing_secret.secret_access_key = String::new();
        assert!(missing_secret.validate().is_err());
    }

    #[test]
    fn test_object_keys_mirror_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("video.mp4"), b"v").unwrap();
        std::fs::write(dir.path().join("audio_0.m4a"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("extra")).unwrap();
        std::fs::write(dir.path().join("extra/poster.jpg"), b"p").unwrap();

        let keys: Vec<_> = object_keys("movies/42/", dir.path())
            .unwrap()
            .into_iter()
            .map(|(_, key)| key)
            .collect();

        assert_eq!(
            keys,
            vec![
                "movies/42/audio_0.m4a",
                "movies/42/extra/poster.jpg",
                "movies/42/video.mp4",
            ]
        );
    }
}
