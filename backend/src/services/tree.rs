//! Source tree scanning
//!
//! Walks a source folder depth-first and turns every video file into a
//! [`ScanCandidate`] carrying its sanitized title.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use walkdir::WalkDir;

use super::sanitizer::{sanitize_movie_filename, sanitize_tv_filename};

/// Video file extensions accepted from the source folders
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi"];

/// Identity of a candidate within one scan: its full path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateKey(PathBuf);

impl CandidateKey {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// What the filename told us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateKind {
    Movie { year: Option<u32> },
    Episode { season: u32, episode: u32 },
}

/// A discovered video file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCandidate {
    /// Directory holding the file
    pub dir: PathBuf,
    pub file_name: String,
    /// Lowercased extension without the dot
    pub extension: String,
    /// Sanitized search title
    pub title: String,
    pub kind: CandidateKind,
}

impl ScanCandidate {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    pub fn key(&self) -> CandidateKey {
        CandidateKey(self.path())
    }
}

/// All movie candidates below `root`
pub fn build_movie_tree(root: &Path) -> Result<Vec<ScanCandidate>> {
    build_tree(root, |file_name| {
        let parsed = sanitize_movie_filename(file_name);
        (parsed.title, CandidateKind::Movie { year: parsed.year })
    })
}

/// All TV episode candidates below `root`
pub fn build_tv_tree(root: &Path) -> Result<Vec<ScanCandidate>> {
    build_tree(root, |file_name| {
        let parsed = sanitize_tv_filename(file_name);
        (
            parsed.title,
            CandidateKind::Episode {
                season: parsed.season,
                episode: parsed.episode,
            },
        )
    })
}

/// Lowercased extension of `path` when it is an accepted video extension
pub fn allowed_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn build_tree<F>(root: &Path, parse: F) -> Result<Vec<ScanCandidate>>
where
    F: Fn(&str) -> (String, CandidateKind),
{
    let mut candidates = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to read {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(extension) = allowed_extension(path) else {
            debug!(path = %path.display(), "Skipping file with disallowed extension");
            continue;
        };
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            debug!(path = %path.display(), "Skipping file with non UTF-8 name");
            continue;
        };

        let (title, kind) = parse(file_name);
        candidates.push(ScanCandidate {
            dir: path.parent().unwrap_or(root).to_path_buf(),
            file_name: file_name.to_string(),
            extension,
            title,
            kind,
        });
    }

    debug!(root = %root.display(), count = candidates.len(), "Built source tree");
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_movie_tree_filters_extensions_recursively() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Le.Film.2019.mkv"));
        touch(&dir.path().join("nested/deeper/Other.Movie.2001.MP4"));
        touch(&dir.path().join("nested/notes.txt"));
        touch(&dir.path().join("cover.jpg"));

        let candidates = build_movie_tree(dir.path()).unwrap();
        assert_eq!(candidates.len(), 2);

        let film = candidates.iter().find(|c| c.file_name == "Le.Film.2019.mkv").unwrap();
        assert_eq!(film.title, "Le Film");
        assert_eq!(film.kind, CandidateKind::Movie { year: Some(2019) });
        assert_eq!(film.dir, dir.path());

        let other = candidates.iter().find(|c| c.extension == "mp4").unwrap();
        assert_eq!(other.dir, dir.path().join("nested/deeper"));
        assert_eq!(other.key().path(), dir.path().join("nested/deeper/Other.Movie.2001.MP4"));
    }

    #[test]
    fn test_tv_tree_parses_episodes() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Show/Season 2/Show.S02E05.mkv"));

        let candidates = build_tv_tree(dir.path()).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Show");
        assert_eq!(
            candidates[0].kind,
            CandidateKind::Episode {
                season: 2,
                episode: 5
            }
        );
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(build_movie_tree(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_allowed_extension_is_case_insensitive() {
        assert_eq!(allowed_extension(Path::new("a.AVI")), Some("avi".to_string()));
        assert_eq!(allowed_extension(Path::new("a.mov")), None);
        assert_eq!(allowed_extension(Path::new("noext")), None);
    }
}
