//! Results of one resolution pass
//!
//! Maps each matched candidate to its metadata. Candidates whose lookup
//! failed or found nothing are never inserted.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::metadata::MetadataMatch;
use super::tree::{CandidateKey, ScanCandidate};

#[derive(Debug, Default)]
pub struct ResultRegistry {
    entries: Mutex<HashMap<CandidateKey, (ScanCandidate, MetadataMatch)>>,
}

impl ResultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a match, replacing any earlier one for the same candidate
    pub fn insert(&self, candidate: ScanCandidate, matched: MetadataMatch) {
        self.entries.lock().insert(candidate.key(), (candidate, matched));
    }

    pub fn get(&self, key: &CandidateKey) -> Option<MetadataMatch> {
        self.entries.lock().get(key).map(|(_, m)| m.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Take every entry, ordered by candidate path
    pub fn into_sorted(self) -> Vec<(ScanCandidate, MetadataMatch)> {
        let mut entries: Vec<_> = self.entries.into_inner().into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, v)| v).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metadata::MovieMatch;
    use crate::services::tree::CandidateKind;
    use std::path::PathBuf;

    fn candidate(name: &str) -> ScanCandidate {
        ScanCandidate {
            dir: PathBuf::from("/src"),
            file_name: name.to_string(),
            extension: "mkv".to_string(),
            title: name.to_string(),
            kind: CandidateKind::Movie { year: None },
        }
    }

    fn matched(id: i64) -> MetadataMatch {
        MetadataMatch::Movie(MovieMatch {
            id,
            name: format!("Movie {id}"),
            release_date: "2019-01-01".to_string(),
            categories: vec![],
        })
    }

    #[test]
    fn test_insert_get_and_order() {
        let registry = ResultRegistry::new();
        assert!(registry.is_empty());

        registry.insert(candidate("b.mkv"), matched(2));
        registry.insert(candidate("a.mkv"), matched(1));
        registry.insert(candidate("b.mkv"), matched(3));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&candidate("b.mkv").key()), Some(matched(3)));
        assert_eq!(registry.get(&candidate("c.mkv").key()), None);

        let ids: Vec<_> = registry.into_sorted().into_iter().map(|(_, m)| m.id()).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
