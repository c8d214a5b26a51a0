//! URL index of the current batch

use crate::model::{EventUrl, SourceIssue, TrackerBase};
use crate::{EventSyncError, Result};
use std::collections::BTreeMap;

/// Source issues of one fetch, keyed by their correlation URL
#[derive(Debug, Clone, Default)]
pub struct IssueIndex {
    issues: BTreeMap<EventUrl, SourceIssue>,
}

impl IssueIndex {
    /// Index a batch; two issues resolving to the same URL abort the batch
    pub fn build(
        base: &TrackerBase,
        issues: impl IntoIterator<Item = SourceIssue>,
    ) -> Result<Self> {
        let mut index: BTreeMap<EventUrl, SourceIssue> = BTreeMap::new();
        for issue in issues {
            let url = base.issue_url(issue.id);
            if let Some(existing) = index.get(&url) {
                return Err(EventSyncError::DuplicateUrl {
                    url,
                    first: existing.id,
                    second: issue.id,
                });
            }
            index.insert(url, issue);
        }
        Ok(Self { issues: index })
    }

    pub fn urls(&self) -> Vec<EventUrl> {
        self.issues.keys().cloned().collect()
    }

    pub fn get(&self, url: &EventUrl) -> Option<&SourceIssue> {
        self.issues.get(url)
    }

    pub fn remove(&mut self, url: &EventUrl) -> Option<SourceIssue> {
        self.issues.remove(url)
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl IntoIterator for IssueIndex {
    type Item = (EventUrl, SourceIssue);
    type IntoIter = std::collections::btree_map::IntoIter<EventUrl, SourceIssue>;

    fn into_iter(self) -> Self::IntoIter {
        self.issues.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueId;
    use chrono::Utc;

    fn issue(id: u64) -> SourceIssue {
        SourceIssue::new(id, "Konzert", "Bestätigt", 7u64, Utc::now())
    }

    #[test]
    fn test_build_index() {
        let base = TrackerBase::parse("https://redmine.example.org").unwrap();
        let index = IssueIndex::build(&base, vec![issue(42), issue(43)]).unwrap();

        assert_eq!(index.len(), 2);
        let url = EventUrl::new("https://redmine.example.org/issues/42");
        assert_eq!(index.get(&url).map(|i| i.id), Some(IssueId(42)));
        assert_eq!(index.urls().len(), 2);
    }

    #[test]
    fn test_duplicate_url_aborts() {
        let base = TrackerBase::parse("https://redmine.example.org").unwrap();
        let err = IssueIndex::build(&base, vec![issue(42), issue(7), issue(42)]).unwrap_err();

        match err {
            EventSyncError::DuplicateUrl { url, first, second } => {
                assert_eq!(url.as_str(), "https://redmine.example.org/issues/42");
                assert_eq!(first, IssueId(42));
                assert_eq!(second, IssueId(42));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_remove() {
        let base = TrackerBase::parse("https://redmine.example.org").unwrap();
        let mut index = IssueIndex::build(&base, vec![issue(42)]).unwrap();
        let url = base.issue_url(IssueId(42));

        assert!(index.remove(&url).is_some());
        assert!(index.remove(&url).is_none());
        assert!(index.is_empty());
    }
}
