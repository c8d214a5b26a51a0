//! Status label → event status

use crate::config::StatusLabels;
use crate::error::SyncIssueError;
use crate::model::EventStatus;

/// Maps the tracker's status vocabulary onto [`EventStatus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusClassifier {
    new: String,
    confirmed: String,
    cancelled: String,
}

impl StatusClassifier {
    pub fn new(labels: &StatusLabels) -> Self {
        Self {
            new: labels.new.trim().to_string(),
            confirmed: labels.confirmed.trim().to_string(),
            cancelled: labels.cancelled.trim().to_string(),
        }
    }

    /// Exact match after trimming surrounding whitespace
    pub fn classify(&self, label: &str) -> Result<EventStatus, SyncIssueError> {
        let label = label.trim();
        if label == self.confirmed {
            Ok(EventStatus::Confirmed)
        } else if label == self.cancelled {
            Ok(EventStatus::Cancelled)
        } else if label == self.new {
            Ok(EventStatus::New)
        } else {
            Err(SyncIssueError::UnknownStatus(label.to_string()))
        }
    }
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(&StatusLabels::default())
    }
}
