//! Redmine adapter
//!
//! Implements [`IssueSource`] on top of the `redmine` REST client and
//! converts wire issues into [`SourceIssue`]s.

use super::retry::{with_retry, RetryPolicy};
use super::{IssueQuery, IssueSource, StatusFilter};
use crate::config::{RedmineConfig, StatusLabels};
use crate::model::{CustomField, FieldValue, IssueId, NamedRef, Project, ProjectId, SourceIssue};
use crate::{EventSyncError, Result};
use async_trait::async_trait;
use redmine::{Client, CustomValue, IssueFilter, NewIssue};
use tracing::{debug, info};

/// Redmine REST adapter
pub struct RedmineAdapter {
    client: Client,
    retry: RetryPolicy,
}

impl RedmineAdapter {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Build a client from configuration, picking up the API key from the
    /// environment
    pub fn from_config(config: &RedmineConfig) -> Result<Self> {
        let mut client = Client::new(&config.url)?.with_page_size(config.page_size);
        if let Some(key) = config.api_key() {
            client = client.with_api_key(key);
        }
        Ok(Self::new(client))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch one issue in wire form (templates need custom field ids)
    pub async fn get_issue(&self, id: IssueId) -> Result<redmine::Issue> {
        let client = &self.client;
        with_retry(&self.retry, "get_issue", || async move {
            client.get_issue(id.get()).await.map_err(EventSyncError::from)
        })
        .await
    }

    /// Create an issue; not retried, a timeout may still have created it
    pub async fn create_issue(&self, issue: &NewIssue) -> Result<redmine::Issue> {
        let created = self.client.create_issue(issue).await?;
        info!(issue_id = created.id, subject = %created.subject, "Created Redmine issue");
        Ok(created)
    }

    /// Configured status labels that Redmine does not know
    pub async fn unknown_status_labels(&self, labels: &StatusLabels) -> Result<Vec<String>> {
        let client = &self.client;
        let statuses = with_retry(&self.retry, "list_statuses", || async move {
            client.list_statuses().await.map_err(EventSyncError::from)
        })
        .await?;
        Ok(missing_labels(labels, &statuses))
    }

    /// Look up a tracker in wire form
    pub async fn find_tracker(&self, name: &str) -> Result<Option<redmine::IdName>> {
        let client = &self.client;
        with_retry(&self.retry, "find_tracker", || async move {
            client.find_tracker(name).await.map_err(EventSyncError::from)
        })
        .await
    }
}

#[async_trait]
impl IssueSource for RedmineAdapter {
    async fn list_issues(&self, query: &IssueQuery) -> Result<Vec<SourceIssue>> {
        let client = &self.client;
        let mut issues = Vec::new();

        for &tracker_id in &query.tracker_ids {
            let filter = issue_filter(query, tracker_id);
            let filter = &filter;
            let page = with_retry(&self.retry, "list_issues", || async move {
                client.list_issues(filter).await.map_err(EventSyncError::from)
            })
            .await?;

            debug!(tracker_id, issues = page.len(), "Fetched issues");
            issues.extend(page.into_iter().map(to_source_issue));
        }

        if let Some(before) = query.updated_before {
            issues.retain(|i| i.updated_on < before);
        }

        info!(issues = issues.len(), "Fetched event issues from Redmine");
        Ok(issues)
    }

    async fn find_project_by_identifier(&self, identifier: &str) -> Result<Option<Project>> {
        let client = &self.client;
        let project = with_retry(&self.retry, "find_project", || async move {
            client
                .find_project(identifier)
                .await
                .map_err(EventSyncError::from)
        })
        .await?;

        Ok(project.map(|p| Project {
            id: ProjectId(p.id),
            identifier: p.identifier,
            name: p.name,
        }))
    }

    async fn find_tracker_by_name(&self, name: &str) -> Result<Option<NamedRef>> {
        Ok(self
            .find_tracker(name)
            .await?
            .map(|t| NamedRef::new(t.id, t.name)))
    }
}

fn issue_filter(query: &IssueQuery, tracker_id: u64) -> IssueFilter {
    let status = match query.status {
        StatusFilter::Open => redmine::StatusFilter::Open,
        StatusFilter::All => redmine::StatusFilter::All,
        StatusFilter::Id(id) => redmine::StatusFilter::Id(id),
    };

    let mut filter = IssueFilter::new().with_tracker(tracker_id).with_status(status);
    if query.updated_after.is_some() || query.updated_before.is_some() {
        filter = filter.updated_between(
            query.updated_after.map(|t| t.date_naive()),
            query.updated_before.map(|t| t.date_naive()),
        );
    }
    filter
}

/// Convert a wire issue; an absent description becomes empty
pub fn to_source_issue(issue: redmine::Issue) -> SourceIssue {
    SourceIssue {
        id: IssueId(issue.id),
        tracker: NamedRef::new(issue.tracker.id, issue.tracker.name),
        status: issue.status.name,
        subject: issue.subject,
        description: issue.description.unwrap_or_default(),
        start_date: issue.start_date,
        due_date: issue.due_date,
        project: ProjectId(issue.project.id),
        custom_fields: issue
            .custom_fields
            .into_iter()
            .map(|f| CustomField::new(f.name, field_value(f.value)))
            .collect(),
        updated_on: issue.updated_on,
    }
}

fn missing_labels(labels: &StatusLabels, statuses: &[redmine::IssueStatus]) -> Vec<String> {
    [&labels.new, &labels.confirmed, &labels.cancelled]
        .into_iter()
        .filter(|label| !statuses.iter().any(|s| s.name == label.trim()))
        .cloned()
        .collect()
}

fn field_value(value: CustomValue) -> FieldValue {
    match value {
        CustomValue::Empty => FieldValue::Empty,
        CustomValue::Text(s) => FieldValue::Text(s),
        CustomValue::List(items) => FieldValue::List(items),
        CustomValue::Other(v) => FieldValue::Unexpected(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn wire_issue() -> redmine::Issue {
        serde_json::from_value(serde_json::json!({
            "id": 42,
            "project": {"id": 7, "name": "Kultur"},
            "tracker": {"id": 3, "name": "Termin"},
            "status": {"id": 2, "name": "Bestätigt"},
            "subject": "Konzert",
            "start_date": "2024-01-10",
            "custom_fields": [
                {"id": 1, "name": "Startzeit", "value": "19:30"},
                {"id": 2, "name": "Kategorien", "multiple": true, "value": ["Jazz"]},
                {"id": 3, "name": "Adresse", "value": null},
                {"id": 4, "name": "Ende", "value": 23}
            ],
            "updated_on": "2024-01-05T10:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_missing_labels() {
        let statuses: Vec<redmine::IssueStatus> = serde_json::from_value(serde_json::json!([
            {"id": 1, "name": "Neu"},
            {"id": 2, "name": "Bestätigt"},
            {"id": 5, "name": "Erledigt", "is_closed": true}
        ]))
        .unwrap();

        assert_eq!(
            missing_labels(&StatusLabels::default(), &statuses),
            vec!["Abgesagt".to_string()]
        );
    }

    #[test]
    fn test_to_source_issue() {
        let issue = to_source_issue(wire_issue());

        assert_eq!(issue.id, IssueId(42));
        assert_eq!(issue.project, ProjectId(7));
        assert_eq!(issue.tracker.name, "Termin");
        assert_eq!(issue.status, "Bestätigt");
        assert_eq!(issue.description, "");
        assert_eq!(issue.start_date, NaiveDate::from_ymd_opt(2024, 1, 10));
        assert_eq!(issue.due_date, None);
        assert_eq!(
            issue.custom_field("Startzeit"),
            Some(&FieldValue::Text("19:30".to_string()))
        );
        assert_eq!(
            issue.custom_field("Kategorien"),
            Some(&FieldValue::List(vec!["Jazz".to_string()]))
        );
        assert_eq!(issue.custom_field("Adresse"), Some(&FieldValue::Empty));
        assert_eq!(
            issue.custom_field("Ende"),
            Some(&FieldValue::Unexpected("23".to_string()))
        );
        assert_eq!(
            issue.updated_on,
            Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_issue_filter_encodes_window_by_day() {
        let query = IssueQuery::new(vec![3])
            .with_status(StatusFilter::All)
            .updated_between(
                Some(Utc.with_ymd_and_hms(2024, 1, 5, 22, 0, 0).unwrap()),
                Some(Utc.with_ymd_and_hms(2024, 1, 6, 1, 0, 0).unwrap()),
            );

        let pairs = issue_filter(&query, 3).query_pairs();
        assert!(pairs.contains(&("tracker_id", "3".to_string())));
        assert!(pairs.contains(&("status_id", "*".to_string())));
        assert!(pairs.contains(&("updated_on", "><2024-01-05|2024-01-06".to_string())));
    }

    #[test]
    fn test_issue_filter_without_window() {
        let pairs = issue_filter(&IssueQuery::new(vec![3]), 3).query_pairs();
        assert!(!pairs.iter().any(|(k, _)| *k == "updated_on"));
    }

    #[test]
    fn test_from_config() {
        let config = RedmineConfig::new("https://redmine.example.org/");
        assert!(RedmineAdapter::from_config(&config).is_ok());
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let config = RedmineConfig::new("redmine.example.org");
        assert!(RedmineAdapter::from_config(&config).is_err());
    }
}
