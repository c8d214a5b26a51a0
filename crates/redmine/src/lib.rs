//! Redmine REST API client for Rust
//!
//! A typed, async interface to the parts of the Redmine JSON API needed to
//! read event tickets and write new ones.
//!
//! # Example
//!
//! ```no_run
//! use redmine::{Client, IssueFilter, StatusFilter};
//!
//! # async fn demo() -> redmine::Result<()> {
//! let client = Client::new("https://redmine.example.org")?.with_api_key("secret");
//!
//! // Every issue of tracker 4, open or closed
//! let filter = IssueFilter::new().with_tracker(4).with_status(StatusFilter::All);
//! let issues = client.list_issues(&filter).await?;
//!
//! for issue in issues {
//!     println!("#{} {}", issue.id, issue.subject);
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;

/// Default page size; matches the server-side maximum of most installations.
pub const DEFAULT_PAGE_SIZE: u32 = 60;

/// Per-request timeout for list operations
const LIST_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-request timeout for single resource fetches
const GET_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-request timeout for create operations
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// Lower and upper bounds Redmine accepts for open-ended date ranges
const OPEN_RANGE_START: &str = "1970-01-01";
const OPEN_RANGE_END: &str = "2037-12-31";

/// Errors that can occur when talking to Redmine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid Redmine base URL: {0}")]
    InvalidUrl(String),

    #[error("Redmine authentication failed")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Redmine rejected the request: {0}")]
    Validation(String),

    #[error("Redmine API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure is likely to go away on its own
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RateLimited(_) => true,
            Error::Api { status, .. } => (500..=599).contains(status),
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Result type for Redmine operations
pub type Result<T> = std::result::Result<T, Error>;

/// A `{ "id": .., "name": .. }` reference as embedded in most resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdName {
    pub id: u64,
    pub name: String,
}

/// Value of a custom field
///
/// Redmine sends `null`, a string, or (for multi-value fields) an array of
/// strings. Anything else is kept verbatim in `Other` so callers can reject
/// it per issue instead of failing the whole page.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CustomValue {
    #[default]
    Empty,
    Text(String),
    List(Vec<String>),
    Other(serde_json::Value),
}

impl CustomValue {
    fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CustomValue::Empty,
            serde_json::Value::String(s) => CustomValue::Text(s),
            serde_json::Value::Array(items) => {
                if items.iter().all(|v| v.is_string()) {
                    CustomValue::List(
                        items
                            .into_iter()
                            .filter_map(|v| match v {
                                serde_json::Value::String(s) => Some(s),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    CustomValue::Other(serde_json::Value::Array(items))
                }
            }
            other => CustomValue::Other(other),
        }
    }

    /// Flatten to display text (lists are comma separated)
    pub fn to_text(&self) -> String {
        match self {
            CustomValue::Empty => String::new(),
            CustomValue::Text(s) => s.clone(),
            CustomValue::List(items) => items.join(", "),
            CustomValue::Other(v) => v.to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for CustomValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(CustomValue::from_json(value))
    }
}

impl Serialize for CustomValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            CustomValue::Empty => serializer.serialize_none(),
            CustomValue::Text(s) => serializer.serialize_str(s),
            CustomValue::List(items) => items.serialize(serializer),
            CustomValue::Other(v) => v.serialize(serializer),
        }
    }
}

/// A custom field attached to an issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub value: CustomValue,
}

/// A Redmine issue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub project: IdName,
    pub tracker: IdName,
    pub status: IdName,
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
    pub updated_on: DateTime<Utc>,
    #[serde(default)]
    pub created_on: Option<DateTime<Utc>>,
}

impl Issue {
    /// Look up a custom field by name
    pub fn custom_field(&self, name: &str) -> Option<&CustomField> {
        self.custom_fields.iter().find(|f| f.name == name)
    }
}

/// A Redmine project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub identifier: String,
}

/// An issue status as configured on the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStatus {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub is_closed: bool,
}

/// Custom field value for issue creation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCustomField {
    pub id: u64,
    pub value: CustomValue,
}

/// Request body for creating an issue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewIssue {
    pub project_id: u64,
    pub tracker_id: u64,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_fields: Vec<NewCustomField>,
}

#[derive(Debug, Serialize)]
struct NewIssueEnvelope<'a> {
    issue: &'a NewIssue,
}

#[derive(Debug, Deserialize)]
struct IssueEnvelope {
    issue: Issue,
}

#[derive(Debug, Deserialize)]
struct IssuesPage {
    issues: Vec<Issue>,
    #[serde(default)]
    total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ProjectsPage {
    projects: Vec<Project>,
    #[serde(default)]
    total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TrackersResponse {
    trackers: Vec<IdName>,
}

#[derive(Debug, Deserialize)]
struct StatusesResponse {
    issue_statuses: Vec<IssueStatus>,
}

#[derive(Debug, Deserialize)]
struct ValidationErrors {
    #[serde(default)]
    errors: Vec<String>,
}

/// A page of a paginated listing
trait Page {
    type Item;
    fn into_parts(self) -> (Vec<Self::Item>, Option<u64>);
}

impl Page for IssuesPage {
    type Item = Issue;
    fn into_parts(self) -> (Vec<Issue>, Option<u64>) {
        (self.issues, self.total_count)
    }
}

impl Page for ProjectsPage {
    type Item = Project;
    fn into_parts(self) -> (Vec<Project>, Option<u64>) {
        (self.projects, self.total_count)
    }
}

/// Issue status filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    /// Server default: open issues only
    #[default]
    Open,
    Closed,
    /// Open and closed
    All,
    /// A specific status id
    Id(u64),
}

impl StatusFilter {
    fn as_query(&self) -> String {
        match self {
            StatusFilter::Open => "open".to_string(),
            StatusFilter::Closed => "closed".to_string(),
            StatusFilter::All => "*".to_string(),
            StatusFilter::Id(id) => id.to_string(),
        }
    }
}

/// Date range filter, encoded as Redmine's `><start|end` operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Query value, or `None` when both ends are open
    pub fn to_query(&self) -> Option<String> {
        if self.start.is_none() && self.end.is_none() {
            return None;
        }
        let start = self
            .start
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| OPEN_RANGE_START.to_string());
        let end = self
            .end
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| OPEN_RANGE_END.to_string());
        Some(format!("><{}|{}", start, end))
    }
}

/// Filters for listing issues
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueFilter {
    pub tracker_id: Option<u64>,
    pub status: StatusFilter,
    pub updated_on: DateRange,
}

impl IssueFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracker(mut self, tracker_id: u64) -> Self {
        self.tracker_id = Some(tracker_id);
        self
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn updated_between(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.updated_on = DateRange::new(start, end);
        self
    }

    /// Query string pairs, without pagination
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(id) = self.tracker_id {
            pairs.push(("tracker_id", id.to_string()));
        }
        if self.status != StatusFilter::Open {
            pairs.push(("status_id", self.status.as_query()));
        }
        if let Some(range) = self.updated_on.to_query() {
            pairs.push(("updated_on", range));
        }
        pairs
    }
}

/// Redmine API client
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    page_size: u32,
}

impl Client {
    /// Create a client for the given base URL (e.g. `https://redmine.example.org`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(Error::InvalidUrl(base_url));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key: None,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_key {
            Some(ref key) => request.header("X-Redmine-API-Key", key),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.authorize(self.http.get(&url).query(query));
        let response = request.timeout(timeout).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Unauthorized),
            StatusCode::NOT_FOUND => Err(Error::NotFound(path.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimited(retry_after(&response))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Api {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    /// Fetch every page of a listing
    async fn paginate<P>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<Vec<P::Item>>
    where
        P: Page + DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let mut params: Vec<(&str, String)> = query.to_vec();
            params.push(("offset", offset.to_string()));
            params.push(("limit", self.page_size.to_string()));

            let page: P = self.get_json(path, &params, LIST_TIMEOUT).await?;
            let (batch, total) = page.into_parts();
            let fetched = batch.len() as u64;
            items.extend(batch);
            offset += fetched;

            let exhausted = match total {
                Some(total) => offset >= total,
                None => fetched < u64::from(self.page_size),
            };
            if fetched == 0 || exhausted {
                break;
            }
        }

        Ok(items)
    }

    /// List all issues matching the filter, following pagination
    pub async fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        self.paginate::<IssuesPage>("/issues.json", &filter.query_pairs())
            .await
    }

    /// Get a single issue by id
    pub async fn get_issue(&self, id: u64) -> Result<Issue> {
        let envelope: IssueEnvelope = self
            .get_json(&format!("/issues/{}.json", id), &[], GET_TIMEOUT)
            .await?;
        Ok(envelope.issue)
    }

    /// List all projects visible to the current user
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.paginate::<ProjectsPage>("/projects.json", &[]).await
    }

    /// Find a project by its identifier (the short slug, not the numeric id)
    pub async fn find_project(&self, identifier: &str) -> Result<Option<Project>> {
        let projects = self.list_projects().await?;
        Ok(projects.into_iter().find(|p| p.identifier == identifier))
    }

    /// List all trackers
    pub async fn list_trackers(&self) -> Result<Vec<IdName>> {
        let response: TrackersResponse = self.get_json("/trackers.json", &[], GET_TIMEOUT).await?;
        Ok(response.trackers)
    }

    /// Find a tracker by name
    pub async fn find_tracker(&self, name: &str) -> Result<Option<IdName>> {
        let trackers = self.list_trackers().await?;
        Ok(trackers.into_iter().find(|t| t.name == name))
    }

    /// List all issue statuses
    pub async fn list_statuses(&self) -> Result<Vec<IssueStatus>> {
        let response: StatusesResponse = self
            .get_json("/issue_statuses.json", &[], GET_TIMEOUT)
            .await?;
        Ok(response.issue_statuses)
    }

    /// Create an issue, returning the stored representation
    pub async fn create_issue(&self, issue: &NewIssue) -> Result<Issue> {
        let url = format!("{}/issues.json", self.base_url);
        let body = NewIssueEnvelope { issue };
        let request = self.authorize(self.http.post(&url).json(&body));
        let response = request.timeout(WRITE_TIMEOUT).send().await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => {
                let envelope: IssueEnvelope = response.json().await?;
                Ok(envelope.issue)
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ValidationErrors>(&body)
                    .map(|v| v.errors.join("; "))
                    .unwrap_or(body);
                Err(Error::Validation(message))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimited(retry_after(&response))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Api {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

fn retry_after(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(60)
}
