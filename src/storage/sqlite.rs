//! SQLite event store

use super::{CategoryCatalog, CommitSummary, EventFilter, EventStore};
use crate::model::{
    CategoryId, EventFields, EventId, EventStatus, EventUrl, GroupId, TargetEvent, UserId,
};
use crate::{EventSyncError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Upper bound of bound parameters per `IN (...)` query
const URL_CHUNK: usize = 500;

const DATE_FORMAT: &str = "%Y-%m-%d";

const EVENT_COLUMNS: &str = "id, url, title, body, startdate, enddate, starttime, endtime, \
     location, address, group_id, status, owner_id, remarks, timezone, alias, created, modified";

/// Event database backed by SQLite
pub struct SqliteEventStore {
    conn: Connection,
    path: Option<PathBuf>,
    pending_adds: Vec<TargetEvent>,
    pending_updates: Vec<TargetEvent>,
}

/// An `events` row before text columns are parsed
struct EventRow {
    id: i64,
    url: String,
    title: String,
    body: String,
    startdate: String,
    enddate: Option<String>,
    starttime: Option<String>,
    endtime: Option<String>,
    location: String,
    address: Option<String>,
    group_id: i64,
    status: String,
    owner_id: i64,
    remarks: String,
    timezone: String,
    alias: String,
    created: String,
    modified: String,
}

impl EventRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            startdate: row.get(4)?,
            enddate: row.get(5)?,
            starttime: row.get(6)?,
            endtime: row.get(7)?,
            location: row.get(8)?,
            address: row.get(9)?,
            group_id: row.get(10)?,
            status: row.get(11)?,
            owner_id: row.get(12)?,
            remarks: row.get(13)?,
            timezone: row.get(14)?,
            alias: row.get(15)?,
            created: row.get(16)?,
            modified: row.get(17)?,
        })
    }

    fn into_event(self, categories: BTreeSet<CategoryId>) -> Result<TargetEvent> {
        let status = EventStatus::from_db_str(&self.status).ok_or_else(|| {
            EventSyncError::Storage(format!(
                "Event {} has unknown status '{}'",
                self.url, self.status
            ))
        })?;

        Ok(TargetEvent {
            id: Some(EventId(self.id)),
            url: EventUrl::new(self.url),
            fields: EventFields {
                title: self.title,
                body: self.body,
                startdate: parse_date(&self.startdate)?,
                enddate: self.enddate.as_deref().map(parse_date).transpose()?,
                starttime: self.starttime,
                endtime: self.endtime,
                location: self.location,
                address: self.address,
                group: GroupId(self.group_id),
                status,
                owner: UserId(self.owner_id),
                categories,
                remarks: self.remarks,
                timezone: self.timezone,
                alias: self.alias,
            },
            created: parse_timestamp(&self.created)?,
            modified: parse_timestamp(&self.modified)?,
        })
    }
}

impl SqliteEventStore {
    /// Open or create an event database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "Opening event database");

        let conn = Connection::open(path)?;
        Self::with_connection(conn, Some(path.to_path_buf()))
    }

    /// In-memory database, for tests and dry runs against fixtures
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        let store = Self {
            conn,
            path,
            pending_adds: Vec::new(),
            pending_updates: Vec::new(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS event_groups (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                startdate TEXT NOT NULL,
                enddate TEXT,
                starttime TEXT,
                endtime TEXT,
                location TEXT NOT NULL,
                address TEXT,
                group_id INTEGER NOT NULL REFERENCES event_groups(id),
                status TEXT NOT NULL,
                owner_id INTEGER NOT NULL REFERENCES users(id),
                remarks TEXT NOT NULL,
                timezone TEXT NOT NULL,
                alias TEXT NOT NULL,
                created TEXT NOT NULL,
                modified TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS event_categories (
                event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                category_id INTEGER NOT NULL REFERENCES categories(id),
                PRIMARY KEY (event_id, category_id)
            );

            CREATE INDEX IF NOT EXISTS idx_events_startdate ON events(startdate);
            CREATE INDEX IF NOT EXISTS idx_events_owner ON events(owner_id);
            "#,
        )?;

        Ok(())
    }

    /// Database file, if not in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert a user (for setup and tests)
    pub fn insert_user(&self, username: &str) -> Result<UserId> {
        self.conn
            .execute("INSERT INTO users (username) VALUES (?1)", [username])?;
        Ok(UserId(self.conn.last_insert_rowid()))
    }

    /// Insert an event group (for setup and tests)
    pub fn insert_group(&self, name: &str) -> Result<GroupId> {
        self.conn
            .execute("INSERT INTO event_groups (name) VALUES (?1)", [name])?;
        Ok(GroupId(self.conn.last_insert_rowid()))
    }

    /// Insert a category (for setup and tests)
    pub fn insert_category(&self, name: &str) -> Result<CategoryId> {
        self.conn
            .execute("INSERT INTO categories (name) VALUES (?1)", [name])?;
        Ok(CategoryId(self.conn.last_insert_rowid()))
    }

    /// Load one committed event by URL
    pub fn get_event_by_url(&self, url: &EventUrl) -> Result<Option<TargetEvent>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM events WHERE url = ?1", EVENT_COLUMNS),
                [url.as_str()],
                EventRow::from_row,
            )
            .optional()?;

        match row {
            Some(row) => {
                let categories = self.load_categories(row.id)?;
                Ok(Some(row.into_event(categories)?))
            }
            None => Ok(None),
        }
    }

    /// Number of committed events
    pub fn count_events(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of staged, uncommitted changes
    pub fn pending_count(&self) -> usize {
        self.pending_adds.len() + self.pending_updates.len()
    }

    fn load_categories(&self, event_id: i64) -> Result<BTreeSet<CategoryId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT category_id FROM event_categories WHERE event_id = ?1")?;
        let ids = stmt
            .query_map([event_id], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids.into_iter().map(CategoryId).collect())
    }

    fn load_rows(&self, urls: Option<&[EventUrl]>) -> Result<Vec<EventRow>> {
        let Some(urls) = urls else {
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT {} FROM events", EVENT_COLUMNS))?;
            let rows = stmt
                .query_map([], EventRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            return Ok(rows);
        };

        let mut rows = Vec::new();
        for chunk in urls.chunks(URL_CHUNK) {
            let sql = format!(
                "SELECT {} FROM events WHERE url IN ({})",
                EVENT_COLUMNS,
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let chunk_rows = stmt
                .query_map(
                    params_from_iter(chunk.iter().map(EventUrl::as_str)),
                    EventRow::from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.extend(chunk_rows);
        }
        Ok(rows)
    }
}

impl EventStore for SqliteEventStore {
    fn query_events(&self, filter: &EventFilter) -> Result<Vec<TargetEvent>> {
        let rows = self.load_rows(filter.urls.as_deref())?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let categories = self.load_categories(row.id)?;
            let event = row.into_event(categories)?;
            if filter.matches(&event) {
                events.push(event);
            }
        }

        tracing::debug!(events = events.len(), "Loaded events in scope");
        Ok(events)
    }

    fn existing_urls(&self, urls: &[EventUrl]) -> Result<HashSet<EventUrl>> {
        let mut existing = HashSet::new();
        for chunk in urls.chunks(URL_CHUNK) {
            let sql = format!(
                "SELECT url FROM events WHERE url IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let found = stmt
                .query_map(params_from_iter(chunk.iter().map(EventUrl::as_str)), |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            existing.extend(found.into_iter().map(EventUrl::new));
        }
        Ok(existing)
    }

    fn add_event(&mut self, event: TargetEvent) -> Result<()> {
        if event.id.is_some() {
            return Err(EventSyncError::Storage(format!(
                "Event {} is already committed",
                event.url
            )));
        }
        if self.pending_adds.iter().any(|e| e.url == event.url) {
            return Err(EventSyncError::Storage(format!(
                "Event {} is already staged",
                event.url
            )));
        }
        self.pending_adds.push(event);
        Ok(())
    }

    fn update_event(&mut self, event: TargetEvent) -> Result<()> {
        let Some(id) = event.id else {
            return Err(EventSyncError::Storage(format!(
                "Event {} has not been committed yet",
                event.url
            )));
        };
        self.pending_updates.retain(|e| e.id != Some(id));
        self.pending_updates.push(event);
        Ok(())
    }

    fn commit(&mut self) -> Result<CommitSummary> {
        let adds = std::mem::take(&mut self.pending_adds);
        let updates = std::mem::take(&mut self.pending_updates);

        let tx = self.conn.transaction()?;

        for event in &adds {
            let f = &event.fields;
            tx.execute(
                r#"
                INSERT INTO events (url, title, body, startdate, enddate, starttime, endtime,
                                    location, address, group_id, status, owner_id, remarks,
                                    timezone, alias, created, modified)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                "#,
                params![
                    event.url.as_str(),
                    f.title,
                    f.body,
                    f.startdate.format(DATE_FORMAT).to_string(),
                    f.enddate.map(|d| d.format(DATE_FORMAT).to_string()),
                    f.starttime,
                    f.endtime,
                    f.location,
                    f.address,
                    f.group.get(),
                    f.status.as_str(),
                    f.owner.get(),
                    f.remarks,
                    f.timezone,
                    f.alias,
                    event.created.to_rfc3339(),
                    event.modified.to_rfc3339(),
                ],
            )?;
            let id = tx.last_insert_rowid();
            insert_categories(&tx, id, &f.categories)?;
        }

        for event in &updates {
            let f = &event.fields;
            let id = event.id.map(EventId::get).unwrap_or_default();
            tx.execute(
                r#"
                UPDATE events
                SET title = ?2, body = ?3, startdate = ?4, enddate = ?5, starttime = ?6,
                    endtime = ?7, location = ?8, address = ?9, group_id = ?10, status = ?11,
                    owner_id = ?12, remarks = ?13, timezone = ?14, alias = ?15, modified = ?16
                WHERE id = ?1
                "#,
                params![
                    id,
                    f.title,
                    f.body,
                    f.startdate.format(DATE_FORMAT).to_string(),
                    f.enddate.map(|d| d.format(DATE_FORMAT).to_string()),
                    f.starttime,
                    f.endtime,
                    f.location,
                    f.address,
                    f.group.get(),
                    f.status.as_str(),
                    f.owner.get(),
                    f.remarks,
                    f.timezone,
                    f.alias,
                    event.modified.to_rfc3339(),
                ],
            )?;
            tx.execute("DELETE FROM event_categories WHERE event_id = ?1", [id])?;
            insert_categories(&tx, id, &f.categories)?;
        }

        tx.commit()?;

        let summary = CommitSummary {
            inserted: adds.len(),
            updated: updates.len(),
        };
        tracing::info!(
            inserted = summary.inserted,
            updated = summary.updated,
            "Committed event changes"
        );
        Ok(summary)
    }

    fn discard(&mut self) -> usize {
        let dropped = self.pending_count();
        self.pending_adds.clear();
        self.pending_updates.clear();
        dropped
    }

    fn find_user_by_name(&self, name: &str) -> Result<Option<UserId>> {
        let id = self
            .conn
            .query_row("SELECT id FROM users WHERE username = ?1", [name], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?;
        Ok(id.map(UserId))
    }

    fn find_group_by_name(&self, name: &str) -> Result<Option<GroupId>> {
        let id = self
            .conn
            .query_row("SELECT id FROM event_groups WHERE name = ?1", [name], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?;
        Ok(id.map(GroupId))
    }

    fn category_catalog(&self) -> Result<CategoryCatalog> {
        let mut stmt = self.conn.prepare("SELECT name, id FROM categories")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, CategoryId(row.get::<_, i64>(1)?)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().collect())
    }
}

fn insert_categories(
    tx: &Connection,
    event_id: i64,
    categories: &BTreeSet<CategoryId>,
) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO event_categories (event_id, category_id) VALUES (?1, ?2)",
    )?;
    for category in categories {
        stmt.execute(params![event_id, category.get()])?;
    }
    Ok(())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| EventSyncError::Parse(format!("Invalid date '{}': {}", s, e)))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EventSyncError::Parse(format!("Invalid timestamp '{}': {}", s, e)))
}
