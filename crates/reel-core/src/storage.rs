use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::MERGE_WINDOW_MINUTES;
use crate::error::ReelError;
use crate::models::{FetchedMetadata, MediaItem, ResumePoint, WatchSession};

const SCHEMA_V1: &str = include_str!("../../../migrations/001_initial.sql");
const SCHEMA_V2: &str = include_str!("../../../migrations/002_add_metadata_fields.sql");

const ITEM_COLUMNS: &str = "id, path, title, season, title_locked, archived, year, tmdb_id, \
     synopsis, poster_url, backdrop_url, genres, vote_average, vote_count, \
     runtime_minutes, metadata_fetched";

/// SQLite-backed storage for the reel library.
pub struct Storage {
    conn: Connection,
}

/// A media item joined with its resume point for display.
#[derive(Debug, Clone)]
pub struct LibraryRow {
    pub item: MediaItem,
    pub resume: ResumePoint,
}

/// A watch session joined with its item title for display.
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub title: String,
    pub session: WatchSession,
}

impl Storage {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, ReelError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, ReelError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    // ── Media items ─────────────────────────────────────────────

    /// Insert a new item, returning its auto-generated ID.
    pub fn insert_item(&self, item: &MediaItem) -> Result<i64, ReelError> {
        let genres_json = serde_json::to_string(&item.genres).unwrap_or_default();
        self.conn.execute(
            "INSERT INTO media_item (path, title, season, title_locked, archived, year,
             tmdb_id, synopsis, poster_url, backdrop_url, genres, vote_average,
             vote_count, runtime_minutes, metadata_fetched)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                item.path,
                item.title,
                item.season,
                item.title_locked as i32,
                item.archived as i32,
                item.year,
                item.tmdb_id.map(|v| v as i64),
                item.synopsis,
                item.poster_url,
                item.backdrop_url,
                genres_json,
                item.vote_average,
                item.vote_count,
                item.runtime_minutes,
                item.metadata_fetched as i32,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get an item by its local database ID.
    pub fn get_item(&self, id: i64) -> Result<Option<MediaItem>, ReelError> {
        self.conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM media_item WHERE id = ?1"),
                params![id],
                |row| Ok(row_to_item_at(row, 0)),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get an item by its path.
    pub fn get_item_by_path(&self, path: &str) -> Result<Option<MediaItem>, ReelError> {
        self.conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM media_item WHERE path = ?1"),
                params![path],
                |row| Ok(row_to_item_at(row, 0)),
            )
            .optional()
            .map_err(Into::into)
    }

    /// All items joined with their resume points, most recently touched first.
    /// Archived items are excluded unless `include_archived` is set.
    pub fn all_items(&self, include_archived: bool) -> Result<Vec<LibraryRow>, ReelError> {
        let filter = if include_archived {
            ""
        } else {
            "WHERE m.archived = 0"
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT m.id, m.path, m.title, m.season, m.title_locked, m.archived, m.year,
                    m.tmdb_id, m.synopsis, m.poster_url, m.backdrop_url, m.genres,
                    m.vote_average, m.vote_count, m.runtime_minutes, m.metadata_fetched,
                    r.last_file, r.last_index, r.position, r.duration, r.finished, r.updated_at
             FROM media_item m
             LEFT JOIN resume_point r ON r.item_id = m.id
             {filter}
             ORDER BY COALESCE(r.updated_at, m.added_at) DESC"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LibraryRow {
                    item: row_to_item_at(row, 0),
                    resume: row_to_resume_at(row, 16).unwrap_or_default(),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Number of items in the library (archived included).
    pub fn count_items(&self) -> Result<u32, ReelError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM media_item", [], |row| row.get(0))
            .map_err(Into::into)
    }

    /// Update the title; `locked` marks it as user-chosen.
    pub fn set_title(&self, id: i64, title: &str, locked: bool) -> Result<(), ReelError> {
        self.conn.execute(
            "UPDATE media_item SET title = ?1, title_locked = ?2 WHERE id = ?3",
            params![title, locked as i32, id],
        )?;
        Ok(())
    }

    /// Archive or restore an item.
    pub fn set_archived(&self, id: i64, archived: bool) -> Result<(), ReelError> {
        self.conn.execute(
            "UPDATE media_item SET archived = ?1 WHERE id = ?2",
            params![archived as i32, id],
        )?;
        Ok(())
    }

    /// Apply fetched metadata to an item. Passing `None` still marks the item
    /// as fetched so an empty search result is not retried on every launch.
    pub fn apply_metadata(
        &self,
        id: i64,
        metadata: Option<&FetchedMetadata>,
    ) -> Result<(), ReelError> {
        match metadata {
            Some(meta) => {
                let genres_json = serde_json::to_string(&meta.genres).unwrap_or_default();
                self.conn.execute(
                    "UPDATE media_item SET
                        year = ?1, tmdb_id = ?2, synopsis = ?3, poster_url = ?4,
                        backdrop_url = ?5, genres = ?6, vote_average = ?7,
                        vote_count = ?8, runtime_minutes = ?9, metadata_fetched = 1
                     WHERE id = ?10",
                    params![
                        meta.year,
                        meta.tmdb_id.map(|v| v as i64),
                        meta.synopsis,
                        meta.poster_url,
                        meta.backdrop_url,
                        genres_json,
                        meta.vote_average,
                        meta.vote_count,
                        meta.runtime_minutes,
                        id,
                    ],
                )?;
            }
            None => {
                self.conn.execute(
                    "UPDATE media_item SET metadata_fetched = 1 WHERE id = ?1",
                    params![id],
                )?;
            }
        }
        Ok(())
    }

    /// Clear the fetched flag so the next lookup runs again.
    pub fn clear_metadata_fetched(&self, id: i64) -> Result<(), ReelError> {
        self.conn.execute(
            "UPDATE media_item SET metadata_fetched = 0 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    // ── Resume points ───────────────────────────────────────────

    /// Get the resume point for an item.
    pub fn get_resume_point(&self, item_id: i64) -> Result<Option<ResumePoint>, ReelError> {
        self.conn
            .query_row(
                "SELECT last_file, last_index, position, duration, finished, updated_at
                 FROM resume_point WHERE item_id = ?1",
                params![item_id],
                |row| Ok(row_to_resume_at(row, 0)),
            )
            .optional()
            .map(|r| r.flatten())
            .map_err(Into::into)
    }

    /// Insert or update an item's resume point. The stored position is
    /// clamped so it never exceeds a known duration.
    pub fn save_resume_point(&self, item_id: i64, point: &ResumePoint) -> Result<(), ReelError> {
        let position = if point.duration > 0.0 {
            point.position.min(point.duration)
        } else {
            point.position
        };
        self.conn.execute(
            "INSERT INTO resume_point (item_id, last_file, last_index, position,
             duration, finished, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(item_id) DO UPDATE SET
               last_file = excluded.last_file,
               last_index = excluded.last_index,
               position = excluded.position,
               duration = excluded.duration,
               finished = excluded.finished,
               updated_at = excluded.updated_at",
            params![
                item_id,
                point.last_file,
                point.last_index,
                position,
                point.duration,
                point.finished as i32,
                to_db_time(&point.updated_at),
            ],
        )?;
        Ok(())
    }

    // ── Watch sessions ──────────────────────────────────────────

    /// Record a watch session. A session for the same item that started
    /// within the merge window of the previous one extends it instead of
    /// creating a new row.
    pub fn record_session(&self, session: &WatchSession) -> Result<(), ReelError> {
        let cutoff = session.started_at - chrono::Duration::minutes(MERGE_WINDOW_MINUTES);
        let previous: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM watch_session
                 WHERE item_id = ?1 AND ended_at >= ?2
                 ORDER BY ended_at DESC LIMIT 1",
                params![session.item_id, to_db_time(&cutoff)],
                |row| row.get(0),
            )
            .optional()?;

        match previous {
            Some(id) => {
                self.conn.execute(
                    "UPDATE watch_session
                     SET ended_at = ?1, position_end = ?2, file_index = ?3
                     WHERE id = ?4",
                    params![
                        to_db_time(&session.ended_at),
                        session.position_end,
                        session.file_index,
                        id,
                    ],
                )?;
                tracing::debug!(session_id = id, "Merged watch session into previous entry");
            }
            None => {
                self.conn.execute(
                    "INSERT INTO watch_session
                     (item_id, started_at, ended_at, position_start, position_end, file_index)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        session.item_id,
                        to_db_time(&session.started_at),
                        to_db_time(&session.ended_at),
                        session.position_start,
                        session.position_end,
                        session.file_index,
                    ],
                )?;
            }
        }
        Ok(())
    }

    // ── Statistics queries ──────────────────────────────────────

    /// Total wall-clock watch time across all sessions, in seconds.
    pub fn total_watch_secs(&self) -> Result<f64, ReelError> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(
                    (julianday(ended_at) - julianday(started_at)) * 86400
                 ), 0) FROM watch_session",
                [],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Titles ranked by total wall-clock watch time.
    pub fn most_watched(&self, limit: u32) -> Result<Vec<(String, f64)>, ReelError> {
        let mut stmt = self.conn.prepare(
            "SELECT m.title,
                    COALESCE(SUM(
                        (julianday(w.ended_at) - julianday(w.started_at)) * 86400
                    ), 0) AS watch_time
             FROM media_item m
             LEFT JOIN watch_session w ON w.item_id = m.id
             GROUP BY m.id
             ORDER BY watch_time DESC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Date → minutes watched over the last `days` days.
    pub fn streak_calendar(&self, days: u32) -> Result<BTreeMap<String, i64>, ReelError> {
        let mut stmt = self.conn.prepare(
            "SELECT DATE(started_at) AS day,
                    CAST(SUM(
                        (julianday(ended_at) - julianday(started_at)) * 1440
                    ) AS INTEGER) AS minutes
             FROM watch_session
             WHERE DATE(started_at) >= DATE('now', ?1)
             GROUP BY day",
        )?;
        let rows = stmt
            .query_map(params![format!("-{days} days")], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Hour of day (0-23) → minutes watched.
    pub fn viewing_patterns(&self) -> Result<BTreeMap<u32, f64>, ReelError> {
        let mut stmt = self.conn.prepare(
            "SELECT CAST(strftime('%H', started_at) AS INTEGER) AS hour,
                    COALESCE(SUM(
                        (julianday(ended_at) - julianday(started_at)) * 1440
                    ), 0) AS minutes
             FROM watch_session
             GROUP BY hour
             ORDER BY hour",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, f64>(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Recent sessions joined with item titles, newest first.
    pub fn recent_sessions(&self, limit: u32) -> Result<Vec<HistoryRow>, ReelError> {
        let mut stmt = self.conn.prepare(
            "SELECT m.title, w.id, w.item_id, w.started_at, w.ended_at,
                    w.position_start, w.position_end, w.file_index
             FROM watch_session w
             JOIN media_item m ON w.item_id = m.id
             ORDER BY w.started_at DESC, w.id DESC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                let started: String = row.get(3)?;
                let ended: String = row.get(4)?;
                Ok(HistoryRow {
                    title: row.get(0)?,
                    session: WatchSession {
                        id: row.get(1)?,
                        item_id: row.get(2)?,
                        started_at: parse_datetime(&started),
                        ended_at: parse_datetime(&ended),
                        position_start: row.get(5)?,
                        position_end: row.get(6)?,
                        file_index: row.get(7)?,
                    },
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

// ── Migrations ──────────────────────────────────────────────────

/// Run schema migrations using `PRAGMA user_version` for version tracking.
fn run_migrations(conn: &Connection) -> Result<(), ReelError> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    if version < 2 {
        conn.execute_batch(SCHEMA_V2)?;
        conn.pragma_update(None, "user_version", 2)?;
    }
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────

fn to_db_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a datetime string from SQLite (RFC 3339 or `datetime('now')` format).
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return naive.and_utc();
    }
    DateTime::default()
}

// ── Row mapping helpers ─────────────────────────────────────────

fn row_to_item_at(row: &rusqlite::Row<'_>, off: usize) -> MediaItem {
    let genres_str: String = row.get(off + 11).unwrap_or_default();
    let genres: Vec<String> = serde_json::from_str(&genres_str).unwrap_or_default();

    MediaItem {
        id: row.get(off).unwrap_or(0),
        path: row.get(off + 1).unwrap_or_default(),
        title: row.get(off + 2).unwrap_or_default(),
        season: row.get(off + 3).unwrap_or(None),
        title_locked: row.get::<_, i32>(off + 4).unwrap_or(0) != 0,
        archived: row.get::<_, i32>(off + 5).unwrap_or(0) != 0,
        year: row.get(off + 6).unwrap_or(None),
        tmdb_id: row
            .get::<_, Option<i64>>(off + 7)
            .unwrap_or(None)
            .map(|v| v as u64),
        synopsis: row.get(off + 8).unwrap_or(None),
        poster_url: row.get(off + 9).unwrap_or(None),
        backdrop_url: row.get(off + 10).unwrap_or(None),
        genres,
        vote_average: row.get(off + 12).unwrap_or(None),
        vote_count: row.get(off + 13).unwrap_or(None),
        runtime_minutes: row.get(off + 14).unwrap_or(None),
        metadata_fetched: row.get::<_, i32>(off + 15).unwrap_or(0) != 0,
    }
}

/// `None` when the row has no resume point (NULL from a LEFT JOIN).
fn row_to_resume_at(row: &rusqlite::Row<'_>, off: usize) -> Option<ResumePoint> {
    let updated: Option<String> = row.get(off + 5).unwrap_or(None);
    let updated = updated?;

    Some(ResumePoint {
        last_file: row.get(off).unwrap_or(None),
        last_index: row.get(off + 1).unwrap_or(0),
        position: row.get(off + 2).unwrap_or(0.0),
        duration: row.get(off + 3).unwrap_or(0.0),
        finished: row.get::<_, i32>(off + 4).unwrap_or(0) != 0,
        updated_at: parse_datetime(&updated),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn insert_show(storage: &Storage, path: &str, title: &str) -> i64 {
        storage.insert_item(&MediaItem::new(path, title)).unwrap()
    }

    fn session(item_id: i64, started: DateTime<Utc>, secs: i64) -> WatchSession {
        WatchSession {
            id: 0,
            item_id,
            started_at: started,
            ended_at: started + Duration::seconds(secs),
            position_start: 0.0,
            position_end: secs as f64,
            file_index: 0,
        }
    }

    #[test]
    fn test_insert_and_get_item() {
        let db = Storage::open_memory().unwrap();
        let id = insert_show(&db, "/media/severance", "Severance");
        assert!(id > 0);

        let item = db.get_item(id).unwrap().unwrap();
        assert_eq!(item.title, "Severance");
        assert!(!item.metadata_fetched);

        let by_path = db.get_item_by_path("/media/severance").unwrap().unwrap();
        assert_eq!(by_path.id, id);
        assert!(db.get_item_by_path("/media/nope").unwrap().is_none());
    }

    #[test]
    fn test_resume_point_roundtrip() {
        let db = Storage::open_memory().unwrap();
        let id = insert_show(&db, "/media/show", "Show");

        assert!(db.get_resume_point(id).unwrap().is_none());

        let point = ResumePoint {
            last_file: Some("/media/show/e01.mkv".into()),
            last_index: 0,
            position: 431.5,
            duration: 1420.0,
            finished: false,
            updated_at: Utc::now(),
        };
        db.save_resume_point(id, &point).unwrap();

        let loaded = db.get_resume_point(id).unwrap().unwrap();
        assert_eq!(loaded.last_file.as_deref(), Some("/media/show/e01.mkv"));
        assert!((loaded.position - 431.5).abs() < 0.001);
        assert!(!loaded.finished);
    }

    #[test]
    fn test_resume_position_clamped_to_duration() {
        let db = Storage::open_memory().unwrap();
        let id = insert_show(&db, "/media/show", "Show");

        let point = ResumePoint {
            position: 2000.0,
            duration: 1420.0,
            ..Default::default()
        };
        db.save_resume_point(id, &point).unwrap();

        let loaded = db.get_resume_point(id).unwrap().unwrap();
        assert!((loaded.position - 1420.0).abs() < 0.001);
    }

    #[test]
    fn test_session_merge_within_window() {
        let db = Storage::open_memory().unwrap();
        let id = insert_show(&db, "/media/show", "Show");

        let start = Utc::now() - Duration::minutes(30);
        db.record_session(&session(id, start, 600)).unwrap();
        // Resumed 2 minutes after the first session ended.
        db.record_session(&session(id, start + Duration::minutes(12), 300))
            .unwrap();

        let history = db.recent_sessions(10).unwrap();
        assert_eq!(history.len(), 1);
        // End time extended to cover the second session.
        let merged = &history[0].session;
        let expected = start + Duration::minutes(12) + Duration::seconds(300);
        assert!((merged.ended_at - expected).num_seconds().abs() <= 1);
    }

    #[test]
    fn test_session_not_merged_outside_window() {
        let db = Storage::open_memory().unwrap();
        let id = insert_show(&db, "/media/show", "Show");

        let start = Utc::now() - Duration::hours(3);
        db.record_session(&session(id, start, 600)).unwrap();
        db.record_session(&session(id, start + Duration::hours(1), 300))
            .unwrap();

        assert_eq!(db.recent_sessions(10).unwrap().len(), 2);
    }

    #[test]
    fn test_total_and_most_watched() {
        let db = Storage::open_memory().unwrap();
        let long = insert_show(&db, "/media/long", "Long Show");
        let short = insert_show(&db, "/media/short", "Short Show");

        let start = Utc::now() - Duration::hours(4);
        db.record_session(&session(long, start, 3600)).unwrap();
        db.record_session(&session(short, start + Duration::hours(2), 600))
            .unwrap();

        let total = db.total_watch_secs().unwrap();
        assert!((total - 4200.0).abs() < 2.0);

        let ranked = db.most_watched(10).unwrap();
        assert_eq!(ranked[0].0, "Long Show");
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn test_streak_calendar_groups_by_day() {
        let db = Storage::open_memory().unwrap();
        let id = insert_show(&db, "/media/show", "Show");

        let start = Utc::now() - Duration::hours(2);
        db.record_session(&session(id, start, 1800)).unwrap();

        let calendar = db.streak_calendar(365).unwrap();
        let minutes: i64 = calendar.values().sum();
        assert!((29..=31).contains(&minutes), "got {minutes} minutes");
    }

    #[test]
    fn test_archived_hidden_by_default() {
        let db = Storage::open_memory().unwrap();
        let keep = insert_show(&db, "/media/keep", "Keep");
        let hide = insert_show(&db, "/media/hide", "Hide");
        db.set_archived(hide, true).unwrap();

        let visible = db.all_items(false).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].item.id, keep);

        let all = db.all_items(true).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_apply_metadata() {
        let db = Storage::open_memory().unwrap();
        let id = insert_show(&db, "/media/show", "Show");

        let meta = FetchedMetadata {
            year: Some(2022),
            tmdb_id: Some(95396),
            synopsis: Some("A sinister corporate mystery.".into()),
            poster_url: Some("https://image.tmdb.org/t/p/w500/x.jpg".into()),
            genres: vec!["Drama".into(), "Mystery".into()],
            vote_average: Some(8.3),
            vote_count: Some(2500),
            runtime_minutes: Some(50),
            ..Default::default()
        };
        db.apply_metadata(id, Some(&meta)).unwrap();

        let item = db.get_item(id).unwrap().unwrap();
        assert!(item.metadata_fetched);
        assert_eq!(item.year, Some(2022));
        assert_eq!(item.genres, vec!["Drama", "Mystery"]);

        // A miss still marks the item as fetched.
        let other = insert_show(&db, "/media/other", "Other");
        db.apply_metadata(other, None).unwrap();
        assert!(db.get_item(other).unwrap().unwrap().metadata_fetched);
    }
}
