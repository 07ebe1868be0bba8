//! SQLite store handle

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use tracing::debug;

use super::schema;
use crate::site::{origin_of, parse_uri, Site, SurfaceType};
use crate::Result;

/// The single open handle to the measurement store.
///
/// Constructed once by the application and shared through `Arc`; every
/// transaction locks the inner connection for its whole duration, so
/// writers serialize here before SQLite ever sees them.
pub struct MeasurementDb {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl MeasurementDb {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "opened measurement store");
        Self::initialize(conn, Some(path.to_path_buf()))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, None)
    }

    fn initialize(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        register_functions(&conn)?;
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Lock the connection. A panic inside an earlier transaction leaves
    /// SQLite rolled back, so a poisoned lock is still safe to reuse.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current on-disk size of the store in bytes
    pub fn size_bytes(&self) -> Result<u64> {
        store_size(&self.lock())
    }
}

/// `page_count * page_size` for the main database
pub(crate) fn store_size(conn: &Connection) -> Result<u64> {
    let pages: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
    let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
    Ok((pages.max(0) as u64) * (page_size.max(0) as u64))
}

/// SQL access to the site matcher.
///
/// `msmt_site(uri, surface)` and `msmt_origin(uri)` return NULL for
/// values that do not parse, so a bad row never matches anything.
fn register_functions(conn: &Connection) -> Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("msmt_site", 2, flags, |ctx| {
        let uri: Option<String> = ctx.get(0)?;
        let surface: i64 = ctx.get(1)?;
        let site = uri.and_then(|uri| {
            let surface = SurfaceType::from_i64(surface).ok()?;
            Site::parse(&uri, surface).ok()
        });
        Ok(site.map(|site| site.to_string()))
    })?;

    conn.create_scalar_function("msmt_origin", 1, flags, |ctx| {
        let uri: Option<String> = ctx.get(0)?;
        Ok(uri
            .and_then(|uri| parse_uri(&uri).ok())
            .and_then(|uri| origin_of(&uri).ok()))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_function_matches_rust_matcher() {
        let db = MeasurementDb::open_in_memory().unwrap();
        let conn = db.lock();
        let site: Option<String> = conn
            .query_row("SELECT msmt_site('https://a.b.example.test/x', 1)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(site.as_deref(), Some("https://example.test"));

        let app: Option<String> = conn
            .query_row("SELECT msmt_site('android-app://com.example/path', 0)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(app.as_deref(), Some("android-app://com.example"));

        let bad: Option<String> = conn
            .query_row("SELECT msmt_site('garbage', 1)", [], |row| row.get(0))
            .unwrap();
        assert!(bad.is_none());
    }

    #[test]
    fn test_origin_function() {
        let db = MeasurementDb::open_in_memory().unwrap();
        let conn = db.lock();
        let origin: Option<String> = conn
            .query_row("SELECT msmt_origin('https://ad.tech.test:8443/register?x=1')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(origin.as_deref(), Some("https://ad.tech.test:8443"));
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let db = MeasurementDb::open_in_memory().unwrap();
        let enabled: i64 = db.lock().query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_file_store_reports_size_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msmt.db");
        {
            let db = MeasurementDb::open(&path).unwrap();
            assert!(db.size_bytes().unwrap() > 0);
            assert_eq!(db.path(), Some(path.as_path()));
        }
        let reopened = MeasurementDb::open(&path).unwrap();
        let tables: i64 = reopened
            .lock()
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'msmt_%'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tables, schema::ALL_TABLES.len() as i64);
    }
}
