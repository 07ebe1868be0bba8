//! Attribution DAO - the query/mutation surface over the measurement store
//!
//! A `MeasurementDao` is only ever handed out by
//! [`DatastoreManager`](crate::storage::DatastoreManager) and is bound to the
//! transaction it was created for. Operations are grouped by concern:
//! - `sources` / `triggers`: record CRUD, status and bookkeeping updates
//! - `matching`: source-trigger matching, delayed and cross-network lookups
//! - `rate_limits`: privacy counters over sources and the attribution ledger
//! - `install`: install attribution and its undo
//! - `reports`: event/aggregate/debug reports and encryption keys
//! - `registrations`: the async registration queue and key-value data
//! - `deletion`: user deletion requests, uninstall cleanup, retention sweeps

mod sources;
mod triggers;
mod matching;
mod rate_limits;
mod install;
mod reports;
mod registrations;
mod deletion;

pub use deletion::MatchBehavior;

use rusqlite::types::{Type, Value};
use rusqlite::{Connection, Row};
use url::Url;

use super::db::store_size;
use crate::config::DatastoreConfig;
use crate::{Error, Result};

/// Data access bound to one open transaction
pub struct MeasurementDao<'a> {
    conn: &'a Connection,
    config: &'a DatastoreConfig,
}

impl<'a> MeasurementDao<'a> {
    pub(crate) fn new(conn: &'a Connection, config: &'a DatastoreConfig) -> Self {
        Self { conn, config }
    }

    pub fn config(&self) -> &DatastoreConfig {
        self.config
    }

    /// Fail with `CapacityExceeded` once the store reaches its size ceiling
    fn ensure_capacity(&self) -> Result<()> {
        let size = store_size(self.conn)?;
        let limit = self.config.max_db_size_bytes;
        if size >= limit {
            return Err(Error::CapacityExceeded { size, limit });
        }
        Ok(())
    }

    /// Count rows of a measurement table
    pub fn count_rows(&self, table: &str) -> Result<u64> {
        if !super::schema::ALL_TABLES.contains(&table) {
            return Err(Error::Validation(format!("Unknown table: {}", table)));
        }
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Row counts for every measurement table
    pub fn stats(&self) -> Result<Vec<(&'static str, u64)>> {
        super::schema::ALL_TABLES
            .iter()
            .map(|table| Ok((*table, self.count_rows(table)?)))
            .collect()
    }
}

/// `?, ?, ?` with `count` placeholders
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Text values for `params_from_iter`
fn text_values<'s, I>(values: I) -> Vec<Value>
where
    I: IntoIterator<Item = &'s str>,
{
    values.into_iter().map(|value| Value::Text(value.to_string())).collect()
}

fn conversion_error(idx: usize, err: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Read a stored URI column
fn url_column(row: &Row, idx: usize) -> rusqlite::Result<Url> {
    let text: String = row.get(idx)?;
    Url::parse(&text).map_err(|e| conversion_error(idx, e.into()))
}

fn opt_url_column(row: &Row, idx: usize) -> rusqlite::Result<Option<Url>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|text| Url::parse(&text).map_err(|e| conversion_error(idx, e.into())))
        .transpose()
}

/// Read an unsigned 64-bit value stored bit-for-bit
fn opt_u64_column(row: &Row, idx: usize) -> rusqlite::Result<Option<u64>> {
    let value: Option<i64> = row.get(idx)?;
    Ok(value.map(crate::measurement::u64_from_sql))
}

/// Map a domain conversion result into a row error
fn column<T>(idx: usize, value: Result<T>) -> rusqlite::Result<T> {
    value.map_err(|e| conversion_error(idx, e))
}
