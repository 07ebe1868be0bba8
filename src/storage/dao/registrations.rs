//! Async registration queue and key-value data

use rusqlite::{params, OptionalExtension, Row};
use url::Url;

use super::{column, conversion_error, opt_url_column, url_column, MeasurementDao};
use crate::measurement::{AsyncRegistration, DataType, KeyValueData, SourceType};
use crate::site::origin_of;
use crate::{Error, Result};

const ASYNC_REGISTRATION_COLUMNS: &str = "_id, registration_uri, top_origin, web_destination, \
    os_destination, verified_destination, registrant, source_type, request_time, retry_count, type, \
    debug_key_allowed, ad_id_permission, registration_id, platform_ad_id";

impl MeasurementDao<'_> {
    // ========== Async Registration Operations ==========

    pub fn insert_async_registration(&self, registration: &AsyncRegistration) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO msmt_async_registration_contract ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, \
                 ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                ASYNC_REGISTRATION_COLUMNS
            ),
            params![
                registration.id,
                registration.registration_uri.as_str(),
                registration.top_origin.as_ref().map(Url::as_str),
                registration.web_destination.as_ref().map(Url::as_str),
                registration.os_destination.as_ref().map(Url::as_str),
                registration.verified_destination.as_ref().map(Url::as_str),
                registration.registrant.as_str(),
                registration.source_type.map(|t| t.as_str()),
                registration.request_time,
                registration.retry_count,
                registration.registration_type.as_str(),
                registration.debug_key_allowed,
                registration.ad_id_permission,
                registration.registration_id,
                registration.platform_ad_id,
            ],
        )?;
        Ok(())
    }

    /// Delete a queued registration; `NotFound` if another worker already took it
    pub fn delete_async_registration(&self, registration_id: &str) -> Result<()> {
        let deleted = self.conn.execute(
            "DELETE FROM msmt_async_registration_contract WHERE _id = ?1",
            [registration_id],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("AsyncRegistration {}", registration_id)));
        }
        Ok(())
    }

    /// Persist the registration's current retry count
    pub fn update_retry_count(&self, registration: &AsyncRegistration) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE msmt_async_registration_contract SET retry_count = ?1 WHERE _id = ?2",
            params![registration.retry_count, registration.id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("AsyncRegistration {}", registration.id)));
        }
        Ok(())
    }

    /// Oldest queued registration below `retry_limit` whose registration
    /// URI origin is not one of `excluded_origins`.
    ///
    /// Excluded origins are staged in a temp table one bound value at a
    /// time, so the list length is not limited by `max_query_parameters`.
    pub fn fetch_next_queued_async_registration(
        &self,
        retry_limit: i64,
        excluded_origins: &[Url],
    ) -> Result<Option<AsyncRegistration>> {
        self.conn.execute_batch(
            "CREATE TEMP TABLE IF NOT EXISTS msmt_excluded_origins (origin TEXT PRIMARY KEY);
             DELETE FROM temp.msmt_excluded_origins;",
        )?;
        {
            let mut stmt = self
                .conn
                .prepare_cached("INSERT OR IGNORE INTO temp.msmt_excluded_origins (origin) VALUES (?1)")?;
            for origin in excluded_origins {
                stmt.execute([origin_of(origin)?])?;
            }
        }

        let registration = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM msmt_async_registration_contract
                     WHERE retry_count < ?1
                       AND msmt_origin(registration_uri) NOT IN (SELECT origin FROM temp.msmt_excluded_origins)
                     ORDER BY request_time ASC, _id LIMIT 1",
                    ASYNC_REGISTRATION_COLUMNS
                ),
                [retry_limit],
                |row| self.row_to_async_registration(row),
            )
            .optional()?;
        self.conn.execute("DELETE FROM temp.msmt_excluded_origins", [])?;
        Ok(registration)
    }

    /// Helper to convert a row to an AsyncRegistration
    fn row_to_async_registration(&self, row: &Row) -> rusqlite::Result<AsyncRegistration> {
        let source_type: Option<String> = row.get(7)?;
        let registration_type: String = row.get(10)?;

        Ok(AsyncRegistration {
            id: row.get(0)?,
            registration_uri: url_column(row, 1)?,
            top_origin: opt_url_column(row, 2)?,
            web_destination: opt_url_column(row, 3)?,
            os_destination: opt_url_column(row, 4)?,
            verified_destination: opt_url_column(row, 5)?,
            registrant: url_column(row, 6)?,
            source_type: source_type
                .map(|t| t.parse::<SourceType>())
                .transpose()
                .map_err(|e| conversion_error(7, e))?,
            request_time: row.get(8)?,
            retry_count: row.get(9)?,
            registration_type: column(10, registration_type.parse())?,
            debug_key_allowed: row.get(11)?,
            ad_id_permission: row.get(12)?,
            registration_id: row.get(13)?,
            platform_ad_id: row.get(14)?,
        })
    }

    // ========== Key-Value Operations ==========

    /// Stored value for `(data_type, key)`; `value` is `None` when unset
    pub fn get_key_value_data(&self, key: &str, data_type: DataType) -> Result<KeyValueData> {
        let value: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT value FROM msmt_key_value_data WHERE data_type = ?1 AND _key = ?2",
                params![data_type.as_str(), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(KeyValueData::new(data_type, key, value.flatten()))
    }

    pub fn insert_or_update_key_value_data(&self, data: &KeyValueData) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO msmt_key_value_data (data_type, _key, value) VALUES (?1, ?2, ?3)",
            params![data.data_type.as_str(), data.key, data.value],
        )?;
        Ok(())
    }

    /// Insert without replacing; a duplicate `(data_type, key)` is a `Constraint` error
    pub fn insert_key_value_data(&self, data: &KeyValueData) -> Result<()> {
        self.conn.execute(
            "INSERT INTO msmt_key_value_data (data_type, _key, value) VALUES (?1, ?2, ?3)",
            params![data.data_type.as_str(), data.key, data.value],
        )?;
        Ok(())
    }
}
