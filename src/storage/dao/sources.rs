//! Source records: insert, lookup, destination join and bookkeeping updates

use std::collections::BTreeSet;

use rusqlite::{params, params_from_iter, OptionalExtension, Params, Row};
use tracing::debug;
use url::Url;

use super::{column, conversion_error, opt_u64_column, placeholders, text_values, url_column, MeasurementDao};
use crate::measurement::{
    join_u64_list, parse_u64_list, u64_to_sql, AttributionMode, Source, SourceStatus,
};
use crate::site::SurfaceType;
use crate::{Error, Result};

/// Column list matching [`MeasurementDao::row_to_source`]
pub(super) const SOURCE_COLUMNS: &str = "_id, event_id, publisher, publisher_type, enrollment_id, \
    registrant, event_time, expiry_time, event_report_window, aggregatable_report_window, priority, \
    status, source_type, attribution_mode, install_attribution_window, install_cooldown_window, \
    is_install_attributed, install_time, event_report_dedup_keys, aggregate_report_dedup_keys, \
    registration_id, registration_origin, shared_aggregation_keys, filter_data, aggregate_source, \
    aggregate_contributions, debug_key, debug_reporting, ad_id_permission, ar_debug_permission, \
    debug_join_key, platform_ad_id, debug_ad_id";

impl MeasurementDao<'_> {
    // ========== Source Operations ==========

    /// Insert a source and its destinations.
    ///
    /// Returns `false` without writing when the store is at its size ceiling.
    pub fn insert_source(&self, source: &Source) -> Result<bool> {
        match self.ensure_capacity() {
            Ok(()) => {}
            Err(Error::CapacityExceeded { size, limit }) => {
                debug!(size, limit, source_id = %source.id, "store full, source dropped");
                return Ok(false);
            }
            Err(err) => return Err(err),
        }

        self.conn.execute(
            &format!(
                "INSERT INTO msmt_source ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, \
                 ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, \
                 ?30, ?31, ?32, ?33)",
                SOURCE_COLUMNS
            ),
            params![
                source.id,
                u64_to_sql(source.event_id),
                source.publisher.as_str(),
                source.publisher_type.as_i64(),
                source.enrollment_id,
                source.registrant.as_str(),
                source.event_time,
                source.expiry_time,
                source.event_report_window,
                source.aggregatable_report_window,
                source.priority,
                source.status.as_i64(),
                source.source_type.as_str(),
                source.attribution_mode.as_i64(),
                source.install_attribution_window,
                source.install_cooldown_window,
                source.is_install_attributed,
                source.install_time,
                join_u64_list(&source.event_report_dedup_keys),
                join_u64_list(&source.aggregate_report_dedup_keys),
                source.registration_id,
                source.registration_origin.as_str(),
                source.shared_aggregation_keys,
                source.filter_data,
                source.aggregate_source,
                source.aggregate_contributions,
                source.debug_key.map(u64_to_sql),
                source.debug_reporting,
                source.ad_id_permission,
                source.ar_debug_permission,
                source.debug_join_key,
                source.platform_ad_id,
                source.debug_ad_id,
            ],
        )?;

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO msmt_source_destination (source_id, destination, destination_type) VALUES (?1, ?2, ?3)",
        )?;
        for (surface, destinations) in [
            (SurfaceType::App, &source.app_destinations),
            (SurfaceType::Web, &source.web_destinations),
        ] {
            for destination in destinations {
                stmt.execute(params![source.id, destination.as_str(), surface.as_i64()])?;
            }
        }
        Ok(true)
    }

    /// Get a source with its destinations
    pub fn get_source(&self, source_id: &str) -> Result<Source> {
        let source = self
            .conn
            .query_row(
                &format!("SELECT {} FROM msmt_source WHERE _id = ?1", SOURCE_COLUMNS),
                [source_id],
                |row| self.row_to_source(row),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Source {}", source_id)))?;
        self.with_destinations(source)
    }

    /// App and web destinations of a source, duplicates preserved
    pub fn get_source_destinations(&self, source_id: &str) -> Result<(Vec<Url>, Vec<Url>)> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT destination, destination_type FROM msmt_source_destination WHERE source_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([source_id], |row| {
                let surface: i64 = row.get(1)?;
                Ok((url_column(row, 0)?, column(1, SurfaceType::from_i64(surface))?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut app = Vec::new();
        let mut web = Vec::new();
        for (destination, surface) in rows {
            match surface {
                SurfaceType::App => app.push(destination),
                SurfaceType::Web => web.push(destination),
            }
        }
        Ok((app, web))
    }

    /// Set the status of every listed source; fails if any id is unknown
    pub fn update_source_status(&self, source_ids: &[String], status: SourceStatus) -> Result<()> {
        let ids: BTreeSet<&str> = source_ids.iter().map(String::as_str).collect();
        let ids: Vec<&str> = ids.into_iter().collect();
        let mut updated = 0;
        for chunk in ids.chunks(self.config.chunk_size()) {
            let mut values = vec![rusqlite::types::Value::Integer(status.as_i64())];
            values.extend(text_values(chunk.iter().copied()));
            updated += self.conn.execute(
                &format!("UPDATE msmt_source SET status = ? WHERE _id IN ({})", placeholders(chunk.len())),
                params_from_iter(values),
            )?;
        }
        if updated != ids.len() {
            return Err(Error::NotFound(format!(
                "Source status update matched {} of {} sources",
                updated,
                ids.len()
            )));
        }
        Ok(())
    }

    /// Replace the stored event-report dedup keys with the source's list
    pub fn update_source_event_report_dedup_keys(&self, source: &Source) -> Result<()> {
        self.update_single_source(
            "UPDATE msmt_source SET event_report_dedup_keys = ?1 WHERE _id = ?2",
            params![join_u64_list(&source.event_report_dedup_keys), source.id],
            &source.id,
        )
    }

    /// Replace the stored aggregate-report dedup keys with the source's list
    pub fn update_source_aggregate_report_dedup_keys(&self, source: &Source) -> Result<()> {
        self.update_single_source(
            "UPDATE msmt_source SET aggregate_report_dedup_keys = ?1 WHERE _id = ?2",
            params![join_u64_list(&source.aggregate_report_dedup_keys), source.id],
            &source.id,
        )
    }

    pub fn update_source_aggregate_contributions(&self, source: &Source) -> Result<()> {
        self.update_single_source(
            "UPDATE msmt_source SET aggregate_contributions = ?1 WHERE _id = ?2",
            params![source.aggregate_contributions, source.id],
            &source.id,
        )
    }

    fn update_single_source<P: Params>(&self, sql: &str, params: P, source_id: &str) -> Result<()> {
        match self.conn.execute(sql, params)? {
            1 => Ok(()),
            _ => Err(Error::NotFound(format!("Source {}", source_id))),
        }
    }

    /// Exclude a source from cross-network attribution under `enrollment_id`
    pub fn insert_ignored_source_for_enrollment(&self, source_id: &str, enrollment_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO msmt_xna_ignored_sources (source_id, enrollment_id) VALUES (?1, ?2)",
            params![source_id, enrollment_id],
        )?;
        Ok(())
    }

    /// Run a source query and load destinations for each row
    pub(super) fn query_sources<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Source>> {
        let mut stmt = self.conn.prepare(sql)?;
        let sources = stmt
            .query_map(params, |row| self.row_to_source(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        sources
            .into_iter()
            .map(|source| self.with_destinations(source))
            .collect()
    }

    pub(super) fn with_destinations(&self, mut source: Source) -> Result<Source> {
        let (app, web) = self.get_source_destinations(&source.id)?;
        source.app_destinations = app;
        source.web_destinations = web;
        Ok(source)
    }

    /// Helper to convert a row to a Source (destinations left empty)
    pub(super) fn row_to_source(&self, row: &Row) -> rusqlite::Result<Source> {
        let publisher_type: i64 = row.get(3)?;
        let status: i64 = row.get(11)?;
        let source_type: String = row.get(12)?;
        let attribution_mode: i64 = row.get(13)?;
        let event_report_dedup_keys: Option<String> = row.get(18)?;
        let aggregate_report_dedup_keys: Option<String> = row.get(19)?;
        let event_id: i64 = row.get(1)?;

        Ok(Source {
            id: row.get(0)?,
            event_id: crate::measurement::u64_from_sql(event_id),
            publisher: url_column(row, 2)?,
            publisher_type: column(3, SurfaceType::from_i64(publisher_type))?,
            app_destinations: Vec::new(),
            web_destinations: Vec::new(),
            enrollment_id: row.get(4)?,
            registrant: url_column(row, 5)?,
            event_time: row.get(6)?,
            expiry_time: row.get(7)?,
            event_report_window: row.get(8)?,
            aggregatable_report_window: row.get(9)?,
            priority: row.get(10)?,
            status: column(11, SourceStatus::from_i64(status))?,
            source_type: source_type.parse().map_err(|e| conversion_error(12, e))?,
            attribution_mode: column(13, AttributionMode::from_i64(attribution_mode))?,
            install_attribution_window: row.get(14)?,
            install_cooldown_window: row.get(15)?,
            is_install_attributed: row.get(16)?,
            install_time: row.get(17)?,
            event_report_dedup_keys: column(18, parse_u64_list(event_report_dedup_keys.as_deref()))?,
            aggregate_report_dedup_keys: column(19, parse_u64_list(aggregate_report_dedup_keys.as_deref()))?,
            registration_id: row.get(20)?,
            registration_origin: url_column(row, 21)?,
            shared_aggregation_keys: row.get(22)?,
            filter_data: row.get(23)?,
            aggregate_source: row.get(24)?,
            aggregate_contributions: row.get(25)?,
            debug_key: opt_u64_column(row, 26)?,
            debug_reporting: row.get(27)?,
            ad_id_permission: row.get(28)?,
            ar_debug_permission: row.get(29)?,
            debug_join_key: row.get(30)?,
            platform_ad_id: row.get(31)?,
            debug_ad_id: row.get(32)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use crate::config::DatastoreConfig;
    use crate::measurement::SourceStatus;
    use crate::Error;

    #[test]
    fn test_source_round_trip_with_destinations() {
        let manager = manager();
        let source = source("S1", 10, 20)
            .event_id(u64::MAX)
            .debug_key(u64::MAX - 1)
            .web_destinations(vec![url("https://a.advertiser.test"), url("https://a.advertiser.test")])
            .aggregate_report_dedup_keys(vec![3, 4])
            .shared_aggregation_keys("[\"campaignCounts\"]")
            .build()
            .unwrap();
        insert_sources(&manager, vec![source.clone()]);

        let fetched = manager.transact(|dao| dao.get_source("S1")).unwrap();
        assert_eq!(fetched, source);

        let (app, web) = manager.transact(|dao| dao.get_source_destinations("S1")).unwrap();
        assert_eq!(app, vec![url(APP_DESTINATION)]);
        assert_eq!(web.len(), 2);
    }

    #[test]
    fn test_get_missing_source_is_not_found() {
        let manager = manager();
        let err = manager.transact(|dao| dao.get_source("nope")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_insert_is_noop_when_store_full() {
        let manager = manager_with(DatastoreConfig {
            max_db_size_bytes: 1,
            ..DatastoreConfig::default()
        });
        let inserted = manager
            .transact(|dao| dao.insert_source(&source("S1", 10, 20).build()?))
            .unwrap();
        assert!(!inserted);
        assert_eq!(manager.transact(|dao| dao.count_rows("msmt_source")).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_source_id_is_constraint_error() {
        let manager = manager();
        insert_sources(&manager, vec![source("S1", 10, 20).build().unwrap()]);
        let err = manager
            .transact(|dao| dao.insert_source(&source("S1", 10, 20).build()?))
            .unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
    }

    #[test]
    fn test_dedup_key_update_replaces() {
        let manager = manager();
        let mut source = source("S1", 10, 20).aggregate_report_dedup_keys(vec![1]).build().unwrap();
        insert_sources(&manager, vec![source.clone()]);

        source.aggregate_report_dedup_keys = vec![1, 2, u64::MAX];
        for _ in 0..2 {
            manager
                .transact(|dao| dao.update_source_aggregate_report_dedup_keys(&source))
                .unwrap();
        }
        let stored = manager.transact(|dao| dao.get_source("S1")).unwrap();
        assert_eq!(stored.aggregate_report_dedup_keys, vec![1, 2, u64::MAX]);

        source.event_report_dedup_keys = vec![7];
        manager
            .transact(|dao| dao.update_source_event_report_dedup_keys(&source))
            .unwrap();
        let stored = manager.transact(|dao| dao.get_source("S1")).unwrap();
        assert_eq!(stored.event_report_dedup_keys, vec![7]);
    }

    #[test]
    fn test_dedup_update_on_missing_source_fails() {
        let manager = manager();
        let source = source("ghost", 10, 20).build().unwrap();
        let err = manager
            .transact(|dao| dao.update_source_aggregate_report_dedup_keys(&source))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_status_update_requires_every_id() {
        let manager = manager();
        insert_sources(
            &manager,
            vec![source("S1", 10, 20).build().unwrap(), source("S2", 10, 20).build().unwrap()],
        );

        manager
            .transact(|dao| dao.update_source_status(&["S1".to_string()], SourceStatus::Ignored))
            .unwrap();
        assert_eq!(manager.transact(|dao| dao.get_source("S1")).unwrap().status, SourceStatus::Ignored);

        let err = manager
            .transact(|dao| dao.update_source_status(&["S2".to_string(), "S9".to_string()], SourceStatus::Ignored))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(manager.transact(|dao| dao.get_source("S2")).unwrap().status, SourceStatus::Active);
    }

    #[test]
    fn test_aggregate_contributions_update() {
        let manager = manager();
        let mut source = source("S1", 10, 20).build().unwrap();
        insert_sources(&manager, vec![source.clone()]);
        source.aggregate_contributions = 65_536;
        manager
            .transact(|dao| dao.update_source_aggregate_contributions(&source))
            .unwrap();
        assert_eq!(manager.transact(|dao| dao.get_source("S1")).unwrap().aggregate_contributions, 65_536);
    }
}
