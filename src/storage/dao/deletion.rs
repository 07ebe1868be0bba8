//! Deletion: explicit deletes, app uninstall cleanup, user deletion
//! requests and retention sweeps
//!
//! Rows owned by a source or trigger go with it through `ON DELETE CASCADE`;
//! nothing here deletes dependents by hand.

use std::collections::BTreeMap;

use rusqlite::{params, params_from_iter, Params};
use tracing::debug;
use url::Url;

use super::{placeholders, text_values, url_column, MeasurementDao};
use crate::measurement::{DataType, ReportStatus, SourceStatus};
use crate::site::{matches_domain, origin_of, Site, SurfaceType, APP_SCHEME};
use crate::storage::schema::ALL_TABLES;
use crate::{Error, Result};

/// How `fetch_matching_sources` / `fetch_matching_triggers` use their filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBehavior {
    /// Return records matching an origin or domain filter
    Delete,
    /// Return records matching neither filter list
    Preserve,
}

impl MeasurementDao<'_> {
    // ========== Delete Operations ==========

    /// Delete sources by id along with everything that references them
    pub fn delete_sources(&self, source_ids: &[String]) -> Result<usize> {
        self.delete_by_ids("msmt_source", source_ids)
    }

    /// Delete triggers by id along with everything that references them
    pub fn delete_triggers(&self, trigger_ids: &[String]) -> Result<usize> {
        self.delete_by_ids("msmt_trigger", trigger_ids)
    }

    fn delete_by_ids(&self, table: &str, ids: &[String]) -> Result<usize> {
        let mut deleted = 0;
        for chunk in ids.chunks(self.config.chunk_size()) {
            deleted += self.conn.execute(
                &format!("DELETE FROM {} WHERE _id IN ({})", table, placeholders(chunk.len())),
                params_from_iter(text_values(chunk.iter().map(String::as_str))),
            )?;
        }
        debug!(table, deleted, "deleted by id");
        Ok(deleted)
    }

    // ========== App Cleanup Operations ==========

    /// Delete every record tied to an app whose site is not among
    /// `installed_apps`. Returns whether anything was deleted.
    pub fn delete_app_records_not_present(&self, installed_apps: &[Url]) -> Result<bool> {
        self.purge_app_sites(installed_apps, "NOT IN")
    }

    /// Delete every record tied to `app`: what it registered, ignored
    /// sources targeting it, and reports and ledger rows naming it
    pub fn delete_app_data(&self, app: &Url) -> Result<bool> {
        self.purge_app_sites(std::slice::from_ref(app), "IN")
    }

    /// Delete queued registrations of exactly `registrant`
    pub fn delete_app_records(&self, registrant: &Url) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM msmt_async_registration_contract WHERE registrant = ?1",
            [registrant.as_str()],
        )?;
        Ok(deleted > 0)
    }

    /// Stage app sites in a temp table, one bound value per insert, then run
    /// the cleanup statements against it. `membership` is `IN` or `NOT IN`.
    fn purge_app_sites(&self, apps: &[Url], membership: &str) -> Result<bool> {
        self.conn.execute_batch(
            "CREATE TEMP TABLE IF NOT EXISTS msmt_app_sites (site TEXT PRIMARY KEY);
             DELETE FROM temp.msmt_app_sites;",
        )?;
        {
            let mut stmt = self
                .conn
                .prepare_cached("INSERT OR IGNORE INTO temp.msmt_app_sites (site) VALUES (?1)")?;
            for app in apps {
                stmt.execute([Site::of(app, SurfaceType::App)?.as_str()])?;
            }
        }

        let app_site = |column: &str| {
            format!(
                "({column} LIKE '{APP_SCHEME}://%' AND msmt_site({column}, {app}) {membership} \
                 (SELECT site FROM temp.msmt_app_sites))",
                app = SurfaceType::App.as_i64(),
            )
        };

        let statements = [
            format!(
                "DELETE FROM msmt_source WHERE {} OR (status = {} AND EXISTS (
                     SELECT 1 FROM msmt_source_destination d
                     WHERE d.source_id = msmt_source._id AND d.destination_type = {} AND {}))",
                app_site("registrant"),
                SourceStatus::Ignored.as_i64(),
                SurfaceType::App.as_i64(),
                app_site("d.destination"),
            ),
            format!("DELETE FROM msmt_trigger WHERE {}", app_site("registrant")),
            format!(
                "DELETE FROM msmt_event_report WHERE EXISTS (
                     SELECT 1 FROM json_each(msmt_event_report.attribution_destination) j WHERE {})",
                app_site("j.value"),
            ),
            format!(
                "DELETE FROM msmt_aggregate_report WHERE {} OR {}",
                app_site("publisher"),
                app_site("attribution_destination"),
            ),
            format!(
                "DELETE FROM msmt_attribution WHERE {} OR {}",
                app_site("source_site"),
                app_site("attribution_destination_site"),
            ),
            format!("DELETE FROM msmt_async_registration_contract WHERE {}", app_site("registrant")),
        ];

        let mut deleted = 0;
        for sql in &statements {
            deleted += self.conn.execute(sql, [])?;
        }
        self.conn.execute("DELETE FROM temp.msmt_app_sites", [])?;

        debug!(apps = apps.len(), membership, deleted, "app records purged");
        Ok(deleted > 0)
    }

    // ========== Retention Operations ==========

    /// Sweep records older than `earliest_valid_insertion_time`.
    ///
    /// Sources and triggers are kept at any age; they leave through
    /// explicit deletes and app cleanup. Pending reports survive regardless of age unless their source or
    /// trigger is gone. Returns the number of rows deleted.
    pub fn delete_expired_records(&self, earliest_valid_insertion_time: i64) -> Result<usize> {
        let cutoff = earliest_valid_insertion_time;
        let delivered = ReportStatus::Delivered.as_i64();
        let mut deleted = 0;

        deleted += self.conn.execute(
            "DELETE FROM msmt_async_registration_contract WHERE request_time < ?1",
            [cutoff],
        )?;
        deleted += self.conn.execute(
            "DELETE FROM msmt_event_report
             WHERE (status = ?1 AND report_time < ?2)
                OR (source_id IS NOT NULL AND source_id NOT IN (SELECT _id FROM msmt_source))
                OR (trigger_id IS NOT NULL AND trigger_id NOT IN (SELECT _id FROM msmt_trigger))",
            params![delivered, cutoff],
        )?;
        deleted += self.conn.execute(
            "DELETE FROM msmt_aggregate_report
             WHERE (status = ?1 AND scheduled_report_time < ?2)
                OR (source_id IS NOT NULL AND source_id NOT IN (SELECT _id FROM msmt_source))
                OR (trigger_id IS NOT NULL AND trigger_id NOT IN (SELECT _id FROM msmt_trigger))",
            params![delivered, cutoff],
        )?;
        deleted += self
            .conn
            .execute("DELETE FROM msmt_attribution WHERE trigger_time < ?1", [cutoff])?;
        deleted += self.conn.execute(
            "DELETE FROM msmt_key_value_data
             WHERE data_type = ?1
               AND _key NOT IN (SELECT registration_id FROM msmt_async_registration_contract)",
            [DataType::RegistrationRedirectCount.as_str()],
        )?;

        debug!(cutoff, deleted, "expired records swept");
        Ok(deleted)
    }

    /// Delete every row of every measurement table not named in `tables_to_exclude`
    pub fn delete_all_measurement_data(&self, tables_to_exclude: &[&str]) -> Result<()> {
        if let Some(unknown) = tables_to_exclude.iter().find(|table| !ALL_TABLES.contains(table)) {
            return Err(Error::Validation(format!("Unknown table: {}", unknown)));
        }
        for table in ALL_TABLES.iter().filter(|table| !tables_to_exclude.contains(table)) {
            self.conn.execute(&format!("DELETE FROM {}", table), [])?;
        }
        Ok(())
    }

    // ========== Deletion Request Operations ==========

    /// Ids of sources registered by `registrant` in `[start, end]` that do
    /// (`Delete`) or do not (`Preserve`) match the filters. Only the
    /// publisher is compared; destinations never pull a source in.
    pub fn fetch_matching_sources(
        &self,
        registrant: &Url,
        start: i64,
        end: i64,
        origins: &[Url],
        domains: &[Url],
        behavior: MatchBehavior,
    ) -> Result<Vec<String>> {
        validate_window(start, end)?;
        let rows = self.query_uri_pairs(
            "SELECT _id, publisher FROM msmt_source
             WHERE registrant = ?1 AND event_time >= ?2 AND event_time <= ?3",
            params![registrant.as_str(), start, end],
        )?;
        Ok(select_matching(rows, origins, domains, behavior))
    }

    /// Ids of triggers registered by `registrant` in `[start, end]` whose
    /// destination does (`Delete`) or does not (`Preserve`) match the filters
    pub fn fetch_matching_triggers(
        &self,
        registrant: &Url,
        start: i64,
        end: i64,
        origins: &[Url],
        domains: &[Url],
        behavior: MatchBehavior,
    ) -> Result<Vec<String>> {
        validate_window(start, end)?;
        let rows = self.query_uri_pairs(
            "SELECT _id, attribution_destination FROM msmt_trigger
             WHERE registrant = ?1 AND trigger_time >= ?2 AND trigger_time <= ?3",
            params![registrant.as_str(), start, end],
        )?;
        Ok(select_matching(rows, origins, domains, behavior))
    }

    fn query_uri_pairs<P: Params>(&self, sql: &str, params: P) -> Result<Vec<(String, Url)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| Ok((row.get(0)?, url_column(row, 1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn validate_window(start: i64, end: i64) -> Result<()> {
    if start > end {
        return Err(Error::Validation(format!("Window start {} is after end {}", start, end)));
    }
    Ok(())
}

fn matches_filters(uri: &Url, origins: &[Url], domains: &[Url]) -> bool {
    let origin = origin_of(uri).ok();
    origins
        .iter()
        .any(|filter| origin.is_some() && origin_of(filter).ok() == origin)
        || domains.iter().any(|filter| matches_domain(uri, filter))
}

/// Keep ids per `behavior`, sorted and deduplicated
fn select_matching(
    rows: Vec<(String, Url)>,
    origins: &[Url],
    domains: &[Url],
    behavior: MatchBehavior,
) -> Vec<String> {
    let mut matched: BTreeMap<String, bool> = BTreeMap::new();
    for (id, uri) in rows {
        let hit = matches_filters(&uri, origins, domains);
        *matched.entry(id).or_insert(false) |= hit;
    }
    matched
        .into_iter()
        .filter(|(_, hit)| match behavior {
            MatchBehavior::Delete => *hit,
            MatchBehavior::Preserve => !*hit,
        })
        .map(|(id, _)| id)
        .collect()
}
