//! Trigger records

use std::collections::BTreeSet;

use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::debug;

use super::{column, opt_u64_column, placeholders, text_values, url_column, MeasurementDao};
use crate::measurement::{u64_to_sql, Trigger, TriggerStatus};
use crate::site::SurfaceType;
use crate::{Error, Result};

const TRIGGER_COLUMNS: &str = "_id, attribution_destination, destination_type, enrollment_id, \
    registrant, registration_origin, trigger_time, status, event_triggers, aggregate_trigger_data, \
    aggregate_values, aggregatable_deduplication_keys, filters, not_filters, attribution_config, \
    x_network_key_mapping, debug_key, debug_reporting, ad_id_permission, ar_debug_permission, \
    debug_join_key, platform_ad_id, debug_ad_id";

impl MeasurementDao<'_> {
    // ========== Trigger Operations ==========

    /// Insert a trigger.
    ///
    /// Returns `false` without writing when the store is at its size ceiling.
    pub fn insert_trigger(&self, trigger: &Trigger) -> Result<bool> {
        match self.ensure_capacity() {
            Ok(()) => {}
            Err(Error::CapacityExceeded { size, limit }) => {
                debug!(size, limit, trigger_id = %trigger.id, "store full, trigger dropped");
                return Ok(false);
            }
            Err(err) => return Err(err),
        }

        self.conn.execute(
            &format!(
                "INSERT INTO msmt_trigger ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, \
                 ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
                TRIGGER_COLUMNS
            ),
            params![
                trigger.id,
                trigger.attribution_destination.as_str(),
                trigger.destination_type.as_i64(),
                trigger.enrollment_id,
                trigger.registrant.as_str(),
                trigger.registration_origin.as_str(),
                trigger.trigger_time,
                trigger.status.as_i64(),
                trigger.event_triggers,
                trigger.aggregate_trigger_data,
                trigger.aggregate_values,
                trigger.aggregatable_deduplication_keys,
                trigger.filters,
                trigger.not_filters,
                trigger.attribution_config,
                trigger.x_network_key_mapping,
                trigger.debug_key.map(u64_to_sql),
                trigger.debug_reporting,
                trigger.ad_id_permission,
                trigger.ar_debug_permission,
                trigger.debug_join_key,
                trigger.platform_ad_id,
                trigger.debug_ad_id,
            ],
        )?;
        Ok(true)
    }

    pub fn get_trigger(&self, trigger_id: &str) -> Result<Trigger> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM msmt_trigger WHERE _id = ?1", TRIGGER_COLUMNS),
                [trigger_id],
                |row| self.row_to_trigger(row),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Trigger {}", trigger_id)))
    }

    /// Ids of triggers awaiting attribution, oldest first
    pub fn get_pending_trigger_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT _id FROM msmt_trigger WHERE status = ?1 ORDER BY trigger_time ASC, _id")?;
        let ids = stmt
            .query_map([TriggerStatus::Pending.as_i64()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Set the status of every listed trigger; fails if any id is unknown
    pub fn update_trigger_status(&self, trigger_ids: &[String], status: TriggerStatus) -> Result<()> {
        let ids: BTreeSet<&str> = trigger_ids.iter().map(String::as_str).collect();
        let ids: Vec<&str> = ids.into_iter().collect();
        let mut updated = 0;
        for chunk in ids.chunks(self.config.chunk_size()) {
            let mut values = vec![rusqlite::types::Value::Integer(status.as_i64())];
            values.extend(text_values(chunk.iter().copied()));
            updated += self.conn.execute(
                &format!("UPDATE msmt_trigger SET status = ? WHERE _id IN ({})", placeholders(chunk.len())),
                params_from_iter(values),
            )?;
        }
        if updated != ids.len() {
            return Err(Error::NotFound(format!(
                "Trigger status update matched {} of {} triggers",
                updated,
                ids.len()
            )));
        }
        Ok(())
    }

    /// Distinct debug ad ids an enrollment has used on web sources and triggers
    pub fn count_distinct_debug_ad_ids_used_by_enrollment(&self, enrollment_id: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT debug_ad_id) FROM (
                SELECT debug_ad_id FROM msmt_source
                WHERE enrollment_id = ?1 AND publisher_type = ?2 AND debug_ad_id IS NOT NULL
                UNION ALL
                SELECT debug_ad_id FROM msmt_trigger
                WHERE enrollment_id = ?1 AND destination_type = ?2 AND debug_ad_id IS NOT NULL
            )",
            params![enrollment_id, SurfaceType::Web.as_i64()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Helper to convert a row to a Trigger
    fn row_to_trigger(&self, row: &Row) -> rusqlite::Result<Trigger> {
        let destination_type: i64 = row.get(2)?;
        let status: i64 = row.get(7)?;

        Ok(Trigger {
            id: row.get(0)?,
            attribution_destination: url_column(row, 1)?,
            destination_type: column(2, SurfaceType::from_i64(destination_type))?,
            enrollment_id: row.get(3)?,
            registrant: url_column(row, 4)?,
            registration_origin: url_column(row, 5)?,
            trigger_time: row.get(6)?,
            status: column(7, TriggerStatus::from_i64(status))?,
            event_triggers: row.get(8)?,
            aggregate_trigger_data: row.get(9)?,
            aggregate_values: row.get(10)?,
            aggregatable_deduplication_keys: row.get(11)?,
            filters: row.get(12)?,
            not_filters: row.get(13)?,
            attribution_config: row.get(14)?,
            x_network_key_mapping: row.get(15)?,
            debug_key: opt_u64_column(row, 16)?,
            debug_reporting: row.get(17)?,
            ad_id_permission: row.get(18)?,
            ar_debug_permission: row.get(19)?,
            debug_join_key: row.get(20)?,
            platform_ad_id: row.get(21)?,
            debug_ad_id: row.get(22)?,
        })
    }
}
