//! Source-trigger matching
//!
//! All three lookups share one destination predicate: the source must
//! declare a destination of the trigger's surface whose site equals the
//! trigger destination's site. Registration origin, not enrollment, decides
//! which sources a trigger may see on its own network.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};
use tracing::debug;

use super::sources::SOURCE_COLUMNS;
use super::MeasurementDao;
use crate::measurement::{Source, SourceStatus, Trigger};
use crate::Result;

/// Destination predicate over the outer `msmt_source` row; binds
/// `?4` = destination surface, `?5` = destination site
const DESTINATION_MATCH: &str = "EXISTS (
    SELECT 1 FROM msmt_source_destination d
    WHERE d.source_id = msmt_source._id
      AND d.destination_type = ?4
      AND msmt_site(d.destination, d.destination_type) = ?5
)";

impl MeasurementDao<'_> {
    // ========== Matching Operations ==========

    /// Active sources from the trigger's registration origin that are live
    /// at trigger time (`event_time <= trigger_time <= expiry_time`) and
    /// target the trigger's destination site. Unordered.
    pub fn get_matching_active_sources(&self, trigger: &Trigger) -> Result<Vec<Source>> {
        let site = trigger.destination_site()?;
        let sql = format!(
            "SELECT {} FROM msmt_source
             WHERE registration_origin = ?1
               AND status = ?2
               AND event_time <= ?3
               AND expiry_time >= ?3
               AND {}",
            SOURCE_COLUMNS, DESTINATION_MATCH
        );
        let sources = self.query_sources(
            &sql,
            params![
                trigger.registration_origin.as_str(),
                SourceStatus::Active.as_i64(),
                trigger.trigger_time,
                trigger.destination_type.as_i64(),
                site.as_str(),
            ],
        )?;
        debug!(trigger_id = %trigger.id, matches = sources.len(), "matched active sources");
        Ok(sources)
    }

    /// The earliest active source registered after the trigger but within
    /// the delayed-registration window
    pub fn get_nearest_delayed_matching_active_source(&self, trigger: &Trigger) -> Result<Option<Source>> {
        let site = trigger.destination_site()?;
        let window_end = trigger.trigger_time + self.config.max_delayed_source_registration_window_ms;
        let sql = format!(
            "SELECT {} FROM msmt_source
             WHERE registration_origin = ?1
               AND status = ?2
               AND event_time > ?3
               AND event_time <= ?6
               AND {}
             ORDER BY event_time ASC, _id
             LIMIT 1",
            SOURCE_COLUMNS, DESTINATION_MATCH
        );
        let mut sources = self.query_sources(
            &sql,
            params![
                trigger.registration_origin.as_str(),
                SourceStatus::Active.as_i64(),
                trigger.trigger_time,
                trigger.destination_type.as_i64(),
                site.as_str(),
                window_end,
            ],
        )?;
        Ok(sources.pop())
    }

    /// Cross-network candidates for `trigger` among sources registered by
    /// `candidate_enrollment_ids`.
    ///
    /// A candidate must carry shared aggregation keys, be live at trigger
    /// time, match the destination site, not be excluded for the trigger's
    /// network, and not belong to a registration chain in which the
    /// trigger's own network also registered. One source per registration
    /// chain is returned (highest priority, then most recent). Returned
    /// sources carry no destinations.
    pub fn fetch_trigger_matching_sources_for_xna(
        &self,
        trigger: &Trigger,
        candidate_enrollment_ids: &[String],
    ) -> Result<Vec<Source>> {
        let candidates: Vec<&str> = candidate_enrollment_ids
            .iter()
            .map(String::as_str)
            .filter(|enrollment| *enrollment != trigger.enrollment_id)
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let site = trigger.destination_site()?;
        let candidate_list = (0..candidates.len())
            .map(|i| format!("?{}", i + 6))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "SELECT {columns} FROM (
                SELECT *, ROW_NUMBER() OVER (
                    PARTITION BY COALESCE(registration_id, _id)
                    ORDER BY priority DESC, event_time DESC, _id
                ) AS chain_rank
                FROM msmt_source
                WHERE enrollment_id IN ({candidates})
                  AND enrollment_id != ?1
                  AND status != ?2
                  AND event_time <= ?3
                  AND expiry_time >= ?3
                  AND {destination}
                  AND shared_aggregation_keys IS NOT NULL
                  AND NOT EXISTS (
                      SELECT 1 FROM msmt_xna_ignored_sources x
                      WHERE x.source_id = msmt_source._id
                        AND (x.enrollment_id = ?1 OR x.enrollment_id IN ({candidates}))
                  )
                  AND (registration_id IS NULL OR registration_id NOT IN (
                      SELECT registration_id FROM msmt_source
                      WHERE enrollment_id = ?1 AND registration_id IS NOT NULL
                  ))
            )
            WHERE chain_rank = 1",
            columns = SOURCE_COLUMNS,
            candidates = candidate_list,
            destination = DESTINATION_MATCH,
        );

        let mut values = vec![
            Value::Text(trigger.enrollment_id.clone()),
            Value::Integer(SourceStatus::MarkedToDelete.as_i64()),
            Value::Integer(trigger.trigger_time),
            Value::Integer(trigger.destination_type.as_i64()),
            Value::Text(site.to_string()),
        ];
        values.extend(candidates.iter().map(|enrollment| Value::Text(enrollment.to_string())));

        let mut stmt = self.conn.prepare(&sql)?;
        let sources = stmt
            .query_map(params_from_iter(values), |row| self.row_to_source(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(trigger_id = %trigger.id, candidates = sources.len(), "cross-network candidates");
        Ok(sources)
    }
}
