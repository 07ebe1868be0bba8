//! Event, aggregate and debug reports; aggregation encryption keys
//!
//! The reporting subsystem reads PENDING ids from here and marks reports
//! DELIVERED once uploaded. Event reports keep their destinations as a JSON
//! array so `json_each` can see them in SQL.

use std::collections::BTreeMap;

use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use url::Url;

use super::{column, conversion_error, opt_u64_column, placeholders, url_column, MeasurementDao};
use crate::measurement::{
    u64_to_sql, AggregateEncryptionKey, AggregateReport, DebugReport, DebugReportStatus, EventReport,
    ReportStatus, Source,
};
use crate::site::{Site, SurfaceType};
use crate::{Error, Result};

const EVENT_REPORT_COLUMNS: &str = "_id, source_event_id, enrollment_id, attribution_destination, \
    report_time, trigger_data, trigger_priority, trigger_dedup_key, trigger_time, status, \
    debug_report_status, source_type, randomized_trigger_rate, source_debug_key, trigger_debug_key, \
    source_id, trigger_id, registration_origin";

const AGGREGATE_REPORT_COLUMNS: &str = "_id, publisher, attribution_destination, source_registration_time, \
    scheduled_report_time, enrollment_id, debug_cleartext_payload, status, debug_report_status, \
    api_version, source_debug_key, trigger_debug_key, source_id, trigger_id, dedup_key, registration_origin";

impl MeasurementDao<'_> {
    // ========== Event Report Operations ==========

    pub fn insert_event_report(&self, report: &EventReport) -> Result<()> {
        let destinations: Vec<&str> = report.attribution_destinations.iter().map(Url::as_str).collect();
        self.conn.execute(
            &format!(
                "INSERT INTO msmt_event_report ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, \
                 ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                EVENT_REPORT_COLUMNS
            ),
            params![
                report.id,
                u64_to_sql(report.source_event_id),
                report.enrollment_id,
                serde_json::to_string(&destinations)?,
                report.report_time,
                u64_to_sql(report.trigger_data),
                report.trigger_priority,
                report.trigger_dedup_key.map(u64_to_sql),
                report.trigger_time,
                report.status.as_i64(),
                report.debug_report_status.as_i64(),
                report.source_type.as_str(),
                report.randomized_trigger_rate,
                report.source_debug_key.map(u64_to_sql),
                report.trigger_debug_key.map(u64_to_sql),
                report.source_id,
                report.trigger_id,
                report.registration_origin.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_event_report(&self, report_id: &str) -> Result<EventReport> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM msmt_event_report WHERE _id = ?1", EVENT_REPORT_COLUMNS),
                [report_id],
                |row| self.row_to_event_report(row),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("EventReport {}", report_id)))
    }

    /// Event reports generated from `source`
    pub fn get_source_event_reports(&self, source: &Source) -> Result<Vec<EventReport>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM msmt_event_report WHERE source_id = ?1 ORDER BY report_time, _id",
            EVENT_REPORT_COLUMNS
        ))?;
        let reports = stmt
            .query_map([&source.id], |row| self.row_to_event_report(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reports)
    }

    pub fn delete_event_report(&self, report: &EventReport) -> Result<()> {
        self.conn
            .execute("DELETE FROM msmt_event_report WHERE _id = ?1", [&report.id])?;
        Ok(())
    }

    pub fn mark_event_report_status(&self, report_id: &str, status: ReportStatus) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE msmt_event_report SET status = ?1 WHERE _id = ?2",
            params![status.as_i64(), report_id],
        )?;
        if updated != 1 {
            return Err(Error::NotFound(format!("EventReport {}", report_id)));
        }
        Ok(())
    }

    pub fn mark_event_debug_report_delivered(&self, report_id: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE msmt_event_report SET debug_report_status = ?1 WHERE _id = ?2",
            params![DebugReportStatus::Delivered.as_i64(), report_id],
        )?;
        if updated != 1 {
            return Err(Error::NotFound(format!("EventReport {}", report_id)));
        }
        Ok(())
    }

    /// Pending event reports due in `[start, end]`
    pub fn get_pending_event_report_ids_in_window(&self, start: i64, end: i64) -> Result<Vec<String>> {
        self.query_ids(
            "SELECT _id FROM msmt_event_report
             WHERE status = ?1 AND report_time >= ?2 AND report_time <= ?3
             ORDER BY report_time, _id",
            params![ReportStatus::Pending.as_i64(), start, end],
        )
    }

    pub fn get_pending_debug_event_report_ids(&self) -> Result<Vec<String>> {
        self.query_ids(
            "SELECT _id FROM msmt_event_report WHERE debug_report_status = ?1 ORDER BY _id",
            [DebugReportStatus::Pending.as_i64()],
        )
    }

    /// Pending event reports whose source was registered by `app`
    pub fn get_pending_event_report_ids_for_given_app(&self, app: &Url) -> Result<Vec<String>> {
        self.query_ids(
            "SELECT e._id FROM msmt_event_report e
             JOIN msmt_source s ON e.source_id = s._id
             WHERE e.status = ?1 AND s.registrant = ?2
             ORDER BY e._id",
            params![ReportStatus::Pending.as_i64(), app.as_str()],
        )
    }

    /// Event reports naming a destination on the same site as `destination`
    pub fn get_num_event_reports_per_destination(&self, destination: &Url, surface: SurfaceType) -> Result<u64> {
        let site = Site::of(destination, surface)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM msmt_event_report e
             WHERE EXISTS (
                 SELECT 1 FROM json_each(e.attribution_destination) j
                 WHERE msmt_site(j.value, ?1) = ?2
             )",
            params![surface.as_i64(), site.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Event reports produced by any of `source_ids` or any of `trigger_ids`
    pub fn fetch_matching_event_reports(
        &self,
        source_ids: &[String],
        trigger_ids: &[String],
    ) -> Result<Vec<EventReport>> {
        self.reports_by_owner(
            EVENT_REPORT_COLUMNS,
            "msmt_event_report",
            source_ids,
            trigger_ids,
            |row| self.row_to_event_report(row),
            |report| report.id.as_str(),
        )
    }

    // ========== Aggregate Report Operations ==========

    pub fn insert_aggregate_report(&self, report: &AggregateReport) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO msmt_aggregate_report ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, \
                 ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                AGGREGATE_REPORT_COLUMNS
            ),
            params![
                report.id,
                report.publisher.as_str(),
                report.attribution_destination.as_str(),
                report.source_registration_time,
                report.scheduled_report_time,
                report.enrollment_id,
                report.debug_cleartext_payload,
                report.status.as_i64(),
                report.debug_report_status.as_i64(),
                report.api_version,
                report.source_debug_key.map(u64_to_sql),
                report.trigger_debug_key.map(u64_to_sql),
                report.source_id,
                report.trigger_id,
                report.dedup_key.map(u64_to_sql),
                report.registration_origin.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_aggregate_report(&self, report_id: &str) -> Result<AggregateReport> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM msmt_aggregate_report WHERE _id = ?1", AGGREGATE_REPORT_COLUMNS),
                [report_id],
                |row| self.row_to_aggregate_report(row),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("AggregateReport {}", report_id)))
    }

    pub fn mark_aggregate_report_status(&self, report_id: &str, status: ReportStatus) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE msmt_aggregate_report SET status = ?1 WHERE _id = ?2",
            params![status.as_i64(), report_id],
        )?;
        if updated != 1 {
            return Err(Error::NotFound(format!("AggregateReport {}", report_id)));
        }
        Ok(())
    }

    pub fn mark_aggregate_debug_report_delivered(&self, report_id: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE msmt_aggregate_report SET debug_report_status = ?1 WHERE _id = ?2",
            params![DebugReportStatus::Delivered.as_i64(), report_id],
        )?;
        if updated != 1 {
            return Err(Error::NotFound(format!("AggregateReport {}", report_id)));
        }
        Ok(())
    }

    /// Pending aggregate reports scheduled in `[start, end]`
    pub fn get_pending_aggregate_report_ids_in_window(&self, start: i64, end: i64) -> Result<Vec<String>> {
        self.query_ids(
            "SELECT _id FROM msmt_aggregate_report
             WHERE status = ?1 AND scheduled_report_time >= ?2 AND scheduled_report_time <= ?3
             ORDER BY scheduled_report_time, _id",
            params![ReportStatus::Pending.as_i64(), start, end],
        )
    }

    pub fn get_pending_aggregate_debug_report_ids(&self) -> Result<Vec<String>> {
        self.query_ids(
            "SELECT _id FROM msmt_aggregate_report WHERE debug_report_status = ?1 ORDER BY _id",
            [DebugReportStatus::Pending.as_i64()],
        )
    }

    /// Pending aggregate reports whose source was registered by `app`
    pub fn get_pending_aggregate_report_ids_for_given_app(&self, app: &Url) -> Result<Vec<String>> {
        self.query_ids(
            "SELECT a._id FROM msmt_aggregate_report a
             JOIN msmt_source s ON a.source_id = s._id
             WHERE a.status = ?1 AND s.registrant = ?2
             ORDER BY a._id",
            params![ReportStatus::Pending.as_i64(), app.as_str()],
        )
    }

    /// Aggregate reports whose destination is on the same site as `destination`
    pub fn get_num_aggregate_reports_per_destination(
        &self,
        destination: &Url,
        surface: SurfaceType,
    ) -> Result<u64> {
        let site = Site::of(destination, surface)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM msmt_aggregate_report WHERE msmt_site(attribution_destination, ?1) = ?2",
            params![surface.as_i64(), site.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Aggregate reports produced by any of `source_ids` or any of `trigger_ids`
    pub fn fetch_matching_aggregate_reports(
        &self,
        source_ids: &[String],
        trigger_ids: &[String],
    ) -> Result<Vec<AggregateReport>> {
        self.reports_by_owner(
            AGGREGATE_REPORT_COLUMNS,
            "msmt_aggregate_report",
            source_ids,
            trigger_ids,
            |row| self.row_to_aggregate_report(row),
            |report| report.id.as_str(),
        )
    }

    // ========== Encryption Key Operations ==========

    pub fn insert_aggregate_encryption_key(&self, key: &AggregateEncryptionKey) -> Result<()> {
        self.conn.execute(
            "INSERT INTO msmt_aggregate_encryption_key (_id, key_id, public_key, expiry) VALUES (?1, ?2, ?3, ?4)",
            params![key.id, key.key_id, key.public_key, key.expiry],
        )?;
        Ok(())
    }

    /// Keys with `expiry >= expiry`
    pub fn get_non_expired_aggregate_encryption_keys(&self, expiry: i64) -> Result<Vec<AggregateEncryptionKey>> {
        let mut stmt = self.conn.prepare(
            "SELECT _id, key_id, public_key, expiry FROM msmt_aggregate_encryption_key
             WHERE expiry >= ?1 ORDER BY expiry, _id",
        )?;
        let keys = stmt
            .query_map([expiry], |row| {
                Ok(AggregateEncryptionKey {
                    id: row.get(0)?,
                    key_id: row.get(1)?,
                    public_key: row.get(2)?,
                    expiry: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    /// Delete keys with `expiry < expiry`
    pub fn delete_expired_aggregate_encryption_keys(&self, expiry: i64) -> Result<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM msmt_aggregate_encryption_key WHERE expiry < ?1", [expiry])?)
    }

    // ========== Debug Report Operations ==========

    pub fn insert_debug_report(&self, report: &DebugReport) -> Result<()> {
        self.conn.execute(
            "INSERT INTO msmt_debug_report (_id, type, body, enrollment_id, registration_origin)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                report.id,
                report.report_type,
                serde_json::to_string(&report.body)?,
                report.enrollment_id,
                report.registration_origin.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_debug_report(&self, report_id: &str) -> Result<DebugReport> {
        self.conn
            .query_row(
                "SELECT _id, type, body, enrollment_id, registration_origin FROM msmt_debug_report WHERE _id = ?1",
                [report_id],
                |row| {
                    let body: String = row.get(2)?;
                    Ok(DebugReport {
                        id: row.get(0)?,
                        report_type: row.get(1)?,
                        body: serde_json::from_str(&body).map_err(|e| conversion_error(2, e.into()))?,
                        enrollment_id: row.get(3)?,
                        registration_origin: url_column(row, 4)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("DebugReport {}", report_id)))
    }

    pub fn get_debug_report_ids(&self) -> Result<Vec<String>> {
        self.query_ids("SELECT _id FROM msmt_debug_report ORDER BY _id", [])
    }

    pub fn delete_debug_report(&self, report_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM msmt_debug_report WHERE _id = ?1", [report_id])?;
        Ok(())
    }

    // ========== Helpers ==========

    fn query_ids<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map(params, |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Union of the rows owned by `source_ids` and by `trigger_ids`, each
    /// report once, ordered by id
    fn reports_by_owner<T, M, I>(
        &self,
        columns: &str,
        table: &str,
        source_ids: &[String],
        trigger_ids: &[String],
        map_row: M,
        id_of: I,
    ) -> Result<Vec<T>>
    where
        M: Fn(&Row) -> rusqlite::Result<T>,
        I: Fn(&T) -> &str,
    {
        let mut found = BTreeMap::new();
        for (owner, ids) in [("source_id", source_ids), ("trigger_id", trigger_ids)] {
            for chunk in ids.chunks(self.config.chunk_size()) {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM {} WHERE {} IN ({})",
                    columns,
                    table,
                    owner,
                    placeholders(chunk.len())
                ))?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| map_row(row))?;
                for row in rows {
                    let report = row?;
                    let id = id_of(&report).to_string();
                    found.entry(id).or_insert(report);
                }
            }
        }
        Ok(found.into_values().collect())
    }

    /// Helper to convert a row to an EventReport
    fn row_to_event_report(&self, row: &Row) -> rusqlite::Result<EventReport> {
        let destinations: String = row.get(3)?;
        let destinations: Vec<String> =
            serde_json::from_str(&destinations).map_err(|e| conversion_error(3, e.into()))?;
        let attribution_destinations = destinations
            .iter()
            .map(|d| Url::parse(d).map_err(|e| conversion_error(3, e.into())))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let status: i64 = row.get(9)?;
        let debug_status: i64 = row.get(10)?;
        let source_type: String = row.get(11)?;
        let source_event_id: i64 = row.get(1)?;
        let trigger_data: i64 = row.get(5)?;

        Ok(EventReport {
            id: row.get(0)?,
            source_event_id: crate::measurement::u64_from_sql(source_event_id),
            enrollment_id: row.get(2)?,
            attribution_destinations,
            report_time: row.get(4)?,
            trigger_data: crate::measurement::u64_from_sql(trigger_data),
            trigger_priority: row.get(6)?,
            trigger_dedup_key: opt_u64_column(row, 7)?,
            trigger_time: row.get(8)?,
            status: column(9, ReportStatus::from_i64(status))?,
            debug_report_status: column(10, DebugReportStatus::from_i64(debug_status))?,
            source_type: source_type.parse().map_err(|e| conversion_error(11, e))?,
            randomized_trigger_rate: row.get(12)?,
            source_debug_key: opt_u64_column(row, 13)?,
            trigger_debug_key: opt_u64_column(row, 14)?,
            source_id: row.get(15)?,
            trigger_id: row.get(16)?,
            registration_origin: url_column(row, 17)?,
        })
    }

    /// Helper to convert a row to an AggregateReport
    fn row_to_aggregate_report(&self, row: &Row) -> rusqlite::Result<AggregateReport> {
        let status: i64 = row.get(7)?;
        let debug_status: i64 = row.get(8)?;

        Ok(AggregateReport {
            id: row.get(0)?,
            publisher: url_column(row, 1)?,
            attribution_destination: url_column(row, 2)?,
            source_registration_time: row.get(3)?,
            scheduled_report_time: row.get(4)?,
            enrollment_id: row.get(5)?,
            debug_cleartext_payload: row.get(6)?,
            status: column(7, ReportStatus::from_i64(status))?,
            debug_report_status: column(8, DebugReportStatus::from_i64(debug_status))?,
            api_version: row.get(9)?,
            source_debug_key: opt_u64_column(row, 10)?,
            trigger_debug_key: opt_u64_column(row, 11)?,
            source_id: row.get(12)?,
            trigger_id: row.get(13)?,
            dedup_key: opt_u64_column(row, 14)?,
            registration_origin: url_column(row, 15)?,
        })
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::super::fixtures::*;
    use crate::measurement::{
        AggregateEncryptionKey, AggregateReport, AggregateReportBuilder, DebugReport, DebugReportStatus,
        EventReport, EventReportBuilder, ReportStatus,
    };
    use crate::site::SurfaceType;
    use crate::storage::DatastoreManager;
    use crate::Error;
    use serde_json::json;

    pub fn event_report(id: &str, source_id: &str, trigger_id: &str, report_time: i64) -> EventReportBuilder {
        EventReport::builder()
            .id(id)
            .source_event_id(1)
            .enrollment_id(ENROLLMENT)
            .attribution_destinations(vec![url(APP_DESTINATION)])
            .report_time(report_time)
            .trigger_time(report_time - 1)
            .source_id(source_id)
            .trigger_id(trigger_id)
            .registration_origin(url(ORIGIN))
    }

    pub fn aggregate_report(id: &str, source_id: &str, trigger_id: &str, report_time: i64) -> AggregateReportBuilder {
        AggregateReport::builder()
            .id(id)
            .publisher(url(PUBLISHER))
            .attribution_destination(url(APP_DESTINATION))
            .source_registration_time(0)
            .scheduled_report_time(report_time)
            .enrollment_id(ENROLLMENT)
            .source_id(source_id)
            .trigger_id(trigger_id)
            .registration_origin(url(ORIGIN))
    }

    /// Sources S1..S3 and triggers T1..T3
    pub fn seed_owners(manager: &DatastoreManager) {
        insert_sources(
            manager,
            ["S1", "S2", "S3"].iter().map(|id| source(id, 1, 1_000).build().unwrap()).collect(),
        );
        insert_triggers(
            manager,
            ["T1", "T2", "T3"].iter().map(|id| trigger(id, 10).build().unwrap()).collect(),
        );
    }

    #[test]
    fn test_event_report_round_trip() {
        let manager = manager();
        seed_owners(&manager);
        let report = event_report("R1", "S1", "T1", 100)
            .attribution_destinations(vec![url(APP_DESTINATION), url(WEB_DESTINATION)])
            .source_event_id(u64::MAX)
            .trigger_data(u64::MAX - 7)
            .trigger_dedup_key(u64::MAX)
            .randomized_trigger_rate(0.0024)
            .build()
            .unwrap();
        manager.transact(|dao| dao.insert_event_report(&report)).unwrap();
        assert_eq!(manager.transact(|dao| dao.get_event_report("R1")).unwrap(), report);

        let err = manager.transact(|dao| dao.get_event_report("R404")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_pending_window_and_delivery() {
        let manager = manager();
        seed_owners(&manager);
        manager
            .transact(|dao| {
                dao.insert_event_report(&event_report("R1", "S1", "T1", 100).build()?)?;
                dao.insert_event_report(&event_report("R2", "S1", "T1", 200).build()?)?;
                dao.insert_event_report(&event_report("R3", "S1", "T1", 201).build()?)?;
                Ok(())
            })
            .unwrap();

        let pending = manager
            .transact(|dao| dao.get_pending_event_report_ids_in_window(100, 200))
            .unwrap();
        assert_eq!(pending, vec!["R1".to_string(), "R2".to_string()]);

        manager
            .transact(|dao| dao.mark_event_report_status("R1", ReportStatus::Delivered))
            .unwrap();
        let pending = manager
            .transact(|dao| dao.get_pending_event_report_ids_in_window(0, 1_000))
            .unwrap();
        assert_eq!(pending, vec!["R2".to_string(), "R3".to_string()]);

        let err = manager
            .transact(|dao| dao.mark_event_report_status("R404", ReportStatus::Delivered))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_debug_report_status_flow() {
        let manager = manager();
        seed_owners(&manager);
        manager
            .transact(|dao| {
                dao.insert_event_report(
                    &event_report("R1", "S1", "T1", 100)
                        .debug_report_status(DebugReportStatus::Pending)
                        .build()?,
                )?;
                dao.insert_aggregate_report(
                    &aggregate_report("A1", "S1", "T1", 100)
                        .debug_report_status(DebugReportStatus::Pending)
                        .build()?,
                )
            })
            .unwrap();

        assert_eq!(manager.transact(|dao| dao.get_pending_debug_event_report_ids()).unwrap(), vec!["R1"]);
        assert_eq!(manager.transact(|dao| dao.get_pending_aggregate_debug_report_ids()).unwrap(), vec!["A1"]);

        manager
            .transact(|dao| {
                dao.mark_event_debug_report_delivered("R1")?;
                dao.mark_aggregate_debug_report_delivered("A1")
            })
            .unwrap();
        assert!(manager.transact(|dao| dao.get_pending_debug_event_report_ids()).unwrap().is_empty());
        assert!(manager.transact(|dao| dao.get_pending_aggregate_debug_report_ids()).unwrap().is_empty());
    }

    #[test]
    fn test_fetch_matching_reports_is_union() {
        let manager = manager();
        seed_owners(&manager);
        manager
            .transact(|dao| {
                dao.insert_event_report(&event_report("R1", "S1", "T1", 100).build()?)?;
                dao.insert_event_report(&event_report("R2", "S2", "T2", 100).build()?)?;
                dao.insert_event_report(&event_report("R3", "S1", "T2", 100).build()?)?;
                dao.insert_event_report(&event_report("R4", "S3", "T3", 100).build()?)?;
                dao.insert_aggregate_report(&aggregate_report("A1", "S1", "T3", 100).build()?)?;
                dao.insert_aggregate_report(&aggregate_report("A2", "S3", "T3", 100).build()?)
            })
            .unwrap();

        let reports = manager
            .transact(|dao| dao.fetch_matching_event_reports(&["S1".to_string()], &["T2".to_string()]))
            .unwrap();
        assert_eq!(ids(&reports, |r| r.id.as_str()), vec!["R1", "R2", "R3"]);

        let by_trigger_only = manager
            .transact(|dao| dao.fetch_matching_event_reports(&[], &["T3".to_string()]))
            .unwrap();
        assert_eq!(ids(&by_trigger_only, |r| r.id.as_str()), vec!["R4"]);

        let none = manager.transact(|dao| dao.fetch_matching_event_reports(&[], &[])).unwrap();
        assert!(none.is_empty());

        let aggregates = manager
            .transact(|dao| dao.fetch_matching_aggregate_reports(&["S1".to_string()], &[]))
            .unwrap();
        assert_eq!(ids(&aggregates, |r| r.id.as_str()), vec!["A1"]);
    }

    #[test]
    fn test_reports_per_destination_by_site() {
        let manager = manager();
        seed_owners(&manager);
        manager
            .transact(|dao| {
                dao.insert_event_report(
                    &event_report("R1", "S1", "T1", 100)
                        .attribution_destinations(vec![url("https://shop.advertiser.test")])
                        .build()?,
                )?;
                dao.insert_event_report(
                    &event_report("R2", "S1", "T1", 100)
                        .attribution_destinations(vec![url(APP_DESTINATION), url(WEB_DESTINATION)])
                        .build()?,
                )?;
                dao.insert_event_report(&event_report("R3", "S1", "T1", 100).build()?)?;
                dao.insert_aggregate_report(
                    &aggregate_report("A1", "S1", "T1", 100)
                        .attribution_destination(url("https://www.advertiser.test/x"))
                        .build()?,
                )
            })
            .unwrap();

        let web = manager
            .transact(|dao| dao.get_num_event_reports_per_destination(&url(WEB_DESTINATION), SurfaceType::Web))
            .unwrap();
        assert_eq!(web, 2);
        let app = manager
            .transact(|dao| dao.get_num_event_reports_per_destination(&url(APP_DESTINATION), SurfaceType::App))
            .unwrap();
        assert_eq!(app, 2);
        let aggregates = manager
            .transact(|dao| {
                dao.get_num_aggregate_reports_per_destination(&url(WEB_DESTINATION), SurfaceType::Web)
            })
            .unwrap();
        assert_eq!(aggregates, 1);
    }

    #[test]
    fn test_aggregate_report_round_trip_and_app_lookup() {
        let manager = manager();
        seed_owners(&manager);
        let report = aggregate_report("A1", "S1", "T1", 100)
            .debug_cleartext_payload("{\"operation\":\"histogram\"}")
            .dedup_key(u64::MAX)
            .build()
            .unwrap();
        manager.transact(|dao| dao.insert_aggregate_report(&report)).unwrap();
        assert_eq!(manager.transact(|dao| dao.get_aggregate_report("A1")).unwrap(), report);

        let for_app = manager
            .transact(|dao| dao.get_pending_aggregate_report_ids_for_given_app(&url(PUBLISHER)))
            .unwrap();
        assert_eq!(for_app, vec!["A1"]);
        let other_app = manager
            .transact(|dao| dao.get_pending_aggregate_report_ids_for_given_app(&url("android-app://com.other")))
            .unwrap();
        assert!(other_app.is_empty());

        let pending = manager
            .transact(|dao| dao.get_pending_aggregate_report_ids_in_window(100, 100))
            .unwrap();
        assert_eq!(pending, vec!["A1"]);
        manager
            .transact(|dao| dao.mark_aggregate_report_status("A1", ReportStatus::Delivered))
            .unwrap();
        assert!(manager
            .transact(|dao| dao.get_pending_aggregate_report_ids_in_window(0, 1_000))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_source_event_reports_and_delete() {
        let manager = manager();
        seed_owners(&manager);
        let r1 = event_report("R1", "S1", "T1", 100).build().unwrap();
        manager
            .transact(|dao| {
                dao.insert_event_report(&r1)?;
                dao.insert_event_report(&event_report("R2", "S2", "T1", 100).build()?)
            })
            .unwrap();

        let source = manager.transact(|dao| dao.get_source("S1")).unwrap();
        let reports = manager.transact(|dao| dao.get_source_event_reports(&source)).unwrap();
        assert_eq!(reports, vec![r1.clone()]);

        let for_app = manager
            .transact(|dao| dao.get_pending_event_report_ids_for_given_app(&url(PUBLISHER)))
            .unwrap();
        assert_eq!(for_app, vec!["R1", "R2"]);

        manager.transact(|dao| dao.delete_event_report(&r1)).unwrap();
        assert!(manager.transact(|dao| dao.get_source_event_reports(&source)).unwrap().is_empty());
    }

    #[test]
    fn test_encryption_key_expiry() {
        let manager = manager();
        manager
            .transact(|dao| {
                dao.insert_aggregate_encryption_key(&AggregateEncryptionKey::new("k1", "pk1", 100)?)?;
                dao.insert_aggregate_encryption_key(&AggregateEncryptionKey::new("k2", "pk2", 200)?)
            })
            .unwrap();

        let live = manager
            .transact(|dao| dao.get_non_expired_aggregate_encryption_keys(100))
            .unwrap();
        assert_eq!(live.len(), 2);

        let deleted = manager
            .transact(|dao| dao.delete_expired_aggregate_encryption_keys(200))
            .unwrap();
        assert_eq!(deleted, 1);
        let live = manager
            .transact(|dao| dao.get_non_expired_aggregate_encryption_keys(0))
            .unwrap();
        assert_eq!(live.iter().map(|k| k.key_id.as_str()).collect::<Vec<_>>(), vec!["k2"]);
    }

    #[test]
    fn test_debug_report_lifecycle() {
        let manager = manager();
        let report = DebugReport::new(
            "source-noised",
            json!({"source_event_id": "1", "attribution_destination": APP_DESTINATION}),
            ENROLLMENT,
            url(ORIGIN),
        )
        .unwrap()
        .with_id("D1");
        manager.transact(|dao| dao.insert_debug_report(&report)).unwrap();

        assert_eq!(manager.transact(|dao| dao.get_debug_report("D1")).unwrap(), report);
        assert_eq!(manager.transact(|dao| dao.get_debug_report_ids()).unwrap(), vec!["D1"]);

        manager.transact(|dao| dao.delete_debug_report("D1")).unwrap();
        let err = manager.transact(|dao| dao.get_debug_report("D1")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
