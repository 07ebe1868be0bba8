//! Privacy rate-limit counters
//!
//! Every publisher and destination predicate here compares sites, never raw
//! URIs, via the `msmt_site` SQL function registered on the connection.

use std::collections::BTreeSet;

use rusqlite::params;
use url::Url;

use super::MeasurementDao;
use crate::measurement::{Attribution, Source, SourceStatus, Trigger};
use crate::site::{Site, SurfaceType};
use crate::Result;

impl MeasurementDao<'_> {
    // ========== Attribution Ledger Operations ==========

    pub fn insert_attribution(&self, attribution: &Attribution) -> Result<()> {
        self.conn.execute(
            "INSERT INTO msmt_attribution (_id, source_site, source_origin, attribution_destination_site, \
             destination_origin, enrollment_id, trigger_time, registrant, source_id, trigger_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                attribution.id,
                attribution.source_site.as_str(),
                attribution.source_origin,
                attribution.destination_site.as_str(),
                attribution.destination_origin,
                attribution.enrollment_id,
                attribution.trigger_time,
                attribution.registrant,
                attribution.source_id,
                attribution.trigger_id,
            ],
        )?;
        Ok(())
    }

    /// Ledger rows for the pair's sites and the trigger's enrollment with
    /// `trigger_time - window < row time <= trigger_time`
    pub fn get_attributions_per_rate_limit_window(&self, source: &Source, trigger: &Trigger) -> Result<u64> {
        let source_site = source.publisher_site()?;
        let destination_site = trigger.destination_site()?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM msmt_attribution
             WHERE source_site = ?1
               AND attribution_destination_site = ?2
               AND enrollment_id = ?3
               AND trigger_time > ?4
               AND trigger_time <= ?5",
            params![
                source_site.as_str(),
                destination_site.as_str(),
                trigger.enrollment_id,
                trigger.trigger_time - self.config.rate_limit_window_ms,
                trigger.trigger_time,
            ],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Distinct enrollments, other than `excluded_enrollment_id`, attributed
    /// for the site pair with `window_start <= trigger_time < window_end`
    pub fn count_distinct_enrollments_per_publisher_x_destination_in_attribution(
        &self,
        source_site: &Site,
        destination_site: &Site,
        excluded_enrollment_id: &str,
        window_start: i64,
        window_end: i64,
    ) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT enrollment_id) FROM msmt_attribution
             WHERE source_site = ?1
               AND attribution_destination_site = ?2
               AND enrollment_id != ?3
               AND trigger_time >= ?4
               AND trigger_time < ?5",
            params![
                source_site.as_str(),
                destination_site.as_str(),
                excluded_enrollment_id,
                window_start,
                window_end,
            ],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ========== Source Limit Operations ==========

    /// Sources whose publisher is on the same site as `publisher`
    pub fn get_num_sources_per_publisher(&self, publisher: &Url, surface: SurfaceType) -> Result<u64> {
        let site = Site::of(publisher, surface)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM msmt_source
             WHERE publisher_type = ?1 AND msmt_site(publisher, publisher_type) = ?2",
            params![surface.as_i64(), site.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Triggers whose attribution destination is on the same site as `destination`
    pub fn get_num_triggers_per_destination(&self, destination: &Url, surface: SurfaceType) -> Result<u64> {
        let site = Site::of(destination, surface)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM msmt_trigger
             WHERE destination_type = ?1 AND msmt_site(attribution_destination, destination_type) = ?2",
            params![surface.as_i64(), site.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Distinct destination sites of `destination_surface` declared by active
    /// sources of the publisher x enrollment pair, registered in
    /// `(window_start, window_end]` and still unexpired at `window_end`.
    ///
    /// Sites of `excluded_destinations` are not counted.
    #[allow(clippy::too_many_arguments)]
    pub fn count_distinct_destinations_per_publisher_x_enrollment_in_active_source(
        &self,
        publisher: &Url,
        publisher_surface: SurfaceType,
        enrollment_id: &str,
        excluded_destinations: &[Url],
        destination_surface: SurfaceType,
        window_start: i64,
        window_end: i64,
    ) -> Result<u64> {
        let publisher_site = Site::of(publisher, publisher_surface)?;
        let excluded = excluded_destinations
            .iter()
            .map(|destination| Ok(Site::of(destination, destination_surface)?.to_string()))
            .collect::<Result<BTreeSet<String>>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT msmt_site(d.destination, d.destination_type)
             FROM msmt_source s
             JOIN msmt_source_destination d ON d.source_id = s._id
             WHERE s.status = ?1
               AND s.publisher_type = ?2
               AND msmt_site(s.publisher, s.publisher_type) = ?3
               AND s.enrollment_id = ?4
               AND d.destination_type = ?5
               AND s.event_time > ?6
               AND s.event_time <= ?7
               AND s.expiry_time > ?7",
        )?;
        let sites = stmt
            .query_map(
                params![
                    SourceStatus::Active.as_i64(),
                    publisher_surface.as_i64(),
                    publisher_site.as_str(),
                    enrollment_id,
                    destination_surface.as_i64(),
                    window_start,
                    window_end,
                ],
                |row| row.get::<_, Option<String>>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let count = sites
            .into_iter()
            .flatten()
            .filter(|site| !excluded.contains(site))
            .count();
        Ok(count as u64)
    }

    /// Active sources of the publisher x enrollment pair registered after
    /// `as_of - lookback` by any origin other than `registration_origin`
    pub fn count_sources_per_publisher_x_enrollment_excluding_reg_origin(
        &self,
        registration_origin: &Url,
        publisher: &Url,
        surface: SurfaceType,
        enrollment_id: &str,
        as_of: i64,
        lookback: i64,
    ) -> Result<u64> {
        let site = Site::of(publisher, surface)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM msmt_source
             WHERE status = ?1
               AND publisher_type = ?2
               AND msmt_site(publisher, publisher_type) = ?3
               AND enrollment_id = ?4
               AND registration_origin != ?5
               AND event_time > ?6",
            params![
                SourceStatus::Active.as_i64(),
                surface.as_i64(),
                site.as_str(),
                enrollment_id,
                registration_origin.as_str(),
                as_of - lookback,
            ],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Largest number of distinct enrollments, other than
    /// `excluded_enrollment_id`, registering sources from the publisher to
    /// any one of `destinations` in `(window_start, window_end]`
    pub fn count_distinct_enrollments_per_publisher_x_destination_in_source(
        &self,
        publisher: &Url,
        surface: SurfaceType,
        destinations: &[Url],
        excluded_enrollment_id: &str,
        window_start: i64,
        window_end: i64,
    ) -> Result<u64> {
        let publisher_site = Site::of(publisher, surface)?;
        let mut stmt = self.conn.prepare_cached(
            "SELECT COUNT(DISTINCT s.enrollment_id) FROM msmt_source s
             WHERE s.publisher_type = ?1
               AND msmt_site(s.publisher, s.publisher_type) = ?2
               AND s.enrollment_id != ?3
               AND s.event_time > ?4
               AND s.event_time <= ?5
               AND s.expiry_time > ?5
               AND EXISTS (
                   SELECT 1 FROM msmt_source_destination d
                   WHERE d.source_id = s._id
                     AND d.destination_type = ?6
                     AND msmt_site(d.destination, d.destination_type) = ?7
               )",
        )?;

        let mut max = 0;
        for destination in destinations {
            let destination_surface = SurfaceType::infer(destination);
            let destination_site = Site::of(destination, destination_surface)?;
            let count: i64 = stmt.query_row(
                params![
                    surface.as_i64(),
                    publisher_site.as_str(),
                    excluded_enrollment_id,
                    window_start,
                    window_end,
                    destination_surface.as_i64(),
                    destination_site.as_str(),
                ],
                |row| row.get(0),
            )?;
            max = max.max(count as u64);
        }
        Ok(max)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use crate::measurement::{Attribution, SourceStatus};
    use crate::site::{Site, SurfaceType};

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn ledger(enrollment: &str, time: i64) -> Attribution {
        Attribution::builder()
            .source_site(Site::parse(PUBLISHER, SurfaceType::App).unwrap())
            .destination_site(Site::parse(APP_DESTINATION, SurfaceType::App).unwrap())
            .enrollment_id(enrollment)
            .trigger_time(time)
            .registrant(APP_DESTINATION)
            .build()
            .unwrap()
    }

    fn insert_ledger(manager: &crate::storage::DatastoreManager, rows: Vec<Attribution>) {
        manager
            .transact(|dao| {
                for row in &rows {
                    dao.insert_attribution(row)?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_rate_limit_window_edges() {
        let manager = manager();
        let window = manager.config().rate_limit_window_ms;
        let t = 100 * DAY_MS;
        insert_ledger(
            &manager,
            vec![
                ledger(ENROLLMENT, t - window),
                ledger(ENROLLMENT, t - window + 1),
                ledger(ENROLLMENT, t),
                ledger(ENROLLMENT, t + 1),
                ledger("enrollment-2", t),
            ],
        );

        let source = source("S1", t - 10, t + 10).build().unwrap();
        let trigger = trigger("T1", t).build().unwrap();
        let count = manager
            .transact(|dao| dao.get_attributions_per_rate_limit_window(&source, &trigger))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_ledger_row_from_pair_is_counted() {
        let manager = manager();
        let source = source("S1", 10, 1_000).build().unwrap();
        let trigger = trigger("T1", 500)
            .attribution_destination(url("android-app://com.advertiser/deep/link"))
            .build()
            .unwrap();
        insert_sources(&manager, vec![source.clone()]);
        insert_triggers(&manager, vec![trigger.clone()]);
        manager
            .transact(|dao| dao.insert_attribution(&Attribution::for_pair(&source, &trigger)?))
            .unwrap();

        let count = manager
            .transact(|dao| dao.get_attributions_per_rate_limit_window(&source, &trigger))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_distinct_enrollments_in_attribution_half_open() {
        let manager = manager();
        insert_ledger(
            &manager,
            vec![
                ledger("e1", 100),
                ledger("e2", 150),
                ledger("e2", 160),
                ledger("e3", 199),
                ledger("e4", 200),
                ledger("excluded", 150),
            ],
        );
        let source_site = Site::parse(PUBLISHER, SurfaceType::App).unwrap();
        let destination_site = Site::parse(APP_DESTINATION, SurfaceType::App).unwrap();
        let count = manager
            .transact(|dao| {
                dao.count_distinct_enrollments_per_publisher_x_destination_in_attribution(
                    &source_site,
                    &destination_site,
                    "excluded",
                    100,
                    200,
                )
            })
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_sources_per_publisher_counts_by_site() {
        let manager = manager();
        insert_sources(
            &manager,
            vec![
                source("sub", 1, 10).publisher(url("https://sub.news.test/article")).build().unwrap(),
                source("apex", 1, 10).publisher(url("https://news.test")).build().unwrap(),
                source("insecure", 1, 10).publisher(url("http://news.test")).build().unwrap(),
                source("prefixed", 1, 10).publisher(url("https://prefix-news.test")).build().unwrap(),
                source("app", 1, 10).build().unwrap(),
            ],
        );
        let web = manager
            .transact(|dao| dao.get_num_sources_per_publisher(&url("https://news.test"), SurfaceType::Web))
            .unwrap();
        assert_eq!(web, 2);

        let app = manager
            .transact(|dao| dao.get_num_sources_per_publisher(&url(PUBLISHER), SurfaceType::App))
            .unwrap();
        assert_eq!(app, 1);
    }

    #[test]
    fn test_triggers_per_destination_counts_by_site() {
        let manager = manager();
        insert_triggers(
            &manager,
            vec![
                trigger("T1", 1).attribution_destination(url("https://shop.advertiser.test")).build().unwrap(),
                trigger("T2", 1).attribution_destination(url(WEB_DESTINATION)).build().unwrap(),
                trigger("T3", 1).attribution_destination(url("https://other.test")).build().unwrap(),
                trigger("T4", 1).build().unwrap(),
            ],
        );
        let count = manager
            .transact(|dao| {
                dao.get_num_triggers_per_destination(&url("https://www.advertiser.test"), SurfaceType::Web)
            })
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_distinct_destinations_in_active_source() {
        let manager = manager();
        insert_sources(
            &manager,
            vec![
                source("S1", 10, 200)
                    .web_destinations(vec![
                        url("https://a.shop.test"),
                        url("https://b.shop.test"),
                        url("https://other.test"),
                    ])
                    .build()
                    .unwrap(),
                source("expired", 10, 50).web_destinations(vec![url("https://third.test")]).build().unwrap(),
                source("other-enrollment", 10, 200)
                    .enrollment_id("enrollment-2")
                    .web_destinations(vec![url("https://fourth.test")])
                    .build()
                    .unwrap(),
                source("ignored", 10, 200)
                    .status(SourceStatus::Ignored)
                    .web_destinations(vec![url("https://fifth.test")])
                    .build()
                    .unwrap(),
                source("app-only", 10, 200).build().unwrap(),
            ],
        );

        let count = |excluded: Vec<url::Url>| {
            manager
                .transact(|dao| {
                    dao.count_distinct_destinations_per_publisher_x_enrollment_in_active_source(
                        &url(PUBLISHER),
                        SurfaceType::App,
                        ENROLLMENT,
                        &excluded,
                        SurfaceType::Web,
                        0,
                        100,
                    )
                })
                .unwrap()
        };
        assert_eq!(count(vec![]), 2);
        assert_eq!(count(vec![url("https://www.other.test")]), 1);
    }

    #[test]
    fn test_competing_registration_origins() {
        let manager = manager();
        let other_origin = url("https://other-adtech.test");
        insert_sources(
            &manager,
            vec![
                source("mine", 100, 1_000).build().unwrap(),
                source("theirs", 100, 1_000).registration_origin(other_origin.clone()).build().unwrap(),
                source("old", 10, 1_000).registration_origin(other_origin.clone()).build().unwrap(),
            ],
        );

        let count = |origin: &url::Url| {
            manager
                .transact(|dao| {
                    dao.count_sources_per_publisher_x_enrollment_excluding_reg_origin(
                        origin,
                        &url(PUBLISHER),
                        SurfaceType::App,
                        ENROLLMENT,
                        150,
                        100,
                    )
                })
                .unwrap()
        };
        assert_eq!(count(&url(ORIGIN)), 1);
        assert_eq!(count(&other_origin), 1);

        let fresh = manager_with(Default::default());
        insert_sources(&fresh, vec![source("only", 100, 1_000).build().unwrap()]);
        let none = fresh
            .transact(|dao| {
                dao.count_sources_per_publisher_x_enrollment_excluding_reg_origin(
                    &url(ORIGIN),
                    &url(PUBLISHER),
                    SurfaceType::App,
                    ENROLLMENT,
                    150,
                    100,
                )
            })
            .unwrap();
        assert_eq!(none, 0);
    }

    #[test]
    fn test_distinct_enrollments_in_source_takes_max_over_destinations() {
        let manager = manager();
        let web = url("https://www.advertiser.test");
        insert_sources(
            &manager,
            vec![
                source("S1", 10, 500).enrollment_id("e1").build().unwrap(),
                source("S2", 10, 500).enrollment_id("e2").build().unwrap(),
                source("S3", 10, 500)
                    .enrollment_id("e3")
                    .app_destinations(vec![])
                    .web_destinations(vec![url(WEB_DESTINATION)])
                    .build()
                    .unwrap(),
                source("excluded", 10, 500).enrollment_id("e9").build().unwrap(),
                source("expired", 10, 50).enrollment_id("e4").build().unwrap(),
            ],
        );

        let count = manager
            .transact(|dao| {
                dao.count_distinct_enrollments_per_publisher_x_destination_in_source(
                    &url(PUBLISHER),
                    SurfaceType::App,
                    &[url(APP_DESTINATION), web],
                    "e9",
                    0,
                    100,
                )
            })
            .unwrap();
        assert_eq!(count, 2);
    }
}
