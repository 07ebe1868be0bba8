//! Install attribution

use rusqlite::params;
use tracing::debug;
use url::Url;

use super::MeasurementDao;
use crate::measurement::SourceStatus;
use crate::site::{Site, SurfaceType};
use crate::Result;

impl MeasurementDao<'_> {
    // ========== Install Attribution Operations ==========

    /// Credit an install of `installed_app` to at most one source per
    /// registration origin.
    ///
    /// Eligible sources are active, target the app, have not expired by
    /// `install_time`, and satisfy
    /// `event_time <= install_time <= event_time + install_attribution_window`.
    /// The winner per origin has the highest priority, then the latest event
    /// time. Returns the number of sources marked.
    pub fn do_install_attribution(&self, installed_app: &Url, install_time: i64) -> Result<usize> {
        let site = Site::of(installed_app, SurfaceType::App)?;
        let marked = self.conn.execute(
            "UPDATE msmt_source SET is_install_attributed = 1, install_time = ?1
             WHERE _id IN (
                 SELECT _id FROM (
                     SELECT _id, ROW_NUMBER() OVER (
                         PARTITION BY registration_origin
                         ORDER BY priority DESC, event_time DESC, _id
                     ) AS origin_rank
                     FROM msmt_source
                     WHERE status = ?2
                       AND event_time <= ?1
                       AND ?1 <= event_time + install_attribution_window
                       AND expiry_time > ?1
                       AND EXISTS (
                           SELECT 1 FROM msmt_source_destination d
                           WHERE d.source_id = msmt_source._id
                             AND d.destination_type = ?3
                             AND msmt_site(d.destination, d.destination_type) = ?4
                       )
                 )
                 WHERE origin_rank = 1
             )",
            params![
                install_time,
                SourceStatus::Active.as_i64(),
                SurfaceType::App.as_i64(),
                site.as_str(),
            ],
        )?;
        debug!(app = %site, marked, "install attributed");
        Ok(marked)
    }

    /// Clear install attribution on every source targeting `installed_app`
    pub fn undo_install_attribution(&self, installed_app: &Url) -> Result<usize> {
        let site = Site::of(installed_app, SurfaceType::App)?;
        let cleared = self.conn.execute(
            "UPDATE msmt_source SET is_install_attributed = 0, install_time = NULL
             WHERE is_install_attributed = 1
               AND EXISTS (
                   SELECT 1 FROM msmt_source_destination d
                   WHERE d.source_id = msmt_source._id
                     AND d.destination_type = ?1
                     AND msmt_site(d.destination, d.destination_type) = ?2
               )",
            params![SurfaceType::App.as_i64(), site.as_str()],
        )?;
        debug!(app = %site, cleared, "install attribution undone");
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use crate::measurement::SourceStatus;
    use crate::storage::DatastoreManager;

    fn attributed(manager: &DatastoreManager, id: &str) -> (bool, Option<i64>) {
        let source = manager.transact(|dao| dao.get_source(id)).unwrap();
        (source.is_install_attributed, source.install_time)
    }

    fn install(manager: &DatastoreManager, time: i64) -> usize {
        manager
            .transact(|dao| dao.do_install_attribution(&url(APP_DESTINATION), time))
            .unwrap()
    }

    #[test]
    fn test_highest_priority_wins() {
        let manager = manager();
        insert_sources(
            &manager,
            vec![
                source("high", 10, 1_000).priority(100).install_attribution_window(100).build().unwrap(),
                source("low", 20, 1_000).priority(50).install_attribution_window(100).build().unwrap(),
            ],
        );
        assert_eq!(install(&manager, 50), 1);
        assert_eq!(attributed(&manager, "high"), (true, Some(50)));
        assert_eq!(attributed(&manager, "low"), (false, None));
    }

    #[test]
    fn test_priority_tie_goes_to_latest_event() {
        let manager = manager();
        insert_sources(
            &manager,
            vec![
                source("earlier", 10, 1_000).install_attribution_window(100).build().unwrap(),
                source("later", 20, 1_000).install_attribution_window(100).build().unwrap(),
            ],
        );
        install(&manager, 50);
        assert_eq!(attributed(&manager, "later"), (true, Some(50)));
        assert_eq!(attributed(&manager, "earlier"), (false, None));
    }

    #[test]
    fn test_source_outside_window_never_selected() {
        let manager = manager();
        insert_sources(
            &manager,
            vec![
                source("lapsed", 10, 1_000).priority(100).install_attribution_window(5).build().unwrap(),
                source("future", 60, 1_000).priority(100).install_attribution_window(100).build().unwrap(),
                source("eligible", 30, 1_000).install_attribution_window(100).build().unwrap(),
                source("ignored", 30, 1_000)
                    .priority(500)
                    .install_attribution_window(100)
                    .status(SourceStatus::Ignored)
                    .build()
                    .unwrap(),
            ],
        );
        install(&manager, 50);
        assert_eq!(attributed(&manager, "eligible"), (true, Some(50)));
        for id in ["lapsed", "future", "ignored"] {
            assert_eq!(attributed(&manager, id), (false, None));
        }
    }

    #[test]
    fn test_expired_source_never_selected() {
        let manager = manager();
        insert_sources(
            &manager,
            vec![
                source("expired", 10, 20).priority(100).install_attribution_window(100).build().unwrap(),
                source("expires-at-install", 10, 50).priority(90).install_attribution_window(100).build().unwrap(),
            ],
        );
        assert_eq!(install(&manager, 50), 0);
        assert_eq!(attributed(&manager, "expired"), (false, None));
        assert_eq!(attributed(&manager, "expires-at-install"), (false, None));

        insert_sources(
            &manager,
            vec![source("live", 10, 1_000).install_attribution_window(100).build().unwrap()],
        );
        assert_eq!(install(&manager, 50), 1);
        assert_eq!(attributed(&manager, "live"), (true, Some(50)));
        assert_eq!(attributed(&manager, "expired"), (false, None));
    }

    #[test]
    fn test_one_winner_per_registration_origin() {
        let manager = manager();
        insert_sources(
            &manager,
            vec![
                source("a1", 10, 1_000).priority(1).install_attribution_window(100).build().unwrap(),
                source("a2", 10, 1_000).priority(2).install_attribution_window(100).build().unwrap(),
                source("b1", 10, 1_000)
                    .registration_origin(url("https://other-adtech.test"))
                    .install_attribution_window(100)
                    .build()
                    .unwrap(),
            ],
        );
        assert_eq!(install(&manager, 50), 2);
        assert!(attributed(&manager, "a2").0);
        assert!(attributed(&manager, "b1").0);
        assert!(!attributed(&manager, "a1").0);

        // Re-running picks the same winners
        assert_eq!(install(&manager, 50), 2);
        assert!(!attributed(&manager, "a1").0);
    }

    #[test]
    fn test_other_app_untouched_and_undo() {
        let manager = manager();
        insert_sources(
            &manager,
            vec![
                source("mine", 10, 1_000).install_attribution_window(100).build().unwrap(),
                source("other-app", 10, 1_000)
                    .app_destinations(vec![url("android-app://com.other")])
                    .install_attribution_window(100)
                    .build()
                    .unwrap(),
            ],
        );
        manager
            .transact(|dao| dao.do_install_attribution(&url("android-app://com.advertiser/store"), 50))
            .unwrap();
        assert!(attributed(&manager, "mine").0);
        assert!(!attributed(&manager, "other-app").0);

        let cleared = manager
            .transact(|dao| dao.undo_install_attribution(&url(APP_DESTINATION)))
            .unwrap();
        assert_eq!(cleared, 1);
        assert_eq!(attributed(&manager, "mine"), (false, None));
    }
}
