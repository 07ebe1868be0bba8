//! Storage Layer - SQLite-backed measurement store
//!
//! System of record is a single SQLite database:
//! - msmt_source / msmt_source_destination: ad exposures and their targets
//! - msmt_trigger: conversions awaiting attribution
//! - msmt_event_report / msmt_aggregate_report / msmt_debug_report: outgoing reports
//! - msmt_attribution: the rate-limit ledger
//! - msmt_async_registration_contract / msmt_key_value_data: registration queue state

pub mod schema;
pub mod db;
pub mod transaction;
pub mod dao;

pub use dao::{MatchBehavior, MeasurementDao};
pub use db::MeasurementDb;
pub use transaction::DatastoreManager;
