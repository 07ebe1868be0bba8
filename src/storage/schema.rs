//! Database schema definitions
//!
//! Every table carries the `msmt_` prefix. Rows that reference a source or a
//! trigger do so through foreign keys with `ON DELETE CASCADE`, so deleting
//! a source or trigger removes its destinations, reports, ledger rows and
//! cross-network exclusions in the same statement.

/// SQL to create the source table
pub const CREATE_SOURCE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS msmt_source (
    _id TEXT PRIMARY KEY NOT NULL,
    event_id INTEGER NOT NULL,
    publisher TEXT NOT NULL,
    publisher_type INTEGER NOT NULL,
    enrollment_id TEXT NOT NULL,
    registrant TEXT NOT NULL,
    event_time INTEGER NOT NULL,
    expiry_time INTEGER NOT NULL,
    event_report_window INTEGER NOT NULL,
    aggregatable_report_window INTEGER NOT NULL,
    priority INTEGER NOT NULL,
    status INTEGER NOT NULL,
    source_type TEXT NOT NULL,
    attribution_mode INTEGER NOT NULL,
    install_attribution_window INTEGER NOT NULL,
    install_cooldown_window INTEGER NOT NULL,
    is_install_attributed INTEGER NOT NULL DEFAULT 0,
    install_time INTEGER,
    event_report_dedup_keys TEXT,
    aggregate_report_dedup_keys TEXT,
    registration_id TEXT,
    registration_origin TEXT NOT NULL,
    shared_aggregation_keys TEXT,
    filter_data TEXT,
    aggregate_source TEXT,
    aggregate_contributions INTEGER NOT NULL DEFAULT 0,
    debug_key INTEGER,
    debug_reporting INTEGER NOT NULL DEFAULT 0,
    ad_id_permission INTEGER NOT NULL DEFAULT 0,
    ar_debug_permission INTEGER NOT NULL DEFAULT 0,
    debug_join_key TEXT,
    platform_ad_id TEXT,
    debug_ad_id TEXT
)
"#;

/// SQL to create the source destination join table
/// Duplicate destinations on one source are kept
pub const CREATE_SOURCE_DESTINATION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS msmt_source_destination (
    source_id TEXT NOT NULL REFERENCES msmt_source(_id) ON DELETE CASCADE,
    destination TEXT NOT NULL,
    destination_type INTEGER NOT NULL
)
"#;

/// SQL to create the trigger table
pub const CREATE_TRIGGER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS msmt_trigger (
    _id TEXT PRIMARY KEY NOT NULL,
    attribution_destination TEXT NOT NULL,
    destination_type INTEGER NOT NULL,
    enrollment_id TEXT NOT NULL,
    registrant TEXT NOT NULL,
    registration_origin TEXT NOT NULL,
    trigger_time INTEGER NOT NULL,
    status INTEGER NOT NULL,
    event_triggers TEXT NOT NULL,
    aggregate_trigger_data TEXT,
    aggregate_values TEXT,
    aggregatable_deduplication_keys TEXT,
    filters TEXT,
    not_filters TEXT,
    attribution_config TEXT,
    x_network_key_mapping TEXT,
    debug_key INTEGER,
    debug_reporting INTEGER NOT NULL DEFAULT 0,
    ad_id_permission INTEGER NOT NULL DEFAULT 0,
    ar_debug_permission INTEGER NOT NULL DEFAULT 0,
    debug_join_key TEXT,
    platform_ad_id TEXT,
    debug_ad_id TEXT
)
"#;

/// SQL to create the event report table
/// `attribution_destination` holds a JSON array of destination URIs
pub const CREATE_EVENT_REPORT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS msmt_event_report (
    _id TEXT PRIMARY KEY NOT NULL,
    source_event_id INTEGER NOT NULL,
    enrollment_id TEXT NOT NULL,
    attribution_destination TEXT NOT NULL,
    report_time INTEGER NOT NULL,
    trigger_data INTEGER NOT NULL,
    trigger_priority INTEGER NOT NULL,
    trigger_dedup_key INTEGER,
    trigger_time INTEGER NOT NULL,
    status INTEGER NOT NULL,
    debug_report_status INTEGER NOT NULL DEFAULT 0,
    source_type TEXT NOT NULL,
    randomized_trigger_rate REAL NOT NULL DEFAULT 0,
    source_debug_key INTEGER,
    trigger_debug_key INTEGER,
    source_id TEXT REFERENCES msmt_source(_id) ON DELETE CASCADE,
    trigger_id TEXT REFERENCES msmt_trigger(_id) ON DELETE CASCADE,
    registration_origin TEXT NOT NULL
)
"#;

/// SQL to create the attribution rate-limit ledger
pub const CREATE_ATTRIBUTION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS msmt_attribution (
    _id TEXT PRIMARY KEY NOT NULL,
    source_site TEXT NOT NULL,
    source_origin TEXT NOT NULL,
    attribution_destination_site TEXT NOT NULL,
    destination_origin TEXT NOT NULL,
    enrollment_id TEXT NOT NULL,
    trigger_time INTEGER NOT NULL,
    registrant TEXT NOT NULL,
    source_id TEXT REFERENCES msmt_source(_id) ON DELETE CASCADE,
    trigger_id TEXT REFERENCES msmt_trigger(_id) ON DELETE CASCADE
)
"#;

/// SQL to create the aggregate report table
pub const CREATE_AGGREGATE_REPORT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS msmt_aggregate_report (
    _id TEXT PRIMARY KEY NOT NULL,
    publisher TEXT NOT NULL,
    attribution_destination TEXT NOT NULL,
    source_registration_time INTEGER NOT NULL,
    scheduled_report_time INTEGER NOT NULL,
    enrollment_id TEXT NOT NULL,
    debug_cleartext_payload TEXT,
    status INTEGER NOT NULL,
    debug_report_status INTEGER NOT NULL DEFAULT 0,
    api_version TEXT NOT NULL,
    source_debug_key INTEGER,
    trigger_debug_key INTEGER,
    source_id TEXT REFERENCES msmt_source(_id) ON DELETE CASCADE,
    trigger_id TEXT REFERENCES msmt_trigger(_id) ON DELETE CASCADE,
    dedup_key INTEGER,
    registration_origin TEXT NOT NULL
)
"#;

/// SQL to create the aggregation key table
pub const CREATE_AGGREGATE_ENCRYPTION_KEY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS msmt_aggregate_encryption_key (
    _id TEXT PRIMARY KEY NOT NULL,
    key_id TEXT NOT NULL,
    public_key TEXT NOT NULL,
    expiry INTEGER NOT NULL
)
"#;

/// SQL to create the registration fetch queue
pub const CREATE_ASYNC_REGISTRATION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS msmt_async_registration_contract (
    _id TEXT PRIMARY KEY NOT NULL,
    registration_uri TEXT NOT NULL,
    top_origin TEXT,
    web_destination TEXT,
    os_destination TEXT,
    verified_destination TEXT,
    registrant TEXT NOT NULL,
    source_type TEXT,
    request_time INTEGER NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    type TEXT NOT NULL,
    debug_key_allowed INTEGER NOT NULL DEFAULT 0,
    ad_id_permission INTEGER NOT NULL DEFAULT 0,
    registration_id TEXT NOT NULL,
    platform_ad_id TEXT
)
"#;

/// SQL to create the debug report table
pub const CREATE_DEBUG_REPORT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS msmt_debug_report (
    _id TEXT PRIMARY KEY NOT NULL,
    type TEXT NOT NULL,
    body TEXT NOT NULL,
    enrollment_id TEXT NOT NULL,
    registration_origin TEXT NOT NULL
)
"#;

/// SQL to create the cross-network exclusion list
pub const CREATE_XNA_IGNORED_SOURCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS msmt_xna_ignored_sources (
    source_id TEXT NOT NULL REFERENCES msmt_source(_id) ON DELETE CASCADE,
    enrollment_id TEXT NOT NULL,
    PRIMARY KEY (source_id, enrollment_id)
)
"#;

/// SQL to create the key-value table
/// `_key` avoids the SQL keyword
pub const CREATE_KEY_VALUE_DATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS msmt_key_value_data (
    data_type TEXT NOT NULL,
    _key TEXT NOT NULL,
    value TEXT,
    PRIMARY KEY (data_type, _key)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_msmt_source_ei ON msmt_source(event_time)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_source_et ON msmt_source(expiry_time)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_source_ro ON msmt_source(registration_origin)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_source_reg_id ON msmt_source(registration_id)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_source_dest_sid ON msmt_source_destination(source_id)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_source_dest_d ON msmt_source_destination(destination_type, destination)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_trigger_tt ON msmt_trigger(trigger_time)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_attribution_ss_so_ds_do_ei_tt ON msmt_attribution(source_site, attribution_destination_site, enrollment_id, trigger_time)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_attribution_sid ON msmt_attribution(source_id)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_attribution_tid ON msmt_attribution(trigger_id)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_event_report_sid ON msmt_event_report(source_id)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_event_report_tid ON msmt_event_report(trigger_id)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_aggregate_report_sid ON msmt_aggregate_report(source_id)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_aggregate_report_tid ON msmt_aggregate_report(trigger_id)",
    "CREATE INDEX IF NOT EXISTS idx_msmt_async_registration_rt ON msmt_async_registration_contract(request_time)",
];

/// Every measurement table, children before parents
pub const ALL_TABLES: &[&str] = &[
    "msmt_source_destination",
    "msmt_xna_ignored_sources",
    "msmt_event_report",
    "msmt_aggregate_report",
    "msmt_attribution",
    "msmt_source",
    "msmt_trigger",
    "msmt_aggregate_encryption_key",
    "msmt_async_registration_contract",
    "msmt_debug_report",
    "msmt_key_value_data",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_SOURCE_TABLE,
        CREATE_SOURCE_DESTINATION_TABLE,
        CREATE_TRIGGER_TABLE,
        CREATE_EVENT_REPORT_TABLE,
        CREATE_ATTRIBUTION_TABLE,
        CREATE_AGGREGATE_REPORT_TABLE,
        CREATE_AGGREGATE_ENCRYPTION_KEY_TABLE,
        CREATE_ASYNC_REGISTRATION_TABLE,
        CREATE_DEBUG_REPORT_TABLE,
        CREATE_XNA_IGNORED_SOURCES_TABLE,
        CREATE_KEY_VALUE_DATA_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
