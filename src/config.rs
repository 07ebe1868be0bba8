use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 30 days
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: i64 = 30 * 24 * 60 * 60 * 1000;
/// 2 minutes
pub const DEFAULT_MAX_DELAYED_SOURCE_REGISTRATION_WINDOW_MS: i64 = 2 * 60 * 1000;
/// 10 MiB
pub const DEFAULT_MAX_DB_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_REGISTRATION_REDIRECTS: u32 = 20;
/// Stays well under SQLite's bound-parameter limit
pub const DEFAULT_MAX_QUERY_PARAMETERS: usize = 500;

/// Knobs consumed by the DAO. Loaded from `msmt-datastore.toml`; missing
/// keys take the defaults above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    pub database: Option<String>,
    pub max_db_size_bytes: u64,
    pub rate_limit_window_ms: i64,
    pub max_delayed_source_registration_window_ms: i64,
    pub max_registration_redirects: u32,
    pub max_query_parameters: usize,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            database: None,
            max_db_size_bytes: DEFAULT_MAX_DB_SIZE_BYTES,
            rate_limit_window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS,
            max_delayed_source_registration_window_ms: DEFAULT_MAX_DELAYED_SOURCE_REGISTRATION_WINDOW_MS,
            max_registration_redirects: DEFAULT_MAX_REGISTRATION_REDIRECTS,
            max_query_parameters: DEFAULT_MAX_QUERY_PARAMETERS,
        }
    }
}

impl DatastoreConfig {
    /// Database path, falling back to `.msmt/msmt.db` under `base`
    pub fn database_path_in(&self, base: &Path) -> PathBuf {
        self.database
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_database_path_in(base))
    }

    /// Chunk size for statements that bind one parameter per list entry
    pub fn chunk_size(&self) -> usize {
        self.max_query_parameters.max(1)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("msmt-datastore.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".msmt").join("msmt.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<DatastoreConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(DatastoreConfig::default());
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: DatastoreConfig = toml::from_str(&contents)?;
    if config.max_db_size_bytes == 0 {
        anyhow::bail!("max_db_size_bytes must be positive in {}", path.display());
    }
    Ok(config)
}

pub fn write_config(path: &Path, config: &DatastoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, DatastoreConfig::default());
        assert_eq!(config.max_delayed_source_registration_window_ms, 120_000);
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msmt-datastore.toml");
        std::fs::write(&path, "max_db_size_bytes = 4096\ndatabase = \"store.db\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.max_db_size_bytes, 4096);
        assert_eq!(config.rate_limit_window_ms, DEFAULT_RATE_LIMIT_WINDOW_MS);
        assert_eq!(config.database_path_in(dir.path()), PathBuf::from("store.db"));
    }

    #[test]
    fn test_write_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msmt-datastore.toml");
        write_config(&path, &DatastoreConfig::default(), false).unwrap();
        assert!(write_config(&path, &DatastoreConfig::default(), false).is_err());
        write_config(&path, &DatastoreConfig::default(), true).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), DatastoreConfig::default());
    }
}
