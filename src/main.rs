//! msmt-datastore CLI - maintenance commands over an attribution datastore

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use msmt_datastore::config::{ensure_db_dir, load_config, write_config, DatastoreConfig};
use msmt_datastore::site::{parse_uri, APP_SCHEME};
use msmt_datastore::{DatastoreManager, MeasurementDb};
use serde_json::json;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

#[derive(Parser)]
#[command(name = "msmt-datastore")]
#[command(version)]
#[command(about = "On-device attribution datastore - inspect, sweep and clean up measurement data")]
#[command(long_about = r#"
msmt-datastore maintains the SQLite store behind attribution reporting:
  • Row counts per measurement table
  • Retention sweeps of delivered reports and stale registrations
  • Install attribution and uninstall cleanup

Example usage:
  msmt-datastore init
  msmt-datastore install --package com.example.game --time 1700000000000
  msmt-datastore prune-apps --installed com.example.game,com.example.news
  msmt-datastore sweep --earliest-valid 1690000000000
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Path to the database file (overrides the config file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the database
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Show row counts for every measurement table
    Stats,

    /// Delete delivered reports, ledger rows and registrations older than a cutoff
    Sweep {
        /// Earliest insertion time (ms since epoch) that is still retained
        #[arg(long)]
        earliest_valid: i64,
    },

    /// Delete records of every app that is no longer installed
    PruneApps {
        /// Installed apps, as package names or android-app:// URIs
        #[arg(long, value_delimiter = ',')]
        installed: Vec<String>,
    },

    /// Credit an app install to its winning sources
    Install {
        /// Installed app, as a package name or android-app:// URI
        #[arg(short, long)]
        package: String,

        /// Install time (ms since epoch)
        #[arg(short, long)]
        time: i64,
    },

    /// Remove everything tied to an uninstalled app
    Uninstall {
        /// Uninstalled app, as a package name or android-app:// URI
        #[arg(short, long)]
        package: String,
    },

    /// Drop queued registrations of exactly one registrant
    DeleteRegistrant {
        /// Registrant URI
        #[arg(short, long)]
        registrant: String,
    },
}

/// Accept `com.example` as shorthand for `android-app://com.example`
fn app_uri(package: &str) -> anyhow::Result<Url> {
    if package.contains("://") {
        Ok(parse_uri(package)?)
    } else {
        Ok(parse_uri(&format!("{}://{}", APP_SCHEME, package))?)
    }
}

fn open_manager(config: DatastoreConfig, database: PathBuf) -> anyhow::Result<DatastoreManager> {
    ensure_db_dir(&database)?;
    let db = MeasurementDb::open(&database)?;
    tracing::debug!("Opened datastore at {:?}", database);
    Ok(DatastoreManager::new(Arc::new(db), config))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let cwd = std::env::current_dir()?;
    let database = cli.database.clone().unwrap_or_else(|| config.database_path_in(&cwd));

    match cli.command {
        Commands::Init { force } => {
            let config_path = cli
                .config
                .clone()
                .unwrap_or_else(msmt_datastore::config::default_config_path);
            write_config(&config_path, &config, force)?;
            let manager = open_manager(config, database.clone())?;
            let size = manager.db().size_bytes()?;

            if cli.json {
                println!(
                    "{}",
                    json!({ "config": config_path, "database": database, "size_bytes": size })
                );
            } else {
                println!("✅ Config written to {:?}", config_path);
                println!("🗄️  Database ready at {:?} ({} bytes)", database, size);
            }
        }

        Commands::Stats => {
            let manager = open_manager(config, database.clone())?;
            let counts = manager.transact(|dao| dao.stats())?;
            let size = manager.db().size_bytes()?;

            if cli.json {
                let tables: serde_json::Map<String, serde_json::Value> = counts
                    .iter()
                    .map(|(table, count)| (table.to_string(), json!(count)))
                    .collect();
                println!("{}", json!({ "database": database, "size_bytes": size, "tables": tables }));
            } else {
                println!("📊 Datastore Statistics ({:?})", database);
                println!("------------------------------------");
                for (table, count) in counts {
                    println!("   {:<36} {}", table, count);
                }
                println!("   {:<36} {}", "size (bytes)", size);
            }
        }

        Commands::Sweep { earliest_valid } => {
            let manager = open_manager(config, database)?;
            tracing::info!("Sweeping records inserted before {}", earliest_valid);
            let deleted = manager.transact(|dao| dao.delete_expired_records(earliest_valid))?;

            if cli.json {
                println!("{}", json!({ "deleted": deleted }));
            } else {
                println!("🧹 Swept {} expired rows", deleted);
            }
        }

        Commands::PruneApps { installed } => {
            let installed = installed
                .iter()
                .map(|package| app_uri(package))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let manager = open_manager(config, database)?;
            tracing::info!("Pruning records of apps outside {} installed", installed.len());
            let changed = manager.transact(|dao| dao.delete_app_records_not_present(&installed))?;

            if cli.json {
                println!("{}", json!({ "changed": changed }));
            } else if changed {
                println!("🧹 Removed records of uninstalled apps");
            } else {
                println!("✅ Nothing to prune.");
            }
        }

        Commands::Install { package, time } => {
            let app = app_uri(&package)?;
            let manager = open_manager(config, database)?;
            let marked = manager.transact(|dao| dao.do_install_attribution(&app, time))?;

            if cli.json {
                println!("{}", json!({ "app": app, "attributed_sources": marked }));
            } else if marked == 0 {
                println!("∅ No eligible sources for {}", app);
            } else {
                println!("📲 Install of {} attributed to {} source(s)", app, marked);
            }
        }

        Commands::Uninstall { package } => {
            let app = app_uri(&package)?;
            let manager = open_manager(config, database)?;
            let changed = manager.transact(|dao| {
                dao.undo_install_attribution(&app)?;
                dao.delete_app_data(&app)
            })?;

            if cli.json {
                println!("{}", json!({ "app": app, "changed": changed }));
            } else if changed {
                println!("🗑️  Removed records of {}", app);
            } else {
                println!("∅ No records for {}", app);
            }
        }

        Commands::DeleteRegistrant { registrant } => {
            let registrant = parse_uri(&registrant)?;
            let manager = open_manager(config, database)?;
            let changed = manager.transact(|dao| dao.delete_app_records(&registrant))?;

            if cli.json {
                println!("{}", json!({ "registrant": registrant, "changed": changed }));
            } else if changed {
                println!("🗑️  Dropped queued registrations of {}", registrant);
            } else {
                println!("∅ No queued registrations for {}", registrant);
            }
        }
    }

    Ok(())
}
