//! pharmadb - administrative CLI for the pharmacopoeia inspection store
//!
//! - `init` creates the schema and indexes (idempotent)
//! - `stats` prints row counts and laboratory figures
//! - `config` reads and writes `system_config` entries

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use pharmadb_store::workflows::upsert_system_config;
use pharmadb_store::{Store, SystemConfig};

mod env;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "pharmadb",
    author,
    version,
    about = "Administer the pharmacopoeia inspection database"
)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(long, global = true)]
    debug: bool,

    /// Config file (default: ~/.pharmadb/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Database URL, overriding config and DATABASE_URL
    #[arg(long, global = true, value_name = "URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create tables and indexes if they do not exist
    Init(InitArgs),
    /// Row counts per table and per-laboratory experiment figures
    Stats(StatsArgs),
    /// Read and write system configuration entries
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
struct InitArgs {
    /// Create tables only
    #[arg(long)]
    skip_indexes: bool,
}

#[derive(Parser, Debug)]
struct StatsArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show one entry
    Get {
        /// Dot-notation key (e.g. "qa.retention_days")
        key: String,
    },
    /// Insert or update an entry's value
    Set {
        key: String,
        value: String,
        /// Recorded as updated_by
        #[arg(long)]
        editor: Option<String>,
    },
    /// List entries
    List {
        /// Only entries in this category
        #[arg(long)]
        category: Option<String>,
        /// Only entries that `set` may change
        #[arg(long)]
        editable: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let env_files = env::load_dotenv();
    tracing_setup::init_tracing(&tracing_setup::TracingConfig { debug: cli.debug }).ok();
    env::log_loaded(&env_files);

    let config = env::resolve_config(cli.config.as_deref(), cli.database_url)?;
    let store = Store::connect(config)
        .await
        .context("Failed to connect to the database")?;

    let outcome = match cli.command {
        Commands::Init(args) => run_init(&store, args).await,
        Commands::Stats(args) => run_stats(&store, args).await,
        Commands::Config(args) => run_config(&store, args).await,
    };
    store.close().await;
    outcome
}

async fn run_init(store: &Store, args: InitArgs) -> Result<()> {
    store.initialize_schema().await.context("Schema initialization failed")?;
    if !args.skip_indexes {
        store.create_indexes().await.context("Index creation failed")?;
    }

    let report = store.verify_schema().await?;
    if !report.is_complete() {
        bail!("Tables still missing after init: {}", report.missing.join(", "));
    }
    info!(tables = report.present.len(), "schema ready");
    println!("✓ {} tables ready", report.present.len());
    Ok(())
}

async fn run_stats(store: &Store, args: StatsArgs) -> Result<()> {
    let mut session = store.acquire().await?;
    let tables = session.reports().table_counts().await?;
    let volumes = session.reports().volume_counts().await?;
    let labs = session.reports().laboratory_stats().await?;

    if args.json {
        let labs: Vec<_> = labs
            .iter()
            .map(|lab| {
                serde_json::json!({
                    "lab_code": lab.lab_code,
                    "lab_name": lab.lab_name,
                    "experiments": lab.experiments,
                    "completed": lab.completed,
                    "qualified": lab.qualified,
                    "completion_rate": lab.completion_rate(),
                    "pass_rate": lab.pass_rate(),
                })
            })
            .collect();
        let out = serde_json::json!({
            "tables": tables,
            "volumes": volumes,
            "laboratories": labs,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{:<26} {:>10}", "TABLE", "ROWS");
    for count in &tables {
        println!("{:<26} {:>10}", count.table, count.rows);
    }
    println!();
    for volume in &volumes {
        println!("Volume {}: {} items", volume.volume, volume.items);
    }
    if !labs.is_empty() {
        println!();
        println!(
            "{:<12} {:>11} {:>10} {:>10}",
            "LAB", "EXPERIMENTS", "COMPLETE%", "PASS%"
        );
        for lab in &labs {
            println!(
                "{:<12} {:>11} {:>10} {:>10}",
                lab.lab_code,
                lab.experiments,
                rate(lab.completion_rate()),
                rate(lab.pass_rate())
            );
        }
    }
    Ok(())
}

fn rate(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

async fn run_config(store: &Store, args: ConfigArgs) -> Result<()> {
    let mut session = store.acquire().await?;
    match args.command {
        ConfigCommands::Get { key } => {
            let entry = session
                .repo::<SystemConfig>()
                .find(key.clone())
                .await?
                .with_context(|| format!("No config entry '{key}'"))?;
            println!("{}", entry.config_value.as_deref().unwrap_or(""));
        }
        ConfigCommands::Set { key, value, editor } => {
            let write = upsert_system_config(&mut session, &key, &value, editor.as_deref()).await?;
            println!("✓ {} {:?}", write.config.config_key, write.outcome);
        }
        ConfigCommands::List {
            category,
            editable,
            json,
        } => {
            let mut configs = session.repo::<SystemConfig>();
            let mut entries = match category {
                Some(category) => configs.find_by_category(&category).await?,
                None if editable => configs.find_editable().await?,
                None => configs.find_all(&[], None).await?,
            };
            if editable {
                entries.retain(|entry| entry.is_editable);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    let lock = if entry.is_editable { "" } else { " (locked)" };
                    println!(
                        "{} = {}{}",
                        entry.config_key,
                        entry.config_value.as_deref().unwrap_or(""),
                        lock
                    );
                }
            }
        }
    }
    Ok(())
}
