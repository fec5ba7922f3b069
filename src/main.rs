// ABOUTME: Entry point for the tally binary.
// ABOUTME: Parses CLI arguments, initializes tracing, opens the store, and runs one command against it.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tally_core::blueprint::{Blueprint, blueprint, slug_to_category};
use tally_core::demo::demo_records;
use tally_core::{Category, Filter, LiveQuery, SettingId};
use tally_store::transfer::{read_import, write_export};
use tally_store::{Tally, TallyConfig};

/// Local record store with live queries and log retention.
#[derive(Parser)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store if needed and fill in default settings
    Init,

    /// List records of one category as a table
    List {
        /// Category slug, e.g. examples or test-results
        slug: String,
    },

    /// Print a category's rows on every change until interrupted
    Watch {
        slug: String,

        /// Only enabled parents
        #[arg(long)]
        enabled: bool,
    },

    /// Write records to a JSON export file
    Export {
        /// Output file
        out: PathBuf,

        /// Category slugs to include (default: all)
        #[arg(short, long)]
        category: Vec<String>,
    },

    /// Import records from a JSON export file
    Import { file: PathBuf },

    /// Delete logs older than the retention setting
    Purge,

    /// Read or change a setting
    Setting {
        #[command(subcommand)]
        action: SettingAction,
    },

    /// List child records whose parent no longer exists
    Orphans {
        /// Child category slug, e.g. example-results
        slug: String,
    },

    /// Load demo parents and results
    Demo {
        #[arg(long, default_value = "5")]
        parents: usize,

        #[arg(long, default_value = "3")]
        children: usize,
    },

    /// Delete the whole store
    Reset {
        /// Confirm the irreversible delete
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SettingAction {
    /// Print a setting value
    Get { id: String },
    /// Set a setting to a JSON value, e.g. true or "ONE_WEEK"
    Set { id: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tally=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = TallyConfig::from_env()?;
    let tally = Tally::open(&config)
        .await
        .with_context(|| format!("opening store at {}", config.db_path().display()))?;

    match cli.command {
        Commands::Init => {
            let count = tally.records().count(Category::Setting).await?;
            println!("store ready at {} ({count} settings)", config.db_path().display());
        }

        Commands::List { slug } => {
            let bp = blueprint(parse_slug(&slug)?);
            let records = tally.records().list(bp.category).await?;
            print_table(bp, &records)?;
        }

        Commands::Watch { slug, enabled } => {
            let bp = blueprint(parse_slug(&slug)?);
            let filter = if enabled { Filter::Enabled } else { Filter::All };
            let purger = config.purge_interval.map(|period| tally.spawn_purger(period));

            let _subscription = tally.subscribe(
                LiveQuery::new(bp.category).filter(filter),
                move |records| {
                    if let Err(e) = print_table(bp, &records) {
                        tracing::error!(error = %e, "failed to render rows");
                    }
                },
                |err| tracing::error!(error = %err, "live query failed"),
            );
            tokio::signal::ctrl_c().await?;
            if let Some(purger) = purger {
                purger.abort();
            }
        }

        Commands::Export { out, category } => {
            let categories = if category.is_empty() {
                Category::ALL.to_vec()
            } else {
                category
                    .iter()
                    .map(|slug| parse_slug(slug))
                    .collect::<Result<Vec<_>>>()?
            };
            let envelope = write_export(tally.records(), &out, &categories).await?;
            println!(
                "exported {} records to {}",
                envelope.exported_records_count,
                out.display()
            );
        }

        Commands::Import { file } => {
            let summary = read_import(tally.records(), &file).await?;
            println!(
                "imported {} records ({} dropped)",
                summary.imported, summary.dropped
            );
        }

        Commands::Purge => {
            let removed = tally.purge_expired_logs().await?;
            println!("purged {removed} logs");
        }

        Commands::Setting { action } => match action {
            SettingAction::Get { id } => {
                let id: SettingId = id.parse()?;
                println!("{}", tally.settings().try_get(id)?);
            }
            SettingAction::Set { id, value } => {
                let id: SettingId = id.parse()?;
                let value: serde_json::Value = serde_json::from_str(&value)
                    .with_context(|| format!("{value} is not a JSON value"))?;
                tally.settings().set(id, value).await?;
                tally
                    .logger()
                    .info("setting changed", Some(serde_json::json!({ "id": id.as_str() })))
                    .await?;
                println!("{} = {}", id.label(), tally.settings().get(id));
            }
        },

        Commands::Orphans { slug } => {
            let bp = blueprint(parse_slug(&slug)?);
            let orphans = tally.records().orphaned_children(bp.category).await?;
            print_table(bp, &orphans)?;
        }

        Commands::Demo { parents, children } => {
            let keys = tally
                .records()
                .bulk_add_records(demo_records(parents, children))
                .await?;
            tally
                .logger()
                .info("demo data loaded", Some(serde_json::json!({ "records": keys.len() })))
                .await?;
            println!("added {} demo records", keys.len());
        }

        Commands::Reset { yes } => {
            if !yes {
                bail!("refusing to delete the store without --yes");
            }
            tally.delete_store().await?;
            println!("store deleted");
        }
    }

    Ok(())
}

fn parse_slug(slug: &str) -> Result<Category> {
    match slug_to_category(slug) {
        Some(category) => Ok(category),
        None => bail!("unknown category: {slug}"),
    }
}

fn print_table(bp: &Blueprint, records: &[tally_core::Record]) -> Result<()> {
    let headers: Vec<&str> = bp
        .visible_columns
        .iter()
        .filter_map(|key| bp.column(*key))
        .map(|column| column.label)
        .collect();
    println!("{} ({})", bp.plural, records.len());
    println!("{}", headers.join("\t"));
    for record in records {
        println!("{}", bp.render_row(record)?.join("\t"));
    }
    Ok(())
}
