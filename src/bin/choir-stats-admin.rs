use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use choir_stats::analytics::StatsService;
use choir_stats::config::Config;
use choir_stats::models::{Event, EventBatch, MonthKey};
use choir_stats::storage::{self, MemoryStorage, RollupStorage};

#[derive(Parser)]
#[command(name = "choir-stats-admin")]
#[command(about = "Choir statistics management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and store monthly statistics from an events file
    Snapshot {
        /// JSON file with either an array of events or {"events": [...]}
        #[arg(long)]
        events: PathBuf,
        /// Only this month (YYYY-MM); every month in the file otherwise
        #[arg(long)]
        month: Option<MonthKey>,
        /// Recompute even if the stored month is still fresh
        #[arg(long)]
        force: bool,
    },
    /// Print month, quarter and rolling 4-month counts for an events file
    Windows {
        #[arg(long)]
        events: PathBuf,
        /// Reference month (YYYY-MM), defaults to the current month
        #[arg(long)]
        reference: Option<MonthKey>,
    },
    /// Show the stored statistics of one month
    Month {
        /// Month key (YYYY-MM)
        key: MonthKey,
    },
    /// Show a quarter composed from its stored months
    Quarter {
        year: i32,
        /// Quarter number, 1-4
        quarter: u32,
    },
    /// Show a year composed from its stored months
    Year { year: i32 },
    /// List years that have stored statistics
    Years,
    /// List the stored months of a year
    Months { year: i32 },
    /// Delete the stored statistics of one month
    Delete {
        /// Month key (YYYY-MM)
        key: MonthKey,
    },
}

fn load_events(path: &Path) -> Result<Vec<Event>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read events file {}", path.display()))?;

    // Accept a bare array as well as the API's {"events": [...]} body
    if let Ok(events) = serde_json::from_str::<Vec<Event>>(&raw) {
        return Ok(events);
    }
    let batch: EventBatch = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse events file {}", path.display()))?;
    Ok(batch.events)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Windows needs no storage
    let storage: Arc<dyn RollupStorage> = match cli.command {
        Commands::Windows { .. } => Arc::new(MemoryStorage::new()),
        _ => storage::connect(&config)
            .await
            .context("Failed to open statistics storage")?,
    };
    let service = StatsService::from_config(&config.stats, storage);
    let store = service.store();

    match cli.command {
        Commands::Snapshot {
            events,
            month,
            force,
        } => {
            let events = load_events(&events)?;
            let outcomes = match month {
                Some(month) => vec![service.refresh_month(month, &events, force).await?],
                None => service.snapshot_all(&events, force).await?,
            };

            if outcomes.is_empty() {
                println!("No dated events found, nothing to store.");
            }
            for outcome in outcomes {
                let aggregate = outcome.aggregate();
                let status = if outcome.was_refreshed() {
                    "✓ Stored"
                } else {
                    "• Fresh, kept"
                };
                println!(
                    "{} {}-{:02}: {} events ({} home, {} other)",
                    status,
                    aggregate.year,
                    aggregate.month,
                    aggregate.monthly.total(),
                    aggregate.monthly.home_count(),
                    aggregate.monthly.other_count()
                );
            }
        }
        Commands::Windows { events, reference } => {
            let events = load_events(&events)?;
            print_json(&service.windows(&events, reference))?;
        }
        Commands::Month { key } => match store.get_month(key).await? {
            Some(aggregate) => print_json(&aggregate)?,
            None => println!("No statistics stored for {}", key),
        },
        Commands::Quarter { year, quarter } => {
            print_json(&store.get_quarter(quarter, year).await?)?;
        }
        Commands::Year { year } => {
            print_json(&store.get_year(year).await?)?;
        }
        Commands::Years => {
            let years = store.list_available_years().await?;
            if years.is_empty() {
                println!("No statistics stored yet.");
            } else {
                for year in years {
                    println!("{}", year);
                }
            }
        }
        Commands::Months { year } => {
            let months = store.list_available_months(year).await?;
            if months.is_empty() {
                println!("No statistics stored for {}.", year);
            } else {
                println!("{:<10} {:<10} {:>6} {:>6} {:>6}", "Month", "Name", "Home", "Other", "Total");
                println!("{}", "-".repeat(44));
                for entry in months {
                    let counts = entry.aggregate.monthly;
                    println!(
                        "{:<10} {:<10} {:>6} {:>6} {:>6}",
                        entry.month_key.to_string(),
                        entry.aggregate.month_name,
                        counts.home_count(),
                        counts.other_count(),
                        counts.total()
                    );
                }
            }
        }
        Commands::Delete { key } => {
            if store.delete_month(key).await? {
                println!("✓ Deleted statistics for {}", key);
            } else {
                println!("⚠ No statistics stored for {}", key);
            }
        }
    }

    Ok(())
}
