mod db;
mod error;
mod export;
mod fetch;
mod parser;
mod scheduler;
mod settings;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use db::{LatestRow, Store};
use export::CsvExporter;
use fetch::PageLoader;
use scheduler::{Sink, Written};
use settings::Settings;

#[derive(Parser)]
#[command(name = "station_scraper", about = "Charging station status scraper")]
struct Cli {
    /// Station list page (overrides CHARGE_URL)
    #[arg(long, global = true)]
    url: Option<String>,
    /// Fetch the page once, then serve it from the local cache file
    #[arg(long, global = true)]
    debug: bool,
    /// SQLite database file (overrides CHARGE_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Write cycles to this CSV file instead of the database
    #[arg(long, global = true)]
    csv: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the station tables
    Init,
    /// Run a single scrape cycle
    Once,
    /// Run a scrape cycle on a fixed cadence until Ctrl-C
    Run {
        /// Seconds between cycles (overrides CHARGE_INTERVAL_SECS)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Show table counts and the latest cycle
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Most recent status of every socket
    Latest {
        /// Only this station number
        #[arg(short, long)]
        station: Option<i64>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load().context("failed to load settings")?;
    if let Some(url) = cli.url {
        settings.url = Some(url);
    }
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    if let Some(csv) = cli.csv {
        settings.csv_path = Some(csv);
    }
    settings.debug |= cli.debug;

    let result = match cli.command {
        Commands::Init => {
            let store = open_store(&settings)?;
            store.close()?;
            println!("Schema ready in {:?}", settings.db_path);
            Ok(())
        }
        Commands::Once => {
            let source = page_loader(&settings)?;
            let sink = open_sink(&settings)?;
            let cycle = scheduler::run_cycle(&source, &sink).await;
            close_sink(sink)?;

            let report = cycle?;
            println!("Cycle {}: {} records.", report.timestamp, report.records);
            match report.written {
                Written::Database(s) => println!(
                    "Saved {} statuses ({} already recorded).",
                    s.statuses_inserted, s.statuses_duplicate
                ),
                Written::Csv(s) => println!(
                    "Updated {} rows, added {} rows.",
                    s.rows_updated, s.rows_added
                ),
            }
            Ok(())
        }
        Commands::Run { interval } => {
            let period = interval
                .map(|s| Duration::from_secs(s.max(1)))
                .unwrap_or_else(|| settings.interval());
            let source = page_loader(&settings)?;
            let sink = open_sink(&settings)?;
            scheduler::run_every(&source, &sink, period).await;
            close_sink(sink)
        }
        Commands::Stats { json } => {
            let store = open_store(&settings)?;
            let s = store.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&s)?);
            } else {
                println!("Stations: {}", s.stations);
                println!("Sockets:  {}", s.sockets);
                println!("Statuses: {}", s.statuses);
                println!("Cycles:   {}", s.cycles);
                match s.latest_cycle {
                    Some(ts) => println!("Latest:   {}", ts),
                    None => println!("Latest:   -"),
                }
            }
            store.close()?;
            Ok(())
        }
        Commands::Latest {
            station,
            limit,
            json,
        } => {
            let store = open_store(&settings)?;
            let mut rows = store.latest(station)?;
            store.close()?;
            rows.truncate(limit);

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            if rows.is_empty() {
                println!("No statuses recorded yet.");
                return Ok(());
            }

            println!(
                "{:>6} | {:<24} | {:<16} | {:>4} | {:<10} | {:>6} | {:<10}",
                "#", "Name", "City", "Port", "Socket", "kW", "Status"
            );
            println!("{}", "-".repeat(96));
            for r in &rows {
                let power = r.power.map(|p| format!("{:.1}", p)).unwrap_or_else(|| "-".into());
                println!(
                    "{:>6} | {:<24} | {:<16} | {:>4} | {:<10} | {:>6} | {:<10}",
                    r.number,
                    truncate(&r.name, 24),
                    truncate(&r.city, 16),
                    r.charger_port,
                    truncate(&r.socket, 10),
                    power,
                    r.status
                );
            }
            if let Some(newest) = newest_timestamp(&rows) {
                println!("\n{} sockets | as of {}", rows.len(), newest);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(settings: &Settings) -> anyhow::Result<Store> {
    if let Some(dir) = settings.db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {:?}", dir))?;
    }
    let store = Store::open(&settings.db_path)
        .with_context(|| format!("failed to open {:?}", settings.db_path))?;
    store.init_schema()?;
    Ok(store)
}

fn open_sink(settings: &Settings) -> anyhow::Result<Sink> {
    Ok(match &settings.csv_path {
        Some(path) => Sink::Csv(CsvExporter::new(path)),
        None => Sink::Database(open_store(settings)?),
    })
}

fn close_sink(sink: Sink) -> anyhow::Result<()> {
    if let Sink::Database(store) = sink {
        store.close()?;
    }
    Ok(())
}

fn page_loader(settings: &Settings) -> anyhow::Result<PageLoader> {
    let url = settings
        .url
        .clone()
        .context("no station page URL: pass --url or set CHARGE_URL")?;
    let loader = PageLoader::new(url);
    Ok(if settings.debug {
        loader.with_cache(&settings.cache_path)
    } else {
        loader
    })
}

/// Sockets are listed by station number, so the first row is not the newest.
fn newest_timestamp(rows: &[LatestRow]) -> Option<DateTime<Utc>> {
    rows.iter().map(|r| r.timestamp).max()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
