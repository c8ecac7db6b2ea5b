use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pingwatch::config::MonitorConfig;
use pingwatch::storage::{open_pool, ResultStore, SqliteStore, DEFAULT_RECENT_LIMIT};

#[derive(Parser)]
#[command(
    name = "pingwatch",
    about = "Scheduled HTTP uptime and latency probe with live result streaming",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "PINGWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + observer socket + scheduler)
    Serve {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Seconds between scheduled probes
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Probe target URL
        #[arg(long)]
        target: Option<String>,
    },

    /// Run one probe cycle now and print the stored result
    Probe {
        /// Probe target URL
        #[arg(long)]
        target: Option<String>,

        /// Probe timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Show recent probe results, newest first
    History {
        /// Maximum number of results
        #[arg(long, default_value = "100")]
        limit: usize,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Summarize the last 100 results
    Stats,
}

fn init_tracing(config: &MonitorConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::load_or_default(),
    };
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }

    init_tracing(&config);

    match cli.command {
        Commands::Serve {
            bind,
            interval_secs,
            target,
        } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(secs) = interval_secs {
                config.schedule.interval_secs = secs;
            }
            if let Some(target) = target {
                config.probe.target_url = target;
            }
            tracing::info!(bind = %config.server.bind, "Starting pingwatch daemon");
            pingwatch::serve(config).await?;
        }
        Commands::Probe {
            target,
            timeout_secs,
        } => {
            if let Some(target) = target {
                config.probe.target_url = target;
            }
            if let Some(secs) = timeout_secs {
                config.probe.timeout_secs = secs;
            }
            config.validate()?;

            let pool = open_pool(&config.storage.db_path)?;
            let monitor = pingwatch::build_monitor(&config, pool)?;
            match monitor.run_once().await {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => anyhow::bail!("probe result could not be stored"),
            }
        }
        Commands::History { limit, json } => {
            let store = SqliteStore::new(open_pool(&config.storage.db_path)?);
            let results = store.recent(limit).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No probe results yet.");
            } else {
                println!("{:<8} | {:<32} | {:<6} | Time (ms)", "ID", "Timestamp", "Status");
                println!("{:-<8}-|-{:-<32}-|-{:-<6}-|-{:-<9}", "", "", "", "");
                for r in results {
                    println!(
                        "{:<8} | {:<32} | {:<6} | {}",
                        r.id,
                        r.timestamp.to_rfc3339(),
                        r.status_code,
                        r.response_time
                    );
                }
            }
        }
        Commands::Stats => {
            let store = SqliteStore::new(open_pool(&config.storage.db_path)?);
            let results = store.recent(DEFAULT_RECENT_LIMIT).await?;
            let stats = pingwatch::analysis::stats::MonitorStats::from_results(&results);

            println!("\n=== pingwatch Summary (last {} results) ===", stats.total_requests);
            println!("Success rate:  {:.1}%", stats.success_rate);
            println!("Avg response:  {}ms", stats.avg_response_time);
            println!("Failed:        {}", stats.failed_requests);
            match stats.last_ping_time {
                Some(t) => println!("Last ping:     {}", t.to_rfc3339()),
                None => println!("Last ping:     N/A"),
            }
            println!();
        }
    }

    Ok(())
}
