//! CLI entry point for the weather relay.
//!
//! `serve` polls every configured station, pushes changes to WebSocket
//! clients and answers trend queries. The other subcommands run one piece of
//! that pipeline in isolation.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use weather_relay::{
    broadcast::{ChannelBroadcaster, wire_snapshot},
    config::Settings,
    fetch::BasicClient,
    poll::{PollCycle, Station},
    server::{self, AppState},
    store::StationStateStore,
    trend::{CsvStore, HistoryFilter, TrendService},
};

#[derive(Parser)]
#[command(name = "weather_relay")]
#[command(about = "Polls weather stations and relays changes to live clients", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll stations continuously and serve live updates and trend queries
    Serve {
        /// Path to the settings JSON file
        #[arg(short, long, default_value = "stations.json")]
        config: PathBuf,
    },
    /// Poll every station once and print the resulting state as JSON
    PollOnce {
        /// Path to the settings JSON file
        #[arg(short, long, default_value = "stations.json")]
        config: PathBuf,
    },
    /// Print the last 24 hours of one metric from the history archive
    Trend {
        #[arg(short, long, default_value = "stations.json")]
        config: PathBuf,

        #[arg(short, long)]
        station: String,

        /// temperature, humidity, barometer, rain, daily_rainfall, currwind or gustwind
        #[arg(short = 't', long = "type")]
        kind: String,

        /// Use the same window one year earlier
        #[arg(long, default_value_t = false)]
        last_year: bool,
    },
    /// Print all archived rows and daily extremes for one day
    Search {
        #[arg(short, long, default_value = "stations.json")]
        config: PathBuf,

        #[arg(short, long)]
        station: String,

        /// Day to search, YYYY-MM-DD
        #[arg(short, long)]
        date: NaiveDate,
    },
    /// Print raw and per-day aggregated history with window summaries
    History {
        #[arg(short, long, default_value = "stations.json")]
        config: PathBuf,

        #[arg(short, long)]
        station: String,

        #[arg(long, default_value_t = false)]
        last_24_hours: bool,

        #[arg(long, default_value_t = false)]
        last_30_days: bool,

        #[arg(long, default_value_t = false)]
        last_365_days: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/weather_relay.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("weather_relay.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let settings = Settings::load(&config)?;
            serve(settings).await?;
        }
        Commands::PollOnce { config } => {
            let settings = Settings::load(&config)?;
            let store = Arc::new(StationStateStore::new());
            let broadcaster = Arc::new(ChannelBroadcaster::new(store.clone()));
            let cycle = poll_cycle(&settings, store.clone(), broadcaster)?;

            let summary = cycle.tick().await;
            info!(
                polled = summary.polled,
                valid = summary.valid,
                invalid = summary.invalid,
                "Poll complete"
            );
            println!("{}", serde_json::to_string_pretty(&wire_snapshot(&store))?);
        }
        Commands::Trend {
            config,
            station,
            kind,
            last_year,
        } => {
            let settings = Settings::load(&config)?;
            let trends = trend_service(&settings);
            let now = Local::now().naive_local();
            let data = if last_year {
                trends.trend_24h_last_year(&station, &kind, now).await?
            } else {
                trends.trend_24h(&station, &kind, now).await?
            };
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Commands::Search {
            config,
            station,
            date,
        } => {
            let settings = Settings::load(&config)?;
            let day = trend_service(&settings)
                .search_by_date(&station, date)
                .await?;
            println!("{}", serde_json::to_string_pretty(&day)?);
        }
        Commands::History {
            config,
            station,
            last_24_hours,
            last_30_days,
            last_365_days,
        } => {
            let settings = Settings::load(&config)?;
            let filter = HistoryFilter {
                last_24_hours,
                last_30_days,
                last_365_days,
            };
            let history = trend_service(&settings)
                .historical(&station, filter, Local::now().naive_local())
                .await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
    }

    Ok(())
}

fn poll_cycle(
    settings: &Settings,
    store: Arc<StationStateStore>,
    broadcaster: Arc<ChannelBroadcaster>,
) -> Result<PollCycle<BasicClient, ChannelBroadcaster>> {
    let stations = settings
        .stations
        .iter()
        .map(|(name, url)| Station {
            name: name.clone(),
            url: url.clone(),
        })
        .collect();
    let client = BasicClient::new().context("Failed to build HTTP client")?;

    Ok(PollCycle::new(
        stations,
        Arc::new(client),
        store,
        broadcaster,
        settings.thresholds(),
        settings.fetch_timeout(),
    ))
}

fn trend_service(settings: &Settings) -> TrendService<CsvStore> {
    TrendService::new(
        CsvStore::new(&settings.history_dir),
        settings.stations.keys().cloned(),
    )
}

/// Runs the poll loop and the HTTP server until Ctrl-C.
#[tracing::instrument(skip(settings), fields(bind = %settings.bind, stations = settings.stations.len()))]
async fn serve(settings: Settings) -> Result<()> {
    let store = Arc::new(StationStateStore::new());
    let broadcaster = Arc::new(ChannelBroadcaster::new(store.clone()));
    let cycle = Arc::new(poll_cycle(&settings, store.clone(), broadcaster.clone())?);

    let (stop_tx, stop_rx) = watch::channel(false);

    let poller = {
        let cycle = cycle.clone();
        let mut stop = stop_rx.clone();
        let period = settings.tick();
        tokio::spawn(async move {
            cycle
                .run(period, async move {
                    let _ = stop.changed().await;
                })
                .await;
        })
    };

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind))?;

    let state = AppState {
        store,
        broadcaster,
        trends: Arc::new(trend_service(&settings)),
    };

    let mut server_stop = stop_rx;
    let server = tokio::spawn(server::serve(listener, state, async move {
        let _ = server_stop.changed().await;
    }));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");
    let _ = stop_tx.send(true);

    if let Err(e) = poller.await {
        error!(error = %e, "Poll loop task failed");
    }
    match server.await {
        Ok(result) => result?,
        Err(e) => error!(error = %e, "Server task failed"),
    }

    info!("Stopped");
    Ok(())
}
