//! CLI entry point for the GTFS realtime map backend.
//!
//! Provides subcommands that print one map view as JSON, and a `watch`
//! mode that keeps the reference data fresh and rewrites the view files on
//! every poll.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gtfs_rt_map::{
    config::{Config, Settings},
    fetch::BasicClient,
    join::{AlertView, BusMarker, TimeFormatter, join_alerts, join_vehicles},
    output::{print_json, write_json, write_json_to_dir},
    realtime::{Batch, RealtimeFeeds},
    reference::source_for_location,
    refresher::Refresher,
    views::{route_data, shape_coords_for_route},
};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_rt_map")]
#[command(about = "Serves GTFS-realtime vehicles and alerts joined with static GTFS", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Current vehicle positions with route name, colour and headsign
    Vehicles {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Current service alerts with resolved routes and stops
    Alerts {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Shape polylines for one route
    Shapes {
        #[arg(long)]
        route_id: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Every route with the stops its trips visit
    Routes {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Rewrite vehicles.json, alerts.json and routes.json until Ctrl+C
    Watch {
        /// Directory the view files are written into
        #[arg(short = 'd', long, default_value = "public")]
        output_dir: PathBuf,

        /// Seconds between realtime polls
        #[arg(short = 'r', long, default_value_t = 15)]
        poll_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_rt_map.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_rt_map.log"));

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
    let config = Config::try_from(cli.settings)?;
    let app = App::start(&config).await?;

    match cli.command {
        Commands::Vehicles { output } => {
            emit(output.as_deref(), &app.vehicle_markers().await?)?;
        }
        Commands::Alerts { output } => {
            emit(output.as_deref(), &app.alert_views().await?)?;
        }
        Commands::Shapes { route_id, output } => {
            let coords = shape_coords_for_route(&app.refresher.snapshot(), &route_id);
            if coords.is_empty() {
                warn!(route_id = %route_id, "No shapes for route");
            }
            emit(output.as_deref(), &coords)?;
        }
        Commands::Routes { output } => {
            emit(output.as_deref(), &route_data(&app.refresher.snapshot()))?;
        }
        Commands::Watch {
            output_dir,
            poll_secs,
        } => {
            watch(&app, &config, &output_dir, poll_secs).await?;
        }
    }

    Ok(())
}

struct App {
    refresher: Arc<Refresher>,
    feeds: RealtimeFeeds<BasicClient>,
    clock: TimeFormatter,
}

impl App {
    /// Builds the HTTP client and performs the startup bundle load, which is
    /// the only fatal upstream failure.
    async fn start(config: &Config) -> Result<Self> {
        let client = BasicClient::new(config.http_timeout, config.http_connect_timeout)
            .context("Failed to build HTTP client")?;

        let source = source_for_location(&config.bundle, Arc::new(client.clone()));
        let refresher = Refresher::bootstrap(source, config.on_demand_cooldown)
            .await
            .with_context(|| format!("Initial GTFS load from {} failed", config.bundle))?;

        Ok(Self {
            refresher,
            feeds: RealtimeFeeds::new(
                client,
                config.vehicles_url.clone(),
                config.alerts_url.clone(),
            ),
            clock: TimeFormatter::new(config.alert_timezone),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn vehicle_markers(&self) -> Result<Vec<BusMarker>> {
        let vehicles = self
            .feeds
            .vehicles()
            .await
            .context("Vehicle positions feed unavailable")?;
        let markers = join_vehicles(self.refresher.as_ref(), &vehicles).await;
        Ok(report("vehicles", markers))
    }

    #[tracing::instrument(skip(self))]
    async fn alert_views(&self) -> Result<Vec<AlertView>> {
        let alerts = self
            .feeds
            .alerts()
            .await
            .context("Service alerts feed unavailable")?;
        let views = join_alerts(&self.refresher.snapshot(), &alerts, &self.clock);
        Ok(report("alerts", views))
    }
}

fn report<T>(view: &str, batch: Batch<T>) -> Vec<T> {
    info!(
        view,
        served = batch.items.len(),
        skipped = batch.skipped.len(),
        "View joined"
    );
    batch.items
}

fn emit<T: Serialize + ?Sized>(output: Option<&Path>, value: &T) -> Result<()> {
    match output {
        Some(path) => {
            write_json(path, value).with_context(|| format!("Writing {}", path.display()))?;
            info!(path = %path.display(), "View written");
        }
        None => print_json(value)?,
    }
    Ok(())
}

/// Rewrites the view files every `poll_secs` while the scheduled refresh
/// keeps the reference data current. A failed poll is logged and retried on
/// the next tick.
#[tracing::instrument(skip(app, config, output_dir), fields(output_dir = %output_dir.display()))]
async fn watch(app: &App, config: &Config, output_dir: &Path, poll_secs: u64) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Creating {}", output_dir.display()))?;

    let scheduled = app.refresher.spawn_scheduled(config.refresh_interval);
    let mut ticker = tokio::time::interval(Duration::from_secs(poll_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Watching feeds. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                write_views(app, output_dir).await;
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "Failed to listen for Ctrl+C");
                }
                break;
            }
        }
    }

    scheduled.stop().await;
    info!("Finished watching feeds");
    Ok(())
}

async fn write_views(app: &App, output_dir: &Path) {
    match app.vehicle_markers().await {
        Ok(markers) => write_view(output_dir, "vehicles.json", &markers),
        Err(e) => log_poll_failure("vehicles", &e),
    }

    match app.alert_views().await {
        Ok(views) => write_view(output_dir, "alerts.json", &views),
        Err(e) => log_poll_failure("alerts", &e),
    }

    write_view(output_dir, "routes.json", &route_data(&app.refresher.snapshot()));
}

/// An unreachable upstream is expected now and then and the previous file
/// stays in place, so it only warns. Anything else is an error.
fn log_poll_failure(feed: &str, e: &anyhow::Error) {
    if is_upstream_outage(e) {
        warn!(
            feed,
            error = %format!("{e:#}"),
            "Realtime upstream unavailable, keeping last view"
        );
    } else {
        error!(feed, error = %format!("{e:#}"), "Realtime poll failed");
    }
}

fn is_upstream_outage(e: &anyhow::Error) -> bool {
    e.downcast_ref::<gtfs_rt_map::Error>()
        .is_some_and(gtfs_rt_map::Error::is_upstream_unavailable)
}

fn write_view<T: Serialize + ?Sized>(output_dir: &Path, name: &str, value: &T) {
    if let Err(e) = write_json_to_dir(output_dir, name, value) {
        error!(file = name, error = %e, "Failed to write view");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_status_is_an_outage() {
        let err = anyhow::Error::new(gtfs_rt_map::Error::UpstreamStatus {
            url: "http://localhost/vehicles".to_string(),
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        })
        .context("Vehicle positions feed unavailable");

        assert!(is_upstream_outage(&err));
    }

    #[test]
    fn test_decode_failure_is_not_an_outage() {
        let decode = gtfs_rt_map::parser::parse_feed(&[0xFF, 0xFE, 0x00, 0x01]).unwrap_err();
        let err = anyhow::Error::new(decode).context("Service alerts feed unavailable");

        assert!(!is_upstream_outage(&err));
        assert!(!is_upstream_outage(&anyhow::anyhow!("disk full")));
    }
}
