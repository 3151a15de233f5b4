//! Runtime settings shared by every subcommand.
//!
//! Each flag falls back to an environment variable (and from there to
//! `.env`, loaded in `main`) before its default.

use std::time::Duration;

use chrono_tz::Tz;
use clap::Args;

use crate::error::{Error, Result};

pub const DEFAULT_VEHICLES_URL: &str = "https://glphprdtmgtfs.glphtrpcloud.com/tmgtfsrealtimewebservice/vehicle/vehiclepositions.pb";
pub const DEFAULT_ALERTS_URL: &str =
    "https://glphprdtmgtfs.glphtrpcloud.com/tmgtfsrealtimewebservice/alert/alerts.pb";

/// Every lookup miss reloads unless a cooldown is configured.
pub const DEFAULT_ON_DEMAND_COOLDOWN_SECS: u64 = 0;

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Static bundle: directory of .txt files, path to a .zip, or zip URL
    #[arg(long, env = "GTFS_BUNDLE", default_value = "backup_data")]
    pub bundle: String,

    /// Seconds between scheduled bundle reloads
    #[arg(long, env = "GTFS_REFRESH_INTERVAL_SECS", default_value_t = 86_400)]
    pub refresh_interval_secs: u64,

    /// Minimum time since the last load attempt before a lookup miss may
    /// reload the bundle (0 = always reload)
    #[arg(
        long,
        env = "GTFS_ON_DEMAND_COOLDOWN_SECS",
        default_value_t = DEFAULT_ON_DEMAND_COOLDOWN_SECS
    )]
    pub on_demand_cooldown_secs: u64,

    /// GTFS-realtime vehicle positions endpoint
    #[arg(long, env = "GTFS_RT_VEHICLES_URL", default_value = DEFAULT_VEHICLES_URL)]
    pub vehicles_url: String,

    /// GTFS-realtime service alerts endpoint
    #[arg(long, env = "GTFS_RT_ALERTS_URL", default_value = DEFAULT_ALERTS_URL)]
    pub alerts_url: String,

    /// Whole-request timeout for upstream fetches, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Connect timeout for upstream fetches, in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub http_connect_timeout_secs: u64,

    /// IANA timezone alert periods are rendered in
    #[arg(long, env = "ALERT_TIMEZONE", default_value = "America/Toronto")]
    pub alert_timezone: String,
}

/// Validated form of [`Settings`].
#[derive(Debug, Clone)]
pub struct Config {
    pub bundle: String,
    pub refresh_interval: Duration,
    pub on_demand_cooldown: Duration,
    pub vehicles_url: String,
    pub alerts_url: String,
    pub http_timeout: Duration,
    pub http_connect_timeout: Duration,
    pub alert_timezone: Tz,
}

impl TryFrom<Settings> for Config {
    type Error = Error;

    fn try_from(settings: Settings) -> Result<Self> {
        if settings.bundle.trim().is_empty() {
            return Err(config_error("bundle location must not be empty"));
        }
        if settings.refresh_interval_secs == 0 {
            return Err(config_error("refresh interval must be at least one second"));
        }
        if settings.http_timeout_secs == 0 || settings.http_connect_timeout_secs == 0 {
            return Err(config_error("HTTP timeouts must be at least one second"));
        }

        let alert_timezone = settings
            .alert_timezone
            .parse::<Tz>()
            .map_err(|e| config_error(format!("invalid alert timezone: {e}")))?;

        Ok(Self {
            bundle: settings.bundle,
            refresh_interval: Duration::from_secs(settings.refresh_interval_secs),
            on_demand_cooldown: Duration::from_secs(settings.on_demand_cooldown_secs),
            vehicles_url: settings.vehicles_url,
            alerts_url: settings.alerts_url,
            http_timeout: Duration::from_secs(settings.http_timeout_secs),
            http_connect_timeout: Duration::from_secs(settings.http_connect_timeout_secs),
            alert_timezone,
        })
    }
}

fn config_error(message: impl Into<String>) -> Error {
    Error::Config {
        message: message.into(),
    }
}
