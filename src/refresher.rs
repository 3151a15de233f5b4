//! Loading and reloading of the static reference data.
//!
//! One [`Refresher`] owns the [`ReferenceStore`] and the configured
//! [`BundleSource`]. Loads happen at startup, on a fixed interval, and on
//! demand when a join misses a route. At most one load runs at a time; a
//! caller that had to wait for a running load takes its result instead of
//! starting another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::error::Result;
use crate::reference::{BundleSource, ReferenceStore, Snapshot, Tables};

/// Read access to the current snapshot plus the miss-recovery path, as the
/// joins need it.
#[async_trait]
pub trait ReferenceData: Send + Sync {
    fn snapshot(&self) -> Arc<Snapshot>;

    /// Reloads after a lookup miss and returns the snapshot to retry
    /// against. Never fails: on error the current snapshot comes back.
    async fn refresh_on_miss(&self) -> Arc<Snapshot>;
}

pub struct Refresher {
    store: ReferenceStore,
    source: Box<dyn BundleSource>,
    on_demand_cooldown: Duration,
    in_flight: Mutex<()>,
    /// Finished load attempts, successful or not.
    attempts: AtomicU64,
    loads: AtomicU64,
    /// When the last load finished, successful or not. The on-demand
    /// cooldown counts from here.
    last_attempt: std::sync::Mutex<Instant>,
}

impl Refresher {
    /// Performs the startup load. There is nothing to serve without it, so
    /// its failure is returned to the caller instead of being retried.
    #[instrument(skip(source), fields(source = %source.describe()))]
    pub async fn bootstrap(
        source: Box<dyn BundleSource>,
        on_demand_cooldown: Duration,
    ) -> Result<Arc<Self>> {
        info!("Loading initial GTFS bundle");
        let snapshot = load_snapshot(source.as_ref(), 1).await?;
        info!(
            routes = snapshot.routes().len(),
            trips = snapshot.trips().len(),
            stops = snapshot.stops().len(),
            "Initial GTFS snapshot installed"
        );

        Ok(Arc::new(Self {
            store: ReferenceStore::new(snapshot),
            source,
            on_demand_cooldown,
            in_flight: Mutex::new(()),
            attempts: AtomicU64::new(0),
            loads: AtomicU64::new(1),
            last_attempt: std::sync::Mutex::new(Instant::now()),
        }))
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.current()
    }

    /// Number of bundle loads actually started, the startup load included.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Reloads the bundle and installs the result.
    ///
    /// If another refresh is running, waits for it and returns whatever
    /// snapshot is current once it finishes. On failure the previous
    /// snapshot stays installed and the error is returned.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>> {
        let seen = self.attempts.load(Ordering::SeqCst);
        let _guard = self.in_flight.lock().await;

        if self.attempts.load(Ordering::SeqCst) != seen {
            debug!("Coalesced with a refresh that finished while waiting");
            return Ok(self.store.current());
        }

        let result = self.load_and_install().await;
        *self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.attempts.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn load_and_install(&self) -> Result<Arc<Snapshot>> {
        let generation = self.store.current().generation() + 1;
        self.loads.fetch_add(1, Ordering::SeqCst);

        match load_snapshot(self.source.as_ref(), generation).await {
            Ok(snapshot) => {
                self.store.install(snapshot);
                let current = self.store.current();
                info!(
                    generation,
                    loaded_at = %current.loaded_at(),
                    routes = current.routes().len(),
                    trips = current.trips().len(),
                    stops = current.stops().len(),
                    "Installed new GTFS snapshot"
                );
                Ok(current)
            }
            Err(e) => {
                error!(
                    error = %e,
                    source = %self.source.describe(),
                    "GTFS refresh failed, keeping previous snapshot"
                );
                Err(e)
            }
        }
    }

    /// Starts the periodic refresh. The first run happens one `interval`
    /// after this call; missed ticks are skipped.
    pub fn spawn_scheduled(self: &Arc<Self>, interval: Duration) -> ScheduledRefresh {
        let interval = interval.max(Duration::from_millis(1));
        let refresher = Arc::clone(self);
        let (shutdown, mut stopped) = oneshot::channel::<()>();

        let task = async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        info!("Scheduled GTFS refresh starting");
                        if let Err(e) = refresher.refresh().await {
                            warn!(error = %e, "Scheduled GTFS refresh failed");
                        }
                    }
                    _ = &mut stopped => {
                        info!("Scheduled GTFS refresh stopped");
                        break;
                    }
                }
            }
        };

        info!(interval_secs = interval.as_secs(), "Scheduled GTFS refresh started");
        ScheduledRefresh {
            shutdown: Some(shutdown),
            handle: tokio::spawn(task.instrument(info_span!("scheduled_refresh"))),
        }
    }
}

#[async_trait]
impl ReferenceData for Refresher {
    fn snapshot(&self) -> Arc<Snapshot> {
        self.store.current()
    }

    async fn refresh_on_miss(&self) -> Arc<Snapshot> {
        let since_attempt = self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed();

        if since_attempt < self.on_demand_cooldown {
            let current = self.store.current();
            debug!(
                since_attempt_ms = since_attempt.as_millis() as u64,
                loaded_at = %current.loaded_at(),
                "Last load attempt is recent, skipping on-demand refresh"
            );
            return current;
        }

        info!("Route lookup missed, refreshing GTFS bundle on demand");
        match self.refresh().await {
            Ok(snapshot) => snapshot,
            Err(_) => self.store.current(),
        }
    }
}

/// Handle to the periodic refresh task. Dropping it also stops the task.
pub struct ScheduledRefresh {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ScheduledRefresh {
    /// Signals the task and waits for it to exit. A refresh already in
    /// progress is allowed to finish first.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            warn!(error = %e, "Scheduled refresh task ended abnormally");
        }
    }
}

async fn load_snapshot(source: &dyn BundleSource, generation: u64) -> Result<Snapshot> {
    let bundle = source.fetch().await?;
    tokio::task::spawn_blocking(move || {
        let tables = Tables::parse(&bundle)?;
        Ok(Snapshot::new(tables, generation))
    })
    .await?
}
