use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::Database;

/// Default period between flush attempts.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Source of flush ticks.
pub trait Clock: Send {
    /// Completes at the next tick.
    fn tick(&mut self) -> impl Future<Output = ()> + Send;
}

/// Ticks on a fixed period. The first tick is one period after creation.
pub struct IntervalClock {
    interval: Interval,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        // A slow flush pushes the schedule back instead of bursting.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl Clock for IntervalClock {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Periodically writes the database image if it changed, and once more
/// on shutdown.
///
/// Flushes run one at a time: the loop awaits each flush before waiting
/// for the next tick.
pub struct DurabilityTimer<C> {
    db: Arc<Database>,
    clock: C,
}

impl<C: Clock> DurabilityTimer<C> {
    pub fn new(db: Arc<Database>, clock: C) -> Self {
        Self { db, clock }
    }

    /// Run until `shutdown` is cancelled, then flush a final time.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.clock.tick() => self.flush_if_dirty().await,
            }
        }

        info!("Saving database before exit");
        self.flush_if_dirty().await;
    }

    async fn flush_if_dirty(&self) {
        let db = self.db.clone();
        match tokio::task::spawn_blocking(move || db.flush_if_dirty()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Database flush failed: {:#}", e),
            Err(e) => error!("Database flush task failed: {}", e),
        }
    }
}
