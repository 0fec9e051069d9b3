//! Fixed-period tick scheduler for Waypost.
//!
//! Drives background work that has to happen on a steady cadence, such as
//! session revalidation. Ticks are skipped, never bunched: if the owner was
//! busy past a deadline the next tick is scheduled one period from now.
//!
//! # Disabled mode
//!
//! When `period` is zero, [`TickScheduler::wait_for_tick`] pends forever.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.changed() => break,
//!         tick = scheduler.wait_for_tick() => revalidate(tick).await,
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// Configuration for the tick scheduler.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. Zero disables ticking.
    pub period: Duration,
    /// Upper bound of the random delay added to the *first* tick, so that
    /// many clients started together don't tick in lockstep.
    pub initial_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period: Duration::ZERO,
            initial_jitter: Duration::from_secs(2),
        }
    }
}

/// Information about a fired tick.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// Whole periods that were skipped because the tick fired late.
    pub ticks_skipped: u64,
}

/// Fixed-period tick scheduler.
pub struct TickScheduler {
    period: Option<Duration>,
    tick_count: u64,
    next_tick: Option<Instant>,
}

impl TickScheduler {
    /// Create a new scheduler; the first tick is one period (plus jitter)
    /// from now.
    pub fn new(config: TickConfig) -> Self {
        let period = (!config.period.is_zero()).then_some(config.period);

        let next_tick = period.map(|p| {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let max = config.initial_jitter.as_millis() as u64;
                Duration::from_millis(rand::rng().random_range(0..=max))
            };
            Instant::now() + p + jitter
        });

        match period {
            Some(p) => debug!(period_ms = p.as_millis() as u64, "tick scheduler created"),
            None => debug!("tick scheduler created disabled (zero period)"),
        }

        Self {
            period,
            tick_count: 0,
            next_tick,
        }
    }

    /// Wait until the next tick is due.
    ///
    /// Pends forever when disabled; `tokio::select!` will still process
    /// other branches.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, period) = match (self.next_tick, self.period) {
            (Some(next), Some(period)) => (next, period),
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(next);
        let ticks_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_millis() as u64,
                "tick fired late, skipping ahead"
            );
        }
        // Always schedule from now, not from the missed deadline.
        self.next_tick = Some(now + period);

        trace!(tick = self.tick_count, "tick fired");

        TickInfo {
            tick: self.tick_count,
            ticks_skipped,
        }
    }
}
