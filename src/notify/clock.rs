//! Clock monitor — detects system sleep and wall-clock jumps.
//!
//! Fixed-delay timers keep counting monotonic time while the machine is
//! asleep and ignore manual clock changes entirely, so after either event
//! the armed timers no longer match the wall clock. The monitor samples
//! both clocks and rebuilds all timers when they diverge.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::SchedulerConfig;
use crate::notify::scheduler::NotificationScheduler;

/// Spawn the monitor loop. Each tick compares wall-clock elapsed time with
/// monotonic elapsed time; a gap beyond the configured threshold means the
/// system slept or the clock moved, and every timer is rebuilt from the
/// store via `reschedule_all`.
pub fn spawn_clock_monitor(
    scheduler: Arc<NotificationScheduler>,
    config: SchedulerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.clock_poll_interval);
        // Skip immediate first tick
        ticker.tick().await;

        let mut last_instant = Instant::now();
        let mut last_wall = Utc::now();

        loop {
            ticker.tick().await;

            let instant_now = Instant::now();
            let wall_now = Utc::now();

            // Signed, so a clock moved backwards registers as skew too.
            let monotonic_ms = instant_now.duration_since(last_instant).as_millis() as i64;
            let wall_ms = (wall_now - last_wall).num_milliseconds();
            let skew_ms = (wall_ms - monotonic_ms).unsigned_abs();

            if skew_ms > config.clock_skew_threshold.as_millis() as u64 {
                warn!(
                    skew_ms,
                    "Clock skew detected (sleep or clock change), rebuilding timers"
                );
                if let Err(e) = scheduler.reschedule_all().await {
                    warn!(error = %e, "Timer rebuild after clock skew failed");
                }
            } else {
                debug!(skew_ms, "Clock check");
            }

            last_instant = instant_now;
            last_wall = wall_now;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::notify::sink::LogSink;
    use crate::store::{Database, LibSqlBackend};

    #[tokio::test]
    async fn monitor_ticks_without_skew() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let scheduler = NotificationScheduler::new(db, Arc::new(LogSink));

        let config = SchedulerConfig {
            clock_poll_interval: Duration::from_millis(20),
            clock_skew_threshold: Duration::from_secs(60),
        };
        let handle = spawn_clock_monitor(scheduler.clone(), config);

        // A few quiet ticks must not disturb the (empty) timer map.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(scheduler.armed_count().await, 0);

        handle.abort();
    }
}
