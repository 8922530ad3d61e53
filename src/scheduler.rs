//! Periodic refresh of the exit list.

use crate::config::MAX_REFRESH_INTERVAL_SECONDS;
use crate::filter::TorBlock;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Scheduler for periodic exit list refreshes.
pub struct RefreshScheduler {
    guard: TorBlock,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(guard: TorBlock, interval: Duration) -> Self {
        Self { guard, interval }
    }

    /// Spawn the refresh loop on the current tokio runtime.
    ///
    /// The first refresh happens one full interval after start. A failed
    /// refresh keeps the previous list and waits for the next tick.
    ///
    /// The interval is clamped to between one second and
    /// [`MAX_REFRESH_INTERVAL_SECONDS`].
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let period = self.interval.clamp(
            Duration::from_secs(1),
            Duration::from_secs(MAX_REFRESH_INTERVAL_SECONDS),
        );

        debug!(
            interval_secs = period.as_secs(),
            "Starting Tor exit list scheduler"
        );

        let handle = tokio::spawn(async move {
            let now = Instant::now();
            let first = now.checked_add(period).unwrap_or(now);
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("Running scheduled Tor exit list refresh");
                        if let Err(e) = self.guard.refresh().await {
                            error!(error = %e, "Failed to retrieve Tor exit node list");
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("Tor exit list scheduler stopped");
                        break;
                    }
                }
            }
        });

        SchedulerHandle {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

/// Owner handle for a running scheduler. Dropping it stops the scheduler.
pub struct SchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal the loop to stop. Returns immediately; later calls do nothing.
    ///
    /// A refresh already in flight completes before the loop exits.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }

    /// Whether the background task is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Tor exit list scheduler task failed");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::filter::tests::StaticSource;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn guard_with(source: Arc<StaticSource>, interval_secs: u64) -> TorBlock {
        let config = Config {
            refresh_interval_seconds: interval_secs,
            ..Config::default()
        };
        TorBlock::with_source(config, source)
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_every_interval() {
        let source = Arc::new(StaticSource::new(&["1.2.3.4"]));
        let guard = guard_with(source.clone(), 60);
        let _handle = guard.run();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.fetch_count(), 0);
        assert!(guard.current_list().is_none());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(source.fetch_count(), 1);
        assert!(guard.current_list().unwrap().contains_address("1.2.3.4"));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_failure_keeps_list() {
        let source = Arc::new(StaticSource::new(&["1.2.3.4"]));
        let guard = guard_with(source.clone(), 10);
        guard.refresh().await.unwrap();
        let loaded = guard.current_list().unwrap();

        source.failing.store(true, Ordering::SeqCst);
        let _handle = guard.run();
        tokio::time::sleep(Duration::from_secs(35)).await;

        assert_eq!(source.fetch_count(), 4);
        assert!(Arc::ptr_eq(&loaded, &guard.current_list().unwrap()));

        // Recovers on the next tick once the source is healthy again.
        source.failing.store(false, Ordering::SeqCst);
        source.set_addresses(&["5.6.7.8"]);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(guard.current_list().unwrap().contains_address("5.6.7.8"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_refreshes() {
        let source = Arc::new(StaticSource::new(&["1.2.3.4"]));
        let guard = guard_with(source.clone(), 10);
        let mut handle = guard.run();

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(source.fetch_count(), 1);
        assert!(handle.is_running());

        handle.stop();
        handle.stop();
        tokio::time::sleep(Duration::from_secs(100)).await;

        assert_eq!(source.fetch_count(), 1);
        assert!(!handle.is_running());
        // Loaded state stays usable after stopping.
        assert!(guard.is_exit_node("1.2.3.4").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_scheduler() {
        let source = Arc::new(StaticSource::new(&["1.2.3.4"]));
        let guard = guard_with(source.clone(), 10);

        drop(guard.run());
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_interval_keeps_running() {
        let source = Arc::new(StaticSource::new(&["1.2.3.4"]));
        let guard = guard_with(source.clone(), u64::MAX);
        let handle = guard.run();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(handle.is_running());
        assert_eq!(source.fetch_count(), 0);

        // Requests still load the list lazily.
        assert!(guard.is_exit_node("1.2.3.4").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_period_is_clamped() {
        let source = Arc::new(StaticSource::new(&["1.2.3.4"]));
        let guard = guard_with(source.clone(), 60);
        let handle = RefreshScheduler::new(guard, Duration::MAX).start();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(handle.is_running());
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_uses_default() {
        let source = Arc::new(StaticSource::new(&["1.2.3.4"]));
        let guard = guard_with(source.clone(), 0);
        let handle = guard.run();

        tokio::time::sleep(Duration::from_secs(3599)).await;
        assert!(handle.is_running());
        assert_eq!(source.fetch_count(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_running());
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_clamped() {
        let source = Arc::new(StaticSource::new(&["1.2.3.4"]));
        let guard = guard_with(source.clone(), 60);
        let handle = RefreshScheduler::new(guard, Duration::ZERO).start();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(handle.is_running());
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_exit() {
        let source = Arc::new(StaticSource::new(&[]));
        let guard = guard_with(source, 10);

        let handle = guard.run();
        handle.shutdown().await;
    }
}
