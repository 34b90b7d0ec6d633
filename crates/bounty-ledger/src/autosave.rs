use crate::engine::RewardEngine;
use crate::storage::{PersistenceError, SaveReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic snapshot flush. Picks up any change whose immediate save failed.
pub struct Autosave {
    engine: Arc<RewardEngine>,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Autosave {
    pub fn spawn(engine: Arc<RewardEngine>, every: Duration) -> Self {
        let worker = Arc::clone(&engine);
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {}
                }
                // A save in flight runs to completion before the stop is seen.
                match worker.persist().await {
                    Ok(report) => debug!(
                        accounts = report.accounts,
                        duration_ms = report.duration.as_millis() as u64,
                        "💾 Autosave complete"
                    ),
                    Err(e) => error!(error = %e, "❌ Autosave failed"),
                }
            }
            debug!("Autosave loop stopped");
        });

        info!(interval_secs = every.as_secs(), "⏱️ Autosave started");
        Self {
            engine,
            stop,
            handle,
        }
    }

    /// Stops the loop, waits for it to finish, then performs a final save.
    pub async fn shutdown(self) -> Result<SaveReport, PersistenceError> {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Autosave loop ended abnormally");
        }

        let report = self.engine.persist().await?;
        info!(accounts = report.accounts, "💾 Final save complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::engine::DEFAULT_SAVE_TIMEOUT;
    use crate::state::LedgerState;
    use crate::storage::{LoadSource, MemoryStateStore, StateStore};
    use crate::types::{Amount, UserId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` saves, and tracks how many saves overlap.
    #[derive(Default)]
    struct TestStore {
        inner: MemoryStateStore,
        failures: AtomicUsize,
        save_delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl StateStore for TestStore {
        fn load_with_source(&self) -> (LedgerState, LoadSource) {
            self.inner.load_with_source()
        }

        fn save(&self, state: &LedgerState) -> Result<SaveReport, PersistenceError> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            std::thread::sleep(self.save_delay);

            let result = if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                Err(PersistenceError::Io(std::io::Error::other("disk full")))
            } else {
                self.inner.save(state)
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn describe(&self) -> String {
            "test".to_string()
        }
    }

    #[tokio::test]
    async fn test_autosave_recovers_failed_save() {
        let store = Arc::new(TestStore {
            failures: AtomicUsize::new(1),
            ..Default::default()
        });
        let engine = Arc::new(RewardEngine::open(
            LedgerConfig::default(),
            store.clone(),
            DEFAULT_SAVE_TIMEOUT,
        ));

        // The immediate save fails; the credit still stands in memory.
        engine.credit(UserId::new(4), 3.0).await.unwrap();
        assert!(!store.inner.has_snapshot());

        let autosave = Autosave::spawn(engine.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(
            store.inner.load().balances.get(UserId::new(4)),
            Amount::from_units(3)
        );

        autosave.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_performs_final_save() {
        let store = Arc::new(MemoryStateStore::new());
        let engine = Arc::new(RewardEngine::open(
            LedgerConfig::default(),
            store.clone(),
            DEFAULT_SAVE_TIMEOUT,
        ));
        let autosave = Autosave::spawn(engine.clone(), Duration::from_secs(3600));

        let report = autosave.shutdown().await.unwrap();
        assert_eq!(report.accounts, 0);
        assert!(store.has_snapshot());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_running_save() {
        let store = Arc::new(TestStore {
            save_delay: Duration::from_millis(150),
            ..Default::default()
        });
        let engine = Arc::new(RewardEngine::open(
            LedgerConfig::default(),
            store.clone(),
            DEFAULT_SAVE_TIMEOUT,
        ));

        let autosave = Autosave::spawn(engine.clone(), Duration::from_millis(20));
        // Lands while the first periodic save is still writing.
        tokio::time::sleep(Duration::from_millis(60)).await;
        autosave.shutdown().await.unwrap();

        assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(store.inner.has_snapshot());
    }
}
