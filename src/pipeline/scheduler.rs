//! Fixed-interval scheduling loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::pipeline::Orchestrator;

/// Drive ticks at a fixed interval until shutdown is signalled.
///
/// The first tick runs immediately. The tick body is awaited inside the loop,
/// so ticks never overlap and a tick already in flight always runs to
/// completion before shutdown takes effect; a tick that overruns the interval
/// simply delays the next one.
pub async fn run_scheduler(
    orchestrator: Arc<Orchestrator>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                orchestrator.run_tick().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    log::info!("Shutdown requested, stopping scheduler");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DedupCache;
    use crate::error::Result;
    use crate::extract::{Extractor, SourceDescriptor};
    use crate::models::{Config, Offer};
    use crate::notify::Notifier;
    use crate::storage::JsonFileStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingExtractor {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Extractor for CountingExtractor {
        async fn fetch(&self) -> Result<Vec<Offer>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn deliver(&self, _offer: &Offer) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_scheduler_runs_first_tick_and_stops_on_shutdown() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(tmp.path().join("cache.json")));
        let cache = DedupCache::load(store, 100).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let sources = vec![SourceDescriptor {
            key: "a".to_string(),
            name: "A".to_string(),
            extractor: Box::new(CountingExtractor {
                calls: Arc::clone(&calls),
            }),
        }];

        let mut config = Config::default();
        config.notifier.message_delay_ms = 0;
        let orchestrator = Arc::new(Orchestrator::new(
            sources,
            cache,
            Arc::new(NullNotifier),
            &config,
        ));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_scheduler(orchestrator, 3600, rx));

        // The first tick fires immediately; give it a moment to run.
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
