//! Tick execution over the source registry.
//!
//! One tick fetches every registered source (bounded concurrency, failures
//! isolated per source), funnels all candidates through the dedup cache in
//! registration order, hands novel offers to the notifier, and persists the
//! cache snapshot once at the end. A tick-level mutex keeps scheduled and
//! manual runs from ever overlapping, which also keeps the cache under a
//! single writer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use crate::cache::DedupCache;
use crate::error::Result;
use crate::extract::SourceDescriptor;
use crate::models::{Config, Offer};
use crate::notify::Notifier;

/// Per-source counters for one tick.
#[derive(Debug, Default)]
pub struct SourceOutcome {
    pub key: String,
    pub fetched: usize,
    pub new_offers: usize,
    pub duplicates: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    pub error: Option<String>,
}

impl SourceOutcome {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Self::default()
        }
    }
}

/// Counters for one whole tick.
#[derive(Debug, Default)]
pub struct TickSummary {
    pub sources: Vec<SourceOutcome>,
}

impl TickSummary {
    /// Total novel offers recorded this tick.
    pub fn new_offers(&self) -> usize {
        self.sources.iter().map(|s| s.new_offers).sum()
    }

    /// Total duplicates skipped this tick.
    pub fn duplicates(&self) -> usize {
        self.sources.iter().map(|s| s.duplicates).sum()
    }

    /// Total offers handed to the notifier successfully.
    pub fn delivered(&self) -> usize {
        self.sources.iter().map(|s| s.delivered).sum()
    }

    /// Sources whose fetch failed outright.
    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }
}

/// Runs the registered sources and owns the dedup cache.
pub struct Orchestrator {
    sources: Vec<SourceDescriptor>,
    cache: Mutex<DedupCache>,
    notifier: Arc<dyn Notifier>,
    max_concurrent: usize,
    message_delay: Duration,
    tick_lock: Mutex<()>,
}

impl Orchestrator {
    /// Assemble the orchestrator from its parts.
    pub fn new(
        sources: Vec<SourceDescriptor>,
        cache: DedupCache,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            sources,
            cache: Mutex::new(cache),
            notifier,
            max_concurrent: config.scheduler.max_concurrent.max(1),
            message_delay: Duration::from_millis(config.notifier.message_delay_ms),
            tick_lock: Mutex::new(()),
        }
    }

    /// Run one tick across all registered sources.
    ///
    /// Callable from the scheduler and from manual triggers alike; the tick
    /// lock serializes both without touching the scheduler's timing baseline.
    pub async fn run_tick(&self) -> TickSummary {
        let _guard = self.tick_lock.lock().await;
        log::info!("Run started across {} sources", self.sources.len());

        let fetched = self.fetch_all().await;

        let mut summary = TickSummary::default();
        let mut cache = self.cache.lock().await;

        for (source, result) in self.sources.iter().zip(fetched) {
            let mut outcome = SourceOutcome::new(&source.key);

            match result {
                Err(error) => {
                    log::warn!("Fetch failed for {} ({}): {}", source.name, source.key, error);
                    outcome.error = Some(error.to_string());
                }
                Ok(offers) => {
                    outcome.fetched = offers.len();
                    for offer in offers {
                        self.process_offer(&mut cache, source, offer, &mut outcome)
                            .await;
                    }
                    cache.mark_run_completed(&source.key, Utc::now());
                    log::info!(
                        "{}: {} new offers, {} duplicates skipped",
                        source.key,
                        outcome.new_offers,
                        outcome.duplicates
                    );
                }
            }

            summary.sources.push(outcome);
        }

        if let Err(e) = cache.persist().await {
            log::warn!("Cache persist failed: {}", e);
        }
        drop(cache);

        log::info!(
            "Run complete: {} new, {} duplicates, {} delivered, {} failed sources",
            summary.new_offers(),
            summary.duplicates(),
            summary.delivered(),
            summary.failed_sources()
        );
        summary
    }

    /// Fetch every source with bounded concurrency, results in registration
    /// order. One source's failure never blocks or skips the others.
    async fn fetch_all(&self) -> Vec<Result<Vec<Offer>>> {
        let mut fetched: Vec<Option<Result<Vec<Offer>>>> = Vec::new();
        fetched.resize_with(self.sources.len(), || None);

        let mut fetch_stream = stream::iter(self.sources.iter().enumerate())
            .map(|(index, source)| async move { (index, source.extractor.fetch().await) })
            .buffer_unordered(self.max_concurrent)
            .boxed();

        while let Some((index, result)) = fetch_stream.next().await {
            fetched[index] = Some(result);
        }
        drop(fetch_stream);

        fetched
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Ok(Vec::new())))
            .collect()
    }

    /// Dedup decision and delivery for one candidate.
    ///
    /// Hashing happens here and nowhere else. An offer that fails delivery
    /// stays recorded: discovery is at-least-once, delivery best-effort.
    async fn process_offer(
        &self,
        cache: &mut DedupCache,
        source: &SourceDescriptor,
        offer: Offer,
        outcome: &mut SourceOutcome,
    ) {
        let hash = DedupCache::compute_hash(&offer.title, &source.key);
        if cache.is_known(&source.key, &hash) {
            outcome.duplicates += 1;
            return;
        }

        cache.record(&source.key, &hash);
        outcome.new_offers += 1;

        match self.notifier.deliver(&offer).await {
            Ok(()) => outcome.delivered += 1,
            Err(e) => {
                outcome.delivery_failures += 1;
                log::warn!("Delivery failed for {} ({}): {}", offer.title, source.key, e);
            }
        }

        if !self.message_delay.is_zero() {
            tokio::time::sleep(self.message_delay).await;
        }
    }
}
