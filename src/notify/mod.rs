// src/notify/mod.rs

//! Delivery channel boundary.
//!
//! The pipeline hands validated novel offers to a [`Notifier`] and otherwise
//! knows nothing about rendering or transport. Delivery failures are reported
//! as errors for the orchestrator to log; they never roll back the dedup
//! decision that preceded them.

pub mod discord;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Offer;

// Re-export for convenience
pub use discord::DiscordNotifier;

/// Trait for delivery channel backends.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one new-offer event.
    async fn deliver(&self, offer: &Offer) -> Result<()>;
}
