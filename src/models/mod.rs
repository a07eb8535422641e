// src/models/mod.rs

//! Domain models for the offer watcher.

mod config;
mod offer;

pub use config::{
    BrowserSourceConfig, CacheConfig, CatalogSourceConfig, Config, DetailFieldSelector,
    ExtractorConfig, HttpConfig, NotifierConfig, SchedulerConfig, SourceConfig,
    StaticSourceConfig,
};
pub use offer::{NOT_AVAILABLE, Offer};
