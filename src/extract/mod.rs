// src/extract/mod.rs

//! Offer extraction.
//!
//! Each source plugs into the pipeline through the [`Extractor`] trait; the
//! orchestrator neither knows nor cares whether offers came from a static
//! page, a catalog API, or a scripted browser session. Extractors produce raw
//! candidates only — hashing and duplicate decisions happen centrally in
//! [`crate::cache::DedupCache`].

mod browser;
mod catalog;
mod static_page;

use async_trait::async_trait;
use url::Url;

use crate::error::Result;
use crate::models::{Config, ExtractorConfig, Offer};

pub use browser::BrowserExtractor;
pub use catalog::CatalogApiExtractor;
pub use static_page::StaticPageExtractor;

/// One fetch-and-parse strategy for a single source.
///
/// `fetch` reports every fetch-level failure (network, non-2xx, parse,
/// automation) as an error; it never panics and never touches shared state,
/// so one source's failure cannot disturb another's run.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetch the source and return its current offer candidates.
    async fn fetch(&self) -> Result<Vec<Offer>>;
}

/// Static registration record for one watched source.
///
/// The delivery channel binding stays in [`crate::models::SourceConfig`],
/// where the notifier reads it; the descriptor carries what the orchestrator
/// itself needs.
pub struct SourceDescriptor {
    /// Stable source identifier
    pub key: String,

    /// Human-readable source name
    pub name: String,

    /// The extraction strategy bound to this source
    pub extractor: Box<dyn Extractor>,
}

/// Build the source registry from configuration.
///
/// Disabled sources are skipped with a log line; the returned registry is
/// immutable for the process lifetime.
pub fn build_sources(config: &Config) -> Result<Vec<SourceDescriptor>> {
    let mut sources = Vec::new();

    for source in &config.sources {
        if !source.enabled {
            log::info!("Source {} is disabled, skipping", source.key);
            continue;
        }

        let extractor: Box<dyn Extractor> = match &source.extractor {
            ExtractorConfig::StaticPage(settings) => Box::new(StaticPageExtractor::new(
                source.key.clone(),
                settings.clone(),
                &config.http,
            )?),
            ExtractorConfig::CatalogApi(settings) => Box::new(CatalogApiExtractor::new(
                source.key.clone(),
                settings.clone(),
                &config.http,
            )?),
            ExtractorConfig::Browser(settings) => {
                Box::new(BrowserExtractor::new(source.key.clone(), settings.clone()))
            }
        };

        sources.push(SourceDescriptor {
            key: source.key.clone(),
            name: source.name.clone(),
            extractor,
        });
    }

    Ok(sources)
}

/// Resolve a potentially relative URL against a base URL.
pub(crate) fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}
