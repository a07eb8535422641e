//! Static page extractor.
//!
//! One HTTP GET and a CSS-selector walk over the returned markup. Suitable
//! for sources that render their offer grid server-side.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::extract::{Extractor, resolve_url};
use crate::models::{HttpConfig, Offer, StaticSourceConfig};

/// Extractor for a single server-rendered page.
pub struct StaticPageExtractor {
    source_key: String,
    config: StaticSourceConfig,
    client: Client,
}

impl StaticPageExtractor {
    /// Create a new static page extractor with its own HTTP client.
    pub fn new(source_key: String, config: StaticSourceConfig, http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&http.user_agent)
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()?;

        Ok(Self {
            source_key,
            config,
            client,
        })
    }

    /// Parse offer candidates out of a fetched document.
    ///
    /// At most `max_items` entries are considered. Entries without any title
    /// match are skipped; a missing image or link degrades to the page-level
    /// fallback instead of dropping the entry.
    fn parse_offers(&self, html: &str) -> Result<Vec<Offer>> {
        let document = Html::parse_document(html);

        let entry_sel = Self::parse_selector(&self.config.entry_selector)?;
        let title_sels = self
            .config
            .title_selectors
            .iter()
            .map(|s| Self::parse_selector(s))
            .collect::<Result<Vec<_>>>()?;
        let image_sel = Self::parse_selector(&self.config.image_selector)?;
        let link_sel = self
            .config
            .link_selector
            .as_ref()
            .map(|s| Self::parse_selector(s))
            .transpose()?;

        let base_url = Url::parse(&self.config.page_url)?;
        let mut offers = Vec::new();

        for entry in document.select(&entry_sel).take(self.config.max_items) {
            let Some(title_elem) = title_sels.iter().find_map(|sel| entry.select(sel).next())
            else {
                continue;
            };

            let raw_title: String = title_elem.text().collect();
            let Some(offer) = Offer::new(&raw_title, &self.source_key) else {
                continue;
            };

            let url = link_sel
                .as_ref()
                .and_then(|sel| entry.select(sel).next())
                .and_then(|el| el.value().attr(self.config.link_attr.as_str()))
                .map(|href| resolve_url(&base_url, href))
                .unwrap_or_else(|| self.config.page_url.clone());

            let image_url = entry
                .select(&image_sel)
                .next()
                .and_then(|el| el.value().attr("src"))
                .map(|src| resolve_url(&base_url, src))
                .unwrap_or_default();

            offers.push(offer.with_url(url).with_image_url(image_url));
        }

        Ok(offers)
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }
}

#[async_trait]
impl Extractor for StaticPageExtractor {
    async fn fetch(&self) -> Result<Vec<Offer>> {
        let response = self
            .client
            .get(&self.config.page_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::fetch(&self.source_key, e))?;
        let html = response
            .text()
            .await
            .map_err(|e| AppError::fetch(&self.source_key, e))?;

        self.parse_offers(&html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(max_items: usize) -> StaticPageExtractor {
        StaticPageExtractor::new(
            "test_source".to_string(),
            StaticSourceConfig {
                page_url: "https://example.com/offers".to_string(),
                entry_selector: ".game-card".to_string(),
                title_selectors: vec![".game-title".to_string(), "h3".to_string()],
                image_selector: "img".to_string(),
                link_selector: Some("a".to_string()),
                link_attr: "href".to_string(),
                max_items,
            },
            &HttpConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_offers_extracts_fields() {
        let html = r#"
            <div class="game-card">
                <a href="/games/alpha"><h3>Alpha</h3></a>
                <img src="/img/alpha.png">
            </div>
            <div class="game-card">
                <span class="game-title">Beta</span>
            </div>
        "#;

        let offers = extractor(10).parse_offers(html).unwrap();
        assert_eq!(offers.len(), 2);

        assert_eq!(offers[0].title, "Alpha");
        assert_eq!(offers[0].source_key, "test_source");
        assert_eq!(offers[0].url, "https://example.com/games/alpha");
        assert_eq!(offers[0].image_url, "https://example.com/img/alpha.png");

        // No link or image: page URL fallback, empty image.
        assert_eq!(offers[1].title, "Beta");
        assert_eq!(offers[1].url, "https://example.com/offers");
        assert!(offers[1].image_url.is_empty());
    }

    #[test]
    fn test_parse_offers_skips_titleless_and_blank_entries() {
        let html = r#"
            <div class="game-card"><img src="/img/x.png"></div>
            <div class="game-card"><h3>   </h3></div>
            <div class="game-card"><h3>Gamma</h3></div>
        "#;

        let offers = extractor(10).parse_offers(html).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].title, "Gamma");
    }

    #[test]
    fn test_parse_offers_respects_entry_cap() {
        let html: String = (0..20)
            .map(|i| format!("<div class=\"game-card\"><h3>Game {}</h3></div>", i))
            .collect();

        let offers = extractor(10).parse_offers(&html).unwrap();
        assert_eq!(offers.len(), 10);
        assert_eq!(offers[0].title, "Game 0");
        assert_eq!(offers[9].title, "Game 9");
    }

    #[test]
    fn test_parse_offers_title_selector_fallback_order() {
        let html = r#"
            <div class="game-card">
                <span class="game-title">Preferred</span>
                <h3>Fallback</h3>
            </div>
        "#;

        let offers = extractor(10).parse_offers(html).unwrap();
        assert_eq!(offers[0].title, "Preferred");
    }

    #[test]
    fn test_invalid_selector_is_reported() {
        let mut ex = extractor(10);
        ex.config.entry_selector = "[[invalid".to_string();
        assert!(ex.parse_offers("<div></div>").is_err());
    }
}
