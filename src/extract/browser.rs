//! Browser automation extractor.
//!
//! Drives a WebDriver session for sources that only render their offers
//! through script execution. The session walk: dismiss the cookie banner
//! (best-effort), narrow to the offer section, scroll until the page stops
//! growing, collect and filter offer links, then visit a bounded number of
//! detail pages. The session is closed on every exit path, including errors
//! mid-run.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};
use regex::Regex;

use crate::error::{AppError, Result};
use crate::extract::Extractor;
use crate::models::{BrowserSourceConfig, NOT_AVAILABLE, Offer};

const LAUNCHER_PATTERN: &str = r"(?i)\bon\b\s+(.+?)(\.|$)";

/// A candidate link collected from the offer section.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OfferLink {
    url: String,
    image: String,
}

/// Extractor for script-rendered pages, driven through WebDriver.
pub struct BrowserExtractor {
    source_key: String,
    config: BrowserSourceConfig,
    launcher_pattern: Regex,
}

impl BrowserExtractor {
    /// Create a new browser extractor.
    pub fn new(source_key: String, config: BrowserSourceConfig) -> Self {
        Self {
            source_key,
            config,
            launcher_pattern: Regex::new(LAUNCHER_PATTERN).expect("valid launcher pattern"),
        }
    }

    fn automation_err(&self, context: &str, error: impl fmt::Display) -> AppError {
        AppError::automation(&self.source_key, format!("{}: {}", context, error))
    }

    /// Open a fresh headless session against the configured WebDriver.
    async fn connect(&self) -> Result<Client> {
        let mut capabilities = serde_json::Map::new();
        capabilities.insert(
            "goog:chromeOptions".to_string(),
            serde_json::json!({
                "args": [
                    "--headless=new",
                    "--no-sandbox",
                    "--disable-dev-shm-usage",
                    "--disable-gpu",
                    "--window-size=1920,1080",
                ]
            }),
        );

        let mut builder =
            ClientBuilder::rustls().map_err(|e| self.automation_err("tls setup", e))?;
        builder.capabilities(capabilities);
        builder
            .connect(&self.config.webdriver_url)
            .await
            .map_err(|e| self.automation_err("webdriver connect", e))
    }

    /// The whole session walk; the caller owns session teardown.
    async fn drive(&self, client: &Client) -> Result<Vec<Offer>> {
        client
            .goto(&self.config.page_url)
            .await
            .map_err(|e| self.automation_err("open landing page", e))?;

        self.click_if_present(client, self.config.cookie_banner_selector.as_deref(), "cookie banner")
            .await;
        self.click_if_present(
            client,
            self.config.section_filter_selector.as_deref(),
            "section filter",
        )
        .await;

        let wait = Duration::from_secs(self.config.wait_timeout_secs);
        client
            .wait()
            .at_most(wait)
            .for_element(Locator::Css(&self.config.offer_section_selector))
            .await
            .map_err(|e| self.automation_err("offer section wait", e))?;

        self.scroll_to_end(client).await?;

        let links = filter_offer_links(
            self.collect_offer_links(client).await?,
            &self.config.link_patterns,
        );
        log::info!(
            "{}: {} offer links after filtering",
            self.source_key,
            links.len()
        );

        let mut offers = Vec::new();
        for link in links.into_iter().take(self.config.max_items) {
            match self.extract_detail(client, &link).await {
                Ok(Some(offer)) => {
                    log::debug!("{}: extracted {}", self.source_key, offer.title);
                    offers.push(offer);
                }
                Ok(None) => {
                    log::debug!("{}: no usable title at {}", self.source_key, link.url);
                }
                Err(e) => {
                    log::warn!("{}: detail page {} failed: {}", self.source_key, link.url, e);
                }
            }
        }

        Ok(offers)
    }

    /// Best-effort click on an optional overlay element. Never fatal.
    async fn click_if_present(&self, client: &Client, selector: Option<&str>, what: &str) {
        let Some(selector) = selector else {
            return;
        };

        match client
            .wait()
            .at_most(Duration::from_secs(5))
            .for_element(Locator::Css(selector))
            .await
        {
            Ok(element) => match element.click().await {
                Ok(_) => log::debug!("{}: {} clicked", self.source_key, what),
                Err(e) => log::debug!("{}: {} click failed: {}", self.source_key, what, e),
            },
            Err(_) => log::debug!("{}: no {} found", self.source_key, what),
        }
    }

    /// Scroll down until the page stops growing, the bottom is reached, or
    /// the safety cap is hit.
    async fn scroll_to_end(&self, client: &Client) -> Result<()> {
        let pause = Duration::from_millis(self.config.scroll_pause_ms);
        let mut last_position = -1.0_f64;

        for iteration in 0..self.config.max_scroll_iterations {
            client
                .execute(
                    "window.scrollBy(0, arguments[0]);",
                    vec![self.config.scroll_step_px.into()],
                )
                .await
                .map_err(|e| self.automation_err("scroll", e))?;
            tokio::time::sleep(pause).await;

            let metrics = client
                .execute(
                    "return [window.scrollY, window.innerHeight, document.body.scrollHeight];",
                    Vec::new(),
                )
                .await
                .map_err(|e| self.automation_err("scroll metrics", e))?;
            let (position, viewport, height) = scroll_metrics(&metrics);

            if position <= last_position {
                log::debug!("{}: scroll no longer advancing", self.source_key);
                break;
            }
            if position + viewport >= height {
                log::debug!("{}: reached end of page", self.source_key);
                break;
            }
            last_position = position;

            if iteration + 1 == self.config.max_scroll_iterations {
                log::warn!("{}: scroll iteration cap reached", self.source_key);
            }
        }

        Ok(())
    }

    /// Collect anchor links (and cover images where present) from the offer
    /// section.
    async fn collect_offer_links(&self, client: &Client) -> Result<Vec<OfferLink>> {
        let selector = format!("{} a", self.config.offer_section_selector);
        let anchors = client
            .find_all(Locator::Css(&selector))
            .await
            .map_err(|e| self.automation_err("collect offer links", e))?;

        let mut links = Vec::new();
        for anchor in anchors {
            let Ok(Some(url)) = anchor.attr("href").await else {
                continue;
            };
            if url.is_empty() {
                continue;
            }

            let image = match anchor.find(Locator::Css("figure picture img")).await {
                Ok(img) => img.attr("src").await.ok().flatten().unwrap_or_default(),
                Err(_) => String::new(),
            };

            links.push(OfferLink { url, image });
        }

        Ok(links)
    }

    /// Visit one detail page and assemble an offer from it.
    ///
    /// Every field except the title degrades to the sentinel on its own; a
    /// sentinel or blank title rejects the candidate.
    async fn extract_detail(&self, client: &Client, link: &OfferLink) -> Result<Option<Offer>> {
        client
            .goto(&link.url)
            .await
            .map_err(|e| self.automation_err("open detail page", e))?;
        client
            .wait()
            .at_most(Duration::from_secs(self.config.wait_timeout_secs))
            .for_element(Locator::Css(&self.config.title_selector))
            .await
            .map_err(|e| self.automation_err("detail page wait", e))?;

        let title = self.field_text(client, &self.config.title_selector).await;
        if title == NOT_AVAILABLE {
            return Ok(None);
        }
        let Some(mut offer) = Offer::new(&title, &self.source_key) else {
            return Ok(None);
        };
        offer = offer.with_url(link.url.clone()).with_image_url(link.image.clone());

        if let Some(selector) = &self.config.launcher_text_selector {
            let text = self.field_text(client, selector).await;
            offer = offer.with_attribute("Launcher", self.extract_launcher(&text));
        }

        for field in &self.config.detail_fields {
            let value = self.field_text(client, &field.selector).await;
            offer = offer.with_attribute(field.label.clone(), value);
        }

        Ok(Some(offer))
    }

    /// Text of the first element matching the selector, or the sentinel.
    async fn field_text(&self, client: &Client, selector: &str) -> String {
        match client.find(Locator::Css(selector)).await {
            Ok(element) => match element.text().await {
                Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => NOT_AVAILABLE.to_string(),
            },
            Err(_) => NOT_AVAILABLE.to_string(),
        }
    }

    /// Pull the launcher name out of a description paragraph, e.g.
    /// "Claim it on Epic Games Store." yields "Epic Games Store".
    fn extract_launcher(&self, text: &str) -> String {
        self.launcher_pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().trim_end_matches('.').to_string())
            .filter(|launcher| !launcher.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

#[async_trait]
impl Extractor for BrowserExtractor {
    async fn fetch(&self) -> Result<Vec<Offer>> {
        let client = self.connect().await?;
        let outcome = self.drive(&client).await;

        // Teardown runs on every path, success or failure.
        if let Err(e) = client.close().await {
            log::warn!("{}: browser session close failed: {}", self.source_key, e);
        }

        outcome
    }
}

/// Keep only offer-like links, deduplicated by URL in discovery order.
fn filter_offer_links(links: Vec<OfferLink>, patterns: &[String]) -> Vec<OfferLink> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|link| {
            patterns.iter().any(|p| link.url.contains(p.as_str())) && seen.insert(link.url.clone())
        })
        .collect()
}

fn scroll_metrics(value: &serde_json::Value) -> (f64, f64, f64) {
    let get = |i: usize| value.get(i).and_then(serde_json::Value::as_f64).unwrap_or(0.0);
    (get(0), get(1), get(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BrowserSourceConfig;

    fn extractor() -> BrowserExtractor {
        let toml = r##"
            page_url = "https://example.com/home"
            offer_section_selector = "#offers"
            title_selector = "h1"
        "##;
        let config: BrowserSourceConfig = toml::from_str(toml).unwrap();
        BrowserExtractor::new("prime_gaming".to_string(), config)
    }

    fn link(url: &str) -> OfferLink {
        OfferLink {
            url: url.to_string(),
            image: String::new(),
        }
    }

    #[test]
    fn test_extract_launcher() {
        let ex = extractor();
        assert_eq!(
            ex.extract_launcher("Claim it on Epic Games Store."),
            "Epic Games Store"
        );
        assert_eq!(ex.extract_launcher("Available ON Amazon Games"), "Amazon Games");
        assert_eq!(ex.extract_launcher("No launcher mentioned"), NOT_AVAILABLE);
        assert_eq!(ex.extract_launcher(""), NOT_AVAILABLE);
    }

    #[test]
    fn test_filter_offer_links_keeps_offer_like_urls() {
        let patterns = vec!["/offer/".to_string(), "/dp/".to_string(), "/product/".to_string()];
        let links = vec![
            link("https://example.com/offer/alpha"),
            link("https://example.com/help"),
            link("https://example.com/dp/beta"),
            link("https://example.com/product/gamma"),
        ];

        let filtered = filter_offer_links(links, &patterns);
        assert_eq!(filtered.len(), 3);
        assert_eq!(filtered[0].url, "https://example.com/offer/alpha");
    }

    #[test]
    fn test_filter_offer_links_dedupes_by_url() {
        let patterns = vec!["/offer/".to_string()];
        let links = vec![
            link("https://example.com/offer/alpha"),
            link("https://example.com/offer/alpha"),
            link("https://example.com/offer/beta"),
        ];

        let filtered = filter_offer_links(links, &patterns);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_scroll_metrics_tolerates_bad_payload() {
        let value = serde_json::json!([120.0, 800.0, 4000.0]);
        assert_eq!(scroll_metrics(&value), (120.0, 800.0, 4000.0));

        let broken = serde_json::json!("nope");
        assert_eq!(scroll_metrics(&broken), (0.0, 0.0, 0.0));
    }
}
