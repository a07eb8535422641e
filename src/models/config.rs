//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
///
/// Loaded once at startup and treated as immutable afterwards; every
/// component receives the slice of configuration it needs at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Scheduling behavior
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Dedup cache snapshot settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// HTTP client settings shared by the page and API extractors
    #[serde(default)]
    pub http: HttpConfig,

    /// Delivery channel settings
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Watched sources
    #[serde(default = "defaults::default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.interval_secs == 0 {
            return Err(AppError::validation("scheduler.interval_secs must be > 0"));
        }
        if self.scheduler.max_concurrent == 0 {
            return Err(AppError::validation("scheduler.max_concurrent must be > 0"));
        }
        if self.cache.retention == 0 {
            return Err(AppError::validation("cache.retention must be > 0"));
        }
        if self.cache.file.trim().is_empty() {
            return Err(AppError::validation("cache.file is empty"));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.sources.is_empty() {
            return Err(AppError::validation("No sources defined"));
        }

        let mut seen_keys = std::collections::HashSet::new();
        for source in &self.sources {
            if source.key.trim().is_empty() {
                return Err(AppError::validation("Source with empty key"));
            }
            if !seen_keys.insert(source.key.as_str()) {
                return Err(AppError::validation(format!(
                    "Duplicate source key: {}",
                    source.key
                )));
            }
            if source.enabled && source.webhook.is_none() && self.notifier.webhook_url.is_empty() {
                return Err(AppError::validation(format!(
                    "Source {} has no webhook and notifier.webhook_url is empty",
                    source.key
                )));
            }
        }
        Ok(())
    }

    /// Sources that are enabled, in registration order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            cache: CacheConfig::default(),
            http: HttpConfig::default(),
            notifier: NotifierConfig::default(),
            sources: defaults::default_sources(),
        }
    }
}

/// Scheduling loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between two scheduled runs
    #[serde(default = "defaults::interval_secs")]
    pub interval_secs: u64,

    /// Maximum sources fetched concurrently within one run
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval_secs(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Dedup cache snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Snapshot file path
    #[serde(default = "defaults::cache_file")]
    pub file: String,

    /// Maximum remembered hashes per source
    #[serde(default = "defaults::retention")]
    pub retention: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            file: defaults::cache_file(),
            retention: defaults::retention(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Delivery channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Default webhook URL (sources may override it per channel)
    #[serde(default)]
    pub webhook_url: String,

    /// Pause between two deliveries in milliseconds
    #[serde(default = "defaults::message_delay")]
    pub message_delay_ms: u64,

    /// Webhook request timeout in seconds
    #[serde(default = "defaults::webhook_timeout")]
    pub timeout_secs: u64,

    /// Attempts per delivery before giving up
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u8,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            message_delay_ms: defaults::message_delay(),
            timeout_secs: defaults::webhook_timeout(),
            max_retries: defaults::max_retries(),
        }
    }
}

/// One watched source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable source identifier (cache bucket and hash input)
    pub key: String,

    /// Human-readable source name
    pub name: String,

    /// Whether the source is scraped at all
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Per-source webhook override
    #[serde(default)]
    pub webhook: Option<String>,

    /// Extraction strategy and its settings
    pub extractor: ExtractorConfig,
}

/// Extraction strategy, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorConfig {
    /// Single static page parsed with CSS selectors
    StaticPage(StaticSourceConfig),

    /// Two-phase catalog API (id list, then detail batches)
    CatalogApi(CatalogSourceConfig),

    /// Script-rendered page driven through WebDriver
    Browser(BrowserSourceConfig),
}

/// Settings for a static page source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticSourceConfig {
    /// Page to fetch
    pub page_url: String,

    /// CSS selector matching one offer entry
    pub entry_selector: String,

    /// Title selectors, tried in order within each entry
    pub title_selectors: Vec<String>,

    /// Image selector within an entry
    #[serde(default = "defaults::image_selector")]
    pub image_selector: String,

    /// Optional link selector within an entry; when absent, the page URL is
    /// used as the offer URL
    #[serde(default)]
    pub link_selector: Option<String>,

    /// HTML attribute holding the link target
    #[serde(default = "defaults::link_attr")]
    pub link_attr: String,

    /// Maximum entries processed per run
    #[serde(default = "defaults::max_items")]
    pub max_items: usize,
}

/// Settings for a paginated catalog API source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSourceConfig {
    /// Endpoint returning the offer id list
    pub ids_url: String,

    /// Endpoint resolving offer details by id batch
    pub details_url: String,

    /// API key sent with the id list request
    #[serde(default)]
    pub api_key: String,

    /// Market passed to the details endpoint
    #[serde(default = "defaults::market")]
    pub market: String,

    /// Language passed to the details endpoint
    #[serde(default = "defaults::language")]
    pub language: String,

    /// Ids resolved per details request
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Pause between detail batches in milliseconds
    #[serde(default = "defaults::batch_delay")]
    pub batch_delay_ms: u64,

    /// Prefix joined with the product id to form the offer URL
    #[serde(default = "defaults::product_url_prefix")]
    pub product_url_prefix: String,
}

/// Settings for a browser-automation source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSourceConfig {
    /// WebDriver endpoint to connect to
    #[serde(default = "defaults::webdriver_url")]
    pub webdriver_url: String,

    /// Landing page to open
    pub page_url: String,

    /// Cookie banner dismiss button; dismissal is best-effort
    #[serde(default)]
    pub cookie_banner_selector: Option<String>,

    /// Filter button narrowing the page to the offer section; best-effort
    #[serde(default)]
    pub section_filter_selector: Option<String>,

    /// Section that must be present before link collection starts
    pub offer_section_selector: String,

    /// URL substrings identifying real offer links
    #[serde(default = "defaults::link_patterns")]
    pub link_patterns: Vec<String>,

    /// Title selector on the detail page (also the detail-load wait target)
    pub title_selector: String,

    /// Text paragraph the launcher name is extracted from
    #[serde(default)]
    pub launcher_text_selector: Option<String>,

    /// Labeled detail fields extracted into offer attributes
    #[serde(default)]
    pub detail_fields: Vec<DetailFieldSelector>,

    /// Element wait timeout in seconds
    #[serde(default = "defaults::wait_timeout")]
    pub wait_timeout_secs: u64,

    /// Pause between scroll steps in milliseconds
    #[serde(default = "defaults::scroll_pause")]
    pub scroll_pause_ms: u64,

    /// Pixels scrolled per step
    #[serde(default = "defaults::scroll_step")]
    pub scroll_step_px: u64,

    /// Safety cap on scroll iterations
    #[serde(default = "defaults::max_scroll_iterations")]
    pub max_scroll_iterations: usize,

    /// Maximum detail pages visited per run
    #[serde(default = "defaults::max_items")]
    pub max_items: usize,
}

/// A labeled selector for one detail-page field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailFieldSelector {
    /// Attribute label, e.g. "Genre"
    pub label: String,

    /// CSS selector for the field text
    pub selector: String,
}

mod defaults {
    use super::{
        BrowserSourceConfig, CatalogSourceConfig, DetailFieldSelector, ExtractorConfig,
        SourceConfig, StaticSourceConfig,
    };

    // Scheduler defaults
    pub fn interval_secs() -> u64 {
        3600
    }
    pub fn max_concurrent() -> usize {
        3
    }

    // Cache defaults
    pub fn cache_file() -> String {
        "offers_cache.json".into()
    }
    pub fn retention() -> usize {
        100
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; offerwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Notifier defaults
    pub fn message_delay() -> u64 {
        1000
    }
    pub fn webhook_timeout() -> u64 {
        5
    }
    pub fn max_retries() -> u8 {
        3
    }

    // Source defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn image_selector() -> String {
        "img".into()
    }
    pub fn link_attr() -> String {
        "href".into()
    }
    pub fn max_items() -> usize {
        10
    }
    pub fn market() -> String {
        "US".into()
    }
    pub fn language() -> String {
        "en-US".into()
    }
    pub fn batch_size() -> usize {
        20
    }
    pub fn batch_delay() -> u64 {
        1000
    }
    pub fn product_url_prefix() -> String {
        "https://www.microsoft.com/en-us/p/".into()
    }
    pub fn webdriver_url() -> String {
        "http://localhost:4444".into()
    }
    pub fn link_patterns() -> Vec<String> {
        vec!["/offer/".into(), "/dp/".into(), "/product/".into()]
    }
    pub fn wait_timeout() -> u64 {
        20
    }
    pub fn scroll_pause() -> u64 {
        700
    }
    pub fn scroll_step() -> u64 {
        300
    }
    pub fn max_scroll_iterations() -> usize {
        40
    }

    pub fn default_sources() -> Vec<SourceConfig> {
        vec![
            SourceConfig {
                key: "prime_gaming".to_string(),
                name: "Prime Gaming".to_string(),
                enabled: enabled(),
                webhook: None,
                extractor: ExtractorConfig::Browser(BrowserSourceConfig {
                    webdriver_url: webdriver_url(),
                    page_url: "https://gaming.amazon.com/home".to_string(),
                    cookie_banner_selector: Some(
                        "div.tw-justify-content-end.tw-pd-x-1 button".to_string(),
                    ),
                    section_filter_selector: Some(
                        "#SearchBar div.offer-filters div:nth-child(2) > button".to_string(),
                    ),
                    offer_section_selector: "#offer-section-FGWP_FULL".to_string(),
                    link_patterns: link_patterns(),
                    title_selector:
                        "div.detail-page-base__buy-box div.buy-box-item-information h1".to_string(),
                    launcher_text_selector: Some(
                        "div.tw-border-radius-medium div.tw-lg-mg-t-3.tw-mg-t-2 p".to_string(),
                    ),
                    detail_fields: vec![
                        DetailFieldSelector {
                            label: "Genre".to_string(),
                            selector: "div.about-the-game__grid > div:nth-child(1) > div:nth-child(2) > p"
                                .to_string(),
                        },
                        DetailFieldSelector {
                            label: "Modes".to_string(),
                            selector: "div.about-the-game__grid > div:nth-child(2) > div:nth-child(2) > p"
                                .to_string(),
                        },
                        DetailFieldSelector {
                            label: "Platform".to_string(),
                            selector: "div.about-the-game__grid > div:nth-child(3) > div:nth-child(2) > p"
                                .to_string(),
                        },
                        DetailFieldSelector {
                            label: "Expires".to_string(),
                            selector: "div.availability-callout span.tw-bold".to_string(),
                        },
                    ],
                    wait_timeout_secs: wait_timeout(),
                    scroll_pause_ms: scroll_pause(),
                    scroll_step_px: scroll_step(),
                    max_scroll_iterations: max_scroll_iterations(),
                    max_items: max_items(),
                }),
            },
            SourceConfig {
                key: "xbox_gamepass".to_string(),
                name: "Xbox Game Pass".to_string(),
                enabled: enabled(),
                webhook: None,
                extractor: ExtractorConfig::CatalogApi(CatalogSourceConfig {
                    ids_url: "https://xbl.io/api/v2/gamepass-games".to_string(),
                    details_url: "https://displaycatalog.mp.microsoft.com/v7.0/products"
                        .to_string(),
                    api_key: String::new(),
                    market: market(),
                    language: language(),
                    batch_size: batch_size(),
                    batch_delay_ms: batch_delay(),
                    product_url_prefix: product_url_prefix(),
                }),
            },
            SourceConfig {
                key: "ps_plus".to_string(),
                name: "PlayStation Plus".to_string(),
                enabled: enabled(),
                webhook: None,
                extractor: ExtractorConfig::StaticPage(StaticSourceConfig {
                    page_url: "https://www.playstation.com/en-us/ps-plus/".to_string(),
                    entry_selector: "[data-testid=\"game-card\"], .game-item, .product-item"
                        .to_string(),
                    title_selectors: vec![
                        "[data-testid=\"game-title\"]".to_string(),
                        ".game-title".to_string(),
                        ".product-title".to_string(),
                        "h3".to_string(),
                    ],
                    image_selector: image_selector(),
                    link_selector: None,
                    link_attr: link_attr(),
                    max_items: max_items(),
                }),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_webhook() -> Config {
        let mut config = Config::default();
        config.notifier.webhook_url = "https://discord.com/api/webhooks/1/x".to_string();
        config
    }

    #[test]
    fn validate_default_config_with_webhook_ok() {
        assert!(config_with_webhook().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_webhook() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = config_with_webhook();
        config.scheduler.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_keys() {
        let mut config = config_with_webhook();
        let clone = config.sources[0].clone();
        config.sources.push(clone);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_per_source_webhook() {
        let mut config = Config::default();
        for source in &mut config.sources {
            source.webhook = Some("https://discord.com/api/webhooks/2/y".to_string());
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_sources_cover_three_strategies() {
        let config = Config::default();
        assert_eq!(config.sources.len(), 3);
        assert!(matches!(
            config.sources[0].extractor,
            ExtractorConfig::Browser(_)
        ));
        assert!(matches!(
            config.sources[1].extractor,
            ExtractorConfig::CatalogApi(_)
        ));
        assert!(matches!(
            config.sources[2].extractor,
            ExtractorConfig::StaticPage(_)
        ));
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
            [notifier]
            webhook_url = "https://discord.com/api/webhooks/1/x"

            [[sources]]
            key = "demo"
            name = "Demo"

            [sources.extractor]
            kind = "static_page"
            page_url = "https://example.com/offers"
            entry_selector = ".offer"
            title_selectors = ["h3"]
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.scheduler.interval_secs, 3600);
        assert!(config.validate().is_ok());

        match &config.sources[0].extractor {
            ExtractorConfig::StaticPage(s) => {
                assert_eq!(s.max_items, 10);
                assert_eq!(s.image_selector, "img");
            }
            other => panic!("unexpected extractor kind: {:?}", other),
        }
    }
}
