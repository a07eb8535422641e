//! Paginated catalog API extractor.
//!
//! Two-phase fetch: one endpoint lists opaque offer ids, a second resolves
//! full details in fixed-size batches with a pause in between to respect the
//! remote rate limits. The detail payload is deeply nested and frequently
//! partial; every field falls back on its own, an absent price or platform
//! list never discards the item.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::extract::Extractor;
use crate::models::{CatalogSourceConfig, HttpConfig, Offer};

/// Extractor for an id-list + detail-batch catalog API.
pub struct CatalogApiExtractor {
    source_key: String,
    config: CatalogSourceConfig,
    client: Client,
}

impl CatalogApiExtractor {
    /// Create a new catalog extractor with its own HTTP client.
    pub fn new(source_key: String, config: CatalogSourceConfig, http: &HttpConfig) -> Result<Self> {
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

    /// Phase one: fetch the id list.
    async fn fetch_offer_ids(&self) -> Result<Vec<String>> {
        let mut request = self
            .client
            .get(&self.config.ids_url)
            .header("Accept", "application/json");
        if !self.config.api_key.is_empty() {
            request = request.header("X-Authorization", &self.config.api_key);
        }

        let entries: Vec<IdEntry> = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::fetch(&self.source_key, e))?
            .json()
            .await
            .map_err(|e| AppError::fetch(&self.source_key, e))?;
        Ok(entries.into_iter().filter_map(|e| e.id).collect())
    }

    /// Phase two: resolve one batch of ids to offers.
    async fn fetch_details(&self, ids: &[String]) -> Result<Vec<Offer>> {
        let page: CatalogPage = self
            .client
            .get(&self.config.details_url)
            .query(&[
                ("bigIds", ids.join(",").as_str()),
                ("market", self.config.market.as_str()),
                ("languages", self.config.language.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::fetch(&self.source_key, e))?
            .json()
            .await
            .map_err(|e| AppError::fetch(&self.source_key, e))?;

        Ok(page
            .products
            .iter()
            .filter_map(|p| self.product_to_offer(p))
            .collect())
    }

    /// Map one product payload to an offer, field by field.
    ///
    /// Only a missing title rejects the product; every other field is
    /// optional and simply absent from the attributes when unavailable.
    fn product_to_offer(&self, product: &Product) -> Option<Offer> {
        let props = product.localized_properties.first()?;
        let mut offer = Offer::new(&props.product_title, &self.source_key)?
            .with_url(format!(
                "{}{}",
                self.config.product_url_prefix, product.product_id
            ))
            .with_image_url(
                props
                    .images
                    .iter()
                    .find(|img| img.image_purpose == "Poster")
                    .or_else(|| props.images.first())
                    .map(|img| img.uri.clone())
                    .unwrap_or_default(),
            )
            .with_attribute("Description", props.short_description.clone())
            .with_attribute("Genre", product.properties.categories.join(", "));

        for attribute in &product.properties.attributes {
            match (attribute.name.as_str(), &attribute.value) {
                ("Publisher", Some(value)) => {
                    offer = offer.with_attribute("Publisher", value.clone());
                }
                ("ContentRating", Some(value)) => {
                    offer = offer.with_attribute("Rating", value.clone());
                }
                _ => {}
            }
        }

        if let Some(sku) = product.display_sku_availabilities.first() {
            if let Some(market) = sku.market_properties.first() {
                if let Some(released) = &market.first_available_date {
                    offer = offer.with_attribute("Released", released.clone());
                }
            }

            if let Some(availability) = sku.availabilities.first() {
                let platforms = normalize_platforms(
                    &availability.conditions.client_conditions.allowed_platforms,
                );
                if !platforms.is_empty() {
                    offer = offer.with_attribute("Platforms", platforms.join(", "));
                }

                if let Some(end_date) = &availability.conditions.end_date {
                    offer = offer.with_attribute("Available until", end_date.clone());
                }

                let price = &availability.order_management_data.price;
                if let (Some(list_price), Some(currency)) =
                    (price.list_price, &price.currency_code)
                {
                    offer = offer.with_attribute("Price", format!("{} {}", list_price, currency));
                }
            }
        }

        Some(offer)
    }
}

#[async_trait]
impl Extractor for CatalogApiExtractor {
    async fn fetch(&self) -> Result<Vec<Offer>> {
        let ids = self.fetch_offer_ids().await?;
        if ids.is_empty() {
            log::warn!("No offer ids returned for {}", self.source_key);
            return Ok(Vec::new());
        }
        log::debug!("{}: resolving {} offer ids", self.source_key, ids.len());

        let batch_size = self.config.batch_size.max(1);
        let delay = Duration::from_millis(self.config.batch_delay_ms);
        let mut offers = Vec::new();

        let mut batches = ids.chunks(batch_size).peekable();
        while let Some(batch) = batches.next() {
            offers.extend(self.fetch_details(batch).await?);

            if batches.peek().is_some() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        Ok(offers)
    }
}

/// Collapse vendor platform identifiers into display names.
fn normalize_platforms(raw: &[AllowedPlatform]) -> Vec<String> {
    let mut platforms = Vec::new();
    for entry in raw {
        let Some(name) = &entry.platform_name else {
            continue;
        };
        let display = match name.as_str() {
            "Windows.Desktop" => "PC",
            "Windows.Xbox" => "Xbox",
            "Windows.Mobile" => "Mobile",
            "Xbox.XboxOne" => "Xbox One",
            "Xbox.Scarlett" => "Xbox Series X|S",
            other => other,
        };
        if !platforms.iter().any(|p| p == display) {
            platforms.push(display.to_string());
        }
    }
    platforms
}

// --- Wire types ---
//
// Every field is defaulted so partially-populated payloads deserialize
// instead of failing the whole batch.

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct IdEntry {
    id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct CatalogPage {
    products: Vec<Product>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct Product {
    product_id: String,
    localized_properties: Vec<LocalizedProperties>,
    properties: ProductProperties,
    display_sku_availabilities: Vec<SkuAvailability>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct LocalizedProperties {
    product_title: String,
    short_description: String,
    images: Vec<ProductImage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct ProductImage {
    uri: String,
    image_purpose: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct ProductProperties {
    categories: Vec<String>,
    attributes: Vec<ProductAttribute>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct ProductAttribute {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct SkuAvailability {
    market_properties: Vec<MarketProperties>,
    availabilities: Vec<Availability>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct MarketProperties {
    first_available_date: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct Availability {
    conditions: Conditions,
    order_management_data: OrderManagementData,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct Conditions {
    client_conditions: ClientConditions,
    end_date: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct ClientConditions {
    allowed_platforms: Vec<AllowedPlatform>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct AllowedPlatform {
    platform_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct OrderManagementData {
    price: PriceInfo,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct PriceInfo {
    list_price: Option<f64>,
    currency_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> CatalogApiExtractor {
        CatalogApiExtractor::new(
            "xbox_gamepass".to_string(),
            CatalogSourceConfig {
                ids_url: "https://example.com/ids".to_string(),
                details_url: "https://example.com/details".to_string(),
                api_key: String::new(),
                market: "US".to_string(),
                language: "en-US".to_string(),
                batch_size: 20,
                batch_delay_ms: 0,
                product_url_prefix: "https://example.com/p/".to_string(),
            },
            &HttpConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_product_to_offer_full_payload() {
        let json = r#"{
            "ProductId": "9ABCDEF",
            "LocalizedProperties": [{
                "ProductTitle": "Game X",
                "ShortDescription": "A fine game",
                "Images": [
                    {"Uri": "https://img.example.com/wide.png", "ImagePurpose": "SuperHeroArt"},
                    {"Uri": "https://img.example.com/poster.png", "ImagePurpose": "Poster"}
                ]
            }],
            "Properties": {
                "Categories": ["Shooter", "Action & adventure"],
                "Attributes": [
                    {"Name": "Publisher", "Value": "Example Studios"},
                    {"Name": "ContentRating", "Value": "PEGI 18"},
                    {"Name": "Unrelated"}
                ]
            },
            "DisplaySkuAvailabilities": [{
                "MarketProperties": [{"FirstAvailableDate": "2025-04-01T00:00:00Z"}],
                "Availabilities": [{
                    "Conditions": {
                        "EndDate": "2026-12-31T00:00:00Z",
                        "ClientConditions": {
                            "AllowedPlatforms": [
                                {"PlatformName": "Windows.Desktop"},
                                {"PlatformName": "Xbox.Scarlett"},
                                {"PlatformName": "Windows.Desktop"}
                            ]
                        }
                    },
                    "OrderManagementData": {
                        "Price": {"ListPrice": 59.99, "CurrencyCode": "USD"}
                    }
                }]
            }]
        }"#;

        let product: Product = serde_json::from_str(json).unwrap();
        let offer = extractor().product_to_offer(&product).unwrap();

        assert_eq!(offer.title, "Game X");
        assert_eq!(offer.url, "https://example.com/p/9ABCDEF");
        assert_eq!(offer.image_url, "https://img.example.com/poster.png");
        assert_eq!(
            offer.attributes.get("Genre").map(String::as_str),
            Some("Shooter, Action & adventure")
        );
        assert_eq!(
            offer.attributes.get("Publisher").map(String::as_str),
            Some("Example Studios")
        );
        assert_eq!(
            offer.attributes.get("Rating").map(String::as_str),
            Some("PEGI 18")
        );
        assert_eq!(
            offer.attributes.get("Platforms").map(String::as_str),
            Some("PC, Xbox Series X|S")
        );
        assert_eq!(
            offer.attributes.get("Price").map(String::as_str),
            Some("59.99 USD")
        );
    }

    #[test]
    fn test_product_to_offer_sparse_payload() {
        // Only a title: everything else is absent, the item survives.
        let json = r#"{
            "ProductId": "9SPARSE",
            "LocalizedProperties": [{"ProductTitle": "Bare Game"}]
        }"#;

        let product: Product = serde_json::from_str(json).unwrap();
        let offer = extractor().product_to_offer(&product).unwrap();

        assert_eq!(offer.title, "Bare Game");
        assert!(offer.image_url.is_empty());
        assert!(offer.attributes.is_empty());
    }

    #[test]
    fn test_product_without_title_is_rejected() {
        let json = r#"{"ProductId": "9EMPTY", "LocalizedProperties": [{}]}"#;
        let product: Product = serde_json::from_str(json).unwrap();
        assert!(extractor().product_to_offer(&product).is_none());

        let no_props: Product = serde_json::from_str(r#"{"ProductId": "9NONE"}"#).unwrap();
        assert!(extractor().product_to_offer(&no_props).is_none());
    }

    #[test]
    fn test_normalize_platforms_dedupes_and_maps() {
        let raw = vec![
            AllowedPlatform {
                platform_name: Some("Windows.Desktop".to_string()),
            },
            AllowedPlatform {
                platform_name: Some("Windows.Desktop".to_string()),
            },
            AllowedPlatform {
                platform_name: Some("Custom.Platform".to_string()),
            },
            AllowedPlatform {
                platform_name: None,
            },
        ];

        assert_eq!(normalize_platforms(&raw), vec!["PC", "Custom.Platform"]);
    }

    #[test]
    fn test_id_entries_tolerate_missing_ids() {
        let entries: Vec<IdEntry> =
            serde_json::from_str(r#"[{"id": "9A"}, {"other": 1}, {"id": "9B"}]"#).unwrap();
        let ids: Vec<String> = entries.into_iter().filter_map(|e| e.id).collect();
        assert_eq!(ids, vec!["9A", "9B"]);
    }
}
