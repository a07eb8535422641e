//! Offer data structure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Placeholder for optional fields that could not be extracted.
pub const NOT_AVAILABLE: &str = "N/A";

/// A candidate offer discovered from one source.
///
/// Constructed fresh on every extraction run and discarded right after the
/// dedup decision. Extractors never hash or dedup offers themselves; the
/// content hash is computed centrally by [`crate::cache::DedupCache`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Offer {
    /// Offer title (trimmed, never empty)
    pub title: String,

    /// Stable identifier of the originating source (e.g. "prime_gaming")
    pub source_key: String,

    /// Full URL to the offer (empty if unknown)
    #[serde(default)]
    pub url: String,

    /// URL of the cover image (empty if unknown)
    #[serde(default)]
    pub image_url: String,

    /// Source-specific extra fields (genre, expiry, publisher, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Offer {
    /// Build an offer from a raw title, rejecting blank titles.
    ///
    /// Returns `None` when the trimmed title is empty; such candidates are
    /// discarded before any hashing happens.
    pub fn new(title: &str, source_key: impl Into<String>) -> Option<Self> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }

        Some(Self {
            title: title.to_string(),
            source_key: source_key.into(),
            url: String::new(),
            image_url: String::new(),
            attributes: BTreeMap::new(),
        })
    }

    /// Set the offer URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the cover image URL.
    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = image_url.into();
        self
    }

    /// Attach a source-specific attribute, skipping blank or placeholder
    /// values so embeds only carry fields that were actually extracted.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() && value != NOT_AVAILABLE {
            self.attributes.insert(name.into(), value);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_title() {
        let offer = Offer::new("  Game X  ", "test").unwrap();
        assert_eq!(offer.title, "Game X");
        assert_eq!(offer.source_key, "test");
    }

    #[test]
    fn test_new_rejects_blank_title() {
        assert!(Offer::new("", "test").is_none());
        assert!(Offer::new("   ", "test").is_none());
    }

    #[test]
    fn test_with_attribute_skips_placeholders() {
        let offer = Offer::new("Game X", "test")
            .unwrap()
            .with_attribute("Genre", "Action")
            .with_attribute("Publisher", NOT_AVAILABLE)
            .with_attribute("Rating", "  ");

        assert_eq!(offer.attributes.len(), 1);
        assert_eq!(offer.attributes.get("Genre").map(String::as_str), Some("Action"));
    }
}
