// src/error.rs

//! Unified error handling for the offer watcher.

use std::fmt;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Extraction failed for a source
    #[error("Fetch error for {source_key}: {message}")]
    Fetch { source_key: String, message: String },

    /// Browser automation failed for a source
    #[error("Automation error for {source_key}: {message}")]
    Automation { source_key: String, message: String },

    /// Delivery to the notification channel failed
    #[error("Delivery error for {source_key}: {message}")]
    Delivery { source_key: String, message: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch error with source context.
    pub fn fetch(source: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            source_key: source.into(),
            message: message.to_string(),
        }
    }

    /// Create an automation error with source context.
    pub fn automation(source: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Automation {
            source_key: source.into(),
            message: message.to_string(),
        }
    }

    /// Create a delivery error with source context.
    pub fn delivery(source: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Delivery {
            source_key: source.into(),
            message: message.to_string(),
        }
    }
}
