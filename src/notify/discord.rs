//! Discord webhook notifier.
//!
//! Renders one embed per offer and posts it to the source's webhook, with a
//! bounded retry on transport or HTTP failure.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{Config, Offer};
use crate::notify::Notifier;

/// Longest description carried into an embed body.
const DESCRIPTION_LIMIT: usize = 200;

/// Delivery target for one source.
#[derive(Debug, Clone)]
struct ChannelBinding {
    name: String,
    webhook: String,
    color: u32,
}

/// Webhook-based Discord notifier.
pub struct DiscordNotifier {
    client: Client,
    channels: HashMap<String, ChannelBinding>,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    /// Build the notifier and its per-source channel bindings from
    /// configuration. Sources without their own webhook use the default one.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut channels = HashMap::new();
        for source in config.enabled_sources() {
            let webhook = source
                .webhook
                .clone()
                .unwrap_or_else(|| config.notifier.webhook_url.clone());
            if webhook.is_empty() {
                return Err(AppError::config(format!(
                    "No webhook configured for source {}",
                    source.key
                )));
            }

            channels.insert(
                source.key.clone(),
                ChannelBinding {
                    name: source.name.clone(),
                    webhook,
                    color: source_color(&source.key),
                },
            );
        }

        Ok(Self {
            client: Client::new(),
            channels,
            timeout: Duration::from_secs(config.notifier.timeout_secs),
            max_retries: config.notifier.max_retries.max(1),
        })
    }

    fn binding(&self, offer: &Offer) -> Result<&ChannelBinding> {
        self.channels.get(&offer.source_key).ok_or_else(|| {
            AppError::delivery(&offer.source_key, "no channel binding for source")
        })
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn deliver(&self, offer: &Offer) -> Result<()> {
        let binding = self.binding(offer)?;
        let payload = build_payload(offer, &binding.name, binding.color);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let response = self
                .client
                .post(&binding.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let error = match response {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => e,
                },
                Err(e) => e,
            };

            if attempt >= self.max_retries {
                return Err(AppError::delivery(&offer.source_key, error));
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

/// Embed color per source, defaulting to Discord blurple.
fn source_color(source_key: &str) -> u32 {
    match source_key {
        "prime_gaming" => 0x00A8FF,
        "xbox_gamepass" => 0x107C10,
        "ps_plus" => 0x003087,
        _ => 0x7289DA,
    }
}

/// Render one offer as a webhook payload.
fn build_payload(offer: &Offer, source_name: &str, color: u32) -> WebhookPayload {
    let mut description = format!("New offer available on **{}**!", source_name);
    if let Some(text) = offer.attributes.get("Description") {
        let mut text = text.clone();
        if text.len() > DESCRIPTION_LIMIT {
            let mut cut = DESCRIPTION_LIMIT;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("...");
        }
        description.push_str(&format!("\n\n*{}*", text));
    }

    let mut fields: Vec<EmbedField> = offer
        .attributes
        .iter()
        .filter(|(name, _)| name.as_str() != "Description")
        .map(|(name, value)| EmbedField {
            name: name.clone(),
            value: value.clone(),
            inline: true,
        })
        .collect();

    if !offer.url.is_empty() {
        fields.push(EmbedField {
            name: "Link".to_string(),
            value: format!("[Open the offer]({})", offer.url),
            inline: false,
        });
    }

    WebhookPayload {
        embeds: vec![Embed {
            title: format!("🎮 {}", offer.title),
            description,
            color,
            thumbnail: (!offer.image_url.is_empty()).then(|| EmbedThumbnail {
                url: offer.image_url.clone(),
            }),
            fields,
            footer: EmbedFooter {
                text: format!("offerwatch • {}", source_name),
            },
            timestamp: chrono::Utc::now().to_rfc3339(),
        }],
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<EmbedThumbnail>,
    fields: Vec<EmbedField>,
    footer: EmbedFooter,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct EmbedThumbnail {
    url: String,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedFooter {
    text: String,
}
