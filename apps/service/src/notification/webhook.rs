use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::{Value, json};
use url::Url;

use super::{Message, Notifier, NotifierFactory, NotifyError, Platform};
use crate::database::models::NotificationConfig;

/// Longest error body kept from a rejected webhook call
const MAX_ERROR_BODY: usize = 512;

/// Posts alerts to a chat/webhook endpoint
pub struct WebhookNotifier {
    client: Client,
    url: Url,
    platform: Platform,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: Url, platform: Platform) -> Self {
        Self { client, url, platform }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        let payload = build_payload(self.platform, message);

        let response = self
            .client
            .post(self.url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&payload)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY));
            return Err(NotifyError::Rejected { platform: self.platform, status: status.as_u16(), body });
        }

        tracing::debug!(platform = %self.platform, title = %message.title, "Notification delivered");
        Ok(())
    }
}

/// Build the JSON body for a platform
pub fn build_payload(platform: Platform, message: &Message) -> Value {
    match platform {
        Platform::Discord => json!({
            "embeds": [{
                "title": message.title,
                "description": message.text,
                "color": message.level.color(),
                "timestamp": message.timestamp.to_rfc3339(),
            }]
        }),
        Platform::Slack => json!({
            "text": format!("*{}*\n{}", message.title, message.text),
        }),
        Platform::Teams => json!({
            "@type": "MessageCard",
            "@context": "http://schema.org/extensions",
            "summary": message.title,
            "themeColor": format!("{:06X}", message.level.color()),
            "title": message.title,
            "text": message.text,
        }),
        Platform::Generic => json!({
            "title": message.title,
            "text": message.text,
            "level": message.level,
            "timestamp": message.timestamp.to_rfc3339(),
        }),
    }
}

/// Check that a webhook target is an absolute http(s) URL
pub fn parse_webhook_url(raw: &str) -> Result<Url, NotifyError> {
    let url = Url::parse(raw)
        .map_err(|e| NotifyError::InvalidConfiguration(format!("invalid webhook URL {raw:?}: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(NotifyError::InvalidConfiguration(format!("unsupported webhook scheme: {other}"))),
    }
}

/// Creates [`WebhookNotifier`]s sharing one HTTP client
#[derive(Clone)]
pub struct WebhookFactory {
    client: Client,
}

impl WebhookFactory {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

impl NotifierFactory for WebhookFactory {
    fn notifier(&self, config: &NotificationConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
        let url = parse_webhook_url(&config.webhook)?;
        Ok(Arc::new(WebhookNotifier::new(self.client.clone(), url, config.platform)))
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
