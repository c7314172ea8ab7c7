//! Product event collaborators.
//!
//! The webhook endpoints only authenticate and dispatch. What happens to a
//! product afterwards (tagging it from the music catalog, making it sellable,
//! managing Shopify subscriptions) lives behind [`ProductHooks`].

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::Config;

/// Topics this app subscribes to.
pub const WEBHOOK_TOPICS: [&str; 2] = ["products/create", "products/update"];

/// A webhook subscription to register with the shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookSubscription {
    pub topic: String,
    pub address: String,
    pub format: String,
}

impl WebhookSubscription {
    /// Subscriptions for every topic in [`WEBHOOK_TOPICS`], pointing back at
    /// `app_url`.
    pub fn for_app(app_url: &str) -> Vec<Self> {
        let host = app_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');

        WEBHOOK_TOPICS
            .iter()
            .map(|topic| Self {
                topic: (*topic).to_string(),
                address: format!("https://{}/webhook/{}", host, topic),
                format: "json".to_string(),
            })
            .collect()
    }
}

/// Business logic invoked once a webhook has been authenticated.
#[async_trait]
pub trait ProductHooks: Send + Sync {
    /// A product was created in the shop.
    async fn product_created(&self, product: Value) -> Result<()>;

    /// A product was updated in the shop.
    async fn product_updated(&self, product: Value) -> Result<()>;

    /// Replace the shop's webhook subscriptions with `subscriptions`.
    async fn register_webhooks(&self, subscriptions: &[WebhookSubscription]) -> Result<()>;
}

/// Hooks that only record what they were asked to do.
///
/// Each record names the shop the event belongs to and whether the
/// credentials a real collaborator would need (Shopify Admin API, Discogs) are
/// configured.
#[derive(Debug, Default, Clone)]
pub struct LoggingHooks {
    shop: Option<String>,
    shop_api_ready: bool,
    catalog_ready: bool,
}

impl LoggingHooks {
    pub fn from_config(config: &Config) -> Self {
        let hooks = Self {
            shop: config.shop_domain(),
            shop_api_ready: config.has_shop_credentials(),
            catalog_ready: config.discogs_api_key.is_some(),
        };

        if hooks.shop.is_none() {
            warn!("hooks_shop_not_configured");
        }

        hooks
    }

    fn shop(&self) -> &str {
        self.shop.as_deref().unwrap_or("unknown")
    }
}

#[async_trait]
impl ProductHooks for LoggingHooks {
    async fn product_created(&self, product: Value) -> Result<()> {
        info!(
            shop = self.shop(),
            product_id = %product_id(&product),
            catalog_ready = self.catalog_ready,
            "product_created_received"
        );
        Ok(())
    }

    async fn product_updated(&self, product: Value) -> Result<()> {
        info!(
            shop = self.shop(),
            product_id = %product_id(&product),
            catalog_ready = self.catalog_ready,
            "product_updated_received"
        );
        Ok(())
    }

    async fn register_webhooks(&self, subscriptions: &[WebhookSubscription]) -> Result<()> {
        for subscription in subscriptions {
            info!(
                shop = self.shop(),
                topic = %subscription.topic,
                address = %subscription.address,
                shop_api_ready = self.shop_api_ready,
                "webhook_subscription_requested"
            );
        }
        Ok(())
    }
}

fn product_id(product: &Value) -> String {
    product
        .get("id")
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscriptions_for_app() {
        let subs = WebhookSubscription::for_app("tagger.example.com");

        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].topic, "products/create");
        assert_eq!(subs[0].address, "https://tagger.example.com/webhook/products/create");
        assert_eq!(subs[1].address, "https://tagger.example.com/webhook/products/update");
        assert!(subs.iter().all(|s| s.format == "json"));
    }

    #[test]
    fn test_subscriptions_strip_scheme_and_slash() {
        let subs = WebhookSubscription::for_app("https://tagger.example.com/");
        assert_eq!(subs[0].address, "https://tagger.example.com/webhook/products/create");
    }

    #[test]
    fn test_product_id() {
        assert_eq!(product_id(&json!({"id": 42})), "42");
        assert_eq!(product_id(&json!({})), "unknown");
    }

    #[test]
    fn test_logging_hooks_from_config() {
        let mut config = Config::for_secret("s");
        config.shop_name = Some("vinyl-shop".to_string());
        config.shopify_api_key = Some("key".to_string());
        config.shopify_api_secret = Some("password".to_string());

        let hooks = LoggingHooks::from_config(&config);

        assert_eq!(hooks.shop(), "vinyl-shop.myshopify.com");
        assert!(hooks.shop_api_ready);
        assert!(!hooks.catalog_ready);
    }

    #[test]
    fn test_logging_hooks_without_shop() {
        let hooks = LoggingHooks::from_config(&Config::for_secret("s"));

        assert_eq!(hooks.shop(), "unknown");
        assert!(!hooks.shop_api_ready);
    }

    #[tokio::test]
    async fn test_logging_hooks_accept_everything() {
        let hooks = LoggingHooks::default();
        hooks.product_created(json!({"id": 1})).await.unwrap();
        hooks.product_updated(json!(null)).await.unwrap();
        hooks
            .register_webhooks(&WebhookSubscription::for_app("a.example"))
            .await
            .unwrap();
    }
}
