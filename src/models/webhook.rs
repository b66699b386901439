use std::fmt;

use serde::Deserialize;
use serde_json::Value;

/// Webhook topics this app subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookTopic {
    AppUninstalled,
    AppScopesUpdate,
    CustomersDataRequest,
    CustomersRedact,
    ShopRedact,
    Other(String),
}

impl WebhookTopic {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "app/uninstalled" => WebhookTopic::AppUninstalled,
            "app/scopes_update" => WebhookTopic::AppScopesUpdate,
            "customers/data_request" => WebhookTopic::CustomersDataRequest,
            "customers/redact" => WebhookTopic::CustomersRedact,
            "shop/redact" => WebhookTopic::ShopRedact,
            _ => WebhookTopic::Other(raw.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WebhookTopic::AppUninstalled => "app/uninstalled",
            WebhookTopic::AppScopesUpdate => "app/scopes_update",
            WebhookTopic::CustomersDataRequest => "customers/data_request",
            WebhookTopic::CustomersRedact => "customers/redact",
            WebhookTopic::ShopRedact => "shop/redact",
            WebhookTopic::Other(raw) => raw,
        }
    }
}

impl fmt::Display for WebhookTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A webhook delivery whose HMAC signature has been verified.
///
/// `shop` is `None` when the shop domain header is missing or malformed;
/// such deliveries are still acknowledged but change nothing.
#[derive(Debug, Clone)]
pub struct ShopifyWebhook {
    pub topic: WebhookTopic,
    pub shop: Option<String>,
    pub webhook_id: Option<String>,
    pub payload: Value,
}

impl ShopifyWebhook {
    /// Shop domain for log lines.
    pub fn shop_label(&self) -> &str {
        self.shop.as_deref().unwrap_or("unknown shop")
    }
}

/// Body of `app/scopes_update`.
#[derive(Debug, Default, Deserialize)]
pub struct ScopesUpdatePayload {
    #[serde(default)]
    pub current: Vec<String>,
}

impl ScopesUpdatePayload {
    /// Granted scopes in the comma separated form stored on the session.
    pub fn scope(&self) -> String {
        self.current.join(",")
    }
}
