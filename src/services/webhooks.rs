use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;

use crate::{
    models::webhook::{ScopesUpdatePayload, ShopifyWebhook, WebhookTopic},
    services::sessions::SessionService,
};

type HmacSha256 = Hmac<Sha256>;

/// What handling a webhook did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    SessionsDeleted(u64),
    ScopeUpdated(u64),
    Acknowledged,
    /// No usable shop domain, so there was nothing to act on.
    NoShop,
}

/// Check the base64 `X-Shopify-Hmac-Sha256` header against the raw body.
pub fn verify_hmac(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

pub fn sign(secret: &str, body: &[u8]) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| anyhow::anyhow!("invalid HMAC key"))?;
    mac.update(body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Apply a verified webhook. Data-subject requests carry no action: the app
/// stores no customer data.
pub async fn handle(pool: &PgPool, webhook: &ShopifyWebhook) -> anyhow::Result<WebhookOutcome> {
    match &webhook.topic {
        WebhookTopic::AppUninstalled => {
            let Some(shop) = webhook.shop.as_deref() else {
                return Ok(WebhookOutcome::NoShop);
            };
            let deleted = SessionService::delete_for_shop(pool, shop).await?;
            Ok(WebhookOutcome::SessionsDeleted(deleted))
        }
        WebhookTopic::AppScopesUpdate => {
            let Some(shop) = webhook.shop.as_deref() else {
                return Ok(WebhookOutcome::NoShop);
            };
            let payload: ScopesUpdatePayload = serde_json::from_value(webhook.payload.clone())?;
            let updated = SessionService::update_scope(pool, shop, &payload.scope()).await?;
            Ok(WebhookOutcome::ScopeUpdated(updated))
        }
        WebhookTopic::CustomersDataRequest
        | WebhookTopic::CustomersRedact
        | WebhookTopic::ShopRedact => {
            tracing::info!(
                "{} for {}: nothing stored, payload {}",
                webhook.topic,
                webhook.shop_label(),
                webhook.payload
            );
            Ok(WebhookOutcome::Acknowledged)
        }
        WebhookTopic::Other(topic) => {
            tracing::debug!("Ignoring unhandled webhook topic {}", topic);
            Ok(WebhookOutcome::Acknowledged)
        }
    }
}
