use axum::{
    extract::{FromRequest, Request},
    http::{HeaderMap, StatusCode},
};
use serde_json::Value;

use crate::{
    middleware::auth::is_valid_shop_domain,
    models::webhook::{ShopifyWebhook, WebhookTopic},
    services::webhooks::verify_hmac,
    AppState,
};

const MAX_WEBHOOK_BYTES: usize = 1024 * 1024;

/// Reads the raw body and verifies its `X-Shopify-Hmac-Sha256` signature
/// with the app secret before anything else looks at the delivery.
impl FromRequest<AppState> for ShopifyWebhook {
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();

        let signature = header(&parts.headers, "X-Shopify-Hmac-Sha256")
            .ok_or((StatusCode::UNAUTHORIZED, "Missing webhook signature"))?;

        let bytes = axum::body::to_bytes(body, MAX_WEBHOOK_BYTES)
            .await
            .map_err(|_| (StatusCode::PAYLOAD_TOO_LARGE, "Webhook body too large"))?;

        if !verify_hmac(&state.config.api_secret, &bytes, &signature) {
            tracing::warn!("Rejected webhook with invalid signature");
            return Err((StatusCode::UNAUTHORIZED, "Invalid webhook signature"));
        }

        let topic = header(&parts.headers, "X-Shopify-Topic")
            .map(|t| WebhookTopic::parse(&t))
            .unwrap_or_else(|| WebhookTopic::Other(String::new()));

        // Signed deliveries are always acknowledged, even without a usable shop
        let raw_shop = header(&parts.headers, "X-Shopify-Shop-Domain");
        let shop = raw_shop
            .as_deref()
            .map(str::to_lowercase)
            .filter(|s| is_valid_shop_domain(s));
        if shop.is_none() {
            tracing::warn!(
                "Signed {} webhook has a missing or invalid shop domain: {:?}",
                topic,
                raw_shop
            );
        }

        Ok(ShopifyWebhook {
            topic,
            shop,
            webhook_id: header(&parts.headers, "X-Shopify-Webhook-Id"),
            payload: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
        })
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
