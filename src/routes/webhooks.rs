use axum::{extract::State, http::StatusCode};
use tracing::{error, info};

use crate::{
    models::webhook::{ShopifyWebhook, WebhookTopic},
    services::{metrics::WEBHOOKS_COUNTER, webhooks},
    AppState,
};

/// Run a verified webhook and acknowledge it. Processing errors are logged,
/// never returned: the platform retries anything that is not a 2xx.
async fn acknowledge(state: &AppState, webhook: ShopifyWebhook) -> StatusCode {
    info!(
        "Received {} webhook for {} ({})",
        webhook.topic,
        webhook.shop_label(),
        webhook.webhook_id.as_deref().unwrap_or("no id")
    );

    match webhooks::handle(&state.db, &webhook).await {
        Ok(outcome) => {
            WEBHOOKS_COUNTER
                .with_label_values(&[webhook.topic.as_str(), "ok"])
                .inc();
            tracing::debug!("{} for {}: {:?}", webhook.topic, webhook.shop_label(), outcome);
        }
        Err(e) => {
            WEBHOOKS_COUNTER
                .with_label_values(&[webhook.topic.as_str(), "error"])
                .inc();
            error!(
                "{} webhook for {} failed: {e:#}",
                webhook.topic,
                webhook.shop_label()
            );
        }
    }
    StatusCode::OK
}

/// The route decides the topic; the header is only informative here.
async fn acknowledge_as(
    state: &AppState,
    mut webhook: ShopifyWebhook,
    topic: WebhookTopic,
) -> StatusCode {
    if webhook.topic != topic {
        tracing::warn!(
            "Webhook header topic {} delivered to the {} endpoint",
            webhook.topic,
            topic
        );
        webhook.topic = topic;
    }
    acknowledge(state, webhook).await
}

/// POST /webhooks — dispatch on `X-Shopify-Topic`
pub async fn receive(State(state): State<AppState>, webhook: ShopifyWebhook) -> StatusCode {
    acknowledge(&state, webhook).await
}

/// POST /webhooks/app/uninstalled
pub async fn app_uninstalled(State(state): State<AppState>, webhook: ShopifyWebhook) -> StatusCode {
    acknowledge_as(&state, webhook, WebhookTopic::AppUninstalled).await
}

/// POST /webhooks/app/scopes_update
pub async fn app_scopes_update(State(state): State<AppState>, webhook: ShopifyWebhook) -> StatusCode {
    acknowledge_as(&state, webhook, WebhookTopic::AppScopesUpdate).await
}

/// POST /webhooks/customers/data_request
pub async fn customers_data_request(
    State(state): State<AppState>,
    webhook: ShopifyWebhook,
) -> StatusCode {
    acknowledge_as(&state, webhook, WebhookTopic::CustomersDataRequest).await
}

/// POST /webhooks/customers/redact
pub async fn customers_redact(State(state): State<AppState>, webhook: ShopifyWebhook) -> StatusCode {
    acknowledge_as(&state, webhook, WebhookTopic::CustomersRedact).await
}

/// POST /webhooks/shop/redact
pub async fn shop_redact(State(state): State<AppState>, webhook: ShopifyWebhook) -> StatusCode {
    acknowledge_as(&state, webhook, WebhookTopic::ShopRedact).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use crate::{config::Config, services::webhooks::sign, AppState};

    const SECRET: &str = "webhook-secret";

    fn state() -> AppState {
        let config = Config {
            database_url: "postgres://scheduled_bar@127.0.0.1:1/scheduled_bar".into(),
            api_key: "app-key".into(),
            api_secret: SECRET.into(),
            api_version: "2025-01".into(),
            app_url: "http://localhost:3000".into(),
            host: "127.0.0.1".into(),
            port: 0,
        };
        // Nothing listens on port 1: every query fails fast
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy(&config.database_url)
            .unwrap();
        AppState::new(pool, config)
    }

    fn delivery(path: &str, topic: &str, body: &str, signature: Option<String>) -> Request<Body> {
        delivery_from(path, topic, Some("demo.myshopify.com"), body, signature)
    }

    fn delivery_from(
        path: &str,
        topic: &str,
        shop: Option<&str>,
        body: &str,
        signature: Option<String>,
    ) -> Request<Body> {
        let mut builder = Request::post(path)
            .header("Content-Type", "application/json")
            .header("X-Shopify-Topic", topic);
        if let Some(shop) = shop {
            builder = builder.header("X-Shopify-Shop-Domain", shop);
        }
        if let Some(signature) = signature {
            builder = builder.header("X-Shopify-Hmac-Sha256", signature);
        }
        builder.body(Body::from(body.to_owned())).unwrap()
    }

    #[tokio::test]
    async fn data_request_is_acknowledged() {
        let body = r#"{"shop_domain":"demo.myshopify.com","customer":{"id":1}}"#;
        let request = delivery(
            "/webhooks/customers/data_request",
            "customers/data_request",
            body,
            Some(sign(SECRET, body.as_bytes()).unwrap()),
        );

        let response = crate::router(state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn failing_uninstall_still_answers_ok() {
        let body = r#"{"id":1}"#;
        let request = delivery(
            "/webhooks",
            "app/uninstalled",
            body,
            Some(sign(SECRET, body.as_bytes()).unwrap()),
        );

        let response = crate::router(state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signed_delivery_without_usable_shop_is_acknowledged() {
        let body = r#"{"shop_domain":"demo.myshopify.com"}"#;
        for shop in [None, Some("not a shop"), Some("demo..myshopify.com")] {
            let request = delivery_from(
                "/webhooks/customers/redact",
                "customers/redact",
                shop,
                body,
                Some(sign(SECRET, body.as_bytes()).unwrap()),
            );
            let response = crate::router(state()).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "shop header {shop:?}");
        }

        let uninstall = delivery_from(
            "/webhooks/app/uninstalled",
            "app/uninstalled",
            None,
            body,
            Some(sign(SECRET, body.as_bytes()).unwrap()),
        );
        let response = crate::router(state()).oneshot(uninstall).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unsigned_delivery_is_rejected() {
        let body = r#"{"id":1}"#;
        let missing = delivery("/webhooks", "app/uninstalled", body, None);
        let response = crate::router(state()).oneshot(missing).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let forged = delivery(
            "/webhooks",
            "app/uninstalled",
            body,
            Some(sign("not-the-secret", body.as_bytes()).unwrap()),
        );
        let response = crate::router(state()).oneshot(forged).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bars_require_a_session_token() {
        let request = Request::get("/bars").body(Body::empty()).unwrap();
        let response = crate::router(state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
