use reqwest::Client;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    config::Config,
    models::session::{AccessTokenGrant, Session},
};

const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ID_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id_token";
const OFFLINE_TOKEN_TYPE: &str = "urn:shopify:params:oauth:token-type:offline-access-token";

pub struct SessionService;

impl SessionService {
    pub fn offline_id(shop: &str) -> String {
        format!("offline_{shop}")
    }

    pub async fn find_offline(pool: &PgPool, shop: &str) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            "SELECT id, shop, is_online, scope, expires, access_token, created_at, updated_at
             FROM sessions WHERE id = $1",
        )
        .bind(Self::offline_id(shop))
        .fetch_optional(pool)
        .await
    }

    pub async fn offline_access_token(
        pool: &PgPool,
        shop: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        Ok(Self::find_offline(pool, shop)
            .await?
            .map(|session| session.access_token))
    }

    /// Insert or refresh the offline session of a shop.
    pub async fn store_offline(
        pool: &PgPool,
        shop: &str,
        grant: &AccessTokenGrant,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sessions (id, shop, is_online, scope, access_token)
             VALUES ($1, $2, FALSE, $3, $4)
             ON CONFLICT (id) DO UPDATE SET
                 scope = EXCLUDED.scope,
                 access_token = EXCLUDED.access_token,
                 updated_at = NOW()",
        )
        .bind(Self::offline_id(shop))
        .bind(shop)
        .bind(&grant.scope)
        .bind(&grant.access_token)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Remove every session of a shop. Returns the number of rows deleted.
    pub async fn delete_for_shop(pool: &PgPool, shop: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE shop = $1")
            .bind(shop)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn update_scope(pool: &PgPool, shop: &str, scope: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET scope = $1, updated_at = NOW() WHERE shop = $2",
        )
        .bind(scope)
        .bind(shop)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_offline(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*)::BIGINT FROM sessions WHERE is_online = FALSE")
            .fetch_one(pool)
            .await
    }

    /// Trade an embedded-admin session token for an offline access token.
    pub async fn exchange_token(
        client: &Client,
        config: &Config,
        shop: &str,
        session_token: &str,
    ) -> anyhow::Result<AccessTokenGrant> {
        let response = client
            .post(format!("https://{shop}/admin/oauth/access_token"))
            .header("Accept", "application/json")
            .json(&json!({
                "client_id": config.api_key,
                "client_secret": config.api_secret,
                "grant_type": TOKEN_EXCHANGE_GRANT,
                "subject_token": session_token,
                "subject_token_type": ID_TOKEN_TYPE,
                "requested_token_type": OFFLINE_TOKEN_TYPE,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("token exchange for {shop} failed with {status}: {text}");
        }

        Ok(response.json().await?)
    }

    /// Make sure an offline session exists for `shop`, exchanging the
    /// session token for one on first use.
    pub async fn ensure_offline(
        pool: &PgPool,
        client: &Client,
        config: &Config,
        shop: &str,
        session_token: &str,
    ) -> anyhow::Result<()> {
        if Self::find_offline(pool, shop).await?.is_some() {
            return Ok(());
        }

        let grant = Self::exchange_token(client, config, shop, session_token).await?;
        Self::store_offline(pool, shop, &grant).await?;
        tracing::info!("Stored offline session for {}", shop);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_ids_are_keyed_by_shop() {
        assert_eq!(
            SessionService::offline_id("demo.myshopify.com"),
            "offline_demo.myshopify.com"
        );
    }
}
