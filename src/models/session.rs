use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Stored platform session. Offline sessions (`offline_{shop}`) carry the
/// access token used for Admin API calls.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: String,
    pub shop: String,
    pub is_online: bool,
    pub scope: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub access_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Claims of the session token the embedded admin sends as a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokenClaims {
    pub iss: String,
    pub dest: String, // https://{shop}
    pub aud: String,  // app API key
    #[serde(default)]
    pub sub: Option<String>, // staff user id
    pub exp: usize,
    pub nbf: usize,
    pub iat: usize,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub sid: Option<String>,
}

/// Extracted from a validated session token — available via Axum extractors
#[derive(Debug, Clone)]
pub struct AuthenticatedShop {
    pub shop: String,
    pub user_id: Option<String>,
    /// Raw token, kept for the offline token exchange.
    pub token: String,
}

/// Response of the OAuth token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub scope: Option<String>,
}
