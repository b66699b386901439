use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::models::session::{AuthenticatedShop, SessionTokenClaims};
use crate::AppState;

impl FromRequestParts<AppState> for AuthenticatedShop {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or((StatusCode::UNAUTHORIZED, "Invalid Authorization header format"))?;

        decode_session_token(token, &state.config.api_key, &state.config.api_secret)
            .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid or expired session token"))
    }
}

/// Validate an embedded-admin session token and resolve the shop it was
/// issued for.
pub fn decode_session_token(
    token: &str,
    api_key: &str,
    api_secret: &str,
) -> Result<AuthenticatedShop, anyhow::Error> {
    let key = DecodingKey::from_secret(api_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.set_audience(&[api_key]);

    let claims = decode::<SessionTokenClaims>(token, &key, &validation)?.claims;
    let shop = shop_from_dest(&claims.dest)
        .ok_or_else(|| anyhow::anyhow!("invalid dest claim: {}", claims.dest))?;

    Ok(AuthenticatedShop {
        shop,
        user_id: claims.sub,
        token: token.to_owned(),
    })
}

/// `https://demo.myshopify.com` → `demo.myshopify.com`
pub fn shop_from_dest(dest: &str) -> Option<String> {
    let host = dest.strip_prefix("https://").unwrap_or(dest);
    let host = host.split('/').next().unwrap_or(host).to_lowercase();
    is_valid_shop_domain(&host).then_some(host)
}

/// Shop domains only contain lowercase ASCII letters, digits, hyphens and
/// dots. They end up in Admin API URLs, so nothing else is accepted.
pub fn is_valid_shop_domain(s: &str) -> bool {
    let len = s.len();
    (3..=255).contains(&len)
        && s.contains('.')
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
        && !s.starts_with(['-', '.'])
        && !s.ends_with(['-', '.'])
        && !s.contains("..")
}
