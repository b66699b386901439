use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_version: String,
    pub app_url: String,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            api_key: required("SHOPIFY_API_KEY")?,
            api_secret: required("SHOPIFY_API_SECRET")?,
            api_version: env::var("SHOPIFY_API_VERSION").unwrap_or_else(|_| "2025-01".into()),
            app_url: env::var("SHOPIFY_APP_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()?,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
