use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::{
    models::bar::{METAFIELD_KEY, METAFIELD_NAMESPACE},
    services::sessions::SessionService,
};

/// Raw settings blob as read from a store, with the store's version token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredBars {
    pub value: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no offline session stored for {0}")]
    NoSession(String),
    #[error("session store error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("admin API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("admin API error: {0}")]
    Api(String),
    #[error("settings rejected: {0}")]
    Rejected(String),
    #[error("settings were changed by another session, reload and try again")]
    Conflict,
    #[error("settings could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("settings file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load/save contract for one settings blob per shop.
///
/// `save` replaces the whole value. When `expected` is given, the save only
/// succeeds if the stored version still matches it; without it the last
/// write wins.
pub trait BarStore {
    fn load(&self, shop: &str) -> impl Future<Output = Result<StoredBars, GatewayError>> + Send;

    fn save(
        &self,
        shop: &str,
        value: &str,
        expected: Option<&str>,
    ) -> impl Future<Output = Result<Option<String>, GatewayError>> + Send;
}

/// Version token for stores that do not provide one themselves.
pub fn content_digest(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

// ── Admin GraphQL API ───────────────────────────────────────────────────────

const LOAD_QUERY: &str = r#"query loadBars($namespace: String!, $key: String!) {
  shop {
    id
    metafield(namespace: $namespace, key: $key) {
      value
      compareDigest
    }
  }
}"#;

const SHOP_ID_QUERY: &str = "{ shop { id } }";

const SAVE_MUTATION: &str = r#"mutation metafieldsSet($metafields: [MetafieldsSetInput!]!) {
  metafieldsSet(metafields: $metafields) {
    metafields { compareDigest }
    userErrors { field message code }
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ShopData {
    shop: ShopNode,
}

#[derive(Debug, Deserialize)]
struct ShopNode {
    id: String,
    #[serde(default)]
    metafield: Option<MetafieldNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetafieldNode {
    value: String,
    compare_digest: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetafieldsSetData {
    metafields_set: Option<MetafieldsSetPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetafieldsSetPayload {
    #[serde(default)]
    metafields: Option<Vec<SavedMetafield>>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedMetafield {
    compare_digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserError {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Stores the settings in the shop metafield through the Admin GraphQL API,
/// authenticated with the shop's offline access token.
pub struct AdminApiStore {
    client: Client,
    db: PgPool,
    api_version: String,
}

impl AdminApiStore {
    pub fn new(client: Client, db: PgPool, api_version: impl Into<String>) -> Self {
        Self {
            client,
            db,
            api_version: api_version.into(),
        }
    }

    fn endpoint(&self, shop: &str) -> String {
        format!("https://{shop}/admin/api/{}/graphql.json", self.api_version)
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        shop: &str,
        query: &str,
        variables: Value,
    ) -> Result<T, GatewayError> {
        let token = SessionService::offline_access_token(&self.db, shop)
            .await?
            .ok_or_else(|| GatewayError::NoSession(shop.to_owned()))?;

        let body: GraphqlResponse<T> = self
            .client
            .post(self.endpoint(shop))
            .header("X-Shopify-Access-Token", token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !body.errors.is_empty() {
            let messages: Vec<&str> = body.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(GatewayError::Api(messages.join("; ")));
        }
        body.data
            .ok_or_else(|| GatewayError::Api("response carried no data".into()))
    }
}

impl BarStore for AdminApiStore {
    async fn load(&self, shop: &str) -> Result<StoredBars, GatewayError> {
        let data: ShopData = self
            .graphql(
                shop,
                LOAD_QUERY,
                json!({ "namespace": METAFIELD_NAMESPACE, "key": METAFIELD_KEY }),
            )
            .await?;

        Ok(match data.shop.metafield {
            Some(metafield) => StoredBars {
                value: Some(metafield.value),
                version: metafield.compare_digest,
            },
            None => StoredBars::default(),
        })
    }

    async fn save(
        &self,
        shop: &str,
        value: &str,
        expected: Option<&str>,
    ) -> Result<Option<String>, GatewayError> {
        let owner: ShopData = self.graphql(shop, SHOP_ID_QUERY, json!({})).await?;
        let input = metafield_input(&owner.shop.id, value, expected);

        let data: MetafieldsSetData = self
            .graphql(shop, SAVE_MUTATION, json!({ "metafields": [input] }))
            .await?;
        let payload = data
            .metafields_set
            .ok_or_else(|| GatewayError::Api("metafieldsSet returned no payload".into()))?;

        check_user_errors(&payload.user_errors)?;
        tracing::info!("Saved bar settings for {}", shop);

        Ok(payload
            .metafields
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|m| m.compare_digest))
    }
}

fn metafield_input(owner_id: &str, value: &str, expected: Option<&str>) -> Value {
    let mut input = Map::new();
    input.insert("namespace".into(), json!(METAFIELD_NAMESPACE));
    input.insert("key".into(), json!(METAFIELD_KEY));
    input.insert("type".into(), json!("json"));
    input.insert("value".into(), json!(value));
    input.insert("ownerId".into(), json!(owner_id));
    if let Some(digest) = expected {
        input.insert("compareDigest".into(), json!(digest));
    }
    Value::Object(input)
}

fn check_user_errors(errors: &[UserError]) -> Result<(), GatewayError> {
    if errors.iter().any(|e| e.code.as_deref() == Some("STALE_OBJECT")) {
        return Err(GatewayError::Conflict);
    }
    if errors.is_empty() {
        return Ok(());
    }
    let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
    Err(GatewayError::Rejected(messages.join("; ")))
}

// ── Local JSON files ────────────────────────────────────────────────────────

/// One JSON document per shop under `dir`, versioned by content digest.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, shop: &str) -> PathBuf {
        let name: String = shop
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }

    async fn read(&self, shop: &str) -> Result<Option<String>, GatewayError> {
        match tokio::fs::read_to_string(self.path(shop)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl BarStore for FileStore {
    async fn load(&self, shop: &str) -> Result<StoredBars, GatewayError> {
        let value = self.read(shop).await?;
        let version = value.as_deref().map(content_digest);
        Ok(StoredBars { value, version })
    }

    async fn save(
        &self,
        shop: &str,
        value: &str,
        expected: Option<&str>,
    ) -> Result<Option<String>, GatewayError> {
        if let Some(expected) = expected {
            let current = self.read(shop).await?.map(|v| content_digest(&v));
            if current.as_deref() != Some(expected) {
                return Err(GatewayError::Conflict);
            }
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path(shop), value).await?;
        Ok(Some(content_digest(value)))
    }
}

// ── In-memory (tests) ───────────────────────────────────────────────────────

#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryStore {
    values: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub(crate) fn with_value(shop: &str, value: &str) -> Self {
        let store = Self::default();
        store
            .values
            .lock()
            .unwrap()
            .insert(shop.to_owned(), value.to_owned());
        store
    }

    pub(crate) fn raw(&self, shop: &str) -> Option<String> {
        self.values.lock().unwrap().get(shop).cloned()
    }
}

#[cfg(test)]
impl BarStore for MemoryStore {
    async fn load(&self, shop: &str) -> Result<StoredBars, GatewayError> {
        let value = self.raw(shop);
        let version = value.as_deref().map(content_digest);
        Ok(StoredBars { value, version })
    }

    async fn save(
        &self,
        shop: &str,
        value: &str,
        expected: Option<&str>,
    ) -> Result<Option<String>, GatewayError> {
        let mut values = self.values.lock().unwrap();
        if let Some(expected) = expected {
            let current = values.get(shop).map(|v| content_digest(v));
            if current.as_deref() != Some(expected) {
                return Err(GatewayError::Conflict);
            }
        }
        values.insert(shop.to_owned(), value.to_owned());
        Ok(Some(content_digest(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOP: &str = "demo.myshopify.com";

    #[test]
    fn metafield_input_targets_settings_key() {
        let input = metafield_input("gid://shopify/Shop/1", "[]", None);
        assert_eq!(input["namespace"], "scheduled_bar");
        assert_eq!(input["key"], "settings");
        assert_eq!(input["type"], "json");
        assert_eq!(input["ownerId"], "gid://shopify/Shop/1");
        assert!(input.get("compareDigest").is_none());

        let guarded = metafield_input("gid://shopify/Shop/1", "[]", Some("abc"));
        assert_eq!(guarded["compareDigest"], "abc");
    }

    #[test]
    fn stale_user_error_is_a_conflict() {
        let stale = vec![UserError {
            message: "The resource has been updated".into(),
            code: Some("STALE_OBJECT".into()),
        }];
        assert!(matches!(check_user_errors(&stale), Err(GatewayError::Conflict)));

        let invalid = vec![UserError {
            message: "Value is invalid JSON".into(),
            code: Some("INVALID_VALUE".into()),
        }];
        assert!(matches!(
            check_user_errors(&invalid),
            Err(GatewayError::Rejected(msg)) if msg == "Value is invalid JSON"
        ));
        assert!(check_user_errors(&[]).is_ok());
    }

    #[test]
    fn graphql_load_response_parses() {
        let body: GraphqlResponse<ShopData> = serde_json::from_value(json!({
            "data": { "shop": {
                "id": "gid://shopify/Shop/1",
                "metafield": { "value": "[]", "compareDigest": "d1" }
            } }
        }))
        .unwrap();
        let shop = body.data.unwrap().shop;
        assert_eq!(shop.metafield.unwrap().compare_digest.as_deref(), Some("d1"));

        let empty: GraphqlResponse<ShopData> = serde_json::from_value(json!({
            "data": { "shop": { "id": "gid://shopify/Shop/1", "metafield": null } }
        }))
        .unwrap();
        assert!(empty.data.unwrap().shop.metafield.is_none());
    }

    #[tokio::test]
    async fn memory_store_detects_stale_writes() {
        let store = MemoryStore::with_value(SHOP, "[]");
        let loaded = store.load(SHOP).await.unwrap();
        let version = loaded.version.clone().unwrap();

        store.save(SHOP, "[1]", None).await.unwrap();
        let result = store.save(SHOP, "[2]", Some(&version)).await;
        assert!(matches!(result, Err(GatewayError::Conflict)));
        assert_eq!(store.raw(SHOP).as_deref(), Some("[1]"));
    }

    #[tokio::test]
    async fn file_store_round_trips_and_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        assert_eq!(store.load(SHOP).await.unwrap(), StoredBars::default());
        assert!(matches!(
            store.save(SHOP, "[]", Some("missing")).await,
            Err(GatewayError::Conflict)
        ));

        let version = store.save(SHOP, "[]", None).await.unwrap();
        let loaded = store.load(SHOP).await.unwrap();
        assert_eq!(loaded.value.as_deref(), Some("[]"));
        assert_eq!(loaded.version, version);

        let next = store.save(SHOP, "[1]", version.as_deref()).await.unwrap();
        assert_eq!(next, Some(content_digest("[1]")));
    }

    #[test]
    fn file_names_are_sanitised() {
        let store = FileStore::new("/tmp/bars");
        assert_eq!(
            store.path("../evil/shop"),
            PathBuf::from("/tmp/bars/.._evil_shop.json")
        );
    }
}
