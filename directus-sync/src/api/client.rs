//! Directus REST client
//!
//! Thin wrapper over `reqwest` that authenticates, unwraps the `{"data": ...}`
//! envelope and logs every request at debug level. It implements the
//! `sync` store traits so the executors can run against a live instance.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};

use super::config::ClientConfig;
use super::error::ApiError;
use super::operations::Operation;
use crate::sync::logic::schema_diff::SchemaDiffEnvelope;
use crate::sync::store::{EntityStore, SchemaStore, SettingsStore};
use crate::sync::types::{Entity, EntitySpec};

/// Route of the settings singleton
pub const SETTINGS_ROUTE: &str = "/settings";

pub struct DirectusClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    config: ClientConfig,
}

impl DirectusClient {
    pub fn new(url: &str, config: ClientConfig) -> Result<Self, ApiError> {
        let base_url = url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::InvalidUrl {
                url: url.to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ApiError::Transport {
                context: "Failed to build HTTP client".to_string(),
                source: e,
            })?;

        Ok(Self {
            http,
            base_url,
            token: None,
            config,
        })
    }

    /// Use a static access token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Exchange credentials for an access token
    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), ApiError> {
        let path = "/auth/login";
        let data = self
            .request_data(
                Method::POST,
                path,
                &[],
                Some(&json!({"email": email, "password": password})),
            )
            .await?;

        let token = data
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::decode(path, "no access_token in login response"))?;

        log::info!("Logged in to {} as {}", self.base_url, email);
        self.token = Some(token.to_string());
        Ok(())
    }

    /// Send one request and parse the JSON body. `None` when the body is empty.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, ApiError> {
        log::debug!("↑{} {}", method, path);

        let mut request = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ApiError::Transport {
            context: format!("{} {}", method, path),
            source: e,
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| ApiError::Transport {
            context: format!("{} {}", method, path),
            source: e,
        })?;
        log::debug!("↓{} {} {}", method, path, status.as_u16());

        if !status.is_success() {
            log::error!("{}: {}", status.as_u16(), text);
            return Err(ApiError::Status {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ApiError::decode(path, e))
    }

    async fn request_data(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let response = self.request(method, path, query, body).await?;
        Ok(unwrap_data(response))
    }

    /// GET a route and return its `data`
    pub async fn get_data(&self, path: &str) -> Result<Value, ApiError> {
        self.request_data(Method::GET, path, &[], None).await
    }

    /// GET a route that returns a list, reading every record
    pub async fn get_list(&self, path: &str) -> Result<Vec<Entity>, ApiError> {
        let data = self
            .request_data(Method::GET, path, &[("limit", "-1".to_string())], None)
            .await?;
        as_entities(path, data)
    }

    /// Run a mutation and return its `data`
    pub async fn execute(&self, operation: &Operation) -> Result<Value, ApiError> {
        let path = operation.path();
        let body = operation.body();
        self.request_data(operation.http_method(), &path, &[], Some(&body))
            .await
    }

    /// Every collection record
    pub async fn collections(&self) -> Result<Vec<Entity>, ApiError> {
        let path = "/collections";
        as_entities(path, self.get_data(path).await?)
    }

    /// Field records of one collection
    pub async fn fields(&self, collection: &str) -> Result<Vec<Value>, ApiError> {
        let path = format!("/fields/{}", urlencoding::encode(collection));
        match self.get_data(&path).await? {
            Value::Array(fields) => Ok(fields),
            Value::Null => Ok(Vec::new()),
            _ => Err(ApiError::decode(&path, "expected a list of fields")),
        }
    }

    /// Number of items of a collection, when the server reports it
    pub async fn count(&self, collection: &str) -> Result<Option<u64>, ApiError> {
        let path = items_route(collection);
        let data = self
            .request_data(
                Method::GET,
                &path,
                &[("aggregate[count]", "*".to_string())],
                None,
            )
            .await?;
        Ok(parse_count(&data))
    }

    /// Every item of a collection, read page by page.
    ///
    /// The server may cap `limit` below the page size, so only an empty page
    /// ends the read.
    pub async fn items(&self, collection: &str) -> Result<Vec<Entity>, ApiError> {
        let path = items_route(collection);
        let page_size = self.config.page_size;
        let mut items = Vec::new();

        loop {
            let query = [
                ("limit", page_size.to_string()),
                ("offset", items.len().to_string()),
            ];
            let data = self.request_data(Method::GET, &path, &query, None).await?;
            let page = as_entities(&path, data)?;
            if page.is_empty() {
                break;
            }
            items.extend(page);
            log::debug!("{}: read {} items", collection, items.len());
        }

        Ok(items)
    }

    /// Installed extensions
    pub async fn extensions(&self) -> Result<Vec<Entity>, ApiError> {
        let path = "/extensions";
        as_entities(path, self.get_data(path).await?)
    }
}

/// Route of a user collection's items
pub fn items_route(collection: &str) -> String {
    format!("/items/{}", urlencoding::encode(collection))
}

/// Take the `data` member of a response, or the whole body when there is none
fn unwrap_data(response: Option<Value>) -> Value {
    match response {
        Some(Value::Object(mut map)) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        Some(other) => other,
        None => Value::Null,
    }
}

fn as_entities(path: &str, data: Value) -> Result<Vec<Entity>, ApiError> {
    match data {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(entity) => Ok(entity),
                _ => Err(ApiError::decode(path, "expected a list of objects")),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(ApiError::decode(path, "expected a list")),
    }
}

/// Count from an aggregate response; Directus returns it as a number or a string
fn parse_count(data: &Value) -> Option<u64> {
    let row = match data {
        Value::Array(rows) => rows.first()?,
        other => other,
    };
    match row.get("count")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        Value::Object(map) => map.values().next().and_then(|v| parse_count(&json!({"count": v}))),
        _ => None,
    }
}

#[async_trait]
impl EntityStore for DirectusClient {
    async fn fetch(&self, spec: &EntitySpec) -> anyhow::Result<Vec<Entity>> {
        self.get_list(&spec.route)
            .await
            .with_context(|| format!("Failed to read {}", spec.name))
    }

    async fn create(&self, spec: &EntitySpec, id: &str, entity: &Entity) -> anyhow::Result<()> {
        self.execute(&Operation::create(&spec.route, Value::Object(entity.clone())))
            .await
            .with_context(|| format!("Failed to create {} {}", spec.name, id))?;
        Ok(())
    }

    async fn update(
        &self,
        spec: &EntitySpec,
        id: &str,
        entity: &Entity,
        _prior: &Entity,
    ) -> anyhow::Result<()> {
        self.execute(&Operation::update(
            &spec.route,
            id,
            Value::Object(entity.clone()),
        ))
        .await
        .with_context(|| format!("Failed to update {} {}", spec.name, id))?;
        Ok(())
    }

    async fn delete(
        &self,
        spec: &EntitySpec,
        ids: &[String],
        _priors: &[&Entity],
    ) -> anyhow::Result<()> {
        self.execute(&Operation::delete(&spec.route, ids.to_vec()))
            .await
            .with_context(|| format!("Failed to delete {} {:?}", spec.name, ids))?;
        Ok(())
    }
}

#[async_trait]
impl SchemaStore for DirectusClient {
    async fn snapshot(&self) -> anyhow::Result<Value> {
        Ok(self
            .get_data("/schema/snapshot")
            .await
            .context("Failed to read the schema snapshot")?)
    }

    async fn diff(&self, snapshot: &Value, force: bool) -> anyhow::Result<Option<SchemaDiffEnvelope>> {
        let path = "/schema/diff";
        let data = self
            .request_data(
                Method::POST,
                path,
                &[("force", force.to_string())],
                Some(snapshot),
            )
            .await
            .context("Failed to diff the schema")?;

        if data.is_null() {
            return Ok(None);
        }
        let envelope = serde_json::from_value(data).map_err(|e| ApiError::decode(path, e))?;
        Ok(Some(envelope))
    }

    async fn apply_diff(&self, envelope: &SchemaDiffEnvelope) -> anyhow::Result<()> {
        let diff = serde_json::to_value(envelope).context("Failed to encode the schema diff")?;
        self.execute(&Operation::schema_apply(diff))
            .await
            .context("Failed to apply the schema diff")?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for DirectusClient {
    async fn fetch_settings(&self) -> anyhow::Result<Entity> {
        match self.get_data(SETTINGS_ROUTE).await? {
            Value::Object(settings) => Ok(settings),
            Value::Null => Ok(Entity::new()),
            _ => Err(ApiError::decode(SETTINGS_ROUTE, "expected an object").into()),
        }
    }

    async fn patch_settings(&self, changes: &Entity) -> anyhow::Result<()> {
        self.execute(&Operation::patch_singleton(
            SETTINGS_ROUTE,
            Value::Object(changes.clone()),
        ))
        .await
        .context("Failed to update settings")?;
        Ok(())
    }
}
