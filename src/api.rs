//! HTTP remote store.
//!
//! Talks to the shop backend's REST API: one route per collection under
//! `{base}/api/{collection}`, authenticated with an API key header. Also
//! serves as the reachability probe through `GET {base}/api/health`.
//!
//! Records that carry an id are created with `PUT {collection}/{id}`, so a
//! create replayed after a lost reply overwrites the first copy instead of
//! adding a second one.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::connectivity::ReachabilityProbe;
use crate::error::{RemoteError, RemoteResult};
use crate::remote::{Collection, OrderBy, RemoteStore};

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout used specifically for the lightweight health check.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

const API_KEY_HEADER: &str = "X-Api-Key";

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the backend base URL:
/// - strip trailing slashes
/// - strip a trailing `/api` segment
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }
    // "/api/" leaves a trailing slash behind
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a [`RemoteError`].
fn transport_error(url: &str, err: &reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        return RemoteError::Timeout;
    }
    if err.is_connect() {
        return RemoteError::Unreachable(format!("cannot reach backend at {url}"));
    }
    if err.is_builder() {
        return RemoteError::Rejected(format!("invalid backend URL: {url}"));
    }
    RemoteError::Unreachable(format!("network error communicating with {url}: {err}"))
}

/// Convert a non-success HTTP status into a [`RemoteError`].
fn status_error(status: StatusCode, collection: Collection, id: Option<&str>, body: &str) -> RemoteError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    let code = status.as_u16();
    match code {
        401 | 403 => RemoteError::Unauthorized(format!("API key refused (HTTP {code})")),
        404 => RemoteError::NotFound {
            collection: collection.name().to_string(),
            id: id.unwrap_or_default().to_string(),
        },
        s if s >= 500 => RemoteError::Rejected(format!("backend server error (HTTP {s}) {detail}")),
        s => RemoteError::Rejected(format!("unexpected response (HTTP {s}) {detail}")),
    }
}

/// Decode a response body, or `Null` for an empty one.
fn parse_body(
    status: StatusCode,
    body: &str,
    collection: Collection,
    id: Option<&str>,
) -> RemoteResult<Value> {
    if !status.is_success() {
        return Err(status_error(status, collection, id, body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body)
        .map_err(|e| RemoteError::InvalidResponse(format!("invalid JSON from backend: {e}")))
}

/// Id of a created document. A conflict on a caller-chosen id means an
/// earlier attempt already landed.
fn created_id(
    status: StatusCode,
    body: &str,
    collection: Collection,
    known_id: Option<&str>,
) -> RemoteResult<String> {
    if status == StatusCode::CONFLICT {
        if let Some(id) = known_id {
            debug!(%collection, id, "Document already exists; create treated as applied");
            return Ok(id.to_string());
        }
    }
    let body = parse_body(status, body, collection, known_id)?;
    body.get("id")
        .and_then(Value::as_str)
        .or(known_id)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::InvalidResponse("create response carries no id".into()))
}

/// Pull a document list out of a list response: a bare array, or an object
/// wrapping one under `items` or `data`.
fn documents(body: Value) -> RemoteResult<Vec<Value>> {
    match body {
        Value::Array(docs) => Ok(docs),
        Value::Object(mut map) => match map.remove("items").or_else(|| map.remove("data")) {
            Some(Value::Array(docs)) => Ok(docs),
            _ => Err(RemoteError::InvalidResponse("list response has no document array".into())),
        },
        Value::Null => Ok(Vec::new()),
        other => Err(RemoteError::InvalidResponse(format!("unexpected list body: {other}"))),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`RemoteStore`] over the backend REST API.
pub struct HttpRemoteStore {
    base: String,
    api_key: Zeroizing<String>,
    client: Client,
}

impl std::fmt::Debug for HttpRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteStore")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, api_key: Zeroizing<String>) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Rejected(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            base: normalize_base_url(base_url),
            api_key,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, collection: Collection, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/api/{}/{}", self.base, collection, id),
            None => format!("{}/api/{}", self.base, collection),
        }
    }

    /// `PUT` to the document route when the record names its id, `POST` to
    /// the collection otherwise.
    fn create_route(&self, collection: Collection, known_id: Option<&str>) -> (Method, String) {
        match known_id {
            Some(id) => (Method::PUT, self.url(collection, Some(id))),
            None => (Method::POST, self.url(collection, None)),
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .header("Content-Type", "application/json")
    }

    /// Send and return the status with the raw body.
    async fn send_raw(&self, req: RequestBuilder) -> RemoteResult<(StatusCode, String)> {
        let resp = req.send().await.map_err(|e| transport_error(&self.base, &e))?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        Ok((status, body_text))
    }

    /// Send and return the JSON body, or `Null` for an empty response.
    async fn send(
        &self,
        req: RequestBuilder,
        collection: Collection,
        id: Option<&str>,
    ) -> RemoteResult<Value> {
        let (status, body) = self.send_raw(req).await?;
        parse_body(status, &body, collection, id)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn create(&self, collection: Collection, record: &Value) -> RemoteResult<String> {
        let known_id = record.get("id").and_then(Value::as_str);
        let (method, url) = self.create_route(collection, known_id);
        let (status, body) = self.send_raw(self.request(method, &url).json(record)).await?;
        created_id(status, &body, collection, known_id)
    }

    async fn update(&self, collection: Collection, id: &str, partial: &Value) -> RemoteResult<()> {
        let url = self.url(collection, Some(id));
        self.send(self.request(Method::PATCH, &url).json(partial), collection, Some(id))
            .await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> RemoteResult<()> {
        let url = self.url(collection, Some(id));
        match self
            .send(self.request(Method::DELETE, &url), collection, Some(id))
            .await
        {
            Ok(_) => Ok(()),
            Err(RemoteError::NotFound { .. }) => {
                debug!(%collection, id, "Delete of absent document treated as success");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn list(
        &self,
        collection: Collection,
        order_by: Option<OrderBy<'_>>,
    ) -> RemoteResult<Vec<Value>> {
        let url = self.url(collection, None);
        let mut req = self.request(Method::GET, &url);
        if let Some(order) = order_by {
            let direction = if order.descending { "desc" } else { "asc" };
            req = req.query(&[("orderBy", order.field), ("direction", direction)]);
        }
        documents(self.send(req, collection, None).await?)
    }
}

#[async_trait]
impl ReachabilityProbe for HttpRemoteStore {
    async fn is_reachable(&self) -> bool {
        let health_url = format!("{}/api/health", self.base);
        let start = Instant::now();
        let result = self
            .request(Method::GET, &health_url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(latency_ms = start.elapsed().as_millis() as u64, "health check passed");
                true
            }
            Ok(resp) => {
                warn!(status = resp.status().as_u16(), "health check failed");
                false
            }
            Err(e) => {
                debug!("health check failed: {}", transport_error(&self.base, &e));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("shop.example.com/"), "https://shop.example.com");
        assert_eq!(normalize_base_url("localhost:3000/api/"), "http://localhost:3000");
        assert_eq!(
            normalize_base_url(" https://shop.example.com/api "),
            "https://shop.example.com"
        );
    }

    #[test]
    fn test_routes_per_collection() {
        let store = HttpRemoteStore::new("localhost:3000", Zeroizing::new("k".into())).unwrap();
        assert_eq!(
            store.url(Collection::Orders, Some("o1")),
            "http://localhost:3000/api/orders/o1"
        );
        assert_eq!(
            store.url(Collection::Settings, None),
            "http://localhost:3000/api/settings"
        );
    }

    #[test]
    fn test_create_puts_by_caller_id() {
        let store = HttpRemoteStore::new("localhost:3000", Zeroizing::new("k".into())).unwrap();
        assert_eq!(
            store.create_route(Collection::Orders, Some("o1")),
            (Method::PUT, "http://localhost:3000/api/orders/o1".to_string())
        );
        assert_eq!(
            store.create_route(Collection::Clients, None),
            (Method::POST, "http://localhost:3000/api/clients".to_string())
        );
    }

    #[test]
    fn test_created_id_outcomes() {
        let orders = Collection::Orders;
        assert_eq!(
            created_id(StatusCode::CONFLICT, "exists", orders, Some("o1")).unwrap(),
            "o1"
        );
        assert!(matches!(
            created_id(StatusCode::CONFLICT, "exists", orders, None),
            Err(RemoteError::Rejected(_))
        ));
        assert_eq!(
            created_id(StatusCode::CREATED, r#"{"id":"srv-7"}"#, orders, Some("o1")).unwrap(),
            "srv-7"
        );
        assert_eq!(created_id(StatusCode::OK, "", orders, Some("o1")).unwrap(), "o1");
        assert!(matches!(
            created_id(StatusCode::OK, "", orders, None),
            Err(RemoteError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_status_mapping() {
        let not_found = status_error(StatusCode::NOT_FOUND, Collection::Orders, Some("o1"), "");
        assert_eq!(
            not_found,
            RemoteError::NotFound {
                collection: "orders".into(),
                id: "o1".into()
            }
        );
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, Collection::Orders, None, ""),
            RemoteError::Unauthorized(_)
        ));
        let server = status_error(
            StatusCode::BAD_GATEWAY,
            Collection::Clients,
            None,
            r#"{"error":"upstream down"}"#,
        );
        assert!(server.is_retryable());
        assert!(server.to_string().contains("upstream down"));
    }

    #[test]
    fn test_list_body_shapes() {
        assert_eq!(documents(json!([{ "id": "a" }])).unwrap().len(), 1);
        assert_eq!(documents(json!({ "items": [{ "id": "a" }, { "id": "b" }] })).unwrap().len(), 2);
        assert!(documents(Value::Null).unwrap().is_empty());
        assert!(matches!(
            documents(json!({ "count": 3 })),
            Err(RemoteError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        let store = HttpRemoteStore::new("http://127.0.0.1:9", Zeroizing::new("k".into())).unwrap();
        assert!(!store.is_reachable().await);
        let err = store.delete(Collection::Orders, "o1").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
