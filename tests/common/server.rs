//! Local stand-ins for the catalog, the SAS token service, blob storage and
//! the cluster gateway, served by axum on 127.0.0.1.
//!
//! Blob URLs are path-style (`/<account>/<container>/<blob>`) as served by
//! storage emulators, and blob reads honour `Range: bytes=...` so Parquet
//! readers can fetch footers and column chunks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use serde_json::json;
use tokio::sync::oneshot;

pub const ACCOUNT: &str = "devstoreaccount1";
pub const CONTAINER: &str = "items";
/// Query string the token service hands out; blob requests without it are refused
pub const TOKEN: &str = "sv=2024-05-04&sig=local";

/// What the services know about
#[derive(Default)]
pub struct Fixture {
    /// Collection id and the blob prefix of its `geoparquet-items` asset, if it has one
    pub collections: Vec<(String, Option<String>)>,
    /// Blob names in the `items` container and their contents
    pub blobs: Vec<(String, Vec<u8>)>,
    /// Cluster names known to the gateway and their status
    pub clusters: Vec<(String, String)>,
    /// Blobs per listing page; zero lists everything on one page
    pub page_size: usize,
}

impl Fixture {
    pub fn collection(mut self, id: &str, prefix: Option<&str>) -> Self {
        self.collections.push((id.to_string(), prefix.map(str::to_string)));
        self
    }

    pub fn blob(mut self, name: &str, contents: Vec<u8>) -> Self {
        self.blobs.push((name.to_string(), contents));
        self
    }

    pub fn cluster(mut self, name: &str, status: &str) -> Self {
        self.clusters.push((name.to_string(), status.to_string()));
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

#[derive(Default)]
struct Counters {
    blob_bytes: AtomicU64,
    blob_requests: AtomicU64,
    list_requests: AtomicU64,
    token_requests: AtomicU64,
}

#[derive(Clone)]
struct ServerState {
    base_url: String,
    collections: Arc<HashMap<String, Option<String>>>,
    /// Sorted by name, as blob listings are
    blobs: Arc<Vec<(String, Bytes)>>,
    clusters: Arc<HashMap<String, String>>,
    page_size: usize,
    counters: Arc<Counters>,
}

/// A running set of local services; shut down on drop.
pub struct TestServer {
    base_url: String,
    counters: Arc<Counters>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn start(fixture: Fixture) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let mut blobs: Vec<(String, Bytes)> = fixture
            .blobs
            .into_iter()
            .map(|(name, data)| (name, Bytes::from(data)))
            .collect();
        blobs.sort_by(|a, b| a.0.cmp(&b.0));
        let counters = Arc::new(Counters::default());
        let state = ServerState {
            base_url: base_url.clone(),
            collections: Arc::new(fixture.collections.into_iter().collect()),
            blobs: Arc::new(blobs),
            clusters: Arc::new(fixture.clusters.into_iter().collect()),
            page_size: fixture.page_size,
            counters: counters.clone(),
        };

        let app = Router::new()
            .route("/stac/collections/{id}", get(get_collection))
            .route("/sas/token/{account}/{container}", get(get_token))
            .route(&format!("/{ACCOUNT}/{{container}}"), get(list_blobs))
            .route(&format!("/{ACCOUNT}/{{container}}/{{*blob}}"), get(get_blob))
            .route("/gateway/api/v1/clusters/{name}", get(get_cluster))
            .with_state(state);

        // The blocking HTTP client under test must not run inside a runtime,
        // so the server gets a thread and runtime of its own
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                });
                let _ = server.await;
            });
        });

        Self {
            base_url,
            counters,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// URL of a service root, e.g. `url("stac")`.
    pub fn url(&self, service: &str) -> String {
        format!("{}/{}", self.base_url, service)
    }

    /// Body bytes sent for blob reads, listings excluded.
    pub fn blob_bytes(&self) -> u64 {
        self.counters.blob_bytes.load(Ordering::SeqCst)
    }

    pub fn blob_requests(&self) -> u64 {
        self.counters.blob_requests.load(Ordering::SeqCst)
    }

    pub fn list_requests(&self) -> u64 {
        self.counters.list_requests.load(Ordering::SeqCst)
    }

    pub fn token_requests(&self) -> u64 {
        self.counters.token_requests.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn get_collection(State(state): State<ServerState>, Path(id): Path<String>) -> Response {
    let Some(prefix) = state.collections.get(&id) else {
        return (StatusCode::NOT_FOUND, "collection not found").into_response();
    };
    let mut assets = json!({
        "thumbnail": {"href": format!("{}/thumb.png", state.base_url), "type": "image/png"}
    });
    if let Some(prefix) = prefix {
        assets["geoparquet-items"] = json!({
            "href": format!("{}/{ACCOUNT}/{CONTAINER}/{prefix}", state.base_url),
            "type": "application/x-parquet",
            "roles": ["stac-items"]
        });
    }
    axum::Json(json!({
        "type": "Collection",
        "id": id,
        "title": "Local test items",
        "description": "Served from a fixture",
        "assets": assets
    }))
    .into_response()
}

async fn get_token(
    State(state): State<ServerState>,
    Path((account, container)): Path<(String, String)>,
) -> Response {
    state.counters.token_requests.fetch_add(1, Ordering::SeqCst);
    if account != ACCOUNT || container != CONTAINER {
        return StatusCode::FORBIDDEN.into_response();
    }
    axum::Json(json!({"token": TOKEN, "msft:expiry": "2099-01-01T00:00:00Z"})).into_response()
}

fn signed(query: &HashMap<String, String>) -> bool {
    query.get("sig").map(String::as_str) == Some("local")
}

async fn list_blobs(
    State(state): State<ServerState>,
    Path(container): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.counters.list_requests.fetch_add(1, Ordering::SeqCst);
    if !signed(&query) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if container != CONTAINER
        || query.get("restype").map(String::as_str) != Some("container")
        || query.get("comp").map(String::as_str) != Some("list")
    {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let prefix = query.get("prefix").cloned().unwrap_or_default();
    let matching: Vec<&(String, Bytes)> = state
        .blobs
        .iter()
        .filter(|(name, _)| name.starts_with(&prefix))
        .collect();
    // Markers are offsets into the matching listing
    let start: usize = match query.get("marker") {
        Some(marker) => match marker.parse() {
            Ok(offset) => offset,
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        },
        None => 0,
    };
    let page_size = if state.page_size == 0 {
        matching.len().max(1)
    } else {
        state.page_size
    };
    let end = (start + page_size).min(matching.len());

    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str(&format!(
        r#"<EnumerationResults ContainerName="{container}"><Prefix>{prefix}</Prefix><Blobs>"#
    ));
    for (name, data) in matching.get(start..end).unwrap_or_default() {
        xml.push_str(&format!(
            "<Blob><Name>{name}</Name><Properties>\
             <Content-Length>{}</Content-Length>\
             <Content-Type>application/octet-stream</Content-Type>\
             </Properties></Blob>",
            data.len()
        ));
    }
    xml.push_str("</Blobs>");
    if end < matching.len() {
        xml.push_str(&format!("<NextMarker>{end}</NextMarker>"));
    } else {
        xml.push_str("<NextMarker />");
    }
    xml.push_str("</EnumerationResults>");
    ([(header::CONTENT_TYPE, "application/xml")], xml).into_response()
}

async fn get_blob(
    State(state): State<ServerState>,
    Path((container, blob)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.counters.blob_requests.fetch_add(1, Ordering::SeqCst);
    if !signed(&query) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let found = state
        .blobs
        .iter()
        .find(|(name, _)| container == CONTAINER && *name == blob);
    let Some((_, data)) = found else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let size = data.len() as u64;

    let range = match parse_range(headers.get(header::RANGE), size) {
        Ok(range) => range,
        Err(status) => return status.into_response(),
    };
    let mut out = HeaderMap::new();
    out.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    match range {
        Some((start, end_inclusive)) => {
            let body = data.slice(start as usize..=end_inclusive as usize);
            state
                .counters
                .blob_bytes
                .fetch_add(body.len() as u64, Ordering::SeqCst);
            let content_range = format!("bytes {start}-{end_inclusive}/{size}");
            out.insert(
                header::CONTENT_RANGE,
                HeaderValue::from_str(&content_range).unwrap(),
            );
            (StatusCode::PARTIAL_CONTENT, out, body).into_response()
        }
        None => {
            state.counters.blob_bytes.fetch_add(size, Ordering::SeqCst);
            (StatusCode::OK, out, data.clone()).into_response()
        }
    }
}

/// `bytes=start-end` and `bytes=start-` as inclusive offsets.
fn parse_range(range: Option<&HeaderValue>, size: u64) -> Result<Option<(u64, u64)>, StatusCode> {
    let Some(value) = range else {
        return Ok(None);
    };
    let spec = value
        .to_str()
        .ok()
        .and_then(|s| s.strip_prefix("bytes="))
        .ok_or(StatusCode::BAD_REQUEST)?;
    let (start, end) = spec.split_once('-').ok_or(StatusCode::BAD_REQUEST)?;
    let start: u64 = start.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let end_inclusive: u64 = if end.is_empty() {
        size.saturating_sub(1)
    } else {
        end.parse().map_err(|_| StatusCode::BAD_REQUEST)?
    };
    let end_inclusive = end_inclusive.min(size.saturating_sub(1));
    if start >= size || end_inclusive < start {
        return Err(StatusCode::RANGE_NOT_SATISFIABLE);
    }
    Ok(Some((start, end_inclusive)))
}

async fn get_cluster(State(state): State<ServerState>, Path(name): Path<String>) -> Response {
    match state.clusters.get(&name) {
        Some(status) => axum::Json(json!({
            "name": name,
            "status": status,
            "dashboard_route": format!("/clusters/{name}/status")
        }))
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
