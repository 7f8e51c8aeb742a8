//! HTTP API Server
//!
//! Parses needle requests, checks cookies and chunk-manifest ordering, and
//! hands validated mutations to the replication coordinator.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::needle::{ChunkManifest, FileId, Needle, Ttl};
use crate::network::{AuthToken, PeerTransport, ReplicaDirectory, FILENAME_HEADER, PAIR_HEADER_PREFIX};
use crate::replication::{ReplicationCoordinator, ReplicationRequest};
use crate::storage::{VolumeInfo, VolumeStore};

/// Shared application state
pub struct AppState {
    /// Node ID
    pub node_id: String,
    /// Address advertised to clients
    pub public_url: String,
    /// Master directory address
    pub master: String,
    /// Local volumes
    pub store: Arc<dyn VolumeStore>,
    /// Used for chunk lookups when deleting manifests
    pub directory: Arc<dyn ReplicaDirectory>,
    /// Used for chunk deletes when deleting manifests
    pub transport: Arc<dyn PeerTransport>,
    /// Replicated write/delete coordination
    pub coordinator: ReplicationCoordinator,
}

impl AppState {
    pub fn new(
        node_id: String,
        public_url: String,
        master: String,
        store: Arc<dyn VolumeStore>,
        directory: Arc<dyn ReplicaDirectory>,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        let coordinator = ReplicationCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&transport),
        );
        Self {
            node_id,
            public_url,
            master,
            store,
            directory,
            transport,
            coordinator,
        }
    }
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router
    fn create_router(state: Arc<AppState>, config: &ApiConfig) -> Router {
        let router = Router::new()
            .route("/status", get(handle_status))
            .route("/health", get(handle_health))
            .route(
                "/:fid",
                get(handle_read)
                    .post(handle_write)
                    .put(handle_write)
                    .delete(handle_delete),
            )
            .layer(DefaultBodyLimit::max(config.file_size_limit()))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        if config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Start the HTTP server, returning once ctrl-c is received
    pub async fn start(&self) -> Result<()> {
        let app = Self::create_router(Arc::clone(&self.state), &self.config);

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("Volume server listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutdown signal received");
            })
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Query parameters shared by needle endpoints
#[derive(Debug, Default, Deserialize)]
pub struct NeedleQuery {
    /// `replicate` marks a request forwarded by another replica
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub ttl: Option<String>,
    /// Last-modified override, unix seconds; ignored unless numeric
    pub ts: Option<String>,
    /// Chunk manifest flag
    pub cm: Option<bool>,
    /// Authorization token, when not sent as a header
    pub jwt: Option<String>,
}

impl NeedleQuery {
    fn is_forwarded_hop(&self) -> bool {
        self.kind.as_deref() == Some("replicate")
    }

    /// `ts` when it parses, the current time otherwise
    fn last_modified(&self) -> u64 {
        self.ts
            .as_deref()
            .and_then(|ts| ts.parse().ok())
            .unwrap_or_else(unix_now)
    }
}

/// Upload response
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub size: u64,
    #[serde(rename = "eTag")]
    pub e_tag: String,
}

/// Delete response
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub size: u64,
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub public_url: String,
    pub version: String,
    pub volumes: Vec<VolumeInfo>,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub node_id: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn error_response(status: StatusCode, code: &str, error: impl std::fmt::Display) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Authorization token from `Authorization: Bearer ...` or the `jwt` query parameter
fn auth_token(headers: &HeaderMap, query: &NeedleQuery) -> Option<AuthToken> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim().to_string())
        });

    from_header
        .or_else(|| query.jwt.clone())
        .filter(|t| !t.is_empty())
        .map(AuthToken::new)
}

/// `x-trace-id` -> `X-Trace-Id`; header maps only keep the lowercase form
fn canonical_header_key(key: &str) -> String {
    key.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Build a needle from an upload
fn needle_from_request(fid: &FileId, query: &NeedleQuery, headers: &HeaderMap, body: Bytes) -> Result<Needle> {
    let mut needle = Needle::new(fid.key, fid.cookie, body);

    needle.mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    needle.gzipped = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);
    needle.name = headers
        .get(FILENAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let prefix = PAIR_HEADER_PREFIX.to_ascii_lowercase();
    for (name, value) in headers {
        if let Some(key) = name.as_str().strip_prefix(prefix.as_str()) {
            if let Ok(value) = value.to_str() {
                needle.pairs.insert(canonical_header_key(key), value.to_string());
            }
        }
    }

    needle.ttl = match &query.ttl {
        Some(ttl) => ttl.parse::<Ttl>()?,
        None => Ttl::EMPTY,
    };
    needle.last_modified = query.last_modified();
    needle.chunk_manifest = query.cm.unwrap_or(false);

    Ok(needle)
}

// ============ Handlers ============

async fn handle_write(
    State(state): State<Arc<AppState>>,
    Path(fid): Path<String>,
    Query(query): Query<NeedleQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let file_id: FileId = match fid.parse() {
        Ok(f) => f,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "BAD_FILE_ID", e),
    };

    let needle = match needle_from_request(&file_id, &query, &headers, body) {
        Ok(n) => n,
        Err(e) if e.is_client_error() => return error_response(StatusCode::BAD_REQUEST, "BAD_REQUEST", e),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "WRITE_FAILED", e),
    };
    tracing::debug!("Upload {} ({} bytes, forwarded={})", file_id, needle.size(), query.is_forwarded_hop());
    let name = needle.name.clone();
    let size = needle.size();
    let etag = needle.etag();

    let request = ReplicationRequest {
        volume_id: file_id.volume_id,
        needle,
        forwarded_hop: query.is_forwarded_hop(),
        auth: auth_token(&headers, &query),
    };

    match state.coordinator.write_replicated(&state.master, request).await {
        // 304 does not allow a body
        Ok(outcome) if outcome.is_unchanged => StatusCode::NOT_MODIFIED.into_response(),
        Ok(_) => (
            StatusCode::CREATED,
            [(header::ETAG, format!("\"{}\"", etag))],
            Json(UploadResponse { name, size, e_tag: etag }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Write of {} failed: {}", file_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "WRITE_FAILED", e)
        }
    }
}

async fn handle_delete(
    State(state): State<Arc<AppState>>,
    Path(fid): Path<String>,
    Query(query): Query<NeedleQuery>,
    headers: HeaderMap,
) -> Response {
    let file_id: FileId = match fid.parse() {
        Ok(f) => f,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "BAD_FILE_ID", e),
    };

    let mut needle = match state.store.read_needle(file_id.volume_id, file_id.key).await {
        Ok(n) => n,
        Err(_) => return (StatusCode::NOT_FOUND, Json(DeleteResponse { size: 0 })).into_response(),
    };

    if needle.cookie != file_id.cookie {
        tracing::warn!("Delete of {} with unmatching cookie", file_id);
        return error_response(
            StatusCode::BAD_REQUEST,
            "COOKIE_MISMATCH",
            "File Random Cookie does not match.",
        );
    }

    let forwarded_hop = query.is_forwarded_hop();
    tracing::debug!("Delete {} (forwarded={})", file_id, forwarded_hop);
    let auth = auth_token(&headers, &query);
    let mut count = needle.size();

    // Chunks go first; the originating node already removed them for a forwarded hop
    if needle.chunk_manifest && !forwarded_hop {
        let manifest = match ChunkManifest::load(&needle.data, needle.gzipped) {
            Ok(m) => m,
            Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "BAD_MANIFEST", e),
        };
        if let Err(e) = manifest
            .delete_chunks(
                &state.master,
                state.directory.as_ref(),
                state.transport.as_ref(),
                auth.as_ref(),
            )
            .await
        {
            tracing::error!("Deleting chunks of {} failed: {}", file_id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "CHUNK_DELETE_FAILED", e);
        }
        count = manifest.size;
    }

    needle.last_modified = query.last_modified();

    let request = ReplicationRequest {
        volume_id: file_id.volume_id,
        needle,
        forwarded_hop,
        auth,
    };

    match state.coordinator.delete_replicated(&state.master, request).await {
        Ok(_) => (StatusCode::ACCEPTED, Json(DeleteResponse { size: count })).into_response(),
        Err(e) => {
            tracing::error!("Delete of {} failed: {}", file_id, e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "DELETE_FAILED",
                format!("Deletion Failed: {}", e),
            )
        }
    }
}

async fn handle_read(
    State(state): State<Arc<AppState>>,
    Path(fid): Path<String>,
    headers: HeaderMap,
) -> Response {
    let file_id: FileId = match fid.parse() {
        Ok(f) => f,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "BAD_FILE_ID", e),
    };

    let needle = match state.store.read_needle(file_id.volume_id, file_id.key).await {
        Ok(n) if n.cookie == file_id.cookie => n,
        Ok(_) => {
            tracing::warn!("Read of {} with unmatching cookie", file_id);
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) if e.is_not_found() => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "READ_FAILED", e),
    };

    let etag = format!("\"{}\"", needle.etag());
    let if_none_match = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok());
    if if_none_match == Some(etag.as_str()) {
        return StatusCode::NOT_MODIFIED.into_response();
    }

    let mut response = Response::builder().status(StatusCode::OK).header(header::ETAG, etag);
    if let Some(mime) = &needle.mime {
        response = response.header(header::CONTENT_TYPE, mime.as_str());
    }
    if needle.gzipped {
        response = response.header(header::CONTENT_ENCODING, "gzip");
    }
    response
        .body(Body::from(needle.data))
        .unwrap_or_else(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, "READ_FAILED", e))
}

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatusResponse {
        node_id: state.node_id.clone(),
        public_url: state.public_url.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        volumes: state.store.volumes().await,
    })
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        node_id: state.node_id.clone(),
    })
}
