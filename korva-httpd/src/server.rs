//! HTTP Origin Server (component C): a process-wide singleton that hosts
//! leased files under `/item/<id>`, with peer scoping, byte ranges, and
//! `contentFeatures.dlna.org` signalling.
//!
//! Grounded on `pmoserver::Server`'s bind/`axum::serve`/ctrl-c shape and on
//! `pmocache::pmoserver_ext`'s `Path`/`State`/`Response` handler idiom,
//! narrowed to the single `/item/<id>` route the spec defines.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use crate::lease::{Lease, LeaseRegistry};
use crate::metadata::MetadataRecord;
use crate::range::{parse_range, RangeOutcome};
use korva_errors::KorvaError;

const DLNA_FEATURES_HEADER: &str = "getContentFeatures.dlna.org";
const DLNA_RESPONSE_HEADER: &str = "contentFeatures.dlna.org";
const UPLOAD_CHUNK_LIMIT: usize = 64 * 1024;
const UPLOAD_MAX_BYTES: usize = 1024 * 1024 * 1024;

/// The singleton HTTP Origin Server. `Arc<OriginServer>` is handed to the
/// Push Coordinator so only one instance ever binds a port per process
/// (spec §9 "Singletons").
pub struct OriginServer {
    leases: Arc<LeaseRegistry>,
    port: u16,
}

impl OriginServer {
    /// Binds an ephemeral TCP port on all interfaces and starts serving in
    /// the background. Fails with `KorvaError::NoServer` if the bind fails.
    pub async fn start() -> Result<Arc<Self>, KorvaError> {
        let leases = Arc::new(LeaseRegistry::new());
        let addr = SocketAddr::from(([0, 0, 0, 0], 0));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| KorvaError::NoServer(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| KorvaError::NoServer(e.to_string()))?
            .port();

        let router = item_router(leases.clone());

        info!(port, "HTTP origin server listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                error!("origin server exited: {}", e);
            }
        });

        Ok(Arc::new(Self { leases, port }))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host_file` (spec §4.D). Resolves metadata once, on creation only.
    pub async fn host_file(
        &self,
        file: PathBuf,
        meta_if_new: MetadataRecord,
        local_iface: IpAddr,
        peer_ip: IpAddr,
    ) -> (Arc<Lease>, String) {
        let lease = self
            .leases
            .host_file(file, || meta_if_new, peer_ip)
            .await;
        let url = format!("http://{}:{}/item/{}", local_iface, self.port, lease.id);
        (lease, url)
    }

    pub async fn unhost_for_peer(&self, file: &PathBuf, peer_ip: IpAddr) {
        self.leases.unhost_for_peer(file, peer_ip).await;
    }

    pub async fn idle(&self) -> bool {
        self.leases.idle().await
    }
}

fn item_router(leases: Arc<LeaseRegistry>) -> Router {
    Router::new()
        .route("/item/{id}", any(handle_item))
        .with_state(leases)
}

async fn handle_item(
    State(leases): State<Arc<LeaseRegistry>>,
    Path(id): Path<String>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if !matches!(method, Method::GET | Method::HEAD | Method::POST) {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let lease = match leases.by_id(&id).await {
        Some(l) => l,
        None => return StatusCode::NOT_FOUND.into_response(),
    };

    let peer = remote.ip();
    if !lease.has_peer(peer).await {
        return StatusCode::NOT_FOUND.into_response();
    }

    if method == Method::POST {
        return upload(lease, body).await;
    }

    download(lease, &headers, method == Method::HEAD).await
}

async fn download(lease: Arc<Lease>, headers: &HeaderMap, head_only: bool) -> Response {
    lease.begin_request().await;
    let response = download_inner(&lease, headers, head_only).await;
    lease.end_request().await;
    response
}

async fn download_inner(lease: &Lease, headers: &HeaderMap, head_only: bool) -> Response {
    let size = lease.meta.size.unwrap_or(0);
    let outcome = parse_range(
        headers.get(axum::http::header::RANGE).and_then(|v| v.to_str().ok()),
        size,
    );

    let (start, end, status, content_length) = match outcome {
        RangeOutcome::Full => (0, size.saturating_sub(1), StatusCode::OK, size),
        RangeOutcome::Satisfied(r) => (r.start, r.end, StatusCode::PARTIAL_CONTENT, r.len()),
        RangeOutcome::Unsatisfiable => {
            return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
        }
    };

    let mut builder = Response::builder().status(status);
    if let Some(ct) = lease.meta.content_type.as_deref() {
        builder = builder.header(axum::http::header::CONTENT_TYPE, ct);
    }
    builder = builder
        .header(axum::http::header::CONTENT_LENGTH, content_length)
        .header(axum::http::header::ACCEPT_RANGES, "bytes");
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            axum::http::header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", start, end, size),
        );
    }
    if headers
        .get(DLNA_FEATURES_HEADER)
        .is_some_and(|v| v == "1")
    {
        let features = match lease.meta.dlna_profile.as_deref() {
            Some(profile) => format!(
                "http-get:*:{}:DLNA.ORG_PN={};DLNA.ORG_OP=01",
                lease.meta.content_type.as_deref().unwrap_or("*"),
                profile
            ),
            None => "*".to_string(),
        };
        builder = builder.header(DLNA_RESPONSE_HEADER, features);
    }

    if head_only {
        return builder.body(Body::empty()).unwrap();
    }

    let file = match File::open(&lease.file).await {
        Ok(f) => f,
        Err(e) => {
            warn!("failed to open {}: {}", lease.file.display(), e);
            return StatusCode::NOT_FOUND.into_response();
        }
    };
    let body = match bounded_body(file, start, content_length).await {
        Ok(b) => b,
        Err(e) => {
            warn!("range read failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    builder.body(body).unwrap()
}

async fn bounded_body(mut file: File, start: u64, length: u64) -> std::io::Result<Body> {
    file.seek(std::io::SeekFrom::Start(start)).await?;
    let limited = file.take(length);
    Ok(Body::from_stream(ReaderStream::new(limited)))
}

/// POST upload target (spec §4.C, §9 "Source ambiguity") — kept for
/// conformance since the spec still defines the method on this route, but
/// nothing in Korva drives it; no renderer push path ever issues a POST.
/// `Expect: 100-continue` is handled transparently by the server (it only
/// sends the interim response once this handler starts consuming the
/// body); there is no refusal policy since no caller ever registers an
/// upload-mode lease.
async fn upload(lease: Arc<Lease>, body: Body) -> Response {
    lease.begin_request().await;
    let response = upload_inner(&lease, body).await;
    lease.end_request().await;
    response
}

async fn upload_inner(lease: &Lease, body: Body) -> Response {
    let bytes = match axum::body::to_bytes(body, UPLOAD_MAX_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            warn!("upload body read failed: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let mut file = match File::create(&lease.file).await {
        Ok(f) => f,
        Err(e) => {
            warn!("failed to open {} for upload: {}", lease.file.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    for chunk in bytes.chunks(UPLOAD_CHUNK_LIMIT) {
        if let Err(e) = file.write_all(chunk).await {
            warn!("upload write failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    StatusCode::NO_CONTENT.into_response()
}
