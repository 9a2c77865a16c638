use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::Stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Bytes, Frame, Incoming};
use hyper::header::{HeaderValue, ALLOW, CACHE_CONTROL, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::{format_prometheus, format_worker_prometheus};
use crate::{ClientFeed, Hub, IngestWorker, SimError};

type Body = UnsyncBoxBody<Bytes, Infallible>;

/// Largest accepted ingest request body.
const MAX_INGEST_BODY: usize = 8 * 1024 * 1024;

/// Routes served by [`serve_http`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Path of the Server-Sent Events stream (e.g., "/events")
    pub events_path: String,
    /// Path of the Prometheus endpoint (e.g., "/metrics")
    pub metrics_path: String,
    /// Path accepting event batches (e.g., "/ingest")
    pub ingest_path: String,
    /// Optional namespace prefix for all Prometheus metrics
    pub namespace: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            events_path: "/events".to_string(),
            metrics_path: "/metrics".to_string(),
            ingest_path: "/ingest".to_string(),
            namespace: None,
        }
    }
}

impl HttpConfig {
    pub fn builder() -> HttpConfigBuilder {
        HttpConfigBuilder::default()
    }
}

/// Builder for [`HttpConfig`].
#[derive(Debug, Default)]
pub struct HttpConfigBuilder {
    events_path: Option<String>,
    metrics_path: Option<String>,
    ingest_path: Option<String>,
    namespace: Option<String>,
}

impl HttpConfigBuilder {
    pub fn events_path(mut self, path: impl Into<String>) -> Self {
        self.events_path = Some(path.into());
        self
    }

    pub fn metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = Some(path.into());
        self
    }

    pub fn ingest_path(mut self, path: impl Into<String>) -> Self {
        self.ingest_path = Some(path.into());
        self
    }

    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    pub fn build(self) -> HttpConfig {
        let defaults = HttpConfig::default();
        HttpConfig {
            events_path: self.events_path.unwrap_or(defaults.events_path),
            metrics_path: self.metrics_path.unwrap_or(defaults.metrics_path),
            ingest_path: self.ingest_path.unwrap_or(defaults.ingest_path),
            namespace: self.namespace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Route {
    Events,
    Metrics,
    Health,
    Ingest,
}

impl Route {
    fn find(path: &str, config: &HttpConfig) -> Option<Self> {
        if path == config.events_path {
            Some(Route::Events)
        } else if path == config.metrics_path {
            Some(Route::Metrics)
        } else if path == config.ingest_path {
            Some(Route::Ingest)
        } else if path == "/health" || path == "/healthz" {
            Some(Route::Health)
        } else {
            None
        }
    }

    /// Value of the `Allow` header.
    fn allow(self) -> &'static str {
        match self {
            Route::Events => "GET",
            Route::Metrics | Route::Health => "GET, HEAD",
            Route::Ingest => "POST",
        }
    }

    fn allows(self, method: &Method) -> bool {
        match self {
            Route::Events => method == Method::GET,
            Route::Metrics | Route::Health => method == Method::GET || method == Method::HEAD,
            Route::Ingest => method == Method::POST,
        }
    }
}

/// Serve the hub over HTTP/1.
///
/// | Route | Response |
/// |---|---|
/// | `GET {events_path}` | `text/event-stream`, one `data:` event per message |
/// | `GET`/`HEAD {metrics_path}` | Prometheus text exposition, hub and ingest counters |
/// | `GET`/`HEAD /health`, `/healthz` | JSON status with connection and ingest counts |
/// | `POST {ingest_path}` | JSON [`IngestResponse`](crate::IngestResponse), 400 on a rejected batch |
///
/// Runs until accepting a connection fails.
pub async fn serve_http(
    hub: Arc<Hub>,
    worker: Arc<IngestWorker>,
    listener: TcpListener,
    config: HttpConfig,
) -> Result<(), SimError> {
    if let Ok(addr) = listener.local_addr() {
        info!(
            %addr,
            events = %config.events_path,
            metrics = %config.metrics_path,
            ingest = %config.ingest_path,
            "serving HTTP"
        );
    }
    let config = Arc::new(config);

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let hub = hub.clone();
        let worker = worker.clone();
        let config = config.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let hub = hub.clone();
                let worker = worker.clone();
                let config = config.clone();
                async move { handle_request(req, &hub, &worker, &config, peer).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(%peer, error = %e, "HTTP connection closed with error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    hub: &Arc<Hub>,
    worker: &IngestWorker,
    config: &HttpConfig,
    peer: SocketAddr,
) -> Result<Response<Body>, Infallible> {
    let Some(route) = Route::find(req.uri().path(), config) else {
        return Ok(text(StatusCode::NOT_FOUND, "Not Found"));
    };
    if !route.allows(req.method()) {
        let mut response = text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static(route.allow()));
        return Ok(response);
    }
    let head = req.method() == Method::HEAD;

    let response = match route {
        Route::Events => {
            let feed = hub.connect_client(Some(&peer.to_string()));
            let mut response = Response::new(StreamBody::new(sse_frames(feed)).boxed_unsync());
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            response
        }
        Route::Metrics => {
            let snapshot = hub.latest_snapshot();
            let namespace = config.namespace.as_deref();
            let mut body = format_prometheus(snapshot.as_ref(), &hub.stats(), namespace);
            body.push_str(&format_worker_prometheus(&worker.stats(), namespace));
            let mut response = Response::new(full(body));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            );
            response
        }
        Route::Health => {
            let stats = worker.stats();
            let body = serde_json::json!({
                "status": "healthy",
                "activeConnections": hub.active_connections(),
                "messagesPublished": hub.messages_published(),
                "worker": {
                    "processedCount": stats.processed_count,
                    "failedCount": stats.failed_count,
                    "dlqCount": stats.dlq_count,
                    "successRate": stats.success_rate,
                },
            });
            json(StatusCode::OK, body.to_string())
        }
        Route::Ingest => ingest(req, worker).await,
    };

    if head {
        let (parts, _) = response.into_parts();
        return Ok(Response::from_parts(parts, full(Bytes::new())));
    }
    Ok(response)
}

async fn ingest(req: Request<Incoming>, worker: &IngestWorker) -> Response<Body> {
    let body = match Limited::new(req.into_body(), MAX_INGEST_BODY).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return text(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
        }
        Err(e) => {
            debug!(error = %e, "failed to read ingest body");
            return text(StatusCode::BAD_REQUEST, "Bad Request");
        }
    };

    match worker.ingest_json(&body) {
        Ok(response) => match serde_json::to_string(&response) {
            Ok(body) => json(StatusCode::OK, body),
            Err(e) => {
                warn!(error = %e, "failed to encode ingest response");
                text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        },
        Err(e) => {
            debug!(error = %e, "ingest batch rejected");
            let body = serde_json::json!({ "error": format!("Validation failed: {}", e) });
            json(StatusCode::BAD_REQUEST, body.to_string())
        }
    }
}

/// Turn a client feed into SSE frames. The feed, and with it the client
/// registration, is dropped when hyper drops the body.
fn sse_frames(feed: ClientFeed) -> impl Stream<Item = Result<Frame<Bytes>, Infallible>> + Send {
    futures_util::stream::unfold(feed, |mut feed| async move {
        loop {
            let message = feed.next().await?;
            match serde_json::to_string(&message) {
                Ok(json) => {
                    feed.mark_delivered();
                    let frame = Frame::data(Bytes::from(format!("data: {}\n\n", json)));
                    return Some((Ok(frame), feed));
                }
                Err(e) => warn!(error = %e, kind = message.kind(), "failed to encode message"),
            }
        }
    })
}

fn full(body: impl Into<Bytes>) -> Body {
    Full::new(body.into()).boxed_unsync()
}

fn json(status: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
