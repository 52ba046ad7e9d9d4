//! Local HLS proxy for origins that gate playback behind session cookies.
//!
//! Media players open a URL and nothing else: they don't replay the cookies the
//! origin hands out on the first manifest request. [`CookieProxy::connect`] does
//! that first request itself with a cookie-aware client. When the origin sets no
//! cookies the direct URL works as is and no server is started. Otherwise the
//! captured manifest is patched and served from `127.0.0.1`, and every other
//! path is forwarded to the origin through the same client and cookie jar.

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use reqwest::Client;
use reqwest::cookie::{CookieStore, Jar};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::constants::constants;
use crate::error::{StreamError, StreamResult};
use crate::manifest;

/// Entry point some players request before anything else.
const INDEX_PATH: &str = "/index.m3u8";

const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Retry budget for a single proxied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  /// Sleep between two consecutive attempts.
  pub delay: Duration,
}

impl RetryPolicy {
  /// 10 attempts, 50ms apart: a failing segment costs the player at most ~0.5s.
  pub const PROXY: RetryPolicy = RetryPolicy { max_attempts: 10, delay: Duration::from_millis(50) };

  /// Upper bound on time spent sleeping between attempts.
  pub fn worst_case_delay(&self) -> Duration {
    self.delay * self.max_attempts.saturating_sub(1)
  }
}

/// Result of probing the origin.
#[derive(Debug)]
pub enum ProxyOutcome {
  /// The origin set no cookies; play the direct URL.
  NotRequired,
  /// Cookies were set; the returned proxy must be started with [`CookieProxy::listen`].
  Required(CookieProxy),
}

/// A captured manifest plus the cookie-bearing client that fetched it.
///
/// Built once per playback attempt and consumed by [`CookieProxy::listen`].
pub struct CookieProxy {
  origin: Url,
  manifest: Bytes,
  http_client: Client,
  retry: RetryPolicy,
}

impl std::fmt::Debug for CookieProxy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CookieProxy")
      .field("origin", &self.origin.origin().ascii_serialization())
      .field("path", &self.origin.path())
      .field("manifest_len", &self.manifest.len())
      .finish()
  }
}

impl CookieProxy {
  /// Fetch `stream_url` once with a fresh cookie jar and decide whether proxying is needed.
  pub async fn connect(stream_url: &str) -> StreamResult<ProxyOutcome> {
    let origin =
      Url::parse(stream_url).map_err(|source| StreamError::MalformedUrl { url: stream_url.to_string(), source })?;

    let jar = Arc::new(Jar::default());
    let http_client =
      Client::builder().cookie_provider(Arc::clone(&jar)).user_agent(constants().user_agent.as_str()).build()?;

    debug!(host = origin.host_str().unwrap_or_default(), "proxy: fetching manifest");
    let response = http_client.get(origin.clone()).send().await?;
    let status = response.status();
    // Counted off the response too: a cookie scoped to another path never shows up in a jar lookup for this URL.
    let set_cookies = response.cookies().count();
    let body = response.bytes().await?;

    if !status.is_success() {
      return Err(StreamError::UpstreamRejected { status, body: String::from_utf8_lossy(&body).into_owned() });
    }

    if set_cookies == 0 && jar.cookies(&origin).is_none() {
      info!(host = origin.host_str().unwrap_or_default(), "proxy: origin set no cookies, not required");
      return Ok(ProxyOutcome::NotRequired);
    }

    let patched = manifest::patch_document(&String::from_utf8_lossy(&body), origin.as_str());
    info!(
      host = origin.host_str().unwrap_or_default(),
      path = origin.path(),
      bytes = patched.len(),
      "proxy: captured manifest"
    );

    Ok(ProxyOutcome::Required(CookieProxy {
      origin,
      manifest: Bytes::from(patched),
      http_client,
      retry: RetryPolicy::PROXY,
    }))
  }

  /// Serve on an ephemeral local port until `cancel` fires.
  ///
  /// Returns the local URL to hand to the player in place of the origin URL.
  pub async fn listen(self, cancel: CancellationToken) -> StreamResult<Url> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.map_err(StreamError::ProxyBind)?;
    let addr = listener.local_addr().map_err(StreamError::ProxyBind)?;
    let local_url = local_url(addr, self.origin.path())?;
    let state_retry = self.retry;

    let state = Arc::new(ProxyState {
      manifest_path: self.origin.path().to_string(),
      origin: self.origin,
      manifest: self.manifest,
      http_client: self.http_client,
      retry: self.retry,
    });
    let app = Router::new().fallback(handle).with_state(state);

    info!(
      %addr,
      max_attempts = state_retry.max_attempts,
      worst_case_ms = state_retry.worst_case_delay().as_millis() as u64,
      "proxy: listening"
    );
    tokio::spawn(async move {
      let shutdown = cancel.cancelled_owned();
      if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!(err = %e, %addr, "proxy: server error");
      }
      info!(%addr, "proxy: closed");
    });

    Ok(local_url)
  }
}

fn local_url(addr: SocketAddr, path: &str) -> StreamResult<Url> {
  let raw = format!("http://{addr}{path}");
  Url::parse(&raw).map_err(|source| StreamError::MalformedUrl { url: raw, source })
}

/// Shared, read-only state behind every request handler.
struct ProxyState {
  origin: Url,
  manifest_path: String,
  manifest: Bytes,
  http_client: Client,
  retry: RetryPolicy,
}

impl ProxyState {
  /// The origin's scheme and authority with the incoming path and query.
  fn upstream_url(&self, uri: &Uri) -> Url {
    let mut target = self.origin.clone();
    target.set_path(uri.path());
    target.set_query(uri.query());
    target.set_fragment(None);
    target
  }
}

async fn handle(State(state): State<Arc<ProxyState>>, method: Method, uri: Uri) -> Response {
  if method != Method::GET && method != Method::HEAD {
    return StatusCode::METHOD_NOT_ALLOWED.into_response();
  }

  let path = uri.path();
  if path == state.manifest_path {
    return ([(header::CONTENT_TYPE, MANIFEST_CONTENT_TYPE)], state.manifest.clone()).into_response();
  }
  if path == INDEX_PATH {
    return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, state.manifest_path.clone())]).into_response();
  }

  forward(&state, &uri).await
}

#[derive(Debug, Error)]
enum FetchFailure {
  #[error("request failed: {0}")]
  Send(#[source] reqwest::Error),
  #[error("upstream status {0}")]
  Status(StatusCode),
  #[error("body read failed: {0}")]
  Body(#[source] reqwest::Error),
}

/// A fully buffered upstream response.
struct Fetched {
  content_type: Option<HeaderValue>,
  body: Bytes,
}

async fn fetch_once(client: &Client, target: &Url) -> Result<Fetched, FetchFailure> {
  let response = client.get(target.clone()).send().await.map_err(FetchFailure::Send)?;
  let status = response.status();
  if status != StatusCode::OK {
    return Err(FetchFailure::Status(status));
  }
  let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
  let body = response.bytes().await.map_err(FetchFailure::Body)?;
  Ok(Fetched { content_type, body })
}

async fn fetch_with_retry(client: &Client, target: &Url, policy: RetryPolicy) -> Option<Fetched> {
  for attempt in 1..=policy.max_attempts {
    match fetch_once(client, target).await {
      Ok(fetched) => return Some(fetched),
      Err(e) => debug!(attempt, err = %e, path = target.path(), "proxy: upstream attempt failed"),
    }
    if attempt < policy.max_attempts {
      tokio::time::sleep(policy.delay).await;
    }
  }
  None
}

async fn forward(state: &ProxyState, uri: &Uri) -> Response {
  let target = state.upstream_url(uri);

  let Some(fetched) = fetch_with_retry(&state.http_client, &target, state.retry).await else {
    warn!(path = target.path(), attempts = state.retry.max_attempts, "proxy: upstream retries exhausted");
    return StatusCode::BAD_GATEWAY.into_response();
  };

  let mut builder = Response::builder().status(StatusCode::OK);
  if let Some(content_type) = fetched.content_type {
    builder = builder.header(header::CONTENT_TYPE, content_type);
  }
  match builder.body(Body::from(fetched.body)) {
    Ok(response) => response,
    Err(e) => {
      error!(err = %e, path = target.path(), "proxy: failed to build client response");
      StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
  }
}
