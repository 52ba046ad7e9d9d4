//! Errors raised while resolving and delivering a stream.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
  /// The content identifier was empty.
  #[error("content identifier must not be empty")]
  InvalidContentId,

  /// The platform answered with a non-2xx status.
  #[error("upstream rejected the request ({status}): {body}")]
  UpstreamRejected { status: StatusCode, body: String },

  /// A 2xx asset response that carried no objects.
  #[error("no data received from the viewing endpoint")]
  NoDataReceived,

  #[error("malformed stream URL {url:?}: {source}")]
  MalformedUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },

  /// The local proxy could not bind its listener.
  #[error("failed to bind local proxy: {0}")]
  ProxyBind(#[source] std::io::Error),

  /// The viewing endpoint answered 2xx with a body of the wrong shape.
  #[error("unexpected viewing response: {0}")]
  Decode(#[from] serde_json::Error),

  #[error("HTTP request failed: {0}")]
  Http(#[from] reqwest::Error),
}

pub type StreamResult<T> = Result<T, StreamError>;
