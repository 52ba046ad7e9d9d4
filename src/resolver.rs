//! Tokenised stream URL resolution against the platform's "start viewing" endpoint.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::constants::constants;
use crate::content::ContentId;
use crate::error::{StreamError, StreamResult};

/// Request body: `{"channel_url": id}` or `{"asset_url": id}`.
#[derive(Debug, Serialize)]
enum ViewingRequest<'a> {
  #[serde(rename = "channel_url")]
  Channel(&'a str),
  #[serde(rename = "asset_url")]
  Asset(&'a str),
}

impl<'a> From<&'a ContentId> for ViewingRequest<'a> {
  fn from(id: &'a ContentId) -> Self {
    match id {
      ContentId::Channel(id) => ViewingRequest::Channel(id),
      ContentId::Asset(id) => ViewingRequest::Asset(id),
    }
  }
}

/// Live channels answer with a flat object.
#[derive(Debug, Deserialize)]
struct ChannelViewing {
  tokenised_url: String,
}

/// Assets answer with a list of matching objects; the first one wins.
#[derive(Debug, Deserialize)]
struct AssetViewing {
  #[serde(default)]
  objects: Vec<AssetObject>,
}

#[derive(Debug, Deserialize)]
struct AssetObject {
  tata: AssetStream,
}

#[derive(Debug, Deserialize)]
struct AssetStream {
  tokenised_url: String,
}

/// Decode the response body in the shape that matches the request kind.
fn extract_tokenised_url(id: &ContentId, body: &[u8]) -> StreamResult<String> {
  let url = match id {
    ContentId::Channel(_) => serde_json::from_slice::<ChannelViewing>(body)?.tokenised_url,
    ContentId::Asset(_) => {
      let viewing = serde_json::from_slice::<AssetViewing>(body)?;
      let first = viewing.objects.into_iter().next().ok_or(StreamError::NoDataReceived)?;
      first.tata.tokenised_url
    }
  };
  Ok(url)
}

/// Parse and re-serialise the extracted URL.
fn canonical_url(raw: &str) -> StreamResult<Url> {
  Url::parse(raw.trim()).map_err(|source| StreamError::MalformedUrl { url: raw.to_string(), source })
}

/// Client for the viewing-start endpoint. One POST per [`Resolver::resolve`], no caching.
#[derive(Debug, Clone)]
pub struct Resolver {
  http_client: Client,
  endpoint: String,
  auth_scheme: String,
}

impl Resolver {
  pub fn new(http_client: Client) -> Self {
    let c = constants();
    Self::with_endpoint(http_client, c.viewing_endpoint.clone())
  }

  pub fn with_endpoint(http_client: Client, endpoint: impl Into<String>) -> Self {
    Self { http_client, endpoint: endpoint.into(), auth_scheme: constants().auth_scheme.clone() }
  }

  pub async fn resolve(&self, id: &ContentId, token: &str) -> StreamResult<Url> {
    debug!(id = %id, channel = id.is_channel(), "resolver: requesting stream");

    let response = self
      .http_client
      .post(&self.endpoint)
      .header(reqwest::header::AUTHORIZATION, format!("{} {}", self.auth_scheme, token))
      .json(&ViewingRequest::from(id))
      .send()
      .await?;

    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
      let body = String::from_utf8_lossy(&body).into_owned();
      warn!(id = %id, %status, "resolver: viewing endpoint rejected request");
      return Err(StreamError::UpstreamRejected { status, body });
    }

    let raw = extract_tokenised_url(id, &body)?;
    let url = canonical_url(&raw)?;
    info!(id = %id, host = url.host_str().unwrap_or_default(), "resolver: got tokenised url");
    Ok(url)
  }
}
