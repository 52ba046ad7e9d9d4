//! Identifier to playable URL: resolve, then proxy if the origin needs cookies.

use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::content::ContentId;
use crate::error::StreamResult;
use crate::proxy::{CookieProxy, ProxyOutcome};
use crate::resolver::Resolver;

/// The URL handed to the player or downloader.
#[derive(Debug, Clone)]
pub struct PlaybackUrl {
  pub url: Url,
  /// Whether `url` points at a local proxy that lives until the token passed to [`open_stream`] is cancelled.
  pub proxied: bool,
}

/// Resolve `id` and, when the origin sets session cookies, start a local proxy for it.
///
/// The proxy (if any) shuts down when `cancel` fires; cancel it once the consumer is done.
pub async fn open_stream(
  resolver: &Resolver,
  id: &ContentId,
  token: &str,
  cancel: CancellationToken,
) -> StreamResult<PlaybackUrl> {
  let origin_url = resolver.resolve(id, token).await?;

  match CookieProxy::connect(origin_url.as_str()).await? {
    ProxyOutcome::NotRequired => {
      info!(id = %id, "stream: playing origin url directly");
      Ok(PlaybackUrl { url: origin_url, proxied: false })
    }
    ProxyOutcome::Required(proxy) => {
      let url = proxy.listen(cancel).await?;
      info!(id = %id, local = %url, "stream: playing through local proxy");
      Ok(PlaybackUrl { url, proxied: true })
    }
  }
}
