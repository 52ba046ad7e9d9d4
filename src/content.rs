use std::fmt;
use std::str::FromStr;

use crate::error::StreamError;

/// A playable item on the platform.
///
/// Live linear feeds and addressable content (VOD, session recordings) are
/// requested with different payloads, so the kind is fixed when the identifier
/// is parsed rather than re-inspected at every call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentId {
  Channel(String),
  Asset(String),
}

impl ContentId {
  /// The raw identifier as sent to the platform.
  pub fn as_str(&self) -> &str {
    match self {
      ContentId::Channel(id) | ContentId::Asset(id) => id,
    }
  }

  pub fn is_channel(&self) -> bool {
    matches!(self, ContentId::Channel(_))
  }
}

/// Whether a path-like identifier points at a channel.
/// e.g. `/channels/bbc-one`, `channel/42`
fn is_channel_path(id: &str) -> bool {
  id.split(['/', '?', '#']).any(|segment| matches!(segment, "channel" | "channels"))
}

impl FromStr for ContentId {
  type Err = StreamError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let id = s.trim();
    if id.is_empty() {
      return Err(StreamError::InvalidContentId);
    }
    if is_channel_path(id) { Ok(ContentId::Channel(id.to_string())) } else { Ok(ContentId::Asset(id.to_string())) }
  }
}

impl fmt::Display for ContentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn channel_paths() {
    assert_eq!("/channels/bbc-one".parse::<ContentId>().unwrap(), ContentId::Channel("/channels/bbc-one".into()));
    assert_eq!("channel/42".parse::<ContentId>().unwrap(), ContentId::Channel("channel/42".into()));
    assert!("/api/channels/7/".parse::<ContentId>().unwrap().is_channel());
  }

  #[test]
  fn asset_paths() {
    assert_eq!("/assets/9a8b7c".parse::<ContentId>().unwrap(), ContentId::Asset("/assets/9a8b7c".into()));
    assert!(!"/recordings/2024/channel-news".parse::<ContentId>().unwrap().is_channel());
    assert!(!"plain-id".parse::<ContentId>().unwrap().is_channel());
  }

  #[test]
  fn surrounding_whitespace_is_trimmed() {
    let id: ContentId = "  /assets/1 \n".parse().unwrap();
    assert_eq!(id.as_str(), "/assets/1");
    assert_eq!(id.to_string(), "/assets/1");
  }

  #[test]
  fn empty_is_rejected() {
    assert!(matches!("".parse::<ContentId>(), Err(StreamError::InvalidContentId)));
    assert!(matches!("   ".parse::<ContentId>(), Err(StreamError::InvalidContentId)));
  }
}
