//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available —
//! no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

/// Platform endpoints and naming rules that are not user-configurable.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Platform API
  pub viewing_endpoint: String,
  pub auth_scheme: String,
  pub user_agent: String,

  // Manifest host remapping
  pub cdn_host_pattern: String,
  pub canonical_host: String,

  // Consumers
  pub default_player: String,
  pub log_file: String,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert!(c.viewing_endpoint.starts_with("https://"));
    assert!(!c.auth_scheme.is_empty());
    assert!(!c.default_player.is_empty());
  }

  #[test]
  fn canonical_host_does_not_match_cdn_pattern() {
    let c = constants();
    let pattern = regex::Regex::new(&c.cdn_host_pattern).unwrap();
    assert!(!pattern.is_match(&c.canonical_host));
  }
}
