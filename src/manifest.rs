//! HLS manifest rewriting.
//!
//! Captured playlists reference media relative to the manifest's own location
//! and sometimes point at regional CDN edges that only accept requests carrying
//! the platform's session cookies. Patching makes every reference absolute and
//! moves edge hosts onto the public delivery host so a player can fetch them
//! with no further context.

use regex::{NoExpand, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

use crate::constants::constants;

/// Short-form media lines the packager emits without any path.
const MEDIA_PREFIXES: [&str; 2] = ["layer", "clip"];

/// A quoted sub-playlist reference inside a directive, e.g. `URI="sub.m3u8"`.
static QUOTED_PLAYLIST: LazyLock<Regex> = LazyLock::new(|| {
  // Safety: literal pattern, checked by the tests below.
  Regex::new(r#""([^"]*m3u8)""#).expect("quoted playlist pattern must compile")
});

static CDN_HOST: LazyLock<Regex> = LazyLock::new(|| {
  // Safety: the pattern comes from the embedded constants.ron, covered by tests.
  Regex::new(&constants().cdn_host_pattern).expect("cdn_host_pattern in constants.ron must be a valid regex")
});

/// The directory of `source_url`: everything up to and including the last `/`
/// of the URL with its query and fragment removed.
pub fn manifest_base(source_url: &str) -> &str {
  let end = source_url.find(['?', '#']).unwrap_or(source_url.len());
  let without_query = &source_url[..end];
  match without_query.rfind('/') {
    Some(idx) => &without_query[..=idx],
    None => "",
  }
}

fn absolutize<'a>(line: &'a str, base: &str) -> Cow<'a, str> {
  if line.contains("https") {
    return Cow::Borrowed(line);
  }

  if MEDIA_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
    return Cow::Owned(format!("{base}{line}"));
  }

  let Some(reference) = QUOTED_PLAYLIST.captures(line).and_then(|caps| caps.get(1)) else {
    return Cow::Borrowed(line);
  };
  // Already absolute against a plain-http base; leave it so patching stays idempotent.
  if reference.as_str().contains("://") {
    return Cow::Borrowed(line);
  }

  let mut patched = String::with_capacity(line.len() + base.len());
  patched.push_str(&line[..reference.start()]);
  patched.push_str(base);
  patched.push_str(&line[reference.start()..]);
  Cow::Owned(patched)
}

fn remap_host(line: &str) -> Cow<'_, str> {
  CDN_HOST.replace_all(line, NoExpand(&constants().canonical_host))
}

/// Rewrite manifest lines against the URL they were fetched from.
///
/// Order and count of lines are preserved, and `patch(patch(m, u), u) == patch(m, u)`.
pub fn patch<S: AsRef<str>>(lines: &[S], source_url: &str) -> Vec<String> {
  let base = manifest_base(source_url);
  lines.iter().map(|line| remap_host(&absolutize(line.as_ref(), base)).into_owned()).collect()
}

/// [`patch`] over a whole document. A trailing newline on the input is kept.
pub fn patch_document(text: &str, source_url: &str) -> String {
  let lines: Vec<&str> = text.lines().collect();
  let mut out = patch(&lines, source_url).join("\n");
  if text.ends_with('\n') {
    out.push('\n');
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  const SOURCE: &str = "https://cdn.example.com/a/b/manifest.m3u8";

  fn edge_host() -> &'static str {
    "edge-12.live.tvcdn.example"
  }

  // --- manifest_base ---

  #[test]
  fn base_is_directory_of_source() {
    assert_eq!(manifest_base(SOURCE), "https://cdn.example.com/a/b/");
  }

  #[test]
  fn base_ignores_slashes_in_query() {
    assert_eq!(manifest_base("https://cdn.example.com/a/index.m3u8?hdnts=exp=1~acl=/*"), "https://cdn.example.com/a/");
  }

  #[test]
  fn base_without_slash_is_empty() {
    assert_eq!(manifest_base("manifest.m3u8"), "");
  }

  // --- patch ---

  #[test]
  fn media_prefix_lines_are_made_absolute() {
    let out = patch(&["layer0.m3u8", "clip_0001.ts"], SOURCE);
    assert_eq!(out, vec!["https://cdn.example.com/a/b/layer0.m3u8", "https://cdn.example.com/a/b/clip_0001.ts"]);
  }

  #[test]
  fn quoted_sub_playlist_is_rewritten_in_place() {
    let out = patch(&[r#"#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID="aac",URI="sub.m3u8""#], SOURCE);
    assert_eq!(out, vec![r#"#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID="aac",URI="https://cdn.example.com/a/b/sub.m3u8""#]);
  }

  #[test]
  fn absolute_lines_are_untouched() {
    let line = "https://other.example.org/x/seg.ts";
    assert_eq!(patch(&[line], SOURCE), vec![line]);
  }

  #[test]
  fn directives_without_references_pass_through() {
    let lines = ["#EXTM3U", "#EXT-X-VERSION:6", "#EXT-X-TARGETDURATION:4", "#EXTINF:4.000,", ""];
    assert_eq!(patch(&lines, SOURCE), lines);
  }

  #[test]
  fn cdn_host_is_remapped_on_absolute_lines() {
    let line = format!("https://{}/live/seg-1.ts", edge_host());
    let out = patch(&[line], SOURCE);
    assert_eq!(out[0], format!("https://{}/live/seg-1.ts", constants().canonical_host));
  }

  #[test]
  fn cdn_host_is_remapped_after_rewriting() {
    let source = format!("https://{}/ch/7/master.m3u8", edge_host());
    let out = patch(&["layer1.m3u8", r#"#EXT-X-I-FRAME-STREAM-INF:URI="iframe.m3u8""#], &source);
    let canonical = &constants().canonical_host;
    assert_eq!(out[0], format!("https://{canonical}/ch/7/layer1.m3u8"));
    assert_eq!(out[1], format!(r#"#EXT-X-I-FRAME-STREAM-INF:URI="https://{canonical}/ch/7/iframe.m3u8""#));
  }

  #[test]
  fn line_order_and_count_are_preserved() {
    let lines = ["#EXTM3U", "layer0.m3u8", "#EXT-X-ENDLIST", "clip1.ts"];
    let out = patch(&lines, SOURCE);
    assert_eq!(out.len(), lines.len());
    assert_eq!(out[0], "#EXTM3U");
    assert_eq!(out[2], "#EXT-X-ENDLIST");
  }

  fn sample_manifest() -> Vec<String> {
    vec![
      "#EXTM3U".to_string(),
      r#"#EXT-X-MEDIA:TYPE=SUBTITLES,URI="subs/en.m3u8""#.to_string(),
      "#EXT-X-STREAM-INF:BANDWIDTH=2000000".to_string(),
      "layer0.m3u8".to_string(),
      "clip_0001.ts".to_string(),
      format!("https://{}/x/clip_0002.ts", edge_host()),
      "https://other.example.org/clip_0003.ts".to_string(),
      "segment-without-prefix.ts".to_string(),
    ]
  }

  #[test]
  fn patching_is_idempotent() {
    let sources = [
      SOURCE.to_string(),
      "http://plain.example.com/p/index.m3u8".to_string(),
      format!("https://{}/e/m.m3u8", edge_host()),
    ];
    for source in &sources {
      let once = patch(&sample_manifest(), source);
      let twice = patch(&once, source);
      assert_eq!(once, twice, "not idempotent for {source}");
    }
  }

  #[test]
  fn no_cdn_host_survives_patching() {
    let source = format!("https://{}/e/m.m3u8", edge_host());
    let input = sample_manifest();
    let out = patch(&input, &source);
    for (before, after) in input.iter().zip(&out) {
      assert!(!CDN_HOST.is_match(after), "cdn host left in {after}");
      if CDN_HOST.is_match(before) {
        assert!(after.contains(&constants().canonical_host));
      }
    }
  }

  #[test]
  fn fetchable_lines_are_absolute_after_patching() {
    let out = patch(&sample_manifest(), SOURCE);
    assert!(out[1].contains(r#"URI="https://cdn.example.com/a/b/subs/en.m3u8""#));
    assert!(out[3].starts_with("https://"));
    assert!(out[4].starts_with("https://"));
    assert!(out[5].starts_with("https://"));
    assert!(out[6].starts_with("https://"));
  }

  // --- patch_document ---

  #[test]
  fn document_keeps_trailing_newline() {
    let doc = "#EXTM3U\nlayer0.m3u8\n";
    assert_eq!(patch_document(doc, SOURCE), "#EXTM3U\nhttps://cdn.example.com/a/b/layer0.m3u8\n");
  }

  #[test]
  fn document_normalizes_crlf() {
    let doc = "#EXTM3U\r\nclip1.ts";
    assert_eq!(patch_document(doc, SOURCE), "#EXTM3U\nhttps://cdn.example.com/a/b/clip1.ts");
  }
}
