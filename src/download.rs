//! Persist a stream to disk by remuxing it with ffmpeg.

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

use crate::content::ContentId;

/// File name derived from the last meaningful segment of the identifier.
/// e.g. `/assets/abc-123` → `abc-123.ts`
pub fn default_file_name(id: &ContentId) -> String {
  let raw = id.as_str();
  let path = &raw[..raw.find(['?', '#']).unwrap_or(raw.len())];
  let stem: String = path
    .split('/')
    .rev()
    .find(|segment| !segment.is_empty())
    .unwrap_or_default()
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
    .collect();
  let stem = stem.trim_matches('_');
  if stem.is_empty() { "stream.ts".to_string() } else { format!("{stem}.ts") }
}

/// Where to write: the explicit path, or the default file name inside `dir` (or the working directory).
pub fn output_path(explicit: Option<PathBuf>, dir: Option<&Path>, id: &ContentId) -> PathBuf {
  match (explicit, dir) {
    (Some(path), _) => path,
    (None, Some(dir)) => dir.join(default_file_name(id)),
    (None, None) => PathBuf::from(default_file_name(id)),
  }
}

/// Copy every stream of `url` into `output` without re-encoding.
pub async fn download(url: &Url, output: &Path) -> Result<()> {
  if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
    tokio::fs::create_dir_all(parent).await.context("Failed to create output directory")?;
  }

  info!(url = %url, output = %output.display(), "download: starting ffmpeg");
  let status = tokio::process::Command::new("ffmpeg")
    .args(["-y", "-loglevel", "error", "-stats", "-i", url.as_str(), "-c", "copy"])
    .arg(output)
    .stdin(std::process::Stdio::null())
    .status()
    .await
    .map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!("ffmpeg not found. Install with: brew install ffmpeg (macOS) or apt install ffmpeg (Linux)")
      } else {
        anyhow!("Failed to start ffmpeg: {}", e)
      }
    })?;

  if !status.success() {
    return Err(anyhow!("ffmpeg exited with status {}", status));
  }

  info!(output = %output.display(), "download: complete");
  Ok(())
}
