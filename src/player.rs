use anyhow::{Context, Result, anyhow};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child as TokioChild, Command};
use tracing::{info, warn};
use url::Url;

/// Placeholder in configured player arguments that is replaced by the stream URL.
const URL_PLACEHOLDER: &str = "{url}";

/// Build the player's argument list. The URL replaces every `{url}` placeholder,
/// or is appended when no argument mentions it.
fn player_args(args: &[String], url: &Url) -> Vec<String> {
  if args.iter().any(|a| a.contains(URL_PLACEHOLDER)) {
    return args.iter().map(|a| a.replace(URL_PLACEHOLDER, url.as_str())).collect();
  }
  let mut out = args.to_vec();
  out.push(url.to_string());
  out
}

/// An external media player process.
pub struct Player {
  program: String,
  args: Vec<String>,
  current_process: Option<TokioChild>,
}

impl Player {
  pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
    Self { program: program.into(), args, current_process: None }
  }

  pub fn is_playing(&self) -> bool {
    self.current_process.is_some()
  }

  pub async fn play(&mut self, url: &Url) -> Result<()> {
    self.stop().await.context("Failed to stop previous playback")?;

    let mut cmd = Command::new(&self.program);
    cmd.args(player_args(&self.args, url));
    // The player owns the terminal while it runs.
    cmd.stdin(Stdio::inherit());
    cmd.stdout(Stdio::inherit());
    cmd.stderr(Stdio::inherit());
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!(
          "{} not found. Install it (e.g. brew install mpv, apt install mpv) or set `player` in config.toml",
          self.program
        )
      } else {
        anyhow!(e).context(format!("Failed to spawn {}", self.program))
      }
    })?;

    info!(player = %self.program, pid = ?child.id(), "player: started");
    self.current_process = Some(child);
    Ok(())
  }

  /// Wait for the running player to exit on its own.
  pub async fn wait(&mut self) -> Result<ExitStatus> {
    let child = self.current_process.as_mut().context("No player is running")?;
    let status = child.wait().await.context("Failed to wait for player process")?;
    self.current_process = None;
    if !status.success() {
      warn!(player = %self.program, code = ?status.code(), "player: exited with failure");
    }
    Ok(status)
  }

  pub async fn stop(&mut self) -> Result<()> {
    if let Some(mut child) = self.current_process.take() {
      child.kill().await.with_context(|| format!("Failed to kill {} process", self.program))?;
      let _ = child.wait().await;
      info!(player = %self.program, "player: stopped");
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url() -> Url {
    Url::parse("http://127.0.0.1:40123/live/master.m3u8").unwrap()
  }

  #[test]
  fn url_is_appended_without_placeholder() {
    let args = vec!["--fs".to_string(), "--cache=yes".to_string()];
    assert_eq!(player_args(&args, &url()), vec!["--fs", "--cache=yes", "http://127.0.0.1:40123/live/master.m3u8"]);
  }

  #[test]
  fn placeholder_is_substituted() {
    let args = vec!["--input".to_string(), "{url}".to_string(), "--play-and-exit".to_string()];
    assert_eq!(
      player_args(&args, &url()),
      vec!["--input", "http://127.0.0.1:40123/live/master.m3u8", "--play-and-exit"]
    );
  }

  #[test]
  fn empty_args_only_url() {
    assert_eq!(player_args(&[], &url()), vec!["http://127.0.0.1:40123/live/master.m3u8"]);
  }

  #[tokio::test]
  async fn missing_player_is_reported() {
    let mut player = Player::new("tvp-no-such-player", Vec::new());
    let err = player.play(&url()).await.unwrap_err();
    assert!(err.to_string().contains("tvp-no-such-player not found"));
    assert!(!player.is_playing());
  }

  #[tokio::test]
  async fn stop_without_process_is_noop() {
    let mut player = Player::new("mpv", Vec::new());
    player.stop().await.unwrap();
    assert!(player.wait().await.is_err());
  }
}
