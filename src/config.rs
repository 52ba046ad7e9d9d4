use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides the stored session token.
pub const TOKEN_ENV: &str = "TVP_TOKEN";

#[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
pub struct Config {
  /// Session token for the viewing endpoint.
  pub token: Option<String>,
  /// Media player executable; defaults to the built-in player.
  pub player: Option<String>,
  #[serde(default)]
  pub player_args: Vec<String>,
  pub download_dir: Option<PathBuf>,
}

pub fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", "tvp")
}

impl Config {
  pub fn load() -> Self {
    if let Some(proj_dirs) = project_dirs() {
      let config_file = proj_dirs.config_dir().join("config.toml");
      if let Ok(content) = std::fs::read_to_string(config_file)
        && let Ok(config) = toml::from_str(&content)
      {
        return config;
      }
    }
    Self::default()
  }

  pub fn save(&self) -> Result<PathBuf> {
    let proj_dirs = project_dirs().context("Could not determine a config directory")?;
    let config_dir = proj_dirs.config_dir();
    std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
    let config_file = config_dir.join("config.toml");
    let content = toml::to_string(self).context("Failed to serialize config")?;
    std::fs::write(&config_file, content).with_context(|| format!("Failed to write {}", config_file.display()))?;
    Ok(config_file)
  }

  /// Token precedence: explicit flag, then `TVP_TOKEN`, then the config file.
  /// A blank source is skipped rather than shadowing the next one.
  pub fn token(&self, explicit: Option<String>) -> Option<String> {
    explicit
      .and_then(non_blank)
      .or_else(|| std::env::var(TOKEN_ENV).ok().and_then(non_blank))
      .or_else(|| self.token.clone().and_then(non_blank))
  }
}

fn non_blank(token: String) -> Option<String> {
  let token = token.trim();
  if token.is_empty() { None } else { Some(token.to_string()) }
}
