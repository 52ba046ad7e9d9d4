mod config;
mod constants;
mod content;
mod download;
mod error;
mod manifest;
mod player;
mod proxy;
mod resolver;
mod stream;

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use config::Config;
use constants::constants;
use content::ContentId;
use player::Player;
use resolver::Resolver;
use stream::open_stream;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Write debug-level logs
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Play a channel or asset in the media player
  Play {
    /// Content identifier, e.g. /channels/news or /assets/abc123
    id: String,
    /// Session token (overrides TVP_TOKEN and config.toml)
    #[arg(long)]
    token: Option<String>,
    /// Media player executable
    #[arg(long)]
    player: Option<String>,
  },
  /// Save a channel or asset to disk with ffmpeg
  Download {
    id: String,
    /// Output file (default: <download_dir>/<id>.ts)
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long)]
    token: Option<String>,
  },
  /// Print the tokenised stream URL without starting a proxy
  Url {
    id: String,
    #[arg(long)]
    token: Option<String>,
  },
  /// Store a session token in config.toml
  Login { token: String },
  /// Print shell completions
  Completions { shell: clap_complete::Shell },
}

// --- Logging ---

/// Log to a file in the data directory; the terminal belongs to the player.
fn init_logging(verbose: bool) -> Option<WorkerGuard> {
  let proj_dirs = config::project_dirs()?;
  let log_dir = proj_dirs.data_local_dir();
  std::fs::create_dir_all(log_dir).ok()?;

  let file_appender = tracing_appender::rolling::never(log_dir, &constants().log_file);
  let (writer, guard) = tracing_appender::non_blocking(file_appender);
  let default_filter = if verbose { "tvp=debug" } else { "tvp=info" };
  let filter = EnvFilter::try_from_env("TVP_LOG").unwrap_or_else(|_| EnvFilter::new(default_filter));

  tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
  Some(guard)
}

// --- Commands ---

fn http_client() -> Result<reqwest::Client> {
  reqwest::Client::builder().user_agent(constants().user_agent.as_str()).build().context("Failed to build HTTP client")
}

fn require_token(config: &Config, explicit: Option<String>) -> Result<String> {
  config
    .token(explicit)
    .ok_or_else(|| anyhow!("No session token. Pass --token, set {}, or run `tvp login <TOKEN>`", config::TOKEN_ENV))
}

async fn play(config: &Config, id: &str, token: Option<String>, player: Option<String>) -> Result<()> {
  let id: ContentId = id.parse()?;
  let token = require_token(config, token)?;
  let resolver = Resolver::new(http_client()?);

  let cancel = CancellationToken::new();
  let _proxy_guard = cancel.clone().drop_guard();
  let playback =
    open_stream(&resolver, &id, &token, cancel.clone()).await.with_context(|| format!("Failed to open {}", id))?;

  let program = player.or_else(|| config.player.clone()).unwrap_or_else(|| constants().default_player.clone());
  let mut player = Player::new(program, config.player_args.clone());
  player.play(&playback.url).await?;

  info!(id = %id, proxied = playback.proxied, "play: handing stream to player");

  tokio::select! {
    status = player.wait() => {
      let status = status?;
      info!(code = ?status.code(), "play: player exited");
    }
    _ = tokio::signal::ctrl_c() => {}
  }
  if player.is_playing() {
    info!("play: interrupted");
    player.stop().await?;
  }
  Ok(())
}

async fn run_download(config: &Config, id: &str, output: Option<PathBuf>, token: Option<String>) -> Result<()> {
  let id: ContentId = id.parse()?;
  let token = require_token(config, token)?;
  let resolver = Resolver::new(http_client()?);
  let output = download::output_path(output, config.download_dir.as_deref(), &id);

  let cancel = CancellationToken::new();
  let _proxy_guard = cancel.clone().drop_guard();
  let playback =
    open_stream(&resolver, &id, &token, cancel.clone()).await.with_context(|| format!("Failed to open {}", id))?;

  tokio::select! {
    result = download::download(&playback.url, &output) => result?,
    _ = tokio::signal::ctrl_c() => return Err(anyhow!("Download interrupted")),
  }
  println!("{}", output.display());
  Ok(())
}

async fn print_url(config: &Config, id: &str, token: Option<String>) -> Result<()> {
  let id: ContentId = id.parse()?;
  let token = require_token(config, token)?;
  let resolver = Resolver::new(http_client()?);
  let url = resolver.resolve(&id, &token).await.with_context(|| format!("Failed to resolve {}", id))?;
  println!("{url}");
  Ok(())
}

fn login(mut config: Config, token: String) -> Result<()> {
  let token = token.trim().to_string();
  if token.is_empty() {
    return Err(anyhow!("Token must not be empty"));
  }
  config.token = Some(token);
  let path = config.save()?;
  println!("Token saved to {}", path.display());
  Ok(())
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let _log_guard = init_logging(args.verbose);
  let config = Config::load();

  let result = match args.command {
    Cmd::Play { id, token, player } => play(&config, &id, token, player).await,
    Cmd::Download { id, output, token } => run_download(&config, &id, output, token).await,
    Cmd::Url { id, token } => print_url(&config, &id, token).await,
    Cmd::Login { token } => login(config, token),
    Cmd::Completions { shell } => {
      clap_complete::generate(shell, &mut Args::command(), env!("CARGO_PKG_NAME"), &mut std::io::stdout());
      Ok(())
    }
  };

  if let Err(ref e) = result {
    error!("command failed: {:#}", e);
  }
  result
}
