//! `spool`: terminal browser for a filament inventory server.
//!
//! # Usage
//!
//! ```
//! spool --url http://localhost:7912
//! spool --config ~/.config/spool/config.toml --log-file /tmp/spool.log
//! ```

mod app;
mod client;
mod live;
mod model;
mod ui;

use std::{
  fs::File,
  io,
  path::{Path, PathBuf},
  sync::Mutex,
  time::Duration,
};

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use client::{ApiClient, ApiConfig};
use crossterm::{
  event::{self, Event, KeyEventKind},
  execute,
  terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use serde::Deserialize;
use serde_json::Value;
use spool_core::{LiveEventChannel, ViewConfig};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

const DEFAULT_URL: &str = "http://localhost:7912";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "spool", version, about = "Terminal browser for a filament inventory")]
struct Args {
  /// Path to a TOML config file (url, page_size, timeout_secs, live).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the inventory server (default: http://localhost:7912).
  #[arg(long, env = "SPOOL_URL")]
  url: Option<String>,

  /// Records fetched per page.
  #[arg(long, env = "SPOOL_PAGE_SIZE")]
  page_size: Option<u32>,

  /// HTTP request timeout in seconds.
  #[arg(long)]
  timeout_secs: Option<u64>,

  /// Do not subscribe to the server's live change feed.
  #[arg(long)]
  no_live: bool,

  /// Write logs to this file (the terminal belongs to the UI).
  #[arg(long, value_name = "FILE")]
  log_file: Option<PathBuf>,
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default, Debug)]
struct ConfigFile {
  #[serde(default)]
  url:          Option<String>,
  #[serde(default)]
  page_size:    Option<u32>,
  #[serde(default)]
  timeout_secs: Option<u64>,
  #[serde(default)]
  live:         Option<bool>,
}

/// Settings after layering CLI flags over the config file over defaults.
#[derive(Debug)]
struct Settings {
  api:  ApiConfig,
  view: ViewConfig,
  live: bool,
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading config file {}", path.display()))?;
  toml::from_str(&raw).context("parsing config file")
}

fn resolve(args: &Args, file: ConfigFile) -> Result<Settings> {
  let view = ViewConfig {
    page_size: args
      .page_size
      .or(file.page_size)
      .unwrap_or(ViewConfig::default().page_size),
    ..ViewConfig::default()
  };
  view.validate().context("invalid list configuration")?;

  Ok(Settings {
    api: ApiConfig {
      base_url: args
        .url
        .clone()
        .or(file.url)
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| DEFAULT_URL.to_string()),
      timeout:  Duration::from_secs(
        args
          .timeout_secs
          .or(file.timeout_secs)
          .unwrap_or(DEFAULT_TIMEOUT_SECS),
      ),
    },
    view,
    live: !args.no_live && file.live.unwrap_or(true),
  })
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();
  let builder = tracing_subscriber::fmt().with_env_filter(filter).with_ansi(false);

  match log_file {
    Some(path) => {
      let file = File::create(path)
        .with_context(|| format!("creating log file {}", path.display()))?;
      builder.with_writer(Mutex::new(file)).init();
    }
    None => builder.with_writer(io::sink).init(),
  }
  Ok(())
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  init_tracing(args.log_file.as_deref())?;

  let file_cfg = match &args.config {
    Some(path) => load_config_file(path)?,
    None => ConfigFile::default(),
  };
  let settings = resolve(&args, file_cfg)?;
  info!(url = %settings.api.base_url, page_size = settings.view.page_size, "starting");

  let client = ApiClient::new(settings.api)?;
  let channel = LiveEventChannel::<Value>::default();
  let feed = settings
    .live
    .then(|| live::spawn(client.base_url(), channel.clone()));

  let mut app = App::new(&client, &channel, &settings.view)?;

  // Set up the terminal.
  enable_raw_mode().context("enabling raw mode")?;
  let mut stdout = io::stdout();
  execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
  let backend = CrosstermBackend::new(stdout);
  let mut terminal = Terminal::new(backend).context("creating terminal")?;

  // Run the event loop; restore terminal even on error.
  let run_result = run_event_loop(&mut terminal, &mut app);

  disable_raw_mode().ok();
  execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
  terminal.show_cursor().ok();

  if let Some(feed) = feed {
    feed.abort();
  }
  info!("exiting");
  run_result
}

// ─── Event loop ───────────────────────────────────────────────────────────────

fn run_event_loop(
  terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
  app: &mut App,
) -> Result<()> {
  loop {
    app.tick();
    terminal.draw(|f| ui::draw(f, app)).context("drawing frame")?;
    app.frame += 1;

    // Poll for an event, yielding control to tokio while waiting.
    let maybe_event = tokio::task::block_in_place(|| {
      if event::poll(Duration::from_millis(50))? {
        Ok::<_, io::Error>(Some(event::read()?))
      } else {
        Ok(None)
      }
    })?;

    match maybe_event {
      Some(Event::Key(key)) if key.kind == KeyEventKind::Press => {
        if !app.handle_key(key) {
          break;
        }
      }
      // Resizes are picked up by the next draw.
      _ => {}
    }
  }

  Ok(())
}
