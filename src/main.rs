mod app;
mod config;
mod constants;
mod debounce;
mod fetch;
mod input;
mod player;
mod search;
mod session;
mod subtitle;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use directories::ProjectDirs;
use ratatui::{
  DefaultTerminal,
  crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
  },
};
use std::time::Instant;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use config::Config;
use constants::constants;
use player::MpvPlayer;
use search::SearchClient;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Search server base URL (default: saved preference, then http://127.0.0.1:5000)
  #[arg(short, long)]
  server: Option<String>,

  /// Subtitle language code sent with each search, e.g. 'en' or 'de'
  #[arg(short, long)]
  language: Option<String>,

  /// Play clips without opening a video window
  #[arg(short, long)]
  audio_only: bool,

  /// Print a shell completion script and exit
  #[arg(long, value_name = "SHELL")]
  completions: Option<clap_complete::Shell>,
}

impl Args {
  /// Command-line flags take precedence over saved preferences.
  fn apply(self, mut config: Config) -> Config {
    if self.server.is_some() {
      config.server_url = self.server;
    }
    if self.language.is_some() {
      config.language = self.language;
    }
    if self.audio_only {
      config.audio_only = Some(true);
    }
    config
  }
}

// --- Logging ---

/// Log to a daily-rolling file; the terminal belongs to the UI. Filter with
/// `CLIPSEEK_LOG` (default `clipseek=info`).
fn init_logging() -> Option<WorkerGuard> {
  let dirs = ProjectDirs::from("", "", "clipseek")?;
  let log_dir = dirs.data_local_dir().join("logs");
  std::fs::create_dir_all(&log_dir).ok()?;

  let appender = tracing_appender::rolling::daily(log_dir, "clipseek.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter = EnvFilter::try_from_env("CLIPSEEK_LOG").unwrap_or_else(|_| EnvFilter::new("clipseek=info"));

  tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).try_init().ok()?;
  Some(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(shell) = args.completions {
    clap_complete::generate(shell, &mut Args::command(), "clipseek", &mut std::io::stdout());
    return Ok(());
  }

  let _log_guard = init_logging();
  let config = args.apply(Config::load());

  let server = config.server_url.clone().unwrap_or_else(|| constants().default_server.clone());
  let backend = SearchClient::new(&server).context("Failed to set up search client")?;
  info!(endpoint = backend.endpoint(), audio_only = config.audio_only.unwrap_or(false), "starting");
  let player = MpvPlayer::new(config.audio_only.unwrap_or(false));
  let app = App::new(player, backend, &config);

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  execute!(std::io::stdout(), EnableMouseCapture).context("Failed to enable mouse capture")?;
  let result = run(&mut terminal, app).await;
  let _ = execute!(std::io::stdout(), DisableMouseCapture);
  ratatui::restore();
  result
}

async fn run(terminal: &mut DefaultTerminal, mut app: App<MpvPlayer, SearchClient>) -> Result<()> {
  loop {
    app.check_pending(Instant::now()).await;

    terminal.draw(|frame| ui::ui(frame, &mut app))?;

    if event::poll(constants().frame_poll())? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(&mut app, key, Instant::now()).await;
        }
        Event::Mouse(mouse) => input::handle_mouse_event(&mut app, mouse, Instant::now()),
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  info!("shutting down");
  app.shutdown().await;
  Ok(())
}
