mod app;
mod cache;
mod config;
mod constants;
mod display;
mod graphics;
mod input;
mod instances;
mod invidious;
mod mirror;
mod render;
mod session;
mod thumbnail;
mod ui;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use directories::ProjectDirs;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use config::Config;
use display::CliDisplayMode;
use render::BufferSurface;
use session::{Query, Session, Thumbnails};
use thumbnail::Quality;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Thumbnail display mode: 'auto', 'direct' or 'ascii' (default: auto-detect)
  #[arg(short, long, default_value = "auto")]
  display_mode: CliDisplayMode,

  /// Per-mirror request timeout in seconds
  #[arg(short, long)]
  timeout: Option<f64>,

  /// Preferred thumbnail quality
  #[arg(short, long)]
  quality: Option<Quality>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Search videos and print the results
  Search { query: Vec<String> },
  /// Search channels and print the results
  Channels { query: Vec<String> },
  /// List a channel's uploads
  Videos { channel_id: String },
  /// Print a video's description and vote counts
  Video { video_id: String },
  /// List mirrors from the public instance directory
  Instances {
    /// Include Tor and I2P hosts
    #[arg(long)]
    all: bool,
  },
  /// Replace the configured mirror list with the directory's clearnet hosts
  RefreshInstances,
  /// Print shell completions
  Completions { shell: Shell },
}

// --- Logging ---

/// Log to `<data dir>/invid.log`; the terminal belongs to the UI.
/// The filter comes from `INVID_LOG` and defaults to `info`.
fn init_logging() -> Option<WorkerGuard> {
  let dirs = ProjectDirs::from("", "", "invid")?;
  let log_dir = dirs.data_local_dir();
  std::fs::create_dir_all(log_dir).ok()?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, "invid.log"));
  let filter = EnvFilter::try_from_env("INVID_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
  Some(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let _log_guard = init_logging();

  let mut config = Config::load();
  if let Some(secs) = args.timeout {
    config.timeout_secs = Some(secs);
  }
  if let Some(quality) = args.quality {
    config.thumbnail_quality = Some(quality);
  }

  match args.command {
    None => run_tui(config, args.display_mode).await,
    Some(Command::Completions { shell }) => {
      clap_complete::generate(shell, &mut Args::command(), "invid", &mut std::io::stdout());
      Ok(())
    }
    Some(command) => run_command(Session::new(config, Thumbnails::Skip)?, command).await,
  }
}

async fn run_tui(config: Config, display_mode: CliDisplayMode) -> Result<()> {
  let (thumb_tx, thumb_rx) = mpsc::unbounded_channel();
  let session = Session::new(config, Thumbnails::Fetch(thumb_tx))?;
  let display_mode = display::resolve_display_mode(display_mode);
  info!(mode = display_mode.label(), mirrors = session.hosts().len(), "starting");

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, App::new(session, thumb_rx, display_mode)).await;
  ratatui::restore();
  result
}

async fn run(terminal: &mut DefaultTerminal, mut app: App) -> Result<()> {
  loop {
    app.check_pending();
    app.expire_error();

    terminal.draw(|frame| ui::ui(frame, &mut app)).context("Failed to draw frame")?;

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(&mut app, key);
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }
  Ok(())
}

// --- Plain-text commands ---

async fn run_command(session: Session, command: Command) -> Result<()> {
  match command {
    Command::Search { query } => print_listing(&session, Query::Videos(query.join(" "))).await,
    Command::Channels { query } => print_listing(&session, Query::Channels(query.join(" "))).await,
    Command::Videos { channel_id } => print_listing(&session, Query::ChannelVideos(channel_id)).await,
    Command::Video { video_id } => {
      let details = app::fetch_details(&session, &video_id).await?;
      println!("{}", details.text_lines().join("\n"));
      Ok(())
    }
    Command::Instances { all } => {
      let hosts = if all {
        instances::list_instances(session.transport.as_ref()).await?
      } else {
        instances::list_clearnet_instances(session.transport.as_ref()).await?
      };
      for host in hosts {
        println!("{}", host);
      }
      Ok(())
    }
    Command::RefreshInstances => {
      let hosts = instances::refresh_instances(session.transport.as_ref(), session.hosts()).await?;
      session.persist_hosts().context("Mirror list not saved")?;
      println!("Saved {} instances", hosts.len());
      Ok(())
    }
    Command::Completions { .. } => Ok(()),
  }
}

async fn print_listing(session: &Session, query: Query) -> Result<()> {
  if matches!(&query, Query::Videos(q) | Query::Channels(q) if q.trim().is_empty()) {
    anyhow::bail!("Enter a search term.");
  }
  let mut surface = BufferSurface::named(query.surface_name(&session.config.surfaces));
  session.run_query(&query, &mut surface, &CancellationToken::new()).await?;
  if surface.entries.is_empty() {
    warn!(query = ?query, "no results");
    println!("No results found.");
  } else {
    print!("{}", surface.to_text());
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cli_is_well_formed() {
    Args::command().debug_assert();
  }

  #[test]
  fn parses_global_overrides_and_subcommand() {
    let argv = ["invid", "--timeout", "1.5", "--quality", "high", "search", "lofi", "beats"];
    let args = Args::try_parse_from(argv).unwrap();
    assert_eq!(args.timeout, Some(1.5));
    assert_eq!(args.quality, Some(Quality::High));
    assert!(matches!(args.command, Some(Command::Search { ref query }) if query.join(" ") == "lofi beats"));
  }

  #[test]
  fn no_subcommand_starts_the_ui() {
    let args = Args::try_parse_from(["invid", "-d", "ascii"]).unwrap();
    assert!(args.command.is_none());
    assert!(matches!(args.display_mode, CliDisplayMode::Ascii));
  }

  #[test]
  fn instances_all_flag() {
    let args = Args::try_parse_from(["invid", "instances", "--all"]).unwrap();
    assert!(matches!(args.command, Some(Command::Instances { all: true })));
  }
}
