//! listing-watch — notifies subscribers about new listings in a price band.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌────────────┐  text   ┌────────────┐ add/rm/ls ┌─────────────┐
//! │  stdin     │ ──────► │ command.rs │ ────────► │ registry.rs │
//! │ (transport)│ ◄────── │  (parse)   │  reply    │ group.rs    │
//! └────────────┘         └────────────┘           └─────────────┘
//!                                                        │ start / stop
//!                                                        ▼
//! ┌────────────┐  batch  ┌────────────┐  fetch    ┌─────────────┐
//! │ notify.rs  │ ◄────── │  poll.rs   │ ────────► │  source/    │
//! │ (stdout)   │         │ (1 task per│ ◄──────── │ (HTTP+HTML) │
//! └────────────┘         │  session)  │  items    └─────────────┘
//!                        └────────────┘
//! ```
//!
//! * **`source/`** — the `ItemSource` trait, the listing item model and the
//!   ay.by implementation.
//! * **`poll`** — one tokio task per tracked link: fetch, diff, filter, deliver.
//! * **`group`** / **`registry`** — sessions grouped by destination, and the
//!   process-wide table of groups.
//! * **`command`** — `track` / `rm` / `ls` / help.
//! * **`notify`** — the delivery capability and the console implementation.
//! * **`main`** — wires everything together: parse args, load config, start
//!   logging, and run the command loop until stdin closes or Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use listing_watch::command;
use listing_watch::config::WatchConfig;
use listing_watch::notify::{ConsoleNotifier, DestinationId};
use listing_watch::registry::SessionRegistry;
use listing_watch::source::AySource;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "listing-watch")]
#[command(about = "Watch listing pages for new items inside a price band")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "listing-watch.toml")]
    config: PathBuf,

    /// Log level (overrides config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Destination id that commands typed on stdin belong to
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    destination: i64,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_missing = !args.config.exists();
    let mut config = if config_missing {
        WatchConfig::default()
    } else {
        WatchConfig::from_file(&args.config)?
    };
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    // stdout carries replies and notifications; logs go to stderr.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&config.log_level))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if config_missing {
        warn!("Config file not found at {:?}, using defaults", args.config);
    }
    info!(
        poll_interval = ?config.poll_interval,
        fetch_timeout = ?config.fetch_timeout,
        batch_size = config.batch_size,
        "starting listing-watch"
    );

    let source = Arc::new(AySource::new(&config.user_agent, config.fetch_timeout)?);
    let registry = SessionRegistry::new(
        source,
        Arc::new(ConsoleNotifier),
        config.session_settings(),
    );
    let destination = DestinationId(args.destination);

    println!("{}", command::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    let reply = command::handle(&registry, destination, &line).await;
                    println!("{reply}");
                }
                None => {
                    info!("stdin closed, tracking continues until interrupted");
                    tokio::signal::ctrl_c().await?;
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    registry.shutdown().await;
    Ok(())
}
