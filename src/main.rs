//! Application entry point for the `wx-analytics` service.
//!
//! One binary, three jobs:
//! - `ingest` – load station files into the reading store (optionally
//!   recomputing statistics afterwards)
//! - `stats` – recompute yearly statistics, whole or scoped
//! - `serve` – expose readings and statistics over HTTP
//!
//! Every command loads configuration from the environment or `.env`,
//! initializes structured logging and opens the PostgreSQL store, which
//! creates the schema if it does not exist.
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `WX_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `WX_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the remaining variables.
use std::{env, future::Future, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use wx_analytics::store::{PgStore, WeatherStore};
use wx_analytics::{analyze, config, ingest, routes, StationYearFilter};

#[derive(Debug, Parser)]
#[command(name = "wx-analytics", version, about = "Weather station ingestion and statistics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest station files into the reading store
    Ingest {
        /// Directory of station files (defaults to WX_DATA_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Recompute all statistics once ingestion finishes
        #[arg(long)]
        stats: bool,
    },
    /// Recompute yearly statistics
    Stats {
        #[arg(long)]
        station: Option<String>,

        #[arg(long)]
        year: Option<i32>,
    },
    /// Serve the query API over HTTP
    Serve,
}

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_from_env()?;
    cfg.log_config();

    let store: Arc<dyn WeatherStore> = Arc::new(
        PgStore::connect(&cfg.db_url, cfg.db_pool_max)
            .await
            .context("Failed to open the weather store")?,
    );

    match cli.command {
        Command::Ingest { dir, stats } => {
            let cancel = CancellationToken::new();
            spawn_ctrl_c(cancel.clone());

            let source = cfg.source_config(dir);
            let report = ingest::ingest(store.clone(), &source, &cfg.ingest_options(), &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if stats && !report.cancelled {
                let report = analyze::recompute_stats(
                    store.as_ref(),
                    &StationYearFilter::default(),
                    &cfg.aggregate_options(),
                )
                .await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Command::Stats { station, year } => {
            let filter = StationYearFilter {
                station_id: station,
                year,
            };
            let report =
                analyze::recompute_stats(store.as_ref(), &filter, &cfg.aggregate_options()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve => {
            let addr = cfg.bind_addr.clone();
            let app: Router = routes::router(store);

            tracing::info!("Listening on {}", addr);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

/// Cancel `token` on the first Ctrl-C so ingestion stops between records.
/// A second Ctrl-C exits immediately.
fn spawn_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if watch_interrupts(&token, tokio::signal::ctrl_c).await {
            tracing::error!("Second interrupt received, exiting");
            std::process::exit(130);
        }
    });
}

/// Cancel `token` on the first signal; true once a second signal arrives.
async fn watch_interrupts<S, F>(token: &CancellationToken, mut signal: S) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    // ---
    if signal().await.is_err() {
        return false;
    }
    tracing::warn!("Interrupt received, stopping after the current record (Ctrl-C again to quit)");
    token.cancel();
    signal().await.is_ok()
}

/// Initialize the global tracing subscriber for structured logging.
///
/// - Color output controlled by TTY detection and `FORCE_COLOR`:
///   `1|true|yes` forces colors on, `0|false|no` forces them off
/// - Span events from `WX_SPAN_EVENTS`: `full`, `enter_exit`, otherwise close only
/// - Level from `RUST_LOG` if set, else `WX_LOG_LEVEL` (default `info`)
///
/// Logs go to stderr so command reports on stdout stay machine readable.
fn init_tracing() {
    // ---
    let span_events = match env::var("WX_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("WX_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::io;

    #[tokio::test]
    async fn test_first_interrupt_cancels_second_exits() {
        // ---
        let token = CancellationToken::new();
        let force = watch_interrupts(&token, || async { Ok(()) }).await;
        assert!(token.is_cancelled());
        assert!(force);
    }

    #[tokio::test]
    async fn test_lost_signal_handler_does_not_force_exit() {
        // ---
        let token = CancellationToken::new();
        let mut calls = 0;
        let force = watch_interrupts(&token, || {
            calls += 1;
            let result = if calls == 1 {
                Ok(())
            } else {
                Err(io::Error::new(io::ErrorKind::Other, "handler gone"))
            };
            async move { result }
        })
        .await;
        assert!(token.is_cancelled());
        assert!(!force);
    }

    #[tokio::test]
    async fn test_no_interrupt_leaves_run_alone() {
        // ---
        let token = CancellationToken::new();
        let force = watch_interrupts(&token, || async {
            Err(io::Error::new(io::ErrorKind::Other, "no handler"))
        })
        .await;
        assert!(!token.is_cancelled());
        assert!(!force);
    }
}
