//! # stagekit
//!
//! Stages built artifacts into distribution directories.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  apps/stagekit (THE BINARY)              │
//! │                                                          │
//! │  ┌────────────┐    ┌────────────┐    ┌───────────────┐   │
//! │  │    CLI     │    │  Manifest  │    │   Executor    │   │
//! │  │   (clap)   │    │   (toml)   │    │    (tokio)    │   │
//! │  └─────┬──────┘    └─────┬──────┘    └───────┬───────┘   │
//! │        │                 │                   │           │
//! │        └─────────────────┼───────────────────┘           │
//! │                          ▼                               │
//! │                  ┌───────────────┐                       │
//! │                  │ stagekit-core │                       │
//! │                  │  (THE LOGIC)  │                       │
//! │                  └───────────────┘                       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Stage everything declared by the current project
//! stagekit build
//!
//! # Stage one stage in release, from a sub-project
//! stagekit --dir d build dist release
//!
//! # Show what would be copied
//! stagekit plan dist --json-mode
//! ```

use clap::Parser;
use stagekit::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Initialize tracing: STAGEKIT_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("STAGEKIT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "stagekit=debug"
    } else {
        "stagekit=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
