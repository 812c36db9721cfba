//! # Dispensary Engine
//!
//! Headless driver for the Dispensary NPC population.
//!
//! Loads `dispensary.toml` (or the path given as the first argument), builds
//! the demo storefront and runs the population for a fixed number of frames.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod app;
mod config;
mod storefront;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{EngineConfig, CONFIG_FILE};

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("dispensary=info".parse()?))
        .init();

    info!("Dispensary starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_FILE.to_owned());
    let config = EngineConfig::load_from(&path);

    let summary = app::run(&config)?;
    info!("Run summary: {}", serde_json::to_string(&summary)?);

    info!("Dispensary shutdown complete");
    Ok(())
}
