//! Binary crate for the `weather-chat` service.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Serving the streaming HTTP endpoint

use clap::Parser;

mod cli;
mod error;
mod routes;
mod telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
