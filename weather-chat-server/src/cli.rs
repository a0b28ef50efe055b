use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inquire::{Password, Text};
use tracing::info;
use weather_chat_core::{Config, ResponseComposer};

use crate::routes;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-chat", version, about = "Natural-language weather service")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, env = "WEATHER_CHAT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve `POST /query_weather`.
    Serve {
        /// Address to bind, overrides the config file.
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overrides the config file.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Interactively store API keys and the access token.
    Configure,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Serve { host, port } => serve(self.config, host, port).await,
            Command::Configure => configure(self.config),
        }
    }
}

fn config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => Config::config_file_path(),
    }
}

async fn serve(path: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let path = config_path(path)?;
    let mut config = Config::load_from(&path)?;
    config.apply_env(|name| std::env::var(name).ok());

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let http = reqwest::Client::builder()
        .user_agent(concat!("weather-chat/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let composer = ResponseComposer::from_config(&config, http)?;
    let app = routes::router(Arc::new(composer));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(
        address = %listener.local_addr()?,
        config = %path.display(),
        model = %config.chat.model,
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

fn configure(path: Option<PathBuf>) -> Result<()> {
    let path = config_path(path)?;
    let mut config = Config::load_from(&path)?;

    let base_url =
        Text::new("Chat service base URL:").with_default(&config.chat.base_url).prompt()?;
    let model = Text::new("Chat model:").with_default(&config.chat.model).prompt()?;
    config.chat.base_url = base_url;
    config.chat.model = model;

    let chat_key = Password::new("Chat service API key (empty keeps current):")
        .without_confirmation()
        .prompt()?;
    if !chat_key.trim().is_empty() {
        config.chat.api_key = Some(chat_key.trim().to_string());
    }

    let weather_key = Password::new("Visual Crossing API key (empty keeps current):")
        .without_confirmation()
        .prompt()?;
    if !weather_key.trim().is_empty() {
        config.weather.api_key = Some(weather_key.trim().to_string());
    }

    let token = Password::new("Access token callers must send (empty keeps current):")
        .without_confirmation()
        .prompt()?;
    if !token.trim().is_empty() {
        config.access_token = Some(token.trim().to_string());
    }

    config.save_to(&path)?;
    println!("Saved configuration to {}", path.display());

    Ok(())
}
