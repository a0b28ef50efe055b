use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

pub const DEFAULT_PORT: u16 = 10011;
pub const DEFAULT_CHAT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_CHAT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_WEATHER_BASE_URL: &str =
    "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline";

/// Listening address of the HTTP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: DEFAULT_PORT }
    }
}

/// Chat-completion service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CHAT_BASE_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_key: None,
        }
    }
}

/// Weather timeline service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_WEATHER_BASE_URL.to_string(), api_key: None }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// access_token = "..."
///
/// [server]
/// port = 10011
///
/// [chat]
/// api_key = "..."
///
/// [weather]
/// api_key = "..."
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Shared secret callers must present in the request body.
    pub access_token: Option<String>,
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub weather: WeatherConfig,
}

impl Config {
    pub const ENV_CHAT_API_KEY: &str = "CHAT_API_KEY";
    pub const ENV_CHAT_BASE_URL: &str = "CHAT_BASE_URL";
    pub const ENV_CHAT_MODEL: &str = "CHAT_MODEL";
    pub const ENV_WEATHER_API_KEY: &str = "WEATHER_API_KEY";
    pub const ENV_ACCESS_TOKEN: &str = "WEATHER_ACCESS_TOKEN";

    /// Load config from the default location, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-chat", "weather-chat")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Override file values with whatever `lookup` finds for the known variables.
    ///
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(Self::ENV_CHAT_API_KEY) {
            self.chat.api_key = Some(v);
        }
        if let Some(v) = get(Self::ENV_CHAT_BASE_URL) {
            self.chat.base_url = v;
        }
        if let Some(v) = get(Self::ENV_CHAT_MODEL) {
            self.chat.model = v;
        }
        if let Some(v) = get(Self::ENV_WEATHER_API_KEY) {
            self.weather.api_key = Some(v);
        }
        if let Some(v) = get(Self::ENV_ACCESS_TOKEN) {
            self.access_token = Some(v);
        }
    }

    pub fn access_token(&self) -> Result<&str> {
        non_empty(self.access_token.as_deref()).ok_or_else(|| {
            anyhow!(
                "No access token configured.\n\
                 Hint: run `weather-chat configure` or set {}.",
                Self::ENV_ACCESS_TOKEN
            )
        })
    }

    pub fn chat_api_key(&self) -> Result<&str> {
        non_empty(self.chat.api_key.as_deref()).ok_or_else(|| {
            anyhow!(
                "No chat service API key configured.\n\
                 Hint: run `weather-chat configure` or set {}.",
                Self::ENV_CHAT_API_KEY
            )
        })
    }

    pub fn weather_api_key(&self) -> Result<&str> {
        non_empty(self.weather.api_key.as_deref()).ok_or_else(|| {
            anyhow!(
                "No weather service API key configured.\n\
                 Hint: run `weather-chat configure` or set {}.",
                Self::ENV_WEATHER_API_KEY
            )
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_point_at_public_services() {
        let cfg = Config::default();

        assert_eq!(cfg.server.port, DEFAULT_PORT);
        assert_eq!(cfg.chat.model, "deepseek-chat");
        assert!(cfg.weather.base_url.ends_with("/timeline"));
    }

    #[test]
    fn missing_secrets_error_with_hint() {
        let cfg = Config::default();

        let err = cfg.access_token().unwrap_err();
        assert!(err.to_string().contains("No access token configured"));
        assert!(err.to_string().contains("Hint: run `weather-chat configure`"));

        assert!(cfg.chat_api_key().is_err());
        assert!(cfg.weather_api_key().is_err());
    }

    #[test]
    fn blank_secret_counts_as_missing() {
        let cfg = Config { access_token: Some("  ".into()), ..Config::default() };
        assert!(cfg.access_token().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_sections() {
        let cfg: Config = toml::from_str(
            r#"
            access_token = "secret"

            [chat]
            api_key = "sk-1"
            "#,
        )
        .expect("valid toml");

        assert_eq!(cfg.access_token().unwrap(), "secret");
        assert_eq!(cfg.chat_api_key().unwrap(), "sk-1");
        assert_eq!(cfg.chat.base_url, DEFAULT_CHAT_BASE_URL);
        assert_eq!(cfg.server, ServerConfig::default());
        assert!(cfg.weather.api_key.is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config { access_token: Some("from-file".into()), ..Config::default() };
        let env: HashMap<&str, &str> = HashMap::from([
            (Config::ENV_ACCESS_TOKEN, "from-env"),
            (Config::ENV_WEATHER_API_KEY, "wx"),
            (Config::ENV_CHAT_MODEL, ""),
        ]);

        cfg.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(cfg.access_token().unwrap(), "from-env");
        assert_eq!(cfg.weather_api_key().unwrap(), "wx");
        assert_eq!(cfg.chat.model, DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn save_then_load_from_path() {
        let dir = std::env::temp_dir().join(format!("weather-chat-config-{}", std::process::id()));
        let path = dir.join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.server.port = 8080;
        cfg.weather.api_key = Some("wx".into());
        cfg.save_to(&path).expect("save");

        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded, cfg);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_from_missing_file_returns_default() {
        let path = std::env::temp_dir().join("weather-chat-does-not-exist.toml");
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }
}
