use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub line: LineConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub http: HTTPConfig,
}
impl AppConfig {
    /// Reads the TOML file (when present), applies environment overrides and
    /// validates that every required secret was provided by one of them.
    pub fn load(config_filepath: Option<PathBuf>) -> Result<Self> {
        let content = match config_filepath {
            Some(config_path) => Some(
                fs::read_to_string(&config_path)
                    .with_context(|| format!("Failed to read config file: {config_path:?}"))?,
            ),
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Some(fs::read_to_string(&default_path).with_context(|| {
                        format!("Failed to read config file: {default_path:?}")
                    })?)
                } else {
                    None
                }
            }
        };

        Self::from_sources(content.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(content: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: AppConfig = match content {
            Some(content) => {
                toml::from_str(content).with_context(|| "Failed to parse TOML config file")?
            }
            None => AppConfig::default(),
        };

        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = env("CHANNEL_ACCESS_TOKEN") {
            self.line.channel_access_token = token;
        }
        if let Some(secret) = env("CHANNEL_SECRET") {
            self.line.channel_secret = secret;
        }
        if let Some(api_base) = env("LINE_API_BASE") {
            self.line.api_base = api_base;
        }
        if let Some(api_key) = env("OPENAI_API_KEY") {
            self.completion.api_key = api_key;
        }
        if let Some(api_base) = env("OPENAI_API_BASE") {
            self.completion.api_base = api_base;
        }
        if let Some(port) = env("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT environment variable: {port:?}"))?;
            self.http.address.set_port(port);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("CHANNEL_ACCESS_TOKEN", &self.line.channel_access_token),
            ("CHANNEL_SECRET", &self.line.channel_secret),
            ("OPENAI_API_KEY", &self.completion.api_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                bail!("Missing required {name} environment variable (or config value)!");
            }
        }

        if self.completion.timeout_secs == 0 {
            bail!("Completion timeout_secs must be greater than zero!");
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize)]
pub struct LineConfig {
    #[serde(default)]
    pub channel_access_token: String,

    #[serde(default)]
    pub channel_secret: String,

    #[serde(default = "default_line_api_base")]
    pub api_base: String,
}
impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: String::new(),
            channel_secret: String::new(),
            api_base: default_line_api_base(),
        }
    }
}
impl std::fmt::Debug for LineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineConfig")
            .field("channel_access_token", &"<redacted>")
            .field("channel_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct CompletionConfig {
    #[serde(default)]
    pub api_key: String,

    /// Base URL of an OpenAI compatible API, `/chat/completions` is appended.
    #[serde(default = "default_completion_api_base")]
    pub api_base: String,

    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}
impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_completion_api_base(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}
impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HTTPConfig {
    #[serde(default = "default_http_address")]
    pub address: SocketAddr,

    #[serde(default)]
    pub tls: Option<TLSConfig>,
}
impl Default for HTTPConfig {
    fn default() -> Self {
        Self {
            address: default_http_address(),
            tls: None,
        }
    }
}

#[cfg_attr(
    not(any(feature = "tls-rustls", feature = "tls-native")),
    allow(dead_code)
)]
#[derive(Debug, Clone, Deserialize)]
pub struct TLSConfig {
    #[serde(deserialize_with = "deserialize_existing_file")]
    pub certificate_path: PathBuf,

    #[serde(deserialize_with = "deserialize_existing_file")]
    pub key_path: PathBuf,
}

fn default_line_api_base() -> String {
    "https://api.line.me".to_string()
}
fn default_completion_api_base() -> String {
    "https://api.deepseek.com/v1".to_string()
}
fn default_completion_timeout_secs() -> u64 {
    30
}
fn default_http_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5000)
}

fn deserialize_existing_file<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let path = PathBuf::deserialize(deserializer)?;
    if !path.exists() {
        return Err(serde::de::Error::custom(format!(
            "File does not exist: {}",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(serde::de::Error::custom(format!(
            "Path is not a file: {}",
            path.display()
        )));
    }
    Ok(path)
}
