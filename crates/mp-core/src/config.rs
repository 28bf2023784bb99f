use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use mp_backend::{ProviderConfig, ProviderKind, TransportConfig};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub transport: TransportConfig,
    /// Name of the provider used when none is requested.
    pub default: Option<String>,
    pub providers: Vec<ProviderSection>,
}

/// One `[[providers]]` entry.
#[derive(Clone, Deserialize, PartialEq)]
pub struct ProviderSection {
    pub name: String,
    /// Backend family, e.g. `huggingface`, `claude` or `dummy`.
    #[serde(rename = "type")]
    pub kind: String,
    pub sub_type: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub stream: bool,
    /// Literal key. Prefer `api_key_env` or `api_key_cmd`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Command printing the key (e.g., "pass show hf/token"), run via `sh -c`.
    #[serde(default)]
    pub api_key_cmd: Option<String>,
}

impl ProviderSection {
    /// Offline echo provider used when nothing is configured.
    pub fn dummy() -> Self {
        Self {
            name: "dummy".to_string(),
            kind: "dummy".to_string(),
            sub_type: "gpt2".to_string(),
            temperature: 0.0,
            base_url: None,
            stream: false,
            api_key: None,
            api_key_env: None,
            api_key_cmd: None,
        }
    }

    /// Resolve the key from api_key_cmd, api_key_env, then api_key.
    ///
    /// A provider with none of them gets an empty key.
    pub fn resolve_api_key(&self) -> io::Result<String> {
        if let Some(cmd) = &self.api_key_cmd {
            let output = Command::new("sh").arg("-c").arg(cmd).output()?;

            if output.status.success() {
                let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !key.is_empty() {
                    return Ok(key);
                }
            } else {
                warn!(provider = %self.name, status = %output.status, "api_key_cmd failed");
            }
        }

        if let Some(var) = &self.api_key_env {
            match std::env::var(var) {
                Ok(key) if !key.trim().is_empty() => return Ok(key.trim().to_string()),
                _ => warn!(provider = %self.name, var = %var, "api key variable not set"),
            }
        }

        Ok(self.api_key.clone().unwrap_or_default())
    }

    pub fn to_provider_config(&self) -> Result<ProviderConfig> {
        let kind: ProviderKind = self
            .kind
            .parse()
            .with_context(|| format!("provider '{}'", self.name))?;
        let secret_key = self
            .resolve_api_key()
            .with_context(|| format!("resolving api key for provider '{}'", self.name))?;

        let mut config = ProviderConfig::new(kind, self.sub_type.as_str())
            .with_secret_key(secret_key)
            .with_temperature(self.temperature)
            .with_stream(self.stream);
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.as_str());
        }
        Ok(config)
    }

    /// [`Self::to_provider_config`] on the blocking pool, since `api_key_cmd`
    /// waits on a child process.
    pub async fn resolve(self) -> Result<ProviderConfig> {
        tokio::task::spawn_blocking(move || self.to_provider_config())
            .await
            .context("api key resolution task failed")?
    }
}

impl fmt::Debug for ProviderSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSection")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("sub_type", &self.sub_type)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .field("stream", &self.stream)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_env", &self.api_key_env)
            .field("api_key_cmd", &self.api_key_cmd)
            .finish()
    }
}

impl Config {
    /// Load an explicit file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    pub fn load_or_default() -> Self {
        let path = config_path();
        Config::load(&path).unwrap_or_else(|e| {
            warn!(error = %format!("{e:#}"), "using default configuration");
            Config::default()
        })
    }

    /// Pick a provider by name, else the configured default, else the first entry.
    pub fn select(&self, name: Option<&str>) -> Result<ProviderSection> {
        if self.providers.is_empty() {
            return match name {
                None | Some("dummy") => Ok(ProviderSection::dummy()),
                Some(name) => bail!("no provider named '{name}' (no providers configured)"),
            };
        }

        let wanted = name.or(self.default.as_deref());
        match wanted {
            Some(wanted) => self
                .providers
                .iter()
                .find(|p| p.name == wanted)
                .cloned()
                .with_context(|| {
                    let known: Vec<&str> = self.providers.iter().map(|p| p.name.as_str()).collect();
                    format!(
                        "no provider named '{wanted}' (configured: {})",
                        known.join(", ")
                    )
                }),
            None => Ok(self.providers[0].clone()),
        }
    }
}

pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("modelprov").join("config.toml")
}
