//! Client configuration loading and validation.
//!
//! Options come from defaults, an optional `oobabooga.yaml` (with environment
//! variable interpolation), and `OOBABOOGA_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::errors::ClientError;

/// File name searched for by [`find_config_path`].
pub const CONFIG_FILE_NAME: &str = "oobabooga.yaml";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Connection settings shared by every call a client makes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Server root, without the `/v1` suffix.
    pub base_url: String,
    /// Sent as `Authorization: Bearer …` when set.
    pub api_key: Option<String>,
    /// Total timeout for non-streaming requests.
    pub timeout_secs: u64,
    /// Total timeout for streaming requests.
    ///
    /// Local models can take a long time to process a large prompt before the
    /// first token, and the whole body must arrive within this window.
    pub stream_timeout_secs: u64,
    /// Model name sent when a call does not choose one.
    pub model_name: String,
    /// Name carried by `TransportRejected` errors.
    pub provider_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            api_key: None,
            timeout_secs: 120,
            stream_timeout_secs: 600,
            model_name: "default".to_string(),
            provider_name: "Oobabooga".to_string(),
        }
    }
}

impl ClientOptions {
    /// Defaults overlaid with `OOBABOOGA_BASE_URL`, `OOBABOOGA_API_KEY` and
    /// `OOBABOOGA_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::default().with_env_overrides()
    }

    /// Apply `OOBABOOGA_*` environment overrides to these options.
    pub fn with_env_overrides(mut self) -> Result<Self, ClientError> {
        if let Ok(url) = std::env::var("OOBABOOGA_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(key) = std::env::var("OOBABOOGA_API_KEY") {
            self.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Ok(raw) = std::env::var("OOBABOOGA_TIMEOUT_SECS") {
            self.timeout_secs = raw.trim().parse().map_err(|e| ClientError::ConfigError {
                reason: format!("OOBABOOGA_TIMEOUT_SECS is not a number: {e}"),
            })?;
        }
        Ok(self)
    }

    /// Check that the options can build a working client.
    pub fn validate(&self) -> Result<(), ClientError> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| ClientError::ConfigError {
            reason: format!("invalid base_url '{}': {e}", self.base_url),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::ConfigError {
                reason: format!("base_url must be http or https, got '{}'", url.scheme()),
            });
        }
        if self.timeout_secs == 0 || self.stream_timeout_secs == 0 {
            return Err(ClientError::ConfigError {
                reason: "timeouts must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Join an API path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate `oobabooga.yaml`.
///
/// Checks `OOBABOOGA_CONFIG` first, then searches upward from `start`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ClientError> {
    if let Ok(path) = std::env::var("OOBABOOGA_CONFIG") {
        let candidate = PathBuf::from(expand_home(&path));
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(ClientError::ConfigError {
        reason: format!("could not find {CONFIG_FILE_NAME}"),
    })
}

/// Load and validate client options from a YAML file.
///
/// Performs environment-variable interpolation on `${VAR_NAME}` and
/// `${VAR_NAME:-default}` before parsing. Missing keys take their defaults.
pub fn load_options(path: &Path) -> Result<ClientOptions, ClientError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ClientError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let interpolated = interpolate_env_vars(&raw)?;

    let options: ClientOptions =
        serde_yaml::from_str(&interpolated).map_err(|e| ClientError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;

    options.validate()?;
    Ok(options)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Substitute `${VAR}` and `${VAR:-default}` references.
///
/// An unset variable without a default becomes the empty string. A `${`
/// without its closing brace, or with an empty name, is an error.
fn interpolate_env_vars(input: &str) -> Result<String, ClientError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let reference = &rest[start + 2..];
        let Some(close) = reference.find('}') else {
            return Err(ClientError::ConfigError {
                reason: format!("unterminated '${{' in config near '{}'", preview(&rest[start..])),
            });
        };
        output.push_str(&lookup_var(&reference[..close])?);
        rest = &reference[close + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

/// Resolve the inside of one `${...}` reference. Defaults get `~` expansion.
fn lookup_var(reference: &str) -> Result<String, ClientError> {
    let (name, default) = match reference.split_once(":-") {
        Some((name, default)) => (name.trim(), Some(default)),
        None => (reference.trim(), None),
    };
    if name.is_empty() {
        return Err(ClientError::ConfigError {
            reason: format!("empty variable name in '${{{reference}}}'"),
        });
    }

    Ok(match (std::env::var(name), default) {
        (Ok(value), _) => value,
        (Err(_), Some(default)) => expand_home(default),
        (Err(_), None) => String::new(),
    })
}

/// First line of `text`, capped for error messages.
fn preview(text: &str) -> String {
    text.lines().next().unwrap_or_default().chars().take(40).collect()
}

/// Replace a leading `~` or `~/` with the home directory. `~user` is left alone.
fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{rest}", home.display()),
        None => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
