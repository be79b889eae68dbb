use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// Client configuration layers: defaults → <data_dir>/client.toml → DUPLEX_*
// env vars. The base URLs are the two the environment provides at startup:
//
//   DUPLEX_API_BASE_URL=http://127.0.0.1:7340
//   DUPLEX_WS_BASE_URL=ws://127.0.0.1:7340

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            ws_base_url: default_ws_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:7340".to_string()
}
fn default_ws_base_url() -> String {
    "ws://127.0.0.1:7340".to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_connect_timeout_secs() -> u64 {
    10
}

/// Backoff for reopening a lost room socket: starts at `initial`, doubles
/// per failed attempt, capped at `max`. Resets after a successful open.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// The next delay after `delay`.
    pub fn next(&self, delay: Duration) -> Duration {
        (delay * 2).min(self.max)
    }
}

/// Resolved client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub data_dir: PathBuf,
    pub api_base_url: String,
    pub ws_base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("could not determine home directory")?
                .join(".duplex"),
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data dir: {}", data_dir.display()))?;

        let file_config: FileConfig = load_figment(&data_dir)
            .extract()
            .context("invalid client configuration")?;

        Ok(Self::from_file(data_dir, file_config))
    }

    /// Build a config pointing at explicit base URLs (used by tests and by
    /// anything that already knows where the server lives).
    pub fn for_base_urls(api_base_url: impl Into<String>, ws_base_url: impl Into<String>) -> Self {
        Self::from_file(
            std::env::temp_dir(),
            FileConfig {
                api_base_url: api_base_url.into(),
                ws_base_url: ws_base_url.into(),
                ..FileConfig::default()
            },
        )
    }

    fn from_file(data_dir: PathBuf, file_config: FileConfig) -> Self {
        Self {
            data_dir,
            api_base_url: file_config.api_base_url.trim_end_matches('/').to_string(),
            ws_base_url: file_config.ws_base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(file_config.request_timeout_secs),
            connect_timeout: Duration::from_secs(file_config.connect_timeout_secs),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

fn load_figment(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("client.toml")))
        .merge(Env::prefixed("DUPLEX_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let tmp = tempfile::tempdir().unwrap();
        let config: FileConfig = load_figment(tmp.path()).extract().unwrap();
        assert_eq!(config.api_base_url, "http://127.0.0.1:7340");
        assert_eq!(config.ws_base_url, "ws://127.0.0.1:7340");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = ClientConfig::for_base_urls("http://host:1/", "ws://host:1/");
        assert_eq!(config.api_base_url, "http://host:1");
        assert_eq!(config.ws_base_url, "ws://host:1");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        let mut delay = policy.initial;
        assert_eq!(delay, Duration::from_millis(500));
        delay = policy.next(delay);
        assert_eq!(delay, Duration::from_secs(1));
        for _ in 0..10 {
            delay = policy.next(delay);
        }
        assert_eq!(delay, Duration::from_secs(30));
    }
}
