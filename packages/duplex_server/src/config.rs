use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [server]
//                    port = 7340
//
//   env var:         DUPLEX_SERVER__PORT=7340   (double underscore = nesting)
//
//   (single underscore stays within field names: DUPLEX_AUTH__TOKEN_TTL_SECS)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub auth: AuthFileConfig,
}

/// Server tuning knobs (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Messages returned per history page when the client sends no limit.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,
    /// Per-room broadcast channel capacity; slow subscribers past this lag.
    #[serde(default = "default_room_channel_capacity")]
    pub room_channel_capacity: usize,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            history_page_size: default_history_page_size(),
            room_channel_capacity: default_room_channel_capacity(),
        }
    }
}

/// Auth-related tunables (lives under `[auth]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthFileConfig {
    /// Credential lifetime. The default matches the 90-day login window.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_allow_registration")]
    pub allow_registration: bool,
}

impl Default for AuthFileConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl(),
            allow_registration: default_allow_registration(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7340
}
fn default_history_page_size() -> u32 {
    20
}
fn default_room_channel_capacity() -> usize {
    256
}
fn default_token_ttl() -> u64 {
    90 * 24 * 3600
}
fn default_allow_registration() -> bool {
    true
}

/// Resolved runtime configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub server: ServerFileConfig,
    pub auth: AuthFileConfig,
}

impl ServerConfig {
    /// Layer defaults → `config.toml` → `DUPLEX_*` env vars, resolve the
    /// data directory (default `~/.duplex`), and make sure it exists.
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
            .context("invalid configuration")?;

        let db_path = data_dir.join("duplex.db");
        Ok(Self {
            data_dir,
            db_path,
            server: file_config.server,
            auth: file_config.auth,
        })
    }

    pub fn db_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.db_path.display())
    }
}

/// Build a figment that layers: defaults → config.toml → DUPLEX_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `DUPLEX_SERVER__PORT=7340`        →  `server.port = 7340`
///   `DUPLEX_AUTH__TOKEN_TTL_SECS=3600` →  `auth.token_ttl_secs = 3600`
fn load_figment(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("DUPLEX_").split("__"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config: FileConfig = load_figment(tmp.path()).extract().unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 7340);
        assert_eq!(config.server.history_page_size, 20);
        assert!(config.auth.allow_registration);
    }

    #[test]
    fn config_toml_overrides_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[server]\nport = 9100\nhistory_page_size = 50\n",
        )
        .unwrap();
        let config: FileConfig = load_figment(tmp.path()).extract().unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.history_page_size, 50);
        // Untouched sections keep their defaults
        assert_eq!(config.auth.token_ttl_secs, 90 * 24 * 3600);
    }

    #[test]
    fn db_url_points_into_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(Some(tmp.path().to_path_buf())).unwrap();
        assert!(config.db_url().contains("duplex.db"));
        assert!(config.data_dir.exists());
    }
}
