use anyhow::{Context, Result, anyhow};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/tubecast-env";
pub const DEFAULT_TUBECAST_PORT: u16 = 8080;
pub const DEFAULT_TUBECAST_HOST: &str = "127.0.0.1";
pub const DEFAULT_DB_FILE: &str = "tubecast.db";

/// Raw key/value contents of the config file. Everything is optional here;
/// `load_runtime_config` decides which keys are mandatory.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub media_root: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub secret_key: Option<String>,
    pub tubecast_port: Option<u16>,
    pub tubecast_host: Option<String>,
}

/// Fully resolved runtime configuration injected into the server components.
/// The signing secret lives here rather than in ambient process state so the
/// credential layer receives it explicitly at construction.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub media_root: PathBuf,
    pub db_path: PathBuf,
    pub secret_key: String,
    pub tubecast_port: u16,
    pub tubecast_host: String,
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"');
            match key {
                "MEDIA_ROOT" => cfg.media_root = Some(PathBuf::from(value)),
                "DB_PATH" => cfg.db_path = Some(PathBuf::from(value)),
                "SECRET_KEY" => {
                    if !value.is_empty() {
                        cfg.secret_key = Some(value.to_string());
                    }
                }
                "TUBECAST_PORT" => {
                    let port: u16 = value.parse().with_context(|| {
                        format!("Parsing TUBECAST_PORT from {}", path.display())
                    })?;
                    cfg.tubecast_port = Some(port);
                }
                "TUBECAST_HOST" => {
                    if !value.is_empty() {
                        cfg.tubecast_host = Some(value.to_string());
                    }
                }
                _ => {}
            }
        }
    }
    Ok(Some(cfg))
}

pub fn load_runtime_config() -> Result<RuntimeConfig> {
    load_runtime_config_from(Path::new(DEFAULT_CONFIG_PATH))
}

pub fn load_runtime_config_from(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let path = path.as_ref();
    let cfg = read_env_config(path)?
        .ok_or_else(|| anyhow!("Missing config file at {}", path.display()))?;
    let media_root = cfg
        .media_root
        .ok_or_else(|| anyhow!("MEDIA_ROOT not set in {}", path.display()))?;
    let secret_key = cfg
        .secret_key
        .ok_or_else(|| anyhow!("SECRET_KEY not set in {}", path.display()))?;
    let db_path = cfg
        .db_path
        .unwrap_or_else(|| media_root.join(DEFAULT_DB_FILE));
    let tubecast_port = cfg.tubecast_port.unwrap_or(DEFAULT_TUBECAST_PORT);
    let tubecast_host = cfg
        .tubecast_host
        .unwrap_or_else(|| DEFAULT_TUBECAST_HOST.to_string());
    Ok(RuntimeConfig {
        media_root,
        db_path,
        secret_key,
        tubecast_port,
        tubecast_host,
    })
}
