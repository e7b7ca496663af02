// src/config/mod.rs
//! Service configuration: file (TOML or JSON) + environment overrides.

pub mod ai;
pub mod limits;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use ai::LlmConfig;
pub use limits::LimitsConfig;

pub const ENV_CONFIG_PATH: &str = "ANALYZER_CONFIG_PATH";
pub const DEFAULT_CONFIG_TOML: &str = "config/analyzer.toml";
pub const DEFAULT_CONFIG_JSON: &str = "config/analyzer.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl AppConfig {
    /// Load using env var + fallbacks:
    /// 1) $ANALYZER_CONFIG_PATH (must exist)
    /// 2) config/analyzer.toml
    /// 3) config/analyzer.json
    /// 4) built-in defaults
    pub fn load() -> Result<Self> {
        let mut cfg = match locate()? {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        cfg.llm.resolve();
        Ok(cfg)
    }

    /// Parse one file without applying environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_config(&content, &ext).with_context(|| format!("parsing {}", path.display()))
    }
}

fn locate() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        return Err(anyhow!(
            "{ENV_CONFIG_PATH} points to non-existent path {}",
            pb.display()
        ));
    }
    Ok([DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_JSON]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists()))
}

fn parse_config(s: &str, ext: &str) -> Result<AppConfig> {
    match ext {
        "json" => Ok(serde_json::from_str(s)?),
        "toml" => Ok(toml::from_str(s)?),
        _ => toml::from_str(s)
            .map_err(anyhow::Error::from)
            .or_else(|_| serde_json::from_str(s).map_err(anyhow::Error::from))
            .map_err(|_| anyhow!("unsupported config format")),
    }
}
