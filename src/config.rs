use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("usage: tibia-core <world-root> [engine.yaml]")]
    Usage,
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid engine config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
    pub engine_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        if args.len() < 2 {
            return Err(ConfigError::Usage);
        }
        let root = Path::new(&args[1]).to_path_buf();
        let engine_path = if args.len() > 2 {
            Some(PathBuf::from(&args[2]))
        } else {
            env_value("TIBIA_ENGINE_CONFIG").map(PathBuf::from)
        };
        Ok(Self { root, engine_path })
    }

    /// Engine settings from the configured file, or `<root>/engine.yaml`
    /// when present, with `TIBIA_*` overrides applied on top.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let path = self
            .engine_path
            .clone()
            .unwrap_or_else(|| self.root.join("engine.yaml"));
        let mut config = if path.exists() || self.engine_path.is_some() {
            EngineConfig::load(&path)?
        } else {
            EngineConfig::default()
        };
        config.apply_env();
        Ok(config)
    }
}

/// Tunables of the world engine and its task stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub decay_interval_ms: u64,
    pub think_interval_ms: u64,
    pub check_buckets: usize,
    /// Seconds between global saves; 0 disables them.
    pub save_interval_secs: u64,
    pub lag_threshold_ms: u64,
    pub action_retry_ms: u64,
    pub action_exhaust_ms: u64,
    pub log_level: String,
    /// Carrying capacity of new characters, in weight units.
    pub player_capacity: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decay_interval_ms: 10_000,
            think_interval_ms: 1_000,
            check_buckets: 10,
            save_interval_secs: 0,
            lag_threshold_ms: 50,
            action_retry_ms: 400,
            action_exhaust_ms: 1_000,
            log_level: "info".to_string(),
            player_capacity: 40_000,
        }
    }
}

impl EngineConfig {
    pub fn parse_yaml(data: &str) -> Result<Self, ConfigError> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_yaml(&data)
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |key: &str| lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());
        override_number(&mut self.decay_interval_ms, "TIBIA_DECAY_INTERVAL_MS", read("TIBIA_DECAY_INTERVAL_MS"));
        override_number(&mut self.think_interval_ms, "TIBIA_THINK_INTERVAL_MS", read("TIBIA_THINK_INTERVAL_MS"));
        override_number(&mut self.save_interval_secs, "TIBIA_SAVE_INTERVAL_SECS", read("TIBIA_SAVE_INTERVAL_SECS"));
        if let Some(level) = read("TIBIA_LOG_LEVEL") {
            self.log_level = level;
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn override_number(slot: &mut u64, key: &str, value: Option<String>) {
    let Some(value) = value else {
        return;
    };
    match value.parse::<u64>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => eprintln!("tibia-core: invalid {} '{}', keeping {}", key, value, slot),
    }
}
