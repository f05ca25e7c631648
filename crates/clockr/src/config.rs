//! `config.toml` loading with environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::schedule::{ScheduleError, WorkSchedule};

pub const CONFIG_FILE: &str = "config.toml";

/// Providers the binary knows how to build.
pub const KNOWN_PROVIDERS: &[&str] = &["claude-cli"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("interval_minutes must be between 1 and 1440, got {0}")]
    InvalidInterval(u32),

    #[error("unknown AI provider {0:?} (supported: claude-cli)")]
    UnknownProvider(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockifySection {
    pub api_key: String,
    pub workspace_id: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    pub interval_minutes: u32,
    pub work_start: String,
    pub work_end: String,
    /// ISO weekdays, Monday = 1
    pub work_days: Vec<u32>,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            work_start: "09:00".to_string(),
            work_end: "17:00".to_string(),
            work_days: vec![1, 2, 3, 4, 5],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSection {
    pub provider: String,
    /// Executable used by the `claude-cli` provider
    pub binary: String,
    pub model: String,
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            provider: "claude-cli".to_string(),
            binary: "claude".to_string(),
            model: "sonnet".to_string(),
        }
    }
}

/// Resolved clockr configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub clockify: ClockifySection,
    pub schedule: ScheduleSection,
    pub ai: AiSection,
}

impl Config {
    pub fn path_in(home: &Path) -> PathBuf {
        home.join(CONFIG_FILE)
    }

    /// Read `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `CLOCKIFY_*` overrides; empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let overrides: [(&str, &mut String); 3] = [
            ("CLOCKIFY_API_KEY", &mut self.clockify.api_key),
            ("CLOCKIFY_WORKSPACE_ID", &mut self.clockify.workspace_id),
            ("CLOCKIFY_BASE_URL", &mut self.clockify.base_url),
        ];
        for (name, slot) in overrides {
            if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                *slot = value;
            }
        }
    }

    /// Load from `path` and apply the process environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let minutes = self.schedule.interval_minutes;
        if minutes == 0 || minutes > 24 * 60 {
            return Err(ConfigError::InvalidInterval(minutes));
        }
        if !KNOWN_PROVIDERS.contains(&self.ai.provider.as_str()) {
            return Err(ConfigError::UnknownProvider(self.ai.provider.clone()));
        }
        self.work_schedule()?;
        Ok(())
    }

    pub fn work_schedule(&self) -> Result<WorkSchedule, ScheduleError> {
        WorkSchedule::parse(
            &self.schedule.work_start,
            &self.schedule.work_end,
            &self.schedule.work_days,
        )
    }

    pub fn has_api_key(&self) -> bool {
        !self.clockify.api_key.trim().is_empty()
    }

    /// Workspace from config, if any.
    pub fn workspace_id(&self) -> Option<&str> {
        Some(self.clockify.workspace_id.as_str()).filter(|id| !id.is_empty())
    }

    pub fn base_url(&self) -> Option<&str> {
        Some(self.clockify.base_url.as_str()).filter(|url| !url.is_empty())
    }

    /// API key with everything but the last four characters hidden.
    pub fn masked_key(&self) -> String {
        let key = self.clockify.api_key.trim();
        if key.is_empty() {
            return "(not set)".to_string();
        }
        let chars: Vec<char> = key.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}", "*".repeat(chars.len() - 4), tail)
    }

    /// A copy safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.clockify.api_key = self.masked_key();
        copy
    }
}
