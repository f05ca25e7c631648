//! Command-line interface for clockr.
//!
//! Each subcommand lives in its own module with an `Args` struct and a
//! `run` function. Shared setup (config, Clockify client, workspace) is here.

pub mod config;
pub mod error;
pub mod log;
pub mod projects;
pub mod status;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::debug;

use clockr::clockify::{ClockifyClient, ClockifyError};
use clockr::config::{Config, ConfigError};

use error::HelpfulError;

/// `<clockr home>/config.toml`
pub fn config_path() -> Result<PathBuf> {
    Ok(Config::path_in(&clockr_logging::clockr_home()?))
}

/// Load the config, turning failures into user-facing errors.
pub fn load_config() -> Result<(Config, PathBuf)> {
    let path = config_path()?;
    let config = Config::load(&path).map_err(|err| {
        let helpful = HelpfulError::invalid_config(&path, err.to_string());
        match err {
            ConfigError::Read { .. } | ConfigError::Parse { .. } => helpful,
            _ => helpful.with_suggestion("TRY: Check the [schedule] and [ai] sections"),
        }
    })?;
    debug!(path = %path.display(), "Config loaded");
    Ok((config, path))
}

/// Build the Clockify client and resolve the workspace to use.
pub async fn connect(config: &Config, config_path: &std::path::Path) -> Result<(ClockifyClient, String)> {
    if !config.has_api_key() {
        return Err(HelpfulError::missing_api_key(config_path).into());
    }
    let client = ClockifyClient::new(config.clockify.api_key.trim(), config.base_url())
        .context("Failed to create Clockify client")?;

    debug!(base_url = client.base_url(), "Resolving workspace");
    let workspace_id = match client.resolve_workspace(config.workspace_id()).await {
        Ok(id) => id,
        Err(ClockifyError::NoDefaultWorkspace | ClockifyError::MissingWorkspace) => {
            return Err(HelpfulError::missing_workspace().into())
        }
        Err(err) => return Err(err).context("Failed to resolve Clockify workspace"),
    };
    debug!(workspace_id = %workspace_id, "Workspace resolved");
    Ok((client, workspace_id))
}
