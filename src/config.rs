//! Configuration management

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::DEFAULT_USER_AGENT;
use crate::catalog::parse_allow_list;
use crate::error::ConfigError;
use crate::models::{Credentials, Market};
use crate::pipeline::{EpgOptions, RunOptions};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_market")]
    pub market: String,
    // EPG settings
    #[serde(default = "default_true")]
    pub epg_enabled: bool,
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_days_back")]
    pub days_back: u32,
    /// Comma separated channel ids to keep; empty keeps all
    #[serde(default)]
    pub channel_ids: String,
    // Output
    #[serde(default = "default_playlist_path")]
    pub playlist_path: PathBuf,
    #[serde(default = "default_guide_path")]
    pub guide_path: PathBuf,
    #[serde(default)]
    pub device_id_file: Option<PathBuf>,
    // Client identity
    #[serde(default = "default_os_version")]
    pub os_version: String,
    #[serde(default = "default_app_version")]
    pub app_version: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_market() -> String { "cz".to_string() }
fn default_true() -> bool { true }
fn default_days() -> u32 { 7 }
fn default_days_back() -> u32 { 1 }
fn default_playlist_path() -> PathBuf { PathBuf::from("playlist.m3u") }
fn default_guide_path() -> PathBuf { PathBuf::from("epg.xml") }
fn default_os_version() -> String { "0.0.0".to_string() }
fn default_app_version() -> String { "4.0.12".to_string() }
fn default_user_agent() -> String { DEFAULT_USER_AGENT.to_string() }
fn default_timeout() -> u64 { 30 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            market: default_market(),
            epg_enabled: true,
            days: 7,
            days_back: 1,
            channel_ids: String::new(),
            playlist_path: default_playlist_path(),
            guide_path: default_guide_path(),
            device_id_file: None,
            os_version: default_os_version(),
            app_version: default_app_version(),
            user_agent: default_user_agent(),
            timeout_secs: 30,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("tvgo_export");
        path.push("config.json");
        path
    }

    /// Load from an explicit file (which must exist) or from the default
    /// location (falling back to defaults when absent).
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::config_path();
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn market(&self) -> Result<Market, ConfigError> {
        self.market.parse()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Validate and turn into pipeline input.
    pub fn run_options(&self, device_id: String) -> Result<RunOptions, ConfigError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        let channel_filter = parse_allow_list(&self.channel_ids)
            .map_err(|_| ConfigError::InvalidChannelIds(self.channel_ids.clone()))?;

        Ok(RunOptions {
            credentials: Credentials {
                username: self.username.clone(),
                password: self.password.clone(),
            },
            device_id,
            os_version: self.os_version.clone(),
            app_version: self.app_version.clone(),
            channel_filter,
            epg: self.epg_enabled.then_some(EpgOptions {
                days: self.days,
                days_back: self.days_back,
            }),
            playlist_path: self.playlist_path.clone(),
            guide_path: self.guide_path.clone(),
        })
    }
}
