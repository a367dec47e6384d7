//! One export run: sign in, resolve the catalog, write playlist and guide

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, TimeZone};
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, Transport};
use crate::auth::{AuthOutcome, AuthSession, DeviceRegistration};
use crate::catalog::list_live_channels;
use crate::epg::{self, Attribution};
use crate::error::{ProviderRejection, RunError, StreamError};
use crate::m3u;
use crate::models::{Channel, Credentials, DeviceProfile, StreamEntry};
use crate::recovery::{self, DevicePicker};
use crate::stream::resolve_url;

/// Name shown as the guide source
pub const SOURCE_NAME: &str = "TV GO";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpgOptions {
    pub days: u32,
    pub days_back: u32,
}

/// Everything a run needs, resolved from config and CLI.
#[derive(Clone)]
pub struct RunOptions {
    pub credentials: Credentials,
    pub device_id: String,
    pub os_version: String,
    pub app_version: String,
    pub channel_filter: Option<HashSet<i64>>,
    /// `None` disables the guide
    pub epg: Option<EpgOptions>,
    pub playlist_path: PathBuf,
    pub guide_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// Written with this many entries
    Written(usize),
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub playlist: ArtifactStatus,
    pub guide: ArtifactStatus,
    /// Channels dropped because the provider refused a stream URL
    pub failed_channels: Vec<String>,
    /// Channels outside the subscription
    pub unavailable_channels: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    LoginRejected(ProviderRejection),
    Finished(RunReport),
}

enum Resolution {
    Complete {
        entries: Vec<StreamEntry>,
        failed: Vec<String>,
    },
    Aborted(String),
}

/// Run the export. `now` fixes "today" for the guide windows; its zone
/// stamps every guide timestamp with the offset in force at that time.
pub fn run<T: Transport, Tz: TimeZone>(
    client: &ApiClient<T>,
    options: &RunOptions,
    picker: &mut dyn DevicePicker,
    now: DateTime<Tz>,
) -> Result<RunOutcome, RunError> {
    let market = client.market();
    let device = market.device_profile();
    let registration = DeviceRegistration {
        device_id: options.device_id.clone(),
        device_name: device.device_name.clone(),
        device_type: device.device_type.clone(),
        os_version: options.os_version.clone(),
        app_version: options.app_version.clone(),
        language: market.api_language(),
    };

    let mut session = AuthSession::new();
    let access_token = match session.sign_in(client, &registration, &options.credentials)? {
        AuthOutcome::Granted(token) => {
            debug!(state = session.state_name(), "session ready");
            token
        }
        AuthOutcome::Rejected(rejection) => {
            error!(reason = %rejection, "sign-in rejected by provider");
            return Ok(RunOutcome::LoginRejected(rejection));
        }
    };

    let (channels, _) = list_live_channels(client, &access_token, options.channel_filter.as_ref())
        .map_err(RunError::Catalog)?;
    info!(channels = channels.len(), market = %market, "generating playlist");

    let (entries, failed) =
        match resolve_channels(client, &access_token, &channels, &device, picker)? {
            Resolution::Complete { entries, failed } => (entries, failed),
            Resolution::Aborted(reason) => {
                error!(%reason, "playlist generation aborted");
                return Ok(RunOutcome::Finished(RunReport {
                    playlist: ArtifactStatus::Failed(reason),
                    guide: ArtifactStatus::Skipped,
                    failed_channels: Vec::new(),
                    unavailable_channels: 0,
                }));
            }
        };
    let unavailable = entries.iter().filter(|e| e.url.is_none()).count() - failed.len();

    let playlist = match m3u::write_playlist(&options.playlist_path, &entries) {
        Ok(count) => {
            info!(path = %options.playlist_path.display(), channels = count, "playlist written");
            ArtifactStatus::Written(count)
        }
        Err(e) => {
            error!(error = %e, "playlist not written");
            ArtifactStatus::Failed(e.to_string())
        }
    };

    let guide = match options.epg {
        Some(epg_options) => export_guide(client, &access_token, &channels, options, epg_options, &now),
        None => ArtifactStatus::Skipped,
    };

    Ok(RunOutcome::Finished(RunReport {
        playlist,
        guide,
        failed_channels: failed,
        unavailable_channels: unavailable,
    }))
}

/// Resolve every channel in catalog order. A device-limit hit triggers one
/// operator-mediated recovery, after which resolution restarts from the top.
fn resolve_channels<T: Transport>(
    client: &ApiClient<T>,
    access_token: &str,
    channels: &[Channel],
    device: &DeviceProfile,
    picker: &mut dyn DevicePicker,
) -> Result<Resolution, RunError> {
    let mut recovered = false;

    'attempt: loop {
        let mut entries = Vec::with_capacity(channels.len());
        let mut failed = Vec::new();

        for channel in channels {
            match resolve_url(client, access_token, channel, device) {
                Ok(url) => {
                    if url.is_some() {
                        info!(channel = %channel.name, "resolved");
                    }
                    entries.push(StreamEntry {
                        channel: channel.clone(),
                        url,
                    });
                }
                Err(StreamError::DeviceLimitExceeded(message)) => {
                    error!(%message, "device limit reached");
                    if recovered {
                        return Ok(Resolution::Aborted(message));
                    }
                    if let Err(e) = recovery::recover(client, access_token, picker) {
                        return Ok(Resolution::Aborted(e.to_string()));
                    }
                    recovered = true;
                    continue 'attempt;
                }
                Err(StreamError::Resolution { channel: name, message }) => {
                    warn!(channel = %name, %message, "skipping channel");
                    failed.push(name);
                    entries.push(StreamEntry {
                        channel: channel.clone(),
                        url: None,
                    });
                }
                Err(StreamError::Api(e)) => return Err(RunError::Stream(e)),
            }
        }

        return Ok(Resolution::Complete { entries, failed });
    }
}

fn export_guide<T: Transport, Tz: TimeZone>(
    client: &ApiClient<T>,
    access_token: &str,
    channels: &[Channel],
    options: &RunOptions,
    epg_options: EpgOptions,
    now: &DateTime<Tz>,
) -> ArtifactStatus {
    info!(days = epg_options.days, days_back = epg_options.days_back, "downloading EPG");
    let windows = epg::day_windows(now.date_naive(), epg_options.days_back, epg_options.days);

    let programs = match epg::fetch_guide(client, access_token, channels, &windows, &now.timezone()) {
        Ok(programs) => programs,
        Err(e) => {
            error!(error = %e, "EPG step aborted, no guide written");
            return ArtifactStatus::Failed(e.to_string());
        }
    };

    let count = programs.len();
    let guide = epg::build_guide(channels, programs);
    let attribution = Attribution::new(SOURCE_NAME, client.base_url());
    match epg::write_guide(
        &options.guide_path,
        &guide,
        &attribution,
        client.market().guide_language(),
    ) {
        Ok(()) => {
            info!(path = %options.guide_path.display(), programs = count, "guide written");
            ArtifactStatus::Written(count)
        }
        Err(e) => {
            error!(error = %e, "guide not written");
            ArtifactStatus::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
