//! Data models for the TV GO exporter

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use unicode_normalization::UnicodeNormalization;

use crate::error::ConfigError;

/// Player identity the provider expects when issuing stream URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub device_type: String,
    pub device_name: String,
}

/// Operating market, e.g. `cz` or `sk`. Selects the API host and language.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Market(String);

impl Market {
    pub fn code(&self) -> &str {
        &self.0
    }

    pub fn base_url(&self) -> String {
        format!("https://{}go.magio.tv", self.0)
    }

    /// Language code sent with API requests ("CZ", "SK", ...)
    pub fn api_language(&self) -> String {
        self.0.to_uppercase()
    }

    /// Language tag for guide display names
    pub fn guide_language(&self) -> &str {
        match self.0.as_str() {
            "cz" => "cs",
            other => other,
        }
    }

    /// The CZ client registers as an Android phone, everything else as a set-top box.
    pub fn device_profile(&self) -> DeviceProfile {
        match self.0.as_str() {
            "cz" => DeviceProfile {
                device_type: "OTT_ANDROID".to_string(),
                device_name: "Xiaomi Mi 11".to_string(),
            },
            _ => DeviceProfile {
                device_type: "OTT_STB".to_string(),
                device_name: "KSTB6077".to_string(),
            },
        }
    }

    /// Stream URLs in these markets point at a redirector that must be resolved.
    pub fn resolves_redirects(&self) -> bool {
        matches!(self.0.as_str(), "cz" | "sk")
    }
}

impl FromStr for Market {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_lowercase();
        if code.len() == 2 && code.chars().all(|c| c.is_ascii_lowercase()) {
            Ok(Market(code))
        } else {
            Err(ConfigError::InvalidMarket(s.to_string()))
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Live channel from the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub logo_url: String,
    /// Category name; `None` when the category listing does not mention the channel
    pub category: Option<String>,
}

impl Channel {
    pub fn guide_id(&self) -> String {
        guide_id(self.id, &self.name)
    }
}

/// Channel paired with its negotiated stream URL, if any.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub channel: Channel,
    pub url: Option<String>,
}

/// Two-level program category
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Genre {
    pub genre: String,
    pub subgenre: String,
}

/// Canonical program record. Equality over all fields drives deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramEntry {
    pub channel_guide_id: String,
    pub start: DateTime<FixedOffset>,
    pub stop: DateTime<FixedOffset>,
    pub title: String,
    pub description: String,
    pub year: Option<String>,
    pub genre: Option<Genre>,
    pub icon: Option<String>,
}

/// Channel record as written to the guide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideChannel {
    pub id: String,
    pub display_name: String,
    pub icon: Option<String>,
}

impl From<&Channel> for GuideChannel {
    fn from(channel: &Channel) -> Self {
        Self {
            id: channel.guide_id(),
            display_name: channel.name.clone(),
            icon: (!channel.logo_url.is_empty()).then(|| channel.logo_url.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Guide {
    pub channels: Vec<GuideChannel>,
    pub programs: Vec<ProgramEntry>,
}

/// Playback device registered to the account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub is_current: bool,
}

/// Legacy guide key kept for compatibility with existing EPG consumers.
const LEGACY_GUIDE_IDS: &[(i64, &str)] = &[(5000, "tm-6016-eurosport-1")];

/// Guide cross-reference key shared by playlist entries and guide records.
pub fn guide_id(channel_id: i64, name: &str) -> String {
    if let Some((_, legacy)) = LEGACY_GUIDE_IDS.iter().find(|(id, _)| *id == channel_id) {
        return (*legacy).to_string();
    }
    format!("tm-{}-{}", channel_id, slugify(name))
}

/// "Nova Sport 1 HD" -> "nova-sport-1"
fn slugify(name: &str) -> String {
    let folded = ascii_fold(name);
    let trimmed = folded.trim();
    let base = trimmed.strip_suffix(" HD").unwrap_or(trimmed);
    base.to_lowercase().replace(' ', "-")
}

/// Decompose and drop everything that is not ASCII ("ČT1" -> "CT1").
pub fn ascii_fold(s: &str) -> String {
    s.nfkd().filter(char::is_ascii).collect()
}
