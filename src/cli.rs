use clap::Parser;
use std::path::PathBuf;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(
    name = "tvgo-export",
    about = "Export TV GO live channels as an M3U playlist and an XMLTV guide",
    version
)]
pub struct Args {
    /// Account login or nickname
    #[arg(short, long, env = "TVGO_USERNAME")]
    pub username: Option<String>,

    /// Account password
    #[arg(short, long, env = "TVGO_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Market code (cz, sk, ...)
    #[arg(short, long)]
    pub market: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Playlist output path
    #[arg(long)]
    pub playlist: Option<PathBuf>,

    /// Guide output path (gzip-compressed when it ends in .gz)
    #[arg(long)]
    pub guide: Option<PathBuf>,

    /// Days of guide data from today on
    #[arg(long)]
    pub days: Option<u32>,

    /// Days of guide data before today
    #[arg(long)]
    pub days_back: Option<u32>,

    /// Comma separated channel ids to export
    #[arg(long)]
    pub channels: Option<String>,

    /// Skip the guide
    #[arg(long)]
    pub no_epg: bool,

    /// File holding the persistent device id
    #[arg(long)]
    pub device_file: Option<PathBuf>,

    /// Wait for Enter before exiting
    #[arg(long)]
    pub wait: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Flags given on the command line win over the config file.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }
        if let Some(market) = &self.market {
            config.market = market.clone();
        }
        if let Some(path) = &self.playlist {
            config.playlist_path = path.clone();
        }
        if let Some(path) = &self.guide {
            config.guide_path = path.clone();
        }
        if let Some(days) = self.days {
            config.days = days;
        }
        if let Some(days_back) = self.days_back {
            config.days_back = days_back;
        }
        if let Some(channels) = &self.channels {
            config.channel_ids = channels.clone();
        }
        if self.no_epg {
            config.epg_enabled = false;
        }
        if let Some(path) = &self.device_file {
            config.device_id_file = Some(path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "tvgo-export",
            "--market",
            "sk",
            "--days",
            "3",
            "--no-epg",
            "--channels",
            "1,2",
            "--guide",
            "out/epg.xml.gz",
        ]);
        let mut config = AppConfig {
            username: "from-file".to_string(),
            days: 5,
            ..AppConfig::default()
        };
        args.apply(&mut config);

        assert_eq!(config.market, "sk");
        assert_eq!(config.days, 3);
        assert_eq!(config.days_back, 1);
        assert!(!config.epg_enabled);
        assert_eq!(config.channel_ids, "1,2");
        assert_eq!(config.guide_path, PathBuf::from("out/epg.xml.gz"));
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let args = Args::parse_from(["tvgo-export"]);
        let mut config = AppConfig {
            market: "hu".to_string(),
            days: 2,
            ..AppConfig::default()
        };
        args.apply(&mut config);
        assert_eq!(config.market, "hu");
        assert_eq!(config.days, 2);
        assert!(config.epg_enabled);
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Args::try_parse_from(["tvgo-export", "-v", "-q"]).is_err());
    }
}
