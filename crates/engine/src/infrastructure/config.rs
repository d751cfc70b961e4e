//! Process configuration read from the environment.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_VIDEO_POLL_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub server_host: String,
    pub server_port: u16,
    /// SQLite database file
    pub db_path: String,
    /// Root directory served as `/public`
    pub public_root: PathBuf,
    pub video_poll_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".into(),
            server_port: 3000,
            db_path: "vitrine.db".into(),
            public_root: PathBuf::from("public"),
            video_poll_timeout: Duration::from_secs(DEFAULT_VIDEO_POLL_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let server_port = lookup("SERVER_PORT")
            .or_else(|| lookup("PORT"))
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.server_port);
        let video_poll_timeout = lookup("VIDEO_POLL_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.video_poll_timeout);

        Self {
            server_host: lookup("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port,
            db_path: lookup("VITRINE_DB").unwrap_or(defaults.db_path),
            public_root: lookup("PUBLIC_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.public_root),
            video_poll_timeout,
        }
    }
}
