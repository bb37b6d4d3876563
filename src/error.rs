//! Error types shared by the player, the sources and the configuration layer.

use std::path::PathBuf;

/// Failures the player reports on screen.
///
/// None of these stop the player: a load failure or an empty playlist parks it
/// in a display state until the next `initialize`, and a stalled video only
/// raises a warning on the affected slide.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayerError {
    #[error("Unable to load the playlist: {0}")]
    Load(String),

    #[error("The playlist is empty")]
    EmptyPlaylist,

    #[error("Video {media} has not finished after {waited_ms} ms")]
    StalledMedia { media: String, waited_ms: u64 },
}

/// Errors raised while fetching a playlist from its source.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid playlist manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid slide #{index}: {reason}")]
    InvalidItem { index: usize, reason: String },
}

/// Errors raised while loading the kiosk configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
