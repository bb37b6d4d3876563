//! Kiosk configuration, read from a TOML file.
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! usable configuration once a playlist location is supplied.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigError;
use crate::player::PlayerSettings;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub playlist: PlaylistConfig,
    pub playback: PlaybackConfig,
    pub video: VideoConfig,
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistConfig {
    /// JSON manifest listing the slides.
    pub manifest: Option<PathBuf>,
    /// Directory of media files played in file-name order.
    pub directory: Option<PathBuf>,
    /// Shuffle the slides once after loading.
    pub shuffle: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub default_image_duration_ms: u64,
    pub welcome_duration_ms: u64,
    pub welcome_show_qr: bool,
    /// 0 disables the stalled-video warning.
    pub stall_warning_ms: u64,
    pub max_backlog: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_image_duration_ms: DEFAULT_IMAGE_DURATION_MS,
            welcome_duration_ms: WELCOME_DURATION_MS,
            welcome_show_qr: true,
            stall_warning_ms: STALL_WARNING_MS,
            max_backlog: MAX_WELCOME_BACKLOG,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Player invoked for each video slide; `{source}` is replaced by the
    /// media path. The slide ends when the process exits.
    pub command: Vec<String>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            command: ["ffplay", "-autoexit", "-fs", "-loglevel", "error", "{source}"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: i32,
    pub height: i32,
    pub fps: u32,
    /// Image drawn in the corner of slides with `show_qr`.
    pub qr_image: Option<PathBuf>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: RENDER_WIDTH,
            height: RENDER_HEIGHT,
            fps: FPS,
            qr_image: None,
        }
    }
}

impl KioskConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        // Relative paths in the file are relative to the file itself.
        if let Some(base) = path.parent() {
            for entry in [
                &mut config.playlist.manifest,
                &mut config.playlist.directory,
                &mut config.window.qr_image,
            ]
            .into_iter()
            .flatten()
            {
                if entry.is_relative() {
                    *entry = base.join(&*entry);
                }
            }
        }
        Ok(config)
    }

    /// Checks the configuration once command-line overrides are applied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.playlist.manifest, &self.playlist.directory) {
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "either playlist.manifest or playlist.directory is required".to_string(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(
                    "playlist.manifest and playlist.directory are mutually exclusive".to_string(),
                ));
            }
            _ => {}
        }

        if self.playback.default_image_duration_ms == 0 || self.playback.welcome_duration_ms == 0 {
            return Err(ConfigError::Invalid("slide durations must be positive".to_string()));
        }
        if self.video.command.is_empty() {
            return Err(ConfigError::Invalid("video.command must name a program".to_string()));
        }
        if self.window.width <= 0 || self.window.height <= 0 || self.window.fps == 0 {
            return Err(ConfigError::Invalid("window size and fps must be positive".to_string()));
        }
        Ok(())
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            default_image_duration_ms: self.playback.default_image_duration_ms,
            welcome_duration_ms: self.playback.welcome_duration_ms,
            welcome_show_qr: self.playback.welcome_show_qr,
            max_backlog: self.playback.max_backlog,
        }
    }

    pub fn stall_warning(&self) -> Option<Duration> {
        match self.playback.stall_warning_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config: KioskConfig = toml::from_str("").unwrap();
        assert_eq!(config, KioskConfig::default());
        assert_eq!(config.playback.welcome_duration_ms, WELCOME_DURATION_MS);
        assert_eq!(config.video.command[0], "ffplay");
    }

    #[test]
    fn load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[playlist]
directory = "/srv/booth/media"
shuffle = true

[playback]
welcome_duration_ms = 6000
stall_warning_ms = 0
"#
        )
        .unwrap();

        let config = KioskConfig::load(file.path()).unwrap();
        assert_eq!(config.playlist.directory, Some(PathBuf::from("/srv/booth/media")));
        assert!(config.playlist.shuffle);
        assert_eq!(config.playback.welcome_duration_ms, 6_000);
        assert_eq!(config.playback.default_image_duration_ms, DEFAULT_IMAGE_DURATION_MS);
        assert_eq!(config.stall_warning(), None);
        assert!(config.validate().is_ok());
        assert_eq!(config.player_settings().welcome_duration_ms, 6_000);
    }

    #[test]
    fn load_resolves_paths_against_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiosk.toml");
        std::fs::write(
            &path,
            "[playlist]\nmanifest = \"playlist.json\"\n\n[window]\nqr_image = \"/srv/booth/qr.png\"\n",
        )
        .unwrap();

        let config = KioskConfig::load(&path).unwrap();
        assert_eq!(config.playlist.manifest, Some(dir.path().join("playlist.json")));
        assert_eq!(config.window.qr_image, Some(PathBuf::from("/srv/booth/qr.png")));
    }

    #[test]
    fn validate_requires_exactly_one_playlist_location() {
        let mut config = KioskConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.playlist.manifest = Some(PathBuf::from("playlist.json"));
        assert!(config.validate().is_ok());

        config.playlist.directory = Some(PathBuf::from("media"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_durations() {
        let mut config = KioskConfig::default();
        config.playlist.manifest = Some(PathBuf::from("playlist.json"));
        config.playback.welcome_duration_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_error_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[playback]\nwelcome_duration_ms = \"soon\"").unwrap();

        let err = KioskConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}
