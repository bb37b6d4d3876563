//! TV kiosk player for a trade-show booth.
//!
//! Loops a playlist of image and video slides and splices a transient
//! welcome slide in right after the current one whenever a visitor is
//! registered. Welcome slides play once and drop out of the loop without
//! moving its cursor.

pub mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod events;
pub mod player;
pub mod slide;
pub mod source;
pub mod state;
pub mod surface;
pub mod video;

#[cfg(feature = "window")]
pub mod texture_loader;
#[cfg(feature = "window")]
pub mod window;

pub use config::KioskConfig;
pub use driver::{DriverHandle, DriverOptions, Frame, MediaSignal};
pub use error::{ConfigError, FetchError, PlayerError};
pub use events::{EventSource, Subscription, WelcomeBus};
pub use player::{Injection, PendingTimer, PlayerSettings, PlaylistPlayer, SlideToken, Transition};
pub use slide::{PlaylistItem, Slide, SlideId, SlideKind, WelcomeEvent};
pub use source::{DirectorySource, ManifestSource, PlaylistSource, Shuffled, StaticSource};
pub use state::PlayerState;
