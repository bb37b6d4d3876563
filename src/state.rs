use crate::error::PlayerError;

#[derive(Debug, PartialEq, Clone)]
pub enum PlayerState {
    Loading,            // Waiting for the playlist source
    Empty,              // Source returned zero slides, paused until the next initialize
    Playing,            // Looping through the slides
    Error(PlayerError), // Source failed, paused until the next initialize
}

impl PlayerState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerState::Playing)
    }

    /// Full-screen message shown in place of slides, if any.
    pub fn message(&self) -> Option<String> {
        match self {
            PlayerState::Loading => Some("Loading playlist...".to_string()),
            PlayerState::Empty => Some(PlayerError::EmptyPlaylist.to_string()),
            PlayerState::Error(e) => Some(e.to_string()),
            PlayerState::Playing => None,
        }
    }
}
