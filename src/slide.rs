use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::*;
use crate::error::FetchError;

/// Runtime identity of a slide inside the player's sequence.
///
/// Assigned on insertion, so two slides pointing at the same media stay
/// distinct when the sequence is pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlideId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlideKind {
    Image,
    Video,
    TransientWelcome,
}

/// One unit of TV content, as stored in a playlist or synthesized from a
/// welcome event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub kind: SlideKind,

    #[serde(default)]
    pub source: Option<String>,

    /// Ignored for videos, which end on the playback-ended signal.
    #[serde(default, alias = "durationMs")]
    pub duration_ms: Option<u64>,

    #[serde(default, alias = "overlayText")]
    pub overlay_text: Option<String>,

    #[serde(default, alias = "showQr")]
    pub show_qr: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<String>,
}

impl PlaylistItem {
    pub fn image(source: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            kind: SlideKind::Image,
            source: Some(source.into()),
            duration_ms: Some(duration_ms),
            overlay_text: None,
            show_qr: false,
            visitor_id: None,
        }
    }

    pub fn video(source: impl Into<String>) -> Self {
        Self {
            kind: SlideKind::Video,
            source: Some(source.into()),
            duration_ms: None,
            overlay_text: None,
            show_qr: false,
            visitor_id: None,
        }
    }

    /// Builds the transient slide for a visitor. Missing fields fall back to
    /// placeholder text instead of rejecting the event.
    pub fn welcome(event: &WelcomeEvent, duration_ms: u64, show_qr: bool) -> Self {
        Self {
            kind: SlideKind::TransientWelcome,
            source: None,
            duration_ms: Some(duration_ms),
            overlay_text: Some(event.greeting()),
            show_qr,
            visitor_id: Some(event.visitor_id.clone()),
        }
    }

    pub fn with_overlay(mut self, text: impl Into<String>) -> Self {
        self.overlay_text = Some(text.into());
        self
    }

    pub fn with_qr(mut self) -> Self {
        self.show_qr = true;
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == SlideKind::TransientWelcome
    }

    /// How long the slide stays up before its timer fires, or `None` for
    /// videos.
    pub fn display_duration(&self, default_ms: u64) -> Option<Duration> {
        match self.kind {
            SlideKind::Video => None,
            SlideKind::TransientWelcome => {
                Some(Duration::from_millis(self.duration_ms.unwrap_or(WELCOME_DURATION_MS)))
            }
            SlideKind::Image => Some(Duration::from_millis(self.duration_ms.unwrap_or(default_ms))),
        }
    }

    /// Checks a persisted slide before it enters the player.
    pub fn validate(&self, index: usize) -> Result<(), FetchError> {
        let invalid = |reason: &str| FetchError::InvalidItem {
            index,
            reason: reason.to_string(),
        };

        match self.kind {
            SlideKind::TransientWelcome => Err(invalid("welcome slides cannot be stored in a playlist")),
            SlideKind::Image | SlideKind::Video => match self.source.as_deref() {
                None | Some("") => Err(invalid("missing media source")),
                Some(_) if self.duration_ms == Some(0) => Err(invalid("duration must be positive")),
                Some(_) => Ok(()),
            },
        }
    }
}

/// A slide in the player's working sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Slide {
    pub id: SlideId,
    pub item: PlaylistItem,
    /// Set once a transient slide has been put on screen.
    pub played: bool,
}

/// Notification that a visitor was just registered at the booth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeEvent {
    #[serde(default = "unknown_visitor", alias = "visitorId")]
    pub visitor_id: String,

    #[serde(default, alias = "displayName")]
    pub display_name: String,

    #[serde(default)]
    pub organization: Option<String>,

    #[serde(default, alias = "messageText")]
    pub message_text: String,
}

fn unknown_visitor() -> String {
    UNKNOWN_VISITOR.to_string()
}

impl WelcomeEvent {
    pub fn new(visitor_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            visitor_id: visitor_id.into(),
            display_name: display_name.into(),
            organization: None,
            message_text: String::new(),
        }
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message_text = message.into();
        self
    }

    pub fn name_or_placeholder(&self) -> &str {
        match self.display_name.trim() {
            "" => GUEST_PLACEHOLDER,
            name => name,
        }
    }

    /// Text rendered on the welcome slide. The generated message wins when
    /// present, otherwise a plain greeting is composed.
    pub fn greeting(&self) -> String {
        let message = self.message_text.trim();
        if !message.is_empty() {
            return message.to_string();
        }

        let name = self.name_or_placeholder();
        match self.organization.as_deref().map(str::trim) {
            Some(org) if !org.is_empty() => format!("Welcome, {name} from {org}!"),
            _ => format!("Welcome, {name}!"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_prefers_generated_message() {
        let event = WelcomeEvent::new("v1", "Ana").with_message("  Bem-vinda, Ana! ");
        assert_eq!(event.greeting(), "Bem-vinda, Ana!");
    }

    #[test]
    fn greeting_falls_back_to_placeholder_name() {
        let event = WelcomeEvent::new("v2", "   ");
        assert_eq!(event.greeting(), "Welcome, our guest!");

        let event = WelcomeEvent::new("v3", "Luis").with_organization("Visit Lisboa");
        assert_eq!(event.greeting(), "Welcome, Luis from Visit Lisboa!");
    }

    #[test]
    fn welcome_event_accepts_camel_case_json() {
        let event: WelcomeEvent =
            serde_json::from_str(r#"{"visitorId":"42","displayName":"Ana","organization":null}"#).unwrap();
        assert_eq!(event.visitor_id, "42");
        assert_eq!(event.display_name, "Ana");
        assert!(event.message_text.is_empty());
    }

    #[test]
    fn videos_have_no_display_duration() {
        assert_eq!(PlaylistItem::video("b.mp4").display_duration(5_000), None);
        assert_eq!(
            PlaylistItem::image("a.png", 1_000).display_duration(5_000),
            Some(Duration::from_millis(1_000))
        );

        let mut untimed = PlaylistItem::image("c.png", 1);
        untimed.duration_ms = None;
        assert_eq!(untimed.display_duration(5_000), Some(Duration::from_millis(5_000)));
    }

    #[test]
    fn stored_playlists_reject_welcome_and_sourceless_slides() {
        let welcome = PlaylistItem::welcome(&WelcomeEvent::new("v", "Ana"), 1_000, false);
        assert!(matches!(welcome.validate(0), Err(FetchError::InvalidItem { index: 0, .. })));

        let mut image = PlaylistItem::image("a.png", 1_000);
        image.source = None;
        assert!(image.validate(3).is_err());

        assert!(PlaylistItem::video("b.mp4").validate(1).is_ok());
    }
}
