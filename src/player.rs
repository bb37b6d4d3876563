//! Playlist sequencing with live welcome injection.
//!
//! [`PlaylistPlayer`] is a pure state machine: it never sleeps and never
//! touches the screen. The driver feeds it stimuli (timer expiry,
//! playback-ended, welcome events) one at a time and arms whatever
//! [`PendingTimer`] it asks for.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::constants::*;
use crate::error::PlayerError;
use crate::slide::{PlaylistItem, Slide, SlideId, WelcomeEvent};
use crate::state::PlayerState;

/// Identifies one "armed" transition. Every change of the current slide
/// issues a new token; callbacks carrying an older one are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlideToken(u64);

/// The single advance timer the player wants armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub token: SlideToken,
    pub duration: Duration,
}

/// Outcome of `advance` and `on_slide_finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The player moved to `index`.
    Advanced { index: usize },
    /// The callback belonged to a slide that is no longer current.
    Stale,
    /// The player is not playing.
    Idle,
    /// Pruning left nothing to play.
    Emptied,
}

/// Outcome of `inject_welcome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    /// Spliced into the live sequence at `position`.
    Scheduled { position: usize },
    /// Held until the next successful `initialize`.
    Backlogged,
}

/// Tunables the player needs to synthesize and time slides.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSettings {
    pub default_image_duration_ms: u64,
    pub welcome_duration_ms: u64,
    pub welcome_show_qr: bool,
    pub max_backlog: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_image_duration_ms: DEFAULT_IMAGE_DURATION_MS,
            welcome_duration_ms: WELCOME_DURATION_MS,
            welcome_show_qr: true,
            max_backlog: MAX_WELCOME_BACKLOG,
        }
    }
}

pub struct PlaylistPlayer {
    settings: PlayerSettings,
    state: PlayerState,

    slides: Vec<Slide>,
    current_index: usize,

    generation: u64,
    pending_timer: Option<PendingTimer>,
    warning: Option<PlayerError>,

    next_id: u64,
    backlog: VecDeque<PlaylistItem>,
}

impl PlaylistPlayer {
    pub fn new(settings: PlayerSettings) -> Self {
        Self {
            settings,
            state: PlayerState::Loading,
            slides: Vec::new(),
            current_index: 0,
            generation: 0,
            pending_timer: None,
            warning: None,
            next_id: 0,
            backlog: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn token(&self) -> SlideToken {
        SlideToken(self.generation)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    pub fn current(&self) -> Option<&Slide> {
        if self.state.is_playing() {
            self.slides.get(self.current_index)
        } else {
            None
        }
    }

    pub fn pending_timer(&self) -> Option<PendingTimer> {
        self.pending_timer
    }

    pub fn warning(&self) -> Option<&PlayerError> {
        self.warning.as_ref()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Enters `Loading` ahead of a (re)fetch. Welcomes that have not played
    /// yet are kept for the next sequence.
    pub fn begin_loading(&mut self) {
        self.stash_pending_welcomes();
        self.park(PlayerState::Loading);
    }

    /// Records a failed fetch. The player stays in `Error` until the next
    /// `initialize`; nothing is retried here.
    pub fn fail_loading(&mut self, message: impl Into<String>) {
        let error = PlayerError::Load(message.into());
        warn!("Playlist load failed: {}", error);
        self.stash_pending_welcomes();
        self.park(PlayerState::Error(error));
    }

    /// Loads a new starting sequence.
    ///
    /// An empty sequence puts the player in `Empty` with no timer armed; the
    /// caller shows the empty-playlist message. Otherwise playback starts at
    /// index 0 and any held welcomes are queued right behind it.
    pub fn initialize(&mut self, items: Vec<PlaylistItem>) -> &PlayerState {
        self.stash_pending_welcomes();

        if items.is_empty() {
            info!("Playlist is empty, pausing");
            self.park(PlayerState::Empty);
            return &self.state;
        }

        let mut slides = Vec::with_capacity(items.len() + self.backlog.len());
        for item in items {
            slides.push(self.make_slide(item));
        }
        self.slides = slides;

        let held: Vec<PlaylistItem> = self.backlog.drain(..).collect();
        let flushed = held.len();
        for (offset, item) in held.into_iter().enumerate() {
            let slide = self.make_slide(item);
            self.slides.insert(1 + offset, slide);
        }

        info!(
            "Playlist initialized with {} slides ({} held welcomes)",
            self.slides.len() - flushed,
            flushed
        );

        self.state = PlayerState::Playing;
        self.current_index = 0;
        self.enter_current();
        &self.state
    }

    /// Steps to the next slide, wrapping around. Does not prune.
    pub fn advance(&mut self, token: SlideToken) -> Transition {
        if let Some(rejected) = self.check(token) {
            return rejected;
        }

        self.current_index = (self.current_index + 1) % self.slides.len();
        self.enter_current();
        Transition::Advanced {
            index: self.current_index,
        }
    }

    /// Called when the current slide's timer fires or its video ends.
    ///
    /// Played welcomes are pruned before the next index is computed, so the
    /// loop cursor resumes where it would have been without the injection.
    pub fn on_slide_finished(&mut self, token: SlideToken) -> Transition {
        if let Some(rejected) = self.check(token) {
            return rejected;
        }

        let finished = &self.slides[self.current_index];
        let finished_id = finished.id;
        let finished_transient = finished.item.is_transient();

        let pruned_before = self.slides[..self.current_index]
            .iter()
            .filter(|s| is_spent(s))
            .count();
        self.slides.retain(|s| !is_spent(s));

        if self.slides.is_empty() {
            info!("No slides left after pruning welcomes, pausing");
            self.park(PlayerState::Empty);
            return Transition::Emptied;
        }

        let resume = self.current_index - pruned_before;
        self.current_index = if finished_transient {
            resume % self.slides.len()
        } else {
            let position = self.position_of(finished_id).unwrap_or(resume);
            (position + 1) % self.slides.len()
        };

        self.enter_current();
        Transition::Advanced {
            index: self.current_index,
        }
    }

    /// Queues a welcome slide to play next.
    ///
    /// Welcomes already waiting behind the current slide keep their place, so
    /// bursts play in arrival order. The current slide and its timer are left
    /// alone. Repeated events for the same visitor are not merged.
    pub fn inject_welcome(&mut self, event: &WelcomeEvent) -> Injection {
        let item = PlaylistItem::welcome(
            event,
            self.settings.welcome_duration_ms,
            self.settings.welcome_show_qr,
        );

        if !self.state.is_playing() {
            self.backlog.push_back(item);
            if self.backlog.len() > self.settings.max_backlog {
                if let Some(dropped) = self.backlog.pop_front() {
                    warn!(
                        "Welcome backlog full, dropping welcome for visitor {}",
                        dropped.visitor_id.as_deref().unwrap_or("?")
                    );
                }
            }
            debug!("Welcome for {} held in backlog", event.visitor_id);
            return Injection::Backlogged;
        }

        let mut position = self.current_index + 1;
        while position < self.slides.len() && is_queued_welcome(&self.slides[position]) {
            position += 1;
        }

        let slide = self.make_slide(item);
        self.slides.insert(position, slide);
        debug!("Welcome for {} scheduled at {}", event.visitor_id, position);
        Injection::Scheduled { position }
    }

    /// Flags the current video as stalled. The slide is not skipped; an
    /// operator has to intervene.
    pub fn mark_stalled(&mut self, token: SlideToken, waited: Duration) -> bool {
        if token != self.token() {
            return false;
        }
        let Some(slide) = self.current() else {
            return false;
        };

        let media = slide.item.source.clone().unwrap_or_default();
        let warning = PlayerError::StalledMedia {
            media,
            waited_ms: waited.as_millis() as u64,
        };
        warn!("{}", warning);
        self.warning = Some(warning);
        true
    }

    /// Disarms the timer on teardown.
    pub fn clear_timer(&mut self) {
        self.pending_timer = None;
    }

    fn check(&self, token: SlideToken) -> Option<Transition> {
        if !self.state.is_playing() || self.slides.is_empty() {
            return Some(Transition::Idle);
        }
        if token != self.token() {
            debug!("Ignoring stale callback {:?} (current {:?})", token, self.token());
            return Some(Transition::Stale);
        }
        None
    }

    fn enter_current(&mut self) {
        self.generation += 1;
        self.warning = None;

        let token = self.token();
        let default_ms = self.settings.default_image_duration_ms;
        let slide = &mut self.slides[self.current_index];
        if slide.item.is_transient() {
            slide.played = true;
        }

        // Re-arming always replaces the previous timer.
        self.pending_timer = slide
            .item
            .display_duration(default_ms)
            .map(|duration| PendingTimer { token, duration });

        debug!(
            "Now showing slide {} ({:?}) at index {}",
            slide.id.0, slide.item.kind, self.current_index
        );
    }

    fn park(&mut self, state: PlayerState) {
        self.state = state;
        self.slides.clear();
        self.current_index = 0;
        self.generation += 1;
        self.pending_timer = None;
        self.warning = None;
    }

    fn stash_pending_welcomes(&mut self) {
        let pending: Vec<PlaylistItem> = self
            .slides
            .iter()
            .filter(|s| is_queued_welcome(s))
            .map(|s| s.item.clone())
            .collect();

        // These arrived before anything currently in the backlog.
        for item in pending.into_iter().rev() {
            self.backlog.push_front(item);
        }
        while self.backlog.len() > self.settings.max_backlog {
            self.backlog.pop_front();
        }
    }

    fn make_slide(&mut self, item: PlaylistItem) -> Slide {
        self.next_id += 1;
        Slide {
            id: SlideId(self.next_id),
            item,
            played: false,
        }
    }

    fn position_of(&self, id: SlideId) -> Option<usize> {
        self.slides.iter().position(|s| s.id == id)
    }
}

fn is_spent(slide: &Slide) -> bool {
    slide.item.is_transient() && slide.played
}

fn is_queued_welcome(slide: &Slide) -> bool {
    slide.item.is_transient() && !slide.played
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slide::SlideKind;

    fn images(n: usize) -> Vec<PlaylistItem> {
        (0..n).map(|i| PlaylistItem::image(format!("{i}.png"), 1_000)).collect()
    }

    fn playing(items: Vec<PlaylistItem>) -> PlaylistPlayer {
        let mut player = PlaylistPlayer::new(PlayerSettings::default());
        player.initialize(items);
        player
    }

    fn source_of(player: &PlaylistPlayer) -> Option<String> {
        player.current().and_then(|s| s.item.source.clone())
    }

    #[test]
    fn new_player_is_loading_without_timer() {
        let player = PlaylistPlayer::new(PlayerSettings::default());
        assert_eq!(player.state(), &PlayerState::Loading);
        assert!(player.pending_timer().is_none());
        assert!(player.current().is_none());
    }

    #[test]
    fn stale_token_is_ignored() {
        let mut player = playing(images(3));
        let token = player.token();

        assert_eq!(player.on_slide_finished(token), Transition::Advanced { index: 1 });
        // Duplicate timer fire or video-end for the same slide.
        assert_eq!(player.on_slide_finished(token), Transition::Stale);
        assert_eq!(player.advance(token), Transition::Stale);
        assert_eq!(player.current_index(), 1);
    }

    #[test]
    fn callbacks_while_not_playing_are_idle() {
        let mut player = PlaylistPlayer::new(PlayerSettings::default());
        let token = player.token();
        assert_eq!(player.advance(token), Transition::Idle);

        player.initialize(Vec::new());
        assert_eq!(player.on_slide_finished(player.token()), Transition::Idle);
    }

    #[test]
    fn every_transition_rearms_a_single_timer() {
        let mut player = playing(vec![
            PlaylistItem::image("a.png", 1_000),
            PlaylistItem::video("b.mp4"),
            PlaylistItem::image("c.png", 500),
        ]);

        let first = player.pending_timer().unwrap();
        assert_eq!(first.duration, Duration::from_millis(1_000));
        assert_eq!(first.token, player.token());

        player.on_slide_finished(first.token);
        assert!(player.pending_timer().is_none(), "videos arm no duration timer");

        player.on_slide_finished(player.token());
        let third = player.pending_timer().unwrap();
        assert_eq!(third.duration, Duration::from_millis(500));
        assert_ne!(third.token, first.token);
    }

    #[test]
    fn welcome_uses_configured_duration_and_qr() {
        let mut player = PlaylistPlayer::new(PlayerSettings {
            welcome_duration_ms: 4_000,
            welcome_show_qr: false,
            ..PlayerSettings::default()
        });
        player.initialize(images(2));
        player.inject_welcome(&WelcomeEvent::new("v1", "Ana"));
        player.on_slide_finished(player.token());

        let current = player.current().unwrap();
        assert_eq!(current.item.kind, SlideKind::TransientWelcome);
        assert!(!current.item.show_qr);
        assert!(current.played);
        assert_eq!(player.pending_timer().unwrap().duration, Duration::from_millis(4_000));
    }

    #[test]
    fn welcome_during_welcome_queues_behind_it() {
        let mut player = playing(images(2));
        player.inject_welcome(&WelcomeEvent::new("v1", "Ana"));
        player.on_slide_finished(player.token());
        assert_eq!(player.current_index(), 1);

        // Ana is on screen; Bruno arrives.
        assert_eq!(
            player.inject_welcome(&WelcomeEvent::new("v2", "Bruno")),
            Injection::Scheduled { position: 2 }
        );

        player.on_slide_finished(player.token());
        let current = player.current().unwrap();
        assert_eq!(current.item.visitor_id.as_deref(), Some("v2"));
        assert_eq!(player.slides().len(), 3);

        player.on_slide_finished(player.token());
        assert_eq!(source_of(&player).as_deref(), Some("1.png"));
        assert_eq!(player.slides().len(), 2);
    }

    #[test]
    fn injection_leaves_current_slide_and_timer_alone() {
        let mut player = playing(images(3));
        player.on_slide_finished(player.token());
        let timer = player.pending_timer();
        let token = player.token();

        player.inject_welcome(&WelcomeEvent::new("v1", "Ana"));

        assert_eq!(player.current_index(), 1);
        assert_eq!(player.token(), token);
        assert_eq!(player.pending_timer(), timer);
        assert_eq!(player.state(), &PlayerState::Playing);
    }

    #[test]
    fn injection_at_last_index_plays_before_wrapping() {
        let mut player = playing(images(2));
        player.on_slide_finished(player.token());
        player.inject_welcome(&WelcomeEvent::new("v1", "Ana"));

        player.on_slide_finished(player.token());
        assert!(player.current().unwrap().item.is_transient());

        player.on_slide_finished(player.token());
        assert_eq!(player.current_index(), 0);
        assert_eq!(source_of(&player).as_deref(), Some("0.png"));
    }

    #[test]
    fn duplicate_visitor_events_both_play() {
        let mut player = playing(images(2));
        let event = WelcomeEvent::new("v1", "Ana");
        player.inject_welcome(&event);
        player.inject_welcome(&event);

        player.on_slide_finished(player.token());
        assert_eq!(player.current().unwrap().item.visitor_id.as_deref(), Some("v1"));
        player.on_slide_finished(player.token());
        assert_eq!(player.current().unwrap().item.visitor_id.as_deref(), Some("v1"));
        player.on_slide_finished(player.token());
        assert_eq!(source_of(&player).as_deref(), Some("1.png"));
    }

    #[test]
    fn backlog_is_flushed_after_first_slide() {
        let mut player = PlaylistPlayer::new(PlayerSettings::default());
        player.begin_loading();
        assert_eq!(player.inject_welcome(&WelcomeEvent::new("v1", "Ana")), Injection::Backlogged);
        assert_eq!(player.backlog_len(), 1);

        player.initialize(images(2));
        assert_eq!(player.backlog_len(), 0);
        assert_eq!(player.current_index(), 0);

        player.on_slide_finished(player.token());
        assert_eq!(player.current().unwrap().item.visitor_id.as_deref(), Some("v1"));
        player.on_slide_finished(player.token());
        assert_eq!(source_of(&player).as_deref(), Some("1.png"));
    }

    #[test]
    fn backlog_drops_oldest_when_full() {
        let mut player = PlaylistPlayer::new(PlayerSettings {
            max_backlog: 2,
            ..PlayerSettings::default()
        });
        player.initialize(Vec::new());
        for id in ["v1", "v2", "v3"] {
            player.inject_welcome(&WelcomeEvent::new(id, "x"));
        }
        assert_eq!(player.backlog_len(), 2);

        player.initialize(images(1));
        let queued: Vec<_> = player.slides()[1..]
            .iter()
            .filter_map(|s| s.item.visitor_id.as_deref())
            .collect();
        assert_eq!(queued, vec!["v2", "v3"]);
    }

    #[test]
    fn reload_keeps_unplayed_welcomes_but_not_played_ones() {
        let mut player = playing(images(3));
        player.inject_welcome(&WelcomeEvent::new("v1", "Ana"));
        player.inject_welcome(&WelcomeEvent::new("v2", "Bruno"));
        player.on_slide_finished(player.token());
        assert_eq!(player.current().unwrap().item.visitor_id.as_deref(), Some("v1"));

        player.begin_loading();
        assert_eq!(player.backlog_len(), 1);
        player.initialize(images(2));
        assert_eq!(player.slides()[1].item.visitor_id.as_deref(), Some("v2"));
    }

    #[test]
    fn failed_load_enters_error_state() {
        let mut player = PlaylistPlayer::new(PlayerSettings::default());
        player.fail_loading("connection refused");

        assert_eq!(
            player.state(),
            &PlayerState::Error(PlayerError::Load("connection refused".to_string()))
        );
        assert!(player.pending_timer().is_none());
        assert_ne!(player.state().message(), PlayerState::Empty.message());

        // Welcomes are still accepted while the error is on screen.
        assert_eq!(player.inject_welcome(&WelcomeEvent::new("v1", "")), Injection::Backlogged);
    }

    #[test]
    fn stall_warning_only_for_current_token() {
        let mut player = playing(vec![PlaylistItem::video("b.mp4"), PlaylistItem::image("c.png", 1)]);
        let token = player.token();

        assert!(player.mark_stalled(token, Duration::from_secs(600)));
        assert!(matches!(player.warning(), Some(PlayerError::StalledMedia { waited_ms: 600_000, .. })));
        // Still on the video: no auto-recovery.
        assert_eq!(player.current_index(), 0);

        player.on_slide_finished(token);
        assert!(player.warning().is_none());
        assert!(!player.mark_stalled(token, Duration::from_secs(1)));
    }

    #[test]
    fn pruning_everything_empties_the_player() {
        let mut player = playing(vec![PlaylistItem::welcome(&WelcomeEvent::new("v", "Ana"), 1_000, false)]);
        assert_eq!(player.on_slide_finished(player.token()), Transition::Emptied);
        assert_eq!(player.state(), &PlayerState::Empty);
        assert!(player.pending_timer().is_none());
    }
}
