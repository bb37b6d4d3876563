//! Runs a [`PlaylistPlayer`] on a tokio task.
//!
//! The driver is the only owner of the player. Timer expiry, playback-ended
//! signals, welcome events and control commands are serialized through one
//! `select!` loop, so the player never sees two stimuli at once. The slide to
//! show is published as a [`Frame`] on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::error::PlayerError;
use crate::events::{EventSource, Subscription};
use crate::player::{PlaylistPlayer, SlideToken, Transition};
use crate::slide::{Slide, SlideKind};
use crate::source::PlaylistSource;
use crate::state::PlayerState;

/// What the render surface should show.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub state: PlayerState,
    pub slide: Option<Slide>,
    pub index: usize,
    pub token: SlideToken,
    pub warning: Option<PlayerError>,
}

impl Frame {
    pub fn capture(player: &PlaylistPlayer) -> Self {
        Self {
            state: player.state().clone(),
            slide: player.current().cloned(),
            index: player.current_index(),
            token: player.token(),
            warning: player.warning().cloned(),
        }
    }

    /// The video to play for this frame, if any.
    pub fn video(&self) -> Option<(SlideToken, &str)> {
        let slide = self.slide.as_ref()?;
        if slide.item.kind != SlideKind::Video {
            return None;
        }
        Some((self.token, slide.item.source.as_deref()?))
    }
}

#[derive(Debug)]
enum Command {
    Reload,
    Shutdown,
}

/// Signals from whatever is playing the media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSignal {
    PlaybackEnded(SlideToken),
}

#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Raise a warning when a video has played this long without ending.
    pub stall_warning: Option<Duration>,
}

pub struct DriverHandle {
    commands: mpsc::UnboundedSender<Command>,
    media: mpsc::UnboundedSender<MediaSignal>,
    frames: watch::Receiver<Frame>,
    task: JoinHandle<()>,
}

impl DriverHandle {
    pub fn frames(&self) -> watch::Receiver<Frame> {
        self.frames.clone()
    }

    pub fn media(&self) -> mpsc::UnboundedSender<MediaSignal> {
        self.media.clone()
    }

    /// Refetches the playlist. The player does not poll on its own.
    pub fn reload(&self) {
        let _ = self.commands.send(Command::Reload);
    }

    pub fn reloader(&self) -> Reloader {
        Reloader {
            commands: self.commands.clone(),
        }
    }

    /// Clears the timer, unsubscribes from the event source and waits for
    /// the task to end.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Player task ended abnormally: {}", e);
        }
    }
}

/// Requests playlist reloads from other tasks.
#[derive(Clone)]
pub struct Reloader {
    commands: mpsc::UnboundedSender<Command>,
}

impl Reloader {
    pub fn reload(&self) {
        let _ = self.commands.send(Command::Reload);
    }
}

/// Starts the driver. The playlist is fetched immediately.
pub fn spawn(
    player: PlaylistPlayer,
    source: Arc<dyn PlaylistSource>,
    events: &dyn EventSource,
    options: DriverOptions,
) -> DriverHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (media_tx, media_rx) = mpsc::unbounded_channel();
    let (frame_tx, frame_rx) = watch::channel(Frame::capture(&player));

    let driver = Driver {
        player,
        source,
        subscription: Some(events.subscribe()),
        options,
        frames: frame_tx,
        timer: None,
        stall: None,
    };
    let task = tokio::spawn(driver.run(command_rx, media_rx));

    DriverHandle {
        commands: command_tx,
        media: media_tx,
        frames: frame_rx,
        task,
    }
}

struct Driver {
    player: PlaylistPlayer,
    source: Arc<dyn PlaylistSource>,
    subscription: Option<Subscription>,
    options: DriverOptions,
    frames: watch::Sender<Frame>,

    // Deadline of the one armed advance timer.
    timer: Option<(SlideToken, Instant)>,
    // Deadline of the stalled-video warning for the current slide.
    stall: Option<(SlideToken, Instant, Instant)>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut media: mpsc::UnboundedReceiver<MediaSignal>,
    ) {
        self.load().await;

        loop {
            let timer_deadline = self.timer.map(|(_, at)| at).unwrap_or_else(Instant::now);
            let stall_deadline = self.stall.map(|(_, _, at)| at).unwrap_or_else(Instant::now);

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Reload) => self.load().await,
                    Some(Command::Shutdown) | None => break,
                },

                _ = sleep_until(timer_deadline), if self.timer.is_some() => {
                    if let Some((token, _)) = self.timer.take() {
                        self.finish(token, "timer");
                    }
                }

                Some(MediaSignal::PlaybackEnded(token)) = media.recv() => {
                    self.finish(token, "playback ended");
                }

                event = next_event(&mut self.subscription) => match event {
                    Some(event) => {
                        let outcome = self.player.inject_welcome(&event);
                        debug!("Welcome for {}: {:?}", event.visitor_id, outcome);
                    }
                    None => {
                        info!("Welcome event source closed");
                        self.subscription = None;
                    }
                },

                _ = sleep_until(stall_deadline), if self.stall.is_some() => {
                    if let Some((token, started, _)) = self.stall.take() {
                        self.player.mark_stalled(token, started.elapsed());
                    }
                }
            }

            self.sync();
        }

        self.player.clear_timer();
        self.timer = None;
        self.stall = None;
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        info!("Player stopped");
    }

    async fn load(&mut self) {
        self.player.begin_loading();
        self.sync();

        match self.source.load_playlist().await {
            Ok(items) => {
                info!("Fetched playlist with {} slides", items.len());
                self.player.initialize(items);
            }
            Err(e) => self.player.fail_loading(e.to_string()),
        }
        self.sync();
    }

    fn finish(&mut self, token: SlideToken, cause: &str) {
        match self.player.on_slide_finished(token) {
            Transition::Advanced { index } => debug!("Slide finished ({}), now at {}", cause, index),
            Transition::Stale => debug!("Ignoring stale {} callback", cause),
            Transition::Idle => debug!("Ignoring {} while not playing", cause),
            Transition::Emptied => info!("Playlist emptied after pruning"),
        }
    }

    /// Re-arms timers for the player's current slide and publishes the
    /// frame if it changed.
    fn sync(&mut self) {
        let token = self.player.token();

        // At most one timer: a new token replaces whatever was armed.
        match self.player.pending_timer() {
            Some(pending) if self.timer.map(|(t, _)| t) != Some(pending.token) => {
                self.timer = Some((pending.token, Instant::now() + pending.duration));
            }
            Some(_) => {}
            None => self.timer = None,
        }

        let frame = Frame::capture(&self.player);
        let is_video = frame.video().is_some();
        match (is_video, self.options.stall_warning) {
            (true, Some(limit)) if frame.warning.is_none() => {
                if self.stall.map(|(t, _, _)| t) != Some(token) {
                    let now = Instant::now();
                    self.stall = Some((token, now, now + limit));
                }
            }
            (true, _) => {}
            (false, _) => self.stall = None,
        }

        self.frames.send_if_modified(|current| {
            if *current == frame {
                false
            } else {
                *current = frame;
                true
            }
        });
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<crate::slide::WelcomeEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
