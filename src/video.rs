use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::driver::{Frame, MediaSignal};
use crate::player::SlideToken;

/// Plays video slides through an external player process.
///
/// Each video frame spawns the configured command; when the process exits the
/// slide's playback-ended signal is sent. If the process never exits the
/// slide stays up until an operator steps in.
pub struct VideoRunner {
    command: Vec<String>,
}

struct Playing {
    token: SlideToken,
    process: Child,
}

impl VideoRunner {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Builds the argument list for one video, substituting `{source}` or
    /// appending the source when the template has no placeholder.
    pub fn command_line(&self, source: &str) -> Vec<String> {
        let mut args: Vec<String> = self.command.iter().map(|a| a.replace("{source}", source)).collect();
        if !self.command.iter().any(|a| a.contains("{source}")) {
            args.push(source.to_string());
        }
        args
    }

    /// Follows `frames` until the driver goes away.
    pub async fn run(self, mut frames: watch::Receiver<Frame>, media: mpsc::UnboundedSender<MediaSignal>) {
        let mut playing: Option<Playing> = None;
        let mut last_started: Option<SlideToken> = None;

        loop {
            let wanted = frames
                .borrow_and_update()
                .video()
                .map(|(token, source)| (token, source.to_string()));

            if playing.as_ref().map(|p| p.token) != wanted.as_ref().map(|(t, _)| *t) {
                // Dropping the child kills it.
                if playing.take().is_some() {
                    debug!("Slide changed, stopping video player");
                }
            }

            if let Some((token, source)) = wanted {
                if last_started != Some(token) {
                    last_started = Some(token);
                    playing = self.start(token, &source);
                }
            }

            tokio::select! {
                changed = frames.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                status = wait(&mut playing) => {
                    if let Some(finished) = playing.take() {
                        match status {
                            Ok(status) if !status.success() => {
                                warn!("Video player exited with {}", status);
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to wait for video player: {}", e),
                        }
                        let _ = media.send(MediaSignal::PlaybackEnded(finished.token));
                    }
                }
            }
        }

        drop(playing);
        info!("Video runner stopped");
    }

    fn start(&self, token: SlideToken, source: &str) -> Option<Playing> {
        let args = self.command_line(source);
        let (program, rest) = args.split_first()?;

        match Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(process) => {
                info!("Playing video {}", source);
                Some(Playing { token, process })
            }
            Err(e) => {
                // No playback-ended signal will come: the slide stalls.
                error!("Failed to start video player {}: {}", program, e);
                None
            }
        }
    }
}

async fn wait(playing: &mut Option<Playing>) -> std::io::Result<ExitStatus> {
    match playing {
        Some(playing) => playing.process.wait().await,
        None => std::future::pending().await,
    }
}
