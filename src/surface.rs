use tokio::sync::watch;
use tracing::{info, warn};

use crate::driver::Frame;
use crate::slide::SlideKind;

/// Something that puts the current frame on a screen.
pub trait RenderSurface {
    fn present(&mut self, frame: &Frame);
}

/// One-line description of what a frame shows.
pub fn describe(frame: &Frame) -> String {
    if let Some(message) = frame.state.message() {
        return message;
    }

    let Some(slide) = &frame.slide else {
        return "Nothing to show".to_string();
    };
    let item = &slide.item;

    let mut line = match item.kind {
        SlideKind::Image => format!("Image {}", item.source.as_deref().unwrap_or("?")),
        SlideKind::Video => format!("Video {}", item.source.as_deref().unwrap_or("?")),
        SlideKind::TransientWelcome => "Welcome".to_string(),
    };
    if let Some(text) = &item.overlay_text {
        line.push_str(&format!(" \"{text}\""));
    }
    if item.show_qr {
        line.push_str(" [QR]");
    }
    line
}

/// Headless surface: logs every frame change.
#[derive(Debug, Default)]
pub struct LogSurface {
    last: Option<String>,
}

impl LogSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

impl RenderSurface for LogSurface {
    fn present(&mut self, frame: &Frame) {
        let line = describe(frame);
        info!("Slide #{}: {}", frame.index, line);
        if let Some(warning) = &frame.warning {
            warn!("{}", warning);
        }
        self.last = Some(line);
    }
}

/// Presents every published frame until the driver goes away.
pub async fn present_frames<S: RenderSurface>(surface: &mut S, mut frames: watch::Receiver<Frame>) {
    loop {
        {
            let frame = frames.borrow_and_update();
            surface.present(&frame);
        }
        if frames.changed().await.is_err() {
            break;
        }
    }
}
