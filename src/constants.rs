pub const RENDER_WIDTH: i32 = 1920;            // Width of the kiosk render target
pub const RENDER_HEIGHT: i32 = 1080;           // Height of the kiosk render target
pub const FPS: u32 = 30;                       // Frames per second of the window surface

pub const DEFAULT_IMAGE_DURATION_MS: u64 = 8_000;   // Image slides without an explicit duration
pub const WELCOME_DURATION_MS: u64 = 10_000;        // Transient welcome slides
pub const STALL_WARNING_MS: u64 = 600_000;          // Video playing longer than this raises a warning
pub const MAX_WELCOME_BACKLOG: usize = 32;          // Welcomes held while no playlist is playing

pub const GUEST_PLACEHOLDER: &str = "our guest";    // Shown when a visitor has no display name
pub const UNKNOWN_VISITOR: &str = "?";              // Visitor id for events that carry none

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv"];
