//! Fullscreen raylib surface for the booth TV.
//!
//! Everything is drawn into a fixed-size framebuffer which is then scaled to
//! the window, so layout does not depend on the TV's resolution.

use std::path::Path;

use anyhow::{Context, Result};
use raylib::prelude::*;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::WindowConfig;
use crate::driver::Frame;
use crate::player::SlideToken;
use crate::slide::SlideKind;
use crate::surface::{RenderSurface, describe};
use crate::texture_loader::load_slide_texture;

const MARGIN: i32 = 48;
const CAPTION_SIZE: i32 = 48;
const WELCOME_SIZE: i32 = 96;
const QR_SIZE: f32 = 280.0;

const CAPTION_BAND: Color = Color::new(0, 0, 0, 170);
const WELCOME_BACKGROUND: Color = Color::new(12, 74, 110, 255);

pub struct WindowSurface {
    rl: RaylibHandle,
    thread: RaylibThread,
    framebuffer: RenderTexture2D,
    width: i32,
    height: i32,

    frame: Option<Frame>,
    loaded_for: Option<SlideToken>,
    texture: Option<Texture2D>,
    qr: Option<Texture2D>,
}

impl WindowSurface {
    pub fn open(config: &WindowConfig) -> Result<Self> {
        let (mut rl, thread) = raylib::init()
            .size(config.width / 2, config.height / 2)
            .title("Booth Kiosk")
            .vsync()
            .resizable()
            .build();
        rl.set_target_fps(config.fps);
        rl.set_trace_log(TraceLogLevel::LOG_ERROR);

        let framebuffer = rl
            .load_render_texture(&thread, config.width as u32, config.height as u32)
            .map_err(|e| anyhow::anyhow!("Failed to create render texture: {}", e))?;

        let qr = match &config.qr_image {
            Some(path) => Some(load_slide_texture(&mut rl, &thread, path).context("Failed to load QR image")?),
            None => None,
        };

        Ok(Self {
            rl,
            thread,
            framebuffer,
            width: config.width,
            height: config.height,
            frame: None,
            loaded_for: None,
            texture: None,
            qr,
        })
    }

    pub fn should_close(&self) -> bool {
        self.rl.window_should_close()
    }

    /// Draws the last presented frame.
    pub fn draw(&mut self) {
        let Self {
            rl,
            thread,
            framebuffer,
            width,
            height,
            frame,
            texture,
            qr,
            ..
        } = self;
        let (width, height) = (*width, *height);
        let thread: &RaylibThread = thread;

        rl.draw_texture_mode(thread, framebuffer, |mut tmd| {
            let mut d = tmd.begin_drawing(thread);
            d.clear_background(Color::BLACK);

            let Some(frame) = frame.as_ref() else {
                return;
            };

            match frame.slide.as_ref().map(|s| &s.item) {
                None => {
                    let color = if frame.state.is_playing() { Color::WHITE } else { Color::RED };
                    d.draw_text(&describe(frame), MARGIN, height / 2, CAPTION_SIZE, color);
                }
                Some(item) => {
                    match item.kind {
                        SlideKind::Image => {
                            if let Some(texture) = texture.as_ref() {
                                draw_fitted(&mut d, texture, width, height);
                            }
                        }
                        SlideKind::Video => {
                            // The external player covers the screen; keep a title behind it.
                            let title = item.source.as_deref().unwrap_or("");
                            d.draw_text(title, MARGIN, MARGIN, CAPTION_SIZE, Color::GRAY);
                        }
                        SlideKind::TransientWelcome => {
                            d.draw_rectangle(0, 0, width, height, WELCOME_BACKGROUND);
                            let text = item.overlay_text.as_deref().unwrap_or("Welcome!");
                            d.draw_text(text, MARGIN * 2, height / 2 - WELCOME_SIZE, WELCOME_SIZE, Color::WHITE);
                        }
                    }

                    if item.kind != SlideKind::TransientWelcome {
                        if let Some(caption) = item.overlay_text.as_deref() {
                            let band = CAPTION_SIZE + MARGIN;
                            d.draw_rectangle(0, height - band, width, band, CAPTION_BAND);
                            d.draw_text(caption, MARGIN, height - band + MARGIN / 2, CAPTION_SIZE, Color::WHITE);
                        }
                    }

                    if item.show_qr {
                        if let Some(qr) = qr.as_ref() {
                            let scale = QR_SIZE / qr.width().max(1) as f32;
                            let size = qr.width() as f32 * scale;
                            d.draw_texture_pro(
                                qr,
                                Rectangle::new(0.0, 0.0, qr.width() as f32, qr.height() as f32),
                                Rectangle::new(
                                    width as f32 - size - MARGIN as f32,
                                    height as f32 - qr.height() as f32 * scale - MARGIN as f32 * 3.0,
                                    size,
                                    qr.height() as f32 * scale,
                                ),
                                Vector2::new(0.0, 0.0),
                                0.0,
                                Color::WHITE,
                            );
                        }
                    }
                }
            }

            if let Some(warning) = &frame.warning {
                d.draw_text(&warning.to_string(), MARGIN, MARGIN, CAPTION_SIZE / 2, Color::ORANGE);
            }
        });

        // Draw the (vertically flipped) framebuffer scaled to the window.
        let mut d = rl.begin_drawing(thread);
        let sw = d.get_screen_width() as f32;
        let sh = d.get_screen_height() as f32;
        d.draw_texture_pro(
            &*framebuffer,
            Rectangle::new(0.0, 0.0, framebuffer.width() as f32, -(framebuffer.height() as f32)),
            Rectangle::new(0.0, 0.0, sw, sh),
            Vector2::new(0.0, 0.0),
            0.0,
            Color::WHITE,
        );
    }
}

impl RenderSurface for WindowSurface {
    fn present(&mut self, frame: &Frame) {
        if self.loaded_for != Some(frame.token) {
            self.loaded_for = Some(frame.token);
            self.texture = None;

            let image = frame
                .slide
                .as_ref()
                .filter(|s| s.item.kind == SlideKind::Image)
                .and_then(|s| s.item.source.as_deref());
            if let Some(source) = image {
                match load_slide_texture(&mut self.rl, &self.thread, Path::new(source)) {
                    Ok(texture) => self.texture = Some(texture),
                    // The slide still runs its timer; the screen stays black.
                    Err(e) => warn!("{:#}", e),
                }
            }
        }
        self.frame = Some(frame.clone());
    }
}

// Scale a texture to fit inside the render target, centered.
fn draw_fitted(d: &mut RaylibDrawHandle, texture: &Texture2D, width: i32, height: i32) {
    let tex_width = texture.width() as f32;
    let tex_height = texture.height() as f32;
    let scale = (width as f32 / tex_width).min(height as f32 / tex_height);
    let scaled_width = tex_width * scale;
    let scaled_height = tex_height * scale;

    d.draw_texture_pro(
        texture,
        Rectangle::new(0.0, 0.0, tex_width, tex_height),
        Rectangle::new(
            (width as f32 - scaled_width) * 0.5,
            (height as f32 - scaled_height) * 0.5,
            scaled_width,
            scaled_height,
        ),
        Vector2::new(0.0, 0.0),
        0.0,
        Color::WHITE,
    );
}

/// Runs the window on the calling thread until it is closed or the driver
/// stops publishing frames.
pub fn run_window(config: &WindowConfig, mut frames: watch::Receiver<Frame>) -> Result<()> {
    let mut surface = WindowSurface::open(config)?;
    let first = frames.borrow_and_update().clone();
    surface.present(&first);

    while !surface.should_close() {
        match frames.has_changed() {
            Ok(true) => {
                let frame = frames.borrow_and_update().clone();
                surface.present(&frame);
            }
            Ok(false) => {}
            Err(_) => break,
        }
        surface.draw();
    }

    info!("Window closed");
    Ok(())
}
