use crate::avatars::{Avatar, Frame, FrameHandle};
use crate::game::GameState;
use log::{debug, info, warn};
use macroquad::prelude::*;
use shared::Facing;
use std::collections::{HashMap, HashSet};

pub const NAME_FONT_SIZE: u16 = 12;
/// Gap between a sprite's top edge and its name baseline.
pub const NAME_OFFSET: f32 = 5.0;

/// Drawing surface the render loop targets.
pub trait Canvas {
    /// Viewport size in pixels.
    fn size(&self) -> (f32, f32);
    fn clear(&mut self);
    /// Draws `frame` with its top-left corner at `(x, y)`. A mirrored draw
    /// covers the same rectangle with columns reversed.
    fn draw_image(&mut self, frame: &Frame, x: f32, y: f32, mirrored: bool);
    /// Draws `text` horizontally centred on `center_x` with its baseline at `y`.
    fn draw_label(&mut self, text: &str, center_x: f32, y: f32);
}

/// World-to-screen translation, recomputed every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub x: f32,
    pub y: f32,
}

impl Camera {
    pub fn centered_on(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x: x - width / 2.0,
            y: y - height / 2.0,
        }
    }

    pub fn to_screen(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.x, y - self.y)
    }
}

/// Frame chosen to represent a player this frame.
#[derive(Debug, Clone, Copy)]
pub struct Sprite<'a> {
    pub frame: &'a Frame,
    pub index: usize,
    pub mirrored: bool,
}

/// Picks the frame for `facing` at animation `phase`, wrapping the phase
/// over the sequence length. Returns `None` when the sequence is missing or
/// the chosen frame has not decoded.
pub fn select_sprite(avatar: &Avatar, facing: Facing, phase: u32) -> Option<Sprite<'_>> {
    let sequence = avatar.sequence(facing)?;
    let index = phase as usize % sequence.len();
    let frame = sequence[index].get()?;
    Some(Sprite {
        frame,
        index,
        mirrored: facing.is_mirrored(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Waiting,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Background, local identity or local player not available yet.
    NotReady,
    Drawn { players: usize, skipped: usize },
}

pub struct Renderer {
    background: FrameHandle,
    phase: RenderPhase,
    background_failure_reported: bool,
}

impl Renderer {
    pub fn new(background: FrameHandle) -> Self {
        Self {
            background,
            phase: RenderPhase::Waiting,
            background_failure_reported: false,
        }
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    /// Draws one frame of the world centred on the local player.
    ///
    /// Readiness is re-checked every call. Once active, the renderer never
    /// returns to waiting; a frame that cannot be drawn is just skipped.
    pub fn render<C: Canvas>(&mut self, game: &GameState, canvas: &mut C) -> FrameOutcome {
        let Some(background) = self.background.get() else {
            if self.background.is_failed() && !self.background_failure_reported {
                warn!("Background image unavailable, world will not be drawn");
                self.background_failure_reported = true;
            }
            return FrameOutcome::NotReady;
        };
        let Some(local) = game.local_player() else {
            return FrameOutcome::NotReady;
        };

        if self.phase == RenderPhase::Waiting {
            info!("Rendering started");
            self.phase = RenderPhase::Active;
        }

        canvas.clear();

        let (width, height) = canvas.size();
        let camera = Camera::centered_on(local.x, local.y, width, height);

        canvas.draw_image(background, -camera.x, -camera.y, false);

        let mut drawn = 0;
        let mut skipped = 0;
        for player in game.players.values() {
            let Some(avatar) = game.avatars.get(&player.avatar) else {
                debug!("Skipping {}: avatar {} unknown", player.id, player.avatar);
                skipped += 1;
                continue;
            };
            let Some(sprite) = select_sprite(avatar, player.facing, player.animation_frame) else {
                skipped += 1;
                continue;
            };

            let (x, y) = camera.to_screen(player.x, player.y);
            canvas.draw_image(sprite.frame, x, y, sprite.mirrored);
            canvas.draw_label(
                &player.username,
                x + sprite.frame.width() as f32 / 2.0,
                y - NAME_OFFSET,
            );
            drawn += 1;
        }

        FrameOutcome::Drawn {
            players: drawn,
            skipped,
        }
    }
}

/// macroquad-backed canvas. Textures are uploaded lazily from decoded
/// frames and dropped once a frame goes by without them being drawn.
#[derive(Default)]
pub struct MacroquadCanvas {
    textures: HashMap<u64, Texture2D>,
    used: HashSet<u64>,
}

impl MacroquadCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    fn texture(&mut self, frame: &Frame) -> Option<Texture2D> {
        self.used.insert(frame.id());
        if let Some(texture) = self.textures.get(&frame.id()) {
            return Some(texture.clone());
        }

        let (Ok(width), Ok(height)) = (u16::try_from(frame.width()), u16::try_from(frame.height()))
        else {
            debug!("Frame {} too large for a texture", frame.id());
            return None;
        };
        let texture = Texture2D::from_rgba8(width, height, frame.rgba());
        texture.set_filter(FilterMode::Nearest);
        self.textures.insert(frame.id(), texture.clone());
        Some(texture)
    }

    /// Evicts textures not drawn since the previous call.
    pub fn end_frame(&mut self) {
        let used = std::mem::take(&mut self.used);
        self.textures.retain(|id, _| used.contains(id));
    }
}

impl Canvas for MacroquadCanvas {
    fn size(&self) -> (f32, f32) {
        (screen_width(), screen_height())
    }

    fn clear(&mut self) {
        clear_background(BLACK);
    }

    fn draw_image(&mut self, frame: &Frame, x: f32, y: f32, mirrored: bool) {
        if let Some(texture) = self.texture(frame) {
            draw_texture_ex(
                &texture,
                x,
                y,
                WHITE,
                DrawTextureParams {
                    flip_x: mirrored,
                    ..Default::default()
                },
            );
        }
    }

    fn draw_label(&mut self, text: &str, center_x: f32, y: f32) {
        let dims = measure_text(text, None, NAME_FONT_SIZE, 1.0);
        draw_text(
            text,
            center_x - dims.width / 2.0,
            y,
            NAME_FONT_SIZE as f32,
            WHITE,
        );
    }
}

/// Status line and player roster overlay.
pub struct Hud {
    show_roster: bool,
}

impl Hud {
    pub fn new() -> Self {
        Self { show_roster: true }
    }

    pub fn toggle_roster(&mut self) {
        self.show_roster = !self.show_roster;
        info!("Player list: {}", self.show_roster);
    }

    pub fn draw(&self, status: &str, error: Option<&str>, roster: &[&str]) {
        let font_size = 16.0;
        let padding = 8.0;

        let status_color = if error.is_some() { RED } else { WHITE };
        draw_rectangle(
            0.0,
            0.0,
            screen_width(),
            font_size + padding * 2.0,
            Color::from_rgba(0, 0, 0, 160),
        );
        draw_text(status, padding, padding + font_size - 2.0, font_size, status_color);

        if let Some(error) = error {
            draw_text(
                error,
                padding,
                font_size * 2.0 + padding * 2.0,
                font_size,
                Color::from_rgba(255, 68, 68, 255),
            );
        }

        if !self.show_roster || roster.is_empty() {
            return;
        }

        let line_height = font_size + 4.0;
        let panel_width = roster
            .iter()
            .map(|name| measure_text(name, None, font_size as u16, 1.0).width)
            .fold(measure_text("Players", None, font_size as u16, 1.0).width, f32::max)
            + padding * 2.0;
        let panel_height = line_height * (roster.len() + 1) as f32 + padding * 2.0;
        let panel_x = screen_width() - panel_width - padding;
        let panel_y = font_size + padding * 3.0;

        draw_rectangle(
            panel_x,
            panel_y,
            panel_width,
            panel_height,
            Color::from_rgba(26, 26, 26, 200),
        );
        draw_rectangle_lines(panel_x, panel_y, panel_width, panel_height, 1.0, WHITE);
        draw_text(
            "Players",
            panel_x + padding,
            panel_y + padding + font_size - 2.0,
            font_size,
            Color::from_rgba(0, 170, 255, 255),
        );
        for (i, name) in roster.iter().enumerate() {
            let y = panel_y + padding + line_height * (i + 1) as f32 + font_size - 2.0;
            draw_text(name, panel_x + padding, y, font_size, WHITE);
        }
    }
}

impl Default for Hud {
    fn default() -> Self {
        Self::new()
    }
}
