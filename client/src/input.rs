//! Keyboard edges to outgoing movement intents
//!
//! The mapping is stateless: every press of a movement key produces one
//! `move`, every release produces one `stop`, whatever else is still held.

use macroquad::input::{get_keys_pressed, get_keys_released, is_key_pressed};
pub use macroquad::input::KeyCode;
use shared::{ClientMessage, Direction};

/// Physical movement keys: arrows plus the WASD equivalents.
pub const MOVEMENT_KEYS: [(KeyCode, Direction); 8] = [
    (KeyCode::Up, Direction::Up),
    (KeyCode::W, Direction::Up),
    (KeyCode::Down, Direction::Down),
    (KeyCode::S, Direction::Down),
    (KeyCode::Left, Direction::Left),
    (KeyCode::A, Direction::Left),
    (KeyCode::Right, Direction::Right),
    (KeyCode::D, Direction::Right),
];

pub const ROSTER_TOGGLE_KEY: KeyCode = KeyCode::Tab;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Pressed(KeyCode),
    Released(KeyCode),
}

/// Viewer-local toggles that never reach the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    pub toggle_roster: bool,
}

pub fn direction_for(key: KeyCode) -> Option<Direction> {
    MOVEMENT_KEYS
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, direction)| *direction)
}

/// Maps one key edge to the intent it produces, if any.
pub fn intent_for(event: KeyEvent) -> Option<ClientMessage> {
    match event {
        KeyEvent::Pressed(key) => direction_for(key).map(|direction| ClientMessage::Move { direction }),
        KeyEvent::Released(key) => direction_for(key).map(|_| ClientMessage::Stop),
    }
}

/// Collects this frame's key edges from the window. Presses are reported
/// before releases so a tap within one frame yields `move` then `stop`.
pub fn poll_keyboard() -> (Controls, Vec<KeyEvent>) {
    let controls = Controls {
        toggle_roster: is_key_pressed(ROSTER_TOGGLE_KEY),
    };

    let mut events: Vec<KeyEvent> = get_keys_pressed()
        .into_iter()
        .map(KeyEvent::Pressed)
        .collect();
    events.extend(get_keys_released().into_iter().map(KeyEvent::Released));

    (controls, events)
}
