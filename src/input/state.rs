//! Keyboard and mouse state

use std::hash::Hash;

use glam::Vec2;
use rustc_hash::FxHashSet;
use winit::event::{ElementState, MouseButton};
use winit::keyboard::KeyCode;

/// Held buttons plus this frame's transitions
#[derive(Debug)]
struct ButtonSet<T> {
    held: FxHashSet<T>,
    pressed: FxHashSet<T>,
    released: FxHashSet<T>,
}

impl<T> Default for ButtonSet<T> {
    fn default() -> Self {
        Self {
            held: FxHashSet::default(),
            pressed: FxHashSet::default(),
            released: FxHashSet::default(),
        }
    }
}

impl<T: Copy + Eq + Hash> ButtonSet<T> {
    fn process(&mut self, button: T, state: ElementState) {
        match state {
            // key repeat arrives as further presses; only the first counts
            ElementState::Pressed => {
                if self.held.insert(button) {
                    self.pressed.insert(button);
                }
            }
            ElementState::Released => {
                self.held.remove(&button);
                self.released.insert(button);
            }
        }
    }

    fn end_frame(&mut self) {
        self.pressed.clear();
        self.released.clear();
    }
}

/// Input state fed by window events and read by the game once per frame
#[derive(Debug, Default)]
pub struct Input {
    keys: ButtonSet<KeyCode>,
    mouse_buttons: ButtonSet<MouseButton>,
    mouse_position: Vec2,
    mouse_delta: Vec2,
    scroll_delta: Vec2,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-frame transitions; call after the frame is rendered
    pub fn update(&mut self) {
        self.keys.end_frame();
        self.mouse_buttons.end_frame();
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = Vec2::ZERO;
    }

    pub fn process_keyboard(&mut self, key_code: KeyCode, state: ElementState) {
        self.keys.process(key_code, state);
    }

    pub fn process_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        self.mouse_buttons.process(button, state);
    }

    /// Cursor moved to `position` in window pixels
    pub fn process_mouse_motion(&mut self, position: Vec2) {
        self.mouse_delta += position - self.mouse_position;
        self.mouse_position = position;
    }

    pub fn process_scroll(&mut self, delta: Vec2) {
        self.scroll_delta += delta;
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys.held.contains(&key)
    }

    /// Went down this frame
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.keys.pressed.contains(&key)
    }

    pub fn is_key_just_released(&self, key: KeyCode) -> bool {
        self.keys.released.contains(&key)
    }

    pub fn is_mouse_button_pressed(&self, button: MouseButton) -> bool {
        self.mouse_buttons.held.contains(&button)
    }

    pub fn mouse_position(&self) -> Vec2 {
        self.mouse_position
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    pub fn scroll_delta(&self) -> Vec2 {
        self.scroll_delta
    }
}
