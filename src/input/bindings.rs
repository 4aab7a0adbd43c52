//! Keyboard bindings for renderer settings
//!
//! | key    | action                       |
//! |--------|------------------------------|
//! | F1     | post-processing master flag  |
//! | 1..8   | one post effect, chain order |
//! | F2     | wireframe                    |
//! | F3     | skybox                       |
//! | [ / ]  | coarser / finer terrain      |

use winit::keyboard::KeyCode;

use super::Input;
use crate::renderer::terrain::{DEFAULT_TESSELLATION_FACTOR, MAX_TESSELLATION_FACTOR};
use crate::renderer::{PostProcessEffect, RendererSettings};

pub const POST_PROCESS_KEY: KeyCode = KeyCode::F1;
pub const WIREFRAME_KEY: KeyCode = KeyCode::F2;
pub const SKYBOX_KEY: KeyCode = KeyCode::F3;
pub const COARSER_TERRAIN_KEY: KeyCode = KeyCode::BracketLeft;
pub const FINER_TERRAIN_KEY: KeyCode = KeyCode::BracketRight;

/// Number keys, one per effect in chain order
pub const EFFECT_KEYS: [(KeyCode, PostProcessEffect); 8] = [
    (KeyCode::Digit1, PostProcessEffect::AmbientOcclusion),
    (KeyCode::Digit2, PostProcessEffect::Invert),
    (KeyCode::Digit3, PostProcessEffect::Grayscale),
    (KeyCode::Digit4, PostProcessEffect::EdgeDetection),
    (KeyCode::Digit5, PostProcessEffect::ColorCorrection),
    (KeyCode::Digit6, PostProcessEffect::Vignette),
    (KeyCode::Digit7, PostProcessEffect::LogoOverlay),
    (KeyCode::Digit8, PostProcessEffect::DepthVisualize),
];

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

/// Apply this frame's toggle presses; returns whether anything changed
pub fn apply_render_bindings(input: &Input, settings: &mut RendererSettings) -> bool {
    let mut changed = false;

    if input.is_key_just_pressed(POST_PROCESS_KEY) {
        settings.post.enabled = !settings.post.enabled;
        log::info!("Post-processing {}", on_off(settings.post.enabled));
        changed = true;
    }
    for (key, effect) in EFFECT_KEYS {
        if input.is_key_just_pressed(key) {
            let enabled = settings.post.toggle(effect);
            log::info!("{:?} {}", effect, on_off(enabled));
            changed = true;
        }
    }
    if input.is_key_just_pressed(WIREFRAME_KEY) {
        settings.wireframe = !settings.wireframe;
        log::info!("Wireframe {}", on_off(settings.wireframe));
        changed = true;
    }
    if input.is_key_just_pressed(SKYBOX_KEY) {
        settings.show_skybox = !settings.show_skybox;
        log::info!("Skybox {}", on_off(settings.show_skybox));
        changed = true;
    }

    let factor = settings.terrain_tessellation.unwrap_or(DEFAULT_TESSELLATION_FACTOR);
    let stepped = if input.is_key_just_pressed(COARSER_TERRAIN_KEY) {
        (factor / 2).max(1)
    } else if input.is_key_just_pressed(FINER_TERRAIN_KEY) {
        (factor * 2).min(MAX_TESSELLATION_FACTOR)
    } else {
        factor
    };
    if stepped != factor {
        settings.terrain_tessellation = Some(stepped);
        log::info!("Terrain tessellation factor {}", stepped);
        changed = true;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::event::ElementState;

    fn press(input: &mut Input, key: KeyCode) {
        input.process_keyboard(key, ElementState::Pressed);
    }

    #[test]
    fn test_number_keys_follow_chain_order() {
        for (i, (_, effect)) in EFFECT_KEYS.iter().enumerate() {
            assert_eq!(*effect, PostProcessEffect::ALL[i]);
        }
    }

    #[test]
    fn test_toggles_flip_settings_once_per_press() {
        let mut input = Input::new();
        let mut settings = RendererSettings::default();
        let grayscale = settings.post.is_enabled(PostProcessEffect::Grayscale);

        press(&mut input, KeyCode::Digit3);
        press(&mut input, POST_PROCESS_KEY);
        press(&mut input, SKYBOX_KEY);
        assert!(apply_render_bindings(&input, &mut settings));
        assert_eq!(settings.post.is_enabled(PostProcessEffect::Grayscale), !grayscale);
        assert!(!settings.post.enabled);
        assert!(!settings.show_skybox);

        // still held next frame: no second toggle
        input.update();
        press(&mut input, KeyCode::Digit3);
        assert!(!apply_render_bindings(&input, &mut settings));
        assert_eq!(settings.post.is_enabled(PostProcessEffect::Grayscale), !grayscale);
    }

    #[test]
    fn test_brackets_step_terrain_detail_within_bounds() {
        let mut input = Input::new();
        let mut settings = RendererSettings::default();

        press(&mut input, FINER_TERRAIN_KEY);
        assert!(apply_render_bindings(&input, &mut settings));
        assert_eq!(settings.terrain_tessellation, Some(DEFAULT_TESSELLATION_FACTOR * 2));

        settings.terrain_tessellation = Some(1);
        input.update();
        input.process_keyboard(FINER_TERRAIN_KEY, ElementState::Released);
        input.update();
        press(&mut input, COARSER_TERRAIN_KEY);
        assert!(!apply_render_bindings(&input, &mut settings));
        assert_eq!(settings.terrain_tessellation, Some(1));

        settings.terrain_tessellation = Some(MAX_TESSELLATION_FACTOR);
        input.process_keyboard(COARSER_TERRAIN_KEY, ElementState::Released);
        input.update();
        press(&mut input, FINER_TERRAIN_KEY);
        assert!(!apply_render_bindings(&input, &mut settings));
        assert_eq!(settings.terrain_tessellation, Some(MAX_TESSELLATION_FACTOR));
    }
}
