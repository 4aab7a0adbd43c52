//! Input handling
//!
//! Raw keyboard/mouse state plus the key bindings that drive renderer settings.

mod bindings;
mod state;

pub use bindings::{apply_render_bindings, EFFECT_KEYS, POST_PROCESS_KEY, SKYBOX_KEY, WIREFRAME_KEY};
pub use state::Input;
