//! Core engine module
//!
//! Window and event loop, frame timing and the periodic status line.

mod debug;
mod engine;
mod time;

pub use debug::{DebugInfo, FrameStats};
pub use engine::{Engine, EngineContext, Game, WindowRenderer};
pub use time::Time;
