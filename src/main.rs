//! Demo renderer
//!
//! ```text
//! lantern [--config PATH] [--dry-run FRAMES]
//! ```
//!
//! WASD/QE move, right mouse drag looks around, F toggles the flashlight,
//! F1 toggles post-processing, 1-8 toggle single effects, F2 wireframe,
//! F3 skybox, [ and ] coarser or finer terrain, Escape quits.

use std::path::PathBuf;

use lantern::demo::{self, DemoAssets};
use lantern::logging::{LoggingConfig, init_logging};
use lantern::prelude::*;
use winit::event::MouseButton;

const DEFAULT_CONFIG: &str = "lantern.ron";
const MOVE_SPEED: f32 = 5.0;
const LOOK_SENSITIVITY: f32 = 0.003;

struct DemoGame {
    lights: LightSet,
    assets: Option<DemoAssets>,
    flashlight: bool,
}

impl DemoGame {
    fn new(options: &RenderOptions) -> Self {
        Self {
            lights: demo::build_lights(options),
            assets: None,
            flashlight: false,
        }
    }
}

impl Game for DemoGame {
    fn init(&mut self, ctx: &mut EngineContext, renderer: &mut WindowRenderer) -> RenderResult<()> {
        let (scene, assets) = demo::build_scene(renderer.backend_mut())?;
        ctx.scene = scene;
        ctx.lights = self.lights.clone();
        self.assets = Some(assets);
        log::info!("Demo initialized");
        Ok(())
    }

    fn update(&mut self, ctx: &mut EngineContext) {
        if ctx.input.is_key_pressed(KeyCode::Escape) {
            ctx.quit();
            return;
        }

        let step = MOVE_SPEED * ctx.time.delta_seconds();
        let camera = &mut ctx.camera;
        let axes = [
            (KeyCode::KeyW, KeyCode::KeyS),
            (KeyCode::KeyD, KeyCode::KeyA),
            (KeyCode::KeyE, KeyCode::KeyQ),
        ];
        let amount = axes.map(|(plus, minus)| {
            let mut value = 0.0;
            if ctx.input.is_key_pressed(plus) {
                value += step;
            }
            if ctx.input.is_key_pressed(minus) {
                value -= step;
            }
            value
        });
        camera.move_forward(amount[0]);
        camera.move_right(amount[1]);
        camera.move_up(amount[2]);

        if ctx.input.is_mouse_button_pressed(MouseButton::Right) {
            let delta = ctx.input.mouse_delta();
            camera.rotate(delta.x, delta.y, LOOK_SENSITIVITY);
        }

        if ctx.input.is_key_just_pressed(KeyCode::KeyF) {
            self.flashlight = !self.flashlight;
            log::info!("Flashlight {}", if self.flashlight { "on" } else { "off" });
        }

        demo::animate(&mut ctx.lights, ctx.time.elapsed_seconds());
    }

    fn render(&mut self, ctx: &mut EngineContext) {
        if !self.flashlight {
            return;
        }
        let position = ctx.camera.position - Vec3::new(0.0, 0.3, 0.0);
        let direction = ctx.camera.direction;
        if let Some(spot) = ctx.lights.spot_lights_mut().first_mut() {
            spot.set_flash(position, direction);
        }
    }

    fn shutdown(&mut self, _ctx: &mut EngineContext) {
        // meshes and textures go with the device
        self.assets = None;
        log::info!("Demo shut down");
    }
}

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    dry_run: Option<u32>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--dry-run" => {
                let frames = args.next().ok_or("--dry-run needs a frame count")?;
                let frames = frames
                    .parse::<u32>()
                    .map_err(|e| format!("invalid frame count `{frames}`: {e}"))?;
                parsed.dry_run = Some(frames);
            }
            other => return Err(format!("unknown argument `{other}`")),
        }
    }
    Ok(parsed)
}

fn run_dry(config: &EngineConfig, frames: u32) -> Result<(), Box<dyn std::error::Error>> {
    for trace in demo::dry_run(config, frames)? {
        println!("frame {}: {}", trace.frame, trace.report.summary());
        println!("  {}", trace.passes.join(" -> "));
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(std::env::args().skip(1))?;
    let config_path = args.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = EngineConfig::load(&config_path)?;

    if let Some(frames) = args.dry_run {
        init_logging(LoggingConfig {
            env_filter: config.log_filter.clone(),
            ..LoggingConfig::default()
        });
        return run_dry(&config, frames);
    }

    let game = DemoGame::new(&config.render);
    Engine::new(config, game).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_dry_run_and_config() {
        let parsed = args(&["--dry-run", "3", "--config", "scene.ron"]).unwrap();
        assert_eq!(parsed.dry_run, Some(3));
        assert_eq!(parsed.config, Some(PathBuf::from("scene.ron")));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(args(&["--dry-run"]).is_err());
        assert!(args(&["--dry-run", "many"]).is_err());
        assert!(args(&["--fullscreen"]).is_err());
        assert!(args(&[]).unwrap().dry_run.is_none());
    }
}
