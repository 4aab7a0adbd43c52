//! Window, event loop and frame driver

use std::error::Error;
use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::PhysicalKey,
    window::{Window, WindowId},
};

use crate::config::EngineConfig;
use crate::core::Time;
use crate::core::debug::DebugInfo;
use crate::error::RenderResult;
use crate::input::{Input, apply_render_bindings};
use crate::logging::{LoggingConfig, init_logging};
use crate::renderer::{Camera, FrameInput, LightSet, RenderEngine, RendererSettings, Scene, WgpuBackend};

/// Renderer drawing to the engine's window
pub type WindowRenderer = RenderEngine<WgpuBackend>;

/// Game trait that users implement
pub trait Game: 'static {
    /// Called once the renderer exists; upload meshes and fill the scene here
    fn init(&mut self, engine: &mut EngineContext, renderer: &mut WindowRenderer) -> RenderResult<()>;

    /// Called every frame for game logic updates
    fn update(&mut self, engine: &mut EngineContext);

    /// Called every frame right before the renderer draws the context's scene
    fn render(&mut self, _engine: &mut EngineContext) {}

    /// Called when the window is resized to a non-zero size
    fn on_resize(&mut self, _engine: &mut EngineContext, _width: u32, _height: u32) {}

    /// Called once when the engine is shutting down
    fn shutdown(&mut self, _engine: &mut EngineContext) {}
}

/// Everything a frame reads, owned by the engine and lent to the game
pub struct EngineContext {
    pub time: Time,
    pub input: Input,
    pub debug: DebugInfo,
    pub scene: Scene,
    pub camera: Camera,
    pub lights: LightSet,
    /// Read by the renderer once per frame
    pub settings: RendererSettings,
    window_size: PhysicalSize<u32>,
    should_quit: bool,
}

impl EngineContext {
    fn new(config: &EngineConfig) -> Self {
        let mut camera = Camera::default();
        camera.set_aspect(config.width, config.height);
        Self {
            time: Time::new(),
            input: Input::new(),
            debug: DebugInfo::new(config.log_interval()),
            scene: Scene::new(),
            camera,
            lights: LightSet::default(),
            settings: config.settings,
            window_size: PhysicalSize::new(config.width, config.height),
            should_quit: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.window_size.width
    }

    pub fn height(&self) -> u32 {
        self.window_size.height
    }

    /// Request engine shutdown after the current update
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    fn frame_input(&self) -> FrameInput<'_> {
        FrameInput {
            scene: &self.scene,
            camera: &self.camera,
            lights: &self.lights,
            settings: &self.settings,
            framebuffer_size: (self.window_size.width, self.window_size.height),
        }
    }
}

/// Main engine struct
pub struct Engine<G: Game> {
    config: EngineConfig,
    game: G,
    context: EngineContext,
    window: Option<Arc<Window>>,
    renderer: Option<WindowRenderer>,
    stopped: bool,
    fatal: Option<Box<dyn Error>>,
}

impl<G: Game> Engine<G> {
    pub fn new(config: EngineConfig, game: G) -> Self {
        let context = EngineContext::new(&config);
        Self {
            config,
            game,
            context,
            window: None,
            renderer: None,
            stopped: false,
            fatal: None,
        }
    }

    /// Run until the window closes; a fatal render error is returned
    pub fn run(mut self) -> Result<(), Box<dyn Error>> {
        init_logging(LoggingConfig {
            env_filter: self.config.log_filter.clone(),
            ..LoggingConfig::default()
        });
        log::info!("Starting engine: {}", self.config.title);

        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;

        match self.fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn start_renderer(&mut self, window: Arc<Window>) -> RenderResult<()> {
        let size = window.inner_size();
        let backend = pollster::block_on(WgpuBackend::new(window, self.config.vsync))?;
        let mut renderer = RenderEngine::new(backend, &self.config.render)?;

        self.context.window_size = size;
        if size.width > 0 && size.height > 0 {
            self.context.camera.set_aspect(size.width, size.height);
        }
        self.game.init(&mut self.context, &mut renderer)?;
        self.renderer = Some(renderer);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Box<dyn Error>) {
        log::error!("Fatal: {err}");
        self.fatal = Some(err);
        self.stop(event_loop);
    }

    fn stop(&mut self, event_loop: &ActiveEventLoop) {
        if !self.stopped {
            self.stopped = true;
            self.game.shutdown(&mut self.context);
            if let Some(renderer) = self.renderer.take() {
                match renderer.shutdown() {
                    Ok(_) => log::info!("Renderer released its resources"),
                    Err(err) => log::error!("Renderer shutdown failed: {err}"),
                }
            }
        }
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        self.context.time.update();
        self.context.debug.record_frame(self.context.time.delta());

        apply_render_bindings(&self.context.input, &mut self.context.settings);
        self.game.update(&mut self.context);

        if self.context.should_quit() {
            self.stop(event_loop);
            return;
        }

        self.game.render(&mut self.context);

        let result = match self.renderer.as_mut() {
            Some(renderer) => renderer.render_frame(&self.context.frame_input()).map(Some),
            None => Ok(None),
        };
        match result {
            Ok(Some(report)) => self.context.debug.set_report(report),
            Ok(None) => {}
            Err(err) => {
                self.fail(event_loop, err.into());
                return;
            }
        }

        if let Some(line) = self.context.debug.take_status_line() {
            log::info!("{line}");
        }

        // Clear per-frame input state
        self.context.input.update();
    }
}

impl<G: Game> ApplicationHandler for Engine<G> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.stopped {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                self.fail(event_loop, err.into());
                return;
            }
        };
        self.window = Some(Arc::clone(&window));

        match self.start_renderer(window) {
            Ok(()) => log::info!("Engine initialized successfully"),
            Err(err) => self.fail(event_loop, err.into()),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down");
                self.stop(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                // a zero size (minimized) is kept so frames are skipped
                self.context.window_size = new_size;
                if new_size.width > 0 && new_size.height > 0 {
                    self.context.camera.set_aspect(new_size.width, new_size.height);
                    if let Some(renderer) = &mut self.renderer {
                        renderer.resize(new_size.width, new_size.height);
                    }
                    self.game
                        .on_resize(&mut self.context, new_size.width, new_size.height);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key_code) = event.physical_key {
                    self.context.input.process_keyboard(key_code, event.state);
                }
            }

            WindowEvent::MouseInput { state, button, .. } => {
                self.context.input.process_mouse_button(button, state);
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.context
                    .input
                    .process_mouse_motion(glam::Vec2::new(position.x as f32, position.y as f32));
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(x, y) => glam::Vec2::new(x, y),
                    MouseScrollDelta::PixelDelta(pos) => glam::Vec2::new(pos.x as f32, pos.y as f32),
                };
                self.context.input.process_scroll(scroll);
            }

            WindowEvent::RedrawRequested => {
                if !self.stopped {
                    self.redraw(event_loop);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref().filter(|_| !self.stopped) {
            window.request_redraw();
        }
    }
}
