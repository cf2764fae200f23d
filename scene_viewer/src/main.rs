//! Scene viewer
//!
//! Loads the OBJ scene named in the renderer config and renders it until the
//! window is closed or Escape is pressed.
//!
//! Usage: `scene_viewer [config.toml]`

use std::time::Instant;

use glfw::WindowEvent;
use scene_renderer::prelude::*;

const DEFAULT_CONFIG_PATH: &str = "resources/config/renderer.toml";

/// Window, renderer and camera state for one viewing session
///
/// The renderer is declared before the window so it is dropped first; its
/// surface must go away while the window still exists.
struct ViewerApp {
    renderer: SceneRenderer,
    frames: FrameLoop,
    camera: Camera,
    controller: CameraController,
    window: Window,
}

impl ViewerApp {
    fn new(config: &RendererConfig) -> Result<Self, RendererError> {
        let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;

        log::info!("Loading scene {}", config.scene_path);
        let scene = ObjLoader::load_scene(&config.scene_path)?;
        log::info!(
            "Scene has {} meshes, {} materials, {} vertices",
            scene.meshes.len(),
            scene.materials.len(),
            scene.vertex_count()
        );

        let renderer = SceneRenderer::new(&mut window, config, &scene)?;
        let camera = Camera::from_config(&config.camera, renderer.aspect_ratio());
        let controller = CameraController::new(&config.camera);

        Ok(Self {
            renderer,
            frames: FrameLoop::new(),
            camera,
            controller,
            window,
        })
    }

    fn run(&mut self) -> Result<(), RendererError> {
        let mut last_frame = Instant::now();

        while !self.window.should_close() {
            self.window.poll_events();
            self.handle_events();

            let now = Instant::now();
            let dt = now.duration_since(last_frame).as_secs_f32();
            last_frame = now;

            self.controller.update(&mut self.camera, dt);
            self.camera.set_aspect_ratio(self.renderer.aspect_ratio());
            self.renderer.update_camera(&self.camera);

            if self.frames.run_frame(&mut self.renderer)? == FrameReport::Deferred {
                // Minimised: sleep until the window changes
                self.window.wait_events();
                self.handle_events();
            }
        }

        log::info!("Rendered {} frames", self.frames.frames_rendered());
        Ok(())
    }

    fn handle_events(&mut self) {
        for event in self.window.flush_events() {
            if let WindowEvent::FramebufferSize(width, height) = event {
                log::debug!("Framebuffer resized to {}x{}", width, height);
                self.renderer
                    .set_framebuffer_size((width.max(0) as u32, height.max(0) as u32));
                self.frames.request_resize();
            }
            self.controller.handle_event(&event);
        }

        if self.controller.close_requested() {
            self.window.set_should_close(true);
        }
    }
}

fn run(config_path: &str) -> Result<(), RendererError> {
    let config = RendererConfig::load_or_default(config_path)?;
    let mut app = ViewerApp::new(&config)?;
    app.run()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    log::info!("Starting scene viewer");
    if let Err(e) = run(&config_path) {
        log::error!("Scene viewer failed: {}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
