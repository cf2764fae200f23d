//! # Scene Renderer
//!
//! A real-time Vulkan renderer for static textured scenes.
//!
//! ## Layers
//!
//! - **assets**: OBJ/MTL import and texture decoding (PNG, DDS block-compressed)
//! - **scene**: CPU-side scene description and its GPU-resident counterpart
//! - **render**: Vulkan context, staged uploads, swapchain lifecycle and the frame loop
//! - **config**: TOML/RON configuration for window, camera, lighting and shaders
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_renderer::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::load_or_default("resources/config/renderer.toml")?;
//!     let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
//!     let scene = ObjLoader::load_scene(&config.scene_path)?;
//!     let mut renderer = SceneRenderer::new(&mut window, &config, &scene)?;
//!     let mut frames = FrameLoop::new();
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         frames.run_frame(&mut renderer)?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        assets::{AssetError, ObjLoader},
        config::{Config, RendererConfig},
        foundation::math::{Mat4, Vec3},
        render::{
            vulkan::{Window, WindowError},
            Camera, CameraController, FrameLoop, FrameReport, RendererError, SceneRenderer,
        },
        scene::Scene,
    };
}
