//! # Rendering
//!
//! The Vulkan backend lives in [`vulkan`]; [`primitives`] holds the camera
//! and its input controller. [`RendererError`] is the error type of
//! everything that spans more than one layer, from window creation to the
//! scene upload.

pub mod primitives;
// Raw ash calls are confined to the Vulkan backend
#[allow(unsafe_code)]
pub mod vulkan;

use thiserror::Error;

use crate::assets::AssetError;
use crate::config::ConfigError;
use crate::render::vulkan::{VulkanError, WindowError};

pub use primitives::{Camera, CameraController};
pub use vulkan::{FrameLoop, FrameReport, SceneRenderer};

/// Errors surfaced to the application
#[derive(Error, Debug)]
pub enum RendererError {
    /// Vulkan setup, resource creation or a GPU failure
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Scene or texture loading failure
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Configuration could not be read
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
