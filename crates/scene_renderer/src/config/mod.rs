//! Configuration system
//!
//! `RendererConfig` is the single configuration document of the viewer. It is
//! loaded through the [`Config`] trait, which picks the format (TOML or RON)
//! from the file extension.

use std::path::Path;

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse(path, &contents)
    }

    /// Parse configuration text, using `path` only to pick the format
    fn parse(path: &str, contents: &str) -> Result<Self, ConfigError> {
        if path.ends_with(".toml") {
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Window creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Renderer".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Camera projection and control parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clipping plane distance
    pub near: f32,
    /// Far clipping plane distance
    pub far: f32,
    /// Movement speed in world units per second
    pub move_speed: f32,
    /// Radians of rotation per pixel of mouse motion
    pub mouse_sensitivity: f32,
    /// Starting position in world space
    pub position: [f32; 3],
    /// Starting look-at target in world space
    pub target: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 60.0,
            near: 0.1,
            far: 500.0,
            move_speed: 5.0,
            mouse_sensitivity: 0.003,
            position: [0.0, 2.0, 6.0],
            target: [0.0, 0.0, 0.0],
        }
    }
}

/// The single point light of the scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    /// Light position in world space
    pub position: [f32; 3],
    /// Linear RGB light colour
    pub color: [f32; 3],
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            position: [4.0, 8.0, 4.0],
            color: [1.0, 1.0, 1.0],
        }
    }
}

/// Top-level renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Window parameters
    pub window: WindowConfig,
    /// OBJ scene to load
    pub scene_path: String,
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
    /// Whether to enable the Khronos validation layer
    pub enable_validation: bool,
    /// Background colour used to clear the colour attachment
    pub clear_color: [f32; 4],
    /// Alpha below which alpha-tested fragments are discarded
    pub alpha_cutoff: f32,
    /// Camera parameters
    pub camera: CameraConfig,
    /// Light parameters
    pub light: LightConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            scene_path: "resources/models/scene.obj".to_string(),
            vertex_shader_path: resolve_shader_path("scene.vert.spv"),
            fragment_shader_path: resolve_shader_path("scene.frag.spv"),
            enable_validation: cfg!(debug_assertions),
            clear_color: [0.02, 0.02, 0.04, 1.0],
            alpha_cutoff: 0.5,
            camera: CameraConfig::default(),
            light: LightConfig::default(),
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &str) -> Result<Self, ConfigError> {
        if Path::new(path).exists() {
            log::info!("Loading renderer config from {}", path);
            Self::load_from_file(path)
        } else {
            log::info!("No config at {}, using defaults", path);
            Ok(Self::default())
        }
    }
}

/// Look for a compiled shader in the usual output directories
///
/// Falls back to `target/shaders/<name>` when nothing exists yet, so the
/// failure surfaces later as a shader load error naming that path.
pub fn resolve_shader_path(file_name: &str) -> String {
    const SHADER_DIRS: [&str; 4] = ["target/shaders/", "shaders/", "resources/shaders/", "../target/shaders/"];

    SHADER_DIRS
        .iter()
        .map(|dir| format!("{}{}", dir, file_name))
        .find(|candidate| Path::new(candidate).exists())
        .unwrap_or_else(|| format!("target/shaders/{}", file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let text = r#"
scene_path = "assets/sponza.obj"

[window]
width = 1280
"#;
        let config = RendererConfig::parse("renderer.toml", text).unwrap();
        assert_eq!(config.scene_path, "assets/sponza.obj");
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "Vulkan Renderer");
        assert_eq!(config.camera, CameraConfig::default());
    }

    #[test]
    fn test_ron_config_parses() {
        let text = r#"(alpha_cutoff: 0.25, light: (position: (1.0, 2.0, 3.0), color: (1.0, 0.5, 0.0)))"#;
        let config = RendererConfig::parse("renderer.ron", text).unwrap();
        assert_eq!(config.alpha_cutoff, 0.25);
        assert_eq!(config.light.position, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let result = RendererConfig::parse("renderer.json", "{}");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_malformed_toml_reports_parse_error() {
        let result = RendererConfig::parse("renderer.toml", "window = 3");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
