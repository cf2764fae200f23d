//! Scene and texture loading
//!
//! Everything here runs on the CPU and produces plain data: the OBJ importer
//! builds a [`Scene`](crate::scene::Scene), the texture loaders build
//! [`TextureData`] ready for a staged upload.

pub mod dds;
pub mod image_loader;
pub mod obj_loader;

use std::path::{Path, PathBuf};

use ash::vk;
use thiserror::Error;

pub use obj_loader::ObjLoader;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// A file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The OBJ or MTL file could not be parsed
    #[error("Failed to load OBJ {path}: {source}")]
    Obj {
        /// File that failed
        path: PathBuf,
        /// Parser error
        source: tobj::LoadError,
    },

    /// A PNG could not be decoded
    #[error("Failed to decode image {path}: {source}")]
    Image {
        /// File that failed
        path: PathBuf,
        /// Decoder error
        source: image::ImageError,
    },

    /// A DDS file is malformed or uses an unsupported format
    #[error("Invalid DDS {path}: {reason}")]
    Dds {
        /// File that failed
        path: PathBuf,
        /// What was wrong
        reason: String,
    },

    /// The file extension is not a supported texture format
    #[error("Unsupported texture format: {0}")]
    UnsupportedTexture(PathBuf),

    /// A mesh breaks the vertex/index invariants
    #[error("Invalid mesh {mesh}: {reason}")]
    InvalidMesh {
        /// Mesh index or name
        mesh: String,
        /// Which invariant failed
        reason: String,
    },
}

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

/// One stored mip level inside [`TextureData::bytes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipLevel {
    /// Byte offset of the level
    pub offset: usize,
    /// Byte length of the level
    pub size: usize,
    /// Level width in texels
    pub width: u32,
    /// Level height in texels
    pub height: u32,
}

impl MipLevel {
    /// Lay out levels back to back, level 0 first
    ///
    /// `sizes` yields `(byte_size, width, height)` per level.
    pub fn packed(sizes: impl IntoIterator<Item = (usize, u32, u32)>) -> Vec<Self> {
        let mut offset = 0;
        sizes
            .into_iter()
            .map(|(size, width, height)| {
                let level = Self {
                    offset,
                    size,
                    width,
                    height,
                };
                offset += size;
                level
            })
            .collect()
    }
}

/// Decoded texture ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    /// Width of level 0
    pub width: u32,
    /// Height of level 0
    pub height: u32,
    /// Texel or block format
    pub format: vk::Format,
    /// Stored levels, largest first
    pub levels: Vec<MipLevel>,
    /// Every level, back to back
    pub bytes: Vec<u8>,
    /// Build the rest of the chain on the GPU after upload
    pub generate_mips: bool,
    /// Some texel is not fully opaque
    pub has_alpha: bool,
}

impl TextureData {
    /// A 1x1 RGBA texture of one colour
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            format: vk::Format::R8G8B8A8_UNORM,
            levels: MipLevel::packed([(4, 1, 1)]),
            bytes: rgba.to_vec(),
            generate_mips: false,
            has_alpha: rgba[3] < 255,
        }
    }
}

/// Texture file formats the loader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFileKind {
    /// DirectDraw Surface with block-compressed levels
    Dds,
    /// PNG, decoded to RGBA8
    Png,
}

impl TextureFileKind {
    /// Classify by extension, ignoring case
    pub fn from_path(path: &Path) -> AssetResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "dds" => Ok(Self::Dds),
            "png" => Ok(Self::Png),
            _ => Err(AssetError::UnsupportedTexture(path.to_path_buf())),
        }
    }
}

/// Load any supported texture, vertically flipped for Vulkan's UV origin
///
/// `srgb` selects an sRGB format for colour data.
pub fn load_texture(path: &Path, srgb: bool) -> AssetResult<TextureData> {
    match TextureFileKind::from_path(path)? {
        TextureFileKind::Dds => dds::load_dds(path, srgb),
        TextureFileKind::Png => image_loader::load_png(path, srgb),
    }
}

/// Whether a texture file carries meaningful alpha
///
/// DDS files are judged by their block format from the header alone; PNGs
/// are decoded and scanned.
pub fn texture_has_alpha(path: &Path) -> AssetResult<bool> {
    match TextureFileKind::from_path(path)? {
        TextureFileKind::Dds => dds::probe_alpha(path),
        TextureFileKind::Png => image_loader::png_has_alpha(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_levels_accumulate_offsets() {
        let levels = MipLevel::packed([(64, 8, 8), (16, 4, 4), (4, 2, 2)]);
        let offsets: Vec<usize> = levels.iter().map(|l| l.offset).collect();
        assert_eq!(offsets, vec![0, 64, 80]);
        assert_eq!(levels[2].width, 2);
    }

    #[test]
    fn test_solid_texture() {
        let opaque = TextureData::solid([255, 255, 255, 255]);
        assert_eq!(opaque.bytes.len(), 4);
        assert_eq!(opaque.levels.len(), 1);
        assert!(!opaque.has_alpha);
        assert!(TextureData::solid([0, 0, 0, 0]).has_alpha);
    }

    #[test]
    fn test_texture_kind_from_extension() {
        assert_eq!(TextureFileKind::from_path(Path::new("a/b.DDS")).unwrap(), TextureFileKind::Dds);
        assert_eq!(TextureFileKind::from_path(Path::new("leaf.png")).unwrap(), TextureFileKind::Png);
        assert!(matches!(
            TextureFileKind::from_path(Path::new("leaf.tga")),
            Err(AssetError::UnsupportedTexture(_))
        ));
        assert!(TextureFileKind::from_path(Path::new("noext")).is_err());
    }
}
