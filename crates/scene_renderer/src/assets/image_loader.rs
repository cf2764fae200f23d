//! PNG loading
//!
//! PNGs are decoded with the `image` crate, forced to RGBA8 and flipped so
//! row 0 is the bottom of the picture. Only level 0 is stored; the rest of
//! the chain is generated on the GPU.

use std::path::Path;

use ash::vk;

use crate::assets::{AssetError, AssetResult, MipLevel, TextureData};

/// Decode a PNG into a single-level texture
pub fn load_png(path: &Path, srgb: bool) -> AssetResult<TextureData> {
    let image = open(path)?.flipv().into_rgba8();
    let (width, height) = image.dimensions();
    let bytes = image.into_raw();
    let has_alpha = any_translucent(&bytes);

    log::debug!("Loaded PNG {:?}: {}x{}, alpha: {}", path, width, height, has_alpha);

    Ok(TextureData {
        width,
        height,
        format: if srgb {
            vk::Format::R8G8B8A8_SRGB
        } else {
            vk::Format::R8G8B8A8_UNORM
        },
        levels: MipLevel::packed([(bytes.len(), width, height)]),
        bytes,
        generate_mips: true,
        has_alpha,
    })
}

/// Whether any pixel of the PNG has alpha below 255
pub fn png_has_alpha(path: &Path) -> AssetResult<bool> {
    let image = open(path)?;
    if !image.color().has_alpha() {
        return Ok(false);
    }
    Ok(any_translucent(image.into_rgba8().as_raw()))
}

fn open(path: &Path) -> AssetResult<image::DynamicImage> {
    image::open(path).map_err(|source| AssetError::Image {
        path: path.to_path_buf(),
        source,
    })
}

fn any_translucent(rgba: &[u8]) -> bool {
    rgba.chunks_exact(4).any(|pixel| pixel[3] < 255)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn write_png(name: &str, image: &RgbaImage) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("scene_renderer_{}_{}.png", name, std::process::id()));
        image.save(&path).unwrap();
        path
    }

    #[test]
    fn test_png_is_flipped_vertically() {
        let mut image = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let path = write_png("flip", &image);

        let texture = load_png(&path, true).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(texture.format, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(texture.levels.len(), 1);
        assert!(texture.generate_mips);
        // Top-left red pixel is now the first pixel of the last row
        let row = 2 * 4;
        assert_eq!(&texture.bytes[row..row + 4], &[255, 0, 0, 255]);
        assert_eq!(&texture.bytes[0..4], &[0, 0, 0, 255]);
        assert!(!texture.has_alpha);
    }

    #[test]
    fn test_png_alpha_probe() {
        let mut image = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        let opaque = write_png("opaque", &image);
        image.put_pixel(3, 3, Rgba([10, 20, 30, 0]));
        let cutout = write_png("cutout", &image);

        assert!(!png_has_alpha(&opaque).unwrap());
        assert!(png_has_alpha(&cutout).unwrap());
        assert!(load_png(&cutout, false).unwrap().has_alpha);

        std::fs::remove_file(opaque).ok();
        std::fs::remove_file(cutout).ok();
    }

    #[test]
    fn test_missing_png_is_image_error() {
        let result = load_png(Path::new("no/such/texture.png"), true);
        assert!(matches!(result, Err(AssetError::Image { .. })));
    }
}
