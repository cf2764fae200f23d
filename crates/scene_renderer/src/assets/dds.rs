//! DDS loading for block-compressed textures
//!
//! Reads the legacy header and the DX10 extension, maps the pixel format to
//! a Vulkan block format through a static table, and flips every stored mip
//! level vertically block by block.

use std::path::Path;

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::assets::{AssetError, AssetResult, MipLevel, TextureData};
use crate::render::vulkan::upload::mip_level_count;

const MAGIC: &[u8; 4] = b"DDS ";
const HEADER_SIZE: usize = 124;
const DX10_HEADER_SIZE: usize = 20;
const DX10_FOURCC: [u8; 4] = *b"DX10";
const DDPF_FOURCC: u32 = 0x4;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PixelFormat {
    size: u32,
    flags: u32,
    four_cc: [u8; 4],
    rgb_bit_count: u32,
    r_mask: u32,
    g_mask: u32,
    b_mask: u32,
    a_mask: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Header {
    size: u32,
    flags: u32,
    height: u32,
    width: u32,
    pitch_or_linear_size: u32,
    depth: u32,
    mip_map_count: u32,
    reserved1: [u32; 11],
    pixel_format: PixelFormat,
    caps: u32,
    caps2: u32,
    caps3: u32,
    caps4: u32,
    reserved2: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Dx10Header {
    dxgi_format: u32,
    resource_dimension: u32,
    misc_flag: u32,
    array_size: u32,
    misc_flags2: u32,
}

/// Block-compressed formats the renderer accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFormat {
    /// DXT1: RGB with optional 1-bit alpha
    Bc1,
    /// DXT3: explicit 4-bit alpha
    Bc2,
    /// DXT5: interpolated alpha
    Bc3,
    /// Single channel
    Bc4,
    /// Two channels
    Bc5,
}

/// Legacy FourCC codes
const FOURCC_FORMATS: &[([u8; 4], BlockFormat)] = &[
    (*b"DXT1", BlockFormat::Bc1),
    (*b"DXT2", BlockFormat::Bc2),
    (*b"DXT3", BlockFormat::Bc2),
    (*b"DXT4", BlockFormat::Bc3),
    (*b"DXT5", BlockFormat::Bc3),
    (*b"ATI1", BlockFormat::Bc4),
    (*b"BC4U", BlockFormat::Bc4),
    (*b"ATI2", BlockFormat::Bc5),
    (*b"BC5U", BlockFormat::Bc5),
];

/// DXGI codes from the DX10 header; the flag marks sRGB variants
const DXGI_FORMATS: &[(u32, BlockFormat, bool)] = &[
    (70, BlockFormat::Bc1, false),
    (71, BlockFormat::Bc1, false),
    (72, BlockFormat::Bc1, true),
    (73, BlockFormat::Bc2, false),
    (74, BlockFormat::Bc2, false),
    (75, BlockFormat::Bc2, true),
    (76, BlockFormat::Bc3, false),
    (77, BlockFormat::Bc3, false),
    (78, BlockFormat::Bc3, true),
    (79, BlockFormat::Bc4, false),
    (80, BlockFormat::Bc4, false),
    (82, BlockFormat::Bc5, false),
    (83, BlockFormat::Bc5, false),
];

impl BlockFormat {
    /// Bytes per 4x4 block
    pub fn block_size(self) -> usize {
        match self {
            Self::Bc1 | Self::Bc4 => 8,
            Self::Bc2 | Self::Bc3 | Self::Bc5 => 16,
        }
    }

    /// Matching Vulkan format
    pub fn vk_format(self, srgb: bool) -> vk::Format {
        match (self, srgb) {
            (Self::Bc1, false) => vk::Format::BC1_RGBA_UNORM_BLOCK,
            (Self::Bc1, true) => vk::Format::BC1_RGBA_SRGB_BLOCK,
            (Self::Bc2, false) => vk::Format::BC2_UNORM_BLOCK,
            (Self::Bc2, true) => vk::Format::BC2_SRGB_BLOCK,
            (Self::Bc3, false) => vk::Format::BC3_UNORM_BLOCK,
            (Self::Bc3, true) => vk::Format::BC3_SRGB_BLOCK,
            (Self::Bc4, _) => vk::Format::BC4_UNORM_BLOCK,
            (Self::Bc5, _) => vk::Format::BC5_UNORM_BLOCK,
        }
    }

    /// Formats that store a real alpha channel
    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Bc2 | Self::Bc3)
    }

    /// Byte size of one level
    pub fn level_size(self, width: u32, height: u32) -> usize {
        blocks(width) * blocks(height) * self.block_size()
    }
}

fn blocks(texels: u32) -> usize {
    (texels.max(1) as usize).div_ceil(4)
}

/// Parsed header facts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdsInfo {
    /// Width of level 0
    pub width: u32,
    /// Height of level 0
    pub height: u32,
    /// Stored levels (at least one)
    pub mip_count: u32,
    /// Block format
    pub format: BlockFormat,
    /// The DX10 header asked for sRGB
    pub srgb: bool,
    /// Byte offset of level 0
    pub data_offset: usize,
}

/// Parse the headers of an in-memory DDS file
pub fn parse_header(bytes: &[u8]) -> Result<DdsInfo, String> {
    if bytes.len() < MAGIC.len() + HEADER_SIZE || &bytes[..4] != MAGIC {
        return Err("missing DDS magic or truncated header".to_string());
    }

    let header: Header = bytemuck::pod_read_unaligned(&bytes[4..4 + HEADER_SIZE]);
    if header.size as usize != HEADER_SIZE {
        return Err(format!("header size {} (expected {})", header.size, HEADER_SIZE));
    }
    if header.pixel_format.flags & DDPF_FOURCC == 0 {
        return Err("uncompressed DDS files are not supported".to_string());
    }

    let mut data_offset = 4 + HEADER_SIZE;
    let (format, srgb) = if header.pixel_format.four_cc == DX10_FOURCC {
        if bytes.len() < data_offset + DX10_HEADER_SIZE {
            return Err("truncated DX10 header".to_string());
        }
        let dx10: Dx10Header = bytemuck::pod_read_unaligned(&bytes[data_offset..data_offset + DX10_HEADER_SIZE]);
        data_offset += DX10_HEADER_SIZE;
        DXGI_FORMATS
            .iter()
            .find(|(code, _, _)| *code == dx10.dxgi_format)
            .map(|&(_, format, srgb)| (format, srgb))
            .ok_or_else(|| format!("unsupported DXGI format {}", dx10.dxgi_format))?
    } else {
        FOURCC_FORMATS
            .iter()
            .find(|(code, _)| *code == header.pixel_format.four_cc)
            .map(|&(_, format)| (format, false))
            .ok_or_else(|| {
                format!(
                    "unsupported FourCC {:?}",
                    String::from_utf8_lossy(&header.pixel_format.four_cc)
                )
            })?
    };

    if header.width == 0 || header.height == 0 {
        return Err("zero-sized image".to_string());
    }

    let full_chain = mip_level_count(header.width, header.height);
    if header.mip_map_count > full_chain {
        log::warn!(
            "DDS declares {} levels, a {}x{} image has at most {}",
            header.mip_map_count,
            header.width,
            header.height,
            full_chain
        );
    }

    Ok(DdsInfo {
        width: header.width,
        height: header.height,
        mip_count: header.mip_map_count.clamp(1, full_chain),
        format,
        srgb,
        data_offset,
    })
}

/// Decode an in-memory DDS file; levels that do not fit are dropped
pub fn decode(bytes: &[u8], srgb: bool) -> Result<TextureData, String> {
    let info = parse_header(bytes)?;
    let payload = &bytes[info.data_offset..];

    let mut sizes = Vec::new();
    let mut total = 0;
    for level in 0..info.mip_count {
        let width = (info.width >> level).max(1);
        let height = (info.height >> level).max(1);
        let size = info.format.level_size(width, height);
        if total + size > payload.len() {
            break;
        }
        sizes.push((size, width, height));
        total += size;
    }
    if sizes.is_empty() {
        return Err("file holds less data than its first mip level".to_string());
    }
    if sizes.len() < info.mip_count as usize {
        log::warn!("DDS declares {} levels but holds {}", info.mip_count, sizes.len());
    }

    let levels = MipLevel::packed(sizes);
    let mut data = payload[..total].to_vec();
    for level in &levels {
        flip_level(&mut data[level.offset..level.offset + level.size], info.format, level.width, level.height);
    }

    Ok(TextureData {
        width: info.width,
        height: info.height,
        format: info.format.vk_format(srgb || info.srgb),
        levels,
        bytes: data,
        generate_mips: false,
        has_alpha: info.format.has_alpha(),
    })
}

/// Load and flip a DDS texture
pub fn load_dds(path: &Path, srgb: bool) -> AssetResult<TextureData> {
    let bytes = read(path)?;
    let texture = decode(&bytes, srgb).map_err(|reason| AssetError::Dds {
        path: path.to_path_buf(),
        reason,
    })?;
    log::debug!(
        "Loaded DDS {:?}: {}x{} {:?}, {} levels",
        path,
        texture.width,
        texture.height,
        texture.format,
        texture.levels.len()
    );
    Ok(texture)
}

/// Whether the file's block format carries alpha, from the header alone
pub fn probe_alpha(path: &Path) -> AssetResult<bool> {
    let bytes = read(path)?;
    let info = parse_header(&bytes).map_err(|reason| AssetError::Dds {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(info.format.has_alpha())
}

fn read(path: &Path) -> AssetResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Flip one level upside down: reverse block rows, then texel rows inside each block
pub fn flip_level(data: &mut [u8], format: BlockFormat, width: u32, height: u32) {
    let block_size = format.block_size();
    let row_bytes = blocks(width) * block_size;
    let block_rows = blocks(height);
    // Short levels only fill the top rows of their single block row
    let texel_rows = height.clamp(1, 4) as usize;

    for row in 0..block_rows / 2 {
        let (top, bottom) = data.split_at_mut((block_rows - 1 - row) * row_bytes);
        top[row * row_bytes..(row + 1) * row_bytes].swap_with_slice(&mut bottom[..row_bytes]);
    }

    for block in data.chunks_exact_mut(block_size) {
        flip_block(block, format, texel_rows);
    }
}

fn flip_block(block: &mut [u8], format: BlockFormat, rows: usize) {
    match format {
        BlockFormat::Bc1 => flip_color_block(block, rows),
        BlockFormat::Bc2 => {
            flip_explicit_alpha(&mut block[..8], rows);
            flip_color_block(&mut block[8..], rows);
        }
        BlockFormat::Bc3 => {
            flip_interpolated_block(&mut block[..8], rows);
            flip_color_block(&mut block[8..], rows);
        }
        BlockFormat::Bc4 => flip_interpolated_block(block, rows),
        BlockFormat::Bc5 => {
            flip_interpolated_block(&mut block[..8], rows);
            flip_interpolated_block(&mut block[8..], rows);
        }
    }
}

/// Two endpoint colours, then one byte of 2-bit indices per row
fn flip_color_block(block: &mut [u8], rows: usize) {
    block[4..4 + rows].reverse();
}

/// Two bytes of 4-bit alpha per row
fn flip_explicit_alpha(block: &mut [u8], rows: usize) {
    for row in 0..rows / 2 {
        let mirror = rows - 1 - row;
        for byte in 0..2 {
            block.swap(row * 2 + byte, mirror * 2 + byte);
        }
    }
}

/// Two endpoint values, then 48 bits of 3-bit indices, 12 bits per row
fn flip_interpolated_block(block: &mut [u8], rows: usize) {
    let mut packed = [0_u8; 8];
    packed[..6].copy_from_slice(&block[2..8]);
    let bits = u64::from_le_bytes(packed);

    let row_bits = |row: usize| (bits >> (row * 12)) & 0xFFF;
    let mut flipped = bits;
    for row in 0..rows {
        let source = rows - 1 - row;
        flipped &= !(0xFFF << (row * 12));
        flipped |= row_bits(source) << (row * 12);
    }

    block[2..8].copy_from_slice(&flipped.to_le_bytes()[..6]);
}
