//! Staged CPU to GPU uploads
//!
//! Every upload follows the same protocol: allocate a device-only
//! destination, fill a host-visible staging buffer, record the copy and a
//! barrier into a one-shot command buffer, wait on its fence, then drop the
//! staging buffer. Failures are returned, never retried.

use std::rc::Rc;

use ash::{vk, Instance};
use bytemuck::Pod;

use crate::assets::{MipLevel, TextureData};
use crate::render::vulkan::allocator::{MemoryAllocator, MemoryIntent};
use crate::render::vulkan::barriers::{color_mip_range, BarrierScope};
use crate::render::vulkan::commands::{CommandPool, CommandRecorder};
use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::resources::{BufferSet, ImageDescription, ImageSet};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Number of levels in a full mip chain for a `width` x `height` image
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// One copy region per stored mip level, at the level's byte offset
pub fn mip_copy_regions(levels: &[MipLevel], aspect: vk::ImageAspectFlags) -> Vec<vk::BufferImageCopy> {
    levels
        .iter()
        .enumerate()
        .map(|(level, mip)| vk::BufferImageCopy {
            buffer_offset: mip.offset as vk::DeviceSize,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: level as u32,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width: mip.width,
                height: mip.height,
                depth: 1,
            },
        })
        .collect()
}

/// Blit from level `level - 1` into `level` of a `width` x `height` image
pub fn mip_blit_region(level: u32, width: u32, height: u32) -> vk::ImageBlit {
    let extent_at = |level: u32| vk::Offset3D {
        x: (width >> level).max(1) as i32,
        y: (height >> level).max(1) as i32,
        z: 1,
    };
    let layers = |level: u32| vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: level,
        base_array_layer: 0,
        layer_count: 1,
    };

    vk::ImageBlit {
        src_subresource: layers(level - 1),
        src_offsets: [vk::Offset3D::default(), extent_at(level - 1)],
        dst_subresource: layers(level),
        dst_offsets: [vk::Offset3D::default(), extent_at(level)],
    }
}

/// Scope a freshly uploaded buffer is consumed in, picked from its usage
pub fn consumer_scope(usage: vk::BufferUsageFlags) -> BarrierScope {
    if usage.contains(vk::BufferUsageFlags::INDEX_BUFFER) {
        BarrierScope::TRANSFER_TO_INDEX_READ
    } else if usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER) {
        BarrierScope::TRANSFER_TO_UNIFORM_READ
    } else {
        BarrierScope::TRANSFER_TO_VERTEX_READ
    }
}

/// Performs staged uploads on the graphics queue
pub struct StagedUploader {
    allocator: Rc<MemoryAllocator>,
    command_pool: CommandPool,
    queue: vk::Queue,
    instance: Instance,
    physical_device: vk::PhysicalDevice,
}

impl StagedUploader {
    /// Create an uploader with its own transient command pool
    pub fn new(context: &VulkanContext, allocator: Rc<MemoryAllocator>) -> VulkanResult<Self> {
        let command_pool = CommandPool::new(context.raw_device().clone(), context.queue_families().graphics)?;
        Ok(Self {
            allocator,
            command_pool,
            queue: context.graphics_queue(),
            instance: context.instance().clone(),
            physical_device: context.physical_device().device,
        })
    }

    /// Allocator the uploader creates resources through
    pub fn allocator(&self) -> &Rc<MemoryAllocator> {
        &self.allocator
    }

    /// Upload `data` into a new device-only buffer with `usage | TRANSFER_DST`
    pub fn upload_buffer<T: Pod>(&self, data: &[T], usage: vk::BufferUsageFlags) -> VulkanResult<BufferSet> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len() as vk::DeviceSize;

        let destination = self.allocator.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryIntent::DeviceOnly,
        )?;
        let staging = self.stage(bytes)?;
        let scope = consumer_scope(usage);

        self.command_pool.one_shot(self.queue, |recorder| {
            recorder.copy_buffer(staging.handle(), destination.handle(), size);
            recorder.buffer_barrier(destination.handle(), &scope);
            Ok(())
        })?;

        log::trace!("Uploaded {} bytes ({:?})", size, usage);
        Ok(destination)
    }

    /// Upload a decoded texture into a new sampled image
    ///
    /// Stored mip levels are copied as-is. A single uncompressed level marked
    /// `generate_mips` is expanded into a full chain with linear blits when
    /// the format supports linear filtering.
    pub fn upload_image(&self, texture: &TextureData) -> VulkanResult<ImageSet> {
        validate_texture(texture)?;

        let extent = vk::Extent2D {
            width: texture.width,
            height: texture.height,
        };
        let generate = texture.generate_mips && texture.levels.len() == 1 && self.supports_linear_blit(texture.format);
        if texture.generate_mips && !generate && texture.levels.len() == 1 {
            log::warn!("{:?} cannot be blitted linearly; keeping a single mip level", texture.format);
        }

        let mip_levels = if generate {
            mip_level_count(texture.width, texture.height)
        } else {
            texture.levels.len() as u32
        };

        let mut description = ImageDescription::texture(texture.format, extent, mip_levels);
        description.requires_alpha_blending = texture.has_alpha;
        if generate {
            description.usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }

        let image = self.allocator.create_image(&description, MemoryIntent::DeviceOnly)?;
        let staging = self.stage(&texture.bytes)?;
        let regions = mip_copy_regions(&texture.levels, description.aspect);
        let full_range = description.full_range();

        self.command_pool.one_shot(self.queue, |recorder| {
            recorder.image_barrier(
                image.image(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                full_range,
                &BarrierScope::UNDEFINED_TO_TRANSFER_DST,
            );
            recorder.copy_buffer_to_image(staging.handle(), image.image(), &regions);

            if generate {
                record_mip_chain(recorder, image.image(), texture.width, texture.height, mip_levels);
            } else {
                recorder.image_barrier(
                    image.image(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    full_range,
                    &BarrierScope::TRANSFER_TO_SHADER_READ,
                );
            }
            Ok(())
        })?;

        log::debug!(
            "Uploaded {}x{} {:?} texture with {} mip levels",
            texture.width,
            texture.height,
            texture.format,
            mip_levels
        );
        Ok(image)
    }

    /// 1x1 RGBA texture standing in for a missing texture slot
    pub fn create_placeholder(&self, rgba: [u8; 4]) -> VulkanResult<ImageSet> {
        self.upload_image(&TextureData::solid(rgba))
    }

    /// Copy a buffer back to the host through a readback staging buffer
    ///
    /// The source must have been created with `TRANSFER_SRC` usage.
    pub fn read_back_buffer(&self, source: &BufferSet) -> VulkanResult<Vec<u8>> {
        let mut readback = self.allocator.create_buffer(
            source.size(),
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryIntent::HostReadback,
        )?;

        self.command_pool.one_shot(self.queue, |recorder| {
            recorder.copy_buffer(source.handle(), readback.handle(), source.size());
            recorder.buffer_barrier(readback.handle(), &BarrierScope::TRANSFER_TO_HOST_READ);
            Ok(())
        })?;

        readback.read_bytes()
    }

    fn stage(&self, bytes: &[u8]) -> VulkanResult<BufferSet> {
        let mut staging = self.allocator.create_buffer(
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryIntent::HostSequentialWrite,
        )?;
        staging.write_bytes(bytes)?;
        Ok(staging)
    }

    fn supports_linear_blit(&self, format: vk::Format) -> bool {
        let properties = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        let needed = vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
            | vk::FormatFeatureFlags::BLIT_SRC
            | vk::FormatFeatureFlags::BLIT_DST;
        properties.optimal_tiling_features.contains(needed)
    }
}

/// Reject textures whose levels do not fit their byte buffer
fn validate_texture(texture: &TextureData) -> VulkanResult<()> {
    if texture.width == 0 || texture.height == 0 || texture.bytes.is_empty() {
        return Err(VulkanError::ZeroSizedResource { resource: "texture" });
    }
    if texture.levels.is_empty() {
        return Err(VulkanError::InvalidOperation {
            reason: "texture has no mip levels".to_string(),
        });
    }
    match texture.levels.iter().find(|l| l.offset + l.size > texture.bytes.len()) {
        Some(level) => Err(VulkanError::InvalidOperation {
            reason: format!(
                "mip level at offset {} ({} bytes) overruns {} texture bytes",
                level.offset,
                level.size,
                texture.bytes.len()
            ),
        }),
        None => Ok(()),
    }
}

/// Blit level i-1 into level i for every level, leaving all in shader-read layout
fn record_mip_chain(recorder: &mut CommandRecorder, image: vk::Image, width: u32, height: u32, mip_levels: u32) {
    for level in 1..mip_levels {
        recorder.image_barrier(
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            color_mip_range(level - 1),
            &BarrierScope::TRANSFER_WRITE_TO_READ,
        );
        recorder.blit_image(image, mip_blit_region(level, width, height));
        recorder.image_barrier(
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            color_mip_range(level - 1),
            &BarrierScope::TRANSFER_READ_TO_SHADER_READ,
        );
    }

    // The last level was only ever written
    recorder.image_barrier(
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        color_mip_range(mip_levels - 1),
        &BarrierScope::TRANSFER_TO_SHADER_READ,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(300, 17), 9);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_copy_regions_follow_level_offsets() {
        let levels = [
            MipLevel { offset: 0, size: 128, width: 16, height: 16 },
            MipLevel { offset: 128, size: 32, width: 8, height: 8 },
            MipLevel { offset: 160, size: 8, width: 4, height: 4 },
        ];
        let regions = mip_copy_regions(&levels, vk::ImageAspectFlags::COLOR);

        assert_eq!(regions.len(), 3);
        let offsets: Vec<_> = regions.iter().map(|r| r.buffer_offset).collect();
        assert_eq!(offsets, vec![0, 128, 160]);
        assert_eq!(regions[2].image_subresource.mip_level, 2);
        assert_eq!(regions[1].image_extent.width, 8);
    }

    #[test]
    fn test_blit_region_halves_and_clamps() {
        let region = mip_blit_region(1, 64, 2);
        assert_eq!(region.src_offsets[1].x, 64);
        assert_eq!(region.src_offsets[1].y, 2);
        assert_eq!(region.dst_offsets[1].x, 32);
        assert_eq!(region.dst_offsets[1].y, 1);

        let deep = mip_blit_region(3, 64, 2);
        assert_eq!(deep.dst_offsets[1].y, 1);
        assert_eq!(deep.dst_subresource.mip_level, 3);
        assert_eq!(deep.src_subresource.mip_level, 2);
    }

    #[test]
    fn test_texture_validation_rejects_overrunning_levels() {
        let mut texture = TextureData::solid([1, 2, 3, 4]);
        assert!(validate_texture(&texture).is_ok());

        texture.levels = MipLevel::packed([(4, 1, 1), (4, 1, 1)]);
        assert!(matches!(
            validate_texture(&texture),
            Err(VulkanError::InvalidOperation { .. })
        ));

        texture.bytes.clear();
        assert!(matches!(
            validate_texture(&texture),
            Err(VulkanError::ZeroSizedResource { .. })
        ));
    }

    #[test]
    fn test_consumer_scope_follows_usage() {
        assert_eq!(
            consumer_scope(vk::BufferUsageFlags::INDEX_BUFFER),
            BarrierScope::TRANSFER_TO_INDEX_READ
        );
        assert_eq!(
            consumer_scope(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC),
            BarrierScope::TRANSFER_TO_VERTEX_READ
        );
        assert_eq!(
            consumer_scope(vk::BufferUsageFlags::UNIFORM_BUFFER),
            BarrierScope::TRANSFER_TO_UNIFORM_READ
        );
    }

    fn headless() -> (VulkanContext, StagedUploader) {
        let context = VulkanContext::new_headless("upload tests", false).unwrap();
        let allocator = MemoryAllocator::new(&context).unwrap();
        let uploader = StagedUploader::new(&context, allocator).unwrap();
        (context, uploader)
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_buffer_round_trip_is_byte_identical() {
        let (_context, uploader) = headless();
        let data: Vec<f32> = (0..1024).map(|i| i as f32 * 0.25).collect();

        let buffer = uploader
            .upload_buffer(&data, vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC)
            .unwrap();
        let bytes = uploader.read_back_buffer(&buffer).unwrap();

        assert_eq!(bytes.as_slice(), bytemuck::cast_slice::<f32, u8>(&data));
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_dropping_upload_releases_one_allocation() {
        let (_context, uploader) = headless();
        let before = uploader.allocator().live_allocations();

        let buffer = uploader.upload_buffer(&[1_u32, 2, 3], vk::BufferUsageFlags::INDEX_BUFFER).unwrap();
        assert_eq!(uploader.allocator().live_allocations(), before + 1);

        drop(buffer);
        assert_eq!(uploader.allocator().live_allocations(), before);
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_zero_sized_upload_is_rejected() {
        let (_context, uploader) = headless();
        let before = uploader.allocator().stats().total_allocations;

        let empty: [f32; 0] = [];
        let result = uploader.upload_buffer(&empty, vk::BufferUsageFlags::VERTEX_BUFFER);

        assert!(matches!(result, Err(VulkanError::ZeroSizedResource { .. })));
        assert_eq!(uploader.allocator().stats().total_allocations, before);
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_placeholder_is_single_level() {
        let (_context, uploader) = headless();
        let image = uploader.create_placeholder([128, 128, 255, 255]).unwrap();
        assert_eq!(image.mip_levels(), 1);
        assert_eq!(image.extent().width, 1);
    }
}
