//! Buffer and image resource objects
//!
//! [`BufferSet`] and [`ImageSet`] pair a GPU allocation with its handle (and
//! view, for images). They are move-only: there is no `Clone`, because a
//! duplicated handle would be freed twice. Dropping one returns its memory
//! through the allocator it came from.

use std::rc::Rc;

use ash::vk;

use crate::render::vulkan::allocator::{MemoryAllocator, MemoryIntent};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// A buffer handle and the allocation backing it
pub struct BufferSet {
    allocator: Rc<MemoryAllocator>,
    buffer: vk::Buffer,
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
    intent: MemoryIntent,
}

impl BufferSet {
    pub(crate) fn from_parts(
        allocator: Rc<MemoryAllocator>,
        buffer: vk::Buffer,
        allocation: vk_mem::Allocation,
        size: vk::DeviceSize,
        intent: MemoryIntent,
    ) -> Self {
        Self {
            allocator,
            buffer,
            allocation,
            size,
            intent,
        }
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Memory intent the buffer was allocated with
    pub fn intent(&self) -> MemoryIntent {
        self.intent
    }

    /// Overwrite the start of a host-visible buffer with `data`
    pub fn write_bytes(&mut self, data: &[u8]) -> VulkanResult<()> {
        self.check_host_access(data.len() as u64)?;
        self.allocator.write_mapped(&mut self.allocation, data)
    }

    /// Read the whole of a host-visible buffer
    pub fn read_bytes(&mut self) -> VulkanResult<Vec<u8>> {
        self.check_host_access(self.size)?;
        self.allocator.read_mapped(&mut self.allocation, self.size as usize)
    }

    fn check_host_access(&self, len: u64) -> VulkanResult<()> {
        if !self.intent.is_host_visible() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("buffer allocated as {:?} is not host visible", self.intent),
            });
        }
        if len > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{} bytes do not fit in a {} byte buffer", len, self.size),
            });
        }
        Ok(())
    }
}

impl Drop for BufferSet {
    fn drop(&mut self) {
        self.allocator.destroy_buffer(self.buffer, &mut self.allocation, self.size);
    }
}

impl std::fmt::Debug for BufferSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferSet")
            .field("buffer", &self.buffer)
            .field("size", &self.size)
            .field("intent", &self.intent)
            .finish()
    }
}

/// Everything needed to create a 2D image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescription {
    /// Texel format
    pub format: vk::Format,
    /// Size of mip level 0
    pub extent: vk::Extent2D,
    /// Number of mip levels
    pub mip_levels: u32,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Aspect used for the view and barriers
    pub aspect: vk::ImageAspectFlags,
    /// Sampled with alpha blending or alpha testing
    pub requires_alpha_blending: bool,
}

impl ImageDescription {
    /// A sampled colour texture that will be filled by a transfer
    pub fn texture(format: vk::Format, extent: vk::Extent2D, mip_levels: u32) -> Self {
        Self {
            format,
            extent,
            mip_levels,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            aspect: vk::ImageAspectFlags::COLOR,
            requires_alpha_blending: false,
        }
    }

    /// A depth attachment the size of the swapchain
    pub fn depth(format: vk::Format, extent: vk::Extent2D) -> Self {
        Self {
            format,
            extent,
            mip_levels: 1,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
            requires_alpha_blending: false,
        }
    }

    /// Subresource range covering every mip level
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    /// Reject descriptions that would create an empty image
    pub fn validate(&self) -> VulkanResult<()> {
        if self.extent.width == 0 || self.extent.height == 0 || self.mip_levels == 0 {
            return Err(VulkanError::ZeroSizedResource { resource: "image" });
        }
        let full_chain = 32 - self.extent.width.max(self.extent.height).leading_zeros();
        if self.mip_levels > full_chain {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "{} mip levels requested for a {}x{} image (max {})",
                    self.mip_levels, self.extent.width, self.extent.height, full_chain
                ),
            });
        }
        Ok(())
    }

    /// Rough byte size for bookkeeping; drivers may pad differently
    pub fn estimated_size(&self) -> u64 {
        let texel_bytes: u64 = match self.format {
            vk::Format::D32_SFLOAT | vk::Format::R8G8B8A8_SRGB | vk::Format::R8G8B8A8_UNORM => 4,
            _ => 1,
        };
        (0..self.mip_levels)
            .map(|level| {
                let width = u64::from(self.extent.width.checked_shr(level).unwrap_or(0).max(1));
                let height = u64::from(self.extent.height.checked_shr(level).unwrap_or(0).max(1));
                width * height * texel_bytes
            })
            .sum()
    }
}

/// An image, its view, and the allocation backing it
pub struct ImageSet {
    allocator: Rc<MemoryAllocator>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: vk_mem::Allocation,
    description: ImageDescription,
    allocated_size: u64,
}

impl ImageSet {
    pub(crate) fn from_parts(
        allocator: Rc<MemoryAllocator>,
        image: vk::Image,
        view: vk::ImageView,
        allocation: vk_mem::Allocation,
        description: ImageDescription,
        allocated_size: u64,
    ) -> Self {
        Self {
            allocator,
            image,
            view,
            allocation,
            description,
            allocated_size,
        }
    }

    /// Image handle
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// View over every mip level
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Texel format
    pub fn format(&self) -> vk::Format {
        self.description.format
    }

    /// Size of mip level 0
    pub fn extent(&self) -> vk::Extent2D {
        self.description.extent
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.description.mip_levels
    }

    /// Description the image was created from
    pub fn description(&self) -> &ImageDescription {
        &self.description
    }

    /// Whether the texture needs the alpha-tested pipeline
    pub fn requires_alpha_blending(&self) -> bool {
        self.description.requires_alpha_blending
    }
}

impl Drop for ImageSet {
    fn drop(&mut self) {
        self.allocator
            .destroy_image(self.image, self.view, &mut self.allocation, self.allocated_size);
    }
}

impl std::fmt::Debug for ImageSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSet")
            .field("image", &self.image)
            .field("view", &self.view)
            .field("description", &self.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_zero_extent_images_are_rejected() {
        let zero_width = ImageDescription::texture(vk::Format::R8G8B8A8_SRGB, extent(0, 16), 1);
        assert!(matches!(
            zero_width.validate(),
            Err(VulkanError::ZeroSizedResource { resource: "image" })
        ));

        let zero_mips = ImageDescription::texture(vk::Format::R8G8B8A8_SRGB, extent(16, 16), 0);
        assert!(zero_mips.validate().is_err());

        let fine = ImageDescription::texture(vk::Format::R8G8B8A8_SRGB, extent(1, 1), 1);
        assert!(fine.validate().is_ok());
    }

    #[test]
    fn test_mip_count_beyond_full_chain_is_rejected() {
        let too_deep = ImageDescription::texture(vk::Format::BC1_RGBA_UNORM_BLOCK, extent(4, 4), 40);
        assert!(matches!(too_deep.validate(), Err(VulkanError::InvalidOperation { .. })));
        assert_eq!(too_deep.estimated_size(), 16 + 4 + 1 + 37);

        let full = ImageDescription::texture(vk::Format::R8G8B8A8_UNORM, extent(4, 4), 3);
        assert!(full.validate().is_ok());
    }

    #[test]
    fn test_full_range_covers_all_mips() {
        let description = ImageDescription::texture(vk::Format::R8G8B8A8_SRGB, extent(256, 128), 9);
        let range = description.full_range();
        assert_eq!(range.base_mip_level, 0);
        assert_eq!(range.level_count, 9);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_depth_description_uses_depth_aspect() {
        let description = ImageDescription::depth(vk::Format::D32_SFLOAT, extent(800, 600));
        assert_eq!(description.aspect, vk::ImageAspectFlags::DEPTH);
        assert!(description.usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        assert_eq!(description.estimated_size(), 800 * 600 * 4);
    }
}
