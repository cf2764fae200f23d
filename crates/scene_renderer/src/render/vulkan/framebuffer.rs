//! Framebuffers and the depth buffer they share

use std::rc::Rc;

use ash::{vk, Device};

use crate::render::vulkan::allocator::{MemoryAllocator, MemoryIntent};
use crate::render::vulkan::render_pass::DEPTH_FORMAT;
use crate::render::vulkan::resources::{ImageDescription, ImageSet};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a framebuffer over `attachments`
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&create_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { device, framebuffer })
    }

    /// One framebuffer per swapchain view, each sharing `depth_view`
    pub fn for_swapchain(
        device: &Device,
        render_pass: vk::RenderPass,
        color_views: &[vk::ImageView],
        depth_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VulkanResult<Vec<Self>> {
        color_views
            .iter()
            .map(|&view| Self::new(device.clone(), render_pass, &[view, depth_view], extent))
            .collect()
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe { self.device.destroy_framebuffer(self.framebuffer, None) };
    }
}

/// Depth attachment sized to the swapchain
pub struct DepthBuffer {
    image: ImageSet,
}

impl DepthBuffer {
    /// Allocate a device-only D32 depth image
    pub fn new(allocator: &Rc<MemoryAllocator>, extent: vk::Extent2D) -> VulkanResult<Self> {
        let description = ImageDescription::depth(DEPTH_FORMAT, extent);
        let image = allocator.create_image(&description, MemoryIntent::DeviceOnly)?;
        log::debug!("Depth buffer created: {}x{}", extent.width, extent.height);
        Ok(Self { image })
    }

    /// Get the image view handle
    pub fn image_view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Extent the buffer was created with
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}
