//! Swapchain management
//!
//! Creation, teardown and recreation of the presentable chain and its image
//! views. The choice of format, image count, extent and sharing mode lives in
//! free functions so it can be checked without a surface.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};
use bitflags::bitflags;

use crate::render::vulkan::context::{QueueFamilyIndices, VulkanContext};
use crate::render::vulkan::{VulkanError, VulkanResult};

bitflags! {
    /// What dependents must rebuild after a recreation
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SwapchainChanges: u32 {
        /// Surface format changed; the render pass targets the old one
        const RENDER_PASS = 1 << 0;
        /// Extent changed
        const DEPTH_BUFFER = 1 << 1;
        /// Views were recreated, and possibly resized
        const FRAMEBUFFERS = 1 << 2;
        /// Baked viewport and scissor no longer match
        const PIPELINES = 1 << 3;
    }
}

/// Create one object per input, or none at all
///
/// When a creation fails, the objects already made are released and the
/// error is returned.
pub fn create_all_or_release<I, T, C, R>(inputs: &[I], mut create: C, mut release: R) -> VulkanResult<Vec<T>>
where
    C: FnMut(&I) -> VulkanResult<T>,
    R: FnMut(T),
{
    let mut created = Vec::with_capacity(inputs.len());
    for input in inputs {
        match create(input) {
            Ok(object) => created.push(object),
            Err(e) => {
                created.into_iter().for_each(&mut release);
                return Err(e);
            }
        }
    }
    Ok(created)
}

/// Compare the old and new chain to decide what must be rebuilt
///
/// Framebuffers always reference the swapchain views, which are new after
/// every recreation, so they are always included.
pub fn changes_between(
    old_format: vk::Format,
    old_extent: vk::Extent2D,
    new_format: vk::Format,
    new_extent: vk::Extent2D,
) -> SwapchainChanges {
    let mut changes = SwapchainChanges::FRAMEBUFFERS;
    if old_format != new_format {
        changes |= SwapchainChanges::RENDER_PASS | SwapchainChanges::PIPELINES;
    }
    if old_extent != new_extent {
        changes |= SwapchainChanges::DEPTH_BUFFER | SwapchainChanges::PIPELINES;
    }
    changes
}

/// Prefer RGBA8 sRGB, then BGRA8 sRGB, then whatever comes first
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    const PREFERRED: [vk::Format; 2] = [vk::Format::R8G8B8A8_SRGB, vk::Format::B8G8R8A8_SRGB];

    PREFERRED
        .iter()
        .find_map(|&wanted| {
            available
                .iter()
                .find(|sf| sf.format == wanted && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
                .copied()
        })
        .or_else(|| available.first().copied())
}

/// One more than the minimum, clamped to the maximum (0 means unbounded)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        wanted.min(capabilities.max_image_count)
    } else {
        wanted
    }
}

/// Use the surface's extent unless it leaves the choice to us
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer_size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: framebuffer_size
            .0
            .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: framebuffer_size
            .1
            .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

/// Concurrent sharing across distinct families, exclusive otherwise
pub fn choose_sharing(families: QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    let unique = families.unique();
    if unique.len() > 1 {
        (vk::SharingMode::CONCURRENT, unique)
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

/// Result of acquiring an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready; the index is valid for this frame
    Ready(u32),
    /// The chain no longer matches the surface
    OutOfDate,
}

/// Result of presenting an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The image was queued
    Presented,
    /// Queued or not, the chain should be recreated before the next frame
    NeedsResize,
}

/// Swapchain with its views
///
/// Images belong to the chain; views are owned here and always parallel the
/// image list.
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a chain for the context's surface
    ///
    /// A zero framebuffer size is rejected; the caller waits for the window
    /// to be restored instead.
    pub fn create(context: &VulkanContext, framebuffer_size: (u32, u32)) -> VulkanResult<Self> {
        let mut swapchain = Self {
            device: context.raw_device().clone(),
            loader: context.swapchain_loader().clone(),
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D::default(),
        };
        swapchain.build(context, framebuffer_size)?;
        Ok(swapchain)
    }

    fn build(&mut self, context: &VulkanContext, framebuffer_size: (u32, u32)) -> VulkanResult<()> {
        if framebuffer_size.0 == 0 || framebuffer_size.1 == 0 {
            return Err(VulkanError::ZeroSizedResource { resource: "swapchain" });
        }

        let surface = context.surface().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "headless context has no surface to present to".to_string(),
        })?;
        let physical_device = context.physical_device().device;
        let surface_loader = context.surface_loader();

        let capabilities = unsafe { surface_loader.get_physical_device_surface_capabilities(physical_device, surface) }
            .map_err(VulkanError::from_result)?;
        let formats = unsafe { surface_loader.get_physical_device_surface_formats(physical_device, surface) }
            .map_err(VulkanError::from_result)?;

        let format = choose_surface_format(&formats)
            .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".to_string()))?;
        let extent = choose_extent(&capabilities, framebuffer_size);
        if extent.width == 0 || extent.height == 0 {
            return Err(VulkanError::ZeroSizedResource { resource: "swapchain" });
        }
        let image_count = choose_image_count(&capabilities);
        let (sharing_mode, family_indices) = choose_sharing(context.queue_families());

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);

        let swapchain = unsafe { self.loader.create_swapchain(&create_info, None) }.map_err(VulkanError::from_result)?;
        self.swapchain = swapchain;
        self.format = format;
        self.extent = extent;

        let images = unsafe { self.loader.get_swapchain_images(swapchain) }.map_err(VulkanError::from_result)?;
        let device = &self.device;
        let views = create_all_or_release(
            &images,
            |&image| {
                let view_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                unsafe { device.create_image_view(&view_info, None) }.map_err(VulkanError::Api)
            },
            |view| unsafe { device.destroy_image_view(view, None) },
        )?;
        self.images = images;
        self.image_views = views;

        log::info!(
            "Swapchain created: {}x{} {:?}, {} images",
            extent.width,
            extent.height,
            format.format,
            self.images.len()
        );
        Ok(())
    }

    /// Destroy every view, then the chain
    pub fn destroy(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
        }
        self.swapchain = vk::SwapchainKHR::null();
        self.images.clear();
    }

    /// Rebuild the chain for a new framebuffer size
    ///
    /// Waits for the device to go idle first. The returned flags tell the
    /// owner which dependent objects are stale.
    pub fn recreate(&mut self, context: &VulkanContext, framebuffer_size: (u32, u32)) -> VulkanResult<SwapchainChanges> {
        context.wait_idle()?;

        let old_format = self.format.format;
        let old_extent = self.extent;

        self.destroy();
        self.build(context, framebuffer_size)?;

        let changes = changes_between(old_format, old_extent, self.format.format, self.extent);
        log::info!("Swapchain recreated ({:?})", changes);
        Ok(changes)
    }

    /// Acquire the next image, signaling `semaphore` when it is ready
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> VulkanResult<AcquireOutcome> {
        let result =
            unsafe { self.loader.acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null()) };
        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Ready(index)),
            // A suboptimal acquire still signals the semaphore, so the owner
            // must replace its semaphores when it recreates the chain.
            Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(VulkanError::from_result(e)),
        }
    }

    /// Queue `image_index` for presentation once `wait_semaphore` signals
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphore: vk::Semaphore) -> VulkanResult<PresentOutcome> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::NeedsResize),
            Err(e) => Err(VulkanError::from_result(e)),
        }
    }

    /// Chain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Surface format
    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    /// Images owned by the chain
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// One view per image, same order
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn capabilities(min: u32, max: u32, current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: current,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    const UNDEFINED_EXTENT: vk::Extent2D = vk::Extent2D {
        width: u32::MAX,
        height: u32::MAX,
    };

    #[test]
    fn test_format_preference_order() {
        let both = [
            surface_format(vk::Format::B8G8R8A8_SRGB),
            surface_format(vk::Format::R8G8B8A8_SRGB),
        ];
        assert_eq!(choose_surface_format(&both).unwrap().format, vk::Format::R8G8B8A8_SRGB);

        let bgra_only = [
            surface_format(vk::Format::B8G8R8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(choose_surface_format(&bgra_only).unwrap().format, vk::Format::B8G8R8A8_SRGB);

        let neither = [surface_format(vk::Format::A2B10G10R10_UNORM_PACK32)];
        assert_eq!(
            choose_surface_format(&neither).unwrap().format,
            vk::Format::A2B10G10R10_UNORM_PACK32
        );

        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_image_count_clamped() {
        assert_eq!(choose_image_count(&capabilities(2, 0, UNDEFINED_EXTENT)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 8, UNDEFINED_EXTENT)), 3);
        assert_eq!(choose_image_count(&capabilities(3, 3, UNDEFINED_EXTENT)), 3);
    }

    #[test]
    fn test_extent_follows_surface_or_framebuffer() {
        let fixed = vk::Extent2D { width: 640, height: 480 };
        assert_eq!(choose_extent(&capabilities(2, 0, fixed), (1920, 1080)), fixed);

        let derived = choose_extent(&capabilities(2, 0, UNDEFINED_EXTENT), (1920, 1080));
        assert_eq!(derived, vk::Extent2D { width: 1920, height: 1080 });

        let clamped = choose_extent(&capabilities(2, 0, UNDEFINED_EXTENT), (10_000, 0));
        assert_eq!(clamped, vk::Extent2D { width: 4096, height: 1 });
    }

    #[test]
    fn test_sharing_mode_by_family_count() {
        let shared = QueueFamilyIndices { graphics: 0, present: 0 };
        let (mode, indices) = choose_sharing(shared);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());

        let split = QueueFamilyIndices { graphics: 0, present: 2 };
        let (mode, indices) = choose_sharing(split);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn test_changes_report_what_to_rebuild() {
        let small = vk::Extent2D { width: 800, height: 600 };
        let large = vk::Extent2D { width: 1024, height: 768 };
        let srgb = vk::Format::B8G8R8A8_SRGB;

        let same = changes_between(srgb, small, srgb, small);
        assert_eq!(same, SwapchainChanges::FRAMEBUFFERS);

        let resized = changes_between(srgb, small, srgb, large);
        assert!(resized.contains(SwapchainChanges::DEPTH_BUFFER | SwapchainChanges::PIPELINES));
        assert!(!resized.contains(SwapchainChanges::RENDER_PASS));

        let reformatted = changes_between(srgb, small, vk::Format::R8G8B8A8_SRGB, small);
        assert!(reformatted.contains(SwapchainChanges::RENDER_PASS));
        assert!(!reformatted.contains(SwapchainChanges::DEPTH_BUFFER));
    }

    #[test]
    fn test_failed_view_creation_releases_earlier_views() {
        let mut released = Vec::new();
        let result = create_all_or_release(
            &[1_u32, 2, 3, 4],
            |&image| {
                if image == 3 {
                    Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_HOST_MEMORY))
                } else {
                    Ok(image * 10)
                }
            },
            |view| released.push(view),
        );

        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_HOST_MEMORY))));
        assert_eq!(released, vec![10, 20]);

        let views = create_all_or_release(&[1_u32, 2], |&image| Ok(image), |_: u32| panic!("nothing to release"));
        assert_eq!(views.unwrap(), vec![1, 2]);
    }

    #[test]
    #[ignore = "requires a display and a Vulkan device"]
    fn test_views_track_images_across_recreation() {
        use crate::render::vulkan::window::Window;

        let mut window = Window::new("swapchain test", 320, 240).unwrap();
        let context = VulkanContext::new(&mut window, "swapchain test", false).unwrap();
        let mut swapchain = Swapchain::create(&context, window.get_framebuffer_size()).unwrap();
        assert_eq!(swapchain.images().len(), swapchain.image_views().len());

        for size in [(640, 480), (200, 100), (320, 240)] {
            swapchain.recreate(&context, size).unwrap();
            assert_eq!(swapchain.images().len(), swapchain.image_views().len());
            assert!(!swapchain.images().is_empty());
        }
    }
}
