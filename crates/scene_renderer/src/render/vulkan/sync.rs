//! Vulkan synchronization primitives
//!
//! Semaphores order work on the GPU; fences are the only way the CPU waits.
//! [`FrameSyncSet`] holds the per-image command buffers and fences plus the
//! two semaphores shared by every frame.

use ash::{vk, Device};

use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Binary semaphore with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.semaphore, None) };
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { device, fence })
    }

    /// Block until the fence is signaled
    ///
    /// A timeout is reported as an error like any other failure.
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        match unsafe { self.device.wait_for_fences(&[self.fence], true, timeout) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(VulkanError::InvalidOperation {
                reason: format!("fence wait timed out after {} ns", timeout),
            }),
            Err(e) => Err(VulkanError::from_result(e)),
        }
    }

    /// Poll the fence without blocking
    pub fn is_signaled(&self) -> VulkanResult<bool> {
        unsafe { self.device.get_fence_status(self.fence) }.map_err(VulkanError::from_result)
    }

    /// Return the fence to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]) }.map_err(VulkanError::from_result)
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.destroy_fence(self.fence, None) };
    }
}

/// Synchronization objects for every swapchain image
///
/// Fences start signaled so the first wait on each slot returns at once.
pub struct FrameSyncSet {
    image_acquired: Semaphore,
    render_finished: Semaphore,
    fences: Vec<Fence>,
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: CommandPool,
}

impl FrameSyncSet {
    /// Create one command buffer and one fence per swapchain image
    pub fn new(device: &Device, queue_family_index: u32, image_count: usize) -> VulkanResult<Self> {
        let command_pool = CommandPool::new(device.clone(), queue_family_index)?;
        let command_buffers = command_pool.allocate_command_buffers(image_count as u32)?;
        let fences = (0..image_count)
            .map(|_| Fence::new(device.clone(), true))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!("Created frame synchronization for {} swapchain images", image_count);

        Ok(Self {
            image_acquired: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            fences,
            command_buffers,
            command_pool,
        })
    }

    /// Number of image slots
    pub fn len(&self) -> usize {
        self.fences.len()
    }

    /// Whether there are no image slots
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    /// Semaphore signaled when the acquired image is ready
    pub fn image_acquired(&self) -> vk::Semaphore {
        self.image_acquired.handle()
    }

    /// Semaphore signaled when rendering is done
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.handle()
    }

    /// Fence guarding `image_index`
    pub fn fence(&self, image_index: usize) -> VulkanResult<&Fence> {
        self.fences.get(image_index).ok_or_else(|| out_of_range(image_index, self.fences.len()))
    }

    /// Command buffer for `image_index`
    pub fn command_buffer(&self, image_index: usize) -> VulkanResult<vk::CommandBuffer> {
        self.command_buffers
            .get(image_index)
            .copied()
            .ok_or_else(|| out_of_range(image_index, self.command_buffers.len()))
    }

    /// Wait for the slot's previous submission, then unsignal its fence
    pub fn wait_and_reset(&self, image_index: usize) -> VulkanResult<()> {
        let fence = self.fence(image_index)?;
        fence.wait(u64::MAX)?;
        fence.reset()
    }

    /// Pool the command buffers came from
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }
}

fn out_of_range(image_index: usize, len: usize) -> VulkanError {
    VulkanError::InvalidOperation {
        reason: format!("swapchain image {} out of range ({} slots)", image_index, len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::context::VulkanContext;

    fn headless() -> VulkanContext {
        VulkanContext::new_headless("sync tests", false).unwrap()
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_frame_slots_start_signaled() {
        let context = headless();
        let sync = FrameSyncSet::new(context.raw_device(), context.queue_families().graphics, 3).unwrap();

        assert_eq!(sync.len(), 3);
        assert_ne!(sync.command_pool().handle(), vk::CommandPool::null());
        for slot in 0..3 {
            assert!(sync.fence(slot).unwrap().is_signaled().unwrap());
            assert_ne!(sync.command_buffer(slot).unwrap(), vk::CommandBuffer::null());
        }
        assert!(sync.fence(3).is_err());
        assert!(sync.command_buffer(3).is_err());
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_wait_and_reset_unsignals_only_that_slot() {
        let context = headless();
        let sync = FrameSyncSet::new(context.raw_device(), context.queue_families().graphics, 2).unwrap();

        sync.wait_and_reset(1).unwrap();

        assert!(!sync.fence(1).unwrap().is_signaled().unwrap());
        assert!(sync.fence(0).unwrap().is_signaled().unwrap());
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_fence_timeout_is_an_invalid_operation() {
        let context = headless();
        let fence = Fence::new(context.raw_device().clone(), false).unwrap();

        let result = fence.wait(1_000);

        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
    }
}
