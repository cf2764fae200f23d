//! GPU memory allocation
//!
//! Every buffer and image in the renderer is created through [`MemoryAllocator`],
//! which wraps the `vk-mem` sub-allocator and keeps an [`AllocationLedger`] of
//! live allocations so leaks and double frees are observable.

use std::cell::Cell;
use std::rc::Rc;

use ash::{vk, Device};
use vk_mem::Alloc;

use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::resources::{BufferSet, ImageDescription, ImageSet};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Where an allocation should live, expressed as intent rather than memory type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryIntent {
    /// Device-local memory the host never touches
    DeviceOnly,
    /// Host-visible memory written once, front to back (staging)
    HostSequentialWrite,
    /// Host-visible memory the host reads back
    HostReadback,
    /// Let the allocator decide from the usage flags
    Auto,
}

impl MemoryIntent {
    fn allocation_info(self) -> vk_mem::AllocationCreateInfo {
        let host_visible = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        match self {
            Self::DeviceOnly => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            Self::HostSequentialWrite => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::Auto,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                required_flags: host_visible,
                ..Default::default()
            },
            Self::HostReadback => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::Auto,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
                required_flags: host_visible,
                ..Default::default()
            },
            Self::Auto => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::Auto,
                ..Default::default()
            },
        }
    }

    /// Whether the host may map allocations made with this intent
    pub fn is_host_visible(self) -> bool {
        matches!(self, Self::HostSequentialWrite | Self::HostReadback)
    }
}

/// Snapshot of the ledger counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStats {
    /// Allocations currently alive
    pub live_allocations: usize,
    /// Bytes requested by live allocations
    pub live_bytes: u64,
    /// Allocations made over the allocator's lifetime
    pub total_allocations: usize,
    /// Releases that had no matching allocation
    pub unmatched_releases: usize,
}

/// Counts allocations and releases
///
/// Single-threaded, so plain `Cell`s are enough.
#[derive(Debug, Default)]
pub struct AllocationLedger {
    live: Cell<usize>,
    live_bytes: Cell<u64>,
    total: Cell<usize>,
    unmatched_releases: Cell<usize>,
}

impl AllocationLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful allocation of `bytes`
    pub fn record_allocation(&self, bytes: u64) {
        self.live.set(self.live.get() + 1);
        self.live_bytes.set(self.live_bytes.get() + bytes);
        self.total.set(self.total.get() + 1);
    }

    /// Record a release of an allocation of `bytes`
    pub fn record_release(&self, bytes: u64) {
        if self.live.get() == 0 {
            log::error!("Allocation released with no live allocations ({} bytes)", bytes);
            self.unmatched_releases.set(self.unmatched_releases.get() + 1);
            return;
        }
        self.live.set(self.live.get() - 1);
        self.live_bytes.set(self.live_bytes.get().saturating_sub(bytes));
    }

    /// Allocations currently alive
    pub fn live_allocations(&self) -> usize {
        self.live.get()
    }

    /// Current counters
    pub fn stats(&self) -> AllocationStats {
        AllocationStats {
            live_allocations: self.live.get(),
            live_bytes: self.live_bytes.get(),
            total_allocations: self.total.get(),
            unmatched_releases: self.unmatched_releases.get(),
        }
    }
}

/// Single point of GPU memory allocation
pub struct MemoryAllocator {
    allocator: vk_mem::Allocator,
    device: Device,
    ledger: AllocationLedger,
}

impl MemoryAllocator {
    /// Create the allocator for the context's device
    ///
    /// Returned in an `Rc` because every resource keeps a back-reference, which
    /// also guarantees the allocator outlives them.
    pub fn new(context: &VulkanContext) -> VulkanResult<Rc<Self>> {
        let create_info = vk_mem::AllocatorCreateInfo::new(
            context.instance(),
            context.raw_device(),
            context.physical_device().device,
        )
        .vulkan_api_version(vk::API_VERSION_1_2);

        let allocator = unsafe { vk_mem::Allocator::new(create_info) }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to create memory allocator: {:?}", e)))?;

        log::debug!("Memory allocator created");

        Ok(Rc::new(Self {
            allocator,
            device: context.raw_device().clone(),
            ledger: AllocationLedger::new(),
        }))
    }

    /// Create a buffer of `size` bytes
    ///
    /// Zero-sized requests are rejected with [`VulkanError::ZeroSizedResource`]
    /// before the driver is involved.
    pub fn create_buffer(
        self: &Rc<Self>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        intent: MemoryIntent,
    ) -> VulkanResult<BufferSet> {
        if size == 0 {
            return Err(VulkanError::ZeroSizedResource { resource: "buffer" });
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let (buffer, allocation) = unsafe { self.allocator.create_buffer(&buffer_info, &intent.allocation_info()) }
            .map_err(|result| allocation_error(result, size))?;

        self.ledger.record_allocation(size);
        log::trace!("Allocated {} byte buffer ({:?}, {:?})", size, usage, intent);

        Ok(BufferSet::from_parts(Rc::clone(self), buffer, allocation, size, intent))
    }

    /// Create a 2D image and a view covering all of its mip levels
    pub fn create_image(self: &Rc<Self>, description: &ImageDescription, intent: MemoryIntent) -> VulkanResult<ImageSet> {
        description.validate()?;

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(description.format)
            .extent(vk::Extent3D {
                width: description.extent.width,
                height: description.extent.height,
                depth: 1,
            })
            .mip_levels(description.mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(description.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let requested = description.estimated_size();
        let (image, mut allocation) = unsafe { self.allocator.create_image(&image_info, &intent.allocation_info()) }
            .map_err(|result| allocation_error(result, requested))?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(description.format)
            .subresource_range(description.full_range());

        let view = match unsafe { self.device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { self.allocator.destroy_image(image, &mut allocation) };
                return Err(VulkanError::Api(e));
            }
        };

        self.ledger.record_allocation(requested);
        log::trace!(
            "Allocated {}x{} image ({:?}, {} mips)",
            description.extent.width,
            description.extent.height,
            description.format,
            description.mip_levels
        );

        Ok(ImageSet::from_parts(Rc::clone(self), image, view, allocation, description.clone(), requested))
    }

    /// Copy `data` into a host-visible allocation
    pub(crate) fn write_mapped(&self, allocation: &mut vk_mem::Allocation, data: &[u8]) -> VulkanResult<()> {
        unsafe {
            let mapped = self.allocator.map_memory(allocation).map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped, data.len());
            self.allocator.unmap_memory(allocation);
        }
        Ok(())
    }

    /// Copy `len` bytes out of a host-visible allocation
    pub(crate) fn read_mapped(&self, allocation: &mut vk_mem::Allocation, len: usize) -> VulkanResult<Vec<u8>> {
        let mut out = vec![0_u8; len];
        unsafe {
            let mapped = self.allocator.map_memory(allocation).map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(mapped.cast_const(), out.as_mut_ptr(), len);
            self.allocator.unmap_memory(allocation);
        }
        Ok(out)
    }

    pub(crate) fn destroy_buffer(&self, buffer: vk::Buffer, allocation: &mut vk_mem::Allocation, size: u64) {
        unsafe { self.allocator.destroy_buffer(buffer, allocation) };
        self.ledger.record_release(size);
    }

    pub(crate) fn destroy_image(&self, image: vk::Image, view: vk::ImageView, allocation: &mut vk_mem::Allocation, size: u64) {
        unsafe {
            self.device.destroy_image_view(view, None);
            self.allocator.destroy_image(image, allocation);
        }
        self.ledger.record_release(size);
    }

    /// The device the allocator was created for
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Allocations currently alive
    pub fn live_allocations(&self) -> usize {
        self.ledger.live_allocations()
    }

    /// Current ledger counters
    pub fn stats(&self) -> AllocationStats {
        self.ledger.stats()
    }
}

impl Drop for MemoryAllocator {
    fn drop(&mut self) {
        let stats = self.ledger.stats();
        if stats.live_allocations > 0 {
            log::warn!(
                "Memory allocator dropped with {} live allocations ({} bytes)",
                stats.live_allocations,
                stats.live_bytes
            );
        }
        log::debug!("Memory allocator destroyed after {} allocations", stats.total_allocations);
    }
}

fn allocation_error(result: vk::Result, requested: u64) -> VulkanError {
    match result {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            VulkanError::OutOfMemory { requested, result }
        }
        other => VulkanError::from_result(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_balances_create_destroy_cycle() {
        let ledger = AllocationLedger::new();
        ledger.record_allocation(256);
        ledger.record_allocation(64);
        assert_eq!(ledger.live_allocations(), 2);
        assert_eq!(ledger.stats().live_bytes, 320);

        ledger.record_release(256);
        assert_eq!(ledger.live_allocations(), 1);
        assert_eq!(ledger.stats().live_bytes, 64);

        ledger.record_release(64);
        let stats = ledger.stats();
        assert_eq!(stats.live_allocations, 0);
        assert_eq!(stats.live_bytes, 0);
        assert_eq!(stats.total_allocations, 2);
        assert_eq!(stats.unmatched_releases, 0);
    }

    #[test]
    fn test_ledger_flags_unmatched_release() {
        let ledger = AllocationLedger::new();
        ledger.record_release(16);
        let stats = ledger.stats();
        assert_eq!(stats.live_allocations, 0);
        assert_eq!(stats.unmatched_releases, 1);
    }

    #[test]
    fn test_intent_maps_to_host_visibility() {
        assert!(!MemoryIntent::DeviceOnly.is_host_visible());
        assert!(!MemoryIntent::Auto.is_host_visible());
        assert!(MemoryIntent::HostSequentialWrite.is_host_visible());
        assert!(MemoryIntent::HostReadback.is_host_visible());

        let staging = MemoryIntent::HostSequentialWrite.allocation_info();
        assert!(staging.required_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(staging.flags.contains(vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE));
    }

    #[test]
    fn test_out_of_memory_results_keep_request_size() {
        match allocation_error(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY, 1024) {
            VulkanError::OutOfMemory { requested, .. } => assert_eq!(requested, 1024),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
