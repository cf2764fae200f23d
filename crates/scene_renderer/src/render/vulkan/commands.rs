//! Command buffer management
//!
//! [`CommandPool`] owns the pool and hands out primary buffers; [`CommandRecorder`]
//! wraps one buffer while it records, and [`ActiveRenderPass`] ends the pass
//! when it goes out of scope.

use ash::{vk, Device};

use crate::render::vulkan::barriers::{self, BarrierScope};
use crate::render::vulkan::sync::Fence;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe { device.create_command_pool(&pool_create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info) }.map_err(VulkanError::Api)
    }

    /// Return command buffers to the pool
    pub fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        unsafe { self.device.free_command_buffers(self.command_pool, command_buffers) };
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Record, submit and wait for a one-shot command buffer
    ///
    /// The buffer is begun with `ONE_TIME_SUBMIT`, handed to `record`, then
    /// submitted to `queue` with a fresh fence. The call blocks on that fence
    /// without a timeout. The buffer and fence are released whether or not
    /// the submission succeeded.
    pub fn one_shot<F>(&self, queue: vk::Queue, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder) -> VulkanResult<()>,
    {
        let command_buffer = self
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "driver returned no command buffer".to_string(),
            })?;

        let result = self.record_and_submit(queue, command_buffer, record);
        self.free_command_buffers(&[command_buffer]);
        result
    }

    fn record_and_submit<F>(&self, queue: vk::Queue, command_buffer: vk::CommandBuffer, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder) -> VulkanResult<()>,
    {
        let mut recorder = CommandRecorder::new(command_buffer, self.device.clone());
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        record(&mut recorder)?;
        let command_buffer = recorder.end()?;

        let fence = Fence::new(self.device.clone(), false)?;
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe { self.device.queue_submit(queue, &[submit_info.build()], fence.handle()) }
            .map_err(VulkanError::from_result)?;
        fence.wait(u64::MAX)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Buffers from this pool may still be in flight
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Records into one command buffer
pub struct CommandRecorder {
    command_buffer: vk::CommandBuffer,
    device: Device,
    recording: bool,
}

impl CommandRecorder {
    /// Wrap a command buffer that is not yet recording
    pub fn new(command_buffer: vk::CommandBuffer, device: Device) -> Self {
        Self {
            command_buffer,
            device,
            recording: false,
        }
    }

    /// Begin recording with the given usage flags
    pub fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> VulkanResult<&mut Self> {
        if self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string(),
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe { self.device.begin_command_buffer(self.command_buffer, &begin_info) }.map_err(VulkanError::Api)?;

        self.recording = true;
        Ok(self)
    }

    /// Raw handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Device the buffer belongs to
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Begin an inline render pass; it ends when the returned guard drops
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> VulkanResult<ActiveRenderPass<'_>> {
        self.ensure_recording()?;

        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
        }

        Ok(ActiveRenderPass { recorder: self })
    }

    /// Finish recording and hand back the raw buffer
    pub fn end(mut self) -> VulkanResult<vk::CommandBuffer> {
        self.ensure_recording()?;
        unsafe { self.device.end_command_buffer(self.command_buffer) }.map_err(VulkanError::Api)?;
        self.recording = false;
        Ok(self.command_buffer)
    }

    /// Copy whole regions between buffers
    pub fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe { self.device.cmd_copy_buffer(self.command_buffer, src, dst, &[region]) };
    }

    /// Copy buffer regions into an image in `TRANSFER_DST_OPTIMAL`
    pub fn copy_buffer_to_image(&mut self, src: vk::Buffer, dst: vk::Image, regions: &[vk::BufferImageCopy]) {
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                regions,
            );
        }
    }

    /// Write up to 65536 bytes inline into a buffer
    pub fn update_buffer(&mut self, buffer: vk::Buffer, data: &[u8]) {
        unsafe { self.device.cmd_update_buffer(self.command_buffer, buffer, 0, data) };
    }

    /// Barrier over a whole buffer
    pub fn buffer_barrier(&mut self, buffer: vk::Buffer, scope: &BarrierScope) {
        barriers::cmd_buffer_barrier(&self.device, self.command_buffer, buffer, scope);
    }

    /// Image barrier with a layout transition
    pub fn image_barrier(
        &mut self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        range: vk::ImageSubresourceRange,
        scope: &BarrierScope,
    ) {
        barriers::cmd_image_barrier(&self.device, self.command_buffer, image, old_layout, new_layout, range, scope);
    }

    /// Linear blit between two levels of the same image
    pub fn blit_image(&mut self, image: vk::Image, region: vk::ImageBlit) {
        unsafe {
            self.device.cmd_blit_image(
                self.command_buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                vk::Filter::LINEAR,
            );
        }
    }

    fn ensure_recording(&self) -> VulkanResult<()> {
        if self.recording {
            Ok(())
        } else {
            Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            })
        }
    }
}

/// Active render pass; ends the pass on drop
pub struct ActiveRenderPass<'a> {
    recorder: &'a mut CommandRecorder,
}

impl ActiveRenderPass<'_> {
    /// Bind a graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.recorder.device.cmd_bind_pipeline(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Bind descriptor sets starting at set 0
    pub fn bind_descriptor_sets(&mut self, layout: vk::PipelineLayout, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.recorder.device.cmd_bind_descriptor_sets(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                sets,
                &[],
            );
        }
    }

    /// Bind vertex buffers starting at binding 0, all at offset 0
    pub fn bind_vertex_buffers(&mut self, buffers: &[vk::Buffer]) {
        let offsets = vec![0; buffers.len()];
        unsafe {
            self.recorder
                .device
                .cmd_bind_vertex_buffers(self.recorder.command_buffer, 0, buffers, &offsets);
        }
    }

    /// Bind a 32-bit index buffer
    pub fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.recorder
                .device
                .cmd_bind_index_buffer(self.recorder.command_buffer, buffer, 0, vk::IndexType::UINT32);
        }
    }

    /// Indexed draw of one instance
    pub fn draw_indexed(&mut self, index_count: u32, first_index: u32) {
        unsafe {
            self.recorder
                .device
                .cmd_draw_indexed(self.recorder.command_buffer, index_count, 1, first_index, 0, 0);
        }
    }
}

impl Drop for ActiveRenderPass<'_> {
    fn drop(&mut self) {
        unsafe { self.recorder.device.cmd_end_render_pass(self.recorder.command_buffer) };
    }
}
