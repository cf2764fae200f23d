//! Pipeline barrier builders
//!
//! Plain constructors for the buffer and image barriers the upload and frame
//! code issue. Queue family ownership never transfers, so both family
//! indices are always `QUEUE_FAMILY_IGNORED`.

use ash::vk;

/// Stage and access scopes on both sides of a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierScope {
    /// Stages that must complete before the barrier
    pub src_stage: vk::PipelineStageFlags,
    /// Writes made available by the barrier
    pub src_access: vk::AccessFlags,
    /// Stages that wait on the barrier
    pub dst_stage: vk::PipelineStageFlags,
    /// Accesses the barrier makes the data visible to
    pub dst_access: vk::AccessFlags,
}

impl BarrierScope {
    /// Fresh image about to receive a transfer
    pub const UNDEFINED_TO_TRANSFER_DST: Self = Self {
        src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
        src_access: vk::AccessFlags::empty(),
        dst_stage: vk::PipelineStageFlags::TRANSFER,
        dst_access: vk::AccessFlags::TRANSFER_WRITE,
    };

    /// Transfer-written texture about to be sampled in fragment shaders
    pub const TRANSFER_TO_SHADER_READ: Self = Self {
        src_stage: vk::PipelineStageFlags::TRANSFER,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        dst_access: vk::AccessFlags::SHADER_READ,
    };

    /// Transfer-written vertex buffer about to be fetched
    pub const TRANSFER_TO_VERTEX_READ: Self = Self {
        src_stage: vk::PipelineStageFlags::TRANSFER,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_stage: vk::PipelineStageFlags::VERTEX_INPUT,
        dst_access: vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
    };

    /// Transfer-written index buffer about to be fetched
    pub const TRANSFER_TO_INDEX_READ: Self = Self {
        src_stage: vk::PipelineStageFlags::TRANSFER,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_stage: vk::PipelineStageFlags::VERTEX_INPUT,
        dst_access: vk::AccessFlags::INDEX_READ,
    };

    /// Transfer write about to be read back by the host
    pub const TRANSFER_TO_HOST_READ: Self = Self {
        src_stage: vk::PipelineStageFlags::TRANSFER,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_stage: vk::PipelineStageFlags::HOST,
        dst_access: vk::AccessFlags::HOST_READ,
    };

    /// Uniform buffer last read by shaders, about to be overwritten in a transfer
    pub const UNIFORM_READ_TO_TRANSFER: Self = Self {
        src_stage: vk::PipelineStageFlags::from_raw(
            vk::PipelineStageFlags::VERTEX_SHADER.as_raw() | vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw(),
        ),
        src_access: vk::AccessFlags::UNIFORM_READ,
        dst_stage: vk::PipelineStageFlags::TRANSFER,
        dst_access: vk::AccessFlags::TRANSFER_WRITE,
    };

    /// Uniform buffer just updated, about to be read by shaders
    pub const TRANSFER_TO_UNIFORM_READ: Self = Self {
        src_stage: vk::PipelineStageFlags::TRANSFER,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_stage: vk::PipelineStageFlags::from_raw(
            vk::PipelineStageFlags::VERTEX_SHADER.as_raw() | vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw(),
        ),
        dst_access: vk::AccessFlags::UNIFORM_READ,
    };

    /// Mip level written by a copy or blit, about to be blitted from
    pub const TRANSFER_WRITE_TO_READ: Self = Self {
        src_stage: vk::PipelineStageFlags::TRANSFER,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_stage: vk::PipelineStageFlags::TRANSFER,
        dst_access: vk::AccessFlags::TRANSFER_READ,
    };

    /// Mip level used as a blit source, about to be sampled
    pub const TRANSFER_READ_TO_SHADER_READ: Self = Self {
        src_stage: vk::PipelineStageFlags::TRANSFER,
        src_access: vk::AccessFlags::TRANSFER_READ,
        dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        dst_access: vk::AccessFlags::SHADER_READ,
    };
}

/// Barrier over a whole buffer
pub fn buffer_barrier(buffer: vk::Buffer, scope: &BarrierScope) -> vk::BufferMemoryBarrier {
    vk::BufferMemoryBarrier::builder()
        .src_access_mask(scope.src_access)
        .dst_access_mask(scope.dst_access)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(buffer)
        .offset(0)
        .size(vk::WHOLE_SIZE)
        .build()
}

/// Image barrier with a layout transition over `range`
pub fn image_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    range: vk::ImageSubresourceRange,
    scope: &BarrierScope,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_access_mask(scope.src_access)
        .dst_access_mask(scope.dst_access)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .build()
}

/// Colour range of a single mip level
pub fn color_mip_range(level: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: level,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Record one buffer barrier
pub fn cmd_buffer_barrier(device: &ash::Device, command_buffer: vk::CommandBuffer, buffer: vk::Buffer, scope: &BarrierScope) {
    let barrier = buffer_barrier(buffer, scope);
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            scope.src_stage,
            scope.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[barrier],
            &[],
        );
    }
}

/// Record one image barrier
pub fn cmd_image_barrier(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    range: vk::ImageSubresourceRange,
    scope: &BarrierScope,
) {
    let barrier = image_barrier(image, old_layout, new_layout, range, scope);
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            scope.src_stage,
            scope.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_barrier_covers_whole_buffer() {
        let barrier = buffer_barrier(vk::Buffer::null(), &BarrierScope::TRANSFER_TO_VERTEX_READ);
        assert_eq!(barrier.offset, 0);
        assert_eq!(barrier.size, vk::WHOLE_SIZE);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::VERTEX_ATTRIBUTE_READ);
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }

    #[test]
    fn test_image_barrier_keeps_range_and_layouts() {
        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 7,
            base_array_layer: 0,
            layer_count: 1,
        };
        let barrier = image_barrier(
            vk::Image::null(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            range,
            &BarrierScope::TRANSFER_TO_SHADER_READ,
        );
        assert_eq!(barrier.subresource_range.level_count, 7);
        assert_eq!(barrier.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_uniform_scopes_are_mirror_images() {
        let before = BarrierScope::UNIFORM_READ_TO_TRANSFER;
        let after = BarrierScope::TRANSFER_TO_UNIFORM_READ;
        assert_eq!(before.src_stage, after.dst_stage);
        assert_eq!(before.src_access, after.dst_access);
        assert_eq!(before.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert!(after.dst_stage.contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
    }
}
