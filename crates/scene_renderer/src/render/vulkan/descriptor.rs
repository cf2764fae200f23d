//! Descriptor sets, the uniform buffer and the texture sampler
//!
//! Set 0 holds the scene uniform buffer. Set 1 holds four runtime-sized
//! arrays of combined image samplers (diffuse, specular, normal, emissive),
//! one element per material, indexed in the fragment shader with the
//! per-vertex material id.

use std::rc::Rc;

use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Vec3};
use crate::render::vulkan::allocator::{MemoryAllocator, MemoryIntent};
use crate::render::vulkan::barriers::BarrierScope;
use crate::render::vulkan::commands::CommandRecorder;
use crate::render::vulkan::resources::BufferSet;
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::scene::TextureSlot;

/// Binding of the uniform buffer in set 0
pub const UNIFORM_BINDING: u32 = 0;

/// Uniform block shared by both shader stages
///
/// Layout matches `SceneUniforms` in `scene.vert` / `scene.frag` (std140).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneUniforms {
    /// World to view
    pub view: [[f32; 4]; 4],
    /// View to clip, including the Vulkan axis flip
    pub projection: [[f32; 4]; 4],
    /// Camera position, w unused
    pub camera_position: [f32; 4],
    /// Point light position, w unused
    pub light_position: [f32; 4],
    /// Point light colour, w is intensity
    pub light_color: [f32; 4],
    /// x is the alpha cutoff; the rest is padding
    pub params: [f32; 4],
}

impl SceneUniforms {
    /// Pack the frame's camera and light state
    pub fn new(view: &Mat4, projection: &Mat4, camera_position: Vec3, light_position: Vec3, light_color: Vec3, alpha_cutoff: f32) -> Self {
        Self {
            view: to_columns(view),
            projection: to_columns(projection),
            camera_position: [camera_position.x, camera_position.y, camera_position.z, 1.0],
            light_position: [light_position.x, light_position.y, light_position.z, 1.0],
            light_color: [light_color.x, light_color.y, light_color.z, 1.0],
            params: [alpha_cutoff, 0.0, 0.0, 0.0],
        }
    }
}

impl Default for SceneUniforms {
    fn default() -> Self {
        let identity = Mat4::identity();
        Self::new(&identity, &identity, Vec3::zeros(), Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0), 0.5)
    }
}

fn to_columns(matrix: &Mat4) -> [[f32; 4]; 4] {
    let mut columns = [[0.0; 4]; 4];
    for (c, column) in columns.iter_mut().enumerate() {
        for (r, value) in column.iter_mut().enumerate() {
            *value = matrix[(r, c)];
        }
    }
    columns
}

/// Device-local uniform buffer refreshed in-line every frame
pub struct UniformBuffer {
    buffer: BufferSet,
    contents: SceneUniforms,
}

impl UniformBuffer {
    /// Allocate the buffer; it is written by `cmd_update_buffer`, never mapped
    pub fn new(allocator: &Rc<MemoryAllocator>) -> VulkanResult<Self> {
        let size = std::mem::size_of::<SceneUniforms>() as vk::DeviceSize;
        let buffer = allocator.create_buffer(
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryIntent::DeviceOnly,
        )?;
        Ok(Self {
            buffer,
            contents: SceneUniforms::default(),
        })
    }

    /// Replace the contents uploaded by the next `record_update`
    pub fn set(&mut self, contents: SceneUniforms) {
        self.contents = contents;
    }

    /// Contents as of the last `set`
    pub fn contents(&self) -> &SceneUniforms {
        &self.contents
    }

    /// Record the in-place refresh: barrier, inline update, barrier
    ///
    /// Must be recorded outside a render pass.
    pub fn record_update(&self, recorder: &mut CommandRecorder) {
        let handle = self.buffer.handle();
        recorder.buffer_barrier(handle, &BarrierScope::UNIFORM_READ_TO_TRANSFER);
        recorder.update_buffer(handle, bytemuck::bytes_of(&self.contents));
        recorder.buffer_barrier(handle, &BarrierScope::TRANSFER_TO_UNIFORM_READ);
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

/// Builds a descriptor set layout binding by binding
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
    binding_flags: Vec<vk::DescriptorBindingFlags>,
}

impl DescriptorSetLayoutBuilder {
    /// Start an empty layout
    pub fn new() -> Self {
        Self::default()
    }

    /// One uniform buffer
    pub fn add_uniform_buffer(mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self.binding_flags.push(vk::DescriptorBindingFlags::empty());
        self
    }

    /// An array of combined image samplers that may be partially written
    pub fn add_sampler_array(mut self, binding: u32, count: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(count)
                .stage_flags(stage_flags)
                .build(),
        );
        self.binding_flags.push(vk::DescriptorBindingFlags::PARTIALLY_BOUND);
        self
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Create the layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder().binding_flags(&self.binding_flags);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(&self.bindings)
            .push_next(&mut flags_info);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
        })
    }
}

/// Descriptor set layout with RAII cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
}

impl DescriptorSetLayout {
    /// Layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_set_layout(self.layout, None) };
    }
}

/// Pool sizes for one uniform set plus one texture set of `texture_count` materials
pub fn scene_pool_sizes(texture_count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: texture_count * TextureSlot::ALL.len() as u32,
        },
    ]
}

/// Descriptor pool with RAII cleanup
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Create a pool for `max_sets` sets drawn from `sizes`
    pub fn new(device: Device, max_sets: u32, sizes: &[vk::DescriptorPoolSize]) -> VulkanResult<Self> {
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { pool, device })
    }

    /// Allocate one set per layout
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
    }
}

enum PendingWrite {
    Buffer {
        set: vk::DescriptorSet,
        binding: u32,
        info: vk::DescriptorBufferInfo,
    },
    Images {
        set: vk::DescriptorSet,
        binding: u32,
        infos: Vec<vk::DescriptorImageInfo>,
    },
}

/// Collects descriptor writes and applies them in one call
///
/// The info structs are owned here until `update`, so the pointers inside
/// the write structs stay valid.
#[derive(Default)]
pub struct DescriptorSetWriter {
    pending: Vec<PendingWrite>,
}

impl DescriptorSetWriter {
    /// Start with no writes
    pub fn new() -> Self {
        Self::default()
    }

    /// Point a uniform buffer binding at the whole of `buffer`
    pub fn write_uniform_buffer(mut self, set: vk::DescriptorSet, binding: u32, buffer: vk::Buffer, range: vk::DeviceSize) -> Self {
        self.pending.push(PendingWrite::Buffer {
            set,
            binding,
            info: vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range,
            },
        });
        self
    }

    /// Fill a sampler array from element 0, one view per element
    pub fn write_image_array(
        mut self,
        set: vk::DescriptorSet,
        binding: u32,
        views: &[vk::ImageView],
        sampler: vk::Sampler,
    ) -> Self {
        if views.is_empty() {
            return self;
        }
        let infos = views
            .iter()
            .map(|&image_view| vk::DescriptorImageInfo {
                sampler,
                image_view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            })
            .collect();
        self.pending.push(PendingWrite::Images { set, binding, infos });
        self
    }

    /// Number of writes collected
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing has been collected
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply every collected write
    pub fn update(self, device: &Device) {
        let writes: Vec<vk::WriteDescriptorSet> = self
            .pending
            .iter()
            .map(|pending| match pending {
                PendingWrite::Buffer { set, binding, info } => vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
                    .build(),
                PendingWrite::Images { set, binding, infos } => vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(infos)
                    .build(),
            })
            .collect();

        unsafe { device.update_descriptor_sets(&writes, &[]) };
    }
}

/// Texture sampler with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear filtering, repeat addressing, every mip level reachable
    ///
    /// `max_anisotropy` of `None` leaves anisotropic filtering off.
    pub fn new(device: Device, max_anisotropy: Option<f32>) -> VulkanResult<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(max_anisotropy.is_some())
            .max_anisotropy(max_anisotropy.unwrap_or(1.0))
            .compare_enable(false)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);

        let sampler = unsafe { device.create_sampler(&create_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { device, sampler })
    }

    /// Sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.destroy_sampler(self.sampler, None) };
    }
}

/// Layouts, pool and the two allocated sets
///
/// Field order is drop order: the pool goes before the layouts.
pub struct SceneDescriptors {
    sets: [vk::DescriptorSet; 2],
    pool: DescriptorPool,
    texture_layout: DescriptorSetLayout,
    uniform_layout: DescriptorSetLayout,
    texture_count: u32,
}

impl SceneDescriptors {
    /// Create both layouts and allocate one set of each
    ///
    /// Each texture array holds `texture_count` elements (at least one).
    pub fn new(device: &Device, texture_count: u32) -> VulkanResult<Self> {
        let texture_count = texture_count.max(1);
        let uniform_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(UNIFORM_BINDING, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .build(device)?;

        let texture_layout = TextureSlot::ALL
            .iter()
            .fold(DescriptorSetLayoutBuilder::new(), |builder, slot| {
                builder.add_sampler_array(slot.binding(), texture_count, vk::ShaderStageFlags::FRAGMENT)
            })
            .build(device)?;

        let pool = DescriptorPool::new(device.clone(), 2, &scene_pool_sizes(texture_count))?;
        let allocated = pool.allocate(&[uniform_layout.handle(), texture_layout.handle()])?;
        let sets: [vk::DescriptorSet; 2] = allocated.try_into().map_err(|got: Vec<_>| VulkanError::InvalidOperation {
            reason: format!("expected 2 descriptor sets, driver returned {}", got.len()),
        })?;

        log::debug!("Descriptor sets allocated for {} materials", texture_count);

        Ok(Self {
            sets,
            pool,
            texture_layout,
            uniform_layout,
            texture_count,
        })
    }

    /// Write the uniform buffer and every texture array
    ///
    /// `textures[slot]` holds one view per material for that slot.
    pub fn write(&self, device: &Device, uniforms: &UniformBuffer, textures: &[Vec<vk::ImageView>; 4], sampler: &Sampler) -> VulkanResult<()> {
        if textures.iter().any(|views| views.len() > self.texture_count as usize) {
            return Err(VulkanError::InvalidOperation {
                reason: format!("more textures than the {} descriptor slots", self.texture_count),
            });
        }

        let writer = DescriptorSetWriter::new().write_uniform_buffer(
            self.sets[0],
            UNIFORM_BINDING,
            uniforms.handle(),
            uniforms.size(),
        );
        let writer = TextureSlot::ALL.iter().fold(writer, |writer, &slot| {
            writer.write_image_array(self.sets[1], slot.binding(), &textures[slot as usize], sampler.handle())
        });
        writer.update(device);
        Ok(())
    }

    /// Layouts in set order, for the pipeline layout
    pub fn layouts(&self) -> [vk::DescriptorSetLayout; 2] {
        [self.uniform_layout.handle(), self.texture_layout.handle()]
    }

    /// Sets in set order
    pub fn sets(&self) -> &[vk::DescriptorSet; 2] {
        &self.sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_block_is_std140_sized() {
        // Two mat4 plus four vec4
        assert_eq!(std::mem::size_of::<SceneUniforms>(), 192);
        assert_eq!(std::mem::size_of::<SceneUniforms>() % 16, 0);
    }

    #[test]
    fn test_uniform_matrices_are_column_major() {
        let mut view = Mat4::identity();
        view[(0, 3)] = 5.0;
        let uniforms = SceneUniforms::new(
            &view,
            &Mat4::identity(),
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::zeros(),
            Vec3::new(1.0, 1.0, 1.0),
            0.25,
        );
        // Translation lives in the fourth column
        assert_relative_eq!(uniforms.view[3][0], 5.0);
        assert_relative_eq!(uniforms.view[0][3], 0.0);
        assert_relative_eq!(uniforms.params[0], 0.25);
        assert_eq!(uniforms.camera_position, [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_sampler_arrays_are_partially_bound() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .add_sampler_array(1, 12, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(builder.bindings()[1].descriptor_count, 12);
        assert_eq!(builder.binding_flags[0], vk::DescriptorBindingFlags::empty());
        assert_eq!(builder.binding_flags[1], vk::DescriptorBindingFlags::PARTIALLY_BOUND);
    }

    #[test]
    fn test_pool_sizes_cover_all_slots() {
        let sizes = scene_pool_sizes(7);
        assert_eq!(sizes[0].descriptor_count, 1);
        assert_eq!(sizes[1].descriptor_count, 28);
    }

    #[test]
    fn test_writer_skips_empty_arrays() {
        let writer = DescriptorSetWriter::new()
            .write_uniform_buffer(vk::DescriptorSet::null(), 0, vk::Buffer::null(), 192)
            .write_image_array(vk::DescriptorSet::null(), 1, &[], vk::Sampler::null());
        assert_eq!(writer.len(), 1);
    }
}
