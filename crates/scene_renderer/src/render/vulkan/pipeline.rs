//! Graphics pipelines for opaque and alpha-tested geometry
//!
//! Both variants run the same shader program. The alpha-tested one sets
//! fragment specialization constant 0 (`ALPHA_TEST`) to 1, which makes the
//! shader discard fragments below the cutoff.

use std::ffi::CStr;
use std::path::Path;

use ash::{vk, Device};

use crate::render::vulkan::shader::ShaderModule;
use crate::render::vulkan::vertex_layout::SceneVertexLayout;
use crate::render::vulkan::{VulkanError, VulkanResult};

const ENTRY_POINT: &CStr = c"main";

/// Which of the two pipelines to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineVariant {
    /// No discard
    Opaque,
    /// Discard below the alpha cutoff
    AlphaTested,
}

impl PipelineVariant {
    /// Value of the `ALPHA_TEST` specialization constant
    pub fn alpha_test_constant(self) -> u32 {
        match self {
            Self::Opaque => 0,
            Self::AlphaTested => 1,
        }
    }
}

/// Viewport covering `extent` with the full depth range
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Pipeline layout with RAII cleanup
pub struct PipelineLayout {
    device: Device,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Layout over the given descriptor set layouts, no push constants
    pub fn new(device: Device, set_layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { device, layout })
    }

    /// Layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.destroy_pipeline_layout(self.layout, None) };
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    variant: PipelineVariant,
}

impl GraphicsPipeline {
    /// Build one variant with viewport and scissor baked to `extent`
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        layout: &PipelineLayout,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
        extent: vk::Extent2D,
        variant: PipelineVariant,
    ) -> VulkanResult<Self> {
        let constant = variant.alpha_test_constant().to_ne_bytes();
        let map_entries = [vk::SpecializationMapEntry {
            constant_id: 0,
            offset: 0,
            size: constant.len(),
        }];
        let specialization = vk::SpecializationInfo::builder()
            .map_entries(&map_entries)
            .data(&constant);

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_shader.handle())
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_shader.handle())
                .name(ENTRY_POINT)
                .specialization_info(&specialization)
                .build(),
        ];

        let bindings = SceneVertexLayout::binding_descriptions();
        let attributes = SceneVertexLayout::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [full_viewport(extent)];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .layout(layout.handle())
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        }
        .map_err(|(_, err)| VulkanError::Api(err))?;

        let pipeline = pipelines.into_iter().next().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "driver returned no pipeline".to_string(),
        })?;

        log::debug!("{:?} pipeline created for {}x{}", variant, extent.width, extent.height);
        Ok(Self {
            device,
            pipeline,
            variant,
        })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Which variant this is
    pub fn variant(&self) -> PipelineVariant {
        self.variant
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe { self.device.destroy_pipeline(self.pipeline, None) };
    }
}

/// The opaque and alpha-tested pipelines sharing one layout
///
/// Field order is drop order: pipelines before the layout.
pub struct ScenePipelines {
    opaque: GraphicsPipeline,
    alpha_tested: GraphicsPipeline,
    layout: PipelineLayout,
}

impl ScenePipelines {
    /// Load both shaders and build both variants
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        set_layouts: &[vk::DescriptorSetLayout],
        vertex_shader_path: &Path,
        fragment_shader_path: &Path,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let vertex_shader = ShaderModule::from_file(device.clone(), vertex_shader_path)?;
        let fragment_shader = ShaderModule::from_file(device.clone(), fragment_shader_path)?;
        let layout = PipelineLayout::new(device.clone(), set_layouts)?;

        let build = |variant| {
            GraphicsPipeline::new(
                device.clone(),
                render_pass,
                &layout,
                &vertex_shader,
                &fragment_shader,
                extent,
                variant,
            )
        };
        let opaque = build(PipelineVariant::Opaque)?;
        let alpha_tested = build(PipelineVariant::AlphaTested)?;

        Ok(Self {
            opaque,
            alpha_tested,
            layout,
        })
    }

    /// Pipeline for meshes without alpha-mapped materials
    pub fn opaque(&self) -> &GraphicsPipeline {
        &self.opaque
    }

    /// Pipeline for meshes with alpha-mapped materials
    pub fn alpha_tested(&self) -> &GraphicsPipeline {
        &self.alpha_tested
    }

    /// Shared layout
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_constant_per_variant() {
        assert_eq!(PipelineVariant::Opaque.alpha_test_constant(), 0);
        assert_eq!(PipelineVariant::AlphaTested.alpha_test_constant(), 1);
    }

    #[test]
    fn test_viewport_covers_extent() {
        let viewport = full_viewport(vk::Extent2D { width: 1280, height: 720 });
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);
    }
}
