//! Scene renderer
//!
//! [`SceneRenderer`] owns every GPU object the viewer needs and implements
//! [`FrameBackend`], so [`FrameLoop`](crate::render::vulkan::frame::FrameLoop)
//! drives it one frame at a time.
//!
//! ## Frame
//!
//! 1. acquire an image, signaling the image-acquired semaphore
//! 2. wait on that image's fence and reset it
//! 3. record: refresh the uniform buffer in place, then draw opaque meshes
//!    followed by alpha-tested meshes in one render pass
//! 4. submit, waiting at colour output and signaling render-finished
//! 5. present once render-finished signals
//!
//! ## Resize
//!
//! Recreating the swapchain returns [`SwapchainChanges`]; only the objects
//! it names are rebuilt, plus the framebuffers and the synchronization set.
//!
//! ## Teardown
//!
//! Fields are declared in reverse dependency order, so the default drop
//! order tears down synchronization and pipelines first and the context
//! last. `Drop` waits for the device to go idle before any of that.

use std::path::PathBuf;
use std::rc::Rc;

use ash::vk;

use crate::config::RendererConfig;
use crate::foundation::math::Vec3;
use crate::render::primitives::Camera;
use crate::render::vulkan::allocator::MemoryAllocator;
use crate::render::vulkan::commands::{ActiveRenderPass, CommandRecorder};
use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::descriptor::{Sampler, SceneDescriptors, SceneUniforms, UniformBuffer};
use crate::render::vulkan::frame::FrameBackend;
use crate::render::vulkan::framebuffer::{DepthBuffer, Framebuffer};
use crate::render::vulkan::pipeline::{GraphicsPipeline, ScenePipelines};
use crate::render::vulkan::render_pass::RenderPass;
use crate::render::vulkan::swapchain::{AcquireOutcome, PresentOutcome, Swapchain, SwapchainChanges};
use crate::render::vulkan::sync::FrameSyncSet;
use crate::render::vulkan::upload::StagedUploader;
use crate::render::vulkan::window::Window;
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::render::RendererError;
use crate::scene::{GpuMesh, GpuScene, Scene};

const MAX_ANISOTROPY: f32 = 16.0;

/// Per-frame values that come from configuration rather than the camera
#[derive(Debug, Clone, Copy)]
struct LightingParams {
    light_position: Vec3,
    light_color: Vec3,
    alpha_cutoff: f32,
    clear_color: [f32; 4],
}

/// Renders one imported scene into a window
pub struct SceneRenderer {
    sync: FrameSyncSet,
    pipelines: ScenePipelines,
    framebuffers: Vec<Framebuffer>,
    depth_buffer: DepthBuffer,
    render_pass: RenderPass,
    descriptors: SceneDescriptors,
    uniforms: UniformBuffer,
    scene: GpuScene,
    sampler: Sampler,
    swapchain: Swapchain,
    allocator: Rc<MemoryAllocator>,
    context: VulkanContext,

    framebuffer_size: (u32, u32),
    lighting: LightingParams,
    vertex_shader_path: PathBuf,
    fragment_shader_path: PathBuf,
}

impl SceneRenderer {
    /// Bring up Vulkan for `window` and upload `scene`
    pub fn new(window: &mut Window, config: &RendererConfig, scene: &Scene) -> Result<Self, RendererError> {
        let context = VulkanContext::new(window, &config.window.title, config.enable_validation)?;
        let allocator = MemoryAllocator::new(&context)?;
        let uploader = StagedUploader::new(&context, Rc::clone(&allocator))?;
        let device = context.raw_device().clone();

        let framebuffer_size = window.get_framebuffer_size();
        let swapchain = Swapchain::create(&context, framebuffer_size)?;

        let gpu_scene = GpuScene::upload(&uploader, scene)?;
        log::info!(
            "Uploaded {} meshes and {} images for {} materials",
            gpu_scene.meshes().len(),
            gpu_scene.image_count(),
            gpu_scene.material_count()
        );
        drop(uploader);

        let anisotropy = context.device().anisotropy_enabled.then(|| {
            MAX_ANISOTROPY.min(context.physical_device().properties.limits.max_sampler_anisotropy)
        });
        let sampler = Sampler::new(device.clone(), anisotropy)?;

        let uniforms = UniformBuffer::new(&allocator)?;
        let descriptors = SceneDescriptors::new(&device, gpu_scene.material_count())?;
        descriptors.write(&device, &uniforms, gpu_scene.texture_views(), &sampler)?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format())?;
        let depth_buffer = DepthBuffer::new(&allocator, swapchain.extent())?;
        let framebuffers = Framebuffer::for_swapchain(
            &device,
            render_pass.handle(),
            swapchain.image_views(),
            depth_buffer.image_view(),
            swapchain.extent(),
        )?;

        let vertex_shader_path = PathBuf::from(&config.vertex_shader_path);
        let fragment_shader_path = PathBuf::from(&config.fragment_shader_path);
        let pipelines = ScenePipelines::new(
            &device,
            render_pass.handle(),
            &descriptors.layouts(),
            &vertex_shader_path,
            &fragment_shader_path,
            swapchain.extent(),
        )?;

        let sync = FrameSyncSet::new(&device, context.queue_families().graphics, swapchain.image_count())?;

        log::info!(
            "Renderer ready: {} swapchain images at {}x{}, {} live allocations",
            swapchain.image_count(),
            swapchain.extent().width,
            swapchain.extent().height,
            allocator.live_allocations()
        );
        if gpu_scene.has_translucent_textures() {
            log::debug!("Scene contains translucent textures");
        }

        Ok(Self {
            sync,
            pipelines,
            framebuffers,
            depth_buffer,
            render_pass,
            descriptors,
            uniforms,
            scene: gpu_scene,
            sampler,
            swapchain,
            allocator,
            context,
            framebuffer_size,
            lighting: LightingParams {
                light_position: Vec3::from(config.light.position),
                light_color: Vec3::from(config.light.color),
                alpha_cutoff: config.alpha_cutoff,
                clear_color: config.clear_color,
            },
            vertex_shader_path,
            fragment_shader_path,
        })
    }

    /// Record the window's current framebuffer size for the next recreation
    pub fn set_framebuffer_size(&mut self, size: (u32, u32)) {
        self.framebuffer_size = size;
    }

    /// Refresh the uniform block from the camera; recorded with the next frame
    pub fn update_camera(&mut self, camera: &Camera) {
        self.uniforms.set(SceneUniforms::new(
            &camera.get_view_matrix(),
            &camera.vulkan_projection(),
            camera.position,
            self.lighting.light_position,
            self.lighting.light_color,
            self.lighting.alpha_cutoff,
        ));
    }

    /// Width over height of the swapchain
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.swapchain.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Allocator, for statistics
    pub fn allocator(&self) -> &Rc<MemoryAllocator> {
        &self.allocator
    }

    /// Block until the GPU has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }

    fn rebuild_render_pass(&mut self) -> VulkanResult<()> {
        self.render_pass = RenderPass::new(self.context.raw_device().clone(), self.swapchain.format())?;
        Ok(())
    }

    fn rebuild_pipelines(&mut self) -> VulkanResult<()> {
        self.pipelines = ScenePipelines::new(
            self.context.raw_device(),
            self.render_pass.handle(),
            &self.descriptors.layouts(),
            &self.vertex_shader_path,
            &self.fragment_shader_path,
            self.swapchain.extent(),
        )?;
        Ok(())
    }

    fn rebuild_framebuffers(&mut self) -> VulkanResult<()> {
        self.framebuffers = Framebuffer::for_swapchain(
            self.context.raw_device(),
            self.render_pass.handle(),
            self.swapchain.image_views(),
            self.depth_buffer.image_view(),
            self.swapchain.extent(),
        )?;
        Ok(())
    }

    fn draw_meshes<'m>(
        pass: &mut ActiveRenderPass<'_>,
        pipeline: &GraphicsPipeline,
        meshes: impl Iterator<Item = &'m GpuMesh>,
    ) {
        pass.bind_pipeline(pipeline.handle());
        for mesh in meshes {
            pass.bind_vertex_buffers(&mesh.vertex_buffers());
            pass.bind_index_buffer(mesh.index_buffer());
            pass.draw_indexed(mesh.index_count(), 0);
        }
    }
}

impl FrameBackend for SceneRenderer {
    fn acquire(&mut self) -> VulkanResult<AcquireOutcome> {
        self.swapchain.acquire_next_image(self.sync.image_acquired())
    }

    fn wait_and_reset(&mut self, image_index: u32) -> VulkanResult<()> {
        self.sync.wait_and_reset(image_index as usize)
    }

    fn record(&mut self, image_index: u32) -> VulkanResult<()> {
        let command_buffer = self.sync.command_buffer(image_index as usize)?;
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("no framebuffer for swapchain image {}", image_index),
            })?;

        let mut recorder = CommandRecorder::new(command_buffer, self.context.raw_device().clone());
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        self.uniforms.record_update(&mut recorder);

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.swapchain.extent(),
        };
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.lighting.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];

        {
            let mut pass = recorder.begin_render_pass(
                self.render_pass.handle(),
                framebuffer.handle(),
                render_area,
                &clear_values,
            )?;
            pass.bind_descriptor_sets(self.pipelines.layout(), self.descriptors.sets());
            Self::draw_meshes(&mut pass, self.pipelines.opaque(), self.scene.opaque_meshes());
            Self::draw_meshes(&mut pass, self.pipelines.alpha_tested(), self.scene.alpha_tested_meshes());
        }

        recorder.end()?;
        Ok(())
    }

    fn submit(&mut self, image_index: u32) -> VulkanResult<()> {
        let wait_semaphores = [self.sync.image_acquired()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.sync.command_buffer(image_index as usize)?];
        let signal_semaphores = [self.sync.render_finished()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let fence = self.sync.fence(image_index as usize)?.handle();
        unsafe {
            self.context
                .raw_device()
                .queue_submit(self.context.graphics_queue(), &[submit_info.build()], fence)
        }
        .map_err(VulkanError::from_result)
    }

    fn present(&mut self, image_index: u32) -> VulkanResult<PresentOutcome> {
        self.swapchain
            .present(self.context.present_queue(), image_index, self.sync.render_finished())
    }

    fn recreate_swapchain(&mut self) -> VulkanResult<bool> {
        let (width, height) = self.framebuffer_size;
        if width == 0 || height == 0 {
            return Ok(false);
        }

        // Framebuffers reference the old image views, which recreation destroys
        self.context.wait_idle()?;
        self.framebuffers.clear();
        let changes = self.swapchain.recreate(&self.context, self.framebuffer_size)?;

        if changes.contains(SwapchainChanges::RENDER_PASS) {
            self.rebuild_render_pass()?;
        }
        if changes.contains(SwapchainChanges::DEPTH_BUFFER) {
            self.depth_buffer = DepthBuffer::new(&self.allocator, self.swapchain.extent())?;
        }
        if changes.contains(SwapchainChanges::PIPELINES) {
            self.rebuild_pipelines()?;
        }
        self.rebuild_framebuffers()?;

        // A suboptimal acquire may have left the old semaphore signaled
        self.sync = FrameSyncSet::new(
            self.context.raw_device(),
            self.context.queue_families().graphics,
            self.swapchain.image_count(),
        )?;

        Ok(true)
    }
}

impl Drop for SceneRenderer {
    fn drop(&mut self) {
        log::info!("Shutting down renderer");
        if let Err(e) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle during shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::frame::{FrameLoop, FrameReport};
    use crate::scene::{SceneMaterial, SceneMesh, TextureTable};

    fn single_triangle() -> Scene {
        let mut textures = TextureTable::default();
        textures.push_material(Default::default());
        Scene {
            meshes: vec![SceneMesh {
                name: "tri".to_string(),
                positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                uvs: vec![[0.0, 0.0]; 3],
                normals: vec![[0.0, 0.0, 1.0]; 3],
                tangents: vec![[1.0, 0.0, 0.0, 1.0]; 3],
                material_ids: vec![0; 3],
                indices: vec![0, 1, 2],
                material_index: 0,
            }],
            materials: vec![SceneMaterial {
                name: "plain".to_string(),
                textures: [None; 4],
                alpha_mapped: false,
            }],
            textures,
        }
    }

    #[test]
    #[ignore = "requires a display, a Vulkan device and compiled shaders"]
    fn test_repeated_resizes_rebuild_one_framebuffer_per_image() {
        let config = RendererConfig::default();
        let mut window = Window::new("renderer test", 320, 240).unwrap();
        let mut renderer = SceneRenderer::new(&mut window, &config, &single_triangle()).unwrap();
        let mut frames = FrameLoop::new();

        for size in [(640, 480), (200, 100), (320, 240)] {
            renderer.set_framebuffer_size(size);
            assert!(renderer.recreate_swapchain().unwrap());
            assert_eq!(renderer.framebuffers.len(), renderer.swapchain.image_count());
            assert_eq!(renderer.sync.len(), renderer.swapchain.image_count());

            let report = frames.run_frame(&mut renderer).unwrap();
            assert_ne!(report, FrameReport::Deferred);
        }

        renderer.set_framebuffer_size((0, 0));
        assert!(!renderer.recreate_swapchain().unwrap());
    }
}
