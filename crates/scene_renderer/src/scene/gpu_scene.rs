//! Uploaded scene: mesh buffers, texture images and draw lists

use ash::vk;

use crate::assets::load_texture;
use crate::render::vulkan::resources::{BufferSet, ImageSet};
use crate::render::vulkan::upload::StagedUploader;
use crate::render::RendererError;
use crate::scene::{DrawLists, Scene, SceneMesh, TextureSlot};

/// Device buffers of one mesh
///
/// Every vertex buffer holds `vertex_count` elements; the index buffer holds
/// `index_count`.
pub struct GpuMesh {
    positions: BufferSet,
    uvs: BufferSet,
    normals: BufferSet,
    tangents: BufferSet,
    material_ids: BufferSet,
    indices: BufferSet,
    vertex_count: u32,
    index_count: u32,
}

impl GpuMesh {
    /// Upload every stream of `mesh` through the staging path
    pub fn upload(uploader: &StagedUploader, mesh: &SceneMesh) -> Result<Self, RendererError> {
        let vertex = vk::BufferUsageFlags::VERTEX_BUFFER;
        Ok(Self {
            positions: uploader.upload_buffer(&mesh.positions, vertex)?,
            uvs: uploader.upload_buffer(&mesh.uvs, vertex)?,
            normals: uploader.upload_buffer(&mesh.normals, vertex)?,
            tangents: uploader.upload_buffer(&mesh.tangents, vertex)?,
            material_ids: uploader.upload_buffer(&mesh.material_ids, vertex)?,
            indices: uploader.upload_buffer(&mesh.indices, vk::BufferUsageFlags::INDEX_BUFFER)?,
            vertex_count: mesh.vertex_count() as u32,
            index_count: mesh.index_count() as u32,
        })
    }

    /// Vertex buffers in binding order
    pub fn vertex_buffers(&self) -> [vk::Buffer; 5] {
        [
            self.positions.handle(),
            self.uvs.handle(),
            self.normals.handle(),
            self.tangents.handle(),
            self.material_ids.handle(),
        ]
    }

    /// Index buffer (u32)
    pub fn index_buffer(&self) -> vk::Buffer {
        self.indices.handle()
    }

    /// Vertices per stream
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Indices to draw
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Textures of one slot: one image per unique file plus the placeholder
struct SlotTextures {
    files: Vec<ImageSet>,
    placeholder: ImageSet,
}

/// A scene resident on the GPU
pub struct GpuScene {
    meshes: Vec<GpuMesh>,
    draw_lists: DrawLists,
    textures: Vec<SlotTextures>,
    views: [Vec<vk::ImageView>; 4],
}

impl GpuScene {
    /// Validate, classify and upload a scene
    ///
    /// Every texture file is loaded once per slot. Material entries without a
    /// texture point at the slot's 1x1 placeholder so array indices stay
    /// aligned with material ids.
    pub fn upload(uploader: &StagedUploader, scene: &Scene) -> Result<Self, RendererError> {
        scene.validate()?;
        let draw_lists = scene.classify();

        let meshes = scene
            .meshes
            .iter()
            .map(|mesh| GpuMesh::upload(uploader, mesh))
            .collect::<Result<Vec<_>, _>>()?;

        let mut textures = Vec::with_capacity(TextureSlot::ALL.len());
        let mut views: [Vec<vk::ImageView>; 4] = Default::default();
        for slot in TextureSlot::ALL {
            let files = scene
                .textures
                .files(slot)
                .iter()
                .map(|path| {
                    let texture = load_texture(path, slot.is_color())?;
                    Ok(uploader.upload_image(&texture)?)
                })
                .collect::<Result<Vec<_>, RendererError>>()?;
            let placeholder = uploader.create_placeholder(slot.placeholder_rgba())?;

            views[slot.binding() as usize] = scene
                .materials
                .iter()
                .map(|material| match material.texture(slot) {
                    Some(id) => files.get(id as usize).map_or(placeholder.view(), ImageSet::view),
                    None => placeholder.view(),
                })
                .collect();

            textures.push(SlotTextures { files, placeholder });
        }

        log::info!(
            "Scene uploaded: {} meshes ({} opaque, {} alpha-tested), {} materials, {} texture files",
            meshes.len(),
            draw_lists.opaque.len(),
            draw_lists.alpha_tested.len(),
            scene.materials.len(),
            textures.iter().map(|t| t.files.len()).sum::<usize>()
        );

        Ok(Self {
            meshes,
            draw_lists,
            textures,
            views,
        })
    }

    /// Meshes in import order
    pub fn meshes(&self) -> &[GpuMesh] {
        &self.meshes
    }

    /// Meshes for the opaque pipeline
    pub fn opaque_meshes(&self) -> impl Iterator<Item = &GpuMesh> {
        self.draw_lists.opaque.iter().filter_map(|&i| self.meshes.get(i))
    }

    /// Meshes for the alpha-tested pipeline
    pub fn alpha_tested_meshes(&self) -> impl Iterator<Item = &GpuMesh> {
        self.draw_lists.alpha_tested.iter().filter_map(|&i| self.meshes.get(i))
    }

    /// Per-material image views for each slot, ready for the descriptor write
    pub fn texture_views(&self) -> &[Vec<vk::ImageView>; 4] {
        &self.views
    }

    /// Array length of every texture binding
    pub fn material_count(&self) -> u32 {
        self.views[0].len() as u32
    }

    /// Images uploaded, placeholders included
    pub fn image_count(&self) -> usize {
        self.textures.iter().map(|t| t.files.len() + 1).sum()
    }

    /// Whether any uploaded texture has translucent texels
    pub fn has_translucent_textures(&self) -> bool {
        self.textures
            .iter()
            .flat_map(|t| t.files.iter().chain(std::iter::once(&t.placeholder)))
            .any(ImageSet::requires_alpha_blending)
    }
}
