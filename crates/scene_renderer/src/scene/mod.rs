//! Scene data
//!
//! The CPU-side [`Scene`] is what the importer produces: meshes as parallel
//! per-vertex arrays, materials referring to textures by slot, and a texture
//! table aligned with the material list. [`GpuScene`] is the same scene once
//! uploaded.
//!
//! ## Invariants
//!
//! - every per-vertex array of a mesh has `positions.len()` elements
//! - `indices.len()` is a multiple of three and every index is in range
//! - material ids refer to existing materials
//! - the texture table has one entry per material in every slot

pub mod gpu_scene;
pub mod tangents;

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::assets::{AssetError, AssetResult};

pub use gpu_scene::{GpuMesh, GpuScene};

/// Texture slots of a material, in descriptor binding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    /// Base colour
    Diffuse,
    /// Specular intensity
    Specular,
    /// Tangent-space normal map
    Normal,
    /// Emitted light
    Emissive,
}

impl TextureSlot {
    /// Every slot, in binding order
    pub const ALL: [Self; 4] = [Self::Diffuse, Self::Specular, Self::Normal, Self::Emissive];

    /// Position in [`Self::ALL`] and binding in the texture descriptor set
    pub fn binding(self) -> u32 {
        self as u32
    }

    /// Colour of the 1x1 texture used when a material has no texture in this slot
    pub fn placeholder_rgba(self) -> [u8; 4] {
        match self {
            Self::Diffuse | Self::Specular => [255, 255, 255, 255],
            Self::Normal => [128, 128, 255, 255],
            Self::Emissive => [0, 0, 0, 255],
        }
    }

    /// Whether texels hold colour that should be decoded from sRGB
    pub fn is_color(self) -> bool {
        matches!(self, Self::Diffuse | Self::Emissive)
    }
}

/// One mesh as parallel vertex arrays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneMesh {
    /// Name from the source file
    pub name: String,
    /// Object-space positions
    pub positions: Vec<[f32; 3]>,
    /// Texture coordinates, origin bottom left
    pub uvs: Vec<[f32; 2]>,
    /// Unit normals
    pub normals: Vec<[f32; 3]>,
    /// Unit tangents, w is the bitangent sign
    pub tangents: Vec<[f32; 4]>,
    /// Material of each vertex
    pub material_ids: Vec<u32>,
    /// Triangle list
    pub indices: Vec<u32>,
    /// First material the mesh uses
    pub material_index: u32,
}

impl SceneMesh {
    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of indices
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Distinct materials used by the mesh
    pub fn referenced_materials(&self) -> BTreeSet<u32> {
        let mut materials: BTreeSet<u32> = self.material_ids.iter().copied().collect();
        materials.insert(self.material_index);
        materials
    }

    fn validate(&self, material_count: usize) -> Result<(), String> {
        let vertices = self.vertex_count();
        if vertices == 0 || self.indices.is_empty() {
            return Err("mesh has no geometry".to_string());
        }

        let streams = [
            ("uvs", self.uvs.len()),
            ("normals", self.normals.len()),
            ("tangents", self.tangents.len()),
            ("material ids", self.material_ids.len()),
        ];
        if let Some((stream, len)) = streams.iter().find(|(_, len)| *len != vertices) {
            return Err(format!("{} {} for {} vertices", len, stream, vertices));
        }

        if self.indices.len() % 3 != 0 {
            return Err(format!("{} indices is not a triangle list", self.indices.len()));
        }
        if let Some(index) = self.indices.iter().find(|&&i| i as usize >= vertices) {
            return Err(format!("index {} out of range for {} vertices", index, vertices));
        }
        if let Some(material) = self.referenced_materials().iter().find(|&&m| m as usize >= material_count) {
            return Err(format!("material {} out of range for {} materials", material, material_count));
        }
        Ok(())
    }
}

/// A material as texture references into the per-slot file lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneMaterial {
    /// Name from the material library
    pub name: String,
    /// Index into [`TextureTable::files`] for each slot, in [`TextureSlot::ALL`] order
    pub textures: [Option<u32>; 4],
    /// Rendered with the alpha-tested pipeline
    pub alpha_mapped: bool,
}

impl SceneMaterial {
    /// Texture file index for one slot
    pub fn texture(&self, slot: TextureSlot) -> Option<u32> {
        self.textures[slot.binding() as usize]
    }
}

/// Where one texture array element comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSource {
    /// Load this file
    File(PathBuf),
    /// Use the slot's placeholder
    Empty,
}

/// Texture files per slot plus one entry per material per slot
///
/// Files are deduplicated by path within a slot; the entry lists repeat a
/// path for every material that uses it so array indices match material ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureTable {
    files: [Vec<PathBuf>; 4],
    entries: [Vec<TextureSource>; 4],
}

impl TextureTable {
    /// Append the next material's textures, returning per-slot file indices
    pub fn push_material(&mut self, textures: [Option<PathBuf>; 4]) -> [Option<u32>; 4] {
        let mut ids = [None; 4];
        for (slot, texture) in textures.into_iter().enumerate() {
            let entry = match texture {
                Some(path) => {
                    let files = &mut self.files[slot];
                    let id = match files.iter().position(|p| *p == path) {
                        Some(existing) => existing,
                        None => {
                            files.push(path.clone());
                            files.len() - 1
                        }
                    };
                    ids[slot] = Some(id as u32);
                    TextureSource::File(path)
                }
                None => TextureSource::Empty,
            };
            self.entries[slot].push(entry);
        }
        ids
    }

    /// Unique files of a slot
    pub fn files(&self, slot: TextureSlot) -> &[PathBuf] {
        &self.files[slot.binding() as usize]
    }

    /// Per-material entries of a slot
    pub fn entries(&self, slot: TextureSlot) -> &[TextureSource] {
        &self.entries[slot.binding() as usize]
    }

    /// Entries per slot, which is the material count
    pub fn len(&self) -> usize {
        self.entries[0].len()
    }

    /// No materials recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mesh indices split by pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawLists {
    /// Meshes drawn with the opaque pipeline
    pub opaque: Vec<usize>,
    /// Meshes drawn with the alpha-tested pipeline
    pub alpha_tested: Vec<usize>,
}

/// An imported scene
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    /// Geometry
    pub meshes: Vec<SceneMesh>,
    /// Materials, indexed by material id
    pub materials: Vec<SceneMaterial>,
    /// Texture files and per-material entries
    pub textures: TextureTable,
}

impl Scene {
    /// Check every mesh and the texture table against the scene invariants
    pub fn validate(&self) -> AssetResult<()> {
        for (index, mesh) in self.meshes.iter().enumerate() {
            mesh.validate(self.materials.len()).map_err(|reason| AssetError::InvalidMesh {
                mesh: format!("{} ({})", index, mesh.name),
                reason,
            })?;
        }

        if self.textures.len() != self.materials.len() {
            return Err(AssetError::InvalidMesh {
                mesh: "texture table".to_string(),
                reason: format!(
                    "{} entries for {} materials",
                    self.textures.len(),
                    self.materials.len()
                ),
            });
        }
        Ok(())
    }

    /// Split meshes into opaque and alpha-tested draw lists
    ///
    /// A mesh is alpha-tested when any material it references is alpha-mapped.
    pub fn classify(&self) -> DrawLists {
        let mut lists = DrawLists::default();
        for (index, mesh) in self.meshes.iter().enumerate() {
            let alpha = mesh
                .referenced_materials()
                .iter()
                .any(|&m| self.materials.get(m as usize).is_some_and(|mat| mat.alpha_mapped));
            if alpha {
                lists.alpha_tested.push(index);
            } else {
                lists.opaque.push(index);
            }
        }
        lists
    }

    /// Total vertices over all meshes
    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(SceneMesh::vertex_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(material: u32) -> SceneMesh {
        SceneMesh {
            name: "tri".to_string(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            uvs: vec![[0.0, 0.0]; 3],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            tangents: vec![[1.0, 0.0, 0.0, 1.0]; 3],
            material_ids: vec![material; 3],
            indices: vec![0, 1, 2],
            material_index: material,
        }
    }

    fn material(name: &str, alpha_mapped: bool) -> SceneMaterial {
        SceneMaterial {
            name: name.to_string(),
            textures: [None; 4],
            alpha_mapped,
        }
    }

    fn scene(meshes: Vec<SceneMesh>, materials: Vec<SceneMaterial>) -> Scene {
        let mut textures = TextureTable::default();
        for _ in &materials {
            textures.push_material(Default::default());
        }
        Scene {
            meshes,
            materials,
            textures,
        }
    }

    #[test]
    fn test_valid_scene_passes() {
        let scene = scene(vec![triangle(0)], vec![material("m", false)]);
        assert!(scene.validate().is_ok());
        assert_eq!(scene.vertex_count(), 3);
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let mut mesh = triangle(0);
        mesh.indices[2] = 3;
        let scene = scene(vec![mesh], vec![material("m", false)]);
        assert!(matches!(scene.validate(), Err(AssetError::InvalidMesh { .. })));
    }

    #[test]
    fn test_mismatched_stream_is_rejected() {
        let mut mesh = triangle(0);
        mesh.tangents.pop();
        let scene = scene(vec![mesh], vec![material("m", false)]);
        let message = scene.validate().unwrap_err().to_string();
        assert!(message.contains("tangents"), "{}", message);
    }

    #[test]
    fn test_unknown_material_is_rejected() {
        let scene = scene(vec![triangle(1)], vec![material("m", false)]);
        assert!(scene.validate().is_err());
    }

    #[test]
    fn test_alpha_mapped_material_goes_to_alpha_list_only() {
        let mut mixed = triangle(0);
        mixed.material_ids[2] = 1;
        let scene = scene(
            vec![triangle(0), triangle(1), mixed],
            vec![material("opaque", false), material("leaves", true)],
        );

        let lists = scene.classify();
        assert_eq!(lists.opaque, vec![0]);
        assert_eq!(lists.alpha_tested, vec![1, 2]);
    }

    #[test]
    fn test_texture_table_dedupes_files_per_slot() {
        let mut table = TextureTable::default();
        let brick = PathBuf::from("brick.dds");
        let first = table.push_material([Some(brick.clone()), None, None, None]);
        let second = table.push_material([Some(brick.clone()), Some(brick.clone()), None, None]);

        assert_eq!(first[0], Some(0));
        assert_eq!(second[0], Some(0));
        assert_eq!(second[1], Some(0));
        assert_eq!(table.files(TextureSlot::Diffuse).len(), 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.entries(TextureSlot::Diffuse)[1], TextureSource::File(brick));
        assert_eq!(table.entries(TextureSlot::Normal)[0], TextureSource::Empty);
    }

    #[test]
    fn test_slot_placeholders() {
        let bindings: Vec<u32> = TextureSlot::ALL.iter().map(|s| s.binding()).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3]);
        assert_eq!(TextureSlot::Normal.placeholder_rgba(), [128, 128, 255, 255]);
        assert_eq!(TextureSlot::Emissive.placeholder_rgba()[..3], [0, 0, 0]);
        assert!(TextureSlot::Diffuse.is_color());
        assert!(!TextureSlot::Normal.is_color());
    }
}
