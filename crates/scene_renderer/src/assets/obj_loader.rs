//! OBJ/MTL scene importer
//!
//! Wavefront files are parsed with `tobj` (triangulated, one index per
//! vertex) and turned into a [`Scene`]: materials are deduplicated by name,
//! texture paths per slot, and every mesh gets normals and tangents.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::assets::{texture_has_alpha, AssetError, AssetResult};
use crate::scene::tangents::{compute_normals, compute_tangents};
use crate::scene::{Scene, SceneMaterial, SceneMesh, TextureSlot, TextureTable};

const DEFAULT_MATERIAL: &str = "default";

/// Loads Wavefront OBJ scenes
pub struct ObjLoader;

impl ObjLoader {
    /// Load an OBJ file and the material libraries it references
    pub fn load_scene<P: AsRef<Path>>(path: P) -> AssetResult<Scene> {
        let path = path.as_ref();
        let options = tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        };
        let (models, materials) = tobj::load_obj(path, &options).map_err(|source| AssetError::Obj {
            path: path.to_path_buf(),
            source,
        })?;

        let materials = materials.unwrap_or_else(|e| {
            log::warn!("No usable material library for {:?}: {}", path, e);
            Vec::new()
        });
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut builder = SceneBuilder::new(base_dir, &materials);
        for model in &models {
            builder.add_model(model)?;
        }
        let scene = builder.finish();
        scene.validate()?;

        log::info!(
            "Imported {:?}: {} meshes, {} vertices, {} materials",
            path,
            scene.meshes.len(),
            scene.vertex_count(),
            scene.materials.len()
        );
        Ok(scene)
    }
}

/// Accumulates meshes and the materials they actually use
struct SceneBuilder<'a> {
    base_dir: &'a Path,
    source_materials: &'a [tobj::Material],
    by_name: HashMap<String, u32>,
    scene: Scene,
}

impl<'a> SceneBuilder<'a> {
    fn new(base_dir: &'a Path, source_materials: &'a [tobj::Material]) -> Self {
        Self {
            base_dir,
            source_materials,
            by_name: HashMap::new(),
            scene: Scene {
                meshes: Vec::new(),
                materials: Vec::new(),
                textures: TextureTable::default(),
            },
        }
    }

    fn add_model(&mut self, model: &tobj::Model) -> AssetResult<()> {
        let mesh = &model.mesh;
        if mesh.indices.is_empty() {
            log::debug!("Skipping empty model {:?}", model.name);
            return Ok(());
        }

        let positions: Vec<[f32; 3]> = mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect();
        let vertex_count = positions.len();
        let invalid = |reason: String| AssetError::InvalidMesh {
            mesh: model.name.clone(),
            reason,
        };

        let uvs: Vec<[f32; 2]> = if mesh.texcoords.is_empty() {
            vec![[0.0, 0.0]; vertex_count]
        } else {
            mesh.texcoords.chunks_exact(2).map(|t| [t[0], t[1]]).collect()
        };
        let normals: Vec<[f32; 3]> = if mesh.normals.is_empty() {
            log::debug!("Computing normals for {:?}", model.name);
            compute_normals(&positions, &mesh.indices)
        } else {
            mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]).collect()
        };
        if uvs.len() != vertex_count || normals.len() != vertex_count {
            return Err(invalid(format!(
                "{} positions, {} uvs, {} normals",
                vertex_count,
                uvs.len(),
                normals.len()
            )));
        }

        let tangents = compute_tangents(&positions, &uvs, &normals, &mesh.indices);
        let material_index = self.material_for(mesh.material_id);

        self.scene.meshes.push(SceneMesh {
            name: model.name.clone(),
            positions,
            uvs,
            normals,
            tangents,
            material_ids: vec![material_index; vertex_count],
            indices: mesh.indices.clone(),
            material_index,
        });
        Ok(())
    }

    /// Scene material index for a source material, creating it on first use
    fn material_for(&mut self, source: Option<usize>) -> u32 {
        let material = source.and_then(|i| self.source_materials.get(i));
        let name = material.map_or(DEFAULT_MATERIAL, |m| m.name.as_str());
        if let Some(&index) = self.by_name.get(name) {
            return index;
        }

        let paths = material.map_or_else(Default::default, |m| self.texture_paths(m));
        let alpha_mapped = material.is_some_and(|m| m.dissolve_texture.is_some())
            || paths[TextureSlot::Diffuse.binding() as usize]
                .as_deref()
                .is_some_and(probe_alpha);

        let textures = self.scene.textures.push_material(paths);
        let index = self.scene.materials.len() as u32;
        self.scene.materials.push(SceneMaterial {
            name: name.to_string(),
            textures,
            alpha_mapped,
        });
        self.by_name.insert(name.to_string(), index);

        log::debug!("Material {} -> {} (alpha mapped: {})", name, index, alpha_mapped);
        index
    }

    /// Resolved texture path per slot, in binding order
    fn texture_paths(&self, material: &tobj::Material) -> [Option<PathBuf>; 4] {
        let unknown = |key: &str| material.unknown_param.get(key).cloned();
        let sources = [
            material.diffuse_texture.clone(),
            material.specular_texture.clone(),
            material.normal_texture.clone().or_else(|| unknown("norm")),
            unknown("map_Ke"),
        ];
        sources.map(|source| source.as_deref().and_then(|s| resolve_texture(self.base_dir, s)))
    }

    fn finish(self) -> Scene {
        self.scene
    }
}

/// Texture statement value to a path next to the OBJ
///
/// Options such as `-bm 1.0` precede the file name, so the last token wins.
fn resolve_texture(base_dir: &Path, statement: &str) -> Option<PathBuf> {
    let file = statement.split_whitespace().last()?;
    Some(base_dir.join(file.replace('\\', "/")))
}

fn probe_alpha(path: &Path) -> bool {
    texture_has_alpha(path).unwrap_or_else(|e| {
        log::warn!("Could not probe alpha of {:?}: {}", path, e);
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::TextureSource;
    use image::{Rgba, RgbaImage};

    const QUAD_OBJ: &str = "\
mtllib scene.mtl
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
o quad
usemtl MATERIAL
f 1/1 2/2 3/3 4/4
";

    fn scene_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scene_renderer_obj_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_scene(dir: &Path, material: &str, mtl: &str) -> PathBuf {
        let obj = dir.join("scene.obj");
        std::fs::write(&obj, QUAD_OBJ.replace("MATERIAL", material)).unwrap();
        std::fs::write(dir.join("scene.mtl"), mtl).unwrap();
        obj
    }

    fn write_png(path: &Path, alpha: u8) {
        RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, alpha])).save(path).unwrap();
    }

    #[test]
    fn test_diffuse_only_material_leaves_other_slots_empty() {
        let dir = scene_dir("diffuse");
        write_png(&dir.join("wall.png"), 255);
        let obj = write_scene(&dir, "wall", "newmtl wall\nmap_Kd wall.png\n");

        let scene = ObjLoader::load_scene(&obj).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.materials.len(), 1);
        let index = scene.meshes[0].material_index as usize;
        assert_eq!(
            scene.textures.entries(TextureSlot::Diffuse)[index],
            TextureSource::File(dir.join("wall.png"))
        );
        for slot in [TextureSlot::Specular, TextureSlot::Normal, TextureSlot::Emissive] {
            assert_eq!(scene.textures.entries(slot)[index], TextureSource::Empty);
        }
        assert!(!scene.materials[index].alpha_mapped);
        assert_eq!(scene.classify().opaque, vec![0]);
    }

    #[test]
    fn test_translucent_diffuse_marks_mesh_alpha_tested() {
        let dir = scene_dir("alpha");
        write_png(&dir.join("leaf.png"), 0);
        let obj = write_scene(&dir, "leaf", "newmtl leaf\nmap_Kd leaf.png\n");

        let scene = ObjLoader::load_scene(&obj).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert!(scene.materials[0].alpha_mapped);
        let lists = scene.classify();
        assert_eq!(lists.alpha_tested, vec![0]);
        assert!(lists.opaque.is_empty());
    }

    #[test]
    fn test_dissolve_map_and_extra_slots() {
        let dir = scene_dir("slots");
        let mtl = "newmtl glass\nmap_d mask.png\nmap_Ks spec.dds\nnorm normal.dds\nmap_Ke glow.dds\n";
        let obj = write_scene(&dir, "glass", mtl);

        let scene = ObjLoader::load_scene(&obj).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        let material = &scene.materials[0];
        assert!(material.alpha_mapped);
        assert_eq!(material.texture(TextureSlot::Diffuse), None);
        assert_eq!(material.texture(TextureSlot::Specular), Some(0));
        assert_eq!(scene.textures.files(TextureSlot::Normal), &[dir.join("normal.dds")]);
        assert_eq!(scene.textures.files(TextureSlot::Emissive), &[dir.join("glow.dds")]);
    }

    #[test]
    fn test_quad_is_triangulated_with_generated_normals_and_tangents() {
        let dir = scene_dir("geometry");
        let obj = write_scene(&dir, "plain", "newmtl plain\n");

        let scene = ObjLoader::load_scene(&obj).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        let mesh = &scene.meshes[0];
        assert_eq!(mesh.index_count(), 6);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertex_count()));
        assert_eq!(mesh.normals.len(), mesh.vertex_count());
        assert_eq!(mesh.tangents.len(), mesh.vertex_count());
        assert!(mesh.normals.iter().all(|n| (n[2] - 1.0).abs() < 1e-5));
        assert!(mesh.material_ids.iter().all(|&m| m == mesh.material_index));
    }

    #[test]
    fn test_texture_statement_options_are_skipped() {
        let base = Path::new("models");
        assert_eq!(
            resolve_texture(base, "-bm 0.5 textures\\bump.png"),
            Some(PathBuf::from("models/textures/bump.png"))
        );
        assert_eq!(resolve_texture(base, "   "), None);
    }

    #[test]
    fn test_missing_obj_is_reported() {
        let result = ObjLoader::load_scene("does/not/exist.obj");
        assert!(matches!(result, Err(AssetError::Obj { .. })));
    }
}
