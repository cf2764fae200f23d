//! Face normals and tangent frames for imported meshes

use crate::foundation::math::Vec3;

const DEGENERATE_EPSILON: f32 = 1e-12;

fn vec3(v: [f32; 3]) -> Vec3 {
    Vec3::new(v[0], v[1], v[2])
}

/// Smooth vertex normals from area-weighted face normals
///
/// Vertices no triangle touches get +Z.
pub fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut accumulated = vec![Vec3::zeros(); positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        let (p0, p1, p2) = (vec3(positions[a]), vec3(positions[b]), vec3(positions[c]));
        let face = (p1 - p0).cross(&(p2 - p0));
        for vertex in [a, b, c] {
            accumulated[vertex] += face;
        }
    }

    accumulated
        .into_iter()
        .map(|n| n.try_normalize(DEGENERATE_EPSILON).unwrap_or_else(Vec3::z))
        .map(|n| [n.x, n.y, n.z])
        .collect()
}

/// Per-vertex tangents with handedness in w
///
/// Triangles with degenerate UVs contribute nothing. Accumulated tangents are
/// Gram-Schmidt orthogonalised against the vertex normal; a vertex left with
/// no usable tangent gets any unit vector perpendicular to its normal.
pub fn compute_tangents(
    positions: &[[f32; 3]],
    uvs: &[[f32; 2]],
    normals: &[[f32; 3]],
    indices: &[u32],
) -> Vec<[f32; 4]> {
    let mut tangents = vec![Vec3::zeros(); positions.len()];
    let mut bitangents = vec![Vec3::zeros(); positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        let e1 = vec3(positions[b]) - vec3(positions[a]);
        let e2 = vec3(positions[c]) - vec3(positions[a]);
        let (du1, dv1) = (uvs[b][0] - uvs[a][0], uvs[b][1] - uvs[a][1]);
        let (du2, dv2) = (uvs[c][0] - uvs[a][0], uvs[c][1] - uvs[a][1]);

        let determinant = du1 * dv2 - du2 * dv1;
        if determinant.abs() < DEGENERATE_EPSILON {
            continue;
        }
        let r = 1.0 / determinant;
        let tangent = (e1 * dv2 - e2 * dv1) * r;
        let bitangent = (e2 * du1 - e1 * du2) * r;

        for vertex in [a, b, c] {
            tangents[vertex] += tangent;
            bitangents[vertex] += bitangent;
        }
    }

    normals
        .iter()
        .zip(tangents.iter().zip(&bitangents))
        .map(|(normal, (t, b))| {
            let n = vec3(*normal);
            let orthogonal = t - n * n.dot(t);
            let tangent = orthogonal
                .try_normalize(DEGENERATE_EPSILON)
                .unwrap_or_else(|| any_perpendicular(&n));
            let w = if n.cross(&tangent).dot(b) < 0.0 { -1.0 } else { 1.0 };
            [tangent.x, tangent.y, tangent.z, w]
        })
        .collect()
}

/// Unit vector perpendicular to `n`
fn any_perpendicular(n: &Vec3) -> Vec3 {
    let helper = if n.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
    n.cross(&helper)
        .try_normalize(DEGENERATE_EPSILON)
        .unwrap_or_else(Vec3::x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Unit quad in the XY plane, UVs aligned with the axes
    const QUAD_POSITIONS: [[f32; 3]; 4] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]];
    const QUAD_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
    const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

    #[test]
    fn test_ccw_quad_normals_face_positive_z() {
        let normals = compute_normals(&QUAD_POSITIONS, &QUAD_INDICES);
        for n in normals {
            assert_relative_eq!(n[2], 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_axis_aligned_uvs_give_x_tangent() {
        let normals = compute_normals(&QUAD_POSITIONS, &QUAD_INDICES);
        let tangents = compute_tangents(&QUAD_POSITIONS, &QUAD_UVS, &normals, &QUAD_INDICES);

        for t in tangents {
            assert_relative_eq!(t[0], 1.0, epsilon = 1e-6);
            assert_relative_eq!(t[1], 0.0, epsilon = 1e-6);
            assert_eq!(t[3], 1.0);
        }
    }

    #[test]
    fn test_mirrored_uvs_flip_handedness() {
        let mirrored: Vec<[f32; 2]> = QUAD_UVS.iter().map(|uv| [1.0 - uv[0], uv[1]]).collect();
        let normals = compute_normals(&QUAD_POSITIONS, &QUAD_INDICES);
        let tangents = compute_tangents(&QUAD_POSITIONS, &mirrored, &normals, &QUAD_INDICES);

        for t in tangents {
            assert_relative_eq!(t[0], -1.0, epsilon = 1e-6);
            assert_eq!(t[3], -1.0);
        }
    }

    #[test]
    fn test_degenerate_uvs_fall_back_to_perpendicular_unit_vector() {
        let flat_uvs = [[0.5, 0.5]; 4];
        let normals = compute_normals(&QUAD_POSITIONS, &QUAD_INDICES);
        let tangents = compute_tangents(&QUAD_POSITIONS, &flat_uvs, &normals, &QUAD_INDICES);

        for (t, n) in tangents.iter().zip(&normals) {
            let tangent = Vec3::new(t[0], t[1], t[2]);
            assert_relative_eq!(tangent.norm(), 1.0, epsilon = 1e-6);
            assert_relative_eq!(tangent.dot(&vec3(*n)), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_unreferenced_vertex_gets_default_normal() {
        let mut positions = QUAD_POSITIONS.to_vec();
        positions.push([5.0, 5.0, 5.0]);
        let normals = compute_normals(&positions, &QUAD_INDICES);
        assert_eq!(normals[4], [0.0, 0.0, 1.0]);
    }
}
