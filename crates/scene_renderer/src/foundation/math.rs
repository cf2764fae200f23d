//! Math utilities and types
//!
//! Thin aliases over `nalgebra` plus the projection helpers the renderer needs
//! for Vulkan's clip space (Y down, depth in [0, 1]).

pub use nalgebra::{Matrix4, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Math utility functions
pub mod utils {
    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees.to_radians()
    }
}

/// Extension trait for Mat4 with projection helpers
pub trait Mat4Ext {
    /// Create a perspective projection matrix mapping view depth onto [0, 1]
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create a right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Flip Y and Z so a right-handed Y-up view space lands in Vulkan's Y-down clip space
    fn vulkan_coordinate_transform() -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (far - near);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = 1.0;
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new_translation(&-eye);
        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }

    fn vulkan_coordinate_transform() -> Mat4 {
        Mat4::new(
            1.0,  0.0,  0.0, 0.0,
            0.0, -1.0,  0.0, 0.0,
            0.0,  0.0, -1.0, 0.0,
            0.0,  0.0,  0.0, 1.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn project(point: Vec3) -> Vec3 {
        let eye = Vec3::new(0.0, 0.0, 5.0);
        let view = Mat4::look_at(eye, Vec3::zeros(), Vec3::y());
        let clip = Mat4::perspective(utils::deg_to_rad(60.0), 1.0, 1.0, 10.0)
            * Mat4::vulkan_coordinate_transform()
            * view
            * Vec4::new(point.x, point.y, point.z, 1.0);
        Vec3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w)
    }

    #[test]
    fn test_depth_maps_near_and_far_to_unit_range() {
        // eye at z = 5 looking down -Z: near plane at z = 4, far plane at z = -5
        assert_relative_eq!(project(Vec3::new(0.0, 0.0, 4.0)).z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(project(Vec3::new(0.0, 0.0, -5.0)).z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_world_up_is_negative_y_in_clip_space() {
        let above = project(Vec3::new(0.0, 1.0, 0.0));
        assert!(above.y < 0.0);
        let right = project(Vec3::new(1.0, 0.0, 0.0));
        assert!(right.x > 0.0);
    }
}
