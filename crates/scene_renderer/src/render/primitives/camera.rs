//! # Fly camera
//!
//! [`Camera`] holds position, look target and projection parameters and
//! produces the view and projection matrices the uniform block needs.
//! [`CameraController`] turns GLFW keyboard and mouse events into camera
//! motion.
//!
//! ## Coordinate System
//! Right-handed, Y-up world and view space. The Vulkan Y/Z flip is folded
//! into the projection returned by [`Camera::vulkan_projection`].

use std::collections::HashSet;

use glfw::{Action, Key, MouseButton, WindowEvent};

use crate::config::CameraConfig;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};

/// Pitch is kept just short of straight up or down
const MAX_PITCH: f32 = 1.55;

/// Perspective camera
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector for camera orientation (typically [0, 1, 0])
    pub up: Vec3,

    /// Vertical field of view in radians
    pub fov: f32,

    /// Aspect ratio (width / height)
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,
}

impl Camera {
    /// Create a perspective camera looking at the origin
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Aspect ratio (width / height) of the viewport
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::y(),
            fov: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
        }
    }

    /// Camera described by the configuration file
    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        let mut camera = Self::perspective(Vec3::from(config.position), config.fov_degrees, aspect, config.near, config.far);
        camera.target = Vec3::from(config.target);
        camera
    }

    /// Update the aspect ratio after the swapchain extent changed
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if (self.aspect - aspect).abs() > 0.01 {
            log::debug!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect, aspect);
        }
        self.aspect = aspect;
    }

    /// Unit vector from the position towards the target
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| -Vec3::z())
    }

    /// Unit vector to the camera's right, parallel to the ground
    pub fn right(&self) -> Vec3 {
        self.forward().cross(&self.up).try_normalize(f32::EPSILON).unwrap_or_else(Vec3::x)
    }

    /// Move position and target together
    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
        self.target += offset;
    }

    /// Turn the view direction by yaw (around world up) and pitch (around right)
    pub fn rotate(&mut self, yaw: f32, pitch: f32) {
        let forward = self.forward();
        let current_pitch = forward.y.clamp(-1.0, 1.0).asin();
        let current_yaw = forward.z.atan2(forward.x);

        let pitch = (current_pitch + pitch).clamp(-MAX_PITCH, MAX_PITCH);
        let yaw = current_yaw + yaw;
        let direction = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos());
        self.target = self.position + direction;
    }

    /// World to view
    pub fn get_view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.target, self.up)
    }

    /// View to clip for a right-handed Y-up view space
    pub fn get_projection_matrix(&self) -> Mat4 {
        Mat4::perspective(self.fov, self.aspect, self.near, self.far)
    }

    /// Projection including the flip into Vulkan's Y-down clip space
    pub fn vulkan_projection(&self) -> Mat4 {
        self.get_projection_matrix() * Mat4::vulkan_coordinate_transform()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default(), 16.0 / 9.0)
    }
}

/// Keyboard and mouse state driving a [`Camera`]
///
/// W/A/S/D move in the view plane, Space and Left Shift move along world up,
/// dragging with the right mouse button turns the view.
#[derive(Debug)]
pub struct CameraController {
    move_speed: f32,
    mouse_sensitivity: f32,
    held_keys: HashSet<Key>,
    looking: bool,
    last_cursor: Option<(f64, f64)>,
    pending_rotation: (f32, f32),
    close_requested: bool,
}

impl CameraController {
    /// Controller using the configured speed and sensitivity
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            move_speed: config.move_speed,
            mouse_sensitivity: config.mouse_sensitivity,
            held_keys: HashSet::new(),
            looking: false,
            last_cursor: None,
            pending_rotation: (0.0, 0.0),
            close_requested: false,
        }
    }

    /// Feed one window event
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match *event {
            WindowEvent::Key(Key::Escape, _, Action::Press, _) => self.close_requested = true,
            WindowEvent::Key(key, _, Action::Press, _) => {
                self.held_keys.insert(key);
            }
            WindowEvent::Key(key, _, Action::Release, _) => {
                self.held_keys.remove(&key);
            }
            WindowEvent::MouseButton(MouseButton::Button2, action, _) => {
                self.looking = action != Action::Release;
                self.last_cursor = None;
            }
            WindowEvent::CursorPos(x, y) => {
                if self.looking {
                    if let Some((last_x, last_y)) = self.last_cursor {
                        self.pending_rotation.0 += (x - last_x) as f32 * self.mouse_sensitivity;
                        self.pending_rotation.1 -= (y - last_y) as f32 * self.mouse_sensitivity;
                    }
                    self.last_cursor = Some((x, y));
                }
            }
            WindowEvent::Focus(false) => {
                self.held_keys.clear();
                self.looking = false;
            }
            _ => {}
        }
    }

    /// Escape was pressed
    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// Apply held keys and accumulated mouse motion for `dt` seconds
    ///
    /// Returns whether the camera moved.
    pub fn update(&mut self, camera: &mut Camera, dt: f32) -> bool {
        let (yaw, pitch) = std::mem::take(&mut self.pending_rotation);
        let rotated = yaw != 0.0 || pitch != 0.0;
        if rotated {
            camera.rotate(yaw, pitch);
        }

        let forward = camera.forward();
        let right = camera.right();
        let axes = [
            (Key::W, forward),
            (Key::S, -forward),
            (Key::D, right),
            (Key::A, -right),
            (Key::Space, Vec3::y()),
            (Key::LeftShift, -Vec3::y()),
        ];
        let direction: Vec3 = axes
            .iter()
            .filter(|(key, _)| self.held_keys.contains(key))
            .map(|(_, axis)| *axis)
            .sum();

        match direction.try_normalize(f32::EPSILON) {
            Some(direction) => {
                camera.translate(direction * self.move_speed * dt);
                true
            }
            None => rotated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::foundation::math::Vec4;
    use glfw::{Modifiers, Scancode};

    fn key(key: Key, action: Action) -> WindowEvent {
        WindowEvent::Key(key, 0 as Scancode, action, Modifiers::empty())
    }

    fn controller() -> CameraController {
        CameraController::new(&CameraConfig {
            move_speed: 2.0,
            mouse_sensitivity: 0.01,
            ..CameraConfig::default()
        })
    }

    fn camera_looking_down_negative_z() -> Camera {
        let mut camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, 1.0, 0.1, 100.0);
        camera.target = Vec3::new(0.0, 0.0, 4.0);
        camera
    }

    #[test]
    fn test_forward_key_moves_along_view_direction() {
        let mut camera = camera_looking_down_negative_z();
        let mut controller = controller();
        controller.handle_event(&key(Key::W, Action::Press));

        assert!(controller.update(&mut camera, 0.5));
        assert_relative_eq!(camera.position.z, 4.0, epsilon = 1e-5);
        assert_relative_eq!(camera.target.z, 3.0, epsilon = 1e-5);

        controller.handle_event(&key(Key::W, Action::Release));
        assert!(!controller.update(&mut camera, 0.5));
    }

    #[test]
    fn test_opposite_keys_cancel() {
        let mut camera = camera_looking_down_negative_z();
        let mut controller = controller();
        controller.handle_event(&key(Key::A, Action::Press));
        controller.handle_event(&key(Key::D, Action::Press));

        assert!(!controller.update(&mut camera, 1.0));
        assert_relative_eq!(camera.position.x, 0.0);
    }

    #[test]
    fn test_mouse_look_only_while_right_button_held() {
        let mut camera = camera_looking_down_negative_z();
        let mut controller = controller();

        controller.handle_event(&WindowEvent::CursorPos(0.0, 0.0));
        controller.handle_event(&WindowEvent::CursorPos(50.0, 0.0));
        assert!(!controller.update(&mut camera, 0.016));

        controller.handle_event(&WindowEvent::MouseButton(MouseButton::Button2, Action::Press, Modifiers::empty()));
        controller.handle_event(&WindowEvent::CursorPos(0.0, 0.0));
        controller.handle_event(&WindowEvent::CursorPos(50.0, 0.0));
        assert!(controller.update(&mut camera, 0.016));
        // Moving the mouse right turns the view right
        assert!(camera.forward().x > 0.0);
        assert_relative_eq!(camera.forward().norm(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = camera_looking_down_negative_z();
        camera.rotate(0.0, 10.0);
        assert!(camera.forward().y < 1.0);
        assert!(camera.forward().y > 0.99);
    }

    #[test]
    fn test_escape_requests_close() {
        let mut controller = controller();
        controller.handle_event(&key(Key::Escape, Action::Press));
        assert!(controller.close_requested());
    }

    #[test]
    fn test_vulkan_projection_flips_y() {
        let camera = camera_looking_down_negative_z();
        let clip = camera.vulkan_projection() * camera.get_view_matrix() * Vec4::new(0.0, 1.0, 0.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }
}
