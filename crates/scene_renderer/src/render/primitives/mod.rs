//! Camera and input primitives

pub mod camera;

pub use camera::{Camera, CameraController};
