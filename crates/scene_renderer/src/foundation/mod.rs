//! Foundation module - core math types shared by the renderer and the scene importer

pub mod math;
