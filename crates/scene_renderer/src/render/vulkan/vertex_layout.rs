//! Vertex input layout for scene meshes
//!
//! Meshes keep each attribute in its own buffer, so every attribute gets its
//! own binding and sits at offset 0.

use ash::vk;

/// Vertex attributes, in binding (and shader location) order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexStream {
    /// `vec3` position
    Position,
    /// `vec2` texture coordinate
    Uv,
    /// `vec3` normal
    Normal,
    /// `vec4` tangent, w holds handedness
    Tangent,
    /// `uint` material index
    MaterialId,
}

impl VertexStream {
    /// Every stream, in binding order
    pub const ALL: [Self; 5] = [Self::Position, Self::Uv, Self::Normal, Self::Tangent, Self::MaterialId];

    /// Attribute format
    pub fn format(self) -> vk::Format {
        match self {
            Self::Position | Self::Normal => vk::Format::R32G32B32_SFLOAT,
            Self::Uv => vk::Format::R32G32_SFLOAT,
            Self::Tangent => vk::Format::R32G32B32A32_SFLOAT,
            Self::MaterialId => vk::Format::R32_UINT,
        }
    }

    /// Bytes per vertex
    pub fn stride(self) -> u32 {
        match self {
            Self::Position | Self::Normal => 12,
            Self::Uv => 8,
            Self::Tangent => 16,
            Self::MaterialId => 4,
        }
    }
}

/// Vertex input description for the five scene streams
pub struct SceneVertexLayout;

impl SceneVertexLayout {
    /// One per-vertex binding per stream
    pub fn binding_descriptions() -> [vk::VertexInputBindingDescription; 5] {
        VertexStream::ALL.map(|stream| vk::VertexInputBindingDescription {
            binding: stream as u32,
            stride: stream.stride(),
            input_rate: vk::VertexInputRate::VERTEX,
        })
    }

    /// Location N reads binding N
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 5] {
        VertexStream::ALL.map(|stream| vk::VertexInputAttributeDescription {
            location: stream as u32,
            binding: stream as u32,
            format: stream.format(),
            offset: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_match_stream_sizes() {
        let bindings = SceneVertexLayout::binding_descriptions();
        let strides: Vec<u32> = bindings.iter().map(|b| b.stride).collect();
        assert_eq!(strides, vec![12, 8, 12, 16, 4]);
        assert!(bindings.iter().enumerate().all(|(i, b)| b.binding == i as u32));
    }

    #[test]
    fn test_attribute_locations_follow_bindings() {
        let attributes = SceneVertexLayout::attribute_descriptions();
        for (i, attribute) in attributes.iter().enumerate() {
            assert_eq!(attribute.location, i as u32);
            assert_eq!(attribute.binding, i as u32);
            assert_eq!(attribute.offset, 0);
        }
        assert_eq!(attributes[4].format, vk::Format::R32_UINT);
        assert_eq!(attributes[3].format, vk::Format::R32G32B32A32_SFLOAT);
    }

    #[test]
    fn test_strides_match_cpu_element_sizes() {
        assert_eq!(VertexStream::Position.stride() as usize, std::mem::size_of::<[f32; 3]>());
        assert_eq!(VertexStream::Uv.stride() as usize, std::mem::size_of::<[f32; 2]>());
        assert_eq!(VertexStream::Tangent.stride() as usize, std::mem::size_of::<[f32; 4]>());
        assert_eq!(VertexStream::MaterialId.stride() as usize, std::mem::size_of::<u32>());
    }
}
