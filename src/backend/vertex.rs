// Triangle vertex data
//
// One interleaved binding: 2D position followed by an RGB color.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use std::mem::{offset_of, size_of};

use super::buffer;
use super::resources::DeviceApi;
use crate::error::Result;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec2,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(position: Vec2, color: Vec3) -> Self {
        Self { position, color }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
        ]
    }
}

/// Clip-space triangle: red top, green bottom right, blue bottom left.
pub const TRIANGLE_VERTICES: [Vertex; 3] = [
    Vertex::new(Vec2::new(0.0, -0.5), Vec3::new(1.0, 0.0, 0.0)),
    Vertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 1.0, 0.0)),
    Vertex::new(Vec2::new(-0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
];

pub const VERTEX_COUNT: u32 = TRIANGLE_VERTICES.len() as u32;

/// The triangle's vertices, uploaded once at startup.
///
/// Its memory is owned by the device ledger alongside the buffer.
pub struct VertexBuffer {
    pub buffer: vk::Buffer,
    pub vertex_count: u32,
}

impl VertexBuffer {
    pub fn new(device: &mut impl DeviceApi) -> Result<Self> {
        let buffer = buffer::create_buffer_with_data(
            device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &TRIANGLE_VERTICES[..],
        )?;
        log::debug!(
            "Uploaded {} vertices ({} bytes)",
            VERTEX_COUNT,
            size_of::<[Vertex; 3]>()
        );

        Ok(Self {
            buffer,
            vertex_count: VERTEX_COUNT,
        })
    }
}
