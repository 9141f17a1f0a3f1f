// Buffer utilities
//
// Host-visible buffers filled once from the CPU. The buffer and its memory
// are handed to the device context as soon as they exist.

use ash::vk;

use super::resources::{DeviceApi, GpuResource};
use crate::error::{RendererError, Result, VkResultExt};

/// First memory type allowed by `type_filter` that has every requested
/// property.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let count = memory_properties.memory_type_count as usize;
    memory_properties.memory_types[..count]
        .iter()
        .zip(0u32..)
        .find(|(memory_type, i)| {
            (type_filter & (1 << *i)) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(_, i)| i)
        .ok_or(RendererError::NoMemoryType(properties))
}

/// Helper to create a GPU buffer with specified usage and memory properties
pub fn create_buffer(
    device: &mut impl DeviceApi,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.create_buffer(&buffer_info) }.or_fail("create a buffer")?;
    device.track(GpuResource::Buffer(buffer));

    let requirements = unsafe { device.buffer_memory_requirements(buffer) };
    let memory_type_index = find_memory_type(
        device.memory_properties(),
        requirements.memory_type_bits,
        memory_properties,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe { device.allocate_memory(&alloc_info) }.or_fail("allocate buffer memory")?;
    device.track(GpuResource::Memory(memory));

    unsafe { device.bind_buffer_memory(buffer, memory) }.or_fail("bind buffer memory")?;

    Ok((buffer, memory))
}

/// Create a host-coherent buffer and copy `data` into it
pub fn create_buffer_with_data<T: bytemuck::Pod>(
    device: &mut impl DeviceApi,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<vk::Buffer> {
    let bytes: &[u8] = bytemuck::cast_slice(data);

    let (buffer, memory) = create_buffer(
        device,
        bytes.len() as vk::DeviceSize,
        usage,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    unsafe { device.write_memory(memory, bytes) }.or_fail("map buffer memory")?;

    Ok(buffer)
}
