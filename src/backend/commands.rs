// Command pool and the single primary command buffer
//
// The buffer is reset and re-recorded every frame, so the pool is created
// with RESET_COMMAND_BUFFER.

use ash::vk;

use super::resources::{DeviceApi, GpuResource};
use crate::error::{RendererError, Result, VkResultExt};

/// Everything one draw of the triangle needs.
pub struct DrawInfo {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub vertex_buffer: vk::Buffer,
    pub vertex_count: u32,
    pub clear_color: [f32; 4],
}

pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// The pool itself is owned by the device ledger.
pub struct Commands {
    pub buffer: vk::CommandBuffer,
}

impl Commands {
    pub fn new(device: &mut impl DeviceApi) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device.graphics_family());

        let pool = unsafe { device.create_command_pool(&pool_info) }
            .or_fail("create the command pool")?;
        device.track(GpuResource::CommandPool(pool));

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        // Freed together with the pool.
        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
            .or_fail("allocate the command buffer")?;
        let buffer = buffers.first().copied().ok_or(RendererError::Vk {
            what: "allocate the command buffer",
            result: vk::Result::ERROR_UNKNOWN,
        })?;

        Ok(Self { buffer })
    }

    /// Re-record the command buffer to draw the triangle into one framebuffer.
    pub fn record_draw(&self, device: &ash::Device, draw: &DrawInfo) -> ash::prelude::VkResult<()> {
        let cmd = self.buffer;

        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::builder();
            device.begin_command_buffer(cmd, &begin_info)?;

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: draw.clear_color,
                },
            }];

            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(draw.render_pass)
                .framebuffer(draw.framebuffer)
                .render_area(full_scissor(draw.extent))
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, draw.pipeline);
            device.cmd_bind_vertex_buffers(cmd, 0, &[draw.vertex_buffer], &[0]);
            device.cmd_set_viewport(cmd, 0, &[full_viewport(draw.extent)]);
            device.cmd_set_scissor(cmd, 0, &[full_scissor(draw.extent)]);
            device.cmd_draw(cmd, draw.vertex_count, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device.end_command_buffer(cmd)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_covers_the_whole_extent() {
        let viewport = full_viewport(vk::Extent2D {
            width: 1024,
            height: 768,
        });
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (1024.0, 768.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn scissor_starts_at_the_origin() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let scissor = full_scissor(extent);
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(scissor.extent, extent);
    }
}
