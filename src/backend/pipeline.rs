// Graphics pipeline creation
//
// Render pass with a single color attachment, a fixed-function pipeline for
// the triangle and one framebuffer per swapchain image. Viewport and scissor
// are dynamic state set while recording.

use ash::vk;
use std::ffi::CStr;
use std::path::Path;

use super::resources::{DeviceApi, GpuResource};
use super::shader;
use super::vertex::Vertex;
use crate::config::GraphicsConfig;
use crate::error::{Result, VkResultExt};

const SHADER_ENTRY_POINT: &CStr = c"main";

pub const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// The swapchain image: cleared on load, stored for presentation.
pub fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build()
}

/// Don't write the attachment before the acquire semaphore's wait stage.
pub fn subpass_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build()
}

pub fn create_render_pass(device: &impl DeviceApi, format: vk::Format) -> Result<vk::RenderPass> {
    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();
    let color_attachment_refs = [color_attachment_ref];

    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachment_refs)
        .build();

    let attachments = [color_attachment(format)];
    let subpasses = [subpass];
    let dependencies = [subpass_dependency()];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.create_render_pass(&render_pass_info) }.or_fail("create the render pass")
}

pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
        .build()
}

/// Opaque: blending off, all channels written.
pub fn color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build()
}

/// The pipeline layout is owned by the device ledger; nothing reads it
/// after the pipeline exists.
pub struct Pipeline {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Build render pass, layout and pipeline for the swapchain format.
    pub fn new(
        device: &mut impl DeviceApi,
        graphics: &GraphicsConfig,
        format: vk::Format,
    ) -> Result<Self> {
        let render_pass = create_render_pass(&*device, format)?;
        device.track(GpuResource::RenderPass(render_pass));

        // No descriptors or push constants.
        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe { device.create_pipeline_layout(&layout_info) }
            .or_fail("create the pipeline layout")?;
        device.track(GpuResource::PipelineLayout(layout));

        let vert_shader = load_module(&*device, &graphics.vertex_shader)?;
        let frag_shader = match load_module(&*device, &graphics.fragment_shader) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert_shader) };
                return Err(e);
            }
        };

        let pipeline =
            create_graphics_pipeline(&*device, render_pass, layout, vert_shader, frag_shader);

        // Modules are only needed while the pipeline is compiled.
        unsafe {
            device.destroy_shader_module(frag_shader);
            device.destroy_shader_module(vert_shader);
        }

        let pipeline = pipeline?;
        device.track(GpuResource::Pipeline(pipeline));
        log::info!("Created graphics pipeline");

        Ok(Self {
            render_pass,
            pipeline,
        })
    }
}

fn load_module(device: &impl DeviceApi, path: &Path) -> Result<vk::ShaderModule> {
    let bytes = shader::load_shader_bytes(path);
    shader::create_shader_module(device, path, &bytes)
}

fn create_graphics_pipeline(
    device: &impl DeviceApi,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
) -> Result<vk::Pipeline> {
    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_shader)
            .name(SHADER_ENTRY_POINT)
            .build(),
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_shader)
            .name(SHADER_ENTRY_POINT)
            .build(),
    ];

    let bindings = [Vertex::binding_description()];
    let attributes = Vertex::attribute_descriptions();
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Counts only; the rectangles are set per frame.
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);

    let rasterizer = rasterization_state();

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let color_blend_attachments = [color_blend_attachment()];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();

    unsafe { device.create_graphics_pipeline(&pipeline_info) }
        .or_fail("create the graphics pipeline")
}

/// Create framebuffers for each swapchain image view
pub fn create_framebuffers(
    device: &mut impl DeviceApi,
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());
    for &image_view in image_views {
        let attachments = [image_view];
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&framebuffer_info) }
            .or_fail("create a framebuffer")?;
        device.track(GpuResource::Framebuffer(framebuffer));
        framebuffers.push(framebuffer);
    }

    Ok(framebuffers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_attachment_is_cleared_and_presented() {
        let attachment = color_attachment(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(attachment.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(attachment.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(attachment.stencil_store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachment.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn dependency_waits_for_color_output() {
        let dependency = subpass_dependency();
        assert_eq!(dependency.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependency.dst_subpass, 0);
        assert_eq!(dependency.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(dependency.dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert!(dependency.src_access_mask.is_empty());
        assert_eq!(dependency.dst_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn rasterizer_culls_back_faces_of_clockwise_triangles() {
        let rasterizer = rasterization_state();
        assert_eq!(rasterizer.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(rasterizer.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(rasterizer.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(rasterizer.depth_bias_enable, vk::FALSE);
        assert_eq!(rasterizer.rasterizer_discard_enable, vk::FALSE);
        assert_eq!(rasterizer.line_width, 1.0);
    }

    #[test]
    fn blending_is_off_and_writes_every_channel() {
        let blend = color_blend_attachment();
        assert_eq!(blend.blend_enable, vk::FALSE);
        assert_eq!(blend.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn viewport_and_scissor_are_dynamic() {
        assert_eq!(DYNAMIC_STATES.len(), 2);
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::VIEWPORT));
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::SCISSOR));
    }
}
