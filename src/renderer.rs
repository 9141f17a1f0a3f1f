// =============================================================================
// RENDERER - Assembles every Vulkan object the triangle needs
// =============================================================================
//
// Creation order:
//   instance + messenger + surface -> physical/logical device -> swapchain
//   -> render pass + pipeline -> framebuffers -> vertex buffer
//   -> command pool/buffer -> semaphores + fence
//
// Teardown is the exact reverse: the device context's ledger destroys its
// objects newest first, then the device, then the instance objects.
//
// =============================================================================

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;

use crate::backend::commands::{Commands, DrawInfo};
use crate::backend::pipeline::{self, Pipeline};
use crate::backend::probe::{self, QueueFamilies, SurfaceSupport};
use crate::backend::resources::DeviceApi;
use crate::backend::vertex::VertexBuffer;
use crate::backend::{DeviceContext, FrameSync, Swapchain, VulkanInstance};
use crate::config::{Config, GraphicsConfig};
use crate::frame_loop::FrameBackend;
use crate::window::AppWindow;

/// All GPU state for the triangle.
///
/// IMPORTANT: `device` must drop before `instance`. The handle fields are
/// plain copies; the objects behind them are owned by the device ledger.
pub struct Renderer {
    pub sync: FrameSync,
    commands: Commands,
    vertex_buffer: VertexBuffer,
    framebuffers: Vec<vk::Framebuffer>,
    pipeline: Pipeline,
    swapchain: Swapchain,
    clear_color: [f32; 4],
    device: DeviceContext,
    instance: VulkanInstance,
}

/// Everything created on top of the logical device.
pub struct FrameObjects {
    pub swapchain: Swapchain,
    pub pipeline: Pipeline,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub vertex_buffer: VertexBuffer,
    pub commands: Commands,
    pub sync: FrameSync,
}

/// Create the swapchain and everything that draws into it. Each object is
/// tracked by `device` as soon as it exists, so on failure the caller's
/// teardown releases exactly what was built.
pub fn build_frame_objects(
    device: &mut impl DeviceApi,
    surface: vk::SurfaceKHR,
    support: &SurfaceSupport,
    families: QueueFamilies,
    graphics: &GraphicsConfig,
    framebuffer_size: impl FnOnce() -> vk::Extent2D,
) -> Result<FrameObjects> {
    // ─────────────────────────────────────────────────────────────────
    // STEP 3: Swapchain, pipeline and one framebuffer per image
    // ─────────────────────────────────────────────────────────────────
    let swapchain = Swapchain::new(device, surface, support, families, framebuffer_size)
        .context("Failed to create the swapchain")?;
    log::info!(
        "Swapchain ready: {} images, {:?}",
        swapchain.images.len(),
        swapchain.present_mode
    );

    let pipeline = Pipeline::new(device, graphics, swapchain.format.format)
        .context("Failed to create the graphics pipeline")?;

    let framebuffers = pipeline::create_framebuffers(
        device,
        &swapchain.image_views,
        pipeline.render_pass,
        swapchain.extent,
    )
    .context("Failed to create framebuffers")?;

    // ─────────────────────────────────────────────────────────────────
    // STEP 4: Per-frame resources
    // ─────────────────────────────────────────────────────────────────
    let vertex_buffer = VertexBuffer::new(device).context("Failed to create the vertex buffer")?;
    let commands = Commands::new(device).context("Failed to create command buffers")?;
    let sync = FrameSync::new(device).context("Failed to create sync objects")?;

    Ok(FrameObjects {
        swapchain,
        pipeline,
        framebuffers,
        vertex_buffer,
        commands,
        sync,
    })
}

impl Renderer {
    /// Initialize all Vulkan resources for the window. On failure everything
    /// created so far is destroyed before returning.
    pub fn new(config: &Config, window: &AppWindow) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        // ─────────────────────────────────────────────────────────────────
        // STEP 1: Instance, validation messenger and window surface
        // ─────────────────────────────────────────────────────────────────
        let (display_handle, window_handle) = window.raw_handles()?;
        let instance = VulkanInstance::new(config, display_handle, window_handle)
            .context("Failed to create the Vulkan instance")?;

        // ─────────────────────────────────────────────────────────────────
        // STEP 2: Pick a GPU and create the logical device
        // ─────────────────────────────────────────────────────────────────
        let required_extensions = config.required_extensions()?;
        let mut device = DeviceContext::new(&instance, &required_extensions)
            .context("Failed to set up a graphics device")?;

        let support = probe::query_surface_support(
            &instance.surface_loader,
            device.physical_device,
            instance.surface,
        );
        let families = device.queue_families;

        let FrameObjects {
            swapchain,
            pipeline,
            framebuffers,
            vertex_buffer,
            commands,
            sync,
        } = build_frame_objects(
            &mut device,
            instance.surface,
            &support,
            families,
            &config.graphics,
            || window.framebuffer_size(),
        )?;

        log::info!("Vulkan initialized successfully!");

        Ok(Self {
            sync,
            commands,
            vertex_buffer,
            framebuffers,
            pipeline,
            swapchain,
            clear_color: config.graphics.clear_color,
            device,
            instance,
        })
    }
}

impl FrameBackend for Renderer {
    fn wait_for_fence(&mut self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.device.wait_for_fences(&[fence], true, u64::MAX) }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.device.reset_fences(&[fence]) }
    }

    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> VkResult<u32> {
        self.swapchain
            .acquire_next_image(&self.device.swapchain_loader, signal)
    }

    fn record_commands(&mut self, image_index: u32) -> VkResult<()> {
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or(vk::Result::ERROR_UNKNOWN)?;

        let draw = DrawInfo {
            render_pass: self.pipeline.render_pass,
            framebuffer,
            extent: self.swapchain.extent,
            pipeline: self.pipeline.pipeline,
            vertex_buffer: self.vertex_buffer.buffer,
            vertex_count: self.vertex_buffer.vertex_count,
            clear_color: self.clear_color,
        };
        self.commands.record_draw(&self.device.device, &draw)
    }

    fn submit(
        &mut self,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()> {
        let wait_semaphores = [wait];
        let wait_stages = [wait_stage];
        let command_buffers = [self.commands.buffer];
        let signal_semaphores = [signal];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info], fence)
        }
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VkResult<()> {
        self.swapchain.present(
            &self.device.swapchain_loader,
            self.device.present_queue,
            image_index,
            wait,
        )
    }

    fn wait_idle(&mut self) -> VkResult<()> {
        unsafe { self.device.device.device_wait_idle() }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
    }
}
