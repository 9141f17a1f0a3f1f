// Resource ledger - owns every device-level GPU object
//
// Objects are recorded in creation order and destroyed in exactly the reverse
// order, once. Later objects reference earlier ones (pipeline -> render pass,
// framebuffer -> image view -> swapchain image), so reverse order is the only
// valid teardown order.

use ash::prelude::VkResult;
use ash::vk;

/// One owned device-level Vulkan object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuResource {
    Swapchain(vk::SwapchainKHR),
    ImageView(vk::ImageView),
    RenderPass(vk::RenderPass),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
    Framebuffer(vk::Framebuffer),
    CommandPool(vk::CommandPool),
    Buffer(vk::Buffer),
    Memory(vk::DeviceMemory),
    Semaphore(vk::Semaphore),
    Fence(vk::Fence),
}

/// Something that knows how to destroy a `GpuResource`.
///
/// The real implementation is the logical device; tests use a recorder.
pub trait Destroy {
    /// # Safety
    /// The resource must have been created by this destroyer's device and
    /// must no longer be in use by the GPU.
    unsafe fn destroy(&self, resource: GpuResource);
}

/// Device-level calls the renderer's objects are built with.
///
/// Creation only: whoever creates an object hands it to `track`, and from
/// then on it is destroyed with everything else in reverse order. Shader
/// modules are the exception; they live only while a pipeline is compiled.
///
/// # Safety
/// Create-infos must be valid for the device, as for the raw Vulkan calls.
pub trait DeviceApi {
    fn track(&mut self, resource: GpuResource);
    fn graphics_family(&self) -> u32;
    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties;

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR,
    ) -> VkResult<vk::SwapchainKHR>;
    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView>;

    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo,
    ) -> VkResult<vk::RenderPass>;
    unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout>;
    unsafe fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo,
    ) -> VkResult<vk::ShaderModule>;
    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule);
    unsafe fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline>;
    unsafe fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo,
    ) -> VkResult<vk::Framebuffer>;

    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer>;
    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VkResult<vk::DeviceMemory>;
    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
    ) -> VkResult<()>;
    /// Map host-visible memory, copy `bytes` to its start and unmap.
    unsafe fn write_memory(&self, memory: vk::DeviceMemory, bytes: &[u8]) -> VkResult<()>;

    unsafe fn create_command_pool(
        &self,
        info: &vk::CommandPoolCreateInfo,
    ) -> VkResult<vk::CommandPool>;
    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    unsafe fn create_semaphore(&self, info: &vk::SemaphoreCreateInfo) -> VkResult<vk::Semaphore>;
    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo) -> VkResult<vk::Fence>;
}

#[derive(Debug, Default)]
pub struct ResourceLedger {
    owned: Vec<GpuResource>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a freshly created object.
    pub fn track(&mut self, resource: GpuResource) {
        debug_assert!(
            !self.owned.contains(&resource),
            "{:?} tracked twice",
            resource
        );
        self.owned.push(resource);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.owned.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    /// Destroy everything in reverse creation order. Returns how many objects
    /// were destroyed; the ledger is empty afterwards, so a second call is a
    /// no-op.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn release_all(&mut self, destroyer: &impl Destroy) -> usize {
        let count = self.owned.len();
        while let Some(resource) = self.owned.pop() {
            log::trace!("Destroying {:?}", resource);
            destroyer.destroy(resource);
        }
        count
    }
}
