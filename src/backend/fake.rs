// In-memory stand-in for the logical device
//
// Hands out unique fake handles, records every object it creates and every
// object it destroys, and can be told to fail its n-th fallible call.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::cell::{Cell, RefCell};

use super::resources::{Destroy, DeviceApi, GpuResource, ResourceLedger};

pub const IMAGE_COUNT: usize = 3;

pub struct FakeDevice {
    ledger: ResourceLedger,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    next_handle: Cell<u64>,
    calls: Cell<usize>,
    fail_at: Option<usize>,
    live_shader_modules: Cell<usize>,
    pub created: RefCell<Vec<GpuResource>>,
    pub destroyed: RefCell<Vec<GpuResource>>,
    pub uploads: RefCell<Vec<Vec<u8>>>,
}

impl FakeDevice {
    /// A device whose calls all succeed.
    pub fn new() -> Self {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            ..Default::default()
        };
        memory_properties.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        memory_properties.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        Self {
            ledger: ResourceLedger::new(),
            memory_properties,
            next_handle: Cell::new(0),
            calls: Cell::new(0),
            fail_at: None,
            live_shader_modules: Cell::new(0),
            created: RefCell::default(),
            destroyed: RefCell::default(),
            uploads: RefCell::default(),
        }
    }

    /// A device whose fallible call number `n` (counting from 0) fails.
    pub fn failing_at(n: usize) -> Self {
        Self {
            fail_at: Some(n),
            ..Self::new()
        }
    }

    /// Fallible calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn live_shader_modules(&self) -> usize {
        self.live_shader_modules.get()
    }

    /// Release the ledger the way `DeviceContext` does on drop.
    pub fn teardown(&mut self) -> usize {
        let mut ledger = std::mem::take(&mut self.ledger);
        unsafe { ledger.release_all(&*self) }
    }

    fn call(&self) -> VkResult<()> {
        let n = self.calls.get();
        self.calls.set(n + 1);
        if self.fail_at == Some(n) {
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
        } else {
            Ok(())
        }
    }

    fn handle<H: Handle>(&self) -> H {
        let raw = self.next_handle.get() + 1;
        self.next_handle.set(raw);
        H::from_raw(raw)
    }

    fn create<H: Handle + Copy>(&self, wrap: fn(H) -> GpuResource) -> VkResult<H> {
        self.call()?;
        let handle = self.handle();
        self.created.borrow_mut().push(wrap(handle));
        Ok(handle)
    }
}

impl DeviceApi for FakeDevice {
    fn track(&mut self, resource: GpuResource) {
        self.ledger.track(resource);
    }

    fn graphics_family(&self) -> u32 {
        0
    }

    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    unsafe fn create_swapchain(
        &self,
        _info: &vk::SwapchainCreateInfoKHR,
    ) -> VkResult<vk::SwapchainKHR> {
        self.create(GpuResource::Swapchain)
    }

    unsafe fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.call()?;
        Ok((0..IMAGE_COUNT).map(|_| self.handle()).collect())
    }

    unsafe fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        self.create(GpuResource::ImageView)
    }

    unsafe fn create_render_pass(
        &self,
        _info: &vk::RenderPassCreateInfo,
    ) -> VkResult<vk::RenderPass> {
        self.create(GpuResource::RenderPass)
    }

    unsafe fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout> {
        self.create(GpuResource::PipelineLayout)
    }

    unsafe fn create_shader_module(
        &self,
        _info: &vk::ShaderModuleCreateInfo,
    ) -> VkResult<vk::ShaderModule> {
        self.call()?;
        self.live_shader_modules.set(self.live_shader_modules.get() + 1);
        Ok(self.handle())
    }

    unsafe fn destroy_shader_module(&self, _module: vk::ShaderModule) {
        let live = self.live_shader_modules.get();
        assert!(live > 0, "shader module destroyed twice");
        self.live_shader_modules.set(live - 1);
    }

    unsafe fn create_graphics_pipeline(
        &self,
        _info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        self.create(GpuResource::Pipeline)
    }

    unsafe fn create_framebuffer(
        &self,
        _info: &vk::FramebufferCreateInfo,
    ) -> VkResult<vk::Framebuffer> {
        self.create(GpuResource::Framebuffer)
    }

    unsafe fn create_buffer(&self, _info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer> {
        self.create(GpuResource::Buffer)
    }

    unsafe fn buffer_memory_requirements(&self, _buffer: vk::Buffer) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: 64,
            alignment: 4,
            memory_type_bits: 0b11,
        }
    }

    unsafe fn allocate_memory(
        &self,
        _info: &vk::MemoryAllocateInfo,
    ) -> VkResult<vk::DeviceMemory> {
        self.create(GpuResource::Memory)
    }

    unsafe fn bind_buffer_memory(
        &self,
        _buffer: vk::Buffer,
        _memory: vk::DeviceMemory,
    ) -> VkResult<()> {
        self.call()
    }

    unsafe fn write_memory(&self, _memory: vk::DeviceMemory, bytes: &[u8]) -> VkResult<()> {
        self.call()?;
        self.uploads.borrow_mut().push(bytes.to_vec());
        Ok(())
    }

    unsafe fn create_command_pool(
        &self,
        _info: &vk::CommandPoolCreateInfo,
    ) -> VkResult<vk::CommandPool> {
        self.create(GpuResource::CommandPool)
    }

    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        self.call()?;
        Ok((0..info.command_buffer_count).map(|_| self.handle()).collect())
    }

    unsafe fn create_semaphore(&self, _info: &vk::SemaphoreCreateInfo) -> VkResult<vk::Semaphore> {
        self.create(GpuResource::Semaphore)
    }

    unsafe fn create_fence(&self, _info: &vk::FenceCreateInfo) -> VkResult<vk::Fence> {
        self.create(GpuResource::Fence)
    }
}

impl Destroy for FakeDevice {
    unsafe fn destroy(&self, resource: GpuResource) {
        self.destroyed.borrow_mut().push(resource);
    }
}
