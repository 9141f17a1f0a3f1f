// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (adequate devices only, prefer discrete GPU)
// - Logical device + graphics/present queue creation
// - Ownership of every device-level object through the resource ledger

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::prelude::VkResult;
use ash::vk;
use std::ffi::CString;

use super::instance::VulkanInstance;
use super::probe::{self, DeviceCandidate, QueueFamilies};
use super::resources::{Destroy, DeviceApi, GpuResource, ResourceLedger};
use crate::error::{RendererError, Result, VkResultExt};

/// A candidate can drive the presentation pipeline at all.
pub fn is_adequate(candidate: &DeviceCandidate) -> bool {
    candidate.queue_families.resolve().is_some()
        && candidate.supports_required_extensions
        && candidate.surface.is_adequate()
}

/// Index of the device to use: the first adequate discrete GPU, otherwise
/// the first adequate device in enumeration order.
pub fn select_device(candidates: &[DeviceCandidate]) -> Option<usize> {
    let mut adequate = candidates
        .iter()
        .enumerate()
        .filter(|(_, candidate)| is_adequate(candidate));

    let first = adequate.next()?;
    if first.1.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        return Some(first.0);
    }

    Some(
        adequate
            .find(|(_, candidate)| candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU)
            .map_or(first.0, |(index, _)| index),
    )
}

/// Queue families that need a queue create-info: one if shared, else two.
pub fn queue_create_families(families: QueueFamilies) -> Vec<u32> {
    if families.is_shared() {
        vec![families.graphics]
    } else {
        vec![families.graphics, families.present]
    }
}

/// Logical device plus everything created from it.
///
/// Dropping the context waits for the GPU, destroys tracked objects in
/// reverse creation order and finally destroys the device.
pub struct DeviceContext {
    ledger: ResourceLedger,
    pub swapchain_loader: SwapchainLoader,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilies,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl DeviceContext {
    pub fn new(instance: &VulkanInstance, required_extensions: &[CString]) -> Result<Self> {
        let candidate = Self::pick_physical_device(instance, required_extensions)?;
        let queue_families = candidate
            .queue_families
            .resolve()
            .ok_or(RendererError::NoSuitableDevice { examined: 1 })?;

        let (device, graphics_queue, present_queue) = Self::create_logical_device(
            &instance.instance,
            candidate.physical_device,
            queue_families,
            required_extensions,
        )?;

        let memory_properties = unsafe {
            instance
                .instance
                .get_physical_device_memory_properties(candidate.physical_device)
        };

        Ok(Self {
            ledger: ResourceLedger::new(),
            swapchain_loader: SwapchainLoader::new(&instance.instance, &device),
            device,
            physical_device: candidate.physical_device,
            graphics_queue,
            present_queue,
            queue_families,
            memory_properties,
        })
    }

    fn pick_physical_device(
        instance: &VulkanInstance,
        required_extensions: &[CString],
    ) -> Result<DeviceCandidate> {
        let devices = unsafe { instance.instance.enumerate_physical_devices() }
            .or_fail("enumerate physical devices")?;

        let mut candidates: Vec<DeviceCandidate> = devices
            .into_iter()
            .map(|physical_device| {
                let candidate = probe::probe_device(
                    &instance.instance,
                    &instance.surface_loader,
                    instance.surface,
                    physical_device,
                    required_extensions,
                );
                log::info!(
                    "Found physical device {} ({:?}, adequate: {})",
                    candidate.name,
                    candidate.device_type,
                    is_adequate(&candidate)
                );
                candidate
            })
            .collect();

        let examined = candidates.len();
        let chosen = select_device(&candidates)
            .ok_or(RendererError::NoSuitableDevice { examined })?;
        let candidate = candidates.swap_remove(chosen);

        log::info!("We chose to use the {} graphics card", candidate.name);
        Ok(candidate)
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        families: QueueFamilies,
        required_extensions: &[CString],
    ) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_create_families(families)
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<_> = required_extensions.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .or_fail("create the logical device")?;

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };
        debug_assert!(graphics_queue != vk::Queue::null() && present_queue != vk::Queue::null());

        Ok((device, graphics_queue, present_queue))
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.or_fail("wait for the device to go idle")
    }
}

impl DeviceApi for DeviceContext {
    /// Hand a freshly created object to the context for teardown.
    fn track(&mut self, resource: GpuResource) {
        self.ledger.track(resource);
    }

    fn graphics_family(&self) -> u32 {
        self.queue_families.graphics
    }

    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR,
    ) -> VkResult<vk::SwapchainKHR> {
        self.swapchain_loader.create_swapchain(info, None)
    }

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.swapchain_loader.get_swapchain_images(swapchain)
    }

    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        self.device.create_image_view(info, None)
    }

    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo,
    ) -> VkResult<vk::RenderPass> {
        self.device.create_render_pass(info, None)
    }

    unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout> {
        self.device.create_pipeline_layout(info, None)
    }

    unsafe fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo,
    ) -> VkResult<vk::ShaderModule> {
        self.device.create_shader_module(info, None)
    }

    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.device.destroy_shader_module(module, None);
    }

    unsafe fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        self.device
            .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(info), None)
            .map_err(|(_, result)| result)
            .and_then(|pipelines| pipelines.first().copied().ok_or(vk::Result::ERROR_UNKNOWN))
    }

    unsafe fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo,
    ) -> VkResult<vk::Framebuffer> {
        self.device.create_framebuffer(info, None)
    }

    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer> {
        self.device.create_buffer(info, None)
    }

    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        self.device.get_buffer_memory_requirements(buffer)
    }

    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VkResult<vk::DeviceMemory> {
        self.device.allocate_memory(info, None)
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
    ) -> VkResult<()> {
        self.device.bind_buffer_memory(buffer, memory, 0)
    }

    unsafe fn write_memory(&self, memory: vk::DeviceMemory, bytes: &[u8]) -> VkResult<()> {
        let ptr = self.device.map_memory(
            memory,
            0,
            bytes.len() as vk::DeviceSize,
            vk::MemoryMapFlags::empty(),
        )?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
        self.device.unmap_memory(memory);
        Ok(())
    }

    unsafe fn create_command_pool(
        &self,
        info: &vk::CommandPoolCreateInfo,
    ) -> VkResult<vk::CommandPool> {
        self.device.create_command_pool(info, None)
    }

    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        self.device.allocate_command_buffers(info)
    }

    unsafe fn create_semaphore(&self, info: &vk::SemaphoreCreateInfo) -> VkResult<vk::Semaphore> {
        self.device.create_semaphore(info, None)
    }

    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo) -> VkResult<vk::Fence> {
        self.device.create_fence(info, None)
    }
}

impl Destroy for DeviceContext {
    unsafe fn destroy(&self, resource: GpuResource) {
        let device = &self.device;
        match resource {
            GpuResource::Swapchain(swapchain) => {
                self.swapchain_loader.destroy_swapchain(swapchain, None)
            }
            GpuResource::ImageView(view) => device.destroy_image_view(view, None),
            GpuResource::RenderPass(render_pass) => device.destroy_render_pass(render_pass, None),
            GpuResource::PipelineLayout(layout) => device.destroy_pipeline_layout(layout, None),
            GpuResource::Pipeline(pipeline) => device.destroy_pipeline(pipeline, None),
            GpuResource::Framebuffer(framebuffer) => device.destroy_framebuffer(framebuffer, None),
            GpuResource::CommandPool(pool) => device.destroy_command_pool(pool, None),
            GpuResource::Buffer(buffer) => device.destroy_buffer(buffer, None),
            GpuResource::Memory(memory) => device.free_memory(memory, None),
            GpuResource::Semaphore(semaphore) => device.destroy_semaphore(semaphore, None),
            GpuResource::Fence(fence) => device.destroy_fence(fence, None),
        }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Nothing may be destroyed while the GPU still uses it.
        if let Err(e) = self.wait_idle() {
            log::error!("{}", e);
        }

        let mut ledger = std::mem::take(&mut self.ledger);
        let destroyed = unsafe { ledger.release_all(&*self) };
        log::info!("Destroyed {} device objects", destroyed);

        unsafe { self.device.destroy_device(None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::probe::{QueueFamilyIndices, SurfaceSupport};
    use ash::vk::Handle;

    fn candidate(raw: u64, device_type: vk::PhysicalDeviceType) -> DeviceCandidate {
        DeviceCandidate {
            physical_device: vk::PhysicalDevice::from_raw(raw),
            name: format!("gpu{}", raw),
            device_type,
            queue_families: QueueFamilyIndices {
                graphics: Some(0),
                present: Some(0),
            },
            supports_required_extensions: true,
            surface: SurfaceSupport {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                formats: vec![vk::SurfaceFormatKHR::default()],
                present_modes: vec![vk::PresentModeKHR::FIFO],
            },
        }
    }

    const INTEGRATED: vk::PhysicalDeviceType = vk::PhysicalDeviceType::INTEGRATED_GPU;
    const DISCRETE: vk::PhysicalDeviceType = vk::PhysicalDeviceType::DISCRETE_GPU;

    #[test]
    fn adequacy_requires_every_capability() {
        assert!(is_adequate(&candidate(1, INTEGRATED)));

        let mut no_graphics = candidate(1, INTEGRATED);
        no_graphics.queue_families.graphics = None;
        assert!(!is_adequate(&no_graphics));

        let mut no_present = candidate(1, INTEGRATED);
        no_present.queue_families.present = None;
        assert!(!is_adequate(&no_present));

        let mut no_extensions = candidate(1, INTEGRATED);
        no_extensions.supports_required_extensions = false;
        assert!(!is_adequate(&no_extensions));

        let mut no_formats = candidate(1, INTEGRATED);
        no_formats.surface.formats.clear();
        assert!(!is_adequate(&no_formats));

        let mut no_modes = candidate(1, INTEGRATED);
        no_modes.surface.present_modes.clear();
        assert!(!is_adequate(&no_modes));
    }

    #[test]
    fn nothing_selected_without_adequate_devices() {
        assert_eq!(select_device(&[]), None);

        let mut broken = candidate(1, DISCRETE);
        broken.supports_required_extensions = false;
        assert_eq!(select_device(&[broken]), None);
    }

    #[test]
    fn discrete_gpu_wins_regardless_of_order() {
        let devices = [candidate(1, INTEGRATED), candidate(2, DISCRETE)];
        assert_eq!(select_device(&devices), Some(1));

        let devices = [candidate(2, DISCRETE), candidate(1, INTEGRATED)];
        assert_eq!(select_device(&devices), Some(0));

        let devices = [
            candidate(1, INTEGRATED),
            candidate(3, vk::PhysicalDeviceType::CPU),
            candidate(2, DISCRETE),
        ];
        assert_eq!(select_device(&devices), Some(2));
    }

    #[test]
    fn inadequate_discrete_gpu_is_never_chosen() {
        let mut discrete = candidate(2, DISCRETE);
        discrete.surface.present_modes.clear();
        let devices = [discrete, candidate(1, INTEGRATED)];
        assert_eq!(select_device(&devices), Some(1));
    }

    #[test]
    fn first_adequate_device_without_discrete_gpu() {
        let mut unusable = candidate(1, INTEGRATED);
        unusable.queue_families.present = None;
        let devices = [
            unusable,
            candidate(2, vk::PhysicalDeviceType::VIRTUAL_GPU),
            candidate(3, INTEGRATED),
        ];
        assert_eq!(select_device(&devices), Some(1));
    }

    #[test]
    fn one_queue_request_per_distinct_family() {
        let shared = QueueFamilies { graphics: 0, present: 0 };
        assert_eq!(queue_create_families(shared), vec![0]);

        let split = QueueFamilies { graphics: 0, present: 2 };
        assert_eq!(queue_create_families(split), vec![0, 2]);
    }
}
