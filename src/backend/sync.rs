// Synchronization primitives
//
// A single frame in flight: one fence guards the CPU against reusing the
// command buffer, two semaphores order acquire -> render -> present on the GPU.

use ash::vk;

use super::resources::{DeviceApi, GpuResource};
use crate::error::{Result, VkResultExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &mut impl DeviceApi) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signaled so the first frame does not wait forever.
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let image_available = unsafe { device.create_semaphore(&semaphore_info) }
            .or_fail("create the image-available semaphore")?;
        device.track(GpuResource::Semaphore(image_available));

        let render_finished = unsafe { device.create_semaphore(&semaphore_info) }
            .or_fail("create the render-finished semaphore")?;
        device.track(GpuResource::Semaphore(render_finished));

        let in_flight = unsafe { device.create_fence(&fence_info) }
            .or_fail("create the in-flight fence")?;
        device.track(GpuResource::Fence(in_flight));

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }
}
