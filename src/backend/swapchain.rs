// Swapchain - Window presentation
//
// Manages the fixed ring of images we render to and present to the screen.
// Built once at startup; the window is not resizable so it is never
// recreated.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;

use super::probe::{QueueFamilies, SurfaceSupport};
use super::resources::{DeviceApi, GpuResource};
use crate::error::{RendererError, Result, VkResultExt};

/// Prefer 8-bit BGRA sRGB with the sRGB non-linear color space, otherwise
/// whatever the surface lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

/// MAILBOX: no vsync tearing, low latency, replaces queued images
/// FIFO: vsync, guaranteed available
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Use the surface's extent, unless it leaves the choice to us (width ==
/// u32::MAX); then clamp the window's framebuffer size into the limits.
pub fn choose_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: impl FnOnce() -> vk::Extent2D,
) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    let size = framebuffer_size();
    vk::Extent2D {
        width: size
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: size
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum (0 means no maximum).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        caps.max_image_count
    } else {
        image_count
    }
}

/// How swapchain images are shared between the graphics and present queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingPolicy {
    Exclusive,
    Concurrent([u32; 2]),
}

impl SharingPolicy {
    pub fn for_families(families: QueueFamilies) -> Self {
        if families.is_shared() {
            SharingPolicy::Exclusive
        } else {
            SharingPolicy::Concurrent([families.graphics, families.present])
        }
    }

    pub fn mode(&self) -> vk::SharingMode {
        match self {
            SharingPolicy::Exclusive => vk::SharingMode::EXCLUSIVE,
            SharingPolicy::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    pub fn queue_family_indices(&self) -> &[u32] {
        match self {
            SharingPolicy::Exclusive => &[],
            SharingPolicy::Concurrent(indices) => indices,
        }
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Create the swapchain and one view per image. Every object is handed
    /// to the device context as soon as it exists.
    pub fn new(
        device: &mut impl DeviceApi,
        surface: vk::SurfaceKHR,
        support: &SurfaceSupport,
        families: QueueFamilies,
        framebuffer_size: impl FnOnce() -> vk::Extent2D,
    ) -> Result<Self> {
        let caps = support.capabilities;

        let format = choose_surface_format(&support.formats).ok_or(RendererError::Vk {
            what: "find a surface format",
            result: vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
        })?;
        let present_mode = choose_present_mode(&support.present_modes);
        if present_mode == vk::PresentModeKHR::MAILBOX {
            log::info!("Using VK_PRESENT_MODE_MAILBOX_KHR");
        }
        let extent = choose_extent(&caps, framebuffer_size);
        let image_count = choose_image_count(&caps);
        let sharing = SharingPolicy::for_families(families);

        log::info!(
            "Creating swapchain: {}x{}, {:?}/{:?}, {:?}, {} images requested, {:?}",
            extent.width,
            extent.height,
            format.format,
            format.color_space,
            present_mode,
            image_count,
            sharing
        );

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing.mode())
            .queue_family_indices(sharing.queue_family_indices())
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(false);

        let swapchain = unsafe { device.create_swapchain(&create_info) }
            .or_fail("create the swap chain")?;
        device.track(GpuResource::Swapchain(swapchain));

        // Owned by the swapchain as a unit; never destroyed individually.
        let images = unsafe { device.swapchain_images(swapchain) }
            .or_fail("get the swap chain images")?;
        log::info!("Created swapchain with {} images", images.len());

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view = create_image_view(&*device, image, format.format)?;
            device.track(GpuResource::ImageView(view));
            image_views.push(view);
        }

        Ok(Self {
            swapchain,
            images,
            image_views,
            format,
            present_mode,
            extent,
        })
    }

    /// Acquire next image for rendering. The semaphore is signaled once the
    /// image is actually ready; the returned index may arrive before that.
    pub fn acquire_next_image(
        &self,
        loader: &SwapchainLoader,
        semaphore: vk::Semaphore,
    ) -> ash::prelude::VkResult<u32> {
        let (index, suboptimal) = unsafe {
            loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }?;

        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }
        Ok(index)
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        loader: &SwapchainLoader,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> ash::prelude::VkResult<()> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => {
                if suboptimal {
                    log::debug!("Presented to a suboptimal swapchain");
                }
                Ok(())
            }
            // No recreation: the window cannot be resized.
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("Swapchain out of date on present");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn create_image_view(
    device: &impl DeviceApi,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info) }.or_fail("create an image view")
}
