// Capability probing of candidate GPUs
//
// Read-only queries: queue families, device extensions and what the surface
// supports on a given physical device. A failing query yields empty results
// so the device is simply excluded by the selector.

use ash::extensions::khr::Surface;
use ash::vk;
use std::ffi::{CStr, CString};

/// Queue family indices as discovered; either may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn resolve(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Fully resolved queue families of the selected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// What a surface supports on one physical device.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A swapchain can be built with at least one format and one mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub physical_device: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: QueueFamilyIndices,
    pub supports_required_extensions: bool,
    pub surface: SurfaceSupport,
}

/// First family with graphics support, and first family that can present.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in (0u32..).zip(families) {
        if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(index);
        }
        if indices.present.is_none() && supports_present(index) {
            indices.present = Some(index);
        }
        if indices.resolve().is_some() {
            break;
        }
    }

    indices
}

/// Whether every required extension name appears in `available`.
pub fn supports_extensions<'a>(
    available: impl IntoIterator<Item = &'a CStr>,
    required: &[CString],
) -> bool {
    let available: Vec<&CStr> = available.into_iter().collect();
    required
        .iter()
        .all(|name| available.contains(&name.as_c_str()))
}

pub fn query_surface_support(
    surface_loader: &Surface,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> SurfaceSupport {
    unsafe {
        SurfaceSupport {
            capabilities: surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .unwrap_or_else(|e| {
                    log::warn!("Surface capability query failed: {}", e);
                    vk::SurfaceCapabilitiesKHR::default()
                }),
            formats: surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .unwrap_or_default(),
            present_modes: surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .unwrap_or_default(),
        }
    }
}

/// Gather everything the selector needs to judge one physical device.
pub fn probe_device(
    instance: &ash::Instance,
    surface_loader: &Surface,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    required_extensions: &[CString],
) -> DeviceCandidate {
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    let queue_families = find_queue_families(&families, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(physical_device, index, surface)
            .unwrap_or(false)
    });

    let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
        .unwrap_or_else(|e| {
            log::warn!("Extension query for {} failed: {}", name, e);
            Vec::new()
        });
    let supports_required_extensions = supports_extensions(
        extensions
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }),
        required_extensions,
    );

    DeviceCandidate {
        physical_device,
        name,
        device_type: properties.device_type,
        queue_families,
        supports_required_extensions,
        surface: query_surface_support(surface_loader, physical_device, surface),
    }
}
