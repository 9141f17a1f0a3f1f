// Vulkan instance - loader, validation messenger and window surface
//
// Responsibilities:
// - Instance creation with the window system's surface extensions
// - Validation layer + debug messenger (debug builds, if enabled)
// - Surface creation for the window
//
// Everything here outlives the logical device, so it is torn down last.

use ash::extensions::{ext::DebugUtils, khr::Surface};
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, CStr, CString};

use crate::config::Config;
use crate::error::{Result, VkResultExt};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct VulkanInstance {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: Surface,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    entry: Entry,
}

impl VulkanInstance {
    /// Load Vulkan, create the instance (and messenger) and a surface for the
    /// given window. Anything created before a failure is destroyed on return.
    pub fn new(
        config: &Config,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> Result<Self> {
        let enable_validation = config.validation_enabled();
        log::info!(
            "Creating Vulkan instance: {} (validation {})",
            config.window.title,
            if enable_validation { "on" } else { "off" }
        );

        let entry = unsafe { Entry::load() }?;
        let instance =
            Self::create_instance(&entry, &config.window.title, display_handle, enable_validation)?;

        let mut this = Self {
            surface: vk::SurfaceKHR::null(),
            surface_loader: Surface::new(&entry, &instance),
            debug_utils: None,
            instance,
            entry,
        };

        if enable_validation {
            this.debug_utils = Some(this.setup_debug_messenger()?);
        }

        this.surface = unsafe {
            ash_window::create_surface(
                &this.entry,
                &this.instance,
                display_handle,
                window_handle,
                None,
            )
        }
        .or_fail("create the window surface")?;

        Ok(this)
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        display_handle: RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        let app_name = CString::new(app_name).unwrap_or_else(|_| c"Vulkan Triangle".to_owned());

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(display_handle)
                .or_fail("query the window system's instance extensions")?
                .to_vec();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        log::info!("Enabling the following instance extensions:");
        for &extension in &extensions {
            log::info!("\t{}", unsafe { CStr::from_ptr(extension) }.to_string_lossy());
        }

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        // Chained so that instance creation and destruction are validated too.
        let mut debug_info = debug_messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);
        if enable_validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        unsafe { entry.create_instance(&create_info, None) }.or_fail("create the Vulkan instance")
    }

    fn setup_debug_messenger(&self) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(&self.entry, &self.instance);
        let messenger = unsafe {
            debug_utils.create_debug_utils_messenger(&debug_messenger_create_info(), None)
        }
        .or_fail("create the debug messenger")?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");

        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

/// Map a validation message severity onto a log level.
fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::Level::Error,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Info,
        _ => log::Level::Debug,
    }
}

// Validation messages are diagnostics only; never abort the call.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    log::log!(
        severity_level(message_severity),
        "[VULKAN] {}",
        message.to_string_lossy()
    );

    vk::FALSE
}
