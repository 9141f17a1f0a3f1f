// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash. Every device-level object is owned by the
// `DeviceContext` ledger; instance-level objects by `VulkanInstance`.

pub mod buffer;
pub mod commands;
pub mod device;
#[cfg(test)]
pub mod fake;
pub mod instance;
pub mod pipeline;
pub mod probe;
pub mod resources;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use device::DeviceContext;
pub use instance::VulkanInstance;
pub use swapchain::Swapchain;
pub use sync::FrameSync;
