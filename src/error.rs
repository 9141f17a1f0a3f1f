// Error taxonomy for the renderer
//
// Every fallible backend operation returns `Result<T, RendererError>`.
// Only `main` decides to terminate the process.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

use crate::frame_loop::FrameStage;

pub type Result<T, E = RendererError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Failed to load the Vulkan library. Is Vulkan installed? ({0})")]
    Loading(#[from] ash::LoadingError),

    #[error("Failed to {what}: {result}")]
    Vk {
        what: &'static str,
        result: vk::Result,
    },

    #[error("No adequate physical device found ({examined} examined)")]
    NoSuitableDevice { examined: usize },

    #[error("No memory type satisfies {0:?}")]
    NoMemoryType(vk::MemoryPropertyFlags),

    #[error("Shader {path:?} is empty or could not be read")]
    EmptyShader { path: PathBuf },

    #[error("Shader {path:?} is not valid SPIR-V: {source}")]
    InvalidShader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame stage {stage:?} failed: {result}")]
    Frame { stage: FrameStage, result: vk::Result },

    #[error("Event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("Failed to create the window: {0}")]
    WindowCreation(#[from] winit::error::OsError),

    #[error("The event loop exited before a window was created")]
    WindowClosed,
}

/// Attach a description to a raw Vulkan result, the way `anyhow::Context`
/// reads at call sites.
pub trait VkResultExt<T> {
    fn or_fail(self, what: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for ash::prelude::VkResult<T> {
    fn or_fail(self, what: &'static str) -> Result<T> {
        self.map_err(|result| RendererError::Vk { what, result })
    }
}

impl RendererError {
    pub fn frame(stage: FrameStage) -> impl FnOnce(vk::Result) -> Self {
        move |result| RendererError::Frame { stage, result }
    }
}
