// Shader module loading
//
// Shaders are compiled to SPIR-V by build.rs and read from disk at startup.

use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::resources::DeviceApi;
use crate::error::{RendererError, Result, VkResultExt};

/// Read a compiled shader as raw bytes. A missing or unreadable file is
/// logged and comes back empty; module creation rejects it afterwards.
pub fn load_shader_bytes(path: &Path) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(bytes) => {
            log::debug!("Loaded {} bytes of SPIR-V from {}", bytes.len(), path.display());
            bytes
        }
        Err(e) => {
            log::error!("Failed to read shader {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Reinterpret shader bytes as SPIR-V words.
pub fn spirv_words(path: &Path, bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() {
        return Err(RendererError::EmptyShader {
            path: path.to_path_buf(),
        });
    }

    // read_spv copies into a correctly aligned buffer and checks the length.
    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|source| RendererError::InvalidShader {
        path: path.to_path_buf(),
        source,
    })
}

/// The caller destroys the module once the pipeline using it exists.
pub fn create_shader_module(
    device: &impl DeviceApi,
    path: &Path,
    bytes: &[u8],
) -> Result<vk::ShaderModule> {
    let code = spirv_words(path, bytes)?;
    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    unsafe { device.create_shader_module(&create_info) }.or_fail("create a shader module")
}
