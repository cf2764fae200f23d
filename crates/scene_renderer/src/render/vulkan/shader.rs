//! SPIR-V shader modules

use std::io::Cursor;
use std::path::Path;

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a module from SPIR-V bytes
    pub fn from_bytes(device: Device, bytes: &[u8]) -> VulkanResult<Self> {
        let code = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid SPIR-V: {}", e)))?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe { device.create_shader_module(&create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { device, module })
    }

    /// Load a module from a SPIR-V file; a missing file is an error
    pub fn from_file<P: AsRef<Path>>(device: Device, path: P) -> VulkanResult<Self> {
        let bytes = read_shader(path.as_ref())?;
        Self::from_bytes(device, &bytes)
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

fn read_shader(path: &Path) -> VulkanResult<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|source| VulkanError::ShaderLoad {
        path: path.display().to_string(),
        source,
    })?;
    log::debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_shader_reports_path() {
        let error = read_shader(Path::new("definitely/not/here.spv")).unwrap_err();
        assert!(matches!(error, VulkanError::ShaderLoad { .. }));
        assert!(error.to_string().contains("definitely/not/here.spv"));
    }
}
