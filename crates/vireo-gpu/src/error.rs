//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
///
/// Apart from the swapchain's suboptimal/out-of-date signals, which are
/// handled inside [`crate::Swapchain`], every variant is treated as fatal by
/// the frame loop driver.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error without further context.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// A checked Vulkan call failed.
    #[error("{what}: {result}")]
    VulkanCall {
        what: &'static str,
        result: vk::Result,
    },

    /// The Vulkan loader could not be found or initialised.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No physical device exposes a graphics queue.
    #[error("No suitable graphics device found")]
    NoSuitableDevice,

    /// The device stopped responding.
    #[error("Device lost during {0}")]
    DeviceLost(&'static str),

    /// A fence wait hit the configured timeout.
    #[error("Timed out waiting for frame fence {0}")]
    FenceTimeout(usize),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

/// Attach the name of the failing operation to a raw Vulkan result.
pub trait VkResultExt<T> {
    /// Convert the result, naming the operation that produced it.
    fn check(self, what: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    fn check(self, what: &'static str) -> Result<T> {
        self.map_err(|result| match result {
            vk::Result::ERROR_DEVICE_LOST => GpuError::DeviceLost(what),
            result => GpuError::VulkanCall { what, result },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_names_the_operation() {
        let err = Err::<(), _>(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
            .check("create fence")
            .unwrap_err();
        assert!(matches!(
            err,
            GpuError::VulkanCall {
                what: "create fence",
                result: vk::Result::ERROR_OUT_OF_HOST_MEMORY
            }
        ));
        assert!(err.to_string().starts_with("create fence"));
    }

    #[test]
    fn device_lost_gets_its_own_variant() {
        let err = Err::<(), _>(vk::Result::ERROR_DEVICE_LOST)
            .check("queue submit")
            .unwrap_err();
        assert!(matches!(err, GpuError::DeviceLost("queue submit")));
    }

    #[test]
    fn success_passes_through() {
        assert_eq!(Ok::<_, vk::Result>(7).check("noop").unwrap(), 7);
    }
}
