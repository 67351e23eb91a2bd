//! Vulkan instance creation and the validation message callback.

use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, c_void, CStr, CString};
use vireo_core::{Version, ENGINE_NAME, ENGINE_VERSION};

/// Standard validation layer, enabled in debug configurations.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Debug utils messenger together with the loader that created it.
pub struct DebugMessenger {
    pub loader: ash::ext::debug_utils::Instance,
    pub messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Destroy the messenger.
    ///
    /// # Safety
    /// The owning instance must still be alive.
    pub unsafe fn destroy(&self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

/// Instance extensions required to present to the given display.
pub fn required_instance_extensions(display: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    let extensions = ash_window::enumerate_required_extensions(display)
        .check("enumerate surface extensions")?;

    #[allow(unused_mut)]
    let mut extensions = extensions.to_vec();

    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
        extensions.push(ash::khr::get_physical_device_properties2::NAME.as_ptr());
    }

    Ok(extensions)
}

/// Check whether the validation layer is installed.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn validation_layer_available(entry: &ash::Entry) -> bool {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
    layers
        .iter()
        .any(|props| props.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER))
}

/// Create a Vulkan instance, plus a debug messenger when validation is on.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    app_version: Version,
    display: RawDisplayHandle,
    enable_validation: bool,
) -> Result<(ash::Instance, Option<DebugMessenger>)> {
    let app_name = CString::new(app_name)
        .map_err(|_| GpuError::InvalidState("application name contains a NUL byte".into()))?;
    let engine_name = CString::new(ENGINE_NAME)
        .map_err(|_| GpuError::InvalidState("engine name contains a NUL byte".into()))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(app_version.packed())
        .engine_name(&engine_name)
        .engine_version(ENGINE_VERSION.packed())
        .api_version(vk::API_VERSION_1_3);

    let mut extension_names = required_instance_extensions(display)?;

    let enable_validation = enable_validation && unsafe { validation_layer_available(entry) };
    if enable_validation {
        extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    let layer_names: Vec<*const c_char> = if enable_validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let mut messenger_info = debug_messenger_create_info();

    let mut create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    // Chaining the messenger info also captures messages from instance creation.
    if enable_validation {
        create_info = create_info.push_next(&mut messenger_info);
    }

    let instance = unsafe { entry.create_instance(&create_info, None) }.check("create instance")?;

    let messenger = if enable_validation {
        let loader = ash::ext::debug_utils::Instance::new(entry, &instance);
        let info = debug_messenger_create_info();
        match unsafe { loader.create_debug_utils_messenger(&info, None) } {
            Ok(messenger) => Some(DebugMessenger { loader, messenger }),
            Err(e) => {
                // SAFETY: Nothing else references the instance yet
                unsafe { instance.destroy_instance(None) };
                return Err(GpuError::VulkanCall {
                    what: "create debug messenger",
                    result: e,
                });
            }
        }
    } else {
        None
    };

    tracing::debug!(
        "Vulkan instance created (validation: {})",
        if enable_validation { "on" } else { "off" }
    );

    Ok((instance, messenger))
}

fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(validation_callback))
}

unsafe extern "system" fn validation_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    // SAFETY: The loader passes a valid callback data pointer for the duration of the call
    let message = unsafe {
        callback_data
            .as_ref()
            .filter(|data| !data.p_message.is_null())
            .map(|data| CStr::from_ptr(data.p_message).to_string_lossy())
    }
    .unwrap_or_default();

    let kind = message_type_name(message_type);

    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            tracing::error!(target: "vireo_gpu::validation", "[{kind}] {message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(target: "vireo_gpu::validation", "[{kind}] {message}");
        }
        _ => {
            tracing::trace!(target: "vireo_gpu::validation", "[{kind}] {message}");
        }
    }

    vk::FALSE
}

fn message_type_name(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_names() {
        assert_eq!(
            message_type_name(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION),
            "validation"
        );
        assert_eq!(
            message_type_name(
                vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                    | vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            ),
            "performance"
        );
        assert_eq!(
            message_type_name(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL),
            "general"
        );
    }
}
