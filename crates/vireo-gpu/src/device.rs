//! Physical device probing and selection.

use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Snapshot of a physical device taken at enumeration time.
#[derive(Clone)]
pub struct PhysicalDeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    /// First queue family that supports graphics, if any.
    pub graphics_queue_family: Option<u32>,
    pub name: String,
}

impl std::fmt::Debug for PhysicalDeviceCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceCandidate")
            .field("name", &self.name)
            .field("device_type", &self.properties.device_type)
            .field("graphics_queue_family", &self.graphics_queue_family)
            .finish_non_exhaustive()
    }
}

impl PhysicalDeviceCandidate {
    /// Query properties, features and queue families of `handle`.
    ///
    /// # Safety
    /// The instance must be valid and `handle` must belong to it.
    pub unsafe fn probe(instance: &ash::Instance, handle: vk::PhysicalDevice) -> Self {
        let (properties, features, families) = unsafe {
            (
                instance.get_physical_device_properties(handle),
                instance.get_physical_device_features(handle),
                instance.get_physical_device_queue_family_properties(handle),
            )
        };

        let graphics_queue_family = families
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .and_then(|index| u32::try_from(index).ok());

        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("<unnamed device>"));

        Self {
            handle,
            properties,
            features,
            graphics_queue_family,
            name,
        }
    }

    /// Build a candidate from already known parts.
    pub fn from_parts(
        handle: vk::PhysicalDevice,
        device_type: vk::PhysicalDeviceType,
        graphics_queue_family: Option<u32>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            handle,
            properties: vk::PhysicalDeviceProperties {
                device_type,
                ..Default::default()
            },
            features: vk::PhysicalDeviceFeatures::default(),
            graphics_queue_family,
            name: name.into(),
        }
    }

    /// Whether the device can run graphics work at all.
    pub const fn is_graphics_capable(&self) -> bool {
        self.graphics_queue_family.is_some()
    }

    /// Device vendor.
    pub const fn vendor(&self) -> GpuVendor {
        GpuVendor::from_vendor_id(self.properties.vendor_id)
    }

    /// Position in the selection order; higher wins.
    ///
    /// Devices without a graphics queue come last, CPU implementations come
    /// last among the rest and discrete GPUs come first.
    pub fn rank(&self) -> u8 {
        if !self.is_graphics_capable() {
            return 0;
        }
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 3,
            vk::PhysicalDeviceType::CPU => 1,
            _ => 2,
        }
    }
}

/// Pick the best candidate.
///
/// Equal candidates keep enumeration order, so the first one enumerated wins.
/// Fails with [`GpuError::NoSuitableDevice`] when nothing has a graphics queue.
pub fn select_device(candidates: Vec<PhysicalDeviceCandidate>) -> Result<PhysicalDeviceCandidate> {
    let mut best: Option<PhysicalDeviceCandidate> = None;
    for candidate in candidates {
        tracing::debug!(
            "Found GPU: {} ({:?})",
            candidate.name,
            candidate.properties.device_type
        );
        if best.as_ref().map_or(true, |b| candidate.rank() > b.rank()) {
            best = Some(candidate);
        }
    }

    best.filter(PhysicalDeviceCandidate::is_graphics_capable)
        .ok_or(GpuError::NoSuitableDevice)
}

/// Enumerate every physical device of the instance.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn enumerate_candidates(instance: &ash::Instance) -> Result<Vec<PhysicalDeviceCandidate>> {
    let devices =
        unsafe { instance.enumerate_physical_devices() }.check("enumerate physical devices")?;

    Ok(devices
        .into_iter()
        .map(|handle| unsafe { PhysicalDeviceCandidate::probe(instance, handle) })
        .collect())
}

/// Enumerate and select in one step, logging the choice.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(instance: &ash::Instance) -> Result<PhysicalDeviceCandidate> {
    let candidates = unsafe { enumerate_candidates(instance)? };
    let selected = select_device(candidates)?;

    tracing::info!(
        "Selected GPU: {} ({:?}, {:?})",
        selected.name,
        selected.vendor(),
        selected.properties.device_type
    );

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn candidate(
        raw: u64,
        device_type: vk::PhysicalDeviceType,
        graphics: bool,
    ) -> PhysicalDeviceCandidate {
        PhysicalDeviceCandidate::from_parts(
            vk::PhysicalDevice::from_raw(raw),
            device_type,
            graphics.then_some(0),
            format!("device {raw}"),
        )
    }

    #[test]
    fn discrete_beats_integrated() {
        let selected = select_device(vec![
            candidate(1, vk::PhysicalDeviceType::INTEGRATED_GPU, true),
            candidate(2, vk::PhysicalDeviceType::DISCRETE_GPU, true),
        ])
        .unwrap();
        assert_eq!(selected.handle.as_raw(), 2);
    }

    #[test]
    fn selection_is_deterministic() {
        let devices = || {
            vec![
                candidate(1, vk::PhysicalDeviceType::DISCRETE_GPU, true),
                candidate(2, vk::PhysicalDeviceType::DISCRETE_GPU, true),
                candidate(3, vk::PhysicalDeviceType::INTEGRATED_GPU, true),
            ]
        };
        for _ in 0..4 {
            assert_eq!(select_device(devices()).unwrap().handle.as_raw(), 1);
        }
    }

    #[test]
    fn graphics_queue_is_required() {
        let selected = select_device(vec![
            candidate(1, vk::PhysicalDeviceType::DISCRETE_GPU, false),
            candidate(2, vk::PhysicalDeviceType::INTEGRATED_GPU, true),
        ])
        .unwrap();
        assert_eq!(selected.handle.as_raw(), 2);
    }

    #[test]
    fn cpu_device_sorts_last_among_capable() {
        let selected = select_device(vec![
            candidate(1, vk::PhysicalDeviceType::CPU, true),
            candidate(2, vk::PhysicalDeviceType::VIRTUAL_GPU, true),
        ])
        .unwrap();
        assert_eq!(selected.handle.as_raw(), 2);

        // A CPU device is still better than nothing
        let selected = select_device(vec![
            candidate(1, vk::PhysicalDeviceType::DISCRETE_GPU, false),
            candidate(2, vk::PhysicalDeviceType::CPU, true),
        ])
        .unwrap();
        assert_eq!(selected.handle.as_raw(), 2);
    }

    #[test]
    fn no_capable_device_is_an_error() {
        let result = select_device(vec![
            candidate(1, vk::PhysicalDeviceType::DISCRETE_GPU, false),
            candidate(2, vk::PhysicalDeviceType::INTEGRATED_GPU, false),
        ]);
        assert!(matches!(result, Err(GpuError::NoSuitableDevice)));
        assert!(matches!(select_device(Vec::new()), Err(GpuError::NoSuitableDevice)));
    }

    #[test]
    fn vendor_ids() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }
}
