//! Synchronization primitives and the in-flight frame ring.

use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;
use vireo_core::constants::MAX_FRAMES_IN_FLIGHT;

/// Frame slot used by the given frame number.
pub const fn slot_for(frame: u64) -> usize {
    (frame % MAX_FRAMES_IN_FLIGHT as u64) as usize
}

/// Monotonic frame counter. Its slot indexes every per-frame array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounter {
    frame: u64,
}

impl FrameCounter {
    /// Counter starting at frame zero.
    pub const fn new() -> Self {
        Self { frame: 0 }
    }

    /// Number of frames presented so far.
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Current in-flight slot, always `< MAX_FRAMES_IN_FLIGHT`.
    pub const fn slot(&self) -> usize {
        slot_for(self.frame)
    }

    /// Move to the next frame.
    pub fn advance(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }
}

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    unsafe { device.create_semaphore(&create_info, None) }.check("create semaphore")
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    unsafe { device.create_fence(&create_info, None) }.check("create fence")
}

/// Wait for the fence of `slot` to be signaled.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn wait_for_fence(
    device: &ash::Device,
    fence: vk::Fence,
    slot: usize,
    timeout_ns: u64,
) -> Result<()> {
    match unsafe { device.wait_for_fences(&[fence], true, timeout_ns) } {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(GpuError::FenceTimeout(slot)),
        Err(e) => Err(e).check("wait for frame fence"),
    }
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.reset_fences(&[fence]) }.check("reset frame fence")
}

/// Create one semaphore per in-flight slot.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore_ring(
    device: &ash::Device,
) -> Result<[vk::Semaphore; MAX_FRAMES_IN_FLIGHT]> {
    let mut ring = [vk::Semaphore::null(); MAX_FRAMES_IN_FLIGHT];
    for i in 0..MAX_FRAMES_IN_FLIGHT {
        match unsafe { create_semaphore(device) } {
            Ok(semaphore) => ring[i] = semaphore,
            Err(e) => {
                for &created in &ring[..i] {
                    // SAFETY: Created above and never submitted
                    unsafe { device.destroy_semaphore(created, None) };
                }
                return Err(e);
            }
        }
    }
    Ok(ring)
}

/// Per-slot fences and "queue finished" semaphores owned by the GPU context.
///
/// Fences start signaled so the first wait on every slot returns immediately.
pub struct FrameSyncSet {
    fences: [vk::Fence; MAX_FRAMES_IN_FLIGHT],
    queue_finished: [vk::Semaphore; MAX_FRAMES_IN_FLIGHT],
}

impl FrameSyncSet {
    /// Create the fences and semaphores for every slot.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let queue_finished = unsafe { create_semaphore_ring(device)? };

        let mut fences = [vk::Fence::null(); MAX_FRAMES_IN_FLIGHT];
        for i in 0..MAX_FRAMES_IN_FLIGHT {
            match unsafe { create_fence(device, true) } {
                Ok(fence) => fences[i] = fence,
                Err(e) => {
                    // SAFETY: None of these objects were submitted yet
                    unsafe {
                        for &fence in &fences[..i] {
                            device.destroy_fence(fence, None);
                        }
                        for &semaphore in &queue_finished {
                            device.destroy_semaphore(semaphore, None);
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            fences,
            queue_finished,
        })
    }

    /// Fence guarding `slot`.
    pub const fn fence(&self, slot: usize) -> vk::Fence {
        self.fences[slot]
    }

    /// Semaphore signaled when the work submitted for `slot` completes.
    pub const fn queue_finished(&self, slot: usize) -> vk::Semaphore {
        self.queue_finished[slot]
    }

    /// Destroy all sync objects.
    ///
    /// # Safety
    /// The device must be valid and idle.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            for &fence in &self.fences {
                device.destroy_fence(fence, None);
            }
            for &semaphore in &self.queue_finished {
                device.destroy_semaphore(semaphore, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_frame_mod_ring_size() {
        for frame in 0..20u64 {
            assert_eq!(slot_for(frame), (frame % 3) as usize);
        }
    }

    #[test]
    fn counter_stays_in_range() {
        let mut counter = FrameCounter::new();
        for _ in 0..100 {
            assert!(counter.slot() < MAX_FRAMES_IN_FLIGHT);
            counter.advance();
        }
        assert_eq!(counter.frame(), 100);
    }

    #[test]
    fn outstanding_frames_use_distinct_slots() {
        let mut counter = FrameCounter::new();
        for _ in 0..10 {
            counter.advance();
        }

        let mut window = Vec::new();
        let mut probe = counter;
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            window.push(probe.slot());
            probe.advance();
        }
        window.sort_unstable();
        window.dedup();
        assert_eq!(window.len(), MAX_FRAMES_IN_FLIGHT);

        // The slot comes back around only after a full ring
        assert_eq!(probe.slot(), counter.slot());
    }
}
