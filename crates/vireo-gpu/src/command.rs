//! Command pools and command buffer recording helpers.

use crate::error::{Result, VkResultExt};
use ash::vk;
use std::sync::Arc;

/// Level of an allocated command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandLevel {
    Primary,
    Secondary,
}

impl From<CommandLevel> for vk::CommandBufferLevel {
    fn from(level: CommandLevel) -> Self {
        match level {
            CommandLevel::Primary => Self::PRIMARY,
            CommandLevel::Secondary => Self::SECONDARY,
        }
    }
}

/// Creation flags for a pool whose buffers can be reset individually.
pub fn pool_flags(transient: bool) -> vk::CommandPoolCreateFlags {
    let flags = vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
    if transient {
        flags | vk::CommandPoolCreateFlags::TRANSIENT
    } else {
        flags
    }
}

/// Command pool for allocating command buffers. Destroyed on drop.
pub struct CommandPool {
    device: Arc<ash::Device>,
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a command pool on `queue_family`.
    ///
    /// # Safety
    /// The queue family must exist on the device.
    pub unsafe fn new(device: Arc<ash::Device>, queue_family: u32, transient: bool) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(pool_flags(transient));

        let pool = unsafe { device.create_command_pool(&create_info, None) }
            .check("create command pool")?;

        Ok(Self {
            device,
            pool,
            queue_family,
        })
    }

    /// Get the raw pool handle.
    pub const fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate `count` command buffers.
    pub fn allocate(&self, count: u32, level: CommandLevel) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(level.into())
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .check("allocate command buffers")
    }

    /// Reset every buffer allocated from this pool.
    ///
    /// # Safety
    /// None of the pool's buffers may be pending execution.
    pub unsafe fn reset(&self) -> Result<()> {
        // SAFETY: Caller guarantees no buffer is in flight
        unsafe {
            self.device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
        }
        .check("reset command pool")
    }

    /// Reset a single buffer.
    ///
    /// # Safety
    /// `cmd` must come from this pool and must not be pending execution.
    pub unsafe fn reset_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
        .check("reset command buffer")
    }

    /// Return buffers to the pool.
    ///
    /// # Safety
    /// The buffers must come from this pool and must not be pending execution.
    pub unsafe fn free(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        unsafe { self.device.free_command_buffers(self.pool, buffers) };
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // SAFETY: Owners wait for the device to idle before dropping pools
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    unsafe { device.begin_command_buffer(cmd, &begin_info) }.check("begin command buffer")
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe { device.end_command_buffer(cmd) }.check("end command buffer")
}

/// Submit command buffers to a queue.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn submit_command_buffers(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffers: &[vk::CommandBuffer],
    wait_semaphores: &[vk::Semaphore],
    wait_stages: &[vk::PipelineStageFlags],
    signal_semaphores: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(command_buffers)
        .wait_semaphores(wait_semaphores)
        .wait_dst_stage_mask(wait_stages)
        .signal_semaphores(signal_semaphores);

    unsafe { device.queue_submit(queue, &[submit_info], fence) }.check("queue submit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_individually_resettable() {
        assert!(pool_flags(false).contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER));
        assert!(!pool_flags(false).contains(vk::CommandPoolCreateFlags::TRANSIENT));
        assert_eq!(
            pool_flags(true),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER | vk::CommandPoolCreateFlags::TRANSIENT
        );
    }

    #[test]
    fn level_conversion() {
        assert_eq!(
            vk::CommandBufferLevel::from(CommandLevel::Secondary),
            vk::CommandBufferLevel::SECONDARY
        );
    }
}
