//! GPU context management.

use crate::command::{
    begin_command_buffer, end_command_buffer, submit_command_buffers, CommandLevel, CommandPool,
};
use crate::device::{select_physical_device, PhysicalDeviceCandidate};
use crate::error::{GpuError, Result, VkResultExt};
use crate::instance::{create_instance, DebugMessenger};
use crate::memory::{Buffer, BufferKind, BufferUsage, GpuAllocator};
use crate::swapchain::Swapchain;
use crate::sync::{self, FrameSyncSet};
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::HasDisplayHandle;
use std::ffi::c_char;
use std::sync::Arc;
use vireo_core::Version;

/// Main GPU context: instance, selected device, the graphics queue, the
/// per-frame fences and semaphores, and the memory allocator.
pub struct GpuContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    debug_messenger: Option<DebugMessenger>,
    pub(crate) physical_device: PhysicalDeviceCandidate,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) allocator: Arc<Mutex<GpuAllocator>>,
    frame_sync: FrameSyncSet,

    pub(crate) graphics_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,

    fence_timeout: u64,
}

impl GpuContext {
    /// Get the Vulkan entry point.
    pub const fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub const fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Shared handle to the device, for objects that destroy themselves.
    pub fn device_arc(&self) -> Arc<ash::Device> {
        Arc::clone(&self.device)
    }

    /// Get the selected physical device.
    pub const fn physical_device(&self) -> &PhysicalDeviceCandidate {
        &self.physical_device
    }

    /// Get the graphics queue.
    pub const fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the graphics queue family index.
    pub const fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get access to the GPU allocator.
    pub const fn allocator(&self) -> &Arc<Mutex<GpuAllocator>> {
        &self.allocator
    }

    /// Fence guarding the given frame slot.
    pub const fn frame_fence(&self, slot: usize) -> vk::Fence {
        self.frame_sync.fence(slot)
    }

    /// Semaphore signaled when the given slot's submission finishes.
    pub const fn queue_finished(&self, slot: usize) -> vk::Semaphore {
        self.frame_sync.queue_finished(slot)
    }

    /// Timeout for frame fence waits, in nanoseconds.
    pub const fn fence_timeout(&self) -> u64 {
        self.fence_timeout
    }

    /// Create a command pool on the graphics queue family.
    pub fn create_command_pool(&self, transient: bool) -> Result<CommandPool> {
        unsafe { CommandPool::new(self.device_arc(), self.graphics_queue_family, transient) }
    }

    /// Allocate a buffer from the shared allocator.
    pub fn create_buffer(
        &self,
        kind: BufferKind,
        usage: BufferUsage,
        size: u64,
        name: &str,
    ) -> Result<Buffer> {
        Buffer::new(
            self.device_arc(),
            Arc::clone(&self.allocator),
            kind,
            usage,
            size,
            name,
        )
    }

    /// Begin recording a one-frame command buffer.
    pub fn begin_cmd(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe {
            begin_command_buffer(
                &self.device,
                cmd,
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            )
        }
    }

    /// Finish recording.
    pub fn end_cmd(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe { end_command_buffer(&self.device, cmd) }
    }

    /// Record a non-indexed draw.
    pub fn draw_cmd(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        // SAFETY: Caller records inside a render pass begun by RenderPipeline::bind_cmd
        unsafe {
            self.device.cmd_draw(
                cmd,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    /// Submit to the graphics queue without any semaphores.
    pub fn submit(&self, cmds: &[vk::CommandBuffer], fence: vk::Fence) -> Result<()> {
        unsafe {
            submit_command_buffers(
                &self.device,
                self.graphics_queue,
                cmds,
                &[],
                &[],
                &[],
                fence,
            )
        }
    }

    /// Submit a frame for `swapchain`.
    ///
    /// Waits on the swapchain's image-available semaphore at the color
    /// output stage and signals the slot's queue-finished semaphore and fence.
    pub fn submit_gfx_queue(&self, swapchain: &Swapchain, cmds: &[vk::CommandBuffer]) -> Result<()> {
        let slot = swapchain.frame_slot();
        unsafe {
            submit_command_buffers(
                &self.device,
                self.graphics_queue,
                cmds,
                &[swapchain.image_available_semaphore()],
                &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                &[self.queue_finished(slot)],
                self.frame_fence(slot),
            )
        }
    }

    /// Record commands into a temporary buffer, submit them and block until
    /// they complete.
    pub fn immediate_submit<F>(&self, pool: &CommandPool, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer) -> Result<()>,
    {
        let cmd = pool
            .allocate(1, CommandLevel::Primary)?
            .first()
            .copied()
            .ok_or_else(|| GpuError::InvalidState("no command buffer allocated".to_string()))?;

        let fence = match unsafe { sync::create_fence(&self.device, false) } {
            Ok(fence) => fence,
            Err(e) => {
                // SAFETY: cmd was never submitted
                unsafe { pool.free(&[cmd]) };
                return Err(e);
            }
        };

        let result = self
            .begin_cmd(cmd)
            .and_then(|()| record(cmd))
            .and_then(|()| self.end_cmd(cmd))
            .and_then(|()| self.submit(&[cmd], fence))
            .and_then(|()| unsafe {
                sync::wait_for_fence(&self.device, fence, 0, self.fence_timeout)
            });

        // SAFETY: The fence has signaled, or nothing was submitted
        unsafe {
            if result.is_err() {
                let _ = self.device.device_wait_idle();
            }
            self.device.destroy_fence(fence, None);
            pool.free(&[cmd]);
        }

        result
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.check("wait for device idle")
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // SAFETY: Swapchains, pipelines and buffers are dropped before the context
        unsafe {
            let _ = self.device.device_wait_idle();

            self.frame_sync.destroy(&self.device);

            // Frees all VkDeviceMemory, so it must precede the device
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);

            if let Some(messenger) = self.debug_messenger.take() {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
        tracing::debug!("GPU context destroyed");
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    app_version: Version,
    enable_validation: bool,
    fence_timeout: u64,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Vireo".to_string(),
            app_version: Version::new(0, 1, 0),
            enable_validation: cfg!(debug_assertions),
            fence_timeout: u64::MAX,
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set the application version reported to the driver.
    pub fn app_version(mut self, version: Version) -> Self {
        self.app_version = version;
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Timeout for frame fence waits, in nanoseconds.
    pub fn fence_timeout(mut self, timeout_ns: u64) -> Self {
        self.fence_timeout = timeout_ns;
        self
    }

    /// Build the GPU context for windows on `display`.
    pub fn build(self, display: &impl HasDisplayHandle) -> Result<GpuContext> {
        let display = display
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?
            .as_raw();

        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let (instance, debug_messenger) = unsafe {
            create_instance(
                &entry,
                &self.app_name,
                self.app_version,
                display,
                self.enable_validation,
            )?
        };

        // From here on every failure has to release the instance
        let destroy_instance = |instance: &ash::Instance, messenger: Option<DebugMessenger>| {
            // SAFETY: No child objects of the instance remain
            unsafe {
                if let Some(messenger) = messenger {
                    messenger.destroy();
                }
                instance.destroy_instance(None);
            }
        };

        let physical_device = match unsafe { select_physical_device(&instance) } {
            Ok(device) => device,
            Err(e) => {
                destroy_instance(&instance, debug_messenger);
                return Err(e);
            }
        };

        let Some(graphics_queue_family) = physical_device.graphics_queue_family else {
            destroy_instance(&instance, debug_messenger);
            return Err(GpuError::NoSuitableDevice);
        };

        let device = match unsafe { create_device(&instance, &physical_device, graphics_queue_family) } {
            Ok(device) => Arc::new(device),
            Err(e) => {
                destroy_instance(&instance, debug_messenger);
                return Err(e);
            }
        };

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

        let resources = unsafe { FrameSyncSet::new(&device) }.and_then(|frame_sync| {
            match unsafe { GpuAllocator::new(&instance, Arc::clone(&device), physical_device.handle) } {
                Ok(allocator) => Ok((frame_sync, allocator)),
                Err(e) => {
                    unsafe { frame_sync.destroy(&device) };
                    Err(e)
                }
            }
        });

        let (frame_sync, allocator) = match resources {
            Ok(resources) => resources,
            Err(e) => {
                // SAFETY: The device has no remaining child objects
                unsafe { device.destroy_device(None) };
                destroy_instance(&instance, debug_messenger);
                return Err(e);
            }
        };

        tracing::info!(
            "GPU context ready on {} (graphics family {graphics_queue_family})",
            physical_device.name
        );

        Ok(GpuContext {
            entry,
            instance,
            debug_messenger,
            physical_device,
            device,
            allocator: Arc::new(Mutex::new(allocator)),
            frame_sync,
            graphics_queue_family,
            graphics_queue,
            fence_timeout: self.fence_timeout,
        })
    }
}

/// Device extensions the renderer needs.
fn required_device_extensions() -> Vec<*const c_char> {
    #[allow(unused_mut)]
    let mut extensions = vec![ash::khr::swapchain::NAME.as_ptr()];

    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_subset::NAME.as_ptr());

    extensions
}

/// Create the logical device with a single graphics queue.
///
/// # Safety
/// The instance must be valid and own the physical device.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: &PhysicalDeviceCandidate,
    graphics_queue_family: u32,
) -> Result<ash::Device> {
    let queue_priority = 1.0_f32;
    let queue_create_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(graphics_queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority));

    let extension_names = required_device_extensions();

    // Line and point polygon modes need this feature
    let features = vk::PhysicalDeviceFeatures::default()
        .fill_mode_non_solid(physical_device.features.fill_mode_non_solid == vk::TRUE);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(std::slice::from_ref(&queue_create_info))
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    unsafe { instance.create_device(physical_device.handle, &device_create_info, None) }
        .check("create logical device")
}
