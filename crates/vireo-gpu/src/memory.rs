//! GPU memory management and typed buffers.

use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::sync::Arc;

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
            device,
        })
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("allocator already shut down".to_string()))
    }

    /// Create a buffer and bind freshly allocated memory to it.
    pub fn allocate_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<(vk::Buffer, Allocation)> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }.check("create buffer")?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match self.inner()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(GpuError::AllocationFailed(e.to_string()));
            }
        };

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            unsafe { self.device.destroy_buffer(buffer, None) };
            let _ = self.inner()?.free(allocation);
            return Err(e).check("bind buffer memory");
        }

        Ok((buffer, allocation))
    }

    /// Destroy a buffer and release its memory.
    pub fn free_buffer(&mut self, buffer: vk::Buffer, allocation: Allocation) -> Result<()> {
        unsafe { self.device.destroy_buffer(buffer, None) };
        self.inner()?
            .free(allocation)
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    /// Free all GPU memory. Must run before the device is destroyed;
    /// outstanding allocations are reported as leaks.
    pub fn shutdown(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            drop(allocator);
        }
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
}

/// Where a buffer lives and how it is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Host-visible source for transfers.
    Staging,
    /// Device-local transfer destination.
    Gpu,
}

/// Vulkan usage flags for a buffer of this kind and usage.
pub fn usage_flags(kind: BufferKind, usage: BufferUsage) -> vk::BufferUsageFlags {
    let kind_flag = match kind {
        BufferKind::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferKind::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        BufferKind::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
    };
    let transfer = match usage {
        BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        BufferUsage::Gpu => vk::BufferUsageFlags::TRANSFER_DST,
    };
    kind_flag | transfer
}

/// Memory location for a buffer of this kind and usage.
pub const fn memory_location(kind: BufferKind, usage: BufferUsage) -> MemoryLocation {
    match (kind, usage) {
        (BufferKind::Uniform, _) | (_, BufferUsage::Staging) => MemoryLocation::CpuToGpu,
        _ => MemoryLocation::GpuOnly,
    }
}

/// Whether `len` bytes starting at `offset` fit in a buffer of `capacity` bytes.
pub const fn range_fits(offset: u64, len: u64, capacity: u64) -> bool {
    match offset.checked_add(len) {
        Some(end) => end <= capacity,
        None => false,
    }
}

/// A buffer with its own allocation, freed on drop.
///
/// Buffers share the allocator with the GPU context and must be dropped
/// before it.
pub struct Buffer {
    device: Arc<ash::Device>,
    allocator: Arc<Mutex<GpuAllocator>>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    kind: BufferKind,
    usage: BufferUsage,
}

impl Buffer {
    /// Allocate a buffer of `size` bytes.
    pub fn new(
        device: Arc<ash::Device>,
        allocator: Arc<Mutex<GpuAllocator>>,
        kind: BufferKind,
        usage: BufferUsage,
        size: u64,
        name: &str,
    ) -> Result<Self> {
        if size == 0 {
            return Err(GpuError::InvalidState(format!(
                "buffer '{name}' has zero size"
            )));
        }

        let (buffer, allocation) = allocator.lock().allocate_buffer(
            size,
            usage_flags(kind, usage),
            memory_location(kind, usage),
            name,
        )?;

        tracing::trace!("Allocated {kind:?}/{usage:?} buffer '{name}' ({size} bytes)");

        Ok(Self {
            device,
            allocator,
            buffer,
            allocation: Some(allocation),
            size,
            kind,
            usage,
        })
    }

    /// Raw handle.
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes.
    pub const fn size(&self) -> u64 {
        self.size
    }

    pub const fn kind(&self) -> BufferKind {
        self.kind
    }

    pub const fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Copy `data` into the mapped memory of a staging buffer at `offset` bytes.
    pub fn write<T: bytemuck::Pod>(&self, offset: u64, data: &[T]) -> Result<()> {
        if self.usage != BufferUsage::Staging {
            return Err(GpuError::InvalidState(
                "only staging buffers can be written from the host".to_string(),
            ));
        }

        let bytes: &[u8] = bytemuck::cast_slice(data);
        if !range_fits(offset, bytes.len() as u64, self.size) {
            return Err(GpuError::InvalidState("write exceeds buffer size".to_string()));
        }

        let ptr = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| GpuError::InvalidState("staging buffer is not mapped".to_string()))?;

        let offset = usize::try_from(offset)
            .map_err(|_| GpuError::InvalidState("write offset out of range".to_string()))?;

        // SAFETY: Write range was checked against the mapped allocation
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                ptr.as_ptr().cast::<u8>().add(offset),
                bytes.len(),
            );
        }
        Ok(())
    }

    /// Record a copy of `size` bytes from a staging buffer into this one.
    ///
    /// # Safety
    /// `cmd` must be in the recording state.
    pub unsafe fn copy_from(
        &self,
        cmd: vk::CommandBuffer,
        staging: &Self,
        size: u64,
        src_offset: u64,
        dst_offset: u64,
    ) -> Result<()> {
        if staging.kind != self.kind {
            return Err(GpuError::InvalidState(format!(
                "cannot copy a {:?} buffer into a {:?} buffer",
                staging.kind, self.kind
            )));
        }
        if staging.usage != BufferUsage::Staging || self.usage != BufferUsage::Gpu {
            return Err(GpuError::InvalidState(
                "copies go from a staging buffer to a GPU buffer".to_string(),
            ));
        }
        if !range_fits(src_offset, size, staging.size) || !range_fits(dst_offset, size, self.size) {
            return Err(GpuError::InvalidState("copy exceeds buffer size".to_string()));
        }

        let region = vk::BufferCopy::default()
            .src_offset(src_offset)
            .dst_offset(dst_offset)
            .size(size);

        unsafe {
            self.device
                .cmd_copy_buffer(cmd, staging.buffer, self.buffer, &[region]);
        }
        Ok(())
    }

    /// Record a vertex buffer bind for each buffer, starting at `first_binding`.
    ///
    /// # Safety
    /// `cmd` must be in the recording state.
    pub unsafe fn bind_vertex_buffers(
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[&Self],
        offsets: &[u64],
    ) -> Result<()> {
        let Some(first) = buffers.first() else {
            return Ok(());
        };
        if buffers.len() != offsets.len() {
            return Err(GpuError::InvalidState(
                "vertex buffer and offset counts differ".to_string(),
            ));
        }
        if buffers
            .iter()
            .any(|b| b.kind != BufferKind::Vertex || b.usage != BufferUsage::Gpu)
        {
            return Err(GpuError::InvalidState(
                "only GPU vertex buffers can be bound as vertex input".to_string(),
            ));
        }

        let handles: Vec<vk::Buffer> = buffers.iter().map(|b| b.buffer).collect();
        unsafe {
            first
                .device
                .cmd_bind_vertex_buffers(cmd, first_binding, &handles, offsets);
        }
        Ok(())
    }

    /// Record an index buffer bind with 32-bit indices.
    ///
    /// # Safety
    /// `cmd` must be in the recording state.
    pub unsafe fn bind_index_buffer(cmd: vk::CommandBuffer, buffer: &Self, offset: u64) -> Result<()> {
        if buffer.kind != BufferKind::Index || buffer.usage != BufferUsage::Gpu {
            return Err(GpuError::InvalidState(
                "only GPU index buffers can be bound as index input".to_string(),
            ));
        }
        unsafe {
            buffer
                .device
                .cmd_bind_index_buffer(cmd, buffer.buffer, offset, vk::IndexType::UINT32);
        }
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.allocator.lock().free_buffer(self.buffer, allocation) {
                tracing::warn!("Failed to free buffer: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_buffers_are_transfer_sources() {
        let flags = usage_flags(BufferKind::Vertex, BufferUsage::Staging);
        assert!(flags.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
        assert!(flags.contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(!flags.contains(vk::BufferUsageFlags::TRANSFER_DST));
    }

    #[test]
    fn gpu_buffers_are_transfer_destinations() {
        let flags = usage_flags(BufferKind::Index, BufferUsage::Gpu);
        assert_eq!(
            flags,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
        );
    }

    #[test]
    fn memory_locations() {
        assert_eq!(
            memory_location(BufferKind::Vertex, BufferUsage::Staging),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            memory_location(BufferKind::Vertex, BufferUsage::Gpu),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            memory_location(BufferKind::Index, BufferUsage::Gpu),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            memory_location(BufferKind::Uniform, BufferUsage::Gpu),
            MemoryLocation::CpuToGpu
        );
    }

    #[test]
    fn ranges_within_capacity_fit() {
        assert!(range_fits(0, 64, 64));
        assert!(range_fits(16, 48, 64));
        assert!(range_fits(64, 0, 64));
        assert!(!range_fits(16, 49, 64));
        assert!(!range_fits(65, 0, 64));
    }

    #[test]
    fn overflowing_ranges_do_not_fit() {
        assert!(!range_fits(1, u64::MAX, u64::MAX));
        assert!(!range_fits(u64::MAX, 1, u64::MAX));
    }
}
