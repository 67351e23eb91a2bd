//! Vulkan layer of the Vireo engine.
//!
//! This crate provides:
//! - Instance creation with optional validation routed to `tracing`
//! - Physical device selection and the GPU context
//! - Per-frame synchronization for `MAX_FRAMES_IN_FLIGHT` frames
//! - Swapchains with batched presentation
//! - Render pipelines with per-image framebuffers
//! - Command pools, typed buffers and SPIR-V loading

pub mod command;
pub mod context;
pub mod device;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use ash::vk;
pub use command::{CommandLevel, CommandPool};
pub use context::{GpuContext, GpuContextBuilder};
pub use device::{select_device, GpuVendor, PhysicalDeviceCandidate};
pub use error::{GpuError, Result};
pub use memory::{Buffer, BufferKind, BufferUsage, GpuAllocator};
pub use pipeline::{PipelineDesc, RenderPipeline};
pub use shader::load_shader_from_disk;
pub use swapchain::{Swapchain, SwapchainStatus};
pub use sync::FrameCounter;
