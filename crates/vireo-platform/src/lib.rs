//! Platform layer of the Vireo engine.
//!
//! Provides windows that own their swapchain, and the closed set of events
//! the frame loop reacts to, translated from winit.

pub mod event;
pub mod window;

pub use event::{translate_window_event, Event, UserEvent, WindowId};
pub use window::{FullscreenState, Window, WindowConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("No monitor available for {0}")]
    NoMonitor(&'static str),
    #[error(transparent)]
    Gpu(#[from] vireo_gpu::GpuError),
}

pub type Result<T> = std::result::Result<T, PlatformError>;
