//! Core types and services for the Vireo engine.
//!
//! This crate provides the pieces every other engine crate leans on:
//! - Engine and application versioning
//! - Frame-in-flight constants
//! - The process-wide logging service
//! - The fatal error path

pub mod error;
pub mod fatal;
pub mod logging;
pub mod version;

pub use error::{Error, Result};
pub use fatal::crash;
pub use logging::LogConfig;
pub use version::{Version, ENGINE_NAME, ENGINE_VERSION};

/// Engine-wide constants
pub mod constants {
    /// Number of frames the CPU may record ahead of the GPU.
    pub const MAX_FRAMES_IN_FLIGHT: usize = 3;
}
