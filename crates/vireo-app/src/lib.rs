//! Application framework for the Vireo engine.
//!
//! This crate handles the boilerplate around a Vulkan application:
//! - Logging and fatal error handling
//! - GPU context and main window creation
//! - The frame loop: acquire, tick, present
//! - Swapchain and pipeline recreation on resize
//!
//! # Example
//!
//! ```no_run
//! use vireo_app::{run_app, AppConfig, AppContext, Application};
//!
//! struct MyApp;
//!
//! impl Application for MyApp {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn tick(&mut self, _ctx: &mut AppContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//!
//!     fn recreate_pipelines(&mut self, _ctx: &mut AppContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::new("My App"))
//! }
//! ```

mod app;
mod config;
mod context;
pub mod frame_loop;
mod runner;

pub use app::Application;
pub use config::AppConfig;
pub use context::AppContext;
pub use frame_loop::{FrameLoop, FrameOutcome};
pub use runner::run_app;

// Re-export commonly used types for convenience
pub use vireo_gpu::{GpuContext, PipelineDesc, RenderPipeline, Swapchain};
pub use vireo_platform::{Event, FullscreenState, Window};
