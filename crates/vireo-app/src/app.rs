//! `Application` trait definition.

use crate::context::AppContext;
use vireo_platform::Event;

/// Trait for Vireo applications.
///
/// The framework owns the window, the GPU context and the frame loop. It
/// waits for the frame slot and acquires a swapchain image before calling
/// [`tick`](Application::tick), and presents after it returns.
pub trait Application: Sized {
    /// Initialize the application.
    ///
    /// Called once, after the GPU context and the main window exist.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Record and submit one frame.
    ///
    /// A swapchain image has been acquired. Submit the recorded work with
    /// [`AppContext::submit_gfx_queue`] so that presentation waits for it.
    fn tick(&mut self, ctx: &mut AppContext) -> anyhow::Result<()>;

    /// Rebuild render passes, framebuffers and pipelines.
    ///
    /// Called whenever the main swapchain has been recreated.
    fn recreate_pipelines(&mut self, ctx: &mut AppContext) -> anyhow::Result<()>;

    /// Handle an event the frame loop did not consume.
    #[allow(unused_variables)]
    fn event_proc(&mut self, ctx: &mut AppContext, event: &Event) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release resources before shutdown. The GPU is idle.
    #[allow(unused_variables)]
    fn deinit(&mut self, ctx: &mut AppContext) {}
}
