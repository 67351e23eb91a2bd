//! Application context.

use vireo_gpu::{vk, GpuContext, Swapchain};
use vireo_platform::{UserEvent, Window};
use winit::event_loop::EventLoopProxy;

use crate::config::AppConfig;

/// Everything an application needs to render into the main window.
pub struct AppContext {
    // Declared before `gpu`: the swapchain and surface must go first
    window: Window,
    gpu: GpuContext,
    config: AppConfig,
    proxy: EventLoopProxy<UserEvent>,
}

impl AppContext {
    pub(crate) const fn new(
        window: Window,
        gpu: GpuContext,
        config: AppConfig,
        proxy: EventLoopProxy<UserEvent>,
    ) -> Self {
        Self {
            window,
            gpu,
            config,
            proxy,
        }
    }

    pub const fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// The main window.
    pub const fn window(&self) -> &Window {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The main window's swapchain.
    pub const fn swapchain(&self) -> &Swapchain {
        self.window.swapchain()
    }

    /// Frame slot of the main swapchain.
    pub const fn frame_slot(&self) -> usize {
        self.window.swapchain().frame_slot()
    }

    /// Submit this frame's command buffers against the main swapchain.
    pub fn submit_gfx_queue(&self, cmds: &[vk::CommandBuffer]) -> vireo_gpu::Result<()> {
        self.gpu.submit_gfx_queue(self.window.swapchain(), cmds)
    }

    /// Ask the frame loop to stop after the current iteration.
    pub fn close(&self) {
        if self.proxy.send_event(UserEvent::Quit).is_err() {
            tracing::debug!("Event loop already closed");
        }
    }

    pub(crate) fn acquire(&mut self) -> vireo_platform::Result<bool> {
        self.window.acquire(&self.gpu)
    }

    pub(crate) fn present(&mut self) -> vireo_gpu::Result<()> {
        Swapchain::present(&self.gpu, &mut [self.window.swapchain_mut()])
    }

    pub(crate) fn recreate_swapchain(&mut self) -> vireo_platform::Result<()> {
        self.window.recreate_swapchain()
    }
}
