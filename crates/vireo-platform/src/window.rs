//! Native windows and their swapchains.

use crate::event::WindowId;
use crate::{PlatformError, Result};
use vireo_gpu::{GpuContext, Swapchain};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::monitor::MonitorHandle;
use winit::window::Fullscreen;

/// How a window covers its monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullscreenState {
    #[default]
    Normal,
    /// Covers the monitor without changing its video mode.
    Borderless,
    /// Takes over the monitor with its largest video mode.
    Exclusive,
}

/// Window configuration.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    /// Hide the window decorations.
    pub borderless: bool,
    pub fullscreen: FullscreenState,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vireo".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
            borderless: false,
            fullscreen: FullscreenState::Normal,
            vsync: true,
        }
    }
}

/// A native window and the swapchain presenting to it.
pub struct Window {
    // Declared first: the surface must go before the native window
    swapchain: Swapchain,
    handle: winit::window::Window,
    id: WindowId,
    fullscreen: FullscreenState,
}

impl Window {
    /// Open a window and create its swapchain.
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig, gpu: &GpuContext) -> Result<Self> {
        let attributes = winit::window::Window::default_attributes()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(config.resizable)
            .with_decorations(!config.borderless);

        let handle = event_loop
            .create_window(attributes)
            .map_err(|e| PlatformError::WindowCreation(e.to_string()))?;

        if config.fullscreen != FullscreenState::Normal {
            handle.set_fullscreen(winit_fullscreen(config.fullscreen, handle.current_monitor())?);
        }

        let size = handle.inner_size();
        let swapchain = Swapchain::new(gpu, &handle, size.width, size.height, config.vsync)?;

        let id = WindowId::from(handle.id());
        tracing::info!(
            "Window '{}' opened ({}x{}, {:?})",
            config.title,
            size.width,
            size.height,
            config.fullscreen
        );

        Ok(Self {
            swapchain,
            handle,
            id,
            fullscreen: config.fullscreen,
        })
    }

    pub const fn id(&self) -> WindowId {
        self.id
    }

    /// The native winit window.
    pub const fn raw(&self) -> &winit::window::Window {
        &self.handle
    }

    pub const fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn swapchain_mut(&mut self) -> &mut Swapchain {
        &mut self.swapchain
    }

    /// Inner size in pixels.
    pub fn size(&self) -> (u32, u32) {
        let size = self.handle.inner_size();
        (size.width, size.height)
    }

    /// Whether there is nothing to draw into, e.g. while minimised.
    pub fn is_zero_area(&self) -> bool {
        let (width, height) = self.size();
        width == 0 || height == 0
    }

    /// Recreate the swapchain at the window's current size.
    pub fn recreate_swapchain(&mut self) -> Result<()> {
        let (width, height) = self.size();
        self.swapchain.set_desired_extent(width, height);
        self.swapchain.recreate()?;
        Ok(())
    }

    /// Wait for the frame slot and acquire the next image.
    ///
    /// Returns `false` if the swapchain was recreated instead.
    pub fn acquire(&mut self, gpu: &GpuContext) -> Result<bool> {
        let (width, height) = self.size();
        self.swapchain.set_desired_extent(width, height);
        Ok(self.swapchain.next(gpu)?)
    }

    pub const fn fullscreen_state(&self) -> FullscreenState {
        self.fullscreen
    }

    /// Switch between windowed, borderless and exclusive fullscreen.
    ///
    /// The swapchain is recreated at the next acquire.
    pub fn set_fullscreen_state(&mut self, state: FullscreenState) -> Result<()> {
        if state == self.fullscreen {
            return Ok(());
        }
        let fullscreen = winit_fullscreen(state, self.handle.current_monitor())?;
        self.handle.set_fullscreen(fullscreen);
        self.fullscreen = state;
        self.swapchain.mark_needs_recreate();
        tracing::debug!("Window {:?} switched to {state:?}", self.id);
        Ok(())
    }

    pub fn set_title(&self, title: &str) {
        self.handle.set_title(title);
    }

    pub fn request_redraw(&self) {
        self.handle.request_redraw();
    }
}

fn winit_fullscreen(state: FullscreenState, monitor: Option<MonitorHandle>) -> Result<Option<Fullscreen>> {
    match state {
        FullscreenState::Normal => Ok(None),
        FullscreenState::Borderless => Ok(Some(Fullscreen::Borderless(monitor))),
        FullscreenState::Exclusive => {
            let monitor = monitor.ok_or(PlatformError::NoMonitor("exclusive fullscreen"))?;
            let mode = monitor
                .video_modes()
                .max_by_key(|mode| {
                    let size = mode.size();
                    (
                        u64::from(size.width) * u64::from(size.height),
                        mode.refresh_rate_millihertz(),
                    )
                })
                .ok_or(PlatformError::NoMonitor("exclusive fullscreen"))?;
            Ok(Some(Fullscreen::Exclusive(mode)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windowed_needs_no_monitor() {
        assert!(winit_fullscreen(FullscreenState::Normal, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn borderless_without_monitor_uses_current() {
        assert!(matches!(
            winit_fullscreen(FullscreenState::Borderless, None),
            Ok(Some(Fullscreen::Borderless(None)))
        ));
    }

    #[test]
    fn exclusive_requires_monitor() {
        assert!(matches!(
            winit_fullscreen(FullscreenState::Exclusive, None),
            Err(PlatformError::NoMonitor(_))
        ));
    }

    #[test]
    fn default_config_is_windowed() {
        let config = WindowConfig::default();
        assert_eq!(config.fullscreen, FullscreenState::Normal);
        assert!(!config.borderless);
        assert!(config.vsync);
    }
}
