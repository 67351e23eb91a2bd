//! Application configuration.

use std::path::PathBuf;
use std::time::Duration;

use vireo_core::{LogConfig, Version};
use vireo_platform::{FullscreenState, WindowConfig};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title, also used as application name.
    pub title: String,
    /// Application version reported to the driver.
    pub version: Version,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    pub resizable: bool,
    /// Hide window decorations.
    pub borderless: bool,
    pub fullscreen: FullscreenState,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Upper bound for frame fence waits; `None` waits forever.
    pub fence_timeout: Option<Duration>,
    /// Clear color for the main render pass.
    pub clear_color: [f32; 4],
    /// Log directory override.
    pub log_directory: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Vireo".to_string(),
            version: Version::new(0, 1, 0),
            width: 1280,
            height: 720,
            resizable: true,
            borderless: false,
            fullscreen: FullscreenState::Normal,
            vsync: true,
            validation: cfg!(debug_assertions),
            fence_timeout: None,
            clear_color: vireo_gpu::pipeline::DEFAULT_CLEAR_COLOR,
            log_directory: None,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    pub fn with_borderless(mut self, borderless: bool) -> Self {
        self.borderless = borderless;
        self
    }

    pub fn with_fullscreen(mut self, fullscreen: FullscreenState) -> Self {
        self.fullscreen = fullscreen;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = Some(timeout);
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_log_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_directory = Some(dir.into());
        self
    }

    /// Fence timeout in nanoseconds, saturating at "forever".
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout
            .map_or(u64::MAX, |timeout| u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX))
    }

    /// Settings for the main window.
    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            resizable: self.resizable,
            borderless: self.borderless,
            fullscreen: self.fullscreen,
            vsync: self.vsync,
        }
    }

    /// Settings for the logging service.
    pub fn log_config(&self) -> LogConfig {
        let config = LogConfig::new(&self.title);
        match &self.log_directory {
            Some(dir) => config.with_directory(dir.clone()),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_timeout_defaults_to_forever() {
        assert_eq!(AppConfig::default().fence_timeout_ns(), u64::MAX);
        let config = AppConfig::default().with_fence_timeout(Duration::from_millis(5));
        assert_eq!(config.fence_timeout_ns(), 5_000_000);
    }

    #[test]
    fn window_config_mirrors_app_config() {
        let config = AppConfig::new("demo")
            .with_size(800, 600)
            .with_vsync(false)
            .with_fullscreen(FullscreenState::Borderless);
        let window = config.window_config();
        assert_eq!(window.title, "demo");
        assert_eq!((window.width, window.height), (800, 600));
        assert!(!window.vsync);
        assert_eq!(window.fullscreen, FullscreenState::Borderless);
    }

    #[test]
    fn log_config_uses_title() {
        let config = AppConfig::new("demo").with_log_directory("/tmp/demo-logs");
        let log = config.log_config();
        assert_eq!(log.app_name, "demo");
        assert_eq!(log.log_directory(), PathBuf::from("/tmp/demo-logs"));
    }
}
