//! Application runner and event loop.

use tracing::info;
use vireo_gpu::GpuContextBuilder;
use vireo_platform::{translate_window_event, Event, UserEvent, Window};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::window::WindowId;

use crate::app::Application;
use crate::config::AppConfig;
use crate::context::AppContext;
use crate::frame_loop::{Dispatch, FrameLoop, FrameOutcome, FrameTarget};

/// Run an [`Application`] with the given configuration.
///
/// Initializes logging, creates the GPU context and the main window, and runs
/// the event loop until the application exits. Failures after logging is up
/// are fatal and go through [`vireo_core::crash`].
pub fn run_app<A: Application + 'static>(config: AppConfig) -> anyhow::Result<()> {
    let log_path = vireo_core::logging::init(&config.log_config())?;
    info!(
        "{} {} starting on {} {} (log: {})",
        config.title,
        config.version,
        vireo_core::ENGINE_NAME,
        vireo_core::ENGINE_VERSION,
        log_path.display()
    );

    let event_loop = match EventLoop::<UserEvent>::with_user_event().build() {
        Ok(event_loop) => event_loop,
        Err(e) => vireo_core::crash(format!("Failed to create event loop: {e}")),
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        proxy: event_loop.create_proxy(),
        config,
        state: None,
    };

    if let Err(e) = event_loop.run_app(&mut runner) {
        vireo_core::crash(format!("Event loop error: {e}"));
    }

    info!("Shutdown complete");
    vireo_core::logging::flush();
    Ok(())
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<A: Application> {
    config: AppConfig,
    proxy: EventLoopProxy<UserEvent>,
    state: Option<AppState<A>>,
}

/// Internal application state.
struct AppState<A: Application> {
    // Dropped before the context: application resources reference the device
    app: A,
    ctx: AppContext,
    frame_loop: FrameLoop,
}

/// Borrows the application and its context for one frame.
struct FrameDriver<'a, A> {
    app: &'a mut A,
    ctx: &'a mut AppContext,
}

impl<A: Application> FrameTarget for FrameDriver<'_, A> {
    fn rebuild_swapchain(&mut self) -> anyhow::Result<()> {
        Ok(self.ctx.recreate_swapchain()?)
    }

    fn rebuild_pipelines(&mut self) -> anyhow::Result<()> {
        self.app.recreate_pipelines(self.ctx)
    }

    fn acquire(&mut self) -> anyhow::Result<bool> {
        Ok(self.ctx.acquire()?)
    }

    fn tick(&mut self) -> anyhow::Result<()> {
        self.app.tick(self.ctx)
    }

    fn present(&mut self) -> anyhow::Result<()> {
        Ok(self.ctx.present()?)
    }
}

impl<A: Application + 'static> ApplicationHandler<UserEvent> for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready");
            }
            Err(e) => vireo_core::crash(format!("Failed to initialize application: {e:#}")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };

        if matches!(event, WindowEvent::RedrawRequested) {
            if let Err(e) = state.run_frame() {
                vireo_core::crash(format!("Frame failed: {e:#}"));
            }
        } else {
            let event = translate_window_event(id.into(), &event);
            state.dispatch(&event);
        }

        self.exit_if_stopped(event_loop);
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: UserEvent) {
        if let Some(state) = &mut self.state {
            state.dispatch(&Event::from(event));
        }
        self.exit_if_stopped(event_loop);
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            if state.frame_loop.is_running() {
                state.ctx.window().request_redraw();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

impl<A: Application + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .app_version(self.config.version)
            .validation(self.config.validation)
            .fence_timeout(self.config.fence_timeout_ns())
            .build(event_loop)?;

        let window = Window::new(event_loop, &self.config.window_config(), &gpu)?;
        let frame_loop = FrameLoop::new(window.id()).with_zero_area(window.is_zero_area());

        let mut ctx = AppContext::new(window, gpu, self.config.clone(), self.proxy.clone());
        let app = A::init(&mut ctx)?;

        Ok(AppState {
            app,
            ctx,
            frame_loop,
        })
    }

    fn exit_if_stopped(&mut self, event_loop: &ActiveEventLoop) {
        if self
            .state
            .as_ref()
            .is_some_and(|state| !state.frame_loop.is_running())
        {
            self.shutdown();
            event_loop.exit();
        }
    }

    fn shutdown(&mut self) {
        let Some(mut state) = self.state.take() else {
            return;
        };

        info!("Starting cleanup...");
        if let Err(e) = state.ctx.gpu().wait_idle() {
            vireo_core::crash(format!("Failed to wait for device idle: {e}"));
        }
        state.app.deinit(&mut state.ctx);
        drop(state);
        info!("Cleanup complete");
    }
}

impl<A: Application> AppState<A> {
    fn run_frame(&mut self) -> anyhow::Result<()> {
        let mut driver = FrameDriver {
            app: &mut self.app,
            ctx: &mut self.ctx,
        };
        let outcome = self.frame_loop.run_iteration(&mut driver)?;
        if outcome == FrameOutcome::Rebuilt {
            tracing::debug!(
                "Swapchain recreated at {}x{}",
                self.ctx.swapchain().extent().width,
                self.ctx.swapchain().extent().height
            );
        }
        Ok(())
    }

    fn dispatch(&mut self, event: &Event) {
        if self.frame_loop.handle(event) == Dispatch::Forward {
            if let Err(e) = self.app.event_proc(&mut self.ctx, event) {
                vireo_core::crash(format!("Event handling failed: {e:#}"));
            }
        }
    }
}
