//! Frame scheduling.
//!
//! [`FrameLoop`] decides, from the events seen since the last frame, whether
//! the next iteration draws, skips or rebuilds. The GPU work itself is done by
//! a [`FrameTarget`].

use vireo_platform::{Event, WindowId};

/// The work a frame iteration can ask for.
pub trait FrameTarget {
    /// Recreate the main window's swapchain at its current size.
    fn rebuild_swapchain(&mut self) -> anyhow::Result<()>;
    /// Rebuild everything that depends on the swapchain images.
    fn rebuild_pipelines(&mut self) -> anyhow::Result<()>;
    /// Wait for the frame slot and acquire an image. `false` means the
    /// swapchain was recreated and the frame must be skipped.
    fn acquire(&mut self) -> anyhow::Result<bool>;
    /// Record and submit the frame.
    fn tick(&mut self) -> anyhow::Result<()>;
    /// Present and advance the frame counter.
    fn present(&mut self) -> anyhow::Result<()>;
}

/// Whether an event was consumed by the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// Pass the event on to the application.
    Forward,
}

/// What a call to [`FrameLoop::run_iteration`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Drawn,
    /// Minimised or zero-sized: nothing was acquired.
    Skipped,
    /// The swapchain was not ready; pipelines were rebuilt instead.
    Rebuilt,
    /// The loop has been asked to stop.
    Stopped,
}

/// Frame loop state for the main window.
#[derive(Debug, Clone)]
pub struct FrameLoop {
    main_window: WindowId,
    running: bool,
    minimised: bool,
    zero_area: bool,
    swapchain_dirty: bool,
}

impl FrameLoop {
    pub const fn new(main_window: WindowId) -> Self {
        Self {
            main_window,
            running: true,
            minimised: false,
            zero_area: false,
            swapchain_dirty: false,
        }
    }

    /// Start out skipping frames if the window has no drawable area yet.
    ///
    /// The first non-zero resize then rebuilds the swapchain.
    pub const fn with_zero_area(mut self, zero_area: bool) -> Self {
        self.zero_area = zero_area;
        self.swapchain_dirty = zero_area;
        self
    }

    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the next iteration would try to draw.
    pub const fn should_draw(&self) -> bool {
        self.running && !self.minimised && !self.zero_area
    }

    /// Update the loop state from an event.
    ///
    /// Resizes only mark the swapchain dirty, so any number of them before
    /// the next frame cost a single rebuild. [`Event::Noop`] is dropped.
    pub fn handle(&mut self, event: &Event) -> Dispatch {
        match *event {
            Event::Noop => Dispatch::Handled,
            Event::Quit => {
                tracing::info!("Quit requested");
                self.running = false;
                Dispatch::Handled
            }
            Event::WindowClosed { id } if id == self.main_window => {
                tracing::info!("Main window closed");
                self.running = false;
                Dispatch::Handled
            }
            Event::WindowMinimise { id, minimised } if id == self.main_window => {
                tracing::debug!(
                    "Main window {}",
                    if minimised { "minimised" } else { "restored" }
                );
                self.minimised = minimised;
                Dispatch::Handled
            }
            Event::WindowResize { id, width, height } if id == self.main_window => {
                self.zero_area = width == 0 || height == 0;
                if !self.zero_area {
                    self.swapchain_dirty = true;
                }
                tracing::trace!("Main window resized to {width}x{height}");
                Dispatch::Handled
            }
            Event::WindowClosed { .. } | Event::WindowMinimise { .. } | Event::WindowResize { .. } => {
                Dispatch::Forward
            }
        }
    }

    /// Run one frame: rebuild if needed, acquire, tick and present.
    pub fn run_iteration(&mut self, target: &mut impl FrameTarget) -> anyhow::Result<FrameOutcome> {
        if !self.running {
            return Ok(FrameOutcome::Stopped);
        }
        if self.minimised || self.zero_area {
            return Ok(FrameOutcome::Skipped);
        }

        if self.swapchain_dirty {
            self.swapchain_dirty = false;
            target.rebuild_swapchain()?;
            target.rebuild_pipelines()?;
        }

        if !target.acquire()? {
            target.rebuild_pipelines()?;
            return Ok(FrameOutcome::Rebuilt);
        }

        target.tick()?;
        target.present()?;
        Ok(FrameOutcome::Drawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: WindowId = WindowId(1);

    #[derive(Default)]
    struct CountingTarget {
        swapchain_rebuilds: u32,
        pipeline_rebuilds: u32,
        acquires: u32,
        ticks: u32,
        presents: u32,
        /// Results for upcoming acquires; empty means ready.
        acquire_results: Vec<bool>,
    }

    impl FrameTarget for CountingTarget {
        fn rebuild_swapchain(&mut self) -> anyhow::Result<()> {
            self.swapchain_rebuilds += 1;
            Ok(())
        }

        fn rebuild_pipelines(&mut self) -> anyhow::Result<()> {
            self.pipeline_rebuilds += 1;
            Ok(())
        }

        fn acquire(&mut self) -> anyhow::Result<bool> {
            self.acquires += 1;
            Ok(if self.acquire_results.is_empty() {
                true
            } else {
                self.acquire_results.remove(0)
            })
        }

        fn tick(&mut self) -> anyhow::Result<()> {
            self.ticks += 1;
            Ok(())
        }

        fn present(&mut self) -> anyhow::Result<()> {
            self.presents += 1;
            Ok(())
        }
    }

    fn resize(width: u32, height: u32) -> Event {
        Event::WindowResize {
            id: MAIN,
            width,
            height,
        }
    }

    #[test]
    fn draws_by_default() {
        let mut frame_loop = FrameLoop::new(MAIN);
        let mut target = CountingTarget::default();
        assert_eq!(
            frame_loop.run_iteration(&mut target).unwrap(),
            FrameOutcome::Drawn
        );
        assert_eq!((target.ticks, target.presents), (1, 1));
        assert_eq!(target.swapchain_rebuilds, 0);
    }

    #[test]
    fn resizes_are_coalesced() {
        let mut frame_loop = FrameLoop::new(MAIN);
        let mut target = CountingTarget::default();

        for (w, h) in [(640, 480), (800, 600), (1024, 768)] {
            assert_eq!(frame_loop.handle(&resize(w, h)), Dispatch::Handled);
        }
        frame_loop.run_iteration(&mut target).unwrap();
        frame_loop.run_iteration(&mut target).unwrap();

        assert_eq!(target.swapchain_rebuilds, 1);
        assert_eq!(target.pipeline_rebuilds, 1);
        assert_eq!(target.ticks, 2);
    }

    #[test]
    fn zero_area_skips_until_restored() {
        let mut frame_loop = FrameLoop::new(MAIN);
        let mut target = CountingTarget::default();

        frame_loop.handle(&resize(0, 0));
        for _ in 0..3 {
            assert_eq!(
                frame_loop.run_iteration(&mut target).unwrap(),
                FrameOutcome::Skipped
            );
        }
        assert_eq!((target.acquires, target.ticks), (0, 0));

        frame_loop.handle(&resize(800, 600));
        assert_eq!(
            frame_loop.run_iteration(&mut target).unwrap(),
            FrameOutcome::Drawn
        );
        assert_eq!(target.swapchain_rebuilds, 1);
        assert_eq!(target.ticks, 1);
    }

    #[test]
    fn window_opened_at_zero_area_is_not_acquired() {
        let mut frame_loop = FrameLoop::new(MAIN).with_zero_area(true);
        let mut target = CountingTarget::default();

        for _ in 0..3 {
            assert_eq!(
                frame_loop.run_iteration(&mut target).unwrap(),
                FrameOutcome::Skipped
            );
        }
        assert_eq!(target.acquires, 0);
        assert_eq!(target.pipeline_rebuilds, 0);

        frame_loop.handle(&resize(640, 480));
        assert_eq!(
            frame_loop.run_iteration(&mut target).unwrap(),
            FrameOutcome::Drawn
        );
        assert_eq!(target.swapchain_rebuilds, 1);
        assert_eq!(target.acquires, 1);
    }

    #[test]
    fn minimised_suspends_ticking() {
        let mut frame_loop = FrameLoop::new(MAIN);
        let mut target = CountingTarget::default();

        frame_loop.handle(&Event::WindowMinimise {
            id: MAIN,
            minimised: true,
        });
        assert!(!frame_loop.should_draw());
        frame_loop.run_iteration(&mut target).unwrap();
        assert_eq!((target.acquires, target.ticks), (0, 0));

        frame_loop.handle(&Event::WindowMinimise {
            id: MAIN,
            minimised: false,
        });
        frame_loop.run_iteration(&mut target).unwrap();
        assert_eq!(target.ticks, 1);
    }

    #[test]
    fn not_ready_rebuilds_pipelines_without_ticking() {
        let mut frame_loop = FrameLoop::new(MAIN);
        let mut target = CountingTarget {
            acquire_results: vec![false],
            ..Default::default()
        };

        assert_eq!(
            frame_loop.run_iteration(&mut target).unwrap(),
            FrameOutcome::Rebuilt
        );
        assert_eq!(target.pipeline_rebuilds, 1);
        assert_eq!((target.ticks, target.presents), (0, 0));

        assert_eq!(
            frame_loop.run_iteration(&mut target).unwrap(),
            FrameOutcome::Drawn
        );
    }

    #[test]
    fn closing_main_window_stops() {
        let mut frame_loop = FrameLoop::new(MAIN);
        let mut target = CountingTarget::default();

        assert_eq!(
            frame_loop.handle(&Event::WindowClosed { id: MAIN }),
            Dispatch::Handled
        );
        assert!(!frame_loop.is_running());
        assert_eq!(
            frame_loop.run_iteration(&mut target).unwrap(),
            FrameOutcome::Stopped
        );
        assert_eq!(target.acquires, 0);
    }

    #[test]
    fn quit_stops() {
        let mut frame_loop = FrameLoop::new(MAIN);
        frame_loop.handle(&Event::Quit);
        assert!(!frame_loop.is_running());
    }

    #[test]
    fn other_windows_are_forwarded() {
        let mut frame_loop = FrameLoop::new(MAIN);
        let other = WindowId(2);
        assert_eq!(
            frame_loop.handle(&Event::WindowClosed { id: other }),
            Dispatch::Forward
        );
        assert_eq!(
            frame_loop.handle(&Event::WindowResize {
                id: other,
                width: 0,
                height: 0
            }),
            Dispatch::Forward
        );
        assert!(frame_loop.is_running());
        assert!(frame_loop.should_draw());
    }
}
