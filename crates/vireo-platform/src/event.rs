//! Engine event vocabulary.

use winit::event::WindowEvent;

/// Stable identifier of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

impl From<winit::window::WindowId> for WindowId {
    fn from(id: winit::window::WindowId) -> Self {
        Self(u64::from(id))
    }
}

/// Events the engine understands. Everything else is [`Event::Noop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Noop,
    Quit,
    WindowClosed { id: WindowId },
    WindowMinimise { id: WindowId, minimised: bool },
    WindowResize { id: WindowId, width: u32, height: u32 },
}

/// Custom events sent through the event loop proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEvent {
    /// Leave the event loop.
    Quit,
}

impl From<UserEvent> for Event {
    fn from(event: UserEvent) -> Self {
        match event {
            UserEvent::Quit => Self::Quit,
        }
    }
}

/// Map a winit window event onto the engine vocabulary.
pub fn translate_window_event(id: WindowId, event: &WindowEvent) -> Event {
    match event {
        WindowEvent::CloseRequested => Event::WindowClosed { id },
        WindowEvent::Resized(size) => Event::WindowResize {
            id,
            width: size.width,
            height: size.height,
        },
        WindowEvent::Occluded(minimised) => Event::WindowMinimise {
            id,
            minimised: *minimised,
        },
        _ => Event::Noop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    const ID: WindowId = WindowId(7);

    #[test]
    fn close_request() {
        assert_eq!(
            translate_window_event(ID, &WindowEvent::CloseRequested),
            Event::WindowClosed { id: ID }
        );
    }

    #[test]
    fn resize_carries_pixel_size() {
        let event = WindowEvent::Resized(PhysicalSize::new(800, 600));
        assert_eq!(
            translate_window_event(ID, &event),
            Event::WindowResize {
                id: ID,
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn occlusion_is_minimise() {
        assert_eq!(
            translate_window_event(ID, &WindowEvent::Occluded(true)),
            Event::WindowMinimise {
                id: ID,
                minimised: true
            }
        );
        assert_eq!(
            translate_window_event(ID, &WindowEvent::Occluded(false)),
            Event::WindowMinimise {
                id: ID,
                minimised: false
            }
        );
    }

    #[test]
    fn unmapped_events_are_noop() {
        assert_eq!(
            translate_window_event(ID, &WindowEvent::Focused(true)),
            Event::Noop
        );
        assert_eq!(
            translate_window_event(ID, &WindowEvent::RedrawRequested),
            Event::Noop
        );
    }

    #[test]
    fn quit_signal() {
        assert_eq!(Event::from(UserEvent::Quit), Event::Quit);
    }
}
