//! Backend contract.
//!
//! The backend sources input and output events from either the host
//! windowing session (nested) or raw devices (native). Only the events
//! it delivers matter to the core; the headless backend below drives a
//! single synthetic output for tests and the headless binary.

use std::os::fd::RawFd;

use crate::core::input::keyboard::Modifiers;
use crate::core::types::Extent;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendEvent {
    /// A new output exists. A zero extent means the host did not pick a
    /// size; the compositor falls back to 1280x720.
    OutputAdded { extent: Extent },
    OutputResized { output: u32, extent: Extent },
    OutputRemoved { output: u32 },
    /// Vsync/frame-callback pacing signal (nested mode).
    Frame,
    SeatCapabilities { keyboard: bool, pointer: bool },
    Key { keycode: u32, pressed: bool },
    Modifiers(Modifiers),
    RepeatInfo { rate: i32, delay: i32 },
    PointerMotion { x: f64, y: f64 },
    PointerButton { button: u32, pressed: bool },
    PointerAxis { horizontal: f64, vertical: f64 },
    PointerAxisDiscrete { axis: u32, steps: i32 },
    PointerAxisValue120 { axis: u32, value: i32 },
    /// The backend's session ended. Fatal for native backends; nested
    /// backends may retry reconnecting once before reporting this.
    Closed,
}

pub trait Backend {
    /// Descriptor to watch for readiness, if the backend is fd-driven.
    fn poll_fd(&self) -> Option<RawFd>;

    /// Collect everything that happened since the last call.
    fn drain_events(&mut self) -> Vec<BackendEvent>;

    /// Post-step hook: push any buffered writes to the host session.
    fn flush(&mut self);
}

/// Backend with no host session: reports one output and a keyboard +
/// pointer seat, then stays quiet. Tests inject further events by hand.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    queued: Vec<BackendEvent>,
    started: bool,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: make the next `drain_events` deliver this event.
    pub fn inject(&mut self, event: BackendEvent) {
        self.queued.push(event);
    }
}

impl Backend for HeadlessBackend {
    fn poll_fd(&self) -> Option<RawFd> {
        None
    }

    fn drain_events(&mut self) -> Vec<BackendEvent> {
        if !self.started {
            self.started = true;
            let mut events = vec![
                BackendEvent::SeatCapabilities { keyboard: true, pointer: true },
                BackendEvent::OutputAdded { extent: Extent::default() },
            ];
            events.append(&mut self.queued);
            return events;
        }
        std::mem::take(&mut self.queued)
    }

    fn flush(&mut self) {}
}
