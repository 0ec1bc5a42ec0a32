//! The seat: the aggregate of input devices presented to clients.
//!
//! Exactly one seat exists, named deterministically. Capabilities are
//! derived from what the backend reports and re-sent to every bound
//! seat resource on change.

use crate::core::client::ClientId;
use crate::core::input::keyboard::Keyboard;
use crate::core::input::pointer::Pointer;

pub const SEAT_NAME: &str = "seat0";

pub const CAP_POINTER: u32 = 1;
pub const CAP_KEYBOARD: u32 = 2;
#[allow(dead_code)]
pub const CAP_TOUCH: u32 = 4;

/// A client's bound `wl_seat` resource.
#[derive(Debug, Clone, Copy)]
pub struct SeatResource {
    pub client: ClientId,
    pub id: u32,
    pub version: u32,
}

#[derive(Debug)]
pub struct Seat {
    pub keyboard: Keyboard,
    pub pointer: Pointer,
    /// Derived capability bitmap, updated from backend reports.
    capabilities: u32,
    pub resources: Vec<SeatResource>,
}

impl Default for Seat {
    fn default() -> Self {
        Seat {
            keyboard: Keyboard::new(),
            pointer: Pointer::default(),
            capabilities: 0,
            resources: Vec::new(),
        }
    }
}

impl Seat {
    pub fn capabilities(&self) -> u32 {
        self.capabilities
    }

    /// Returns true when the bitmap changed and bound resources need a
    /// fresh capabilities event.
    pub fn set_capabilities(&mut self, keyboard: bool, pointer: bool) -> bool {
        let caps = if keyboard { CAP_KEYBOARD } else { 0 } | if pointer { CAP_POINTER } else { 0 };
        if caps == self.capabilities {
            return false;
        }
        tracing::debug!("seat capabilities: keyboard={}, pointer={}", keyboard, pointer);
        self.capabilities = caps;
        true
    }

    pub fn drop_client(&mut self, client: ClientId) {
        self.resources.retain(|r| r.client != client);
        self.keyboard.drop_client(client);
        self.pointer.drop_client(client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_bitmap_derivation() {
        let mut seat = Seat::default();
        assert_eq!(seat.capabilities(), 0);
        assert!(seat.set_capabilities(true, true));
        assert_eq!(seat.capabilities(), CAP_KEYBOARD | CAP_POINTER);
        // No change, no re-broadcast.
        assert!(!seat.set_capabilities(true, true));
        assert!(seat.set_capabilities(false, true));
        assert_eq!(seat.capabilities(), CAP_POINTER);
    }
}
