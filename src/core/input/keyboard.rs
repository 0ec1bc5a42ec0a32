//! Keyboard state and key event routing.
//!
//! Clients receive the backend's raw keycodes; the +8 offset is applied
//! only when asking the keymap engine for symbol names and UTF-8, which
//! feed the log and nothing else.

use std::collections::HashMap;

use crate::core::client::{Client, ClientId};
use crate::core::keymap::{create_sealed_file, escape_utf8, KeymapEngine, SealedFile, XkbEngine};
use crate::core::surface::SurfaceId;

/// Per-keycode pressed bitset, wide enough for evdev button codes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeySet {
    bits: [u64; 8],
}

impl KeySet {
    pub fn set(&mut self, keycode: u32, pressed: bool) {
        let (word, bit) = (keycode as usize / 64, keycode as usize % 64);
        if word >= self.bits.len() {
            return;
        }
        if pressed {
            self.bits[word] |= 1 << bit;
        } else {
            self.bits[word] &= !(1 << bit);
        }
    }

    pub fn contains(&self, keycode: u32) -> bool {
        let (word, bit) = (keycode as usize / 64, keycode as usize % 64);
        word < self.bits.len() && self.bits[word] & (1 << bit) != 0
    }

    pub fn pressed(&self) -> Vec<u32> {
        let mut keys = Vec::new();
        for (word, &bits) in self.bits.iter().enumerate() {
            let mut remaining = bits;
            while remaining != 0 {
                let bit = remaining.trailing_zeros();
                keys.push(word as u32 * 64 + bit);
                remaining &= remaining - 1;
            }
        }
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }
}

/// A client's bound `wl_keyboard` resource.
#[derive(Debug, Clone, Copy)]
pub struct KeyboardResource {
    pub client: ClientId,
    pub id: u32,
    pub version: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct KeyboardFocus {
    pub client: ClientId,
    pub resource: u32,
    pub surface: SurfaceId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Modifiers {
    pub depressed: u32,
    pub latched: u32,
    pub locked: u32,
    pub group: u32,
}

pub struct Keyboard {
    engine: Option<Box<dyn KeymapEngine>>,
    /// Read-only keymap file handed to clients; None suppresses the
    /// keymap event.
    keymap_file: Option<SealedFile>,
    pub pressed: KeySet,
    pub mods: Modifiers,
    pub repeat_rate: i32,
    pub repeat_delay: i32,
    pub focus: Option<KeyboardFocus>,
    pub resources: Vec<KeyboardResource>,
}

impl Keyboard {
    pub fn new() -> Self {
        let engine: Option<Box<dyn KeymapEngine>> = match XkbEngine::new() {
            Ok(engine) => Some(Box::new(engine)),
            Err(err) => {
                tracing::error!("keymap engine unavailable: {:#}", err);
                None
            }
        };
        let keymap_file = engine.as_ref().and_then(|engine| {
            // Clients expect the text blob NUL-terminated.
            let mut payload = engine.keymap_text().as_bytes().to_vec();
            payload.push(0);
            match create_sealed_file(&payload) {
                Ok(sealed) => Some(sealed),
                Err(err) => {
                    tracing::error!("keymap distribution disabled: {:#}", err);
                    None
                }
            }
        });

        Keyboard {
            engine,
            keymap_file,
            pressed: KeySet::default(),
            mods: Modifiers::default(),
            repeat_rate: 33,
            repeat_delay: 500,
            focus: None,
            resources: Vec::new(),
        }
    }

    pub fn keymap_file(&self) -> Option<&SealedFile> {
        self.keymap_file.as_ref()
    }

    /// Record a key transition and produce the log rendering via the
    /// keymap engine (+8 keycode convention).
    pub fn record_key(&mut self, keycode: u32, pressed: bool) {
        self.pressed.set(keycode, pressed);

        if let Some(engine) = &self.engine {
            let xkb_keycode = keycode + 8;
            let name = engine.key_get_sym_name(xkb_keycode);
            let utf8 = escape_utf8(&engine.key_get_utf8(xkb_keycode));
            if utf8.is_empty() {
                tracing::debug!("key {} = {}", name, if pressed { "press" } else { "release" });
            } else {
                tracing::debug!(
                    "key {} '{}' = {}",
                    name,
                    utf8,
                    if pressed { "press" } else { "release" }
                );
            }
        }
    }

    pub fn update_mods(&mut self, mods: Modifiers) {
        self.mods = mods;
        if let Some(engine) = &mut self.engine {
            engine.update_mask(mods.depressed, mods.latched, mods.locked, mods.group);
        }
    }

    pub fn drop_client(&mut self, client: ClientId) {
        self.resources.retain(|r| r.client != client);
        if self.focus.map(|f| f.client) == Some(client) {
            self.focus = None;
        }
    }
}

impl std::fmt::Debug for Keyboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyboard")
            .field("resources", &self.resources.len())
            .field("focus", &self.focus)
            .field("repeat_rate", &self.repeat_rate)
            .field("repeat_delay", &self.repeat_delay)
            .finish()
    }
}

/// Route a backend key event to the focused client, choosing an initial
/// focus first if none exists.
///
/// The focus heuristic (first bound keyboard resource, first surface) is
/// the single point of change for a future focus policy.
pub fn route_key(
    keyboard: &mut Keyboard,
    clients: &mut HashMap<ClientId, Client>,
    surfaces_in_z: &[(SurfaceId, ClientId, u32)],
    serial: &mut dyn FnMut() -> u32,
    time_ms: u32,
    keycode: u32,
    pressed: bool,
) {
    keyboard.record_key(keycode, pressed);

    if keyboard.focus.is_none() && !keyboard.pressed.is_empty() {
        let Some(resource) = keyboard.resources.first().copied() else {
            return;
        };
        let Some(&(surface, _, surface_wl_id)) = surfaces_in_z
            .iter()
            .find(|&&(_, client, _)| client == resource.client)
        else {
            return;
        };

        keyboard.focus = Some(KeyboardFocus {
            client: resource.client,
            resource: resource.id,
            surface,
        });
        tracing::info!("keyboard focus -> surface {} of client {}", surface, resource.client);

        if let Some(client) = clients.get_mut(&resource.client) {
            crate::core::wayland::seat::send_keyboard_enter(
                client,
                resource.id,
                serial(),
                surface_wl_id,
                &keyboard.pressed.pressed(),
            );
            crate::core::wayland::seat::send_keyboard_modifiers(
                client,
                resource.id,
                serial(),
                Modifiers::default(),
            );
        }
    }

    let Some(focus) = keyboard.focus else { return };
    if let Some(client) = clients.get_mut(&focus.client) {
        crate::core::wayland::seat::send_keyboard_key(
            client,
            focus.resource,
            serial(),
            time_ms,
            keycode,
            pressed,
        );
    }
}

/// Forward a backend modifier change verbatim with a fresh serial.
pub fn route_modifiers(
    keyboard: &mut Keyboard,
    clients: &mut HashMap<ClientId, Client>,
    serial: &mut dyn FnMut() -> u32,
    mods: Modifiers,
) {
    keyboard.update_mods(mods);
    let Some(focus) = keyboard.focus else { return };
    if let Some(client) = clients.get_mut(&focus.client) {
        crate::core::wayland::seat::send_keyboard_modifiers(client, focus.resource, serial(), mods);
    }
}

/// Drop focus, notifying the focused client.
pub fn route_leave(
    keyboard: &mut Keyboard,
    clients: &mut HashMap<ClientId, Client>,
    surfaces_wl_id: &dyn Fn(SurfaceId) -> Option<u32>,
    serial: &mut dyn FnMut() -> u32,
) {
    let Some(focus) = keyboard.focus.take() else { return };
    if let (Some(client), Some(wl_id)) = (clients.get_mut(&focus.client), surfaces_wl_id(focus.surface)) {
        crate::core::wayland::seat::send_keyboard_leave(client, focus.resource, serial(), wl_id);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyset_set_and_list() {
        let mut keys = KeySet::default();
        assert!(keys.is_empty());
        keys.set(30, true);
        keys.set(100, true);
        assert!(keys.contains(30));
        assert_eq!(keys.pressed(), vec![30, 100]);
        keys.set(30, false);
        assert_eq!(keys.pressed(), vec![100]);
    }

    #[test]
    fn test_keyset_out_of_range_ignored() {
        let mut keys = KeySet::default();
        keys.set(100_000, true);
        assert!(keys.is_empty());
        assert!(!keys.contains(100_000));
    }
}
