//! Per-client object table.
//!
//! Maps client-local ids to protocol objects. Client-allocated ids live
//! in `[1, 0xFF000000)`; server-allocated ids in `[0xFF000000, 2^32)` and
//! are minted by an incrementing counter on the display. An id is never
//! reused on the wire while it is live.

use std::collections::HashMap;

use crate::core::errors::ProtocolError;
use crate::core::protocol::Interface;
use crate::core::surface::SurfaceId;

/// First id of the server-allocated range.
pub const SERVER_ID_BASE: u32 = 0xFF00_0000;

/// What an object id resolves to. Handles are plain ids into the
/// per-client or server-wide stores; none of them are owning links, so a
/// holder must tolerate the target being gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Display,
    Registry,
    Callback,
    Compositor,
    Shm,
    ShmPool,
    Buffer,
    Surface { surface: SurfaceId },
    Region,
    Seat,
    Keyboard,
    Pointer,
    Touch,
    WmBase,
    XdgSurface { surface: SurfaceId },
    XdgToplevel { surface: SurfaceId },
    XdgPopup { surface: SurfaceId },
    Positioner,
    DecorationManager,
    ToplevelDecoration { surface: SurfaceId },
    DmabufFactory,
    DmabufParams,
    DmabufFeedback,
}

/// One live protocol object. The interface tag is assigned at creation
/// and never mutated; dispatch verifies it on every lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectEntry {
    pub interface: Interface,
    pub version: u32,
    pub kind: ObjectKind,
}

#[derive(Debug, Default)]
pub struct ObjectTable {
    map: HashMap<u32, ObjectEntry>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object under a client-allocated id.
    pub fn register(&mut self, id: u32, entry: ObjectEntry) -> Result<(), ProtocolError> {
        if id == 0 || id >= SERVER_ID_BASE {
            return Err(ProtocolError::BadIdRange(id));
        }
        self.register_any(id, entry)
    }

    /// Register under any id, including server-allocated ones.
    pub fn register_any(&mut self, id: u32, entry: ObjectEntry) -> Result<(), ProtocolError> {
        if self.map.contains_key(&id) {
            return Err(ProtocolError::IdInUse(id));
        }
        self.map.insert(id, entry);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<ObjectEntry> {
        self.map.get(&id).copied()
    }

    /// Look up an object and verify its interface tag.
    pub fn expect(&self, id: u32, interface: Interface) -> Result<ObjectEntry, ProtocolError> {
        let entry = self.get(id).ok_or(ProtocolError::UnknownObject(id))?;
        if entry.interface != interface {
            return Err(ProtocolError::InterfaceMismatch {
                id,
                expected: interface.name(),
                actual: entry.interface.name(),
            });
        }
        Ok(entry)
    }

    /// Remove an object. Idempotent: removing an absent id is a no-op.
    pub fn remove(&mut self, id: u32) -> Option<ObjectEntry> {
        self.map.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, ObjectEntry)> + '_ {
        self.map.iter().map(|(&id, &entry)| (id, entry))
    }
}

/// Mints ids from the server-allocated range. Lives on the display and
/// is shared by all clients, so a server id is unique per server lifetime.
#[derive(Debug)]
pub struct ServerIdAllocator {
    next: u32,
}

impl Default for ServerIdAllocator {
    fn default() -> Self {
        ServerIdAllocator { next: SERVER_ID_BASE }
    }
}

impl ServerIdAllocator {
    pub fn allocate(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.wrapping_add(1).max(SERVER_ID_BASE);
        id
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(interface: Interface) -> ObjectEntry {
        ObjectEntry { interface, version: 1, kind: ObjectKind::Callback }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut table = ObjectTable::new();
        table.register(2, entry(Interface::WlRegistry)).unwrap();
        let found = table.expect(2, Interface::WlRegistry).unwrap();
        assert_eq!(found.interface, Interface::WlRegistry);
    }

    #[test]
    fn test_lookup_verifies_interface() {
        let mut table = ObjectTable::new();
        table.register(2, entry(Interface::WlRegistry)).unwrap();
        assert!(matches!(
            table.expect(2, Interface::WlSurface),
            Err(ProtocolError::InterfaceMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_id_is_error() {
        let table = ObjectTable::new();
        assert!(matches!(
            table.expect(99, Interface::WlSurface),
            Err(ProtocolError::UnknownObject(99))
        ));
    }

    #[test]
    fn test_reference_after_destroy_is_error() {
        let mut table = ObjectTable::new();
        table.register(5, entry(Interface::WlCallback)).unwrap();
        assert!(table.remove(5).is_some());
        assert!(matches!(
            table.expect(5, Interface::WlCallback),
            Err(ProtocolError::UnknownObject(5))
        ));
        // Removal is idempotent.
        assert!(table.remove(5).is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut table = ObjectTable::new();
        table.register(3, entry(Interface::WlCallback)).unwrap();
        assert!(matches!(
            table.register(3, entry(Interface::WlCallback)),
            Err(ProtocolError::IdInUse(3))
        ));
    }

    #[test]
    fn test_client_id_range_enforced() {
        let mut table = ObjectTable::new();
        assert!(matches!(
            table.register(0, entry(Interface::WlCallback)),
            Err(ProtocolError::BadIdRange(0))
        ));
        assert!(matches!(
            table.register(SERVER_ID_BASE, entry(Interface::WlCallback)),
            Err(ProtocolError::BadIdRange(_))
        ));
        assert!(table.register(SERVER_ID_BASE - 1, entry(Interface::WlCallback)).is_ok());
    }

    #[test]
    fn test_server_ids_start_at_base() {
        let mut alloc = ServerIdAllocator::default();
        assert_eq!(alloc.allocate(), SERVER_ID_BASE);
        assert_eq!(alloc.allocate(), SERVER_ID_BASE + 1);
    }
}
