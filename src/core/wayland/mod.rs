//! Wayland protocol request handlers and event senders.
//!
//! One module per interface family, registered with the dispatch table
//! in `core::protocol::dispatch`. Handlers share the signature
//! `(server, client, target, reader) -> Result<(), ProtocolError>`;
//! event senders are plain typed functions that queue frames on a
//! client.

pub mod compositor;
pub mod decoration;
pub mod display;
pub mod linux_dmabuf;
pub mod registry;
pub mod seat;
pub mod shm;
pub mod surface;
pub mod xdg_popup;
pub mod xdg_positioner;
pub mod xdg_surface;
pub mod xdg_toplevel;
pub mod xdg_wm_base;

use crate::core::client::{Client, ClientId};
use crate::core::errors::ProtocolError;
use crate::core::server::Server;

/// Handlers run strictly after the dispatcher resolved the client, so a
/// miss here means the session died mid-turn.
pub(crate) fn client_mut(server: &mut Server, id: ClientId) -> Result<&mut Client, ProtocolError> {
    server.client_mut(id).ok_or(ProtocolError::Hangup)
}

/// Protocol destructor: drop the id and tell the client it may be
/// reused.
pub(crate) fn destroy_object(client: &mut Client, id: u32) {
    if client.objects.remove(id).is_some() {
        display::send_delete_id(client, id);
    }
}
