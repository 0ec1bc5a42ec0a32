//! zxdg_decoration_manager_v1: server-side decorations only.

use crate::core::client::{Client, ClientId};
use crate::core::errors::ProtocolError;
use crate::core::protocol::dispatch::Target;
use crate::core::protocol::objects::{ObjectEntry, ObjectKind};
use crate::core::protocol::wire::{MessageReader, MessageWriter};
use crate::core::protocol::Interface;
use crate::core::server::Server;

const EVT_CONFIGURE: u16 = 0;

pub const MODE_SERVER_SIDE: u32 = 2;

pub fn manager_destroy(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let client = super::client_mut(server, client_id)?;
    super::destroy_object(client, target.id);
    Ok(())
}

pub fn get_toplevel_decoration(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let decoration_id = msg.new_id()?;
    let toplevel_id = msg.object_id()?;

    let surface = {
        let client = super::client_mut(server, client_id)?;
        let entry = client.objects.expect(toplevel_id, Interface::XdgToplevel)?;
        let ObjectKind::XdgToplevel { surface } = entry.kind else {
            return Err(ProtocolError::bad_target(toplevel_id, Interface::XdgToplevel));
        };
        client.objects.register(
            decoration_id,
            ObjectEntry {
                interface: Interface::ZxdgToplevelDecorationV1,
                version: target.version,
                kind: ObjectKind::ToplevelDecoration { surface },
            },
        )?;
        surface
    };

    if let Some(surface) = server.surface_mut(surface) {
        surface.decoration_id = Some(decoration_id);
    }

    let client = super::client_mut(server, client_id)?;
    send_configure(client, decoration_id, MODE_SERVER_SIDE);
    Ok(())
}

pub fn decoration_destroy(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    if let ObjectKind::ToplevelDecoration { surface } = target.kind {
        if let Some(surface) = server.surface_mut(surface) {
            surface.decoration_id = None;
        }
    }
    let client = super::client_mut(server, client_id)?;
    super::destroy_object(client, target.id);
    Ok(())
}

/// Whatever the client prefers, the answer is server-side.
pub fn set_mode(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let requested = msg.uint()?;
    tracing::debug!("zxdg_toplevel_decoration_v1.set_mode({}) -> server_side", requested);
    let client = super::client_mut(server, client_id)?;
    send_configure(client, target.id, MODE_SERVER_SIDE);
    Ok(())
}

pub fn unset_mode(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let client = super::client_mut(server, client_id)?;
    send_configure(client, target.id, MODE_SERVER_SIDE);
    Ok(())
}

pub fn send_configure(client: &mut Client, decoration_id: u32, mode: u32) {
    let mut msg = MessageWriter::new(decoration_id, EVT_CONFIGURE);
    msg.uint(mode);
    client.queue(msg.finish());
}
