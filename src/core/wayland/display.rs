//! wl_display requests and the display-side events.

use crate::core::client::{Client, ClientId};
use crate::core::errors::ProtocolError;
use crate::core::protocol::dispatch::Target;
use crate::core::protocol::objects::{ObjectEntry, ObjectKind};
use crate::core::protocol::wire::{MessageReader, MessageWriter};
use crate::core::protocol::Interface;
use crate::core::server::Server;

const EVT_DELETE_ID: u16 = 1;
const EVT_CALLBACK_DONE: u16 = 0;
const EVT_REGISTRY_GLOBAL: u16 = 0;

/// `wl_display.sync(callback)`: answer immediately with `done(0)` and
/// retire the callback id.
pub fn sync(
    server: &mut Server,
    client_id: ClientId,
    _target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let callback_id = msg.new_id()?;
    let client = super::client_mut(server, client_id)?;
    client.objects.register(
        callback_id,
        ObjectEntry { interface: Interface::WlCallback, version: 1, kind: ObjectKind::Callback },
    )?;
    tracing::trace!("wl_display.sync(callback = {})", callback_id);

    send_callback_done(client, callback_id, 0);
    send_delete_id(client, callback_id);
    client.objects.remove(callback_id);
    Ok(())
}

/// `wl_display.get_registry(registry)`: advertise every global. The
/// stream is terminated by a `done` only on an explicit sync.
pub fn get_registry(
    server: &mut Server,
    client_id: ClientId,
    _target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let registry_id = msg.new_id()?;
    tracing::debug!("wl_display.get_registry(registry = {})", registry_id);

    let globals: Vec<_> = server.globals.iter().collect();
    let client = super::client_mut(server, client_id)?;
    client.objects.register(
        registry_id,
        ObjectEntry { interface: Interface::WlRegistry, version: 1, kind: ObjectKind::Registry },
    )?;

    for global in globals {
        send_global(client, registry_id, global.name, global.interface.name(), global.version);
    }
    Ok(())
}

// ============================================================================
// Events
// ============================================================================

pub fn send_callback_done(client: &mut Client, callback_id: u32, data: u32) {
    let mut msg = MessageWriter::new(callback_id, EVT_CALLBACK_DONE);
    msg.uint(data);
    client.queue(msg.finish());
}

/// Tell the client an id is dead and may be reused.
pub fn send_delete_id(client: &mut Client, id: u32) {
    let mut msg = MessageWriter::new(1, EVT_DELETE_ID);
    msg.uint(id);
    client.queue(msg.finish());
}

pub fn send_global(client: &mut Client, registry_id: u32, name: u32, interface: &str, version: u32) {
    let mut msg = MessageWriter::new(registry_id, EVT_REGISTRY_GLOBAL);
    msg.uint(name).string(interface).uint(version);
    client.queue(msg.finish());
}
