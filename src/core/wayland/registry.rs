//! wl_registry binding.

use crate::core::client::ClientId;
use crate::core::errors::ProtocolError;
use crate::core::protocol::dispatch::Target;
use crate::core::protocol::objects::{ObjectEntry, ObjectKind};
use crate::core::protocol::wire::MessageReader;
use crate::core::protocol::Interface;
use crate::core::server::Server;

/// `wl_registry.bind(name, {interface, version, id})`.
///
/// Unknown names and interface mismatches are client-fatal; the bound
/// version is clamped to what the server advertised.
pub fn bind(
    server: &mut Server,
    client_id: ClientId,
    _target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let name = msg.uint()?;
    let new_id = msg.untyped_new_id()?;

    let global = server.globals.find(name).ok_or(ProtocolError::UnknownGlobal(name))?;
    if new_id.interface != global.interface.name() {
        return Err(ProtocolError::GlobalMismatch {
            name,
            advertised: global.interface.name(),
            requested: new_id.interface,
        });
    }

    let version = new_id.version.min(global.version);
    tracing::debug!(
        "wl_registry.bind(name = {}, interface = {}, version = {} ({}), id = {})",
        name,
        global.interface.name(),
        new_id.version,
        version,
        new_id.new_id
    );

    let kind = match global.interface {
        Interface::WlCompositor => ObjectKind::Compositor,
        Interface::WlShm => ObjectKind::Shm,
        Interface::WlSeat => ObjectKind::Seat,
        Interface::XdgWmBase => ObjectKind::WmBase,
        Interface::ZxdgDecorationManagerV1 => ObjectKind::DecorationManager,
        Interface::ZwpLinuxDmabufV1 => ObjectKind::DmabufFactory,
        other => {
            return Err(ProtocolError::GlobalMismatch {
                name,
                advertised: other.name(),
                requested: new_id.interface,
            })
        }
    };

    {
        let client = super::client_mut(server, client_id)?;
        client.objects.register(
            new_id.new_id,
            ObjectEntry { interface: global.interface, version, kind },
        )?;
    }

    // Per-interface bind side effects.
    match global.interface {
        Interface::WlShm => super::shm::on_bind(server, client_id, new_id.new_id),
        Interface::WlSeat => super::seat::on_bind(server, client_id, new_id.new_id, version),
        Interface::ZwpLinuxDmabufV1 => {
            super::linux_dmabuf::on_bind(server, client_id, new_id.new_id, version)
        }
        _ => Ok(()),
    }
}
