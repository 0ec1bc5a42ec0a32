//! xdg_wm_base.

use crate::core::client::ClientId;
use crate::core::errors::ProtocolError;
use crate::core::protocol::dispatch::Target;
use crate::core::protocol::objects::{ObjectEntry, ObjectKind};
use crate::core::protocol::wire::MessageReader;
use crate::core::protocol::Interface;
use crate::core::server::Server;
use crate::core::shell::Positioner;

pub fn destroy(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let client = super::client_mut(server, client_id)?;
    super::destroy_object(client, target.id);
    Ok(())
}

pub fn create_positioner(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let positioner_id = msg.new_id()?;
    let client = super::client_mut(server, client_id)?;
    client.objects.register(
        positioner_id,
        ObjectEntry {
            interface: Interface::XdgPositioner,
            version: target.version,
            kind: ObjectKind::Positioner,
        },
    )?;
    client.positioners.insert(positioner_id, Positioner::default());
    Ok(())
}

pub fn get_xdg_surface(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let xdg_id = msg.new_id()?;
    let wl_surface_id = msg.object_id()?;

    let surface = {
        let client = super::client_mut(server, client_id)?;
        let entry = client.objects.expect(wl_surface_id, Interface::WlSurface)?;
        let ObjectKind::Surface { surface } = entry.kind else {
            return Err(ProtocolError::bad_target(wl_surface_id, Interface::WlSurface));
        };
        client.objects.register(
            xdg_id,
            ObjectEntry {
                interface: Interface::XdgSurface,
                version: target.version,
                kind: ObjectKind::XdgSurface { surface },
            },
        )?;
        surface
    };

    if let Some(surface) = server.surface_mut(surface) {
        surface.xdg_surface_id = Some(xdg_id);
    }
    tracing::debug!("xdg_wm_base.get_xdg_surface(id = {}, surface = {})", xdg_id, wl_surface_id);
    Ok(())
}

pub fn pong(
    _server: &mut Server,
    client_id: ClientId,
    _target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let serial = msg.uint()?;
    // The server never originates pings; a pong is informational.
    tracing::debug!("xdg_wm_base.pong(serial = {}) from client {}", serial, client_id);
    Ok(())
}
