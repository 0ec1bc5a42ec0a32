//! xdg_surface: the shell half of a window surface.

use crate::core::client::{Client, ClientId};
use crate::core::errors::ProtocolError;
use crate::core::protocol::dispatch::Target;
use crate::core::protocol::objects::{ObjectEntry, ObjectKind};
use crate::core::protocol::wire::{MessageReader, MessageWriter};
use crate::core::protocol::Interface;
use crate::core::server::Server;
use crate::core::surface::{SurfaceId, SurfaceRole};
use crate::core::types::Rect;

const EVT_CONFIGURE: u16 = 0;

fn target_surface(target: Target) -> Result<SurfaceId, ProtocolError> {
    match target.kind {
        ObjectKind::XdgSurface { surface } => Ok(surface),
        _ => Err(ProtocolError::bad_target(target.id, Interface::XdgSurface)),
    }
}

pub fn destroy(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    // Non-owning back-reference: null it, the surface survives.
    if let Some(surface) = server.surface_mut(surface) {
        surface.xdg_surface_id = None;
    }
    let client = super::client_mut(server, client_id)?;
    super::destroy_object(client, target.id);
    Ok(())
}

pub fn get_toplevel(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let toplevel_id = msg.new_id()?;
    let surface_id = target_surface(target)?;

    if let Some(surface) = server.surface_mut(surface_id) {
        if surface.set_role(SurfaceRole::Toplevel).is_err() {
            return Err(ProtocolError::Malformed("surface already has a role"));
        }
        surface.role_object_id = Some(toplevel_id);
    }

    let client = super::client_mut(server, client_id)?;
    client.objects.register(
        toplevel_id,
        ObjectEntry {
            interface: Interface::XdgToplevel,
            version: target.version,
            kind: ObjectKind::XdgToplevel { surface: surface_id },
        },
    )?;
    tracing::debug!("surface {} acquired toplevel role (object {})", surface_id, toplevel_id);
    Ok(())
}

pub fn get_popup(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let popup_id = msg.new_id()?;
    let parent_id = msg.object_id()?;
    let positioner_id = msg.object_id()?;
    let surface_id = target_surface(target)?;

    let geometry = {
        let client = super::client_mut(server, client_id)?;
        if parent_id != 0 {
            client.objects.expect(parent_id, Interface::XdgSurface)?;
        }
        client.objects.expect(positioner_id, Interface::XdgPositioner)?;
        client
            .positioners
            .get(&positioner_id)
            .map(|p| p.resolve())
            .unwrap_or_default()
    };

    if let Some(surface) = server.surface_mut(surface_id) {
        if surface.set_role(SurfaceRole::Popup).is_err() {
            return Err(ProtocolError::Malformed("surface already has a role"));
        }
        surface.role_object_id = Some(popup_id);
        surface.pending.geometry = Some(geometry);
    }

    let client = super::client_mut(server, client_id)?;
    client.objects.register(
        popup_id,
        ObjectEntry {
            interface: Interface::XdgPopup,
            version: target.version,
            kind: ObjectKind::XdgPopup { surface: surface_id },
        },
    )?;
    tracing::debug!(
        "surface {} acquired popup role (object {}, geometry {:?})",
        surface_id,
        popup_id,
        geometry
    );
    Ok(())
}

pub fn set_window_geometry(
    server: &mut Server,
    _client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    let rect = Rect::new(msg.int()?, msg.int()?, msg.int()?, msg.int()?);
    if let Some(surface) = server.surface_mut(surface) {
        surface.pending.geometry = Some(rect);
    }
    Ok(())
}

/// Recorded but not enforced against replay; a mismatched serial is
/// informational.
pub fn ack_configure(
    server: &mut Server,
    _client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let serial = msg.uint()?;
    let surface_id = target_surface(target)?;
    if let Some(surface) = server.surface_mut(surface_id) {
        if surface.last_configure_serial != Some(serial) {
            tracing::debug!(
                "surface {}: ack_configure serial {} does not match last configure {:?}",
                surface_id,
                serial,
                surface.last_configure_serial
            );
        }
        surface.acked_configure_serial = Some(serial);
    }
    Ok(())
}

// ============================================================================
// Events
// ============================================================================

pub fn send_configure(client: &mut Client, xdg_surface_id: u32, serial: u32) {
    let mut msg = MessageWriter::new(xdg_surface_id, EVT_CONFIGURE);
    msg.uint(serial);
    client.queue(msg.finish());
}
