//! xdg_popup.

use crate::core::client::{Client, ClientId};
use crate::core::errors::ProtocolError;
use crate::core::protocol::dispatch::Target;
use crate::core::protocol::objects::ObjectKind;
use crate::core::protocol::wire::{MessageReader, MessageWriter};
use crate::core::protocol::Interface;
use crate::core::server::Server;
use crate::core::surface::SurfaceId;
use crate::core::types::Rect;

const EVT_CONFIGURE: u16 = 0;
#[allow(dead_code)]
const EVT_POPUP_DONE: u16 = 1;
const EVT_REPOSITIONED: u16 = 2;

fn target_surface(target: Target) -> Result<SurfaceId, ProtocolError> {
    match target.kind {
        ObjectKind::XdgPopup { surface } => Ok(surface),
        _ => Err(ProtocolError::bad_target(target.id, Interface::XdgPopup)),
    }
}

pub fn destroy(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface_id = target_surface(target)?;
    let image = server.surface_mut(surface_id).and_then(|surface| {
        surface.role_object_id = None;
        surface.initial_commit = true;
        surface.current.dma_source = None;
        surface.current.image.take()
    });
    if let Some(image) = image {
        server.renderer.gpu.image_destroy(image);
    }
    let client = super::client_mut(server, client_id)?;
    super::destroy_object(client, target.id);
    Ok(())
}

pub fn grab(
    _server: &mut Server,
    _client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let _seat = msg.object_id()?;
    let serial = msg.uint()?;
    tracing::debug!("xdg_popup.grab({}, serial = {})", target.id, serial);
    Ok(())
}

pub fn reposition(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let positioner_id = msg.object_id()?;
    let token = msg.uint()?;
    let surface_id = target_surface(target)?;

    let geometry = {
        let client = super::client_mut(server, client_id)?;
        client.objects.expect(positioner_id, Interface::XdgPositioner)?;
        client
            .positioners
            .get(&positioner_id)
            .map(|p| p.resolve())
            .unwrap_or_default()
    };

    let (xdg_surface, serial) = {
        if let Some(surface) = server.surface_mut(surface_id) {
            surface.pending.geometry = Some(geometry);
        }
        let xdg = server.surface(surface_id).and_then(|s| s.xdg_surface_id);
        (xdg, server.next_serial())
    };

    let client = super::client_mut(server, client_id)?;
    send_repositioned(client, target.id, token);
    send_configure(client, target.id, geometry);
    if let Some(xdg_id) = xdg_surface {
        super::xdg_surface::send_configure(client, xdg_id, serial);
    }
    if xdg_surface.is_some() {
        if let Some(surface) = server.surface_mut(surface_id) {
            surface.last_configure_serial = Some(serial);
        }
    }
    Ok(())
}

// ============================================================================
// Events
// ============================================================================

pub fn send_configure(client: &mut Client, popup_id: u32, rect: Rect) {
    let mut msg = MessageWriter::new(popup_id, EVT_CONFIGURE);
    msg.int(rect.x).int(rect.y).int(rect.width).int(rect.height);
    client.queue(msg.finish());
}

#[allow(dead_code)]
pub fn send_popup_done(client: &mut Client, popup_id: u32) {
    let mut msg = MessageWriter::new(popup_id, EVT_POPUP_DONE);
    client.queue(msg.finish());
}

pub fn send_repositioned(client: &mut Client, popup_id: u32, token: u32) {
    let mut msg = MessageWriter::new(popup_id, EVT_REPOSITIONED);
    msg.uint(token);
    client.queue(msg.finish());
}
