//! xdg_toplevel.

use crate::core::client::{Client, ClientId};
use crate::core::errors::ProtocolError;
use crate::core::protocol::dispatch::Target;
use crate::core::protocol::objects::ObjectKind;
use crate::core::protocol::wire::{MessageReader, MessageWriter};
use crate::core::protocol::Interface;
use crate::core::server::Server;
use crate::core::surface::SurfaceId;

const EVT_CONFIGURE: u16 = 0;
#[allow(dead_code)]
const EVT_CLOSE: u16 = 1;
const EVT_CONFIGURE_BOUNDS: u16 = 2;
const EVT_WM_CAPABILITIES: u16 = 3;

pub const STATE_ACTIVATED: u32 = 4;
pub const WM_CAP_MAXIMIZE: u32 = 2;
pub const WM_CAP_FULLSCREEN: u32 = 3;

fn target_surface(target: Target) -> Result<SurfaceId, ProtocolError> {
    match target.kind {
        ObjectKind::XdgToplevel { surface } => Ok(surface),
        _ => Err(ProtocolError::bad_target(target.id, Interface::XdgToplevel)),
    }
}

pub fn destroy(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface_id = target_surface(target)?;

    // Destroying the role object unmaps the surface; the next
    // role acquisition starts a fresh configure round.
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

pub fn set_parent(
    _server: &mut Server,
    _client_id: ClientId,
    _target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let _parent = msg.object_id()?;
    Ok(())
}

pub fn set_title(
    server: &mut Server,
    _client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    let title = msg.string()?.to_owned();
    tracing::debug!("xdg_toplevel.set_title(\"{}\")", title);
    if let Some(surface) = server.surface_mut(surface) {
        surface.title = title;
    }
    Ok(())
}

pub fn set_app_id(
    server: &mut Server,
    _client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    let app_id = msg.string()?.to_owned();
    tracing::debug!("xdg_toplevel.set_app_id(\"{}\")", app_id);
    if let Some(surface) = server.surface_mut(surface) {
        surface.app_id = app_id;
    }
    Ok(())
}

pub fn show_window_menu(
    _server: &mut Server,
    _client_id: ClientId,
    _target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let _seat = msg.object_id()?;
    let serial = msg.uint()?;
    let position = (msg.int()?, msg.int()?);
    tracing::debug!("xdg_toplevel.show_window_menu(serial = {}, at {:?})", serial, position);
    Ok(())
}

pub fn r#move(
    _server: &mut Server,
    _client_id: ClientId,
    _target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let _seat = msg.object_id()?;
    let serial = msg.uint()?;
    tracing::debug!("xdg_toplevel.move(serial = {})", serial);
    Ok(())
}

pub fn resize(
    _server: &mut Server,
    _client_id: ClientId,
    _target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let _seat = msg.object_id()?;
    let serial = msg.uint()?;
    let edges = msg.uint()?;
    tracing::debug!("xdg_toplevel.resize(serial = {}, edges = {})", serial, edges);
    Ok(())
}

pub fn set_max_size(
    server: &mut Server,
    _client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    let size = (msg.int()?, msg.int()?);
    if let Some(surface) = server.surface_mut(surface) {
        surface.max_size = size;
    }
    Ok(())
}

pub fn set_min_size(
    server: &mut Server,
    _client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    let size = (msg.int()?, msg.int()?);
    if let Some(surface) = server.surface_mut(surface) {
        surface.min_size = size;
    }
    Ok(())
}

pub fn set_maximized(
    _server: &mut Server,
    _client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    tracing::debug!("xdg_toplevel.set_maximized({})", target.id);
    Ok(())
}

pub fn unset_maximized(
    _server: &mut Server,
    _client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    tracing::debug!("xdg_toplevel.unset_maximized({})", target.id);
    Ok(())
}

pub fn set_fullscreen(
    _server: &mut Server,
    _client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let _output = msg.object_id()?;
    tracing::debug!("xdg_toplevel.set_fullscreen({})", target.id);
    Ok(())
}

pub fn unset_fullscreen(
    _server: &mut Server,
    _client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    tracing::debug!("xdg_toplevel.unset_fullscreen({})", target.id);
    Ok(())
}

pub fn set_minimized(
    _server: &mut Server,
    _client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    tracing::debug!("xdg_toplevel.set_minimized({})", target.id);
    Ok(())
}

// ============================================================================
// Events
// ============================================================================

pub fn send_configure(client: &mut Client, toplevel_id: u32, width: i32, height: i32, states: &[u32]) {
    let mut bytes = Vec::with_capacity(states.len() * 4);
    for state in states {
        bytes.extend_from_slice(&state.to_ne_bytes());
    }
    let mut msg = MessageWriter::new(toplevel_id, EVT_CONFIGURE);
    msg.int(width).int(height).array(&bytes);
    client.queue(msg.finish());
}

#[allow(dead_code)]
pub fn send_close(client: &mut Client, toplevel_id: u32) {
    let mut msg = MessageWriter::new(toplevel_id, EVT_CLOSE);
    client.queue(msg.finish());
}

pub fn send_configure_bounds(client: &mut Client, toplevel_id: u32, width: i32, height: i32) {
    let mut msg = MessageWriter::new(toplevel_id, EVT_CONFIGURE_BOUNDS);
    msg.int(width).int(height);
    client.queue(msg.finish());
}

pub fn send_wm_capabilities(client: &mut Client, toplevel_id: u32, caps: &[u32]) {
    let mut bytes = Vec::with_capacity(caps.len() * 4);
    for cap in caps {
        bytes.extend_from_slice(&cap.to_ne_bytes());
    }
    let mut msg = MessageWriter::new(toplevel_id, EVT_WM_CAPABILITIES);
    msg.array(&bytes);
    client.queue(msg.finish());
}
