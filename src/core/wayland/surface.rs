//! wl_surface requests and the commit engine.
//!
//! Every mutating request lands in the surface's pending state; commit
//! promotes pending to current atomically, resolving the attached
//! buffer against the owning client's records and driving the initial
//! configure sequence for freshly-roled toplevels and popups.

use crate::core::buffer::BufferRecord;
use crate::core::client::{Client, ClientId};
use crate::core::errors::ProtocolError;
use crate::core::protocol::dispatch::Target;
use crate::core::protocol::objects::{ObjectEntry, ObjectKind};
use crate::core::protocol::wire::MessageReader;
use crate::core::protocol::Interface;
use crate::core::render::Renderer;
use crate::core::server::Server;
use crate::core::surface::{commit, Attach, Surface, SurfaceId, SurfaceRole};
use crate::core::types::{Extent, Rect};

fn target_surface(target: Target) -> Result<SurfaceId, ProtocolError> {
    match target.kind {
        ObjectKind::Surface { surface } => Ok(surface),
        _ => Err(ProtocolError::bad_target(target.id, Interface::WlSurface)),
    }
}

pub fn destroy(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    server.destroy_surface(surface);
    let client = super::client_mut(server, client_id)?;
    super::destroy_object(client, target.id);
    Ok(())
}

pub fn attach(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    let buffer_id = msg.object_id()?;
    let _dx = msg.int()?;
    let _dy = msg.int()?;

    if buffer_id != 0 {
        let client = super::client_mut(server, client_id)?;
        client.objects.expect(buffer_id, Interface::WlBuffer)?;
    }

    if let Some(surface) = server.surface_mut(surface) {
        surface.pending.attach = Some(if buffer_id == 0 {
            Attach::Null
        } else {
            Attach::Buffer { buffer_id }
        });
    }
    Ok(())
}

pub fn damage(
    server: &mut Server,
    _client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    let rect = Rect::new(msg.int()?, msg.int()?, msg.int()?, msg.int()?);
    if let Some(surface) = server.surface_mut(surface) {
        surface.pending.damage.push(rect);
    }
    Ok(())
}

pub fn frame(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface_id = target_surface(target)?;
    let callback_id = msg.new_id()?;

    let client = super::client_mut(server, client_id)?;
    client.objects.register(
        callback_id,
        ObjectEntry { interface: Interface::WlCallback, version: 1, kind: ObjectKind::Callback },
    )?;

    let previous = server
        .surface_mut(surface_id)
        .and_then(|s| s.pending.frame_callback.replace(callback_id));
    if let Some(previous) = previous {
        // Only the newest request survives the cycle; retire the old id.
        let client = super::client_mut(server, client_id)?;
        super::destroy_object(client, previous);
    }
    Ok(())
}

pub fn set_opaque_region(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    let region = read_region_arg(server, client_id, msg)?;
    if let Some(surface) = server.surface_mut(surface) {
        surface.pending.opaque_region = Some(region);
    }
    Ok(())
}

pub fn set_input_region(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    let region = read_region_arg(server, client_id, msg)?;
    if let Some(surface) = server.surface_mut(surface) {
        surface.pending.input_region = Some(region);
    }
    Ok(())
}

fn read_region_arg(
    server: &mut Server,
    client_id: ClientId,
    msg: &mut MessageReader<'_>,
) -> Result<Option<u32>, ProtocolError> {
    let region_id = msg.object_id()?;
    if region_id == 0 {
        return Ok(None);
    }
    let client = super::client_mut(server, client_id)?;
    client.objects.expect(region_id, Interface::WlRegion)?;
    Ok(Some(region_id))
}

pub fn set_buffer_transform(
    server: &mut Server,
    _client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    let transform = msg.int()?;
    if let Some(surface) = server.surface_mut(surface) {
        surface.pending.buffer_transform = Some(transform);
    }
    Ok(())
}

pub fn set_buffer_scale(
    server: &mut Server,
    _client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    let scale = msg.int()?;
    if let Some(surface) = server.surface_mut(surface) {
        surface.pending.buffer_scale = Some(scale);
    }
    Ok(())
}

pub fn damage_buffer(
    server: &mut Server,
    _client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    let rect = Rect::new(msg.int()?, msg.int()?, msg.int()?, msg.int()?);
    if let Some(surface) = server.surface_mut(surface) {
        surface.pending.damage.push(rect);
    }
    Ok(())
}

pub fn offset(
    server: &mut Server,
    _client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    let offset = (msg.int()?, msg.int()?);
    if let Some(surface) = server.surface_mut(surface) {
        surface.pending.offset = Some(offset);
    }
    Ok(())
}

// ============================================================================
// Commit
// ============================================================================

pub fn commit(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let surface = target_surface(target)?;
    commit_surface(server, client_id, surface)
}

/// The atomic pending→current transition.
pub fn commit_surface(
    server: &mut Server,
    client_id: ClientId,
    surface_id: SurfaceId,
) -> Result<(), ProtocolError> {
    if server.surface(surface_id).is_none() {
        // Role objects may outlive the surface briefly.
        tracing::debug!("commit on dead surface {}", surface_id);
        return Ok(());
    }

    // 1. The first commit of a roled surface triggers the configure
    //    handshake before any buffer is processed; its content stays
    //    pending until the round trip completes.
    let (initial, roled) = server
        .surface(surface_id)
        .map(|s| (s.initial_commit, !s.role.is_none()))
        .unwrap_or((false, false));
    if initial {
        send_initial_configure(server, client_id, surface_id)?;
        if let Some(surface) = server.surface_mut(surface_id) {
            surface.initial_commit = false;
        }
    }

    // 2. Resolve the pending buffer reference, if any.
    let attach = if initial && roled {
        None
    } else {
        server.surface_mut(surface_id).and_then(|s| s.pending.attach.take())
    };
    match attach {
        Some(Attach::Buffer { buffer_id }) => {
            apply_attach(server, client_id, surface_id, buffer_id);
        }
        Some(Attach::Null) => {
            // Null attach plus commit clears the contents.
            let Server { clients, surfaces, renderer, .. } = server;
            if let (Some(surface), Some(client)) =
                (surfaces.get_mut(&surface_id), clients.get_mut(&client_id))
            {
                drop_current_image(surface, renderer, client);
            }
        }
        None => {}
    }

    // 3/4. Geometry, damage, double-buffered scalars, frame callback.
    if let Some(surface) = server.surface_mut(surface_id) {
        let armed = commit::apply_state(surface.id, &mut surface.pending, &mut surface.current);
        if let Some(callback) = armed {
            surface.frame_callback = Some(callback);
        }
    }

    // Damage-driven pacing: a mapped surface wants to be shown.
    if server.surface(surface_id).map(|s| s.is_mapped()).unwrap_or(false) {
        server.request_frame();
    }
    Ok(())
}

/// Emit the first configure round for a toplevel or popup role.
fn send_initial_configure(
    server: &mut Server,
    client_id: ClientId,
    surface_id: SurfaceId,
) -> Result<(), ProtocolError> {
    let Some(surface) = server.surface(surface_id) else { return Ok(()) };
    let role = surface.role;
    let role_object = surface.role_object_id;
    let xdg_surface = surface.xdg_surface_id;
    let popup_geometry = surface.pending.geometry.or(surface.current.geometry);

    let serial = server.next_serial();
    let client = super::client_mut(server, client_id)?;

    match (role, role_object) {
        (SurfaceRole::Toplevel, Some(toplevel_id)) => {
            let version = client.objects.get(toplevel_id).map(|e| e.version).unwrap_or(1);
            if version >= 4 {
                super::xdg_toplevel::send_configure_bounds(client, toplevel_id, 0, 0);
            }
            super::xdg_toplevel::send_configure(
                client,
                toplevel_id,
                0,
                0,
                &[super::xdg_toplevel::STATE_ACTIVATED],
            );
            if version >= 5 {
                super::xdg_toplevel::send_wm_capabilities(
                    client,
                    toplevel_id,
                    &[super::xdg_toplevel::WM_CAP_FULLSCREEN, super::xdg_toplevel::WM_CAP_MAXIMIZE],
                );
            }
        }
        (SurfaceRole::Popup, Some(popup_id)) => {
            let rect = popup_geometry.unwrap_or_default();
            super::xdg_popup::send_configure(client, popup_id, rect);
        }
        _ => return Ok(()),
    }

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

/// Resolve a committed buffer reference and hand its pixels to the GPU.
fn apply_attach(server: &mut Server, client_id: ClientId, surface_id: SurfaceId, buffer_id: u32) {
    let Server { clients, surfaces, renderer, .. } = server;
    let Some(client) = clients.get_mut(&client_id) else { return };
    let Some(surface) = surfaces.get_mut(&surface_id) else { return };

    if client.objects.get(buffer_id).is_none() || !client.buffers.contains_key(&buffer_id) {
        tracing::warn!(
            "surface {}: buffer {} destroyed before commit, clearing contents",
            surface_id,
            buffer_id
        );
        drop_current_image(surface, renderer, client);
        return;
    }

    enum Upload {
        Shm { pixels: Vec<u8>, extent: Extent },
        Dma { image: crate::core::render::ImageHandle, extent: Extent },
        Empty,
    }

    let upload = match client.buffers.get_mut(&buffer_id) {
        Some(BufferRecord::Shm(view)) => {
            let view = *view;
            match client.pools.get(&view.pool_id) {
                Some(pool) => Upload::Shm {
                    pixels: pool.copy_rows(view.offset, view.width, view.height, view.stride),
                    extent: Extent::new(view.width as u32, view.height as u32),
                },
                None => {
                    tracing::warn!("surface {}: buffer {} lost its pool", surface_id, buffer_id);
                    Upload::Empty
                }
            }
        }
        Some(BufferRecord::Dma(dma)) => match dma.image.take() {
            Some(image) => Upload::Dma { image, extent: dma.extent },
            None => {
                tracing::warn!(
                    "surface {}: dmabuf buffer {} has no importable image",
                    surface_id,
                    buffer_id
                );
                Upload::Empty
            }
        },
        None => Upload::Empty,
    };

    match upload {
        Upload::Shm { pixels, extent } => match renderer.gpu.image_create(extent, &pixels) {
            Ok(image) => {
                drop_current_image(surface, renderer, client);
                surface.current.image = Some(image);
                surface.current.image_extent = extent;
                surface.current.dma_source = None;
                // Shm contents were copied; the client may reuse the
                // memory immediately.
                super::shm::send_buffer_release(client, buffer_id);
            }
            Err(err) => {
                tracing::error!("surface {}: image upload failed: {}", surface_id, err);
                drop_current_image(surface, renderer, client);
            }
        },
        Upload::Dma { image, extent } => {
            drop_current_image(surface, renderer, client);
            surface.current.image = Some(image);
            surface.current.image_extent = extent;
            surface.current.dma_source = Some(buffer_id);
        }
        Upload::Empty => {
            drop_current_image(surface, renderer, client);
        }
    }
}

/// Destroy the presented image, emitting the deferred dmabuf release
/// when its source buffer is still alive.
fn drop_current_image(surface: &mut Surface, renderer: &mut Renderer, client: &mut Client) {
    if let Some(old) = surface.current.image.take() {
        renderer.gpu.image_destroy(old);
    }
    if let Some(source) = surface.current.dma_source.take() {
        if client.objects.get(source).is_some() {
            super::shm::send_buffer_release(client, source);
        }
    }
    surface.current.image_extent = Extent::default();
}
