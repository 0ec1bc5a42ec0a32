//! Pointer state and event routing.
//!
//! Absolute coordinates arrive from the backend in fixed-point and are
//! resolved against the current output's size. Enter is established on
//! the first event that finds a surface; the leave sending path exists
//! but nothing triggers it yet.

use std::collections::HashMap;

use crate::core::client::{Client, ClientId};
use crate::core::surface::SurfaceId;

/// A client's bound `wl_pointer` resource.
#[derive(Debug, Clone, Copy)]
pub struct PointerResource {
    pub client: ClientId,
    pub id: u32,
    pub version: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PointerFocus {
    pub client: ClientId,
    pub resource: u32,
    pub surface: SurfaceId,
}

#[derive(Debug, Default)]
pub struct Pointer {
    /// Last absolute position, in output coordinates.
    pub position: (f64, f64),
    /// Output the pointer currently sits on.
    pub current_output: Option<u32>,
    pub focus: Option<PointerFocus>,
    pub resources: Vec<PointerResource>,
}

impl Pointer {
    pub fn drop_client(&mut self, client: ClientId) {
        self.resources.retain(|r| r.client != client);
        if self.focus.map(|f| f.client) == Some(client) {
            self.focus = None;
        }
    }
}

/// Route absolute motion: establish focus on the first event that finds
/// a surface, then deliver motion to the focused client.
pub fn route_motion(
    pointer: &mut Pointer,
    clients: &mut HashMap<ClientId, Client>,
    surfaces_in_z: &[(SurfaceId, ClientId, u32)],
    serial: &mut dyn FnMut() -> u32,
    time_ms: u32,
    x: f64,
    y: f64,
) {
    pointer.position = (x, y);

    if pointer.focus.is_none() {
        let Some(resource) = pointer.resources.first().copied() else {
            return;
        };
        let Some(&(surface, _, surface_wl_id)) = surfaces_in_z
            .iter()
            .find(|&&(_, client, _)| client == resource.client)
        else {
            return;
        };
        pointer.focus = Some(PointerFocus {
            client: resource.client,
            resource: resource.id,
            surface,
        });
        if let Some(client) = clients.get_mut(&resource.client) {
            crate::core::wayland::seat::send_pointer_enter(
                client,
                resource.id,
                serial(),
                surface_wl_id,
                x,
                y,
            );
        }
    }

    let Some(focus) = pointer.focus else { return };
    if let Some(client) = clients.get_mut(&focus.client) {
        crate::core::wayland::seat::send_pointer_motion(client, focus.resource, time_ms, x, y);
    }
}

pub fn route_button(
    pointer: &mut Pointer,
    clients: &mut HashMap<ClientId, Client>,
    serial: &mut dyn FnMut() -> u32,
    time_ms: u32,
    button: u32,
    pressed: bool,
) {
    let Some(focus) = pointer.focus else { return };
    if let Some(client) = clients.get_mut(&focus.client) {
        crate::core::wayland::seat::send_pointer_button(
            client,
            focus.resource,
            serial(),
            time_ms,
            button,
            pressed,
        );
    }
}

/// Horizontal/vertical scroll. Discrete and v120 variants are accepted
/// upstream and only logged; they are not routed here yet.
pub fn route_axis(
    pointer: &mut Pointer,
    clients: &mut HashMap<ClientId, Client>,
    time_ms: u32,
    horizontal: f64,
    vertical: f64,
) {
    let Some(focus) = pointer.focus else { return };
    if let Some(client) = clients.get_mut(&focus.client) {
        if horizontal != 0.0 {
            crate::core::wayland::seat::send_pointer_axis(client, focus.resource, time_ms, 1, horizontal);
        }
        if vertical != 0.0 {
            crate::core::wayland::seat::send_pointer_axis(client, focus.resource, time_ms, 0, vertical);
        }
    }
}

/// Clear focus and tell the client. No caller triggers this yet; the
/// policy for when the pointer leaves a surface is still open.
pub fn route_leave(
    pointer: &mut Pointer,
    clients: &mut HashMap<ClientId, Client>,
    surface_wl_id: u32,
    serial: &mut dyn FnMut() -> u32,
) {
    let Some(focus) = pointer.focus.take() else { return };
    if let Some(client) = clients.get_mut(&focus.client) {
        crate::core::wayland::seat::send_pointer_leave(client, focus.resource, serial(), surface_wl_id);
    }
}
