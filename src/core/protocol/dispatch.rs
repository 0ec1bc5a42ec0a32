//! The static request dispatch table.
//!
//! Two-level: interface id, then opcode. Both indices are bounds-checked
//! and a miss on either is a client-fatal protocol error. Rows are in
//! request-opcode order and must match the interface's XML exactly.

use crate::core::client::ClientId;
use crate::core::errors::ProtocolError;
use crate::core::protocol::objects::ObjectKind;
use crate::core::protocol::wire::MessageReader;
use crate::core::protocol::Interface;
use crate::core::server::Server;
use crate::core::wayland::{
    compositor, decoration, display, linux_dmabuf, registry, seat, shm, surface, xdg_popup,
    xdg_positioner, xdg_surface, xdg_toplevel, xdg_wm_base,
};

/// The object a request addresses, resolved and interface-checked by
/// the dispatcher before the handler runs.
#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub id: u32,
    pub interface: Interface,
    pub version: u32,
    pub kind: ObjectKind,
}

pub type DispatchFn =
    fn(&mut Server, ClientId, Target, &mut MessageReader<'_>) -> Result<(), ProtocolError>;

const WL_DISPLAY: &[DispatchFn] = &[display::sync, display::get_registry];
const WL_REGISTRY: &[DispatchFn] = &[registry::bind];
const WL_CALLBACK: &[DispatchFn] = &[];
const WL_COMPOSITOR: &[DispatchFn] = &[compositor::create_surface, compositor::create_region];
const WL_SHM: &[DispatchFn] = &[shm::create_pool, shm::release];
const WL_SHM_POOL: &[DispatchFn] = &[shm::create_buffer, shm::pool_destroy, shm::pool_resize];
const WL_BUFFER: &[DispatchFn] = &[shm::buffer_destroy];
const WL_SURFACE: &[DispatchFn] = &[
    surface::destroy,
    surface::attach,
    surface::damage,
    surface::frame,
    surface::set_opaque_region,
    surface::set_input_region,
    surface::commit,
    surface::set_buffer_transform,
    surface::set_buffer_scale,
    surface::damage_buffer,
    surface::offset,
];
const WL_REGION: &[DispatchFn] =
    &[compositor::region_destroy, compositor::region_add, compositor::region_subtract];
const WL_SEAT: &[DispatchFn] =
    &[seat::get_pointer, seat::get_keyboard, seat::get_touch, seat::seat_release];
const WL_KEYBOARD: &[DispatchFn] = &[seat::keyboard_release];
const WL_POINTER: &[DispatchFn] = &[seat::pointer_set_cursor, seat::pointer_release];
const WL_TOUCH: &[DispatchFn] = &[seat::touch_release];
const XDG_WM_BASE: &[DispatchFn] = &[
    xdg_wm_base::destroy,
    xdg_wm_base::create_positioner,
    xdg_wm_base::get_xdg_surface,
    xdg_wm_base::pong,
];
const XDG_SURFACE: &[DispatchFn] = &[
    xdg_surface::destroy,
    xdg_surface::get_toplevel,
    xdg_surface::get_popup,
    xdg_surface::set_window_geometry,
    xdg_surface::ack_configure,
];
const XDG_TOPLEVEL: &[DispatchFn] = &[
    xdg_toplevel::destroy,
    xdg_toplevel::set_parent,
    xdg_toplevel::set_title,
    xdg_toplevel::set_app_id,
    xdg_toplevel::show_window_menu,
    xdg_toplevel::r#move,
    xdg_toplevel::resize,
    xdg_toplevel::set_max_size,
    xdg_toplevel::set_min_size,
    xdg_toplevel::set_maximized,
    xdg_toplevel::unset_maximized,
    xdg_toplevel::set_fullscreen,
    xdg_toplevel::unset_fullscreen,
    xdg_toplevel::set_minimized,
];
const XDG_POPUP: &[DispatchFn] = &[xdg_popup::destroy, xdg_popup::grab, xdg_popup::reposition];
const XDG_POSITIONER: &[DispatchFn] = &[
    xdg_positioner::destroy,
    xdg_positioner::set_size,
    xdg_positioner::set_anchor_rect,
    xdg_positioner::set_anchor,
    xdg_positioner::set_gravity,
    xdg_positioner::set_constraint_adjustment,
    xdg_positioner::set_offset,
    xdg_positioner::set_reactive,
    xdg_positioner::set_parent_size,
    xdg_positioner::set_parent_configure,
];
const ZXDG_DECORATION_MANAGER: &[DispatchFn] =
    &[decoration::manager_destroy, decoration::get_toplevel_decoration];
const ZXDG_TOPLEVEL_DECORATION: &[DispatchFn] =
    &[decoration::decoration_destroy, decoration::set_mode, decoration::unset_mode];
const ZWP_LINUX_DMABUF: &[DispatchFn] = &[
    linux_dmabuf::destroy,
    linux_dmabuf::create_params,
    linux_dmabuf::get_default_feedback,
    linux_dmabuf::get_surface_feedback,
];
const ZWP_LINUX_BUFFER_PARAMS: &[DispatchFn] = &[
    linux_dmabuf::params_destroy,
    linux_dmabuf::params_add,
    linux_dmabuf::params_create,
    linux_dmabuf::params_create_immed,
];
const ZWP_LINUX_DMABUF_FEEDBACK: &[DispatchFn] = &[linux_dmabuf::feedback_destroy];

/// Indexed by `Interface` discriminant; order must match the enum.
static DISPATCH: [&[DispatchFn]; Interface::COUNT] = [
    WL_DISPLAY,
    WL_REGISTRY,
    WL_CALLBACK,
    WL_COMPOSITOR,
    WL_SHM,
    WL_SHM_POOL,
    WL_BUFFER,
    WL_SURFACE,
    WL_REGION,
    WL_SEAT,
    WL_KEYBOARD,
    WL_POINTER,
    WL_TOUCH,
    XDG_WM_BASE,
    XDG_SURFACE,
    XDG_TOPLEVEL,
    XDG_POPUP,
    XDG_POSITIONER,
    ZXDG_DECORATION_MANAGER,
    ZXDG_TOPLEVEL_DECORATION,
    ZWP_LINUX_DMABUF,
    ZWP_LINUX_BUFFER_PARAMS,
    ZWP_LINUX_DMABUF_FEEDBACK,
];

/// Resolve `(interface, opcode)` to a handler.
pub fn lookup(interface: Interface, opcode: u16) -> Result<DispatchFn, ProtocolError> {
    DISPATCH[interface as usize]
        .get(opcode as usize)
        .copied()
        .ok_or(ProtocolError::InvalidOpcode { interface: interface.name(), opcode })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_bounds_checked() {
        assert!(lookup(Interface::WlDisplay, 0).is_ok());
        assert!(lookup(Interface::WlDisplay, 1).is_ok());
        assert!(matches!(
            lookup(Interface::WlDisplay, 2),
            Err(ProtocolError::InvalidOpcode { .. })
        ));
    }

    #[test]
    fn test_callback_has_no_requests() {
        assert!(lookup(Interface::WlCallback, 0).is_err());
    }

    #[test]
    fn test_row_lengths_match_protocol() {
        assert_eq!(DISPATCH[Interface::WlSurface as usize].len(), 11);
        assert_eq!(DISPATCH[Interface::XdgToplevel as usize].len(), 14);
        assert_eq!(DISPATCH[Interface::XdgPositioner as usize].len(), 10);
        assert_eq!(DISPATCH[Interface::WlSeat as usize].len(), 4);
        assert_eq!(DISPATCH[Interface::ZwpLinuxBufferParamsV1 as usize].len(), 4);
    }
}
