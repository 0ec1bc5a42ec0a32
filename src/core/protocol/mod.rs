//! Hand-rolled Wayland protocol runtime.
//!
//! This is the raw-socket protocol layer: framing, per-client object
//! tables and the static request dispatch table. Events are emitted by
//! the typed senders in `core::wayland`.

pub mod dispatch;
pub mod objects;
pub mod wire;

/// Every interface this compositor speaks, in dispatch-table order.
///
/// The discriminant doubles as the interface id stamped on objects at
/// creation; it never changes for the lifetime of the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Interface {
    WlDisplay = 0,
    WlRegistry,
    WlCallback,
    WlCompositor,
    WlShm,
    WlShmPool,
    WlBuffer,
    WlSurface,
    WlRegion,
    WlSeat,
    WlKeyboard,
    WlPointer,
    WlTouch,
    XdgWmBase,
    XdgSurface,
    XdgToplevel,
    XdgPopup,
    XdgPositioner,
    ZxdgDecorationManagerV1,
    ZxdgToplevelDecorationV1,
    ZwpLinuxDmabufV1,
    ZwpLinuxBufferParamsV1,
    ZwpLinuxDmabufFeedbackV1,
}

impl Interface {
    pub const COUNT: usize = 23;

    pub fn name(self) -> &'static str {
        match self {
            Interface::WlDisplay => "wl_display",
            Interface::WlRegistry => "wl_registry",
            Interface::WlCallback => "wl_callback",
            Interface::WlCompositor => "wl_compositor",
            Interface::WlShm => "wl_shm",
            Interface::WlShmPool => "wl_shm_pool",
            Interface::WlBuffer => "wl_buffer",
            Interface::WlSurface => "wl_surface",
            Interface::WlRegion => "wl_region",
            Interface::WlSeat => "wl_seat",
            Interface::WlKeyboard => "wl_keyboard",
            Interface::WlPointer => "wl_pointer",
            Interface::WlTouch => "wl_touch",
            Interface::XdgWmBase => "xdg_wm_base",
            Interface::XdgSurface => "xdg_surface",
            Interface::XdgToplevel => "xdg_toplevel",
            Interface::XdgPopup => "xdg_popup",
            Interface::XdgPositioner => "xdg_positioner",
            Interface::ZxdgDecorationManagerV1 => "zxdg_decoration_manager_v1",
            Interface::ZxdgToplevelDecorationV1 => "zxdg_toplevel_decoration_v1",
            Interface::ZwpLinuxDmabufV1 => "zwp_linux_dmabuf_v1",
            Interface::ZwpLinuxBufferParamsV1 => "zwp_linux_buffer_params_v1",
            Interface::ZwpLinuxDmabufFeedbackV1 => "zwp_linux_dmabuf_feedback_v1",
        }
    }

    /// The highest version this server implements.
    pub fn max_version(self) -> u32 {
        match self {
            Interface::WlDisplay => 1,
            Interface::WlRegistry => 1,
            Interface::WlCallback => 1,
            Interface::WlCompositor => 5,
            Interface::WlShm => 1,
            Interface::WlShmPool => 1,
            Interface::WlBuffer => 1,
            Interface::WlSurface => 5,
            Interface::WlRegion => 1,
            Interface::WlSeat => 7,
            Interface::WlKeyboard => 7,
            Interface::WlPointer => 7,
            Interface::WlTouch => 7,
            Interface::XdgWmBase => 5,
            Interface::XdgSurface => 5,
            Interface::XdgToplevel => 5,
            Interface::XdgPopup => 5,
            Interface::XdgPositioner => 5,
            Interface::ZxdgDecorationManagerV1 => 1,
            Interface::ZxdgToplevelDecorationV1 => 1,
            Interface::ZwpLinuxDmabufV1 => 4,
            Interface::ZwpLinuxBufferParamsV1 => 4,
            Interface::ZwpLinuxDmabufFeedbackV1 => 4,
        }
    }
}

/// A polymorphic `new_id` argument: `{string interface, u32 version, u32 id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewId {
    pub interface: String,
    pub version: u32,
    pub new_id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_count_matches_discriminants() {
        assert_eq!(Interface::ZwpLinuxDmabufFeedbackV1 as usize + 1, Interface::COUNT);
    }

    #[test]
    fn test_interface_names() {
        assert_eq!(Interface::WlDisplay.name(), "wl_display");
        assert_eq!(Interface::ZwpLinuxDmabufV1.name(), "zwp_linux_dmabuf_v1");
    }
}
