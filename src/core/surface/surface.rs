use crate::core::render::ImageHandle;
use crate::core::surface::role::SurfaceRole;
use crate::core::types::{Extent, Rect};

/// Compositor-wide surface identifier. Distinct from the per-client
/// protocol id so the renderer can walk surfaces across clients.
pub type SurfaceId = u32;

/// What `wl_surface.attach` set since the last commit. The buffer id is
/// a weak pending reference; commit resolves it and tolerates the
/// buffer object having been destroyed in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    Buffer { buffer_id: u32 },
    Null,
}

/// State written by client requests, observable only at the next commit.
#[derive(Debug, Default)]
pub struct PendingState {
    pub attach: Option<Attach>,
    /// Window geometry from `xdg_surface.set_window_geometry`; applied
    /// at commit only when non-degenerate.
    pub geometry: Option<Rect>,
    /// `wl_callback` id from `wl_surface.frame`.
    pub frame_callback: Option<u32>,
    pub damage: Vec<Rect>,
    pub buffer_scale: Option<i32>,
    pub buffer_transform: Option<i32>,
    pub offset: Option<(i32, i32)>,
    /// `wl_region` ids; 0 on the wire means null and is stored as None
    /// inside the inner option.
    pub opaque_region: Option<Option<u32>>,
    pub input_region: Option<Option<u32>>,
}

/// State the compositor actually presents.
#[derive(Debug, Default)]
pub struct CurrentState {
    pub image: Option<ImageHandle>,
    pub image_extent: Extent,
    /// When the image was imported from a dmabuf, the `wl_buffer` id it
    /// came from; release is emitted once the GPU lets go of the image.
    pub dma_source: Option<u32>,
    pub geometry: Option<Rect>,
    pub damage: Vec<Rect>,
    pub buffer_scale: i32,
    pub buffer_transform: i32,
    pub offset: (i32, i32),
    pub opaque_region: Option<u32>,
    pub input_region: Option<u32>,
}

/// A window-content carrier with double-buffered state.
#[derive(Debug)]
pub struct Surface {
    pub id: SurfaceId,
    /// Owning client (session id, not a borrowed reference).
    pub client: crate::core::client::ClientId,
    /// The `wl_surface` protocol id on that client.
    pub wl_id: u32,
    pub role: SurfaceRole,
    /// Non-owning back-references to the role objects; cleared in their
    /// destructors and allowed to dangle briefly during teardown.
    pub xdg_surface_id: Option<u32>,
    pub role_object_id: Option<u32>,
    pub decoration_id: Option<u32>,
    /// True until the first commit completes.
    pub initial_commit: bool,
    pub pending: PendingState,
    pub current: CurrentState,
    /// Frame callback armed for the next successful output frame.
    pub frame_callback: Option<u32>,
    pub last_configure_serial: Option<u32>,
    /// Recorded from `ack_configure`; informational only.
    pub acked_configure_serial: Option<u32>,
    pub title: String,
    pub app_id: String,
    pub min_size: (i32, i32),
    pub max_size: (i32, i32),
}

impl Surface {
    pub fn new(id: SurfaceId, client: crate::core::client::ClientId, wl_id: u32) -> Self {
        Surface {
            id,
            client,
            wl_id,
            role: SurfaceRole::None,
            xdg_surface_id: None,
            role_object_id: None,
            decoration_id: None,
            initial_commit: true,
            pending: PendingState::default(),
            current: CurrentState::default(),
            frame_callback: None,
            last_configure_serial: None,
            acked_configure_serial: None,
            title: String::new(),
            app_id: String::new(),
            min_size: (0, 0),
            max_size: (0, 0),
        }
    }

    /// Assign a role. Fails when the surface already carries a different
    /// one; assigning the same role again is allowed.
    pub fn set_role(&mut self, role: SurfaceRole) -> Result<(), SurfaceRole> {
        if !self.role.is_none() && self.role != role {
            return Err(self.role);
        }
        self.role = role;
        Ok(())
    }

    /// Whether the surface has content the renderer can composite.
    pub fn is_mapped(&self) -> bool {
        self.current.image.is_some()
    }
}
