//! Client buffer records.
//!
//! A `wl_buffer` resolves to either a view into a shm pool or an
//! already-imported dmabuf image. Records are owned by the client and
//! keyed by the protocol id; surfaces reference them weakly and resolve
//! at commit time.

use crate::core::render::{DmaPlane, ImageHandle};
use crate::core::types::Extent;

/// View into a shm pool. The pixel copy happens at surface commit.
#[derive(Debug, Clone, Copy)]
pub struct ShmBufferView {
    /// Protocol id of the owning `wl_shm_pool`.
    pub pool_id: u32,
    pub offset: i32,
    pub width: i32,
    pub height: i32,
    pub stride: i32,
    pub format: u32,
}

/// A dmabuf buffer whose planes were imported as a GPU image at
/// `create_immed` time. The image moves to the surface on first commit.
#[derive(Debug)]
pub struct DmaBufferImage {
    pub image: Option<ImageHandle>,
    pub extent: Extent,
    pub format: u32,
}

#[derive(Debug)]
pub enum BufferRecord {
    Shm(ShmBufferView),
    Dma(DmaBufferImage),
}

/// Accumulates planes for `zwp_linux_buffer_params_v1` until the client
/// calls `create_immed`. A parameter set can be used at most once.
#[derive(Debug, Default)]
pub struct DmabufParamsBuilder {
    pub planes: Vec<DmaPlane>,
    pub used: bool,
}

impl DmabufParamsBuilder {
    pub fn add_plane(&mut self, plane: DmaPlane) {
        self.planes.push(plane);
    }
}
