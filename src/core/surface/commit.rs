//! The non-buffer half of the atomic commit.
//!
//! Buffer resolution (upload, import, release) happens in the protocol
//! layer because it needs the owning client's buffer records and the
//! renderer; everything else about pending→current lives here.

use crate::core::surface::surface::{CurrentState, PendingState};

/// Apply every pending field except the buffer attachment. Returns the
/// frame callback that should be armed for the next output frame, if the
/// client requested one this cycle.
pub fn apply_state(surface_id: u32, pending: &mut PendingState, current: &mut CurrentState) -> Option<u32> {
    if let Some(geometry) = pending.geometry.take() {
        if geometry.is_degenerate() {
            tracing::warn!(
                "surface {}: discarding degenerate geometry {}x{}",
                surface_id,
                geometry.width,
                geometry.height
            );
        } else {
            current.geometry = Some(geometry);
        }
    }

    current.damage.extend(pending.damage.drain(..));

    if let Some(scale) = pending.buffer_scale.take() {
        current.buffer_scale = scale;
    }
    if let Some(transform) = pending.buffer_transform.take() {
        current.buffer_transform = transform;
    }
    if let Some(offset) = pending.offset.take() {
        current.offset = offset;
    }
    if let Some(region) = pending.opaque_region.take() {
        current.opaque_region = region;
    }
    if let Some(region) = pending.input_region.take() {
        current.input_region = region;
    }

    pending.frame_callback.take()
}
