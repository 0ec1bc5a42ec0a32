//! Outputs and the per-output frame tick.
//!
//! Each tick acquires a swapchain image, records the composition pass,
//! submits and presents, then fires the frame callbacks of every
//! surface that made it into the frame.

use crate::core::render::{ImageLayout, Swapchain, BACKGROUND};
use crate::core::server::Server;
use crate::core::types::Extent;

/// Size used when the backend reports a zero-extent output.
pub const FALLBACK_EXTENT: Extent = Extent { width: 1280, height: 720 };

pub struct Output {
    pub id: u32,
    pub extent: Extent,
    pub swapchain: Box<dyn Swapchain>,
    /// Monotonic per-output frame counter.
    pub frame_counter: u64,
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("id", &self.id)
            .field("extent", &self.extent)
            .field("frame_counter", &self.frame_counter)
            .finish()
    }
}

/// Render and present one frame on the output at `output_index`.
pub fn frame(server: &mut Server, output_index: usize) {
    let acquired = {
        let Some(output) = server.outputs.get_mut(output_index) else {
            return;
        };
        match output.swapchain.acquire() {
            Some(acquired) => acquired,
            None => {
                // Retry on the next tick.
                tracing::warn!("output {}: swapchain acquire failed, skipping frame", output.id);
                return;
            }
        }
    };
    let (target, extent) = acquired;

    let mut cmd = server.renderer.gpu.begin_commands();
    cmd.transition(target, ImageLayout::Undefined, ImageLayout::TransferDst);
    match server.renderer.wallpaper() {
        Some(wallpaper) => cmd.blit(wallpaper, target, 0, 0),
        None => cmd.clear(target, BACKGROUND),
    }

    let mut presented = Vec::new();
    for &surface_id in &server.z_order {
        let Some(surface) = server.surfaces.get(&surface_id) else {
            continue;
        };
        let Some(image) = surface.current.image else {
            continue;
        };
        let origin = surface.current.geometry.map(|g| (g.x, g.y)).unwrap_or((0, 0));
        cmd.blit(image, target, origin.0, origin.1);
        presented.push(surface_id);
    }

    cmd.transition(target, ImageLayout::TransferDst, ImageLayout::PresentSrc);
    server.renderer.gpu.submit_commands(cmd);
    server.renderer.gpu.queue_wait_idle();

    if let Some(output) = server.outputs.get_mut(output_index) {
        output.swapchain.present(target);
        output.frame_counter += 1;
        tracing::trace!(
            "output {}: frame {} presented ({}x{})",
            output.id,
            output.frame_counter,
            extent.width,
            extent.height
        );
    }

    // Consume the armed frame callbacks of every surface in this frame.
    let time_ms = server.time_ms();
    let mut callbacks = Vec::new();
    for surface_id in presented {
        if let Some(surface) = server.surfaces.get_mut(&surface_id) {
            if let Some(callback) = surface.frame_callback.take() {
                callbacks.push((surface.client, callback));
            }
        }
    }
    for (client_id, callback) in callbacks {
        if let Some(client) = server.clients.get_mut(&client_id) {
            crate::core::wayland::display::send_callback_done(client, callback, time_ms);
            crate::core::wayland::display::send_delete_id(client, callback);
            client.objects.remove(callback);
        }
    }
}
