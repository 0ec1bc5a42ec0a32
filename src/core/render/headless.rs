//! CPU-backed GPU context.
//!
//! Interprets the recorded command stream against plain pixel buffers.
//! Backs the test suite and the headless binary; a real device backend
//! implements the same traits over its own driver.

use std::collections::HashMap;

use crate::core::errors::RenderError;
use crate::core::render::{Cmd, CmdOp, DmabufImport, GpuContext, ImageHandle, Swapchain};
use crate::core::types::Extent;

const BYTES_PER_PIXEL: usize = 4;

struct HeadlessImage {
    extent: Extent,
    pixels: Vec<u8>,
}

#[derive(Default)]
pub struct HeadlessGpu {
    images: HashMap<ImageHandle, HeadlessImage>,
    next_handle: ImageHandle,
}

impl HeadlessGpu {
    pub fn new() -> Self {
        HeadlessGpu { images: HashMap::new(), next_handle: 1 }
    }

    fn allocate(&mut self, extent: Extent, pixels: Vec<u8>) -> ImageHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.images.insert(handle, HeadlessImage { extent, pixels });
        handle
    }

    /// Test hook: read an image back.
    pub fn image_pixels(&self, image: ImageHandle) -> Option<(&Extent, &[u8])> {
        self.images.get(&image).map(|img| (&img.extent, img.pixels.as_slice()))
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl GpuContext for HeadlessGpu {
    fn image_create(&mut self, extent: Extent, data: &[u8]) -> Result<ImageHandle, RenderError> {
        let expected = extent.width as usize * extent.height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(RenderError::Allocation(format!(
                "pixel data is {} bytes, extent {}x{} needs {}",
                data.len(),
                extent.width,
                extent.height,
                expected
            )));
        }
        Ok(self.allocate(extent, data.to_vec()))
    }

    fn image_import_dmabuf(&mut self, params: &DmabufImport<'_>) -> Result<ImageHandle, RenderError> {
        if params.planes.is_empty() {
            return Err(RenderError::Import("no planes supplied".into()));
        }
        if params.extent.is_empty() {
            return Err(RenderError::Import("zero-extent import".into()));
        }
        // No device to hand the fds to; the import is modelled as an
        // opaque image of the right extent. Plane fds are owned by the
        // caller's parameter set and closed with it.
        let size = params.extent.width as usize * params.extent.height as usize * BYTES_PER_PIXEL;
        Ok(self.allocate(params.extent, vec![0; size]))
    }

    fn image_destroy(&mut self, image: ImageHandle) {
        if self.images.remove(&image).is_none() {
            tracing::warn!("destroy of unknown image {}", image);
        }
    }

    fn begin_commands(&mut self) -> Cmd {
        Cmd::default()
    }

    fn submit_commands(&mut self, cmd: Cmd) {
        for op in cmd.ops() {
            match *op {
                CmdOp::Transition { .. } => {
                    // Layout transitions are meaningless on CPU memory.
                }
                CmdOp::Clear { image, color } => {
                    if let Some(img) = self.images.get_mut(&image) {
                        let texel = [
                            (color[0] * 255.0) as u8,
                            (color[1] * 255.0) as u8,
                            (color[2] * 255.0) as u8,
                            (color[3] * 255.0) as u8,
                        ];
                        for px in img.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
                            px.copy_from_slice(&texel);
                        }
                    }
                }
                CmdOp::Blit { src, dst, dst_x, dst_y } => {
                    self.blit(src, dst, dst_x, dst_y);
                }
            }
        }
    }

    fn queue_wait_idle(&mut self) {
        // Submission is synchronous here.
    }
}

impl HeadlessGpu {
    fn blit(&mut self, src: ImageHandle, dst: ImageHandle, dst_x: i32, dst_y: i32) {
        let Some(src_img) = self.images.get(&src) else { return };
        let (src_extent, src_pixels) = (src_img.extent, src_img.pixels.clone());
        let Some(dst_img) = self.images.get_mut(&dst) else { return };

        for row in 0..src_extent.height as i64 {
            let dy = row + dst_y as i64;
            if dy < 0 || dy >= dst_img.extent.height as i64 {
                continue;
            }
            for col in 0..src_extent.width as i64 {
                let dx = col + dst_x as i64;
                if dx < 0 || dx >= dst_img.extent.width as i64 {
                    continue;
                }
                let s = (row as usize * src_extent.width as usize + col as usize) * BYTES_PER_PIXEL;
                let d = (dy as usize * dst_img.extent.width as usize + dx as usize) * BYTES_PER_PIXEL;
                dst_img.pixels[d..d + BYTES_PER_PIXEL].copy_from_slice(&src_pixels[s..s + BYTES_PER_PIXEL]);
            }
        }
    }
}

/// Fixed two-image ring over the headless context.
pub struct HeadlessSwapchain {
    images: Vec<ImageHandle>,
    extent: Extent,
    cursor: usize,
    presented: u64,
}

impl HeadlessSwapchain {
    pub fn new(gpu: &mut dyn GpuContext, extent: Extent) -> Result<Self, RenderError> {
        let size = extent.width as usize * extent.height as usize * BYTES_PER_PIXEL;
        let images = vec![
            gpu.image_create(extent, &vec![0; size])?,
            gpu.image_create(extent, &vec![0; size])?,
        ];
        Ok(HeadlessSwapchain { images, extent, cursor: 0, presented: 0 })
    }

    pub fn presented_frames(&self) -> u64 {
        self.presented
    }
}

impl Swapchain for HeadlessSwapchain {
    fn acquire(&mut self) -> Option<(ImageHandle, Extent)> {
        let image = self.images[self.cursor];
        self.cursor = (self.cursor + 1) % self.images.len();
        Some((image, self.extent))
    }

    fn present(&mut self, _image: ImageHandle) {
        self.presented += 1;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::render::ImageLayout;

    #[test]
    fn test_image_create_validates_size() {
        let mut gpu = HeadlessGpu::new();
        assert!(gpu.image_create(Extent::new(2, 2), &[0; 16]).is_ok());
        assert!(gpu.image_create(Extent::new(2, 2), &[0; 15]).is_err());
    }

    #[test]
    fn test_clear_and_blit() {
        let mut gpu = HeadlessGpu::new();
        let dst = gpu.image_create(Extent::new(4, 4), &[0; 64]).unwrap();
        let src = gpu.image_create(Extent::new(1, 1), &[10, 20, 30, 255]).unwrap();

        let mut cmd = gpu.begin_commands();
        cmd.transition(dst, ImageLayout::Undefined, ImageLayout::TransferDst);
        cmd.clear(dst, [1.0, 0.0, 0.0, 1.0]);
        cmd.blit(src, dst, 2, 3);
        cmd.transition(dst, ImageLayout::TransferDst, ImageLayout::PresentSrc);
        gpu.submit_commands(cmd);
        gpu.queue_wait_idle();

        let (_, pixels) = gpu.image_pixels(dst).unwrap();
        assert_eq!(&pixels[0..4], &[255, 0, 0, 255]);
        let off = (3 * 4 + 2) * 4;
        assert_eq!(&pixels[off..off + 4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_renderer_wallpaper_replaces_old() {
        use crate::core::render::Renderer;
        let mut renderer = Renderer::new(Box::new(HeadlessGpu::new()));
        assert!(renderer.wallpaper().is_none());
        renderer.set_wallpaper(Extent::new(1, 1), &[1, 2, 3, 4]).unwrap();
        let first = renderer.wallpaper().unwrap();
        renderer.set_wallpaper(Extent::new(1, 1), &[5, 6, 7, 8]).unwrap();
        assert_ne!(renderer.wallpaper(), Some(first));
    }

    #[test]
    fn test_swapchain_alternates_and_counts_presents() {
        let mut gpu = HeadlessGpu::new();
        let mut chain = HeadlessSwapchain::new(&mut gpu, Extent::new(8, 8)).unwrap();

        let (first, extent) = chain.acquire().unwrap();
        assert_eq!(extent, Extent::new(8, 8));
        let (second, _) = chain.acquire().unwrap();
        assert_ne!(first, second);
        let (third, _) = chain.acquire().unwrap();
        assert_eq!(first, third);

        chain.present(first);
        assert_eq!(chain.presented_frames(), 1);
    }
}
