//! Renderer façade.
//!
//! The GPU driver and WSI layer live behind the `GpuContext` and
//! `Swapchain` traits; the compositor records commands against opaque
//! image handles and never touches a graphics API directly. The headless
//! implementation in `headless` interprets the same command stream on
//! CPU memory and backs the test suite and the headless binary.

pub mod headless;

use std::os::fd::OwnedFd;

use crate::core::errors::RenderError;
use crate::core::types::Extent;

/// Opaque GPU image handle. Valid until `image_destroy`.
pub type ImageHandle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayout {
    Undefined,
    TransferDst,
    PresentSrc,
    General,
}

/// One plane of a dmabuf import.
#[derive(Debug)]
pub struct DmaPlane {
    pub fd: OwnedFd,
    pub plane_idx: u32,
    pub offset: u32,
    pub stride: u32,
    pub modifier: u64,
}

/// Parameters handed to `image_import_dmabuf`.
#[derive(Debug)]
pub struct DmabufImport<'a> {
    pub extent: Extent,
    pub format: u32,
    pub flags: u32,
    pub planes: &'a [DmaPlane],
}

/// A recorded command buffer. Recording is pure bookkeeping; nothing
/// reaches the device before `submit_commands`.
#[derive(Debug, Default)]
pub struct Cmd {
    ops: Vec<CmdOp>,
}

#[derive(Debug, Clone, Copy)]
pub enum CmdOp {
    Transition {
        image: ImageHandle,
        from: ImageLayout,
        to: ImageLayout,
    },
    Clear {
        image: ImageHandle,
        color: [f32; 4],
    },
    Blit {
        src: ImageHandle,
        dst: ImageHandle,
        dst_x: i32,
        dst_y: i32,
    },
}

impl Cmd {
    pub fn transition(&mut self, image: ImageHandle, from: ImageLayout, to: ImageLayout) {
        self.ops.push(CmdOp::Transition { image, from, to });
    }

    pub fn clear(&mut self, image: ImageHandle, color: [f32; 4]) {
        self.ops.push(CmdOp::Clear { image, color });
    }

    pub fn blit(&mut self, src: ImageHandle, dst: ImageHandle, dst_x: i32, dst_y: i32) {
        self.ops.push(CmdOp::Blit { src, dst, dst_x, dst_y });
    }

    pub fn ops(&self) -> &[CmdOp] {
        &self.ops
    }
}

/// Abstract GPU device. All commands serialise through the event loop
/// thread; implementations are not required to be thread-safe.
pub trait GpuContext {
    /// Create an image and upload tightly packed 32-bit pixel data.
    fn image_create(&mut self, extent: Extent, data: &[u8]) -> Result<ImageHandle, RenderError>;

    /// Import a dmabuf plane set as an image, leaving it in `General`
    /// layout.
    fn image_import_dmabuf(&mut self, params: &DmabufImport<'_>) -> Result<ImageHandle, RenderError>;

    fn image_destroy(&mut self, image: ImageHandle);

    fn begin_commands(&mut self) -> Cmd;

    fn submit_commands(&mut self, cmd: Cmd);

    fn queue_wait_idle(&mut self);
}

/// A ring of presentable images bound to one output.
pub trait Swapchain {
    /// Next image to render into, or None when acquisition failed; the
    /// caller skips this tick and retries on the next one.
    fn acquire(&mut self) -> Option<(ImageHandle, Extent)>;

    fn present(&mut self, image: ImageHandle);
}

/// Background colour used when no wallpaper is set (#1A1A1AFF).
pub const BACKGROUND: [f32; 4] = [0.102, 0.102, 0.102, 1.0];

/// The renderer owned by the server: a GPU context plus the static
/// scene assets shared by every output.
pub struct Renderer {
    pub gpu: Box<dyn GpuContext>,
    wallpaper: Option<ImageHandle>,
}

impl Renderer {
    pub fn new(gpu: Box<dyn GpuContext>) -> Self {
        Renderer { gpu, wallpaper: None }
    }

    /// Install decoded wallpaper pixels as a GPU texture. Decoding
    /// itself is the caller's concern.
    pub fn set_wallpaper(&mut self, extent: Extent, rgba: &[u8]) -> Result<(), RenderError> {
        let image = self.gpu.image_create(extent, rgba)?;
        if let Some(old) = self.wallpaper.replace(image) {
            self.gpu.image_destroy(old);
        }
        tracing::info!("wallpaper installed ({}x{})", extent.width, extent.height);
        Ok(())
    }

    pub fn wallpaper(&self) -> Option<ImageHandle> {
        self.wallpaper
    }
}
