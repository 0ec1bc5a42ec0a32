//! Shared-memory pools.
//!
//! A pool is a client-provided fd mapped read/write shared. Buffers are
//! views into the mapping; the actual pixel copy happens at surface
//! commit. Resizing remaps, destruction unmaps, and the mapping guard
//! releases on every exit path.

use std::fs::File;
use std::os::fd::OwnedFd;

use memmap2::{MmapMut, MmapOptions};

use crate::core::errors::ProtocolError;

/// wl_shm format codes this server accepts.
pub const FORMAT_ARGB8888: u32 = 0;
pub const FORMAT_XRGB8888: u32 = 1;

pub fn format_supported(format: u32) -> bool {
    matches!(format, FORMAT_ARGB8888 | FORMAT_XRGB8888)
}

pub struct ShmPool {
    file: File,
    map: MmapMut,
    size: usize,
}

impl ShmPool {
    /// Map the client's fd. The fd is owned by the pool from here on and
    /// closed when the pool is destroyed.
    pub fn new(fd: OwnedFd, size: i32) -> Result<Self, ProtocolError> {
        if size <= 0 {
            return Err(ProtocolError::Malformed("shm pool size must be positive"));
        }
        let file = File::from(fd);
        // The client writes this memory concurrently; the mapping is a
        // shared view, not exclusive storage.
        let map = unsafe { MmapOptions::new().len(size as usize).map_mut(&file) }
            .map_err(ProtocolError::PoolMap)?;
        Ok(ShmPool { file, map, size: size as usize })
    }

    /// Unmap and remap at the new size.
    pub fn resize(&mut self, size: i32) -> Result<(), ProtocolError> {
        if (size as usize) < self.size {
            return Err(ProtocolError::Malformed("shm pool cannot shrink"));
        }
        self.map = unsafe { MmapOptions::new().len(size as usize).map_mut(&self.file) }
            .map_err(ProtocolError::PoolMap)?;
        self.size = size as usize;
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    /// Check a buffer view against the pool bounds.
    /// `stride * height + offset == size` is the last valid layout,
    /// and every row must fit inside its stride.
    pub fn validate_view(
        &self,
        offset: i32,
        width: i32,
        height: i32,
        stride: i32,
    ) -> Result<(), ProtocolError> {
        if width <= 0 || height <= 0 || stride <= 0 {
            return Err(ProtocolError::InvalidStride);
        }
        if width as i64 * 4 > stride as i64 {
            return Err(ProtocolError::InvalidStride);
        }
        let end = (stride as i64)
            .checked_mul(height as i64)
            .and_then(|v| v.checked_add(offset as i64))
            .ok_or(ProtocolError::InvalidStride)?;
        if offset < 0 || end > self.size as i64 {
            return Err(ProtocolError::InvalidStride);
        }
        Ok(())
    }

    /// Copy the view's rows into a tightly packed pixel buffer.
    pub fn copy_rows(&self, offset: i32, width: i32, height: i32, stride: i32) -> Vec<u8> {
        let row_bytes = width as usize * 4;
        let mut out = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = offset as usize + row * stride as usize;
            out.extend_from_slice(&self.map[start..start + row_bytes]);
        }
        out
    }
}

impl std::fmt::Debug for ShmPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmPool").field("size", &self.size).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
