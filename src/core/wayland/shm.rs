//! wl_shm, wl_shm_pool and wl_buffer.

use crate::core::buffer::{BufferRecord, ShmBufferView};
use crate::core::client::{Client, ClientId};
use crate::core::errors::ProtocolError;
use crate::core::protocol::dispatch::Target;
use crate::core::protocol::objects::{ObjectEntry, ObjectKind};
use crate::core::protocol::wire::{MessageReader, MessageWriter};
use crate::core::protocol::Interface;
use crate::core::server::Server;
use crate::core::shm::{self, ShmPool};

const EVT_SHM_FORMAT: u16 = 0;
const EVT_BUFFER_RELEASE: u16 = 0;

/// Advertise the supported formats to a fresh binding.
pub fn on_bind(server: &mut Server, client_id: ClientId, shm_id: u32) -> Result<(), ProtocolError> {
    let client = super::client_mut(server, client_id)?;
    for format in [shm::FORMAT_ARGB8888, shm::FORMAT_XRGB8888] {
        let mut msg = MessageWriter::new(shm_id, EVT_SHM_FORMAT);
        msg.uint(format);
        client.queue(msg.finish());
    }
    Ok(())
}

pub fn create_pool(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let pool_id = msg.new_id()?;
    let size = msg.int()?;

    let client = super::client_mut(server, client_id)?;
    let fd = client.take_fd()?;
    let pool = ShmPool::new(fd, size)?;
    tracing::debug!("wl_shm.create_pool(id = {}, size = {})", pool_id, size);

    client.objects.register(
        pool_id,
        ObjectEntry {
            interface: Interface::WlShmPool,
            version: target.version,
            kind: ObjectKind::ShmPool,
        },
    )?;
    client.pools.insert(pool_id, pool);
    Ok(())
}

pub fn release(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let client = super::client_mut(server, client_id)?;
    super::destroy_object(client, target.id);
    Ok(())
}

// ============================================================================
// wl_shm_pool
// ============================================================================

pub fn create_buffer(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let buffer_id = msg.new_id()?;
    let offset = msg.int()?;
    let width = msg.int()?;
    let height = msg.int()?;
    let stride = msg.int()?;
    let format = msg.uint()?;

    if width <= 0 || height <= 0 {
        return Err(ProtocolError::Malformed("buffer extent must be positive"));
    }
    if !shm::format_supported(format) {
        return Err(ProtocolError::Malformed("unsupported shm format"));
    }

    let client = super::client_mut(server, client_id)?;
    let pool = client
        .pools
        .get(&target.id)
        .ok_or(ProtocolError::UnknownObject(target.id))?;
    pool.validate_view(offset, width, height, stride)?;

    client.objects.register(
        buffer_id,
        ObjectEntry {
            interface: Interface::WlBuffer,
            version: 1,
            kind: ObjectKind::Buffer,
        },
    )?;
    client.buffers.insert(
        buffer_id,
        BufferRecord::Shm(ShmBufferView { pool_id: target.id, offset, width, height, stride, format }),
    );
    tracing::debug!(
        "wl_shm_pool.create_buffer(id = {}, {}x{}, stride = {}, offset = {})",
        buffer_id,
        width,
        height,
        stride,
        offset
    );
    Ok(())
}

pub fn pool_destroy(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let client = super::client_mut(server, client_id)?;
    client.pools.remove(&target.id);
    super::destroy_object(client, target.id);
    Ok(())
}

pub fn pool_resize(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let size = msg.int()?;
    let client = super::client_mut(server, client_id)?;
    let pool = client
        .pools
        .get_mut(&target.id)
        .ok_or(ProtocolError::UnknownObject(target.id))?;
    pool.resize(size)?;
    tracing::debug!("wl_shm_pool.resize(id = {}, size = {})", target.id, size);
    Ok(())
}

// ============================================================================
// wl_buffer
// ============================================================================

pub fn buffer_destroy(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let Server { clients, renderer, .. } = server;
    let Some(client) = clients.get_mut(&client_id) else { return Ok(()) };
    if let Some(BufferRecord::Dma(dma)) = client.buffers.remove(&target.id) {
        // Unconsumed import: the surface never took the image.
        if let Some(image) = dma.image {
            renderer.gpu.image_destroy(image);
        }
    }
    super::destroy_object(client, target.id);
    Ok(())
}

// ============================================================================
// Events
// ============================================================================

pub fn send_buffer_release(client: &mut Client, buffer_id: u32) {
    let mut msg = MessageWriter::new(buffer_id, EVT_BUFFER_RELEASE);
    client.queue(msg.finish());
}
