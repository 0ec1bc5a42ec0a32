//! zwp_linux_dmabuf_v1 with `create_immed` semantics.
//!
//! Plane sets accumulate on a parameter builder; `create_immed` imports
//! them as a GPU image at that call and transitions it to GENERAL
//! layout. Version 4 clients negotiate through a feedback object whose
//! format table rides the same sealed-file mechanism as the keymap.

use crate::core::buffer::{BufferRecord, DmaBufferImage, DmabufParamsBuilder};
use crate::core::client::{Client, ClientId};
use crate::core::errors::ProtocolError;
use crate::core::keymap::create_sealed_file;
use crate::core::protocol::dispatch::Target;
use crate::core::protocol::objects::{ObjectEntry, ObjectKind};
use crate::core::protocol::wire::{MessageReader, MessageWriter};
use crate::core::protocol::Interface;
use crate::core::render::{DmaPlane, DmabufImport, ImageHandle, ImageLayout};
use crate::core::server::Server;
use crate::core::types::Extent;

const EVT_FORMAT: u16 = 0;
const EVT_MODIFIER: u16 = 1;

const EVT_PARAMS_CREATED: u16 = 0;
#[allow(dead_code)]
const EVT_PARAMS_FAILED: u16 = 1;

const EVT_FEEDBACK_DONE: u16 = 0;
const EVT_FEEDBACK_FORMAT_TABLE: u16 = 1;
const EVT_FEEDBACK_MAIN_DEVICE: u16 = 2;
const EVT_FEEDBACK_TRANCHE_DONE: u16 = 3;
const EVT_FEEDBACK_TRANCHE_TARGET_DEVICE: u16 = 4;
const EVT_FEEDBACK_TRANCHE_FORMATS: u16 = 5;
const EVT_FEEDBACK_TRANCHE_FLAGS: u16 = 6;

pub const DRM_FORMAT_XRGB8888: u32 = 0x3432_5258;
pub const DRM_FORMAT_ARGB8888: u32 = 0x3432_5241;
pub const DRM_FORMAT_MOD_LINEAR: u64 = 0;

pub const SUPPORTED_FORMATS: [u32; 2] = [DRM_FORMAT_XRGB8888, DRM_FORMAT_ARGB8888];

/// Pre-v4 bindings get the format/modifier event stream; v4 clients
/// ask for a feedback object instead.
pub fn on_bind(
    server: &mut Server,
    client_id: ClientId,
    dmabuf_id: u32,
    version: u32,
) -> Result<(), ProtocolError> {
    if version >= 4 {
        return Ok(());
    }
    let client = super::client_mut(server, client_id)?;
    for format in SUPPORTED_FORMATS {
        if version >= 3 {
            let mut msg = MessageWriter::new(dmabuf_id, EVT_MODIFIER);
            msg.uint(format)
                .uint((DRM_FORMAT_MOD_LINEAR >> 32) as u32)
                .uint(DRM_FORMAT_MOD_LINEAR as u32);
            client.queue(msg.finish());
        } else {
            let mut msg = MessageWriter::new(dmabuf_id, EVT_FORMAT);
            msg.uint(format);
            client.queue(msg.finish());
        }
    }
    Ok(())
}

pub fn destroy(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let client = super::client_mut(server, client_id)?;
    super::destroy_object(client, target.id);
    Ok(())
}

pub fn create_params(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let params_id = msg.new_id()?;
    let client = super::client_mut(server, client_id)?;
    client.objects.register(
        params_id,
        ObjectEntry {
            interface: Interface::ZwpLinuxBufferParamsV1,
            version: target.version,
            kind: ObjectKind::DmabufParams,
        },
    )?;
    client.dmabuf_params.insert(params_id, DmabufParamsBuilder::default());
    Ok(())
}

pub fn get_default_feedback(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let feedback_id = msg.new_id()?;
    register_and_send_feedback(server, client_id, feedback_id, target.version)
}

pub fn get_surface_feedback(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let feedback_id = msg.new_id()?;
    let surface_id = msg.object_id()?;
    {
        let client = super::client_mut(server, client_id)?;
        client.objects.expect(surface_id, Interface::WlSurface)?;
    }
    // Per-surface preferences match the defaults on this server.
    register_and_send_feedback(server, client_id, feedback_id, target.version)
}

fn register_and_send_feedback(
    server: &mut Server,
    client_id: ClientId,
    feedback_id: u32,
    version: u32,
) -> Result<(), ProtocolError> {
    let client = super::client_mut(server, client_id)?;
    client.objects.register(
        feedback_id,
        ObjectEntry {
            interface: Interface::ZwpLinuxDmabufFeedbackV1,
            version,
            kind: ObjectKind::DmabufFeedback,
        },
    )?;
    send_feedback(client, feedback_id);
    Ok(())
}

/// One tranche covering the supported formats with the linear modifier.
fn send_feedback(client: &mut Client, feedback_id: u32) {
    // 16-byte table entries: u32 format, 4 bytes padding, u64 modifier.
    let mut table = Vec::with_capacity(SUPPORTED_FORMATS.len() * 16);
    for format in SUPPORTED_FORMATS {
        table.extend_from_slice(&format.to_ne_bytes());
        table.extend_from_slice(&[0u8; 4]);
        table.extend_from_slice(&DRM_FORMAT_MOD_LINEAR.to_ne_bytes());
    }

    match create_sealed_file(&table) {
        Ok(sealed) => {
            let mut msg = MessageWriter::new(feedback_id, EVT_FEEDBACK_FORMAT_TABLE);
            msg.uint(sealed.size);
            client.queue_with_fd(msg.finish(), sealed.file.into());
        }
        Err(err) => {
            tracing::error!("dmabuf format table suppressed: {:#}", err);
        }
    }

    // No render node to name; an empty device id is advertised.
    let device = 0u64.to_ne_bytes();
    let mut msg = MessageWriter::new(feedback_id, EVT_FEEDBACK_MAIN_DEVICE);
    msg.array(&device);
    client.queue(msg.finish());

    let mut msg = MessageWriter::new(feedback_id, EVT_FEEDBACK_TRANCHE_TARGET_DEVICE);
    msg.array(&device);
    client.queue(msg.finish());

    let mut indices = Vec::with_capacity(SUPPORTED_FORMATS.len() * 2);
    for index in 0..SUPPORTED_FORMATS.len() as u16 {
        indices.extend_from_slice(&index.to_ne_bytes());
    }
    let mut msg = MessageWriter::new(feedback_id, EVT_FEEDBACK_TRANCHE_FORMATS);
    msg.array(&indices);
    client.queue(msg.finish());

    let mut msg = MessageWriter::new(feedback_id, EVT_FEEDBACK_TRANCHE_FLAGS);
    msg.uint(0);
    client.queue(msg.finish());

    client.queue(MessageWriter::new(feedback_id, EVT_FEEDBACK_TRANCHE_DONE).finish());
    client.queue(MessageWriter::new(feedback_id, EVT_FEEDBACK_DONE).finish());
}

pub fn feedback_destroy(
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
// zwp_linux_buffer_params_v1
// ============================================================================

pub fn params_destroy(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let client = super::client_mut(server, client_id)?;
    client.dmabuf_params.remove(&target.id);
    super::destroy_object(client, target.id);
    Ok(())
}

pub fn params_add(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let plane_idx = msg.uint()?;
    let offset = msg.uint()?;
    let stride = msg.uint()?;
    let modifier_hi = msg.uint()?;
    let modifier_lo = msg.uint()?;

    let client = super::client_mut(server, client_id)?;
    let fd = client.take_fd()?;
    let builder = client
        .dmabuf_params
        .get_mut(&target.id)
        .ok_or(ProtocolError::UnknownObject(target.id))?;
    if builder.used {
        return Err(ProtocolError::Malformed("buffer params already used"));
    }
    builder.add_plane(DmaPlane {
        fd,
        plane_idx,
        offset,
        stride,
        modifier: ((modifier_hi as u64) << 32) | modifier_lo as u64,
    });
    Ok(())
}

/// `create`: like `create_immed`, but the buffer id is server-allocated
/// and announced through the `created` event.
pub fn params_create(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let width = msg.int()?;
    let height = msg.int()?;
    let format = msg.uint()?;
    let flags = msg.uint()?;

    let buffer_id = server.server_ids.allocate();
    let image = import_params(server, client_id, target.id, width, height, format, flags)?;

    let client = super::client_mut(server, client_id)?;
    client.objects.register_any(
        buffer_id,
        ObjectEntry { interface: Interface::WlBuffer, version: 1, kind: ObjectKind::Buffer },
    )?;
    client.buffers.insert(
        buffer_id,
        BufferRecord::Dma(DmaBufferImage {
            image,
            extent: Extent::new(width as u32, height as u32),
            format,
        }),
    );

    let mut reply = MessageWriter::new(target.id, EVT_PARAMS_CREATED);
    reply.uint(buffer_id);
    client.queue(reply.finish());
    Ok(())
}

pub fn params_create_immed(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let buffer_id = msg.new_id()?;
    let width = msg.int()?;
    let height = msg.int()?;
    let format = msg.uint()?;
    let flags = msg.uint()?;

    let image = import_params(server, client_id, target.id, width, height, format, flags)?;

    let client = super::client_mut(server, client_id)?;
    client.objects.register(
        buffer_id,
        ObjectEntry { interface: Interface::WlBuffer, version: 1, kind: ObjectKind::Buffer },
    )?;
    client.buffers.insert(
        buffer_id,
        BufferRecord::Dma(DmaBufferImage {
            image,
            extent: Extent::new(width as u32, height as u32),
            format,
        }),
    );
    tracing::debug!(
        "zwp_linux_buffer_params_v1.create_immed(buffer = {}, {}x{}, format = {:#x})",
        buffer_id,
        width,
        height,
        format
    );
    Ok(())
}

/// Import the accumulated plane set. Import failure is a resource
/// error, not a protocol error: the buffer exists but stays empty.
fn import_params(
    server: &mut Server,
    client_id: ClientId,
    params_id: u32,
    width: i32,
    height: i32,
    format: u32,
    flags: u32,
) -> Result<Option<ImageHandle>, ProtocolError> {
    if width <= 0 || height <= 0 {
        return Err(ProtocolError::Malformed("dmabuf extent must be positive"));
    }
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(ProtocolError::Malformed("unsupported dmabuf format"));
    }

    let planes = {
        let client = super::client_mut(server, client_id)?;
        let builder = client
            .dmabuf_params
            .get_mut(&params_id)
            .ok_or(ProtocolError::UnknownObject(params_id))?;
        if builder.used {
            return Err(ProtocolError::Malformed("buffer params already used"));
        }
        if builder.planes.is_empty() {
            return Err(ProtocolError::Malformed("dmabuf import with no planes"));
        }
        builder.used = true;
        std::mem::take(&mut builder.planes)
    };

    let import = DmabufImport {
        extent: Extent::new(width as u32, height as u32),
        format,
        flags,
        planes: &planes,
    };
    match server.renderer.gpu.image_import_dmabuf(&import) {
        Ok(image) => {
            let mut cmd = server.renderer.gpu.begin_commands();
            cmd.transition(image, ImageLayout::Undefined, ImageLayout::General);
            server.renderer.gpu.submit_commands(cmd);
            Ok(Some(image))
        }
        Err(err) => {
            tracing::error!("dmabuf import failed: {}", err);
            Ok(None)
        }
    }
}
