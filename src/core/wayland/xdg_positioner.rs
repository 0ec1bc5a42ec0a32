//! xdg_positioner: accumulate placement rules for popups.

use crate::core::client::ClientId;
use crate::core::errors::ProtocolError;
use crate::core::protocol::dispatch::Target;
use crate::core::protocol::wire::MessageReader;
use crate::core::server::Server;
use crate::core::shell::Positioner;
use crate::core::types::Rect;

fn positioner_mut<'a>(
    server: &'a mut Server,
    client_id: ClientId,
    target: Target,
) -> Result<&'a mut Positioner, ProtocolError> {
    let client = super::client_mut(server, client_id)?;
    client
        .positioners
        .get_mut(&target.id)
        .ok_or(ProtocolError::UnknownObject(target.id))
}

pub fn destroy(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let client = super::client_mut(server, client_id)?;
    client.positioners.remove(&target.id);
    super::destroy_object(client, target.id);
    Ok(())
}

pub fn set_size(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let size = (msg.int()?, msg.int()?);
    if size.0 <= 0 || size.1 <= 0 {
        return Err(ProtocolError::Malformed("positioner size must be positive"));
    }
    positioner_mut(server, client_id, target)?.size = Some(size);
    Ok(())
}

pub fn set_anchor_rect(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let rect = Rect::new(msg.int()?, msg.int()?, msg.int()?, msg.int()?);
    positioner_mut(server, client_id, target)?.anchor_rect = Some(rect);
    Ok(())
}

pub fn set_anchor(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let anchor = msg.uint()?;
    positioner_mut(server, client_id, target)?.anchor = anchor;
    Ok(())
}

pub fn set_gravity(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let gravity = msg.uint()?;
    positioner_mut(server, client_id, target)?.gravity = gravity;
    Ok(())
}

pub fn set_constraint_adjustment(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let adjustment = msg.uint()?;
    positioner_mut(server, client_id, target)?.constraint_adjustment = adjustment;
    Ok(())
}

pub fn set_offset(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let offset = (msg.int()?, msg.int()?);
    positioner_mut(server, client_id, target)?.offset = offset;
    Ok(())
}

pub fn set_reactive(
    _server: &mut Server,
    _client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    tracing::trace!("xdg_positioner.set_reactive({})", target.id);
    Ok(())
}

pub fn set_parent_size(
    _server: &mut Server,
    _client_id: ClientId,
    _target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let _parent = (msg.int()?, msg.int()?);
    Ok(())
}

pub fn set_parent_configure(
    _server: &mut Server,
    _client_id: ClientId,
    _target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let _serial = msg.uint()?;
    Ok(())
}
