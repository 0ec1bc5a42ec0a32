//! wl_compositor and wl_region.

use crate::core::client::ClientId;
use crate::core::errors::ProtocolError;
use crate::core::protocol::dispatch::Target;
use crate::core::protocol::objects::{ObjectEntry, ObjectKind};
use crate::core::protocol::wire::MessageReader;
use crate::core::protocol::Interface;
use crate::core::server::Server;
use crate::core::types::{Rect, Region};

pub fn create_surface(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let wl_id = msg.new_id()?;
    let surface = server.create_surface(client_id, wl_id);

    let client = super::client_mut(server, client_id)?;
    client.objects.register(
        wl_id,
        ObjectEntry {
            interface: Interface::WlSurface,
            version: target.version,
            kind: ObjectKind::Surface { surface },
        },
    )?;
    Ok(())
}

pub fn create_region(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let region_id = msg.new_id()?;
    let client = super::client_mut(server, client_id)?;
    client.objects.register(
        region_id,
        ObjectEntry {
            interface: Interface::WlRegion,
            version: target.version,
            kind: ObjectKind::Region,
        },
    )?;
    client.regions.insert(region_id, Region::default());
    Ok(())
}

// ============================================================================
// wl_region
// ============================================================================

pub fn region_destroy(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let client = super::client_mut(server, client_id)?;
    client.regions.remove(&target.id);
    super::destroy_object(client, target.id);
    Ok(())
}

pub fn region_add(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let rect = read_rect(msg)?;
    let client = super::client_mut(server, client_id)?;
    if let Some(region) = client.regions.get_mut(&target.id) {
        region.add(rect);
    }
    Ok(())
}

pub fn region_subtract(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let rect = read_rect(msg)?;
    let client = super::client_mut(server, client_id)?;
    if let Some(region) = client.regions.get_mut(&target.id) {
        region.subtract(rect);
    }
    Ok(())
}

fn read_rect(msg: &mut MessageReader<'_>) -> Result<Rect, ProtocolError> {
    Ok(Rect::new(msg.int()?, msg.int()?, msg.int()?, msg.int()?))
}
