//! wl_seat, wl_keyboard, wl_pointer and wl_touch.

use crate::core::client::{Client, ClientId};
use crate::core::errors::ProtocolError;
use crate::core::input::keyboard::{KeyboardResource, Modifiers};
use crate::core::input::pointer::PointerResource;
use crate::core::protocol::dispatch::Target;
use crate::core::protocol::objects::{ObjectEntry, ObjectKind};
use crate::core::protocol::wire::{MessageReader, MessageWriter};
use crate::core::protocol::Interface;
use crate::core::seat::{SeatResource, SEAT_NAME};
use crate::core::server::Server;

const EVT_SEAT_CAPABILITIES: u16 = 0;
const EVT_SEAT_NAME: u16 = 1;

const EVT_KEYBOARD_KEYMAP: u16 = 0;
const EVT_KEYBOARD_ENTER: u16 = 1;
const EVT_KEYBOARD_LEAVE: u16 = 2;
const EVT_KEYBOARD_KEY: u16 = 3;
const EVT_KEYBOARD_MODIFIERS: u16 = 4;
const EVT_KEYBOARD_REPEAT_INFO: u16 = 5;

const EVT_POINTER_ENTER: u16 = 0;
const EVT_POINTER_LEAVE: u16 = 1;
const EVT_POINTER_MOTION: u16 = 2;
const EVT_POINTER_BUTTON: u16 = 3;
const EVT_POINTER_AXIS: u16 = 4;
const EVT_POINTER_FRAME: u16 = 5;

const KEYMAP_FORMAT_XKB_V1: u32 = 1;

/// Capabilities and name go out on every fresh binding.
pub fn on_bind(
    server: &mut Server,
    client_id: ClientId,
    seat_id: u32,
    version: u32,
) -> Result<(), ProtocolError> {
    server.seat.resources.push(SeatResource { client: client_id, id: seat_id, version });
    let caps = server.seat.capabilities();
    let client = super::client_mut(server, client_id)?;
    send_capabilities(client, seat_id, caps);
    if version >= 2 {
        let mut msg = MessageWriter::new(seat_id, EVT_SEAT_NAME);
        msg.string(SEAT_NAME);
        client.queue(msg.finish());
    }
    Ok(())
}

pub fn get_pointer(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let pointer_id = msg.new_id()?;
    let client = super::client_mut(server, client_id)?;
    client.objects.register(
        pointer_id,
        ObjectEntry {
            interface: Interface::WlPointer,
            version: target.version,
            kind: ObjectKind::Pointer,
        },
    )?;
    server.seat.pointer.resources.push(PointerResource {
        client: client_id,
        id: pointer_id,
        version: target.version,
    });
    tracing::debug!("wl_seat.get_pointer(id = {}) for client {}", pointer_id, client_id);
    Ok(())
}

pub fn get_keyboard(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let keyboard_id = msg.new_id()?;
    {
        let client = super::client_mut(server, client_id)?;
        client.objects.register(
            keyboard_id,
            ObjectEntry {
                interface: Interface::WlKeyboard,
                version: target.version,
                kind: ObjectKind::Keyboard,
            },
        )?;
    }

    // Keymap first, then repeat info; both precede any key events.
    let keymap = server
        .seat
        .keyboard
        .keymap_file()
        .and_then(|sealed| match sealed.file.try_clone() {
            Ok(file) => Some((file, sealed.size)),
            Err(err) => {
                tracing::error!("keymap fd dup failed: {}", err);
                None
            }
        });
    let (rate, delay) = (server.seat.keyboard.repeat_rate, server.seat.keyboard.repeat_delay);

    let client = super::client_mut(server, client_id)?;
    match keymap {
        Some((file, size)) => {
            let mut msg = MessageWriter::new(keyboard_id, EVT_KEYBOARD_KEYMAP);
            msg.uint(KEYMAP_FORMAT_XKB_V1).uint(size);
            client.queue_with_fd(msg.finish(), file.into());
        }
        None => {
            // Distribution failed at startup; the event is suppressed.
            tracing::warn!("no keymap available for client {}", client_id);
        }
    }
    if target.version >= 4 {
        send_repeat_info(client, keyboard_id, rate, delay);
    }

    server.seat.keyboard.resources.push(KeyboardResource {
        client: client_id,
        id: keyboard_id,
        version: target.version,
    });
    tracing::debug!("wl_seat.get_keyboard(id = {}) for client {}", keyboard_id, client_id);
    Ok(())
}

pub fn get_touch(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let touch_id = msg.new_id()?;
    let client = super::client_mut(server, client_id)?;
    client.objects.register(
        touch_id,
        ObjectEntry {
            interface: Interface::WlTouch,
            version: target.version,
            kind: ObjectKind::Touch,
        },
    )?;
    // No touch device is ever reported; the object stays inert.
    tracing::debug!("wl_seat.get_touch(id = {}) for client {}", touch_id, client_id);
    Ok(())
}

pub fn seat_release(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    server
        .seat
        .resources
        .retain(|r| !(r.client == client_id && r.id == target.id));
    let client = super::client_mut(server, client_id)?;
    super::destroy_object(client, target.id);
    Ok(())
}

pub fn keyboard_release(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    server
        .seat
        .keyboard
        .resources
        .retain(|r| !(r.client == client_id && r.id == target.id));
    if server.seat.keyboard.focus.map(|f| (f.client, f.resource)) == Some((client_id, target.id)) {
        server.seat.keyboard.focus = None;
    }
    let client = super::client_mut(server, client_id)?;
    super::destroy_object(client, target.id);
    Ok(())
}

pub fn pointer_set_cursor(
    server: &mut Server,
    _client_id: ClientId,
    _target: Target,
    msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let serial = msg.uint()?;
    let surface = msg.object_id()?;
    let hotspot = (msg.int()?, msg.int()?);
    let _ = server;
    tracing::debug!(
        "wl_pointer.set_cursor(serial = {}, surface = {}, hotspot = {:?})",
        serial,
        surface,
        hotspot
    );
    Ok(())
}

pub fn pointer_release(
    server: &mut Server,
    client_id: ClientId,
    target: Target,
    _msg: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    server
        .seat
        .pointer
        .resources
        .retain(|r| !(r.client == client_id && r.id == target.id));
    if server.seat.pointer.focus.map(|f| (f.client, f.resource)) == Some((client_id, target.id)) {
        server.seat.pointer.focus = None;
    }
    let client = super::client_mut(server, client_id)?;
    super::destroy_object(client, target.id);
    Ok(())
}

pub fn touch_release(
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
// Events
// ============================================================================

pub fn send_capabilities(client: &mut Client, seat_id: u32, caps: u32) {
    let mut msg = MessageWriter::new(seat_id, EVT_SEAT_CAPABILITIES);
    msg.uint(caps);
    client.queue(msg.finish());
}

pub fn send_repeat_info(client: &mut Client, keyboard_id: u32, rate: i32, delay: i32) {
    let mut msg = MessageWriter::new(keyboard_id, EVT_KEYBOARD_REPEAT_INFO);
    msg.int(rate).int(delay);
    client.queue(msg.finish());
}

pub fn send_keyboard_enter(
    client: &mut Client,
    keyboard_id: u32,
    serial: u32,
    surface_wl_id: u32,
    pressed: &[u32],
) {
    let mut keys = Vec::with_capacity(pressed.len() * 4);
    for key in pressed {
        keys.extend_from_slice(&key.to_ne_bytes());
    }
    let mut msg = MessageWriter::new(keyboard_id, EVT_KEYBOARD_ENTER);
    msg.uint(serial).object(surface_wl_id).array(&keys);
    client.queue(msg.finish());
}

pub fn send_keyboard_leave(client: &mut Client, keyboard_id: u32, serial: u32, surface_wl_id: u32) {
    let mut msg = MessageWriter::new(keyboard_id, EVT_KEYBOARD_LEAVE);
    msg.uint(serial).object(surface_wl_id);
    client.queue(msg.finish());
}

pub fn send_keyboard_key(
    client: &mut Client,
    keyboard_id: u32,
    serial: u32,
    time_ms: u32,
    keycode: u32,
    pressed: bool,
) {
    let mut msg = MessageWriter::new(keyboard_id, EVT_KEYBOARD_KEY);
    msg.uint(serial).uint(time_ms).uint(keycode).uint(pressed as u32);
    client.queue(msg.finish());
}

pub fn send_keyboard_modifiers(client: &mut Client, keyboard_id: u32, serial: u32, mods: Modifiers) {
    let mut msg = MessageWriter::new(keyboard_id, EVT_KEYBOARD_MODIFIERS);
    msg.uint(serial)
        .uint(mods.depressed)
        .uint(mods.latched)
        .uint(mods.locked)
        .uint(mods.group);
    client.queue(msg.finish());
}

fn pointer_version(client: &Client, pointer_id: u32) -> u32 {
    client.objects.get(pointer_id).map(|e| e.version).unwrap_or(1)
}

fn send_pointer_frame(client: &mut Client, pointer_id: u32) {
    if pointer_version(client, pointer_id) >= 5 {
        let mut msg = MessageWriter::new(pointer_id, EVT_POINTER_FRAME);
        client.queue(msg.finish());
    }
}

pub fn send_pointer_enter(
    client: &mut Client,
    pointer_id: u32,
    serial: u32,
    surface_wl_id: u32,
    x: f64,
    y: f64,
) {
    let mut msg = MessageWriter::new(pointer_id, EVT_POINTER_ENTER);
    msg.uint(serial).object(surface_wl_id).fixed(x).fixed(y);
    client.queue(msg.finish());
    send_pointer_frame(client, pointer_id);
}

pub fn send_pointer_leave(client: &mut Client, pointer_id: u32, serial: u32, surface_wl_id: u32) {
    let mut msg = MessageWriter::new(pointer_id, EVT_POINTER_LEAVE);
    msg.uint(serial).object(surface_wl_id);
    client.queue(msg.finish());
    send_pointer_frame(client, pointer_id);
}

pub fn send_pointer_motion(client: &mut Client, pointer_id: u32, time_ms: u32, x: f64, y: f64) {
    let mut msg = MessageWriter::new(pointer_id, EVT_POINTER_MOTION);
    msg.uint(time_ms).fixed(x).fixed(y);
    client.queue(msg.finish());
    send_pointer_frame(client, pointer_id);
}

pub fn send_pointer_button(
    client: &mut Client,
    pointer_id: u32,
    serial: u32,
    time_ms: u32,
    button: u32,
    pressed: bool,
) {
    let mut msg = MessageWriter::new(pointer_id, EVT_POINTER_BUTTON);
    msg.uint(serial).uint(time_ms).uint(button).uint(pressed as u32);
    client.queue(msg.finish());
    send_pointer_frame(client, pointer_id);
}

pub fn send_pointer_axis(client: &mut Client, pointer_id: u32, time_ms: u32, axis: u32, value: f64) {
    let mut msg = MessageWriter::new(pointer_id, EVT_POINTER_AXIS);
    msg.uint(time_ms).uint(axis).fixed(value);
    client.queue(msg.finish());
    send_pointer_frame(client, pointer_id);
}
