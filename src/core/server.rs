//! The server: ownership root and event-loop glue.
//!
//! Owns the listening socket, the clients, the global registry, the
//! surface store, the seat, the outputs, the renderer and the backend.
//! Everything runs on the event-loop thread; request handlers, input
//! events and frame ticks all run to completion before the next one.

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::os::unix::net::UnixStream;
use std::time::Instant;

use crate::core::backend::{Backend, BackendEvent};
use crate::core::client::{Client, ClientId, SessionState};
use crate::core::errors::{ProtocolError, RenderError, ServerError};
use crate::core::event_loop::{EventLoop, LoopControl, Readiness};
use crate::core::input::{keyboard, pointer};
use crate::core::output::{self, Output, FALLBACK_EXTENT};
use crate::core::protocol::dispatch::{self, Target};
use crate::core::protocol::objects::ServerIdAllocator;
use crate::core::protocol::wire::MessageReader;
use crate::core::protocol::Interface;
use crate::core::registry::GlobalRegistry;
use crate::core::render::{GpuContext, Renderer, Swapchain};
use crate::core::seat::Seat;
use crate::core::socket::ListeningSocket;
use crate::core::surface::{Surface, SurfaceId};
use crate::core::types::Extent;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { socket_name: "wayland-1".to_string() }
    }
}

/// Builds a swapchain for a new or resized output. The WSI layer is a
/// collaborator, so the concrete choice is injected at construction.
pub type SwapchainFactory =
    Box<dyn FnMut(&mut dyn GpuContext, Extent) -> Result<Box<dyn Swapchain>, RenderError>>;

pub struct Server {
    pub config: ServerConfig,
    pub socket: ListeningSocket,
    pub clients: HashMap<ClientId, Client>,
    pub clients_by_fd: HashMap<RawFd, ClientId>,
    next_client_id: ClientId,
    pub globals: GlobalRegistry,
    pub surfaces: HashMap<SurfaceId, Surface>,
    /// Composition order, oldest first.
    pub z_order: Vec<SurfaceId>,
    next_surface_id: SurfaceId,
    pub seat: Seat,
    pub outputs: Vec<Output>,
    next_output_id: u32,
    pub renderer: Renderer,
    pub backend: Box<dyn Backend>,
    swapchains: SwapchainFactory,
    pub server_ids: ServerIdAllocator,
    serial: u32,
    started_at: Instant,
    closed_clients: Vec<ClientId>,
    frame_requested: bool,
    pub stopping: bool,
}

impl Server {
    pub fn new(
        config: ServerConfig,
        backend: Box<dyn Backend>,
        gpu: Box<dyn GpuContext>,
        swapchains: SwapchainFactory,
    ) -> Result<Self, ServerError> {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .map_err(|_| ServerError::Init("XDG_RUNTIME_DIR is not set".into()))?;

        let socket = ListeningSocket::bind(&runtime_dir, &config.socket_name)
            .map_err(|err| ServerError::Init(format!("{:#}", err)))?;

        let mut globals = GlobalRegistry::new();
        for (interface, version) in [
            (Interface::WlCompositor, 5),
            (Interface::WlShm, 1),
            (Interface::WlSeat, 7),
            (Interface::XdgWmBase, 5),
            (Interface::ZxdgDecorationManagerV1, 1),
            (Interface::ZwpLinuxDmabufV1, 4),
        ] {
            globals.advertise(interface, version);
        }

        tracing::info!(
            "compositor listening on {} ({} globals)",
            socket.path().display(),
            globals.len()
        );

        Ok(Server {
            config,
            socket,
            clients: HashMap::new(),
            clients_by_fd: HashMap::new(),
            next_client_id: 1,
            globals,
            surfaces: HashMap::new(),
            z_order: Vec::new(),
            next_surface_id: 1,
            seat: Seat::default(),
            outputs: Vec::new(),
            next_output_id: 1,
            renderer: Renderer::new(gpu),
            backend,
            swapchains,
            server_ids: ServerIdAllocator::default(),
            serial: 0,
            started_at: Instant::now(),
            closed_clients: Vec::new(),
            frame_requested: false,
            stopping: false,
        })
    }

    // =========================================================================
    // Serials and time
    // =========================================================================

    /// One monotonically increasing counter for the whole display;
    /// serials are opaque to clients.
    pub fn next_serial(&mut self) -> u32 {
        self.serial = self.serial.wrapping_add(1);
        self.serial
    }

    /// Server-relative milliseconds since start.
    pub fn time_ms(&self) -> u32 {
        self.started_at.elapsed().as_millis() as u32
    }

    // =========================================================================
    // Clients
    // =========================================================================

    pub fn add_client(&mut self, stream: UnixStream) -> ClientId {
        let id = self.next_client_id;
        self.next_client_id += 1;
        let client = Client::new(id, stream);
        self.clients_by_fd.insert(client.raw_fd(), id);
        tracing::info!("client {} connected (fd {})", id, client.raw_fd());
        self.clients.insert(id, client);
        id
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn client_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    /// Move a session straight to `Closed`. Object teardown happens in
    /// the post-step reaper so no handler observes a half-dead client.
    pub fn disconnect_client(&mut self, id: ClientId, why: &str) {
        let Some(client) = self.clients.get_mut(&id) else { return };
        if client.session == SessionState::Closed {
            return;
        }
        tracing::warn!("disconnecting client {}: {}", id, why);
        client.session = SessionState::Closed;
        client.discard_outgoing();
        self.closed_clients.push(id);
    }

    /// Tear down every closed client: destroy its surfaces, drop its
    /// seat resources, then the client itself (pools, buffers and fds
    /// go with it). Returns the raw fds to unregister.
    pub fn reap_closed_clients(&mut self) -> Vec<RawFd> {
        let mut fds = Vec::new();
        for id in std::mem::take(&mut self.closed_clients) {
            let owned: Vec<SurfaceId> = self
                .surfaces
                .values()
                .filter(|s| s.client == id)
                .map(|s| s.id)
                .collect();
            for surface in owned {
                self.destroy_surface(surface);
            }
            self.seat.drop_client(id);
            if let Some(client) = self.clients.remove(&id) {
                let fd = client.raw_fd();
                self.clients_by_fd.remove(&fd);
                fds.push(fd);
                tracing::info!("client {} destroyed ({} objects)", id, client.objects.len());
            }
        }
        fds
    }

    // =========================================================================
    // Surfaces
    // =========================================================================

    pub fn create_surface(&mut self, client: ClientId, wl_id: u32) -> SurfaceId {
        let id = self.next_surface_id;
        self.next_surface_id += 1;
        self.surfaces.insert(id, Surface::new(id, client, wl_id));
        self.z_order.push(id);
        tracing::debug!("surface {} created for client {}", id, client);
        id
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    pub fn surface_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&id)
    }

    /// Drop a surface and the GPU image it holds. Emits the deferred
    /// dmabuf release when the image came from a still-alive buffer.
    pub fn destroy_surface(&mut self, id: SurfaceId) {
        let Some(surface) = self.surfaces.remove(&id) else { return };
        self.z_order.retain(|&s| s != id);

        if let Some(image) = surface.current.image {
            self.renderer.gpu.image_destroy(image);
            if let Some(buffer_id) = surface.current.dma_source {
                if let Some(client) = self.clients.get_mut(&surface.client) {
                    if client.objects.get(buffer_id).is_some() {
                        crate::core::wayland::shm::send_buffer_release(client, buffer_id);
                    }
                }
            }
        }
        tracing::debug!("surface {} destroyed", id);
    }

    /// Snapshot of (surface, owner, wl_surface id) in composition order,
    /// for input routing.
    pub fn surfaces_in_z(&self) -> Vec<(SurfaceId, ClientId, u32)> {
        self.z_order
            .iter()
            .filter_map(|id| self.surfaces.get(id))
            .map(|s| (s.id, s.client, s.wl_id))
            .collect()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Read and dispatch one message, translating any protocol error
    /// into surgical disconnection of that client.
    pub fn handle_client_input(&mut self, client_id: ClientId) {
        match self.dispatch_one(client_id) {
            Ok(()) => {}
            Err(ProtocolError::Hangup) => {
                tracing::info!("client {} hung up", client_id);
                self.disconnect_client(client_id, "hangup");
            }
            Err(err) => {
                tracing::error!("client {}: {}", client_id, err);
                self.disconnect_client(client_id, "protocol error");
            }
        }
    }

    fn dispatch_one(&mut self, client_id: ClientId) -> Result<(), ProtocolError> {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return Ok(());
        };
        if client.session != SessionState::Active {
            return Ok(());
        }

        let (header, body) = client.read_message()?;
        let entry = client
            .objects
            .get(header.object_id)
            .ok_or(ProtocolError::UnknownObject(header.object_id))?;

        let handler = dispatch::lookup(entry.interface, header.opcode)?;
        tracing::trace!(
            "client {}: {}#{} opcode {} ({} bytes)",
            client_id,
            entry.interface.name(),
            header.object_id,
            header.opcode,
            header.size
        );

        let target = Target {
            id: header.object_id,
            interface: entry.interface,
            version: entry.version,
            kind: entry.kind,
        };
        let mut reader = MessageReader::new(&body);
        handler(self, client_id, target, &mut reader)
    }

    // =========================================================================
    // Backend events
    // =========================================================================

    pub fn pump_backend(&mut self) {
        for event in self.backend.drain_events() {
            self.handle_backend_event(event);
        }
    }

    /// Feed one backend event directly, bypassing the backend's queue.
    /// Used by nested glue and tests.
    pub fn deliver_backend_event(&mut self, event: BackendEvent) {
        self.handle_backend_event(event);
    }

    fn handle_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::OutputAdded { extent } => {
                let extent = if extent.is_empty() {
                    tracing::info!(
                        "backend reported zero-extent output, using {}x{}",
                        FALLBACK_EXTENT.width,
                        FALLBACK_EXTENT.height
                    );
                    FALLBACK_EXTENT
                } else {
                    extent
                };
                match (self.swapchains)(self.renderer.gpu.as_mut(), extent) {
                    Ok(swapchain) => {
                        let id = self.next_output_id;
                        self.next_output_id += 1;
                        tracing::info!("output {} added ({}x{})", id, extent.width, extent.height);
                        self.outputs.push(Output { id, extent, swapchain, frame_counter: 0 });
                        self.request_frame();
                    }
                    Err(err) => tracing::error!("output swapchain creation failed: {}", err),
                }
            }
            BackendEvent::OutputResized { output, extent } => {
                let Some(index) = self.outputs.iter().position(|o| o.id == output) else {
                    return;
                };
                let extent = if extent.is_empty() { FALLBACK_EXTENT } else { extent };
                match (self.swapchains)(self.renderer.gpu.as_mut(), extent) {
                    Ok(swapchain) => {
                        let out = &mut self.outputs[index];
                        out.extent = extent;
                        out.swapchain = swapchain;
                        tracing::info!("output {} resized to {}x{}", output, extent.width, extent.height);
                        self.request_frame();
                    }
                    Err(err) => tracing::error!("output swapchain rebuild failed: {}", err),
                }
            }
            BackendEvent::OutputRemoved { output } => {
                self.outputs.retain(|o| o.id != output);
                tracing::info!("output {} removed", output);
            }
            BackendEvent::Frame => self.request_frame(),
            BackendEvent::SeatCapabilities { keyboard, pointer } => {
                if self.seat.set_capabilities(keyboard, pointer) {
                    let caps = self.seat.capabilities();
                    for resource in self.seat.resources.clone() {
                        if let Some(client) = self.clients.get_mut(&resource.client) {
                            crate::core::wayland::seat::send_capabilities(client, resource.id, caps);
                        }
                    }
                }
            }
            BackendEvent::Key { keycode, pressed } => {
                let surfaces = self.surfaces_in_z();
                let time = self.time_ms();
                let Server { seat, clients, serial, .. } = self;
                let mut next = || {
                    *serial = serial.wrapping_add(1);
                    *serial
                };
                keyboard::route_key(&mut seat.keyboard, clients, &surfaces, &mut next, time, keycode, pressed);
            }
            BackendEvent::Modifiers(mods) => {
                let Server { seat, clients, serial, .. } = self;
                let mut next = || {
                    *serial = serial.wrapping_add(1);
                    *serial
                };
                keyboard::route_modifiers(&mut seat.keyboard, clients, &mut next, mods);
            }
            BackendEvent::RepeatInfo { rate, delay } => {
                self.seat.keyboard.repeat_rate = rate;
                self.seat.keyboard.repeat_delay = delay;
                for resource in self.seat.keyboard.resources.clone() {
                    if resource.version >= 4 {
                        if let Some(client) = self.clients.get_mut(&resource.client) {
                            crate::core::wayland::seat::send_repeat_info(client, resource.id, rate, delay);
                        }
                    }
                }
            }
            BackendEvent::PointerMotion { x, y } => {
                let surfaces = self.surfaces_in_z();
                let time = self.time_ms();
                let Server { seat, clients, serial, .. } = self;
                let mut next = || {
                    *serial = serial.wrapping_add(1);
                    *serial
                };
                pointer::route_motion(&mut seat.pointer, clients, &surfaces, &mut next, time, x, y);
            }
            BackendEvent::PointerButton { button, pressed } => {
                let time = self.time_ms();
                let Server { seat, clients, serial, .. } = self;
                let mut next = || {
                    *serial = serial.wrapping_add(1);
                    *serial
                };
                pointer::route_button(&mut seat.pointer, clients, &mut next, time, button, pressed);
            }
            BackendEvent::PointerAxis { horizontal, vertical } => {
                let time = self.time_ms();
                let Server { seat, clients, .. } = self;
                pointer::route_axis(&mut seat.pointer, clients, time, horizontal, vertical);
            }
            BackendEvent::PointerAxisDiscrete { axis, steps } => {
                tracing::debug!("pointer axis discrete (axis {}, steps {})", axis, steps);
            }
            BackendEvent::PointerAxisValue120 { axis, value } => {
                tracing::debug!("pointer axis value120 (axis {}, value {})", axis, value);
            }
            BackendEvent::Closed => {
                tracing::warn!("backend session closed, shutting down");
                self.stopping = true;
            }
        }
    }

    // =========================================================================
    // Frame pacing and flushing
    // =========================================================================

    pub fn request_frame(&mut self) {
        self.frame_requested = true;
    }

    pub fn take_frame_request(&mut self) -> bool {
        std::mem::take(&mut self.frame_requested)
    }

    /// Flush every active client's outgoing queue; write failures close
    /// the session.
    pub fn flush_clients(&mut self) {
        let ids: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, c)| !c.is_closed() && c.has_outgoing())
            .map(|(&id, _)| id)
            .collect();
        for id in ids {
            let result = self.clients.get_mut(&id).map(|c| c.flush());
            if let Some(Err(err)) = result {
                tracing::warn!("flush to client {} failed: {}", id, err);
                self.disconnect_client(id, "write failure");
            }
        }
    }

    /// Begin shutdown: drain remaining events, then stop the loop.
    pub fn stop(&mut self) {
        for client in self.clients.values_mut() {
            if !client.is_closed() {
                client.session = SessionState::Draining;
            }
        }
        self.stopping = true;
    }
}

// ============================================================================
// Event-loop wiring
// ============================================================================

fn on_listener_readable(server: &mut Server, control: &mut LoopControl<Server>, _fd: RawFd, _r: Readiness) {
    loop {
        match server.socket.accept() {
            Ok(Some(stream)) => {
                let id = server.add_client(stream);
                if let Some(client) = server.client(id) {
                    control.add_fd(client.raw_fd(), on_client_readable);
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::error!("accept failed: {}", err);
                break;
            }
        }
    }
}

fn on_client_readable(server: &mut Server, _control: &mut LoopControl<Server>, fd: RawFd, readiness: Readiness) {
    let Some(&client_id) = server.clients_by_fd.get(&fd) else {
        return;
    };
    if readiness.hangup {
        tracing::info!("client {} hung up", client_id);
        server.disconnect_client(client_id, "hangup");
        return;
    }
    if readiness.readable {
        server.handle_client_input(client_id);
    }
}

fn on_backend_readable(server: &mut Server, _control: &mut LoopControl<Server>, _fd: RawFd, _r: Readiness) {
    server.pump_backend();
}

/// The single post-step hook: run any requested frame ticks, flush
/// per-client queues and backend writes, then reap closed sessions.
fn post_step(server: &mut Server, control: &mut LoopControl<Server>) {
    if server.take_frame_request() {
        for index in 0..server.outputs.len() {
            output::frame(server, index);
        }
    }

    server.flush_clients();
    for fd in server.reap_closed_clients() {
        control.remove_fd(fd);
    }
    server.backend.flush();

    if server.stopping {
        control.stop();
    }
}

/// Run the compositor until the backend closes or a shutdown request
/// arrives.
pub fn run(mut server: Server) -> Result<(), ServerError> {
    let mut event_loop = EventLoop::new()?;
    event_loop.add_fd(server.socket.raw_fd(), on_listener_readable)?;
    if let Some(fd) = server.backend.poll_fd() {
        event_loop.add_fd(fd, on_backend_readable)?;
    }
    event_loop.add_post_step(post_step);

    // Deliver startup state (outputs, seat capabilities) before the
    // first client can connect.
    server.pump_backend();
    if server.take_frame_request() {
        for index in 0..server.outputs.len() {
            output::frame(&mut server, index);
        }
    }

    tracing::info!("running compositor");
    event_loop.run(&mut server)?;
    tracing::info!("compositor shutting down");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::HeadlessBackend;
    use crate::core::buffer::BufferRecord;
    use crate::core::input::keyboard::Modifiers;
    use crate::core::keymap::ensure_test_runtime_dir;
    use crate::core::protocol::wire::{MessageHeader, MessageWriter};
    use crate::core::render::headless::{HeadlessGpu, HeadlessSwapchain};
    use crate::core::wayland::linux_dmabuf::DRM_FORMAT_XRGB8888;
    use std::io::{Read, Write};
    use std::os::fd::{AsRawFd, RawFd};
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicU32, Ordering};

    const XRGB8888: u32 = 1;

    fn test_server() -> Server {
        ensure_test_runtime_dir();
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let config = ServerConfig {
            socket_name: format!("wayland-test-{}", COUNTER.fetch_add(1, Ordering::Relaxed)),
        };
        let mut server = Server::new(
            config,
            Box::new(HeadlessBackend::new()),
            Box::new(HeadlessGpu::new()),
            Box::new(|gpu: &mut dyn GpuContext, extent: Extent| {
                HeadlessSwapchain::new(gpu, extent).map(|chain| Box::new(chain) as Box<dyn Swapchain>)
            }),
        )
        .unwrap();
        server.pump_backend();
        server
    }

    fn connect(server: &mut Server) -> (ClientId, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let id = server.add_client(ours);
        (id, theirs)
    }

    fn request(server: &mut Server, id: ClientId, remote: &mut UnixStream, frame: Vec<u8>) {
        remote.write_all(&frame).unwrap();
        server.handle_client_input(id);
    }

    fn request_with_fd(
        server: &mut Server,
        id: ClientId,
        remote: &mut UnixStream,
        frame: Vec<u8>,
        fd: RawFd,
    ) {
        use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};
        use std::io::IoSlice;
        let iov = [IoSlice::new(&frame)];
        let fds = [fd];
        let cmsg = [ControlMessage::ScmRights(&fds)];
        sendmsg::<()>(remote.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None).unwrap();
        server.handle_client_input(id);
    }

    /// Flush the server side and parse everything queued for us.
    fn drain(server: &mut Server, remote: &mut UnixStream) -> Vec<(MessageHeader, Vec<u8>)> {
        server.flush_clients();
        remote.set_nonblocking(true).unwrap();
        let mut bytes = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match remote.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => bytes.extend_from_slice(&buf[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => panic!("read failed: {err}"),
            }
        }
        remote.set_nonblocking(false).unwrap();

        let mut frames = Vec::new();
        let mut offset = 0;
        while offset + MessageHeader::SIZE <= bytes.len() {
            let header = MessageHeader::parse(bytes[offset..offset + 8].try_into().unwrap());
            let end = offset + header.size as usize;
            frames.push((header, bytes[offset + 8..end].to_vec()));
            offset = end;
        }
        assert_eq!(offset, bytes.len(), "trailing partial frame");
        frames
    }

    fn u32_at(body: &[u8], index: usize) -> u32 {
        u32::from_ne_bytes(body[index * 4..index * 4 + 4].try_into().unwrap())
    }

    fn global_name(server: &Server, interface: &str) -> u32 {
        server
            .globals
            .iter()
            .find(|g| g.interface.name() == interface)
            .unwrap()
            .name
    }

    fn bind_global(
        server: &mut Server,
        id: ClientId,
        remote: &mut UnixStream,
        registry: u32,
        interface: &str,
        version: u32,
        new_id: u32,
    ) {
        let name = global_name(server, interface);
        let mut msg = MessageWriter::new(registry, 0);
        msg.uint(name).string(interface).uint(version).uint(new_id);
        request(server, id, remote, msg.finish());
    }

    fn anonymous_file(contents: &[u8]) -> std::fs::File {
        let path = std::env::temp_dir().join(format!(
            "tioga-server-test-{}-{:x}",
            std::process::id(),
            rand::random::<u32>()
        ));
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .unwrap();
        std::fs::remove_file(&path).unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn test_output_fallback_extent() {
        let server = test_server();
        assert_eq!(server.outputs.len(), 1);
        assert_eq!(server.outputs[0].extent, Extent::new(1280, 720));
    }

    #[test]
    fn test_handshake_registry_then_sync() {
        let mut server = test_server();
        let (id, mut remote) = connect(&mut server);

        // wl_display.get_registry(id = 2)
        request(&mut server, id, &mut remote, MessageWriter::new(1, 1).uint(2).finish());
        let frames = drain(&mut server, &mut remote);
        let globals: Vec<_> = frames
            .iter()
            .filter(|(h, _)| h.object_id == 2 && h.opcode == 0)
            .collect();
        assert_eq!(globals.len(), server.globals.len());
        // No `done` until an explicit sync.
        assert_eq!(frames.len(), globals.len());

        // wl_display.sync(id = 3)
        request(&mut server, id, &mut remote, MessageWriter::new(1, 0).uint(3).finish());
        let frames = drain(&mut server, &mut remote);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].0.object_id, 3);
        assert_eq!(frames[0].0.opcode, 0);
        assert_eq!(u32_at(&frames[0].1, 0), 0);
        // wl_display.delete_id(3)
        assert_eq!(frames[1].0.object_id, 1);
        assert_eq!(frames[1].0.opcode, 1);
        assert_eq!(u32_at(&frames[1].1, 0), 3);
    }

    #[test]
    fn test_unknown_object_disconnects() {
        let mut server = test_server();
        let (id, mut remote) = connect(&mut server);
        request(&mut server, id, &mut remote, MessageWriter::new(99, 0).finish());
        assert!(server.client(id).unwrap().is_closed());
    }

    #[test]
    fn test_disconnect_isolation() {
        let mut server = test_server();
        let (a, mut remote_a) = connect(&mut server);
        let (b, mut remote_b) = connect(&mut server);

        // A sends a header whose size field is 7.
        let mut bad = Vec::new();
        bad.extend_from_slice(&1u32.to_ne_bytes());
        bad.extend_from_slice(&0u16.to_ne_bytes());
        bad.extend_from_slice(&7u16.to_ne_bytes());
        remote_a.write_all(&bad).unwrap();
        server.handle_client_input(a);

        assert!(server.client(a).unwrap().is_closed());
        let fds = server.reap_closed_clients();
        assert_eq!(fds.len(), 1);
        assert!(server.client(a).is_none());

        // B's session continues unimpeded.
        request(&mut server, b, &mut remote_b, MessageWriter::new(1, 0).uint(3).finish());
        let frames = drain(&mut server, &mut remote_b);
        assert_eq!(frames[0].0.object_id, 3);
        let _ = drain(&mut server, &mut remote_a);
    }

    /// Scenario: 4-byte pool, 1x1 XRGB8888 buffer, toplevel surface,
    /// configure/ack round trip, then content and release.
    #[test]
    fn test_shm_one_pixel_commit() {
        let mut server = test_server();
        let (id, mut remote) = connect(&mut server);

        request(&mut server, id, &mut remote, MessageWriter::new(1, 1).uint(2).finish());
        bind_global(&mut server, id, &mut remote, 2, "wl_compositor", 5, 10);
        bind_global(&mut server, id, &mut remote, 2, "wl_shm", 1, 11);
        bind_global(&mut server, id, &mut remote, 2, "xdg_wm_base", 5, 12);
        drain(&mut server, &mut remote);

        // wl_shm.create_pool(id = 13, size = 4)
        let pool_file = anonymous_file(&[0x10, 0x20, 0x30, 0xFF]);
        request_with_fd(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(11, 0).uint(13).int(4).finish(),
            pool_file.as_raw_fd(),
        );
        // wl_shm_pool.create_buffer(id = 14, offset 0, 1x1, stride 4, xrgb)
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(13, 0)
                .uint(14)
                .int(0)
                .int(1)
                .int(1)
                .int(4)
                .uint(XRGB8888)
                .finish(),
        );
        // wl_compositor.create_surface(id = 15)
        request(&mut server, id, &mut remote, MessageWriter::new(10, 0).uint(15).finish());
        // xdg_wm_base.get_xdg_surface(id = 16, surface = 15)
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(12, 2).uint(16).object(15).finish(),
        );
        // xdg_surface.get_toplevel(id = 17)
        request(&mut server, id, &mut remote, MessageWriter::new(16, 1).uint(17).finish());
        // wl_surface.attach(buffer 14) + wl_surface.frame(18) + commit
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(15, 1).object(14).int(0).int(0).finish(),
        );
        request(&mut server, id, &mut remote, MessageWriter::new(15, 3).uint(18).finish());
        request(&mut server, id, &mut remote, MessageWriter::new(15, 6).finish());

        let frames = drain(&mut server, &mut remote);
        // Exactly one xdg_toplevel.configure(0, 0, [ACTIVATED]).
        let configures: Vec<_> = frames
            .iter()
            .filter(|(h, _)| h.object_id == 17 && h.opcode == 0)
            .collect();
        assert_eq!(configures.len(), 1);
        let body = &configures[0].1;
        assert_eq!(u32_at(body, 0), 0);
        assert_eq!(u32_at(body, 1), 0);
        assert_eq!(u32_at(body, 2), 4); // states array: 4 bytes
        assert_eq!(u32_at(body, 3), crate::core::wayland::xdg_toplevel::STATE_ACTIVATED);
        // configure_bounds and wm_capabilities precede and follow it.
        assert!(frames.iter().any(|(h, _)| h.object_id == 17 && h.opcode == 2));
        assert!(frames.iter().any(|(h, _)| h.object_id == 17 && h.opcode == 3));
        // Then xdg_surface.configure(serial).
        let xdg_configure = frames
            .iter()
            .find(|(h, _)| h.object_id == 16 && h.opcode == 0)
            .expect("missing xdg_surface.configure");
        let serial = u32_at(&xdg_configure.1, 0);
        // No buffer release yet; content is delayed until the round
        // trip completes.
        assert!(!frames.iter().any(|(h, _)| h.object_id == 14));
        let surface_id = server.surfaces.values().find(|s| s.wl_id == 15).unwrap().id;
        assert!(!server.surface(surface_id).unwrap().is_mapped());

        // ack_configure(serial) + second commit.
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(16, 4).uint(serial).finish(),
        );
        request(&mut server, id, &mut remote, MessageWriter::new(15, 6).finish());

        let frames = drain(&mut server, &mut remote);
        assert!(frames.iter().any(|(h, _)| h.object_id == 14 && h.opcode == 0), "no release");
        assert!(server.surface(surface_id).unwrap().is_mapped());
        assert_eq!(server.surface(surface_id).unwrap().current.image_extent, Extent::new(1, 1));

        // A frame tick consumes the armed callback.
        crate::core::output::frame(&mut server, 0);
        let frames = drain(&mut server, &mut remote);
        let done = frames
            .iter()
            .find(|(h, _)| h.object_id == 18 && h.opcode == 0)
            .expect("missing wl_callback.done");
        assert_eq!(done.1.len(), 4);
        assert!(frames
            .iter()
            .any(|(h, b)| h.object_id == 1 && h.opcode == 1 && u32_at(b, 0) == 18));
    }

    #[test]
    fn test_create_buffer_bounds() {
        let mut server = test_server();
        let (id, mut remote) = connect(&mut server);

        request(&mut server, id, &mut remote, MessageWriter::new(1, 1).uint(2).finish());
        bind_global(&mut server, id, &mut remote, 2, "wl_shm", 1, 11);

        let pool_file = anonymous_file(&[0u8; 16]);
        request_with_fd(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(11, 0).uint(13).int(16).finish(),
            pool_file.as_raw_fd(),
        );

        // stride * height + offset == size: accepted.
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(13, 0)
                .uint(14)
                .int(8)
                .int(1)
                .int(1)
                .int(8)
                .uint(XRGB8888)
                .finish(),
        );
        assert!(!server.client(id).unwrap().is_closed());

        // One byte over: client-fatal.
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(13, 0)
                .uint(19)
                .int(9)
                .int(1)
                .int(1)
                .int(8)
                .uint(XRGB8888)
                .finish(),
        );
        assert!(server.client(id).unwrap().is_closed());
    }

    #[test]
    fn test_create_buffer_width_exceeding_stride() {
        let mut server = test_server();
        let (id, mut remote) = connect(&mut server);

        request(&mut server, id, &mut remote, MessageWriter::new(1, 1).uint(2).finish());
        bind_global(&mut server, id, &mut remote, 2, "wl_shm", 1, 11);

        let pool_file = anonymous_file(&[0u8; 4]);
        request_with_fd(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(11, 0).uint(13).int(4).finish(),
            pool_file.as_raw_fd(),
        );

        // stride*height + offset fits the pool, but one row claims far
        // more pixels than the stride holds. Only this client dies.
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(13, 0)
                .uint(14)
                .int(0)
                .int(1_000_000)
                .int(1)
                .int(4)
                .uint(XRGB8888)
                .finish(),
        );
        assert!(server.client(id).unwrap().is_closed());
    }

    #[test]
    fn test_focus_transition() {
        let mut server = test_server();
        let (id, mut remote) = connect(&mut server);

        request(&mut server, id, &mut remote, MessageWriter::new(1, 1).uint(2).finish());
        bind_global(&mut server, id, &mut remote, 2, "wl_compositor", 5, 10);
        bind_global(&mut server, id, &mut remote, 2, "wl_seat", 7, 20);
        // wl_seat.get_keyboard(id = 21)
        request(&mut server, id, &mut remote, MessageWriter::new(20, 1).uint(21).finish());
        // wl_compositor.create_surface(id = 15)
        request(&mut server, id, &mut remote, MessageWriter::new(10, 0).uint(15).finish());
        drain(&mut server, &mut remote);

        server.deliver_backend_event(BackendEvent::Key { keycode: 30, pressed: true });
        let frames = drain(&mut server, &mut remote);

        let enter = &frames[0];
        assert_eq!(enter.0.object_id, 21);
        assert_eq!(enter.0.opcode, 1);
        let serial = u32_at(&enter.1, 0);
        assert_eq!(u32_at(&enter.1, 1), 15); // surface
        assert_eq!(u32_at(&enter.1, 2), 4); // pressed array byte count
        assert_eq!(u32_at(&enter.1, 3), 30);

        let modifiers = &frames[1];
        assert_eq!(modifiers.0.opcode, 4);
        assert_eq!(u32_at(&modifiers.1, 0), serial + 1);
        assert_eq!(&modifiers.1[4..], &[0u8; 16]);

        let key = &frames[2];
        assert_eq!(key.0.opcode, 3);
        assert_eq!(u32_at(&key.1, 0), serial + 2);
        assert_eq!(u32_at(&key.1, 2), 30);
        assert_eq!(u32_at(&key.1, 3), 1);
    }

    #[test]
    fn test_modifiers_forwarded_verbatim() {
        let mut server = test_server();
        let (id, mut remote) = connect(&mut server);

        request(&mut server, id, &mut remote, MessageWriter::new(1, 1).uint(2).finish());
        bind_global(&mut server, id, &mut remote, 2, "wl_compositor", 5, 10);
        bind_global(&mut server, id, &mut remote, 2, "wl_seat", 7, 20);
        request(&mut server, id, &mut remote, MessageWriter::new(20, 1).uint(21).finish());
        request(&mut server, id, &mut remote, MessageWriter::new(10, 0).uint(15).finish());
        drain(&mut server, &mut remote);

        // Focus first.
        server.deliver_backend_event(BackendEvent::Key { keycode: 30, pressed: true });
        drain(&mut server, &mut remote);

        server.deliver_backend_event(BackendEvent::Modifiers(Modifiers {
            depressed: 5,
            latched: 0,
            locked: 2,
            group: 1,
        }));
        let frames = drain(&mut server, &mut remote);
        let mods = frames
            .iter()
            .find(|(h, _)| h.object_id == 21 && h.opcode == 4)
            .expect("missing modifiers");
        assert_eq!(u32_at(&mods.1, 1), 5);
        assert_eq!(u32_at(&mods.1, 2), 0);
        assert_eq!(u32_at(&mods.1, 3), 2);
        assert_eq!(u32_at(&mods.1, 4), 1);
    }

    #[test]
    fn test_pointer_motion_and_button() {
        let mut server = test_server();
        let (id, mut remote) = connect(&mut server);

        request(&mut server, id, &mut remote, MessageWriter::new(1, 1).uint(2).finish());
        bind_global(&mut server, id, &mut remote, 2, "wl_compositor", 5, 10);
        bind_global(&mut server, id, &mut remote, 2, "wl_seat", 7, 20);
        // wl_seat.get_pointer(id = 22)
        request(&mut server, id, &mut remote, MessageWriter::new(20, 0).uint(22).finish());
        request(&mut server, id, &mut remote, MessageWriter::new(10, 0).uint(15).finish());
        drain(&mut server, &mut remote);

        server.deliver_backend_event(BackendEvent::PointerMotion { x: 12.5, y: 3.25 });
        server.deliver_backend_event(BackendEvent::PointerButton { button: 0x110, pressed: true });
        let frames = drain(&mut server, &mut remote);

        // enter(serial, surface, x, y), then per-group frame events (v7).
        let enter = &frames[0];
        assert_eq!(enter.0.object_id, 22);
        assert_eq!(enter.0.opcode, 0);
        assert_eq!(u32_at(&enter.1, 1), 15);
        assert_eq!(u32_at(&enter.1, 2) as i32, (12.5 * 256.0) as i32);
        assert_eq!(u32_at(&enter.1, 3) as i32, (3.25 * 256.0) as i32);
        assert_eq!(frames[1].0.opcode, 5);

        let motion = frames.iter().find(|(h, _)| h.opcode == 2).expect("missing motion");
        assert_eq!(u32_at(&motion.1, 1) as i32, (12.5 * 256.0) as i32);

        let button = frames.iter().find(|(h, _)| h.opcode == 3).expect("missing button");
        assert_eq!(u32_at(&button.1, 2), 0x110);
        assert_eq!(u32_at(&button.1, 3), 1);
    }

    #[test]
    fn test_dmabuf_create_immed() {
        let mut server = test_server();
        let (id, mut remote) = connect(&mut server);

        request(&mut server, id, &mut remote, MessageWriter::new(1, 1).uint(2).finish());
        bind_global(&mut server, id, &mut remote, 2, "wl_compositor", 5, 10);
        bind_global(&mut server, id, &mut remote, 2, "zwp_linux_dmabuf_v1", 4, 30);
        drain(&mut server, &mut remote);

        // create_params(id = 31)
        request(&mut server, id, &mut remote, MessageWriter::new(30, 1).uint(31).finish());
        // add(fd, plane 0, offset 0, stride w*4, modifier LINEAR)
        let plane_file = anonymous_file(&[0u8; 64 * 64 * 4]);
        request_with_fd(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(31, 1)
                .uint(0)
                .uint(0)
                .uint(64 * 4)
                .uint(0)
                .uint(0)
                .finish(),
            plane_file.as_raw_fd(),
        );
        // create_immed(id = 32, 64x64, XRGB8888, no flags)
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(31, 3)
                .uint(32)
                .int(64)
                .int(64)
                .uint(DRM_FORMAT_XRGB8888)
                .uint(0)
                .finish(),
        );
        assert!(!server.client(id).unwrap().is_closed());
        match server.client(id).unwrap().buffers.get(&32) {
            Some(BufferRecord::Dma(dma)) => assert!(dma.image.is_some()),
            other => panic!("unexpected buffer record: {other:?}"),
        }

        // The buffer is usable for attach + commit.
        request(&mut server, id, &mut remote, MessageWriter::new(10, 0).uint(33).finish());
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(33, 1).object(32).int(0).int(0).finish(),
        );
        request(&mut server, id, &mut remote, MessageWriter::new(33, 6).finish());

        let surface_id = server.surfaces.values().find(|s| s.wl_id == 33).unwrap().id;
        let surface = server.surface(surface_id).unwrap();
        assert!(surface.is_mapped());
        assert_eq!(surface.current.image_extent, Extent::new(64, 64));
        assert_eq!(surface.current.dma_source, Some(32));
        // No error events were queued.
        let frames = drain(&mut server, &mut remote);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_dmabuf_create_uses_server_id() {
        let mut server = test_server();
        let (id, mut remote) = connect(&mut server);

        request(&mut server, id, &mut remote, MessageWriter::new(1, 1).uint(2).finish());
        bind_global(&mut server, id, &mut remote, 2, "zwp_linux_dmabuf_v1", 4, 30);
        request(&mut server, id, &mut remote, MessageWriter::new(30, 1).uint(31).finish());
        let plane_file = anonymous_file(&[0u8; 16 * 16 * 4]);
        request_with_fd(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(31, 1).uint(0).uint(0).uint(16 * 4).uint(0).uint(0).finish(),
            plane_file.as_raw_fd(),
        );
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(31, 2).int(16).int(16).uint(DRM_FORMAT_XRGB8888).uint(0).finish(),
        );

        let frames = drain(&mut server, &mut remote);
        let created = frames
            .iter()
            .find(|(h, _)| h.object_id == 31 && h.opcode == 0)
            .expect("missing created event");
        let buffer_id = u32_at(&created.1, 0);
        assert!(buffer_id >= crate::core::protocol::objects::SERVER_ID_BASE);
        assert!(server.client(id).unwrap().buffers.contains_key(&buffer_id));
    }

    #[test]
    fn test_null_attach_clears_content() {
        let mut server = test_server();
        let (id, mut remote) = connect(&mut server);

        request(&mut server, id, &mut remote, MessageWriter::new(1, 1).uint(2).finish());
        bind_global(&mut server, id, &mut remote, 2, "wl_compositor", 5, 10);
        bind_global(&mut server, id, &mut remote, 2, "wl_shm", 1, 11);

        let pool_file = anonymous_file(&[0xAAu8; 4]);
        request_with_fd(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(11, 0).uint(13).int(4).finish(),
            pool_file.as_raw_fd(),
        );
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(13, 0).uint(14).int(0).int(1).int(1).int(4).uint(XRGB8888).finish(),
        );
        request(&mut server, id, &mut remote, MessageWriter::new(10, 0).uint(15).finish());
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(15, 1).object(14).int(0).int(0).finish(),
        );
        request(&mut server, id, &mut remote, MessageWriter::new(15, 6).finish());

        let surface_id = server.surfaces.values().find(|s| s.wl_id == 15).unwrap().id;
        assert!(server.surface(surface_id).unwrap().is_mapped());

        // attach(null) + commit clears the contents.
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(15, 1).object(0).int(0).int(0).finish(),
        );
        request(&mut server, id, &mut remote, MessageWriter::new(15, 6).finish());
        assert!(!server.surface(surface_id).unwrap().is_mapped());
    }

    #[test]
    fn test_buffer_destroyed_before_commit() {
        let mut server = test_server();
        let (id, mut remote) = connect(&mut server);

        request(&mut server, id, &mut remote, MessageWriter::new(1, 1).uint(2).finish());
        bind_global(&mut server, id, &mut remote, 2, "wl_compositor", 5, 10);
        bind_global(&mut server, id, &mut remote, 2, "wl_shm", 1, 11);

        let pool_file = anonymous_file(&[0u8; 4]);
        request_with_fd(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(11, 0).uint(13).int(4).finish(),
            pool_file.as_raw_fd(),
        );
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(13, 0).uint(14).int(0).int(1).int(1).int(4).uint(XRGB8888).finish(),
        );
        request(&mut server, id, &mut remote, MessageWriter::new(10, 0).uint(15).finish());
        request(
            &mut server,
            id,
            &mut remote,
            MessageWriter::new(15, 1).object(14).int(0).int(0).finish(),
        );
        // wl_buffer.destroy before the commit.
        request(&mut server, id, &mut remote, MessageWriter::new(14, 0).finish());
        request(&mut server, id, &mut remote, MessageWriter::new(15, 6).finish());

        let surface_id = server.surfaces.values().find(|s| s.wl_id == 15).unwrap().id;
        assert!(!server.surface(surface_id).unwrap().is_mapped());
        assert!(!server.client(id).unwrap().is_closed());
    }

    #[test]
    fn test_client_teardown_cascades() {
        let mut server = test_server();
        let (id, mut remote) = connect(&mut server);

        request(&mut server, id, &mut remote, MessageWriter::new(1, 1).uint(2).finish());
        bind_global(&mut server, id, &mut remote, 2, "wl_compositor", 5, 10);
        request(&mut server, id, &mut remote, MessageWriter::new(10, 0).uint(15).finish());
        assert_eq!(server.surfaces.len(), 1);

        drop(remote);
        server.handle_client_input(id);
        assert!(server.client(id).unwrap().is_closed());
        server.reap_closed_clients();
        assert!(server.surfaces.is_empty());
        assert!(server.z_order.is_empty());
    }
}
