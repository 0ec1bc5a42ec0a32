//! Client session management.
//!
//! One `Client` per accepted socket: it owns the stream, the received
//! file-descriptor queue, the outgoing event queue and every protocol
//! object the peer created. Reads pull exactly one message per readable
//! event; writes are queued and flushed by the loop's post-step hook,
//! never partially.

use std::collections::{HashMap, VecDeque};
use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};

use crate::core::buffer::{BufferRecord, DmabufParamsBuilder};
use crate::core::errors::ProtocolError;
use crate::core::protocol::objects::{ObjectEntry, ObjectKind, ObjectTable};
use crate::core::protocol::wire::MessageHeader;
use crate::core::protocol::Interface;
use crate::core::shell::Positioner;
use crate::core::shm::ShmPool;
use crate::core::types::Region;

pub type ClientId = u32;

/// Session lifecycle. New connections start `Active` with the display
/// object pre-registered at id 1; any protocol error jumps straight to
/// `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Reserved for connection setup that precedes the first dispatch.
    Handshaking,
    Active,
    /// Outgoing queue still flushing during shutdown.
    Draining,
    Closed,
}

/// One fully assembled outgoing message plus the descriptors that ride
/// in its ancillary payload.
#[derive(Debug)]
pub struct QueuedMessage {
    pub bytes: Vec<u8>,
    pub fds: Vec<OwnedFd>,
}

pub struct Client {
    pub id: ClientId,
    stream: UnixStream,
    pub session: SessionState,
    pub objects: ObjectTable,
    /// Descriptors received via SCM_RIGHTS, consumed one per `fd`
    /// argument in arrival order.
    incoming_fds: VecDeque<OwnedFd>,
    outgoing: VecDeque<QueuedMessage>,
    /// Client-owned protocol state, keyed by the owning object's id.
    pub pools: HashMap<u32, ShmPool>,
    pub buffers: HashMap<u32, BufferRecord>,
    pub regions: HashMap<u32, Region>,
    pub positioners: HashMap<u32, Positioner>,
    pub dmabuf_params: HashMap<u32, DmabufParamsBuilder>,
}

impl Client {
    pub fn new(id: ClientId, stream: UnixStream) -> Self {
        let mut objects = ObjectTable::new();
        // The display object exists before the first byte arrives.
        objects
            .register(
                1,
                ObjectEntry {
                    interface: Interface::WlDisplay,
                    version: 1,
                    kind: ObjectKind::Display,
                },
            )
            .expect("fresh object table cannot hold id 1");

        Client {
            id,
            stream,
            session: SessionState::Active,
            objects,
            incoming_fds: VecDeque::new(),
            outgoing: VecDeque::new(),
            pools: HashMap::new(),
            buffers: HashMap::new(),
            regions: HashMap::new(),
            positioners: HashMap::new(),
            dmabuf_params: HashMap::new(),
        }
    }

    pub fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn is_closed(&self) -> bool {
        self.session == SessionState::Closed
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Read exactly one message: the 8-byte header first, then exactly
    /// `size - 8` bytes of arguments. A short read on either part is
    /// fatal for this client. Ancillary fds picked up along the way are
    /// appended to the incoming queue.
    pub fn read_message(&mut self) -> Result<(MessageHeader, Vec<u8>), ProtocolError> {
        let mut header_bytes = [0u8; MessageHeader::SIZE];
        let got = self.recv_with_fds(&mut header_bytes)?;
        if got == 0 {
            return Err(ProtocolError::Hangup);
        }
        if got != MessageHeader::SIZE {
            return Err(ProtocolError::ShortRead { expected: MessageHeader::SIZE, got });
        }

        let header = MessageHeader::parse(&header_bytes);
        let body_len = header.body_len()?;

        let mut body = vec![0u8; body_len];
        if body_len > 0 {
            let got = self.recv_with_fds(&mut body)?;
            if got != body_len {
                return Err(ProtocolError::ShortRead { expected: body_len, got });
            }
        }

        Ok((header, body))
    }

    fn recv_with_fds(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut iov = [IoSliceMut::new(buf)];
        let mut cmsg_buf = nix::cmsg_space!([RawFd; 8]);

        let msg = recvmsg::<()>(
            self.stream.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg_buf),
            MsgFlags::MSG_CMSG_CLOEXEC,
        )
        .map_err(|errno| ProtocolError::Io(std::io::Error::from_raw_os_error(errno as i32)))?;

        let bytes = msg.bytes;
        let cmsgs = msg
            .cmsgs()
            .map_err(|errno| ProtocolError::Io(std::io::Error::from_raw_os_error(errno as i32)))?;
        for cmsg in cmsgs {
            if let ControlMessageOwned::ScmRights(fds) = cmsg {
                for fd in fds {
                    // SCM_RIGHTS hands us fresh descriptors; we own them
                    // from here on.
                    self.incoming_fds.push_back(unsafe { OwnedFd::from_raw_fd(fd) });
                }
            }
        }
        Ok(bytes)
    }

    /// Consume the next received descriptor for an `fd` argument.
    pub fn take_fd(&mut self) -> Result<OwnedFd, ProtocolError> {
        self.incoming_fds.pop_front().ok_or(ProtocolError::MissingFd)
    }

    // =========================================================================
    // Writing
    // =========================================================================

    pub fn queue(&mut self, bytes: Vec<u8>) {
        self.queue_message(QueuedMessage { bytes, fds: Vec::new() });
    }

    pub fn queue_with_fd(&mut self, bytes: Vec<u8>, fd: OwnedFd) {
        self.queue_message(QueuedMessage { bytes, fds: vec![fd] });
    }

    fn queue_message(&mut self, message: QueuedMessage) {
        if self.is_closed() {
            // Buffered events for a terminating client are discarded.
            return;
        }
        self.outgoing.push_back(message);
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Send every queued message, each as a single frame with its fds as
    /// one ancillary payload. Returns an error when the peer is gone;
    /// the caller disconnects us in response.
    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        while let Some(message) = self.outgoing.pop_front() {
            let iov = [IoSlice::new(&message.bytes)];
            let raw_fds: Vec<RawFd> = message.fds.iter().map(|fd| fd.as_raw_fd()).collect();
            let cmsgs: Vec<ControlMessage<'_>> = if raw_fds.is_empty() {
                Vec::new()
            } else {
                vec![ControlMessage::ScmRights(&raw_fds)]
            };

            let sent = sendmsg::<()>(
                self.stream.as_raw_fd(),
                &iov,
                &cmsgs,
                MsgFlags::MSG_NOSIGNAL,
                None,
            )
            .map_err(|errno| ProtocolError::Io(std::io::Error::from_raw_os_error(errno as i32)))?;

            if sent != message.bytes.len() {
                return Err(ProtocolError::ShortRead { expected: message.bytes.len(), got: sent });
            }
        }
        Ok(())
    }

    /// Drop everything still queued. Used when the session closes.
    pub fn discard_outgoing(&mut self) {
        self.outgoing.clear();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("fd", &self.raw_fd())
            .field("session", &self.session)
            .field("objects", &self.objects.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::wire::MessageWriter;
    use std::io::Write;

    #[test]
    fn test_display_object_preregistered() {
        let (a, _b) = UnixStream::pair().unwrap();
        let client = Client::new(1, a);
        let display = client.objects.expect(1, Interface::WlDisplay).unwrap();
        assert_eq!(display.kind, ObjectKind::Display);
    }

    #[test]
    fn test_read_single_message() {
        let (server_end, mut client_end) = UnixStream::pair().unwrap();
        let mut client = Client::new(1, server_end);

        let frame = MessageWriter::new(1, 0).uint(2).finish();
        client_end.write_all(&frame).unwrap();

        let (header, body) = client.read_message().unwrap();
        assert_eq!(header.object_id, 1);
        assert_eq!(header.opcode, 0);
        assert_eq!(body, 2u32.to_ne_bytes());
    }

    #[test]
    fn test_undersized_header_is_fatal() {
        let (server_end, mut client_end) = UnixStream::pair().unwrap();
        let mut client = Client::new(1, server_end);

        // size = 7: below the header itself.
        let mut frame = Vec::new();
        frame.extend_from_slice(&1u32.to_ne_bytes());
        frame.extend_from_slice(&0u16.to_ne_bytes());
        frame.extend_from_slice(&7u16.to_ne_bytes());
        client_end.write_all(&frame).unwrap();

        assert!(matches!(client.read_message(), Err(ProtocolError::BadSize(7))));
    }

    #[test]
    fn test_hangup_detected() {
        let (server_end, client_end) = UnixStream::pair().unwrap();
        let mut client = Client::new(1, server_end);
        drop(client_end);
        assert!(matches!(client.read_message(), Err(ProtocolError::Hangup)));
    }

    #[test]
    fn test_flush_writes_whole_frames() {
        let (server_end, mut client_end) = UnixStream::pair().unwrap();
        let mut client = Client::new(1, server_end);

        client.queue(MessageWriter::new(3, 1).uint(7).finish());
        client.queue(MessageWriter::new(4, 0).finish());
        assert!(client.has_outgoing());
        client.flush().unwrap();
        assert!(!client.has_outgoing());

        use std::io::Read;
        let mut received = [0u8; 20];
        client_end.read_exact(&mut received).unwrap();
        let first = MessageHeader::parse(received[0..8].try_into().unwrap());
        assert_eq!(first.object_id, 3);
        assert_eq!(first.size, 12);
        let second = MessageHeader::parse(received[12..20].try_into().unwrap());
        assert_eq!(second.object_id, 4);
        assert_eq!(second.size, 8);
    }

    #[test]
    fn test_closed_session_discards_events() {
        let (server_end, _client_end) = UnixStream::pair().unwrap();
        let mut client = Client::new(1, server_end);
        client.session = SessionState::Closed;
        client.queue(MessageWriter::new(3, 1).finish());
        assert!(!client.has_outgoing());
    }
}
