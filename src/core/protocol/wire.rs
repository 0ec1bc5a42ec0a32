//! Wire codec: message framing and typed argument encoding.
//!
//! A message is an 8-byte header `{object_id: u32, opcode: u16, size: u16}`
//! in host byte order followed by `size - 8` bytes of arguments. `size`
//! counts the header, so anything below 8 is a framing violation. File
//! descriptors never appear on the data stream; they travel as ancillary
//! `SCM_RIGHTS` payloads and are consumed one per `fd` argument in order.

use crate::core::errors::ProtocolError;
use crate::core::protocol::NewId;

/// Fixed framing header preceding every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub object_id: u32,
    pub opcode: u16,
    pub size: u16,
}

impl MessageHeader {
    pub const SIZE: usize = 8;

    pub fn parse(bytes: &[u8; Self::SIZE]) -> Self {
        MessageHeader {
            object_id: u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            opcode: u16::from_ne_bytes([bytes[4], bytes[5]]),
            size: u16::from_ne_bytes([bytes[6], bytes[7]]),
        }
    }

    /// Byte count of the argument block following the header.
    /// Fails for sizes that cannot even hold the header itself.
    pub fn body_len(&self) -> Result<usize, ProtocolError> {
        if (self.size as usize) < Self::SIZE {
            return Err(ProtocolError::BadSize(self.size));
        }
        Ok(self.size as usize - Self::SIZE)
    }
}

fn align4(v: usize) -> usize {
    (v + 3) & !3
}

/// Decoder over a single message's argument block.
pub struct MessageReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> MessageReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        MessageReader { data, offset: 0 }
    }

    pub fn consumed(&self) -> usize {
        self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(ProtocolError::Malformed("argument past end of message"))?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    pub fn uint(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn int(&mut self) -> Result<i32, ProtocolError> {
        Ok(self.uint()? as i32)
    }

    /// Signed fixed-point with 8 fractional bits.
    pub fn fixed(&mut self) -> Result<f64, ProtocolError> {
        Ok(self.int()? as f64 / 256.0)
    }

    /// The wire length includes the trailing NUL; the returned slice
    /// does not.
    pub fn string(&mut self) -> Result<&'a str, ProtocolError> {
        let len_with_nul = self.uint()? as usize;
        if len_with_nul == 0 {
            return Err(ProtocolError::Malformed("string without terminator"));
        }
        let raw = self.take(align4(len_with_nul))?;
        if raw[len_with_nul - 1] != 0 {
            return Err(ProtocolError::Malformed("string missing NUL"));
        }
        std::str::from_utf8(&raw[..len_with_nul - 1])
            .map_err(|_| ProtocolError::Malformed("string is not UTF-8"))
    }

    pub fn array(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = self.uint()? as usize;
        let raw = self.take(align4(len))?;
        Ok(&raw[..len])
    }

    /// An object reference; 0 means null.
    pub fn object_id(&mut self) -> Result<u32, ProtocolError> {
        self.uint()
    }

    /// A `new_id` whose interface is fixed by the request signature.
    pub fn new_id(&mut self) -> Result<u32, ProtocolError> {
        self.uint()
    }

    /// A polymorphic `new_id`: interface name, version, then the id.
    pub fn untyped_new_id(&mut self) -> Result<NewId, ProtocolError> {
        let interface = self.string()?.to_owned();
        let version = self.uint()?;
        let new_id = self.uint()?;
        Ok(NewId { interface, version, new_id })
    }
}

/// Encoder assembling one outgoing message. The full frame is built
/// before anything touches the socket; writes are atomic per message.
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    pub fn new(object_id: u32, opcode: u16) -> Self {
        let mut buf = Vec::with_capacity(32);
        buf.extend_from_slice(&object_id.to_ne_bytes());
        buf.extend_from_slice(&opcode.to_ne_bytes());
        buf.extend_from_slice(&0u16.to_ne_bytes());
        MessageWriter { buf }
    }

    pub fn uint(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_ne_bytes());
        self
    }

    pub fn int(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_ne_bytes());
        self
    }

    pub fn fixed(&mut self, v: f64) -> &mut Self {
        self.int((v * 256.0) as i32)
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        let len_with_nul = s.len() + 1;
        self.uint(len_with_nul as u32);
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        for _ in len_with_nul..align4(len_with_nul) {
            self.buf.push(0);
        }
        self
    }

    pub fn array(&mut self, data: &[u8]) -> &mut Self {
        self.uint(data.len() as u32);
        self.buf.extend_from_slice(data);
        for _ in data.len()..align4(data.len()) {
            self.buf.push(0);
        }
        self
    }

    pub fn object(&mut self, id: u32) -> &mut Self {
        self.uint(id)
    }

    /// Patch the size field and hand back the frame. The writer is
    /// spent afterwards.
    ///
    /// The size field is 16 bits; a frame that does not fit would
    /// truncate it and corrupt framing for the rest of the connection,
    /// so an oversized message is a server bug and aborts loudly.
    pub fn finish(&mut self) -> Vec<u8> {
        let mut buf = std::mem::take(&mut self.buf);
        assert!(
            buf.len() <= u16::MAX as usize,
            "message of {} bytes exceeds the wire size limit",
            buf.len()
        );
        let size = (buf.len() as u16).to_ne_bytes();
        buf[6] = size[0];
        buf[7] = size[1];
        buf
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(frame: &[u8]) -> (&[u8; 8], &[u8]) {
        let (head, body) = frame.split_at(MessageHeader::SIZE);
        (head.try_into().unwrap(), body)
    }

    #[test]
    fn test_header_round_trip() {
        let frame = MessageWriter::new(7, 3).uint(42).finish();
        let (head, body) = body_of(&frame);
        let header = MessageHeader::parse(head);
        assert_eq!(header.object_id, 7);
        assert_eq!(header.opcode, 3);
        assert_eq!(header.size as usize, frame.len());
        assert_eq!(header.body_len().unwrap(), body.len());
    }

    #[test]
    fn test_header_size_counts_every_consumed_byte() {
        let frame = MessageWriter::new(1, 0)
            .uint(9)
            .string("geometry")
            .array(&[1, 2, 3, 4, 5])
            .int(-4)
            .finish();
        let (head, body) = body_of(&frame);
        let header = MessageHeader::parse(head);

        let mut reader = MessageReader::new(body);
        reader.uint().unwrap();
        reader.string().unwrap();
        reader.array().unwrap();
        reader.int().unwrap();
        assert_eq!(header.size as usize, MessageHeader::SIZE + reader.consumed());
    }

    #[test]
    fn test_size_below_header_is_fatal() {
        let header = MessageHeader { object_id: 1, opcode: 0, size: 7 };
        assert!(matches!(header.body_len(), Err(ProtocolError::BadSize(7))));
    }

    #[test]
    fn test_header_only_message_dispatches() {
        let frame = MessageWriter::new(3, 6).finish();
        assert_eq!(frame.len(), 8);
        let (head, body) = body_of(&frame);
        assert_eq!(MessageHeader::parse(head).body_len().unwrap(), 0);
        assert!(body.is_empty());
    }

    #[test]
    fn test_string_round_trip() {
        for s in ["", "a", "abc", "abcd", "grüß dich", "трава"] {
            let frame = MessageWriter::new(1, 0).string(s).finish();
            let (_, body) = body_of(&frame);
            let mut reader = MessageReader::new(body);
            assert_eq!(reader.string().unwrap(), s);
            assert_eq!(reader.consumed(), body.len());
        }
    }

    #[test]
    fn test_string_padding_is_four_byte_aligned() {
        // "abc" + NUL is exactly one word, "hello" + NUL pads to eight.
        let frame = MessageWriter::new(1, 0).string("abc").finish();
        assert_eq!(frame.len(), 8 + 4 + 4);
        let frame = MessageWriter::new(1, 0).string("hello").finish();
        assert_eq!(frame.len(), 8 + 4 + 8);
    }

    #[test]
    fn test_fixed_round_trip_exact() {
        for raw in [i32::MIN, -65537, -256, -1, 0, 1, 255, 256, 257, 1 << 20, i32::MAX] {
            let value = raw as f64 / 256.0;
            let frame = MessageWriter::new(1, 0).fixed(value).finish();
            let (_, body) = body_of(&frame);
            let mut reader = MessageReader::new(body);
            let decoded = reader.fixed().unwrap();
            let reencoded = (decoded * 256.0) as i32;
            assert_eq!(reencoded, raw);
        }
    }

    #[test]
    fn test_array_round_trip() {
        let data = [9u8, 8, 7, 6, 5];
        let frame = MessageWriter::new(1, 0).array(&data).finish();
        let (_, body) = body_of(&frame);
        let mut reader = MessageReader::new(body);
        assert_eq!(reader.array().unwrap(), &data);
        assert_eq!(reader.consumed(), body.len());
    }

    #[test]
    fn test_untyped_new_id() {
        let frame = MessageWriter::new(1, 0)
            .string("wl_compositor")
            .uint(5)
            .uint(12)
            .finish();
        let (_, body) = body_of(&frame);
        let mut reader = MessageReader::new(body);
        let new_id = reader.untyped_new_id().unwrap();
        assert_eq!(new_id.interface, "wl_compositor");
        assert_eq!(new_id.version, 5);
        assert_eq!(new_id.new_id, 12);
    }

    #[test]
    fn test_truncated_argument_rejected() {
        let mut reader = MessageReader::new(&[1, 2]);
        assert!(reader.uint().is_err());

        // String header claims more bytes than the message holds.
        let frame = MessageWriter::new(1, 0).uint(64).finish();
        let (_, body) = body_of(&frame);
        let mut reader = MessageReader::new(body);
        assert!(reader.string().is_err());
    }

    #[test]
    #[should_panic(expected = "exceeds the wire size limit")]
    fn test_oversized_message_rejected() {
        let mut msg = MessageWriter::new(1, 0);
        for _ in 0..u16::MAX as usize / 4 {
            msg.uint(0);
        }
        msg.finish();
    }

    #[test]
    fn test_string_missing_nul_rejected() {
        let mut buf = MessageWriter::new(1, 0);
        buf.uint(4);
        let mut frame = buf.finish();
        frame.extend_from_slice(b"abcd");
        let mut reader = MessageReader::new(&frame[8..]);
        assert!(matches!(
            reader.string(),
            Err(ProtocolError::Malformed("string missing NUL"))
        ));
    }
}
