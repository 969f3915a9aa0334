//! Frame encoding/decoding.
//!
//! One datagram carries at most one frame, optionally preceded by a handshake
//! byte. There is no reassembly across datagrams.
//!
//! ```text
//! master:    +----+----+------+-----+-----+------------+-----+
//!            | 5C | 00 | node | cmd | len | data (esc) | chk |
//!            +----+----+------+-----+-----+------------+-----+
//! accessory: +----+-----+-----+------+-----+
//!            | C0 | cmd | len | data | chk |
//!            +----+-----+-----+------+-----+
//! ```
//!
//! Master frames double every `5C` inside the data and `len` counts the
//! doubled bytes. Their checksum is the XOR of everything from the node byte
//! through the data, with a result of `5C` sent as `C5`. Accessory frames are
//! not escaped and their checksum covers the start byte too.

use bytes::BufMut;

use crate::constants::*;
use crate::error::FrameError;

/// Who sent a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The heat pump, addressing the given accessory node.
    Master {
        /// Destination node address.
        node: u16,
    },
    /// An accessory, answering the heat pump.
    Accessory,
}

/// Frame command code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Continuous-logging data message.
    DataMessage,
    /// Read poll token or read request.
    ReadRequest,
    /// Read response.
    ReadResponse,
    /// Write poll token or write request.
    WriteRequest,
    /// Write response.
    WriteResponse,
    /// Product information.
    ProductInfo,
    /// Accessory version request.
    AccessoryVersionRequest,
    /// Any code this crate does not interpret.
    Other(u8),
}

impl From<u8> for Command {
    fn from(code: u8) -> Self {
        match code {
            CMD_DATA_MSG => Command::DataMessage,
            CMD_READ_REQ => Command::ReadRequest,
            CMD_READ_RESP => Command::ReadResponse,
            CMD_WRITE_REQ => Command::WriteRequest,
            CMD_WRITE_RESP => Command::WriteResponse,
            CMD_PRODUCT_INFO => Command::ProductInfo,
            CMD_ACCESSORY_VERSION_REQ => Command::AccessoryVersionRequest,
            other => Command::Other(other),
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> Self {
        match command {
            Command::DataMessage => CMD_DATA_MSG,
            Command::ReadRequest => CMD_READ_REQ,
            Command::ReadResponse => CMD_READ_RESP,
            Command::WriteRequest => CMD_WRITE_REQ,
            Command::WriteResponse => CMD_WRITE_RESP,
            Command::ProductInfo => CMD_PRODUCT_INFO,
            Command::AccessoryVersionRequest => CMD_ACCESSORY_VERSION_REQ,
            Command::Other(code) => code,
        }
    }
}

/// Coarse classification of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Read token, request or response.
    Read,
    /// Write token, request or response.
    Write,
    /// Continuous-logging broadcast.
    Broadcast,
    /// Anything else on the bus.
    Other,
}

/// A single decoded frame with its unescaped data section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    origin: Origin,
    command: Command,
    data: Vec<u8>,
    checksum: u8,
}

impl Frame {
    /// Build a frame as sent by the heat pump to `node`.
    pub fn from_master(node: u16, command: Command, data: Vec<u8>) -> Result<Self, FrameError> {
        let wire_len = escaped_len(&data);
        if wire_len > MAX_DATA_LEN {
            return Err(FrameError::TooLong {
                max: MAX_DATA_LEN,
                actual: wire_len,
            });
        }
        let checksum = master_checksum(node, command.into(), &escape(&data));
        Ok(Frame {
            origin: Origin::Master { node },
            command,
            data,
            checksum,
        })
    }

    /// Build a frame as sent by an accessory.
    pub fn from_accessory(command: Command, data: Vec<u8>) -> Result<Self, FrameError> {
        if data.len() > MAX_DATA_LEN {
            return Err(FrameError::TooLong {
                max: MAX_DATA_LEN,
                actual: data.len(),
            });
        }
        let checksum = accessory_checksum(command.into(), &data);
        Ok(Frame {
            origin: Origin::Accessory,
            command,
            data,
            checksum,
        })
    }

    /// Who sent the frame.
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// The command code.
    pub fn command(&self) -> Command {
        self.command
    }

    /// The data section, unescaped.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The checksum byte as carried on the wire.
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Destination node of a master frame.
    pub fn node(&self) -> Option<u16> {
        match self.origin {
            Origin::Master { node } => Some(node),
            Origin::Accessory => None,
        }
    }

    /// True if this is a master frame addressed to `node`.
    pub fn is_addressed_to(&self, node: u16) -> bool {
        self.node() == Some(node)
    }

    /// Classify the frame by its command.
    pub fn direction(&self) -> Direction {
        match self.command {
            Command::ReadRequest | Command::ReadResponse => Direction::Read,
            Command::WriteRequest | Command::WriteResponse => Direction::Write,
            Command::DataMessage => Direction::Broadcast,
            _ => Direction::Other,
        }
    }
}

/// Handshake byte that may lead a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handshake {
    /// `06`
    Ack,
    /// `15`
    Nak,
}

impl Handshake {
    /// Wire byte for this handshake.
    pub fn byte(self) -> u8 {
        match self {
            Handshake::Ack => ACK,
            Handshake::Nak => NAK,
        }
    }

    /// Parse a handshake byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            ACK => Some(Handshake::Ack),
            NAK => Some(Handshake::Nak),
            _ => None,
        }
    }
}

/// Contents of one datagram.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Datagram {
    /// Leading handshake byte, if any.
    pub handshake: Option<Handshake>,
    /// Frame following the handshake, if any.
    pub frame: Option<Frame>,
}

/// Byte-level framing contract.
///
/// Implementations must be deterministic and `encode` must always produce a
/// valid checksum. A frame whose checksum does not validate is never returned
/// from `decode`.
pub trait FrameCodec: Send {
    /// Decode one datagram.
    fn decode(&self, bytes: &[u8]) -> Result<Datagram, FrameError>;

    /// Encode one frame. The frame's stored checksum is recomputed.
    fn encode(&self, frame: &Frame) -> Vec<u8>;

    /// Encode a bare handshake.
    fn encode_handshake(&self, handshake: Handshake) -> Vec<u8> {
        vec![handshake.byte()]
    }
}

/// Framing as observed between Nibe F-series heat pumps and their accessories.
#[derive(Debug, Clone, Copy, Default)]
pub struct NibeGwCodec;

impl FrameCodec for NibeGwCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Datagram, FrameError> {
        let first = *bytes.first().ok_or_else(|| FrameError::truncated(1, 0))?;

        let (handshake, rest) = match Handshake::from_byte(first) {
            Some(handshake) => (Some(handshake), &bytes[1..]),
            None => (None, bytes),
        };

        let frame = if rest.is_empty() {
            None
        } else {
            Some(decode_frame(rest)?)
        };

        Ok(Datagram { handshake, frame })
    }

    fn encode(&self, frame: &Frame) -> Vec<u8> {
        let command: u8 = frame.command.into();
        match frame.origin {
            Origin::Master { node } => {
                let wire = escape(&frame.data);
                let mut buf = Vec::with_capacity(MASTER_HEADER_LEN + wire.len() + 1);
                buf.push(START_MASTER);
                buf.put_u16(node);
                buf.push(command);
                buf.push(wire.len() as u8);
                buf.extend_from_slice(&wire);
                buf.push(master_checksum(node, command, &wire));
                buf
            }
            Origin::Accessory => {
                let mut buf = Vec::with_capacity(ACCESSORY_HEADER_LEN + frame.data.len() + 1);
                buf.push(START_ACCESSORY);
                buf.push(command);
                buf.push(frame.data.len() as u8);
                buf.extend_from_slice(&frame.data);
                buf.push(accessory_checksum(command, &frame.data));
                buf
            }
        }
    }
}

// ============================================================================
// Wire helpers
// ============================================================================

fn xor(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

fn master_checksum(node: u16, command: u8, wire_data: &[u8]) -> u8 {
    let [hi, lo] = node.to_be_bytes();
    let chk = xor(&[hi, lo, command, wire_data.len() as u8]) ^ xor(wire_data);
    if chk == START_MASTER {
        CHECKSUM_SUBSTITUTE
    } else {
        chk
    }
}

fn accessory_checksum(command: u8, data: &[u8]) -> u8 {
    xor(&[START_ACCESSORY, command, data.len() as u8]) ^ xor(data)
}

fn escaped_len(data: &[u8]) -> usize {
    data.len() + data.iter().filter(|&&b| b == START_MASTER).count()
}

fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(escaped_len(data));
    for &b in data {
        out.push(b);
        if b == START_MASTER {
            out.push(b);
        }
    }
    out
}

fn unescape(wire: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(wire.len());
    let mut iter = wire.iter();
    while let Some(&b) = iter.next() {
        if b == START_MASTER && iter.next() != Some(&START_MASTER) {
            return Err(FrameError::malformed("unpaired 0x5C in data"));
        }
        out.push(b);
    }
    Ok(out)
}

fn check_length(bytes: &[u8], header: usize) -> Result<usize, FrameError> {
    let len = bytes[header - 1] as usize;
    let total = header + len + 1;
    if bytes.len() < total {
        return Err(FrameError::truncated(total, bytes.len()));
    }
    if bytes.len() > total {
        return Err(FrameError::malformed(format!(
            "{} trailing bytes after checksum",
            bytes.len() - total
        )));
    }
    Ok(len)
}

fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameError> {
    match bytes[0] {
        START_MASTER => {
            if bytes.len() < MASTER_HEADER_LEN + 1 {
                return Err(FrameError::truncated(MASTER_HEADER_LEN + 1, bytes.len()));
            }
            let len = check_length(bytes, MASTER_HEADER_LEN)?;
            let node = u16::from_be_bytes([bytes[1], bytes[2]]);
            let command = bytes[3];
            let wire = &bytes[MASTER_HEADER_LEN..MASTER_HEADER_LEN + len];
            let actual = bytes[MASTER_HEADER_LEN + len];
            let expected = master_checksum(node, command, wire);
            if expected != actual {
                return Err(FrameError::ChecksumMismatch { expected, actual });
            }
            let data = unescape(wire)?;
            log::trace!(
                "decoded master frame node=0x{:04X} cmd=0x{:02X} len={}",
                node,
                command,
                data.len()
            );
            Ok(Frame {
                origin: Origin::Master { node },
                command: command.into(),
                data,
                checksum: actual,
            })
        }
        START_ACCESSORY => {
            if bytes.len() < ACCESSORY_HEADER_LEN + 1 {
                return Err(FrameError::truncated(ACCESSORY_HEADER_LEN + 1, bytes.len()));
            }
            let len = check_length(bytes, ACCESSORY_HEADER_LEN)?;
            let command = bytes[1];
            let data = &bytes[ACCESSORY_HEADER_LEN..ACCESSORY_HEADER_LEN + len];
            let actual = bytes[ACCESSORY_HEADER_LEN + len];
            let expected = accessory_checksum(command, data);
            if expected != actual {
                return Err(FrameError::ChecksumMismatch { expected, actual });
            }
            Ok(Frame {
                origin: Origin::Accessory,
                command: command.into(),
                data: data.to_vec(),
                checksum: actual,
            })
        }
        other => Err(FrameError::malformed(format!(
            "unknown start byte 0x{:02X}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_read_poll() {
        let datagram = NibeGwCodec.decode(&[0x5C, 0x00, 0x20, 0x69, 0x00, 0x49]).unwrap();
        assert_eq!(datagram.handshake, None);

        let frame = datagram.frame.expect("should decode frame");
        assert_eq!(frame.origin(), Origin::Master { node: 0x20 });
        assert_eq!(frame.command(), Command::ReadRequest);
        assert_eq!(frame.direction(), Direction::Read);
        assert!(frame.data().is_empty());
        assert_eq!(frame.checksum(), 0x49);
    }

    #[test]
    fn test_decode_bare_handshake() {
        let datagram = NibeGwCodec.decode(&[ACK]).unwrap();
        assert_eq!(datagram.handshake, Some(Handshake::Ack));
        assert!(datagram.frame.is_none());

        let datagram = NibeGwCodec.decode(&[NAK]).unwrap();
        assert_eq!(datagram.handshake, Some(Handshake::Nak));
    }

    #[test]
    fn test_decode_handshake_then_frame() {
        let datagram = NibeGwCodec
            .decode(&[ACK, 0x5C, 0x00, 0x20, 0x6B, 0x00, 0x4B])
            .unwrap();
        assert_eq!(datagram.handshake, Some(Handshake::Ack));
        assert_eq!(datagram.frame.unwrap().command(), Command::WriteRequest);
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(NibeGwCodec.decode(&[]), Err(FrameError::truncated(1, 0)));
    }

    #[test]
    fn test_decode_unknown_start() {
        let err = NibeGwCodec.decode(&[0x42, 0x00]).unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn test_decode_truncated() {
        // Length says two data bytes, only one present
        let err = NibeGwCodec.decode(&[0x5C, 0x00, 0x20, 0x69, 0x02, 0x01]).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { expected: 8, actual: 6 }));

        let err = NibeGwCodec.decode(&[0x5C, 0x00, 0x20]).unwrap_err();
        assert_eq!(err.kind(), "truncated");
    }

    #[test]
    fn test_decode_trailing_garbage() {
        let err = NibeGwCodec
            .decode(&[0x5C, 0x00, 0x20, 0x69, 0x00, 0x49, 0x00])
            .unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn test_escape_roundtrip() {
        let frame = Frame::from_master(0x20, Command::ReadResponse, vec![0x5C, 0x01, 0x5C]).unwrap();
        let encoded = NibeGwCodec.encode(&frame);

        // Each 0x5C in the data is doubled and counted by the length byte
        assert_eq!(&encoded[..5], &[0x5C, 0x00, 0x20, 0x6A, 0x05]);
        assert_eq!(&encoded[5..10], &[0x5C, 0x5C, 0x01, 0x5C, 0x5C]);

        let decoded = NibeGwCodec.decode(&encoded).unwrap().frame.unwrap();
        assert_eq!(decoded.data(), &[0x5C, 0x01, 0x5C]);
    }

    #[test]
    fn test_unpaired_escape_rejected() {
        // Valid checksum over a data section with a lone 0x5C
        let wire = [0x5C, 0x01];
        let chk = master_checksum(0x20, CMD_READ_RESP, &wire);
        let bytes = [0x5C, 0x00, 0x20, CMD_READ_RESP, 0x02, 0x5C, 0x01, chk];
        let err = NibeGwCodec.decode(&bytes).unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn test_checksum_substitution() {
        // 00 ^ 20 ^ 68 ^ 01 ^ 15 == 5C, sent as C5
        let frame = Frame::from_master(0x20, Command::DataMessage, vec![0x15]).unwrap();
        assert_eq!(frame.checksum(), CHECKSUM_SUBSTITUTE);

        let encoded = NibeGwCodec.encode(&frame);
        assert_eq!(*encoded.last().unwrap(), CHECKSUM_SUBSTITUTE);
        assert_eq!(NibeGwCodec.decode(&encoded).unwrap().frame.unwrap(), frame);
    }

    #[test]
    fn test_accessory_frame_encode() {
        let frame = Frame::from_accessory(Command::ReadRequest, vec![0xC1, 0xB7]).unwrap();
        assert_eq!(
            NibeGwCodec.encode(&frame),
            vec![0xC0, 0x69, 0x02, 0xC1, 0xB7, 0xDD]
        );
    }

    #[test]
    fn test_frame_too_long() {
        let err = Frame::from_accessory(Command::DataMessage, vec![0; 256]).unwrap_err();
        assert_eq!(err, FrameError::TooLong { max: 255, actual: 256 });

        // 128 escaped bytes need 256 on the wire
        let err = Frame::from_master(0x20, Command::DataMessage, vec![0x5C; 128]).unwrap_err();
        assert_eq!(err, FrameError::TooLong { max: 255, actual: 256 });
    }

    #[test]
    fn test_command_codes() {
        for code in 0..=u8::MAX {
            assert_eq!(u8::from(Command::from(code)), code);
        }
        assert_eq!(Command::from(0x6D), Command::ProductInfo);
        assert_eq!(Command::from(0x42), Command::Other(0x42));
    }

    #[test]
    fn test_encode_handshake() {
        assert_eq!(NibeGwCodec.encode_handshake(Handshake::Ack), vec![0x06]);
        assert_eq!(NibeGwCodec.encode_handshake(Handshake::Nak), vec![0x15]);
    }
}
