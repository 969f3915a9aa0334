//! Typed views of frame data sections.
//!
//! Register addresses and values are little-endian.

use bytes::{Buf, BufMut};

use crate::constants::*;
use crate::error::FrameError;
use crate::frame::{Command, Frame, Origin};

/// One register/value slot of a continuous-logging data message.
///
/// Items wider than two bytes span two consecutive slots, low word first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSlot {
    /// Register address, [`UNUSED_REGISTER`] for an empty slot.
    pub register: u16,
    /// Raw value bytes.
    pub value: [u8; 2],
}

impl DataSlot {
    /// True if the slot carries no register.
    pub fn is_unused(&self) -> bool {
        self.register == UNUSED_REGISTER
    }
}

/// A message on the accessory bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    /// Master invites the addressed accessory to send a read request.
    ReadPoll,
    /// Master invites the addressed accessory to send a write request.
    WritePoll,
    /// Accessory asks for one register.
    ReadRequest {
        /// Register address.
        register: u16,
    },
    /// Accessory writes one register.
    WriteRequest {
        /// Register address.
        register: u16,
        /// Value, sign- or zero-extended to four bytes.
        value: [u8; 4],
    },
    /// Master answers a read request.
    ReadResponse {
        /// Register address.
        register: u16,
        /// Raw value bytes; items narrower than four bytes use the low bytes.
        value: [u8; 4],
    },
    /// Master answers a write request.
    WriteResponse {
        /// Whether the heat pump accepted the write.
        accepted: bool,
    },
    /// Continuous-logging broadcast.
    DataMessage(Vec<DataSlot>),
    /// Anything not interpreted above.
    Other {
        /// Command code.
        command: Command,
        /// Raw data section.
        data: Vec<u8>,
    },
}

impl BusMessage {
    /// Interpret a frame's data section according to its origin and command.
    pub fn decode(frame: &Frame) -> Result<Self, FrameError> {
        let mut data = frame.data();
        let master = matches!(frame.origin(), Origin::Master { .. });

        let message = match (frame.command(), master) {
            (Command::ReadRequest, true) => {
                expect_len(frame, 0)?;
                BusMessage::ReadPoll
            }
            (Command::WriteRequest, true) => {
                expect_len(frame, 0)?;
                BusMessage::WritePoll
            }
            (Command::ReadRequest, false) => {
                expect_len(frame, 2)?;
                BusMessage::ReadRequest {
                    register: data.get_u16_le(),
                }
            }
            (Command::WriteRequest, false) => {
                expect_len(frame, 2 + REGISTER_VALUE_LEN)?;
                let register = data.get_u16_le();
                let mut value = [0u8; REGISTER_VALUE_LEN];
                data.copy_to_slice(&mut value);
                BusMessage::WriteRequest { register, value }
            }
            (Command::ReadResponse, _) => {
                expect_len(frame, 2 + REGISTER_VALUE_LEN)?;
                let register = data.get_u16_le();
                let mut value = [0u8; REGISTER_VALUE_LEN];
                data.copy_to_slice(&mut value);
                BusMessage::ReadResponse { register, value }
            }
            (Command::WriteResponse, _) => {
                expect_len(frame, 1)?;
                BusMessage::WriteResponse {
                    accepted: data.get_u8() != 0,
                }
            }
            (Command::DataMessage, _) => {
                if data.len() % DATA_SLOT_LEN != 0 {
                    return Err(FrameError::malformed(format!(
                        "data message length {} is not a multiple of {}",
                        data.len(),
                        DATA_SLOT_LEN
                    )));
                }
                let mut slots = Vec::with_capacity(data.len() / DATA_SLOT_LEN);
                while data.has_remaining() {
                    let register = data.get_u16_le();
                    let value = [data.get_u8(), data.get_u8()];
                    slots.push(DataSlot { register, value });
                }
                BusMessage::DataMessage(slots)
            }
            (command, _) => BusMessage::Other {
                command,
                data: data.to_vec(),
            },
        };

        Ok(message)
    }

    /// Command code this message travels under.
    pub fn command(&self) -> Command {
        match self {
            BusMessage::ReadPoll | BusMessage::ReadRequest { .. } => Command::ReadRequest,
            BusMessage::WritePoll | BusMessage::WriteRequest { .. } => Command::WriteRequest,
            BusMessage::ReadResponse { .. } => Command::ReadResponse,
            BusMessage::WriteResponse { .. } => Command::WriteResponse,
            BusMessage::DataMessage(_) => Command::DataMessage,
            BusMessage::Other { command, .. } => *command,
        }
    }

    /// Serialize the data section.
    pub fn encode_data(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            BusMessage::ReadPoll | BusMessage::WritePoll => {}
            BusMessage::ReadRequest { register } => buf.put_u16_le(*register),
            BusMessage::WriteRequest { register, value }
            | BusMessage::ReadResponse { register, value } => {
                buf.put_u16_le(*register);
                buf.extend_from_slice(value);
            }
            BusMessage::WriteResponse { accepted } => buf.put_u8(u8::from(*accepted)),
            BusMessage::DataMessage(slots) => {
                for slot in slots {
                    buf.put_u16_le(slot.register);
                    buf.extend_from_slice(&slot.value);
                }
            }
            BusMessage::Other { data, .. } => buf.extend_from_slice(data),
        }
        buf
    }

    /// Build a frame carrying this message from `origin`.
    pub fn to_frame(&self, origin: Origin) -> Result<Frame, FrameError> {
        match origin {
            Origin::Master { node } => Frame::from_master(node, self.command(), self.encode_data()),
            Origin::Accessory => Frame::from_accessory(self.command(), self.encode_data()),
        }
    }
}

fn expect_len(frame: &Frame, expected: usize) -> Result<(), FrameError> {
    let actual = frame.data().len();
    if actual != expected {
        return Err(FrameError::malformed(format!(
            "{:?} expects {} data bytes, got {}",
            frame.command(),
            expected,
            actual
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameCodec, NibeGwCodec};

    fn decode_bytes(bytes: &[u8]) -> BusMessage {
        let frame = NibeGwCodec.decode(bytes).unwrap().frame.unwrap();
        BusMessage::decode(&frame).unwrap()
    }

    #[test]
    fn test_poll_tokens() {
        assert_eq!(decode_bytes(&[0x5C, 0x00, 0x20, 0x69, 0x00, 0x49]), BusMessage::ReadPoll);
        assert_eq!(decode_bytes(&[0x5C, 0x00, 0x20, 0x6B, 0x00, 0x4B]), BusMessage::WritePoll);
    }

    #[test]
    fn test_read_response() {
        let msg = decode_bytes(&[
            0x5C, 0x00, 0x20, 0x6A, 0x06, 0xC1, 0xB7, 0x00, 0x00, 0x44, 0x02, 0x7C,
        ]);
        assert_eq!(
            msg,
            BusMessage::ReadResponse {
                register: 47041,
                value: [0x00, 0x00, 0x44, 0x02],
            }
        );
    }

    #[test]
    fn test_write_request_to_frame() {
        let msg = BusMessage::WriteRequest {
            register: 45171,
            value: [0x01, 0x00, 0x00, 0x00],
        };
        let frame = msg.to_frame(Origin::Accessory).unwrap();
        assert_eq!(
            NibeGwCodec.encode(&frame),
            vec![0xC0, 0x6B, 0x06, 0x73, 0xB0, 0x01, 0x00, 0x00, 0x00, 0x6F]
        );
        assert_eq!(BusMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn test_write_response() {
        let frame = Frame::from_master(0x20, Command::WriteResponse, vec![0x01]).unwrap();
        assert_eq!(
            BusMessage::decode(&frame).unwrap(),
            BusMessage::WriteResponse { accepted: true }
        );

        let frame = Frame::from_master(0x20, Command::WriteResponse, vec![0x00]).unwrap();
        assert_eq!(
            BusMessage::decode(&frame).unwrap(),
            BusMessage::WriteResponse { accepted: false }
        );
    }

    #[test]
    fn test_data_message_slots() {
        let data = vec![
            0x44, 0x9C, 0x74, 0x00, // 40004 = 116
            0xFF, 0xFF, 0x00, 0x00, // unused
        ];
        let frame = Frame::from_master(0x20, Command::DataMessage, data).unwrap();
        let BusMessage::DataMessage(slots) = BusMessage::decode(&frame).unwrap() else {
            panic!("expected data message");
        };
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].register, 40004);
        assert_eq!(slots[0].value, [0x74, 0x00]);
        assert!(!slots[0].is_unused());
        assert!(slots[1].is_unused());
    }

    #[test]
    fn test_data_message_bad_length() {
        let frame = Frame::from_master(0x20, Command::DataMessage, vec![0x44, 0x9C, 0x74]).unwrap();
        assert_eq!(BusMessage::decode(&frame).unwrap_err().kind(), "malformed");
    }

    #[test]
    fn test_poll_with_data_rejected() {
        let frame = Frame::from_master(0x20, Command::ReadRequest, vec![0x01]).unwrap();
        assert!(BusMessage::decode(&frame).is_err());
    }

    #[test]
    fn test_other_command() {
        let frame = Frame::from_master(0x20, Command::ProductInfo, vec![0x01, 0x02]).unwrap();
        assert_eq!(
            BusMessage::decode(&frame).unwrap(),
            BusMessage::Other {
                command: Command::ProductInfo,
                data: vec![0x01, 0x02],
            }
        );
    }
}
