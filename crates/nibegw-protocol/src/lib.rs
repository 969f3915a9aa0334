//! Nibe Accessory Bus Protocol
//!
//! This crate provides types and utilities for the framing used on the RS485
//! accessory bus of Nibe heat pumps, as relayed one frame per datagram by a
//! serial-to-UDP gateway. The heat pump is the bus master; accessories such as
//! MODBUS40 answer its polls.
//!
//! # Protocol Overview
//!
//! - **Master frames** (heat pump → accessory): `5C 00 <node> <cmd> <len> <data> <chk>`
//! - **Accessory frames** (accessory → heat pump): `C0 <cmd> <len> <data> <chk>`
//! - **Handshakes**: a single `06` (ACK) or `15` (NAK) byte, optionally
//!   followed by a frame in the same datagram.
//!
//! The byte layout lives behind the [`FrameCodec`] trait so it can be
//! recalibrated against captured traffic without touching anything that
//! consumes [`Frame`]s.
//!
//! # Example
//!
//! ```rust
//! use nibegw_protocol::{BusMessage, FrameCodec, NibeGwCodec, ADDR_MODBUS40};
//!
//! let codec = NibeGwCodec;
//! let datagram = codec.decode(&[0x5C, 0x00, 0x20, 0x69, 0x00, 0x49]).unwrap();
//! let frame = datagram.frame.unwrap();
//! assert!(frame.is_addressed_to(ADDR_MODBUS40));
//! assert_eq!(BusMessage::decode(&frame).unwrap(), BusMessage::ReadPoll);
//! ```

mod constants;
mod error;
mod frame;
mod messages;

pub use constants::*;
pub use error::*;
pub use frame::*;
pub use messages::*;
