//! Protocol constants
//!
//! Start bytes, handshake bytes, command codes and node addresses observed on
//! the accessory bus.

// ============================================================================
// Start and Handshake Bytes
// ============================================================================

/// First byte of every frame sent by the heat pump.
pub const START_MASTER: u8 = 0x5C;
/// First byte of every frame sent by an accessory.
pub const START_ACCESSORY: u8 = 0xC0;
/// Positive acknowledgement.
pub const ACK: u8 = 0x06;
/// Negative acknowledgement; the previous frame must be sent again.
pub const NAK: u8 = 0x15;
/// Sent in place of a master-frame checksum that computes to [`START_MASTER`].
pub const CHECKSUM_SUBSTITUTE: u8 = 0xC5;

// ============================================================================
// Command Codes
// ============================================================================

/// Continuous-logging data message (unsolicited register values).
pub const CMD_DATA_MSG: u8 = 0x68;
/// Read poll token (master) or read request (accessory).
pub const CMD_READ_REQ: u8 = 0x69;
/// Read response carrying one register value.
pub const CMD_READ_RESP: u8 = 0x6A;
/// Write poll token (master) or write request (accessory).
pub const CMD_WRITE_REQ: u8 = 0x6B;
/// Write response carrying the result of the last write.
pub const CMD_WRITE_RESP: u8 = 0x6C;
/// Product information.
pub const CMD_PRODUCT_INFO: u8 = 0x6D;
/// Accessory version request.
pub const CMD_ACCESSORY_VERSION_REQ: u8 = 0xEE;

// ============================================================================
// Node Addresses
// ============================================================================

/// MODBUS40 accessory.
pub const ADDR_MODBUS40: u16 = 0x0020;
/// SMS40 accessory.
pub const ADDR_SMS40: u16 = 0x0016;
/// RMU40 room unit.
pub const ADDR_RMU40: u16 = 0x0019;

// ============================================================================
// Sizes
// ============================================================================

/// Header length of a master frame: start, node (2), command, length.
pub const MASTER_HEADER_LEN: usize = 5;
/// Header length of an accessory frame: start, command, length.
pub const ACCESSORY_HEADER_LEN: usize = 3;
/// Largest data section the one-byte length field can describe.
pub const MAX_DATA_LEN: usize = u8::MAX as usize;
/// Register marker for an unused data message slot.
pub const UNUSED_REGISTER: u16 = 0xFFFF;
/// Size of one register/value slot in a data message.
pub const DATA_SLOT_LEN: usize = 4;
/// Size of the value field in read responses and write requests.
pub const REGISTER_VALUE_LEN: usize = 4;
