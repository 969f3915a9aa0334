//! Decoding of frames captured from a live F470 bus through the UDP gateway.

use nibegw_protocol::*;

fn frame(hex_str: &str) -> Frame {
    let bytes = hex::decode(hex_str).unwrap();
    NibeGwCodec
        .decode(&bytes)
        .unwrap()
        .frame
        .expect("datagram should carry a frame")
}

#[test]
fn test_captured_polls_addressed_to_modbus40() {
    let read = frame("5c0020690049");
    assert!(read.is_addressed_to(ADDR_MODBUS40));
    assert_eq!(BusMessage::decode(&read).unwrap(), BusMessage::ReadPoll);

    let write = frame("5c00206b004b");
    assert!(write.is_addressed_to(ADDR_MODBUS40));
    assert_eq!(write.direction(), Direction::Write);
    assert_eq!(BusMessage::decode(&write).unwrap(), BusMessage::WritePoll);
}

#[test]
fn test_captured_read_response() {
    let f = frame("5c00206a06c1b7000044027c");
    assert_eq!(
        BusMessage::decode(&f).unwrap(),
        BusMessage::ReadResponse {
            register: 47041,
            value: [0x00, 0x00, 0x44, 0x02],
        }
    );
}

#[test]
fn test_accessory_frames_match_capture() {
    let cases = [
        (BusMessage::ReadRequest { register: 47041 }, "c06902c1b7dd"),
        (
            BusMessage::WriteRequest {
                register: 47041,
                value: [0, 0, 0, 0],
            },
            "c06b06c1b700000000db",
        ),
        (
            BusMessage::WriteRequest {
                register: 45171,
                value: [1, 0, 0, 0],
            },
            "c06b0673b0010000006f",
        ),
    ];

    for (message, expected) in cases {
        let f = message.to_frame(Origin::Accessory).unwrap();
        assert_eq!(hex::encode(NibeGwCodec.encode(&f)), expected);

        // And they decode back to the same message
        assert_eq!(BusMessage::decode(&frame(expected)).unwrap(), message);
    }
}

#[test]
fn test_foreign_node_frame() {
    let f = Frame::from_master(ADDR_RMU40, Command::ReadRequest, Vec::new()).unwrap();
    let bytes = NibeGwCodec.encode(&f);
    let decoded = NibeGwCodec.decode(&bytes).unwrap().frame.unwrap();
    assert_eq!(decoded.node(), Some(ADDR_RMU40));
    assert!(!decoded.is_addressed_to(ADDR_MODBUS40));
}

#[test]
fn test_single_bit_corruption_is_detected() {
    let captured = [
        "5c00206a06c1b7000044027c",
        "c06b06c1b700000000db",
        "c06b0673b0010000006f",
    ];

    for hex_str in captured {
        let bytes = hex::decode(hex_str).unwrap();
        let header = if bytes[0] == START_MASTER {
            MASTER_HEADER_LEN
        } else {
            ACCESSORY_HEADER_LEN
        };
        let data_end = bytes.len() - 1;

        for index in header..data_end {
            for bit in 0..8 {
                let mut corrupted = bytes.clone();
                corrupted[index] ^= 1 << bit;
                let err = NibeGwCodec.decode(&corrupted).unwrap_err();
                assert!(
                    matches!(err, FrameError::ChecksumMismatch { .. }),
                    "{} byte {} bit {}: {:?}",
                    hex_str,
                    index,
                    bit,
                    err
                );
            }
        }
    }
}

#[test]
fn test_escaped_data_message_roundtrip() {
    // Register 0x5C5C with value 0x005C exercises escaping in every field
    let message = BusMessage::DataMessage(vec![
        DataSlot {
            register: 0x5C5C,
            value: [0x5C, 0x00],
        },
        DataSlot {
            register: UNUSED_REGISTER,
            value: [0x00, 0x00],
        },
    ]);
    let f = message.to_frame(Origin::Master { node: ADDR_MODBUS40 }).unwrap();
    let bytes = NibeGwCodec.encode(&f);

    // Three escaped bytes add three to the length field
    assert_eq!(bytes[4] as usize, 8 + 3);
    assert_eq!(BusMessage::decode(&NibeGwCodec.decode(&bytes).unwrap().frame.unwrap()).unwrap(), message);
}
