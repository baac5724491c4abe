//! LED wire codec: v1 single-stream and v2 multi-stream datagram formats.
//!
//! Both shapes share a 3-byte ASCII header `LED` followed by a version byte.
//! Encoders are total (values are clamped, never rejected); decoders reject
//! anything truncated or header-mismatched.

use std::collections::BTreeMap;

use crate::hwmode::HardwareMode;

const HEADER: [u8; 3] = *b"LED";
const VERSION_1: u8 = 1;
const VERSION_2: u8 = 2;

/// A decoded LED packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Single-stream v1: one brightness vector.
    V1 { values: Vec<u8> },
    /// Multi-stream v2: one brightness vector per stream id.
    V2 { streams: BTreeMap<u8, Vec<u8>> },
}

/// Reasons a decode can fail. All are silently-droppable at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("packet too short")]
    TooShort,
    #[error("missing LED header")]
    BadHeader,
    #[error("unsupported version byte")]
    UnknownVersion,
    #[error("packet truncated before declared length")]
    Truncated,
}

/// Encodes a v1 single-stream packet. Values are clamped to `u8` range
/// implicitly (the parameter type already is `u8`); the channel count is the
/// slice length, silently truncated to 255 if longer (the wire format has no
/// room for more).
pub fn encode_v1(values: &[u8]) -> Vec<u8> {
    let channels = values.len().min(u8::MAX as usize);
    let mut packet = Vec::with_capacity(5 + channels);
    packet.extend_from_slice(&HEADER);
    packet.push(VERSION_1);
    packet.push(channels as u8);
    packet.extend_from_slice(&values[..channels]);
    packet
}

/// Encodes a v2 multi-stream packet from an ordered stream map.
///
/// Iteration is in ascending `stream_id` order (a `BTreeMap`), which also
/// doubles as the deterministic tie-break the repeater's stream-selection
/// priority (d) relies on.
pub fn encode_v2(streams: &BTreeMap<u8, Vec<u8>>) -> Vec<u8> {
    let stream_count = streams.len().min(u8::MAX as usize);
    let mut packet = Vec::new();
    packet.extend_from_slice(&HEADER);
    packet.push(VERSION_2);
    packet.push(stream_count as u8);
    for (stream_id, values) in streams.iter().take(stream_count) {
        let channels = values.len().min(u8::MAX as usize);
        packet.push(*stream_id);
        packet.push(channels as u8);
        packet.extend_from_slice(&values[..channels]);
    }
    packet
}

/// Decodes a v1 or v2 packet from raw bytes.
pub fn decode(data: &[u8]) -> Result<Packet, DecodeError> {
    if data.len() < 5 {
        return Err(DecodeError::TooShort);
    }
    if data[0..3] != HEADER {
        return Err(DecodeError::BadHeader);
    }

    match data[3] {
        VERSION_1 => {
            let channels = data[4] as usize;
            let expected_len = 5 + channels;
            if data.len() < expected_len {
                return Err(DecodeError::Truncated);
            }
            Ok(Packet::V1 {
                values: data[5..expected_len].to_vec(),
            })
        }
        VERSION_2 => {
            let stream_count = data[4] as usize;
            let mut streams = BTreeMap::new();
            let mut offset = 5usize;
            for _ in 0..stream_count {
                if offset + 2 > data.len() {
                    return Err(DecodeError::Truncated);
                }
                let stream_id = data[offset];
                let channels = data[offset + 1] as usize;
                offset += 2;
                if offset + channels > data.len() {
                    return Err(DecodeError::Truncated);
                }
                // Unknown stream ids are consumed (block length is declared,
                // so the rest of the packet still parses) but dropped.
                if HardwareMode::from_stream_id(stream_id).is_some() {
                    streams.insert(stream_id, data[offset..offset + channels].to_vec());
                }
                offset += channels;
            }
            Ok(Packet::V2 { streams })
        }
        _ => Err(DecodeError::UnknownVersion),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_round_trips() {
        let values = vec![1, 2, 3, 4];
        let packet = encode_v1(&values);
        match decode(&packet).unwrap() {
            Packet::V1 { values: decoded } => assert_eq!(decoded, values),
            _ => panic!("expected v1"),
        }
    }

    #[test]
    fn v2_round_trips() {
        let mut streams = BTreeMap::new();
        streams.insert(1u8, vec![16, 32, 48, 64]);
        streams.insert(3u8, vec![1, 2, 3]);
        let packet = encode_v2(&streams);
        match decode(&packet).unwrap() {
            Packet::V2 { streams: decoded } => assert_eq!(decoded, streams),
            _ => panic!("expected v2"),
        }
    }

    #[test]
    fn unknown_stream_id_is_skipped() {
        let mut streams = BTreeMap::new();
        streams.insert(1u8, vec![1, 2, 3, 4]);
        streams.insert(9u8, vec![9, 9]);
        let packet = encode_v2(&streams);
        match decode(&packet).unwrap() {
            Packet::V2 { streams: decoded } => {
                let mut expected = BTreeMap::new();
                expected.insert(1u8, vec![1, 2, 3, 4]);
                assert_eq!(decoded, expected);
            }
            _ => panic!("expected v2"),
        }
    }

    #[test]
    fn scenario_4ch_to_2ch_input_packet_decodes() {
        // §8 scenario 1's input packet.
        let bytes = [0x4C, 0x45, 0x44, 0x02, 0x01, 0x01, 0x04, 0x10, 0x20, 0x30, 0x40];
        let decoded = decode(&bytes).unwrap();
        let mut expected = BTreeMap::new();
        expected.insert(1u8, vec![0x10, 0x20, 0x30, 0x40]);
        assert_eq!(decoded, Packet::V2 { streams: expected });
    }

    #[test]
    fn short_packet_rejected() {
        assert_eq!(decode(&[0x4C, 0x45, 0x44, 0x01]), Err(DecodeError::TooShort));
    }

    #[test]
    fn bad_header_rejected() {
        assert_eq!(
            decode(&[0x00, 0x00, 0x00, 0x01, 0x01, 0x01]),
            Err(DecodeError::BadHeader)
        );
    }

    #[test]
    fn truncated_v2_block_rejected() {
        // Declares 2 channels but only 1 byte follows.
        let bytes = [0x4C, 0x45, 0x44, 0x02, 0x01, 0x01, 0x02, 0xFF];
        assert_eq!(decode(&bytes), Err(DecodeError::Truncated));
    }

    #[test]
    fn unknown_version_rejected() {
        assert_eq!(
            decode(&[0x4C, 0x45, 0x44, 0x07, 0x00]),
            Err(DecodeError::UnknownVersion)
        );
    }

    #[test]
    fn encode_v1_clamps_channel_count_to_255() {
        let values = vec![1u8; 300];
        let packet = encode_v1(&values);
        assert_eq!(packet[4], 255);
        assert_eq!(packet.len(), 5 + 255);
    }
}
