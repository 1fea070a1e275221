//! Wire format of the USB DMX interface.
//!
//! Every message is delimited by START_DELIMITER and END_DELIMITER, with a
//! message label and a little-endian 16-bit payload length after the start.
use log::debug;

use crate::dmx::{DmxBuffer, UNIVERSE_SIZE};

pub const START_DELIMITER: u8 = 0x7E;
pub const END_DELIMITER: u8 = 0xE7;

/// Label of an outgoing "send DMX packet" message.
pub const SEND_DMX_LABEL: u8 = 0x06;

/// Label of an incoming "received DMX packet" message.
pub const RECEIVE_DMX_LABEL: u8 = 0x05;

/// DMX null start code.
pub const DMX_START_CODE: u8 = 0x00;

/// Bytes in front of channel 1 in an outgoing frame; channel c sits at
/// FRAME_HEADER_SIZE + c.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Total size of an outgoing frame.
pub const FRAME_LEN: usize = FRAME_HEADER_SIZE + 1 + UNIVERSE_SIZE + 1;

/// Largest payload length accepted from the interface.
pub const MAX_RECEIVE_LEN: usize = UNIVERSE_SIZE + 2;

/// Leading payload bytes of a received packet that precede channel 1.
///
/// The interface sends the start code plus one extra zero byte.
const RECEIVE_PREAMBLE: usize = 2;

/// Serialize a universe into a complete outgoing frame.
pub fn encode_frame(universe: &DmxBuffer) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    let len = (UNIVERSE_SIZE as u16 + 1).to_le_bytes();
    frame[0] = START_DELIMITER;
    frame[1] = SEND_DMX_LABEL;
    frame[2] = len[0];
    frame[3] = len[1];
    frame[FRAME_HEADER_SIZE] = DMX_START_CODE;
    frame[FRAME_HEADER_SIZE + 1..FRAME_LEN - 1].copy_from_slice(universe);
    frame[FRAME_LEN - 1] = END_DELIMITER;
    frame
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ScanStart,
    ScanLabel,
    ReadLength { low: Option<u8> },
    ReadData { len: usize },
    ValidateEnd,
}

/// Byte-at-a-time parser for incoming DMX packets.
///
/// Malformed input never produces an error; the parser drops back to
/// scanning for the next start delimiter.
#[derive(Debug)]
pub struct FrameParser {
    state: State,
    scratch: Vec<u8>,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self {
            state: State::ScanStart,
            scratch: Vec::with_capacity(MAX_RECEIVE_LEN),
        }
    }
}

impl FrameParser {
    /// Feed one byte into the parser.
    ///
    /// Return the channel data of a packet if this byte completed a valid one.
    /// The returned slice starts at channel 1 and may be shorter than a
    /// full universe.
    pub fn push(&mut self, byte: u8) -> Option<&[u8]> {
        match self.state {
            State::ScanStart => {
                if byte == START_DELIMITER {
                    self.state = State::ScanLabel;
                }
            }
            State::ScanLabel => {
                self.state = if byte == RECEIVE_DMX_LABEL {
                    State::ReadLength { low: None }
                } else {
                    debug!("Unexpected message label {byte:#04x}, resynchronizing.");
                    State::ScanStart
                };
            }
            State::ReadLength { low: None } => {
                self.state = State::ReadLength { low: Some(byte) };
            }
            State::ReadLength { low: Some(low) } => {
                let len = u16::from_le_bytes([low, byte]) as usize;
                if len > MAX_RECEIVE_LEN {
                    debug!("Invalid packet length {len}, resynchronizing.");
                    self.state = State::ScanStart;
                } else {
                    self.scratch.clear();
                    self.state = if len == 0 {
                        State::ValidateEnd
                    } else {
                        State::ReadData { len }
                    };
                }
            }
            State::ReadData { len } => {
                self.scratch.push(byte);
                if self.scratch.len() == len {
                    self.state = State::ValidateEnd;
                }
            }
            State::ValidateEnd => {
                self.state = State::ScanStart;
                if byte == END_DELIMITER {
                    let start = RECEIVE_PREAMBLE.min(self.scratch.len());
                    return Some(&self.scratch[start..]);
                }
                debug!("Missing end delimiter, dropping packet.");
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Build an incoming packet carrying the provided channel values.
    pub fn received_packet(channels: &[u8]) -> Vec<u8> {
        let len = (channels.len() + RECEIVE_PREAMBLE) as u16;
        let mut packet = vec![START_DELIMITER, RECEIVE_DMX_LABEL];
        packet.extend_from_slice(&len.to_le_bytes());
        packet.extend_from_slice(&[0, 0]);
        packet.extend_from_slice(channels);
        packet.push(END_DELIMITER);
        packet
    }

    fn parse_all(bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut parser = FrameParser::default();
        bytes
            .iter()
            .filter_map(|b| parser.push(*b).map(|c| c.to_vec()))
            .collect()
    }

    #[test]
    fn test_frame_layout() {
        for universe in [[0u8; 512], [0xE7; 512], [0x7E; 512]] {
            let frame = encode_frame(&universe);
            assert_eq!(518, frame.len());
            assert_eq!(0x7E, frame[0]);
            assert_eq!(0x06, frame[1]);
            assert_eq!([0x01, 0x02], frame[2..4]);
            assert_eq!(0x00, frame[4]);
            assert_eq!(0xE7, frame[517]);
        }
    }

    #[test]
    fn test_channel_position() {
        let mut universe = [0u8; 512];
        for (i, v) in universe.iter_mut().enumerate() {
            *v = (i % 251) as u8;
        }
        let frame = encode_frame(&universe);
        for channel in 1..=512 {
            assert_eq!(universe[channel - 1], frame[FRAME_HEADER_SIZE + channel]);
        }
    }

    #[test]
    fn test_parse_valid() {
        let packets = parse_all(&received_packet(&[1, 2, 3]));
        assert_eq!(vec![vec![1, 2, 3]], packets);
    }

    #[test]
    fn test_corrupt_then_valid() {
        let mut bytes = received_packet(&[9, 9]);
        *bytes.last_mut().unwrap() = 0x00;
        bytes.extend(received_packet(&[4, 5, 6]));
        assert_eq!(vec![vec![4, 5, 6]], parse_all(&bytes));
    }

    #[test]
    fn test_garbage_and_wrong_label() {
        let mut bytes = vec![0x00, 0xFF, 0xE7, 0x7E, 0x06, 0x12];
        bytes.extend(received_packet(&[7]));
        assert_eq!(vec![vec![7]], parse_all(&bytes));
    }

    #[test]
    fn test_oversized_length() {
        let mut bytes = vec![START_DELIMITER, RECEIVE_DMX_LABEL];
        bytes.extend_from_slice(&515u16.to_le_bytes());
        bytes.extend(received_packet(&[1]));
        assert_eq!(vec![vec![1]], parse_all(&bytes));
    }

    #[test]
    fn test_full_universe() {
        let channels = [200u8; 512];
        let packets = parse_all(&received_packet(&channels));
        assert_eq!(1, packets.len());
        assert_eq!(512, packets[0].len());
    }

    #[test]
    fn test_arbitrary_bytes_never_panic() {
        let bytes: Vec<u8> = (0..4096u32).map(|i| (i * 7919 % 256) as u8).collect();
        parse_all(&bytes);
    }
}
