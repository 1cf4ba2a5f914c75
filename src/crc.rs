// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crc16::{State, CCITT_FALSE};

/// Running CRC-16/CCITT-FALSE accumulator.
///
/// Several non-contiguous segments of one logical frame can be folded in with
/// repeated calls to [`Crc16::process`].  The checksum is appended to a frame
/// most significant byte first, so folding an intact frame together with its
/// trailing checksum leaves a residue of zero.
pub struct Crc16 {
    state: State<CCITT_FALSE>,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 {
    pub fn new() -> Crc16 {
        Crc16 {
            state: State::<CCITT_FALSE>::new(),
        }
    }

    /// Clears the accumulator back to the initial value.
    pub fn reset(&mut self) {
        self.state = State::<CCITT_FALSE>::new();
    }

    pub fn process(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    pub fn value(&self) -> u16 {
        self.state.get()
    }

    /// Returns the checksum in wire order, ready to be appended to a frame.
    pub fn value_as_bytes(&self) -> [u8; 2] {
        self.value().to_be_bytes()
    }
}

/// Computes the checksum of a single contiguous buffer.
pub fn checksum(data: &[u8]) -> u16 {
    State::<CCITT_FALSE>::calculate(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        let msg = [0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39];
        assert_eq!(checksum(&msg), 0x29B1);

        let mut crc = Crc16::new();
        crc.process(&msg);
        assert_eq!(crc.value(), 0x29B1);
        assert_eq!(crc.value_as_bytes(), [0x29, 0xB1]);
    }

    #[test]
    fn test_segments() {
        let msg = [0x00, 0x0A, 0x12, 0x34, 0xAB, 0xCD, 0xEF, 0x01, 0x02];

        let mut crc = Crc16::new();
        crc.process(&msg[..3]);
        crc.process(&msg[3..7]);
        crc.process(&msg[7..]);

        assert_eq!(crc.value(), checksum(&msg));
    }

    #[test]
    fn test_reset() {
        let mut crc = Crc16::new();
        crc.process(&[0xDE, 0xAD, 0xBE, 0xEF]);
        crc.reset();
        crc.process(b"123456789");
        assert_eq!(crc.value(), 0x29B1);
    }

    #[test]
    fn test_residue() {
        let frames: [&[u8]; 4] = [
            &[],
            &[0x00],
            &[0x00, 0x01, 0x00, 0x00],
            &[0xE0, 0x00, 0xFF, 0xFF, 0x12, 0x34, 0x56, 0x78, 0x9A],
        ];

        for frame in frames {
            let mut crc = Crc16::new();
            crc.process(frame);
            let trailer = crc.value_as_bytes();

            let mut sealed = frame.to_vec();
            sealed.extend_from_slice(&trailer);
            assert_eq!(checksum(&sealed), 0, "frame {:02X?}", frame);

            // Verification may also fold payload and trailer separately.
            let mut verify = Crc16::new();
            verify.process(frame);
            verify.process(&trailer);
            assert_eq!(verify.value(), 0);
        }
    }

    #[test]
    fn test_bit_flip() {
        let frame = [0x00, 0x0A, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04];
        let mut sealed = frame.to_vec();
        sealed.extend_from_slice(&checksum(&frame).to_be_bytes());

        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut corrupt = sealed.clone();
                corrupt[byte] ^= 1 << bit;
                assert_ne!(checksum(&corrupt), 0, "flip {}:{}", byte, bit);
            }
        }
    }
}
