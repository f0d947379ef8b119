//! Bit and register packing for coil, discrete-input and register payloads.
//!
//! Outbound coil packing is MSB-first within each byte while inbound unpacking
//! reads LSB-first. Field devices deployed against this bridge depend on that
//! pairing, so [`pack_booleans_to_bytes`] keeps it. Devices that expect the
//! Modbus-standard outbound order are served by [`pack_booleans_lsb_first`],
//! selected through [`CoilBitOrder`].

use serde::{Deserialize, Serialize};

use crate::utils::error::BridgeError;

/// Outbound packing for Write Multiple Coils. Packing then unpacking gives
/// back the original bits only with `LsbFirst`; `MsbFirst` round-trips just
/// for bytes whose bit pattern is symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoilBitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

impl CoilBitOrder {
    pub fn pack(self, bits: &[bool]) -> Vec<u8> {
        match self {
            CoilBitOrder::MsbFirst => pack_booleans_to_bytes(bits),
            CoilBitOrder::LsbFirst => pack_booleans_lsb_first(bits),
        }
    }
}

/// Groups `bits` into bytes of eight, first bit in the most significant
/// position. A trailing partial byte keeps its bits at the top and zeros below.
pub fn pack_booleans_to_bytes(bits: &[bool]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |byte, (i, &bit)| if bit { byte | (0x80 >> i) } else { byte })
        })
        .collect()
}

/// Modbus-standard coil packing: first bit in bit 0, high bits of the last
/// byte zero-padded.
pub fn pack_booleans_lsb_first(bits: &[bool]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |byte, (i, &bit)| if bit { byte | (1 << i) } else { byte })
        })
        .collect()
}

/// Reads `count` booleans out of `data`, least significant bit first.
///
/// Bits past `count` are discarded. If `data` runs out early the remaining
/// positions are `false`.
pub fn unpack_bytes_to_booleans(data: &[u8], count: u16) -> Vec<bool> {
    let count = count as usize;
    let mut out = vec![false; count];

    for (index, slot) in out.iter_mut().enumerate() {
        if let Some(byte) = data.get(index / 8) {
            *slot = (byte >> (index % 8)) & 0x01 == 1;
        }
    }

    out
}

/// Reads `count` big-endian 16-bit words from `data`.
pub fn unpack_bytes_to_registers(data: &[u8], count: u16) -> Result<Vec<u16>, BridgeError> {
    let needed = count as usize * 2;
    if data.len() < needed {
        return Err(BridgeError::InvalidResponse(format!(
            "expected {} bytes for {} registers, got {}",
            needed,
            count,
            data.len()
        )));
    }

    Ok(data[..needed]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Big-endian byte image of a register sequence, as carried by Write Multiple Registers.
pub fn pack_registers(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: bool = true;
    const F: bool = false;

    #[test]
    fn packs_ten_coils_msb_first() {
        let bytes = pack_booleans_to_bytes(&[T, F, T, F, T, F, T, F, T, T]);
        assert_eq!(bytes, vec![0xAA, 0xC0]);
    }

    #[test]
    fn empty_input_packs_to_nothing() {
        assert!(pack_booleans_to_bytes(&[]).is_empty());
        assert!(pack_booleans_lsb_first(&[]).is_empty());
        assert!(unpack_bytes_to_booleans(&[], 0).is_empty());
    }

    #[test]
    fn unpacks_lsb_first_and_truncates() {
        assert_eq!(unpack_bytes_to_booleans(&[0xFF], 8), vec![T; 8]);
        assert_eq!(unpack_bytes_to_booleans(&[0x01], 3), vec![T, F, F]);
        assert_eq!(
            unpack_bytes_to_booleans(&[0xCD, 0x01], 10),
            vec![T, F, T, T, F, F, T, T, T, F]
        );
    }

    #[test]
    fn short_coil_data_fills_with_false() {
        assert_eq!(unpack_bytes_to_booleans(&[0x03], 10)[..3], [T, T, F]);
        assert_eq!(unpack_bytes_to_booleans(&[0x03], 10).len(), 10);
    }

    #[test]
    fn lsb_first_packing_round_trips() {
        let samples: Vec<Vec<bool>> = vec![
            vec![],
            vec![T],
            vec![T, F, T, F, T, F, T, F, T, T],
            vec![F, F, F, F, F, F, F, T, T, F, F, T, F, T, T, T, F],
            (0..37).map(|i| i % 3 == 0).collect(),
        ];
        for bits in samples {
            let packed = pack_booleans_lsb_first(&bits);
            assert_eq!(packed.len(), (bits.len() + 7) / 8);
            assert_eq!(unpack_bytes_to_booleans(&packed, bits.len() as u16), bits);
        }
    }

    #[test]
    fn msb_first_packing_round_trips_for_symmetric_bytes() {
        let bits = vec![T, F, F, T, T, F, F, T, T, T, T, T, T, T, T, T];
        let packed = pack_booleans_to_bytes(&bits);
        assert_eq!(packed, vec![0x99, 0xFF]);
        assert_eq!(unpack_bytes_to_booleans(&packed, 16), bits);
    }

    #[test]
    fn only_lsb_first_order_round_trips_every_input() {
        let bits = [T, F];
        assert_eq!(unpack_bytes_to_booleans(&CoilBitOrder::LsbFirst.pack(&bits), 2), vec![T, F]);
        assert_eq!(unpack_bytes_to_booleans(&CoilBitOrder::MsbFirst.pack(&bits), 2), vec![F, F]);
    }

    #[test]
    fn bit_order_selects_packer() {
        let bits = [T, F, F];
        assert_eq!(CoilBitOrder::MsbFirst.pack(&bits), vec![0x80]);
        assert_eq!(CoilBitOrder::LsbFirst.pack(&bits), vec![0x01]);
        assert_eq!(CoilBitOrder::default(), CoilBitOrder::MsbFirst);
    }

    #[test]
    fn registers_are_big_endian() {
        let words = unpack_bytes_to_registers(&[0x12, 0x34, 0x00, 0x0A, 0xFF, 0xFF], 3).unwrap();
        assert_eq!(words, vec![0x1234, 0x000A, 0xFFFF]);
        assert_eq!(pack_registers(&words), vec![0x12, 0x34, 0x00, 0x0A, 0xFF, 0xFF]);
    }

    #[test]
    fn register_count_bounds_the_read() {
        assert_eq!(unpack_bytes_to_registers(&[0, 1, 0, 2], 1).unwrap(), vec![1]);
        assert!(unpack_bytes_to_registers(&[], 0).unwrap().is_empty());
        assert!(matches!(
            unpack_bytes_to_registers(&[0x00, 0x01, 0x02], 2),
            Err(BridgeError::InvalidResponse(_))
        ));
    }
}
