//! Boot ROM image.
//!
//! The machine maps 512 words of ROM at 0xFFFFF800 and resets into it. The
//! embedded image is a minimal stub that hands control to RAM address 0,
//! which is enough for preloaded programs and for serial boot; a full
//! Project Oberon bootloader image can be substituted at runtime with
//! `--rom` (2048 bytes, little-endian words).
//!
//! Three words of the Oberon bootloader encode the memory limit and stack
//! origin as immediate operands; `configure_memory` patches them in place.
//! The stub carries the same constants at the same indices for the default
//! 1 MiB layout.

use cpu_risc5::ROM_WORDS;

/// ROM index of `MOV' R12, memLim >> 16`.
pub(crate) const PATCH_MEM_LIMIT_HI: usize = 372;
/// ROM index of `IOR R12, R12, memLim & 0xFFFF`.
pub(crate) const PATCH_MEM_LIMIT_LO: usize = 373;
/// ROM index of `MOV' R14, stackOrg >> 16`.
pub(crate) const PATCH_STACK_ORG_HI: usize = 376;

/// The embedded boot image.
pub(crate) const BOOTLOADER: [u32; ROM_WORDS] = bootloader();

const fn bootloader() -> [u32; ROM_WORDS] {
    let mut rom = [0u32; ROM_WORDS];
    rom[0] = 0x4000_0000; // MOV  R0, 0
    rom[1] = 0xC700_0000; // B    R0
    // Default layout constants (displayStart 0xE7F00):
    //   memLim   = 0xE7EF0, stackOrg = 0x73F80
    rom[PATCH_MEM_LIMIT_HI] = 0x6100_000E;
    rom[PATCH_MEM_LIMIT_LO] = 0x4116_7EF0;
    rom[PATCH_STACK_ORG_HI] = 0x6100_0007;
    rom
}

/// Decode a ROM image file: exactly 512 little-endian 32-bit words.
pub fn decode(bytes: &[u8]) -> Option<[u32; ROM_WORDS]> {
    if bytes.len() != ROM_WORDS * 4 {
        return None;
    }
    let mut rom = [0u32; ROM_WORDS];
    for (word, chunk) in rom.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Some(rom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_round_trips() {
        let mut bytes = vec![0u8; ROM_WORDS * 4];
        bytes[0..4].copy_from_slice(&0x4000_0000u32.to_le_bytes());
        bytes[2044..2048].copy_from_slice(&0xC700_0000u32.to_le_bytes());
        let rom = decode(&bytes).expect("correct size");
        assert_eq!(rom[0], 0x4000_0000);
        assert_eq!(rom[511], 0xC700_0000);
    }

    #[test]
    fn decode_rejects_wrong_size() {
        assert!(decode(&[0u8; 100]).is_none());
        assert!(decode(&[0u8; 4096]).is_none());
    }
}
