/// CRC-8 generator polynomial x^8 + x^2 + x + 1 (SMBus variant, no reflection,
/// zero init, zero xorout).
const POLY: u8 = 0x07;

const TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Cyclic-redundancy accumulator over a transfer payload.
///
/// The register is handed out as a `u32`; only its least significant byte is
/// ever transmitted (see [`trailer_byte`]) and only that byte is compared.
#[derive(Debug, Clone, Copy, Default)]
pub struct Checksum {
    crc: u8,
}

impl Checksum {
    pub fn new() -> Self {
        Self { crc: 0 }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.crc = TABLE[usize::from(self.crc ^ byte)];
        }
    }

    pub fn finalize(self) -> u32 {
        u32::from(self.crc)
    }

    /// One-shot checksum of a whole payload.
    pub fn of(bytes: &[u8]) -> u32 {
        let mut checksum = Self::new();
        checksum.update(bytes);
        checksum.finalize()
    }
}

/// The byte that is transmitted after a payload.
pub fn trailer_byte(checksum: u32) -> u8 {
    (checksum & 0xFF) as u8
}

/// Compares a locally computed checksum against a received trailer. Only the
/// transmitted low byte takes part in the comparison.
pub fn trailer_matches(checksum: u32, received: u8) -> bool {
    trailer_byte(checksum) == received
}
