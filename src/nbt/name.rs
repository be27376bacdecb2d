//! NetBIOS names and their first-level wire encoding. A name is at most
//! 15 characters plus a one-byte service type; on the wire the 16-byte
//! field is split into nibbles and shifted into the `A`..`P` alphabet,
//! giving a fixed 34-byte question name.

use std::fmt;

/// Length of the encoded name field: length octet, 32 half-ascii
/// octets, terminating zero octet.
pub const ENCODED_NAME_LEN: usize = 34;

const MAX_NETBIOS_NAME_LEN: usize = 15;

/// A NetBIOS name: up to 15 bytes of label plus the service type byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NbtName {
    name: String,
    name_type: u8,
}

impl NbtName {
    /// Build a name for the wire. The label is upper-cased and silently
    /// truncated to 15 characters, matching what every other NBT
    /// implementation does with over-long labels.
    pub fn new(name: &str, name_type: u8) -> Self {
        let mut name = name.to_uppercase();
        if name.len() > MAX_NETBIOS_NAME_LEN {
            let mut cut = MAX_NETBIOS_NAME_LEN;
            while !name.is_char_boundary(cut) {
                cut -= 1;
            }
            name.truncate(cut);
        }
        Self { name, name_type }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_type(&self) -> u8 {
        self.name_type
    }

    /// Append the 34-byte encoded form. The wildcard name `*` pads with
    /// zero octets; everything else pads with spaces.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let pad = if self.name == "*" { 0u8 } else { b' ' };
        let mut field = [pad; 16];
        field[..self.name.len()].copy_from_slice(self.name.as_bytes());
        field[15] = self.name_type;

        buf.push(0x20);
        for byte in field {
            buf.push(b'A' + (byte >> 4));
            buf.push(b'A' + (byte & 0x0f));
        }
        buf.push(0x00);
    }

    /// Decode an encoded name starting at `offset`. Returns the name and
    /// the offset of the first byte after it. Compressed label pointers
    /// are accepted but their referent is not followed; responses echo
    /// the question name, so nothing of value is lost.
    pub fn decode(buf: &[u8], offset: usize) -> Option<(NbtName, usize)> {
        let len = *buf.get(offset)? as usize;

        if len & 0xc0 == 0xc0 {
            // Two-byte compression pointer.
            buf.get(offset + 1)?;
            return Some((NbtName::new("", 0), offset + 2));
        }

        if len != 0x20 {
            return None;
        }
        let encoded = buf.get(offset + 1..offset + 33)?;
        if *buf.get(offset + 33)? != 0x00 {
            return None;
        }

        let mut field = [0u8; 16];
        for (i, pair) in encoded.chunks_exact(2).enumerate() {
            let hi = pair[0].checked_sub(b'A')?;
            let lo = pair[1].checked_sub(b'A')?;
            if hi > 0x0f || lo > 0x0f {
                return None;
            }
            field[i] = (hi << 4) | lo;
        }

        let name_type = field[15];
        let label: Vec<u8> = field[..15]
            .iter()
            .copied()
            .take_while(|&b| b != 0)
            .collect();
        let name = String::from_utf8_lossy(&label).trim_end().to_string();

        Some((NbtName { name, name_type }, offset + ENCODED_NAME_LEN))
    }
}

impl fmt::Display for NbtName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<0x{:02x}>", self.name, self.name_type)
    }
}
