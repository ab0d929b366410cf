//! Low-level byte-buffer helpers shared by both wire protocols.
//!
//! XOR checksums (DDC/CI), big-endian integer/float extraction (HUEY
//! register reads) and hex formatting for error messages.

/// Running XOR over `bytes`, seeded with `seed`.
///
/// DDC/CI frames use this both ways: the sender appends the XOR of
/// everything before the checksum byte, and the receiver XORs the whole
/// frame (checksum included) expecting a zero residue.
pub fn xor_checksum(seed: u8, bytes: &[u8]) -> u8 {
    bytes.iter().fold(seed, |sum, &b| sum ^ b)
}

/// Assemble four big-endian bytes into a u32.
pub fn be_u32(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

/// Reinterpret four big-endian bytes as an IEEE-754 single.
pub fn be_f32(bytes: [u8; 4]) -> f32 {
    f32::from_bits(u32::from_be_bytes(bytes))
}

/// Format a byte slice as space-separated hex for error messages.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
