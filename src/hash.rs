//! Field and value hashing.
//!
//! - Field ids use an unseeded 31-multiplier string hash, so they are stable
//!   across runs and across indexes.
//! - Value hashes use Murmur3 (x86, 32-bit) seeded with the index seed.
//!
//! Both hash raw bytes: the scanner never decodes escapes, so a value is
//! hashed exactly as it appears between its quotes in the data file.

use std::io::Cursor;

/// Fold one byte into a running field-name hash.
#[inline]
pub fn step_field_hash(hash: u32, byte: u8) -> u32 {
    hash.wrapping_mul(31).wrapping_add(byte as u32)
}

/// Field id of a field name.
pub fn field_id(name: &str) -> u32 {
    name.bytes().fold(0, step_field_hash)
}

/// Seeded hash of a raw value.
pub fn value_hash(value: &[u8], seed: u32) -> u32 {
    // Cursor reads are infallible.
    murmur3::murmur3_32(&mut Cursor::new(value), seed).unwrap_or_default()
}

/// Fresh seed for a new index.
pub fn random_seed() -> u32 {
    rand::random::<u32>() & 0x7fff_ffff
}
