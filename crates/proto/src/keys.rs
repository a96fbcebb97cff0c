// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Z85 key material.
//!
//! Hub and gateway keys travel as Z85 text: 32-byte keys encode to exactly
//! 40 ASCII characters. The codec here carries and format-checks key
//! material; cryptographic verification is a separate, pluggable concern.

use std::fmt;
use std::sync::OnceLock;

use rand::rngs::OsRng;
use rand::TryRngCore;

/// Z85 alphabet (ZeroMQ RFC 32).
const ALPHABET: &[u8; 85] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ.-:+=^!/*?&<>()[]{}@%$#";

/// Encoded length of a 32-byte key.
pub const PUBLIC_KEY_LEN: usize = 40;

/// Z85 codec errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Z85Error {
    /// Input length is not a multiple of the codec's block size.
    BadLength,
    /// A character outside the Z85 alphabet.
    BadChar,
}

impl fmt::Display for Z85Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength => f.write_str("length not a multiple of the z85 block size"),
            Self::BadChar => f.write_str("character outside the z85 alphabet"),
        }
    }
}

impl std::error::Error for Z85Error {}

fn decode_table() -> &'static [i8; 256] {
    static TABLE: OnceLock<[i8; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [-1i8; 256];
        for (i, &c) in ALPHABET.iter().enumerate() {
            table[c as usize] = i as i8;
        }
        table
    })
}

/// Encode bytes as Z85 text. Input length must be a multiple of 4.
pub fn encode(data: &[u8]) -> Result<String, Z85Error> {
    if data.len() % 4 != 0 {
        return Err(Z85Error::BadLength);
    }
    let mut out = String::with_capacity(data.len() / 4 * 5);
    for chunk in data.chunks_exact(4) {
        let mut value = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as u64;
        let mut block = [0u8; 5];
        for slot in block.iter_mut().rev() {
            *slot = ALPHABET[(value % 85) as usize];
            value /= 85;
        }
        for c in block {
            out.push(c as char);
        }
    }
    Ok(out)
}

/// Decode Z85 text back into bytes. Input length must be a multiple of 5.
pub fn decode(text: &str) -> Result<Vec<u8>, Z85Error> {
    let bytes = text.as_bytes();
    if bytes.len() % 5 != 0 {
        return Err(Z85Error::BadLength);
    }
    let table = decode_table();
    let mut out = Vec::with_capacity(bytes.len() / 5 * 4);
    for chunk in bytes.chunks_exact(5) {
        let mut value: u64 = 0;
        for &c in chunk {
            let digit = table[c as usize];
            if digit < 0 {
                return Err(Z85Error::BadChar);
            }
            value = value * 85 + digit as u64;
        }
        if value > u32::MAX as u64 {
            return Err(Z85Error::BadChar);
        }
        out.extend_from_slice(&(value as u32).to_be_bytes());
    }
    Ok(out)
}

/// Whether a string is a well-formed Z85 public key (40 chars, alphabet).
pub fn is_valid_public_key(key: &str) -> bool {
    key.len() == PUBLIC_KEY_LEN && decode(key).is_ok()
}

/// A Z85-encoded keypair.
///
/// The halves are independent random material: nothing in the core derives
/// one from the other, and verification is out of scope here.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KeyPair {
    pub public_key: String,
    pub secret_key: String,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Result<Self, Z85Error> {
        Ok(Self { public_key: random_key()?, secret_key: random_key()? })
    }
}

fn random_key() -> Result<String, Z85Error> {
    let mut bytes = [0u8; 32];
    if OsRng.try_fill_bytes(&mut bytes).is_err() {
        // Degraded path: stretch clock-derived words across the key.
        for (i, chunk) in bytes.chunks_mut(4).enumerate() {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos()
                .wrapping_add(i as u32 * 0x9e37_79b9);
            chunk.copy_from_slice(&nanos.to_be_bytes());
        }
    }
    encode(&bytes)
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
