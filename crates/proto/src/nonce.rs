// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command nonce format: `<unix-ms-timestamp>-<8 hex>`.
//!
//! Nonces are chosen by the command issuer and interpreted only by the
//! hub's device pipeline, which uses them for idempotent execution. The
//! broker treats them as opaque strings.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::TryRngCore;
use regex::Regex;

/// Single dash, at least a 13-digit millisecond timestamp, exactly 8 hex
/// digits. Both hex cases are accepted for client compatibility.
const NONCE_PATTERN: &str = r"^[0-9]{13,}-[0-9a-fA-F]{8}$";

fn nonce_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        let re = Regex::new(NONCE_PATTERN).unwrap();
        re
    })
}

/// Whether a nonce is well-formed.
pub fn is_valid(nonce: &str) -> bool {
    nonce_regex().is_match(nonce)
}

/// Generate a well-formed nonce from the current millisecond timestamp and
/// four bytes of OS randomness.
///
/// If the system RNG is unavailable the entropy falls back to a derivation
/// from the monotonic clock — weaker, but still unique enough for
/// per-command dedup keys.
pub fn generate() -> String {
    let millis = epoch_millis();
    let mut entropy = [0u8; 4];
    if OsRng.try_fill_bytes(&mut entropy).is_err() {
        entropy = monotonic_entropy();
    }
    format!(
        "{millis}-{:02x}{:02x}{:02x}{:02x}",
        entropy[0], entropy[1], entropy[2], entropy[3]
    )
}

fn epoch_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

/// Entropy fallback: low bits of the monotonic clock since process start.
fn monotonic_entropy() -> [u8; 4] {
    static START: OnceLock<std::time::Instant> = OnceLock::new();
    let start = START.get_or_init(std::time::Instant::now);
    let nanos = start.elapsed().as_nanos() as u32;
    nanos.to_be_bytes()
}

#[cfg(test)]
#[path = "nonce_tests.rs"]
mod tests;
