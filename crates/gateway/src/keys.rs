// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway key material: load-or-generate with atomic persistence.

use std::path::Path;

use tracing::info;

use hearth_proto::keys::KeyPair;

/// Load the gateway keypair, generating and persisting one when missing.
pub fn load_or_generate(path: &Path) -> anyhow::Result<KeyPair> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        let keys: KeyPair = serde_json::from_str(&contents)?;
        return Ok(keys);
    }
    let keys = KeyPair::generate().map_err(|e| anyhow::anyhow!("key generation failed: {e}"))?;
    let json = serde_json::to_string_pretty(&keys)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    info!(path = %path.display(), "generated gateway keypair");
    Ok(keys)
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
