// classifier/src/lib.rs
//
// Pure, synchronous classification of Bitcoin output scripts as
// Pay-to-Public-Key (P2PK), plus a false-positive-tolerant block-level
// pre-filter. Never performs I/O and never errors: an unrecognized or
// malformed script classifies as "not P2PK", not a fault.

use node::{RawBlock, ScriptPubKey};

/// A classified P2PK public key, tagged by its on-wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubkeyKind {
    /// 65-byte key, `04` prefix, 130 hex characters.
    Uncompressed(String),
    /// 33-byte key, `02`/`03` prefix, 66 hex characters.
    Compressed(String),
}

impl PubkeyKind {
    /// The raw hex-encoded public key, in whichever encoding it was found.
    pub fn hex(&self) -> &str {
        match self {
            PubkeyKind::Uncompressed(hex) => hex,
            PubkeyKind::Compressed(hex) => hex,
        }
    }

    /// The address key derived from this public key: the first 34
    /// lowercase hex characters.
    pub fn address_key(&self) -> String {
        let hex = self.hex().to_ascii_lowercase();
        hex.chars().take(34).collect()
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn classify_pubkey_hex(public_key: &str) -> Option<PubkeyKind> {
    if public_key.len() == 130 && public_key.starts_with("04") && is_hex(public_key) {
        Some(PubkeyKind::Uncompressed(public_key.to_string()))
    } else if public_key.len() == 66
        && (public_key.starts_with("02") || public_key.starts_with("03"))
        && is_hex(public_key)
    {
        Some(PubkeyKind::Compressed(public_key.to_string()))
    } else {
        None
    }
}

/// Classify a single output script. Returns `None` for every script type
/// other than P2PK, including P2PKH (explicitly excluded, not merely
/// unrecognized) and any script that superficially resembles P2PK but
/// fails strict key-format validation.
pub fn classify_script(script_pub_key: &ScriptPubKey) -> Option<PubkeyKind> {
    if script_pub_key.script_type.as_deref() == Some("pubkeyhash") {
        return None;
    }

    // Primary detection: Bitcoin Core's own script classifier plus an
    // OP_CHECKSIG-terminated single-push asm string.
    if script_pub_key.script_type.as_deref() == Some("pubkey") {
        let asm = script_pub_key.asm.as_str();
        if asm.contains("OP_CHECKSIG") {
            let parts: Vec<&str> = asm.split_whitespace().collect();
            if parts.len() >= 2 && parts.last() == Some(&"OP_CHECKSIG") {
                if let Some(kind) = classify_pubkey_hex(parts[0]) {
                    return Some(kind);
                }
                tracing::debug!(
                    pubkey_prefix = &parts[0][..parts[0].len().min(20)],
                    len = parts[0].len(),
                    "asm type=pubkey but key failed format validation"
                );
            }
        }
    }

    // Secondary detection: raw hex push-framing, for nodes/backends that
    // don't populate `asm`/`type` the same way.
    let hex_data = script_pub_key.hex.as_str();
    if hex_data.len() == 134 && hex_data.starts_with("41") {
        let public_key = &hex_data[2..hex_data.len() - 2];
        if let Some(kind @ PubkeyKind::Uncompressed(_)) = classify_pubkey_hex(public_key) {
            return Some(kind);
        }
    } else if hex_data.len() == 70 && hex_data.starts_with("41") {
        let public_key = &hex_data[2..hex_data.len() - 2];
        if let Some(kind @ PubkeyKind::Compressed(_)) = classify_pubkey_hex(public_key) {
            return Some(kind);
        }
    }

    None
}

/// Cheap pre-check on a spending input's `scriptSig` asm: a P2PK signature
/// push is always 71–73 bytes (142–146 hex characters), so anything
/// outside that range is definitely not spending a P2PK output. Callers
/// use this to skip the previous-transaction fetch for inputs that can't
/// possibly be P2PK. `None` (no asm available, e.g. a SegWit spend) is
/// conservatively "may be P2PK" — this heuristic only ever rules things
/// out, never in.
pub fn is_plausibly_p2pk_input(script_sig_asm: Option<&str>) -> bool {
    let Some(asm) = script_sig_asm else {
        return true;
    };
    match asm.split_whitespace().next() {
        Some(sig) => (142..=146).contains(&sig.len()),
        None => true,
    }
}

/// A cheap, false-positive-tolerant, false-negative-intolerant pre-filter:
/// true if the block is worth classifying output-by-output. Must never
/// return false for a block that actually contains a P2PK output, so it
/// reuses the same detection primitives as `classify_script` rather than
/// a separate (and potentially divergent) heuristic.
pub fn quick_scan_block(block: &RawBlock) -> bool {
    block.tx.iter().any(|tx| {
        tx.vout
            .iter()
            .any(|vout| classify_script(&vout.script_pub_key).is_some())
    })
}
