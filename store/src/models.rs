// store/src/models.rs
//
// The data model of §3: P2PK addresses, the transactions/blocks that
// reference them, and scan progress. `address_key` is always the first
// 34 lowercase hex characters of the public key — the natural key every
// other table joins against.

/// Derive the address key from a raw public key hex string.
pub fn address_key_from_pubkey(pubkey_hex: &str) -> String {
    pubkey_hex.to_ascii_lowercase().chars().take(34).collect()
}

/// A P2PK public key observed on-chain, keyed by `address_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2pkAddress {
    pub id: i64,
    pub address_key: String,
    pub pubkey_hex: String,
    pub first_seen_height: u64,
    pub last_seen_height: u64,
}

/// A single input or output event referencing a P2PK address within a
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2pkTransaction {
    pub address_id: i64,
    pub txid: String,
    pub height: u64,
    pub block_time: u64,
    pub is_input: bool,
    pub index: u32,
    pub amount_satoshi: u64,
}

/// Marks that a P2PK address appeared (as input or output) within a
/// given block. A mirror of `P2pkTransaction` optimized for per-address
/// block-range queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2pkAddressBlock {
    pub address_id: i64,
    pub height: u64,
    pub is_input: bool,
    pub amount_satoshi: u64,
    pub txid: String,
}

/// The scanner's contiguous high-water mark, persisted after each writer
/// commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanProgress {
    pub last_scanned_height: u64,
}

/// Records that a block was scanned, whether or not it contained any
/// P2PK output — distinguishes "unscanned" (no row) from "scanned,
/// empty" (a row with `had_p2pk = false`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedBlock {
    pub height: u64,
    pub had_p2pk: bool,
}

/// A single fact produced by a worker, destined for the write-behind
/// buffer. Carries `pubkey_hex` directly (rather than requiring a
/// separate address-seen lookup) so every variant can resolve its own
/// address independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteEvent {
    /// A P2PK address was observed at `height` (first or repeat sighting).
    AddressSeen { pubkey_hex: String, height: u64 },
    /// The address appeared as an input or output of `txid`.
    Transaction {
        pubkey_hex: String,
        txid: String,
        height: u64,
        block_time: u64,
        is_input: bool,
        index: u32,
        amount_satoshi: u64,
    },
    /// The address appeared within `height` (deduplicated per block).
    AddressBlock {
        pubkey_hex: String,
        height: u64,
        is_input: bool,
        amount_satoshi: u64,
        txid: String,
    },
    /// A block finished processing, whether or not it held any P2PK
    /// event.
    BlockScanned { height: u64, had_p2pk: bool },
}

impl WriteEvent {
    /// The address key this event concerns, if any (`BlockScanned` has
    /// none, since it is not address-scoped).
    pub fn address_key(&self) -> Option<String> {
        self.pubkey_hex().map(address_key_from_pubkey)
    }

    pub fn pubkey_hex(&self) -> Option<&str> {
        match self {
            WriteEvent::AddressSeen { pubkey_hex, .. } => Some(pubkey_hex),
            WriteEvent::Transaction { pubkey_hex, .. } => Some(pubkey_hex),
            WriteEvent::AddressBlock { pubkey_hex, .. } => Some(pubkey_hex),
            WriteEvent::BlockScanned { .. } => None,
        }
    }

    pub fn height(&self) -> u64 {
        match self {
            WriteEvent::AddressSeen { height, .. } => *height,
            WriteEvent::Transaction { height, .. } => *height,
            WriteEvent::AddressBlock { height, .. } => *height,
            WriteEvent::BlockScanned { height, .. } => *height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_key_is_first_34_lowercase_hex_chars() {
        let pubkey = "04AB".to_string() + &"cd".repeat(63);
        let key = address_key_from_pubkey(&pubkey);
        assert_eq!(key.len(), 34);
        assert_eq!(key, key.to_ascii_lowercase());
    }

    #[test]
    fn block_scanned_has_no_address_key() {
        let event = WriteEvent::BlockScanned {
            height: 10,
            had_p2pk: false,
        };
        assert_eq!(event.address_key(), None);
        assert_eq!(event.height(), 10);
    }
}
