// node/src/types.rs
//
// Wire shapes for the subset of `getblock`/`getrawtransaction` verbosity-2
// JSON that the scanner reads. Deliberately partial: fields the scanner
// never touches (e.g. `versionHex`, `weight`) are left out rather than
// modeled and ignored.

use serde::Deserialize;

/// A block as returned by `getblock <hash> 2`: full embedded transactions.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBlock {
    pub hash: String,
    pub height: u64,
    pub time: u64,
    pub tx: Vec<RawTx>,
}

/// A transaction as embedded in a verbosity-2 block, or as returned
/// directly by `getrawtransaction <txid> true`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTx {
    pub txid: String,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
}

/// A transaction input. `txid`/`vout` are absent for the coinbase input.
#[derive(Debug, Clone, Deserialize)]
pub struct TxIn {
    pub txid: Option<String>,
    pub vout: Option<u32>,
    pub coinbase: Option<String>,
    #[serde(rename = "scriptSig")]
    pub script_sig: Option<ScriptSig>,
}

impl TxIn {
    /// True if this input has no previous output to resolve (coinbase).
    pub fn is_coinbase(&self) -> bool {
        self.coinbase.is_some() || self.txid.is_none()
    }
}

/// The `scriptSig` object Bitcoin Core attaches to each non-coinbase input.
/// Absent its `asm` (e.g. a pure-SegWit spend), the input-side heuristic
/// conservatively assumes "may be P2PK".
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptSig {
    pub asm: String,
}

/// A transaction output.
#[derive(Debug, Clone, Deserialize)]
pub struct TxOut {
    pub value: f64,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

impl TxOut {
    /// `value` as Bitcoin Core reports it (BTC, floating point) converted
    /// to satoshis for storage.
    pub fn amount_satoshi(&self) -> u64 {
        (self.value * 100_000_000.0).round() as u64
    }
}

/// The `scriptPubKey` object Bitcoin Core attaches to each output.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptPubKey {
    pub asm: String,
    pub hex: String,
    #[serde(rename = "type")]
    pub script_type: Option<String>,
}
