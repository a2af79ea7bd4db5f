// integration-test/src/lib.rs
//
// Shared fakes for end-to-end tests that wire the real classifier,
// worker, distributor and store crates together without a live
// `bitcoind` or Postgres instance — the `NodeClient`/`Backend` seam each
// of those crates already tests against on its own, exercised here across
// crate boundaries.

use async_trait::async_trait;
use node::{NodeClient, NodeError, RawBlock, RawTx, ScriptPubKey, ScriptSig, TxIn, TxOut};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use store::{Backend, FlushBatch, FlushOutcome, StoreError, WriteEvent};

/// An in-memory stand-in for a running Bitcoin node: blocks and
/// transactions are preloaded by height/txid, nothing is fetched over
/// the network.
#[derive(Default)]
pub struct FakeNodeClient {
    pub blocks: HashMap<u64, RawBlock>,
    pub txs: HashMap<String, RawTx>,
}

#[async_trait]
impl NodeClient for FakeNodeClient {
    async fn get_chain_tip(&self) -> Result<u64, NodeError> {
        Ok(self.blocks.keys().copied().max().unwrap_or(0))
    }

    async fn get_block_at(&self, height: u64) -> Result<RawBlock, NodeError> {
        self.blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| NodeError::Malformed {
                method: "getblock",
                detail: format!("no block at {height}"),
            })
    }

    async fn get_tx(&self, txid: &str) -> Result<RawTx, NodeError> {
        self.txs
            .get(txid)
            .cloned()
            .ok_or_else(|| NodeError::Malformed {
                method: "getrawtransaction",
                detail: format!("no tx {txid}"),
            })
    }

    async fn get_txs_batch(&self, txids: &[String]) -> Result<Vec<Option<RawTx>>, NodeError> {
        Ok(txids.iter().map(|t| self.txs.get(t).cloned()).collect())
    }
}

/// One committed address row, as `InMemoryBackend` would persist it.
#[derive(Debug, Clone)]
pub struct AddressRow {
    pub id: i64,
    pub address_key: String,
    pub pubkey_hex: String,
    pub first_seen_height: u64,
    pub last_seen_height: u64,
}

/// An in-memory `Backend` that actually commits rows (unlike the
/// write-behind buffer's own minimal test double), so end-to-end tests
/// can assert on what a real writer flush would have produced. Supports
/// fault injection on `resolve_address` the same way `store`'s own
/// `FakeBackend` does, for exercising the retry/fatal-halt path.
#[derive(Default)]
pub struct InMemoryBackend {
    addresses: Mutex<HashMap<String, AddressRow>>,
    next_id: Mutex<i64>,
    transactions: Mutex<Vec<(i64, WriteEvent)>>,
    address_blocks: Mutex<Vec<(i64, WriteEvent)>>,
    scanned_blocks: Mutex<HashMap<u64, bool>>,
    fail_remaining: Mutex<HashMap<String, u32>>,
    insert_delay: Duration,
}

impl InMemoryBackend {
    /// An `InMemoryBackend` whose insert calls sleep for `delay`,
    /// standing in for "an arbitrarily slow writer" in saturation tests.
    pub fn with_insert_delay(delay: Duration) -> Self {
        Self {
            insert_delay: delay,
            ..Self::default()
        }
    }

    /// Make `resolve_address` fail for `address_key` the next `times`
    /// calls before succeeding (or forever, if `times` is never
    /// exhausted by the caller's retry budget).
    pub fn fail_next(&self, address_key: &str, times: u32) {
        self.fail_remaining
            .lock()
            .unwrap()
            .insert(address_key.to_string(), times);
    }

    pub fn addresses(&self) -> Vec<AddressRow> {
        self.addresses.lock().unwrap().values().cloned().collect()
    }

    pub fn transactions(&self) -> Vec<(i64, WriteEvent)> {
        self.transactions.lock().unwrap().clone()
    }

    pub fn address_blocks(&self) -> Vec<(i64, WriteEvent)> {
        self.address_blocks.lock().unwrap().clone()
    }

    pub fn scanned_block(&self, height: u64) -> Option<bool> {
        self.scanned_blocks.lock().unwrap().get(&height).copied()
    }

    /// Lookup-or-insert a single address, the same four-strategy fallback
    /// `PgBackend::resolve_one` performs against Postgres, minus the
    /// savepoint dance (no transaction to poison over a `Mutex`). Exposed
    /// directly (not via `Backend`) so tests can assert on idempotent
    /// upsert behavior without driving a whole batch flush.
    pub async fn resolve_address(
        &self,
        address_key: &str,
        pubkey_hex: &str,
        height: u64,
    ) -> Result<i64, StoreError> {
        {
            let mut fails = self.fail_remaining.lock().unwrap();
            if let Some(remaining) = fails.get_mut(address_key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StoreError::UnresolvedAddressKey(address_key.to_string()));
                }
            }
        }

        let mut addresses = self.addresses.lock().unwrap();
        if let Some(row) = addresses.get_mut(address_key) {
            row.last_seen_height = row.last_seen_height.max(height);
            return Ok(row.id);
        }

        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = *next_id;
        addresses.insert(
            address_key.to_string(),
            AddressRow {
                id,
                address_key: address_key.to_string(),
                pubkey_hex: pubkey_hex.to_string(),
                first_seen_height: height,
                last_seen_height: height,
            },
        );
        Ok(id)
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    /// Resolves every address in the batch, then commits dependent rows
    /// for the ones that resolved — mirroring `PgBackend::flush_batch`'s
    /// one-commit-per-batch shape without an actual transaction, since
    /// there is no database connection here to poison.
    async fn flush_batch(&self, batch: FlushBatch) -> Result<FlushOutcome, StoreError> {
        let mut resolved: HashMap<String, i64> = HashMap::new();
        let mut failed: HashMap<String, StoreError> = HashMap::new();

        for resolution in &batch.addresses {
            match self
                .resolve_address(&resolution.address_key, &resolution.pubkey_hex, resolution.height)
                .await
            {
                Ok(id) => {
                    resolved.insert(resolution.address_key.clone(), id);
                }
                Err(e) => {
                    failed.insert(resolution.address_key.clone(), e);
                }
            }
        }

        if !self.insert_delay.is_zero() {
            tokio::time::sleep(self.insert_delay).await;
        }

        let tx_rows: Vec<(i64, WriteEvent)> = batch
            .transactions
            .into_iter()
            .filter_map(|(key, event)| resolved.get(&key).map(|&id| (id, event)))
            .collect();
        let block_rows: Vec<(i64, WriteEvent)> = batch
            .address_blocks
            .into_iter()
            .filter_map(|(key, event)| resolved.get(&key).map(|&id| (id, event)))
            .collect();

        self.transactions.lock().unwrap().extend(tx_rows);
        self.address_blocks.lock().unwrap().extend(block_rows);

        let mut scanned = self.scanned_blocks.lock().unwrap();
        for (height, had_p2pk) in batch.scanned_blocks {
            scanned
                .entry(height)
                .and_modify(|existing| *existing = *existing || had_p2pk)
                .or_insert(had_p2pk);
        }
        drop(scanned);

        Ok(FlushOutcome { failed })
    }

    async fn max_contiguous_scanned_height(&self, after: u64) -> Result<u64, StoreError> {
        let scanned = self.scanned_blocks.lock().unwrap();
        let mut contiguous = after;
        loop {
            if scanned.contains_key(&(contiguous + 1)) {
                contiguous += 1;
            } else {
                break;
            }
        }
        Ok(contiguous)
    }
}

/// Build a `{type:"pubkey", asm:"<key> OP_CHECKSIG"}` output carrying
/// `value_btc` (Bitcoin Core's native float unit, converted to satoshis
/// by `TxOut::amount_satoshi`).
pub fn p2pk_out(n: u32, pubkey_hex: &str, value_btc: f64) -> TxOut {
    TxOut {
        value: value_btc,
        n,
        script_pub_key: ScriptPubKey {
            asm: format!("{pubkey_hex} OP_CHECKSIG"),
            hex: String::new(),
            script_type: Some("pubkey".to_string()),
        },
    }
}

/// A `pubkeyhash` output, never classified as P2PK.
pub fn pubkeyhash_out(n: u32, value_btc: f64) -> TxOut {
    TxOut {
        value: value_btc,
        n,
        script_pub_key: ScriptPubKey {
            asm: "OP_DUP OP_HASH160 ... OP_EQUALVERIFY OP_CHECKSIG".to_string(),
            hex: "76a914...88ac".to_string(),
            script_type: Some("pubkeyhash".to_string()),
        },
    }
}

/// A scriptSig whose signature push falls in the 142-146 hex char range
/// the input-side heuristic treats as "plausibly P2PK".
pub fn plausible_p2pk_sig() -> ScriptSig {
    let sig = "30".to_string() + &"ab".repeat(71); // 144 hex chars
    ScriptSig {
        asm: format!("{sig} OP_CHECKSIG"),
    }
}

pub fn coinbase_input() -> TxIn {
    TxIn {
        txid: None,
        vout: None,
        coinbase: Some("00".to_string()),
        script_sig: None,
    }
}

pub fn spending_input(prev_txid: &str, prev_vout: u32) -> TxIn {
    TxIn {
        txid: Some(prev_txid.to_string()),
        vout: Some(prev_vout),
        coinbase: None,
        script_sig: Some(plausible_p2pk_sig()),
    }
}

pub fn block(height: u64, time: u64, tx: Vec<RawTx>) -> RawBlock {
    RawBlock {
        hash: format!("hash-{height}"),
        height,
        time,
        tx,
    }
}
