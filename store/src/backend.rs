// store/src/backend.rs
//
// The storage primitives the write-behind buffer's retry/deferral state
// machine is built on top of, kept separate from that state machine so a
// real Postgres backend and an in-memory test backend can share it
// (`metashrew-sync`'s `DataStore` trait in the wider retrieval pack is the
// precedent for this split: a thin async trait over storage, with the
// interesting control flow living above it).

use crate::error::StoreError;
use crate::models::WriteEvent;
use async_trait::async_trait;
use std::collections::HashMap;

/// An address that needs resolving (lookup-or-insert, §4.5's four-strategy
/// dance) as part of a batch flush.
pub struct AddressResolution {
    pub address_key: String,
    pub pubkey_hex: String,
    pub height: u64,
}

/// Everything one write-behind flush has to commit, handed to the backend
/// whole so it can run address resolution and the dependent inserts inside
/// a single transaction rather than as separate auto-commit statements.
/// `transactions`/`address_blocks` are keyed by `address_key` rather than
/// address id, since the id is only known once the backend resolves it.
#[derive(Default)]
pub struct FlushBatch {
    pub addresses: Vec<AddressResolution>,
    pub transactions: Vec<(String, WriteEvent)>,
    pub address_blocks: Vec<(String, WriteEvent)>,
    pub scanned_blocks: Vec<(u64, bool)>,
}

/// The result of a batch flush: which addresses failed to resolve this
/// round (a race or a transient error), keyed by `address_key`. An address
/// missing from `failed` resolved and its dependent rows were committed; one
/// present in `failed` had its dependent rows skipped for this round — the
/// caller owns the retry-count/fatal-halt policy from there.
#[derive(Default)]
pub struct FlushOutcome {
    pub failed: HashMap<String, StoreError>,
}

/// Storage operations the write-behind buffer needs. `flush_batch` commits
/// a whole batch — address resolution and the transaction/block/scanned-block
/// rows that depend on it — as one unit, so a partial failure never leaves
/// dependent rows pointing at an address that didn't make it in, and never
/// leaves some dependent tables committed while others aren't.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn flush_batch(&self, batch: FlushBatch) -> Result<FlushOutcome, StoreError>;

    /// The highest height `h` such that every height in `(after, h]` has a
    /// committed `scanned_blocks` row — the contiguous high-water mark the
    /// supervisor is allowed to advance `ScanProgress` to. Default
    /// implementation never advances; only a backend with a real
    /// `scanned_blocks` table can answer this.
    async fn max_contiguous_scanned_height(&self, after: u64) -> Result<u64, StoreError> {
        Ok(after)
    }
}

/// Lets callers hold a shared reference to a backend (e.g. to assert on
/// its committed rows after `WriteBehindBuffer::run` has consumed its own
/// copy) while still satisfying `WriteBehindBuffer<B: Backend>`'s by-value
/// bound.
#[async_trait]
impl<B: Backend + ?Sized> Backend for std::sync::Arc<B> {
    async fn flush_batch(&self, batch: FlushBatch) -> Result<FlushOutcome, StoreError> {
        (**self).flush_batch(batch).await
    }

    async fn max_contiguous_scanned_height(&self, after: u64) -> Result<u64, StoreError> {
        (**self).max_contiguous_scanned_height(after).await
    }
}
