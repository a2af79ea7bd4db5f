// integration-test/tests/properties.rs
//
// Property invariants 1-7, exercised against the real classifier/worker/
// store crates the way `scenarios.rs` exercises the literal S1-S6 cases.

mod common;

use async_trait::async_trait;
use classifier::{classify_script, quick_scan_block};
use common::queue_with_heights;
use integration_test::{block, coinbase_input, p2pk_out, pubkeyhash_out, FakeNodeClient, InMemoryBackend};
use node::{RawTx, ScriptPubKey};
use scan_metrics::Metrics;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use store::{Backend, ProgressStore, StoreError, WriteBehindBuffer};
use worker::{PauseFlag, Worker};

const KEY_A: &str = "02bbbb00000000000000000000000000000000000000000000000000000000";

// --- Property 1: no orphan rows ---------------------------------------

#[tokio::test]
async fn no_orphan_rows_for_every_committed_transaction_or_block_row() {
    let txid = "tx-p1";
    let raw_block = block(
        10,
        1_700_010_000,
        vec![RawTx {
            txid: txid.to_string(),
            vin: vec![coinbase_input()],
            vout: vec![p2pk_out(0, KEY_A, 1.0), pubkeyhash_out(1, 0.5)],
        }],
    );
    let node = FakeNodeClient {
        blocks: HashMap::from([(10, raw_block)]),
        txs: HashMap::new(),
    };

    let backend = Arc::new(InMemoryBackend::default());
    let (buffer, write_handle) =
        WriteBehindBuffer::new(backend.clone(), 1_000, 10, Duration::from_secs(60), 3);
    let writer = tokio::spawn(buffer.run());

    let receiver = queue_with_heights(&[10]).await;
    let metrics = Arc::new(Metrics::new());
    let w = Worker::new(
        0,
        Arc::new(node),
        receiver,
        write_handle.clone(),
        PauseFlag::new(),
        Arc::new(AtomicBool::new(false)),
        false,
        false,
        metrics,
    );
    w.run().await;
    drop(write_handle);
    writer.await.unwrap().unwrap();

    let committed_ids: std::collections::HashSet<i64> =
        backend.addresses().iter().map(|a| a.id).collect();

    for (address_id, _) in backend.transactions() {
        assert!(committed_ids.contains(&address_id), "orphan transaction row");
    }
    for (address_id, _) in backend.address_blocks() {
        assert!(committed_ids.contains(&address_id), "orphan address_block row");
    }
}

// --- Property 2: idempotent address upsert -----------------------------

#[tokio::test]
async fn applying_the_same_sighting_twice_yields_one_row_with_max_last_seen() {
    let backend = InMemoryBackend::default();
    let id_a = backend.resolve_address("addr1", KEY_A, 50).await.unwrap();
    let id_b = backend.resolve_address("addr1", KEY_A, 30).await.unwrap();

    assert_eq!(id_a, id_b);
    let rows = backend.addresses();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].last_seen_height, 50);
}

// --- Property 3: classifier round-trip ---------------------------------

#[test]
fn classifier_round_trips_valid_pubkey_outputs_and_rejects_pubkeyhash() {
    let uncompressed = "04".to_string() + &"ab".repeat(64);
    let script = ScriptPubKey {
        asm: format!("{uncompressed} OP_CHECKSIG"),
        hex: String::new(),
        script_type: Some("pubkey".to_string()),
    };
    let kind = classify_script(&script).expect("valid uncompressed key must classify");
    assert_eq!(kind.hex(), uncompressed);

    let compressed = "02".to_string() + &"cd".repeat(32);
    let script = ScriptPubKey {
        asm: format!("{compressed} OP_CHECKSIG"),
        hex: String::new(),
        script_type: Some("pubkey".to_string()),
    };
    let kind = classify_script(&script).expect("valid compressed key must classify");
    assert_eq!(kind.hex(), compressed);

    let pubkeyhash = ScriptPubKey {
        asm: "OP_DUP OP_HASH160 ... OP_EQUALVERIFY OP_CHECKSIG".to_string(),
        hex: "76a914...88ac".to_string(),
        script_type: Some("pubkeyhash".to_string()),
    };
    assert_eq!(classify_script(&pubkeyhash), None);
}

// --- Property 4: quick-scan soundness -----------------------------------

#[test]
fn quick_scan_false_implies_no_p2pk_output_in_the_block() {
    let raw_block = block(
        20,
        1_700_020_000,
        vec![RawTx {
            txid: "tx-p4".to_string(),
            vin: vec![coinbase_input()],
            vout: vec![pubkeyhash_out(0, 1.0), pubkeyhash_out(1, 2.0)],
        }],
    );

    if !quick_scan_block(&raw_block) {
        for tx in &raw_block.tx {
            for vout in &tx.vout {
                assert!(classify_script(&vout.script_pub_key).is_none());
            }
        }
    }
}

// --- Property 5: progress monotonicity ----------------------------------

#[derive(Default)]
struct InMemoryProgressStore {
    state: Mutex<Option<(u64, u64)>>,
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn load(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.state.lock().unwrap().map(|(h, _)| h))
    }

    async fn save(&self, height: u64, blocks_advanced: u64) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let total = state.map(|(_, t)| t).unwrap_or(0) + blocks_advanced;
        *state = Some((height, total));
        Ok(())
    }
}

#[tokio::test]
async fn last_scanned_height_never_decreases_across_a_scanners_lifetime() {
    let store = InMemoryProgressStore::default();
    let advances = [10u64, 25, 25, 40, 100];

    let mut previous = 0u64;
    for height in advances {
        store.save(height, height.saturating_sub(previous)).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded >= previous, "last_scanned_height must be non-decreasing");
        previous = loaded;
    }
}

// --- Property 6: no-loss under saturation -------------------------------

#[tokio::test]
async fn every_event_is_eventually_committed_under_a_saturated_queue_and_slow_writer() {
    let keys: Vec<String> = (0..8).map(|i| format!("03{:062x}", i + 1)).collect();
    let vout: Vec<_> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| p2pk_out(i as u32, key, 0.01))
        .collect();
    let raw_block = block(
        30,
        1_700_030_000,
        vec![RawTx {
            txid: "tx-p6".to_string(),
            vin: vec![coinbase_input()],
            vout,
        }],
    );
    let node = FakeNodeClient {
        blocks: HashMap::from([(30, raw_block)]),
        txs: HashMap::new(),
    };

    let backend = Arc::new(InMemoryBackend::with_insert_delay(Duration::from_millis(10)));
    let (buffer, write_handle) =
        WriteBehindBuffer::new(backend.clone(), 1, 1, Duration::from_millis(5), 3);
    let writer = tokio::spawn(buffer.run());

    let receiver = queue_with_heights(&[30]).await;
    let metrics = Arc::new(Metrics::new());
    let w = Worker::new(
        0,
        Arc::new(node),
        receiver,
        write_handle.clone(),
        PauseFlag::new(),
        Arc::new(AtomicBool::new(false)),
        false,
        false,
        metrics,
    );
    w.run().await;
    drop(write_handle);
    writer.await.unwrap().unwrap();

    assert_eq!(backend.addresses().len(), keys.len());
    assert_eq!(backend.transactions().len(), keys.len());
}

// --- Property 7: pause convergence --------------------------------------

#[tokio::test]
async fn pause_flag_clears_within_bounded_time_once_the_writer_drains() {
    use pipeline::{PauseControlHandle, PauseController};

    let backend = Arc::new(InMemoryBackend::default());
    let (buffer, write_handle) =
        WriteBehindBuffer::new(backend.clone(), 1_000, 5, Duration::from_millis(20), 3);
    let writer = tokio::spawn(buffer.run());

    for i in 0..20u64 {
        write_handle
            .send(store::WriteEvent::BlockScanned {
                height: i,
                had_p2pk: false,
            })
            .await
            .unwrap();
    }

    let flag = PauseFlag::new();
    flag.set(true);
    let control = PauseControlHandle::new(flag.clone());
    let metrics = Arc::new(Metrics::new());
    let stop = Arc::new(AtomicBool::new(false));

    let controller = PauseController::new(
        control.clone(),
        write_handle.clone(),
        metrics,
        true,
        15,
        2,
        stop.clone(),
    );
    let controller_handle = tokio::spawn(controller.run());

    drop(write_handle);
    writer.await.unwrap().unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while flag.is_paused() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!flag.is_paused(), "pause flag must clear once the writer drains");

    stop.store(true, Ordering::Relaxed);
    tokio::time::timeout(Duration::from_secs(2), controller_handle)
        .await
        .unwrap()
        .unwrap();
}
