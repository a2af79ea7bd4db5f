// integration-test/tests/scenarios.rs
//
// End-to-end scenarios S1-S6: a real `Worker` reading from a fake node,
// writing through a real `WriteBehindBuffer` into an in-memory `Backend`.

mod common;

use common::queue_with_heights;
use integration_test::{block, coinbase_input, p2pk_out, pubkeyhash_out, spending_input,
    FakeNodeClient, InMemoryBackend};
use node::RawTx;
use scan_metrics::Metrics;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use store::{WriteBehindBuffer, WriteEvent};
use worker::{PauseFlag, Worker};

const PUBKEY: &str = "04aaaa00000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000";

fn address_key(pubkey_hex: &str) -> String {
    store::address_key_from_pubkey(pubkey_hex)
}

async fn run_worker_over(
    node: FakeNodeClient,
    heights: &[u64],
    backend: Arc<InMemoryBackend>,
    quick_scan: bool,
) -> Arc<Metrics> {
    let (buffer, write_handle) =
        WriteBehindBuffer::new(backend.clone(), 1_000, 10, Duration::from_secs(60), 3);
    let writer = tokio::spawn(buffer.run());

    let receiver = queue_with_heights(heights).await;
    let metrics = Arc::new(Metrics::new());
    let w = Worker::new(
        0,
        Arc::new(node),
        receiver,
        write_handle.clone(),
        PauseFlag::new(),
        Arc::new(AtomicBool::new(false)),
        quick_scan,
        false,
        metrics.clone(),
    );
    w.run().await;
    drop(write_handle);
    writer.await.unwrap().unwrap();
    metrics
}

#[tokio::test]
async fn s1_single_p2pk_output_produces_one_address_one_transaction_one_block_row() {
    let txid = "tx-s1";
    let raw_block = block(
        100,
        1_700_000_000,
        vec![RawTx {
            txid: txid.to_string(),
            vin: vec![coinbase_input()],
            vout: vec![p2pk_out(0, PUBKEY, 1.0)],
        }],
    );
    let node = FakeNodeClient {
        blocks: HashMap::from([(100, raw_block)]),
        txs: HashMap::new(),
    };

    let backend = Arc::new(InMemoryBackend::default());
    run_worker_over(node, &[100], backend.clone(), false).await;

    let addresses = backend.addresses();
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].address_key, address_key(PUBKEY));

    let transactions = backend.transactions();
    assert_eq!(transactions.len(), 1);
    match &transactions[0].1 {
        WriteEvent::Transaction {
            is_input,
            amount_satoshi,
            txid: got_txid,
            ..
        } => {
            assert!(!is_input);
            assert_eq!(*amount_satoshi, 100_000_000);
            assert_eq!(got_txid, txid);
        }
        other => panic!("expected Transaction event, got {other:?}"),
    }

    assert_eq!(backend.address_blocks().len(), 1);
    assert_eq!(backend.scanned_block(100), Some(true));
}

#[tokio::test]
async fn s2_spending_the_output_advances_last_seen_without_a_new_address() {
    let prev_txid = "tx-s1";
    let spend_txid = "tx-s2";
    let prev_tx = RawTx {
        txid: prev_txid.to_string(),
        vin: vec![coinbase_input()],
        vout: vec![p2pk_out(0, PUBKEY, 1.0)],
    };
    let spend_block = block(
        200,
        1_700_000_600,
        vec![RawTx {
            txid: spend_txid.to_string(),
            vin: vec![spending_input(prev_txid, 0)],
            vout: vec![pubkeyhash_out(0, 0.999)],
        }],
    );

    let node = FakeNodeClient {
        blocks: HashMap::from([(200, spend_block)]),
        txs: HashMap::from([(prev_txid.to_string(), prev_tx)]),
    };

    let backend = Arc::new(InMemoryBackend::default());
    run_worker_over(node, &[200], backend.clone(), false).await;

    let addresses = backend.addresses();
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].last_seen_height, 200);

    let transactions = backend.transactions();
    assert_eq!(transactions.len(), 1);
    match &transactions[0].1 {
        WriteEvent::Transaction {
            is_input,
            amount_satoshi,
            ..
        } => {
            assert!(is_input);
            assert_eq!(*amount_satoshi, 100_000_000);
        }
        other => panic!("expected Transaction event, got {other:?}"),
    }
    assert_eq!(backend.address_blocks().len(), 1);
}

#[tokio::test]
async fn s3_duplicate_outputs_in_one_tx_dedup_to_one_transaction_row() {
    let txid = "tx-s3";
    let raw_block = block(
        300,
        1_700_001_000,
        vec![RawTx {
            txid: txid.to_string(),
            vin: vec![coinbase_input()],
            vout: vec![p2pk_out(0, PUBKEY, 1.0), p2pk_out(1, PUBKEY, 1.0)],
        }],
    );
    let node = FakeNodeClient {
        blocks: HashMap::from([(300, raw_block)]),
        txs: HashMap::new(),
    };

    let backend = Arc::new(InMemoryBackend::default());
    run_worker_over(node, &[300], backend.clone(), false).await;

    assert_eq!(backend.addresses().len(), 1);
    assert_eq!(backend.transactions().len(), 1);
    assert_eq!(backend.address_blocks().len(), 1);
}

#[tokio::test]
async fn s4_pubkeyhash_only_block_writes_no_rows_but_advances_progress() {
    let raw_block = block(
        400,
        1_700_001_500,
        vec![RawTx {
            txid: "tx-s4".to_string(),
            vin: vec![coinbase_input()],
            vout: vec![pubkeyhash_out(0, 1.0)],
        }],
    );
    let node = FakeNodeClient {
        blocks: HashMap::from([(400, raw_block)]),
        txs: HashMap::new(),
    };

    let backend = Arc::new(InMemoryBackend::default());
    run_worker_over(node, &[400], backend.clone(), true).await;

    assert!(backend.addresses().is_empty());
    assert!(backend.transactions().is_empty());
    assert!(backend.address_blocks().is_empty());
    assert_eq!(backend.scanned_block(400), Some(false));

    use store::Backend as _;
    assert_eq!(backend.max_contiguous_scanned_height(399).await.unwrap(), 400);
}

#[tokio::test]
async fn s5_saturated_queue_loses_no_events_once_the_writer_drains() {
    let txid = "tx-s5";
    let keys: Vec<String> = (0..5).map(|i| format!("02{:064x}", i + 1)).collect();
    let vout: Vec<_> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| p2pk_out(i as u32, key, 0.1))
        .collect();
    let raw_block = block(
        500,
        1_700_002_000,
        vec![RawTx {
            txid: txid.to_string(),
            vin: vec![coinbase_input()],
            vout,
        }],
    );
    let node = FakeNodeClient {
        blocks: HashMap::from([(500, raw_block)]),
        txs: HashMap::new(),
    };

    let backend = Arc::new(InMemoryBackend::with_insert_delay(Duration::from_millis(5)));
    let (buffer, write_handle) =
        WriteBehindBuffer::new(backend.clone(), 1, 1, Duration::from_millis(5), 3);
    let writer = tokio::spawn(buffer.run());

    let receiver = queue_with_heights(&[500]).await;
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
        metrics.clone(),
    );
    w.run().await;
    drop(write_handle);
    writer.await.unwrap().unwrap();

    assert_eq!(backend.addresses().len(), keys.len());
    assert_eq!(backend.transactions().len(), keys.len());
    assert_eq!(backend.address_blocks().len(), keys.len());
    assert_eq!(backend.scanned_block(500), Some(true));
}

#[tokio::test]
async fn s6_exhausted_address_resolution_halts_with_no_dependent_rows_committed() {
    let txid = "tx-s6";
    let raw_block = block(
        600,
        1_700_002_500,
        vec![RawTx {
            txid: txid.to_string(),
            vin: vec![coinbase_input()],
            vout: vec![p2pk_out(0, PUBKEY, 1.0)],
        }],
    );
    let node = FakeNodeClient {
        blocks: HashMap::from([(600, raw_block)]),
        txs: HashMap::new(),
    };

    let backend = Arc::new(InMemoryBackend::default());
    backend.fail_next(&address_key(PUBKEY), 10); // exceeds max_retries below
    let (buffer, write_handle) =
        WriteBehindBuffer::new(backend.clone(), 1_000, 10, Duration::from_millis(5), 2);
    let writer = tokio::spawn(buffer.run());

    let receiver = queue_with_heights(&[600]).await;
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
        metrics.clone(),
    );
    w.run().await;
    drop(write_handle);

    let err = writer.await.unwrap().unwrap_err();
    match err {
        store::StoreError::AddressResolutionExhausted {
            address_key: key, ..
        } => {
            assert_eq!(key, address_key(PUBKEY));
        }
        other => panic!("expected AddressResolutionExhausted, got {other:?}"),
    }

    assert!(backend.transactions().is_empty());
    assert!(backend.address_blocks().is_empty());
}
