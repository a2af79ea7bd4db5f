// store/src/backend_pg.rs

use crate::backend::{AddressResolution, Backend, FlushBatch, FlushOutcome};
use crate::error::StoreError;
use crate::models::WriteEvent;
use crate::schema::CREATE_TABLES;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;

/// Upper bound on how many rows `max_contiguous_scanned_height` inspects
/// per call. A gap beyond this window is simply not seen yet — progress
/// advances more slowly, never incorrectly.
const MAX_CONTIGUITY_SCAN: i64 = 100_000;

/// A `Backend` implementation against a real Postgres database. Holds a
/// single-connection pool, per §5's "one writer → one connection" policy.
/// Cheap to clone: `PgPool` is itself an `Arc` around the connection pool.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Create the tables this backend depends on if they do not already
    /// exist. Not a migration tool: no versioning, no rollback.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLES).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Resolve one address within `tx`, wrapping the speculative insert
    /// (strategy 3) in a savepoint so a unique-violation — another flush,
    /// or another scanner, winning the race — rolls back only that
    /// statement instead of poisoning the whole batch transaction.
    async fn resolve_one(
        tx: &mut Transaction<'_, Postgres>,
        address_key: &str,
        pubkey_hex: &str,
        height: u64,
    ) -> Result<i64, StoreError> {
        let height = height as i64;

        // Strategy 1: plain lookup.
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM p2pk_addresses WHERE address_key = $1")
                .bind(address_key)
                .fetch_optional(&mut **tx)
                .await?;

        if let Some(id) = existing {
            // Strategy 2: bump last_seen_height without clobbering a
            // higher value written by a concurrent flush.
            sqlx::query(
                "UPDATE p2pk_addresses SET last_seen_height = GREATEST(last_seen_height, $2) WHERE id = $1",
            )
            .bind(id)
            .bind(height)
            .execute(&mut **tx)
            .await?;
            return Ok(id);
        }

        sqlx::query("SAVEPOINT resolve_addr").execute(&mut **tx).await?;

        // Strategy 3: plain insert.
        let inserted: Result<i64, sqlx::Error> = sqlx::query_scalar(
            "INSERT INTO p2pk_addresses (address_key, pubkey_hex, first_seen_height, last_seen_height)
             VALUES ($1, $2, $3, $3) RETURNING id",
        )
        .bind(address_key)
        .bind(pubkey_hex)
        .bind(height)
        .fetch_one(&mut **tx)
        .await;

        if let Ok(id) = inserted {
            sqlx::query("RELEASE SAVEPOINT resolve_addr").execute(&mut **tx).await?;
            return Ok(id);
        }

        // Strategy 3 hit a unique-violation (or any other error) and left
        // the transaction aborted; roll back to the savepoint so strategy
        // 4 can run.
        sqlx::query("ROLLBACK TO SAVEPOINT resolve_addr").execute(&mut **tx).await?;

        // Strategy 4: conflict-aware upsert — another flush (or a
        // duplicate within this one) won the race.
        let upserted: Result<i64, sqlx::Error> = sqlx::query_scalar(
            "INSERT INTO p2pk_addresses (address_key, pubkey_hex, first_seen_height, last_seen_height)
             VALUES ($1, $2, $3, $3)
             ON CONFLICT (address_key) DO UPDATE
                 SET last_seen_height = GREATEST(p2pk_addresses.last_seen_height, EXCLUDED.last_seen_height)
             RETURNING id",
        )
        .bind(address_key)
        .bind(pubkey_hex)
        .bind(height)
        .fetch_one(&mut **tx)
        .await;

        if let Ok(id) = upserted {
            sqlx::query("RELEASE SAVEPOINT resolve_addr").execute(&mut **tx).await?;
            return Ok(id);
        }

        sqlx::query("ROLLBACK TO SAVEPOINT resolve_addr").execute(&mut **tx).await?;

        // Strategy 5: final lookup. If this also comes up empty the
        // caller treats the round as failed.
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM p2pk_addresses WHERE address_key = $1")
                .bind(address_key)
                .fetch_optional(&mut **tx)
                .await?;

        sqlx::query("RELEASE SAVEPOINT resolve_addr").execute(&mut **tx).await?;

        found.ok_or_else(|| StoreError::UnresolvedAddressKey(address_key.to_string()))
    }

    async fn insert_transactions(
        tx: &mut Transaction<'_, Postgres>,
        rows: &[(i64, WriteEvent)],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::new(
            "INSERT INTO p2pk_transactions (address_id, txid, height, block_time, is_input, vio_index, amount_satoshi) ",
        );
        qb.push_values(rows, |mut b, (address_id, event)| {
            if let WriteEvent::Transaction {
                txid,
                height,
                block_time,
                is_input,
                index,
                amount_satoshi,
                ..
            } = event
            {
                b.push_bind(address_id)
                    .push_bind(txid)
                    .push_bind(*height as i64)
                    .push_bind(*block_time as i64)
                    .push_bind(*is_input)
                    .push_bind(*index as i32)
                    .push_bind(*amount_satoshi as i64);
            }
        });
        qb.push(" ON CONFLICT (txid, address_id, is_input) DO NOTHING");
        qb.build().execute(&mut **tx).await?;
        Ok(())
    }

    async fn insert_address_blocks(
        tx: &mut Transaction<'_, Postgres>,
        rows: &[(i64, WriteEvent)],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::new(
            "INSERT INTO p2pk_address_blocks (address_id, height, is_input, amount_satoshi, txid) ",
        );
        qb.push_values(rows, |mut b, (address_id, event)| {
            if let WriteEvent::AddressBlock {
                height,
                is_input,
                amount_satoshi,
                txid,
                ..
            } = event
            {
                b.push_bind(address_id)
                    .push_bind(*height as i64)
                    .push_bind(*is_input)
                    .push_bind(*amount_satoshi as i64)
                    .push_bind(txid);
            }
        });
        qb.push(" ON CONFLICT (address_id, height, is_input, txid) DO NOTHING");
        qb.build().execute(&mut **tx).await?;
        Ok(())
    }

    async fn insert_scanned_blocks(
        tx: &mut Transaction<'_, Postgres>,
        rows: &[(u64, bool)],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::new("INSERT INTO scanned_blocks (height, had_p2pk) ");
        qb.push_values(rows, |mut b, (height, had_p2pk)| {
            b.push_bind(*height as i64).push_bind(*had_p2pk);
        });
        qb.push(
            " ON CONFLICT (height) DO UPDATE SET had_p2pk = scanned_blocks.had_p2pk OR EXCLUDED.had_p2pk",
        );
        qb.build().execute(&mut **tx).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for PgBackend {
    /// Runs address resolution and every dependent insert for one flush
    /// inside a single transaction, committing once. An address that
    /// fails to resolve (strategies 3-5 of `resolve_one` all come up
    /// empty) is reported via `FlushOutcome::failed`; its dependent rows
    /// are simply omitted from this commit rather than aborting it.
    async fn flush_batch(&self, batch: FlushBatch) -> Result<FlushOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut resolved: HashMap<String, i64> = HashMap::new();
        let mut failed: HashMap<String, StoreError> = HashMap::new();

        for AddressResolution {
            address_key,
            pubkey_hex,
            height,
        } in &batch.addresses
        {
            match Self::resolve_one(&mut tx, address_key, pubkey_hex, *height).await {
                Ok(id) => {
                    resolved.insert(address_key.clone(), id);
                }
                Err(e) => {
                    failed.insert(address_key.clone(), e);
                }
            }
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

        Self::insert_transactions(&mut tx, &tx_rows).await?;
        Self::insert_address_blocks(&mut tx, &block_rows).await?;
        Self::insert_scanned_blocks(&mut tx, &batch.scanned_blocks).await?;

        tx.commit().await?;
        Ok(FlushOutcome { failed })
    }

    async fn max_contiguous_scanned_height(&self, after: u64) -> Result<u64, StoreError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT height FROM scanned_blocks WHERE height > $1 ORDER BY height ASC LIMIT $2",
        )
        .bind(after as i64)
        .bind(MAX_CONTIGUITY_SCAN)
        .fetch_all(&self.pool)
        .await?;

        let mut contiguous = after;
        for (height,) in rows {
            let height = height as u64;
            if height == contiguous + 1 {
                contiguous = height;
            } else {
                break;
            }
        }
        Ok(contiguous)
    }
}
