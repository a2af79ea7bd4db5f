// store/src/progress.rs

use crate::error::StoreError;
use async_trait::async_trait;
use sqlx::PgPool;

/// The scanner's crash-consistent progress record: a single row per
/// `scanner_id`, advanced only after the writer commits a flush, never by
/// workers or the distributor directly.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// The last contiguously-scanned height, or `None` if this scanner has
    /// never recorded progress.
    async fn load(&self) -> Result<Option<u64>, StoreError>;

    /// Persist `height` as the new high-water mark, crediting
    /// `total_scanned` with `blocks_advanced` additional blocks.
    async fn save(&self, height: u64, blocks_advanced: u64) -> Result<(), StoreError>;
}

/// A `ProgressStore` backed by the `scan_progress` table, keyed by
/// `scanner_id` so multiple scanners can share one database. Cheap to
/// clone: `PgPool` is itself an `Arc` around the connection pool.
#[derive(Clone)]
pub struct PgProgressStore {
    pool: PgPool,
    scanner_id: String,
}

impl PgProgressStore {
    pub fn new(pool: PgPool, scanner_id: String) -> Self {
        Self { pool, scanner_id }
    }
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn load(&self) -> Result<Option<u64>, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT last_scanned_height FROM scan_progress WHERE scanner_id = $1",
        )
        .bind(&self.scanner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(h,)| h as u64))
    }

    async fn save(&self, height: u64, blocks_advanced: u64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO scan_progress (scanner_id, last_scanned_height, total_scanned, updated_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (scanner_id) DO UPDATE
                 SET last_scanned_height = $2,
                     total_scanned = scan_progress.total_scanned + $3,
                     updated_at = now()",
        )
        .bind(&self.scanner_id)
        .bind(height as i64)
        .bind(blocks_advanced as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
