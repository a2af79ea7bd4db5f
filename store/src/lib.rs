// store/src/lib.rs
//
// Postgres-backed storage for the scanner: the data model, the
// write-behind buffer that batches events into it, and the crash-consistent
// progress record the supervisor resumes from.

mod backend;
mod backend_pg;
mod error;
mod models;
mod progress;
mod schema;
mod write_behind;

pub use backend::{AddressResolution, Backend, FlushBatch, FlushOutcome};
pub use backend_pg::PgBackend;
pub use error::StoreError;
pub use models::{
    address_key_from_pubkey, P2pkAddress, P2pkAddressBlock, P2pkTransaction, ScanProgress,
    ScannedBlock, WriteEvent,
};
pub use progress::{PgProgressStore, ProgressStore};
pub use write_behind::{WriteBehindBuffer, WriteQueueHandle};
