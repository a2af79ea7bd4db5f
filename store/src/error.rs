// store/src/error.rs

use thiserror::Error;

/// Errors surfaced by the store layer. `AddressResolutionExhausted` is
/// the only data-integrity-related fatal condition in the core: it
/// propagates out of the writer to the supervisor and halts the
/// pipeline rather than risk an orphaned row.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(
        "address resolution for key {address_key} failed {attempts} times; halting to avoid an orphaned row"
    )]
    AddressResolutionExhausted {
        address_key: String,
        attempts: u32,
    },

    #[error("event references unresolved address key {0}")]
    UnresolvedAddressKey(String),
}
