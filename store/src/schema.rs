// store/src/schema.rs
//
// DDL for the four tables of the data model plus the `ScannedBlock`
// marker (§3.1). Applied once at writer startup via `PgBackend::ensure_schema`.
// This is not a migration tool — there is no versioning or rollback, only
// `CREATE TABLE IF NOT EXISTS`.

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS p2pk_addresses (
    id                BIGSERIAL PRIMARY KEY,
    address_key       VARCHAR(34) NOT NULL UNIQUE,
    pubkey_hex        TEXT NOT NULL,
    first_seen_height BIGINT NOT NULL,
    last_seen_height  BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS p2pk_transactions (
    id              BIGSERIAL PRIMARY KEY,
    address_id      BIGINT NOT NULL REFERENCES p2pk_addresses(id),
    txid            TEXT NOT NULL,
    height          BIGINT NOT NULL,
    block_time      BIGINT NOT NULL,
    is_input        BOOLEAN NOT NULL,
    vio_index       INTEGER NOT NULL,
    amount_satoshi  BIGINT NOT NULL,
    UNIQUE (txid, address_id, is_input)
);

CREATE TABLE IF NOT EXISTS p2pk_address_blocks (
    id              BIGSERIAL PRIMARY KEY,
    address_id      BIGINT NOT NULL REFERENCES p2pk_addresses(id),
    height          BIGINT NOT NULL,
    is_input        BOOLEAN NOT NULL,
    amount_satoshi  BIGINT NOT NULL,
    txid            TEXT NOT NULL,
    UNIQUE (address_id, height, is_input, txid)
);

CREATE TABLE IF NOT EXISTS scan_progress (
    id                  BIGSERIAL PRIMARY KEY,
    scanner_id          TEXT NOT NULL UNIQUE,
    last_scanned_height BIGINT NOT NULL,
    total_scanned       BIGINT NOT NULL DEFAULT 0,
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS scanned_blocks (
    height     BIGINT PRIMARY KEY,
    had_p2pk   BOOLEAN NOT NULL,
    scanned_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;
