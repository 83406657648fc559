//! C4 — the client's transactional metadata catalog: directories, files,
//! storage nodes, vaults, vault files, and vault file blocks, backed by
//! SQLite via `rusqlite`.

#![deny(unsafe_code)]

mod catalog;
mod schema;
mod types;

pub use catalog::*;
pub use types::{LocalDirectory, LocalFile, StorageNode, Vault, VaultFile, VaultFileBlock};

/// Default catalog filename for a new installation.
pub const DEFAULT_CATALOG_FILENAME: &str = "gfs_db.sqlite3";
