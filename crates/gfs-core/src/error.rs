//! Shared error taxonomy for the GFS client/server split.

use thiserror::Error;

/// All failure kinds surfaced by the core pipeline, the catalog, the node
/// client, and the server-side block store.
#[derive(Debug, Error)]
pub enum Error {
    /// Encryption was requested without a 32-byte key.
    #[error("bad key: encryption key must be exactly 32 bytes, got {0}")]
    BadKey(usize),

    /// Malformed base64 or an AES input length that is not a multiple of 16.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// A fingerprint, echoed id, or stored size disagreed with what was expected.
    #[error("integrity mismatch for {key}: {detail}")]
    IntegrityMismatch {
        /// The file path, unique id, or node name this failure concerns.
        key: String,
        /// Human-readable detail.
        detail: String,
    },

    /// A unique-key invariant was violated on insert.
    #[error("catalog conflict: {0}")]
    CatalogConflict(String),

    /// Fewer `VaultFileBlock` rows were present than `block_count` requires.
    #[error("catalog incomplete: expected {expected} blocks, found {found} for {key}")]
    CatalogIncomplete {
        /// The vault file this concerns.
        key: String,
        /// Expected block count.
        expected: i64,
        /// Blocks actually present.
        found: i64,
    },

    /// An entity lookup by id or key failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// The underlying transport failed to deliver or parse a message.
    #[error("transport error talking to {node}: {detail}")]
    TransportError {
        /// Node name.
        node: String,
        /// Detail.
        detail: String,
    },

    /// The named node is not active or could not be reached at all.
    #[error("node unavailable: {0}")]
    NodeUnavailable(String),

    /// A `send()` did not complete within the transport's bound.
    #[error("timeout talking to {0}")]
    Timeout(String),

    /// A filesystem read/write/stat/open failed.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// Extended attributes are unavailable on the server's filesystem.
    #[error("extended attributes unsupported: {0}")]
    XAttrUnsupported(String),

    /// The catalog's underlying SQLite engine reported an error.
    #[error("catalog storage error: {0}")]
    Storage(String),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
