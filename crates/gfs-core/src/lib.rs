//! GFS core primitives shared by the catalog, node client, replicator,
//! restorer, and block store: content fingerprinting (C1), the block codec
//! (C2), the chunker (C3), permission conversions, and the error taxonomy.

#![deny(unsafe_code)]

pub mod chunker;
pub mod codec;
pub mod error;
pub mod fingerprint;
pub mod perms;
pub mod time;

pub use chunker::{block_count, Chunker, BLOCK_SIZE};
pub use codec::{decode_block, encode_block, EncodedBlock};
pub use error::{Error, Result};
pub use fingerprint::{fingerprint_bytes, fingerprint_reader};
pub use perms::{PermTriple, Permissions};
