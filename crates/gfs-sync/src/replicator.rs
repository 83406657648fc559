//! C8 — drive one file's blocks across every active node, persisting
//! placement receipts as `VaultFileBlock` rows.

use std::path::Path;

use gfs_catalog::{get_vault_file_block, insert_vault_file_block, update_vault_file_block, Catalog, VaultFileBlock};
use gfs_core::chunker::Chunker;
use gfs_core::codec::encode_block;
use gfs_core::error::{Error, Result};
use gfs_core::time::now_ms;
use gfs_node_client::NodeClient;
use gfs_wire::{headers, Message};

use crate::scanner::{NodeContext, NodeFlag};

/// Drives one file's blocks across the nodes a [`crate::Scanner`] decided
/// need work.
pub struct Replicator {
    client: NodeClient,
    key: Option<Vec<u8>>,
}

impl Replicator {
    /// Build a replicator over `client`, using `key` when a directory's
    /// `encrypt` flag is set.
    pub fn new(client: NodeClient, key: Option<Vec<u8>>) -> Self {
        Self { client, key }
    }

    /// Send every block of `abs_path` to every node whose flag is not
    /// [`NodeFlag::None`], inserting one `VaultFileBlock` row per
    /// successful `(block, node)` placement. Returns the number of
    /// successful placements across all blocks and nodes.
    ///
    /// A per-node `fileAdd` failure is logged and does not affect the
    /// other nodes for that block; a fatal encoding or catalog error
    /// aborts the whole file.
    pub fn replicate_file(
        &self,
        catalog: &mut Catalog,
        abs_path: &Path,
        block_count: u64,
        encrypt: bool,
        node_contexts: &[NodeContext],
    ) -> Result<u64> {
        if block_count == 0 {
            return Ok(0);
        }

        let mut chunker = Chunker::open(abs_path)?;
        let mut successes = 0u64;

        while let Some((seq, plaintext)) = chunker.next_block()? {
            let encoded = encode_block(&plaintext, encrypt, self.key.as_deref())?;
            let now = now_ms();

            for ctx in node_contexts {
                if ctx.flag == NodeFlag::None {
                    continue;
                }
                // SELECTIVE sends unconditionally in the current design; the
                // already-has-this-block short-circuit is a documented
                // future optimization (spec §9).
                let request = Message::new("fileAdd")
                    .with_header(headers::FILE, encoded.unique_id.clone())
                    .with_header(headers::UNIQUE_ID, encoded.unique_id.clone())
                    .with_header(headers::STORED_FS, encoded.wire_form.len().to_string())
                    .with_payload(encoded.wire_form.clone().into_bytes());

                let response = match self.client.send(&ctx.node.node_name, &request) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(node = %ctx.node.node_name, seq, error = %e, "fileAdd send failed");
                        continue;
                    }
                };
                if !response.rc_ok() {
                    tracing::warn!(
                        node = %ctx.node.node_name, seq,
                        error = response.header(headers::ERROR).unwrap_or("unknown"),
                        "fileAdd rejected by node"
                    );
                    continue;
                }
                let echoed = response.header(headers::UNIQUE_ID).unwrap_or("");
                if echoed != encoded.unique_id {
                    return Err(Error::IntegrityMismatch {
                        key: encoded.unique_id.clone(),
                        detail: format!("node {} echoed {echoed}", ctx.node.node_name),
                    });
                }
                let node_directory = response.header(headers::DIR).unwrap_or("").to_string();
                let node_file = response.header(headers::FILE).unwrap_or(&encoded.unique_id).to_string();

                let previous = get_vault_file_block(catalog.connection(), ctx.vault_file.id, seq as i64)?;
                let mut block = VaultFileBlock {
                    id: previous.as_ref().map(|p| p.id).unwrap_or(0),
                    vault_file_id: ctx.vault_file.id,
                    create_time: previous.as_ref().map(|p| p.create_time).unwrap_or(now),
                    modify_time: now,
                    stored_time: now,
                    origin_filesize: encoded.origin_block_size as i64,
                    stored_filesize: encoded.wire_form.len() as i64,
                    block_sequence_number: seq as i64,
                    pad_char_count: encoded.pad_char_count as i64,
                    unique_identifier: encoded.unique_id.clone(),
                    node_directory,
                    node_file,
                };
                if previous.is_some() {
                    update_vault_file_block(catalog.connection(), &block)?;
                } else {
                    insert_vault_file_block(catalog.connection(), &mut block)?;
                }
                successes += 1;

                if let Some(old) = previous {
                    if old.unique_identifier != block.unique_identifier {
                        let delete_req = Message::new("fileDelete")
                            .with_header(headers::DIR, old.node_directory.clone())
                            .with_header(headers::FILE, old.node_file.clone());
                        if let Err(e) = self.client.send(&ctx.node.node_name, &delete_req) {
                            tracing::warn!(
                                node = %ctx.node.node_name, unique_id = %old.unique_identifier,
                                error = %e, "failed to release superseded block"
                            );
                        }
                    }
                }
            }
        }

        Ok(successes)
    }
}
