//! C9 — rebuild a local tree from the catalog and a node's content,
//! verifying integrity of every block read back.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use gfs_catalog::{
    get_blocks_for_vault_file, get_local_files_for_directory, get_vault, get_vault_file, Catalog,
    LocalDirectory, LocalFile, StorageNode, Vault, VaultFileBlock,
};
use gfs_core::chunker::BLOCK_SIZE;
use gfs_core::codec::decode_block;
use gfs_core::error::{Error, Result};
use gfs_core::fingerprint::fingerprint_bytes;
use gfs_core::perms::{PermTriple, Permissions};
use gfs_node_client::NodeClient;
use gfs_wire::{headers, Message};

/// Tally of one restore run, for logging and CLI exit codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreSummary {
    pub files_restored: u64,
    pub files_failed: u64,
}

/// Rebuilds a [`LocalDirectory`]'s files under a target directory by
/// pulling blocks back from one node.
pub struct Restorer {
    client: NodeClient,
    key: Option<Vec<u8>>,
}

impl Restorer {
    /// Build a restorer over `client`, using `key` to decrypt blocks whose
    /// vault has `encrypt` set.
    pub fn new(client: NodeClient, key: Option<Vec<u8>>) -> Self {
        Self { client, key }
    }

    /// Restore every `LocalFile` of `source_directory` from `node_name`
    /// into `target_directory`. A block-level integrity failure aborts
    /// only that file; the run continues with the rest.
    pub fn restore(
        &self,
        catalog: &Catalog,
        node_name: &str,
        node: &StorageNode,
        source_directory: &LocalDirectory,
        target_directory: &Path,
    ) -> Result<RestoreSummary> {
        let vault = get_vault(catalog.connection(), node.id, source_directory.id)?.ok_or_else(|| {
            Error::NotFound(format!("vault for node {node_name} over {}", source_directory.path))
        })?;
        let files = get_local_files_for_directory(catalog.connection(), source_directory.id)?;

        let mut summary = RestoreSummary::default();
        for local_file in &files {
            match self.restore_file(catalog, node_name, &vault, local_file, target_directory) {
                Ok(()) => summary.files_restored += 1,
                Err(e) => {
                    tracing::warn!(file = %local_file.relative_path, error = %e, "restore failed, continuing with next file");
                    summary.files_failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Restore just `target_directory/<relative_path_of(local_file)>`,
    /// honoring a pre-selected single file within the directory (used by
    /// `restore-file`/`restore-subdir` CLI subcommands).
    pub fn restore_one(
        &self,
        catalog: &Catalog,
        node_name: &str,
        node: &StorageNode,
        source_directory: &LocalDirectory,
        local_file: &LocalFile,
        target_directory: &Path,
    ) -> Result<()> {
        let vault = get_vault(catalog.connection(), node.id, source_directory.id)?.ok_or_else(|| {
            Error::NotFound(format!("vault for node {node_name} over {}", source_directory.path))
        })?;
        self.restore_file(catalog, node_name, &vault, local_file, target_directory)
    }

    fn restore_file(
        &self,
        catalog: &Catalog,
        node_name: &str,
        vault: &Vault,
        local_file: &LocalFile,
        target_directory: &Path,
    ) -> Result<()> {
        let vault_file = get_vault_file(catalog.connection(), vault.id, local_file.id)?
            .ok_or_else(|| Error::NotFound(format!("vault_file for {}", local_file.relative_path)))?;
        let blocks = get_blocks_for_vault_file(catalog.connection(), vault_file.id)?;
        if blocks.len() as i64 != vault_file.block_count {
            return Err(Error::CatalogIncomplete {
                key: local_file.relative_path.clone(),
                expected: vault_file.block_count,
                found: blocks.len() as i64,
            });
        }

        let target_path = target_directory.join(&local_file.relative_path);
        if let Some(parent) = target_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
                }
            }
        }

        let mut out = File::create(&target_path)?;
        for block in &blocks {
            let plaintext = self.restore_block(node_name, &vault_file, block, vault.encrypt)?;
            out.write_all(&plaintext)?;
        }
        out.sync_all()?;

        let permissions = Permissions {
            user: PermTriple::parse(&vault_file.user_perms).unwrap_or(PermTriple::from_bits(0)),
            group: PermTriple::parse(&vault_file.group_perms).unwrap_or(PermTriple::from_bits(0)),
            other: PermTriple::parse(&vault_file.other_perms).unwrap_or(PermTriple::from_bits(0)),
        };
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target_path, fs::Permissions::from_mode(permissions.to_mode()))?;
        }
        #[cfg(not(unix))]
        let _ = permissions;

        Ok(())
    }

    fn restore_block(
        &self,
        node_name: &str,
        vault_file: &gfs_catalog::VaultFile,
        block: &VaultFileBlock,
        encrypt: bool,
    ) -> Result<Vec<u8>> {
        let request = Message::new("fileRetrieve")
            .with_header(headers::DIR, block.node_directory.clone())
            .with_header(headers::FILE, block.node_file.clone());
        let response = self.client.send(node_name, &request)?;
        if !response.rc_ok() {
            return Err(Error::NotFound(format!(
                "block {} missing on {node_name}: {}",
                block.node_file,
                response.header(headers::ERROR).unwrap_or("unknown")
            )));
        }

        let wire_form = String::from_utf8(response.payload)
            .map_err(|e| Error::DecodeError(format!("retrieved block is not valid utf-8: {e}")))?;

        let actual_fp = fingerprint_bytes(wire_form.as_bytes());
        if actual_fp != block.unique_identifier {
            return Err(Error::IntegrityMismatch {
                key: block.unique_identifier.clone(),
                detail: format!("expected {}, retrieved content fingerprints to {actual_fp}", block.unique_identifier),
            });
        }
        if wire_form.len() as i64 != block.stored_filesize {
            return Err(Error::IntegrityMismatch {
                key: block.unique_identifier.clone(),
                detail: format!(
                    "stored size {} disagrees with retrieved length {}",
                    block.stored_filesize,
                    wire_form.len()
                ),
            });
        }

        let is_last = block.block_sequence_number == vault_file.block_count;
        let expected_len = if is_last {
            let remainder = vault_file.origin_filesize - (vault_file.block_count - 1) * BLOCK_SIZE as i64;
            remainder as usize
        } else {
            BLOCK_SIZE
        };

        let plaintext = decode_block(
            &wire_form,
            encrypt,
            self.key.as_deref(),
            block.pad_char_count as u8,
            Some(expected_len),
        )?;
        if plaintext.len() != expected_len {
            return Err(Error::IntegrityMismatch {
                key: block.unique_identifier.clone(),
                detail: format!(
                    "decoded length {} disagrees with expected plaintext length {expected_len}",
                    plaintext.len()
                ),
            });
        }
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfs_catalog::{
        insert_local_directory, insert_local_file, insert_storage_node, insert_vault, insert_vault_file,
        insert_vault_file_block,
    };
    use gfs_core::codec::encode_block;
    use gfs_node_client::NodeRoster;
    use std::collections::HashMap;
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    type BlockTable = Arc<Mutex<HashMap<(String, String), Vec<u8>>>>;

    /// An in-memory node stub keyed by `(dir, file)` that answers
    /// `fileRetrieve` with whatever bytes were registered for that key.
    fn spawn_store_node(blocks: BlockTable) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = stream.unwrap();
                let blocks = Arc::clone(&blocks);
                thread::spawn(move || while let Ok(req) = gfs_wire::read_frame(&mut stream) {
                    let dir = req.header(headers::DIR).unwrap_or("").to_string();
                    let file = req.header(headers::FILE).unwrap_or("").to_string();
                    let resp = match blocks.lock().unwrap().get(&(dir, file)) {
                        Some(bytes) => Message::new("fileRetrieve")
                            .with_header(headers::RC, "true")
                            .with_payload(bytes.clone()),
                        None => Message::new("fileRetrieve")
                            .with_header(headers::RC, "false")
                            .with_header(headers::ERROR, "not found"),
                    };
                    if gfs_wire::write_frame(&mut stream, &resp).is_err() {
                        break;
                    }
                });
            }
        });
        addr
    }

    #[test]
    fn restore_round_trips_a_single_block_file() {
        let encoded = encode_block(b"Hello", false, None).unwrap();
        let blocks = Arc::new(Mutex::new(HashMap::new()));
        blocks
            .lock()
            .unwrap()
            .insert(("00".to_string(), encoded.unique_id.clone()), encoded.wire_form.clone().into_bytes());
        let addr = spawn_store_node(blocks);

        let mut roster = NodeRoster::new();
        roster.register("node-a", addr);
        let client = NodeClient::new(roster, Duration::from_secs(2));
        let restorer = Restorer::new(client, None);

        let catalog = Catalog::open_in_memory().unwrap();
        let mut dir = LocalDirectory {
            id: 0,
            path: "/data".into(),
            active: true,
            recurse: true,
            compress: false,
            encrypt: false,
            copy_count: 0,
        };
        insert_local_directory(catalog.connection(), &mut dir).unwrap();
        let mut node =
            StorageNode { id: 0, node_name: "node-a".into(), active: true, ping_time: None, copy_time: None };
        insert_storage_node(catalog.connection(), &mut node).unwrap();
        let mut vault =
            Vault { id: 0, storage_node_id: node.id, local_directory_id: dir.id, compress: false, encrypt: false };
        insert_vault(catalog.connection(), &mut vault).unwrap();
        let mut lf = LocalFile {
            id: 0,
            local_directory_id: dir.id,
            relative_path: "hello.txt".into(),
            create_time: 1,
            modify_time: 1,
            scan_time: 1,
            copy_time: Some(1),
        };
        insert_local_file(catalog.connection(), &mut lf).unwrap();
        let mut vf = gfs_catalog::VaultFile {
            id: 0,
            vault_id: vault.id,
            local_file_id: lf.id,
            create_time: 1,
            modify_time: 1,
            origin_filesize: 5,
            block_count: 1,
            user_perms: "rw-".into(),
            group_perms: "r--".into(),
            other_perms: "r--".into(),
        };
        insert_vault_file(catalog.connection(), &mut vf).unwrap();
        let mut block = VaultFileBlock {
            id: 0,
            vault_file_id: vf.id,
            create_time: 1,
            modify_time: 1,
            stored_time: 1,
            origin_filesize: 5,
            stored_filesize: encoded.wire_form.len() as i64,
            block_sequence_number: 1,
            pad_char_count: 0,
            unique_identifier: encoded.unique_id.clone(),
            node_directory: "00".into(),
            node_file: encoded.unique_id.clone(),
        };
        insert_vault_file_block(catalog.connection(), &mut block).unwrap();

        let target = tempfile::tempdir().unwrap();
        let summary = restorer.restore(&catalog, "node-a", &node, &dir, target.path()).unwrap();
        assert_eq!(summary.files_restored, 1);
        assert_eq!(summary.files_failed, 0);
        let restored = fs::read(target.path().join("hello.txt")).unwrap();
        assert_eq!(restored, b"Hello");
    }

    #[test]
    fn missing_blocks_report_catalog_incomplete() {
        let blocks = Arc::new(Mutex::new(HashMap::new()));
        let addr = spawn_store_node(blocks);
        let mut roster = NodeRoster::new();
        roster.register("node-a", addr);
        let client = NodeClient::new(roster, Duration::from_secs(2));
        let restorer = Restorer::new(client, None);

        let catalog = Catalog::open_in_memory().unwrap();
        let mut dir = LocalDirectory {
            id: 0,
            path: "/data".into(),
            active: true,
            recurse: true,
            compress: false,
            encrypt: false,
            copy_count: 0,
        };
        insert_local_directory(catalog.connection(), &mut dir).unwrap();
        let mut node =
            StorageNode { id: 0, node_name: "node-a".into(), active: true, ping_time: None, copy_time: None };
        insert_storage_node(catalog.connection(), &mut node).unwrap();
        let mut vault =
            Vault { id: 0, storage_node_id: node.id, local_directory_id: dir.id, compress: false, encrypt: false };
        insert_vault(catalog.connection(), &mut vault).unwrap();
        let mut lf = LocalFile {
            id: 0,
            local_directory_id: dir.id,
            relative_path: "partial.bin".into(),
            create_time: 1,
            modify_time: 1,
            scan_time: 1,
            copy_time: Some(1),
        };
        insert_local_file(catalog.connection(), &mut lf).unwrap();
        let mut vf = gfs_catalog::VaultFile {
            id: 0,
            vault_id: vault.id,
            local_file_id: lf.id,
            create_time: 1,
            modify_time: 1,
            origin_filesize: 40_000,
            block_count: 3,
            user_perms: "rw-".into(),
            group_perms: "r--".into(),
            other_perms: "r--".into(),
        };
        insert_vault_file(catalog.connection(), &mut vf).unwrap();
        // Only one of the three expected blocks is present.
        let mut block = VaultFileBlock {
            id: 0,
            vault_file_id: vf.id,
            create_time: 1,
            modify_time: 1,
            stored_time: 1,
            origin_filesize: 16384,
            stored_filesize: 21846,
            block_sequence_number: 1,
            pad_char_count: 0,
            unique_identifier: "id1".into(),
            node_directory: "00".into(),
            node_file: "id1".into(),
        };
        insert_vault_file_block(catalog.connection(), &mut block).unwrap();

        let target = tempfile::tempdir().unwrap();
        let summary = restorer.restore(&catalog, "node-a", &node, &dir, target.path()).unwrap();
        assert_eq!(summary.files_restored, 0);
        assert_eq!(summary.files_failed, 1);
    }
}
