//! C6 — walk a registered local directory, decide per `(file, node)`
//! whether blocks need work, and hand changed files to the [`Replicator`].

use std::fs;
use std::path::Path;

use gfs_catalog::{
    get_local_file, get_vault, get_vault_file, insert_local_file, insert_vault, insert_vault_file,
    update_local_file, update_vault_file, Catalog, LocalDirectory, LocalFile, StorageNode, Vault,
    VaultFile,
};
use gfs_core::error::Result;
use gfs_core::perms::Permissions;
use gfs_core::time::{now_ms, system_time_to_ms};

use crate::replicator::Replicator;

/// Per-node decision for one file, computed by comparing the on-disk stat
/// against the catalog's last-known `VaultFile` (spec §4.6 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFlag {
    /// Nothing changed; skip this file for this node.
    None,
    /// No prior placement; every block must be sent.
    All,
    /// Size or modify time changed; (re-)send every block (no short-circuit
    /// yet — see the replicator's design note).
    Selective,
}

/// One node's scan-time context for a single file: its row, its vault, the
/// decision, and the `VaultFile` row to attach new blocks to.
pub struct NodeContext {
    pub node: StorageNode,
    pub vault: Vault,
    pub flag: NodeFlag,
    pub vault_file: VaultFile,
}

/// Tally of one directory scan, for logging and CLI exit codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanSummary {
    pub files_scanned: u64,
    pub files_failed: u64,
}

/// Walks one registered [`LocalDirectory`], excluding entries per
/// `exclusions`, and drives file-level decisions through a [`Replicator`].
pub struct Scanner<'a> {
    exclusions: &'a gfs_exclusions::ExclusionSet,
}

impl<'a> Scanner<'a> {
    pub fn new(exclusions: &'a gfs_exclusions::ExclusionSet) -> Self {
        Self { exclusions }
    }

    /// Scan `dir` against every node in `active_nodes`, creating missing
    /// vaults first (spec §4.6 step 1), then walking the tree.
    pub fn scan_directory(
        &self,
        catalog: &mut Catalog,
        replicator: &Replicator,
        dir: &LocalDirectory,
        active_nodes: &[StorageNode],
    ) -> Result<ScanSummary> {
        let vaults = self.ensure_vaults(catalog, dir, active_nodes)?;
        let mut summary = ScanSummary::default();
        self.walk(catalog, replicator, dir, &vaults, Path::new(&dir.path), "", &mut summary)?;
        Ok(summary)
    }

    fn ensure_vaults(
        &self,
        catalog: &mut Catalog,
        dir: &LocalDirectory,
        active_nodes: &[StorageNode],
    ) -> Result<Vec<(StorageNode, Vault)>> {
        let mut out = Vec::with_capacity(active_nodes.len());
        for node in active_nodes {
            let vault = match get_vault(catalog.connection(), node.id, dir.id)? {
                Some(v) => v,
                None => {
                    let mut v = Vault {
                        id: 0,
                        storage_node_id: node.id,
                        local_directory_id: dir.id,
                        compress: dir.compress,
                        encrypt: dir.encrypt,
                    };
                    insert_vault(catalog.connection(), &mut v)?;
                    v
                }
            };
            out.push((node.clone(), vault));
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        catalog: &mut Catalog,
        replicator: &Replicator,
        dir: &LocalDirectory,
        vaults: &[(StorageNode, Vault)],
        abs_dir: &Path,
        rel_dir: &str,
        summary: &mut ScanSummary,
    ) -> Result<()> {
        let entries = match fs::read_dir(abs_dir) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(dir = %abs_dir.display(), error = %e, "failed to read directory, skipping");
                return Ok(());
            }
        };
        for entry in entries {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let name = entry.file_name().to_string_lossy().into_owned();

            if file_type.is_dir() {
                if self.exclusions.exclude_directory(&name) {
                    continue;
                }
                if dir.recurse {
                    let child_rel =
                        if rel_dir.is_empty() { name.clone() } else { format!("{rel_dir}/{name}") };
                    self.walk(catalog, replicator, dir, vaults, &entry.path(), &child_rel, summary)?;
                }
            } else if file_type.is_file() {
                if self.exclusions.exclude_file(&name) {
                    continue;
                }
                let rel = if rel_dir.is_empty() { name.clone() } else { format!("{rel_dir}/{name}") };
                match scan_one_file(catalog, replicator, dir, vaults, &rel, &entry.path()) {
                    Ok(()) => summary.files_scanned += 1,
                    Err(e) => {
                        tracing::warn!(file = %rel, error = %e, "file scan failed, continuing with next file");
                        summary.files_failed += 1;
                    }
                }
            }
            // symlinks and other dirent types are ignored, per spec.
        }
        Ok(())
    }
}

fn scan_one_file(
    catalog: &mut Catalog,
    replicator: &Replicator,
    dir: &LocalDirectory,
    vaults: &[(StorageNode, Vault)],
    rel: &str,
    abs_path: &Path,
) -> Result<()> {
    let metadata = fs::metadata(abs_path)?;
    let size = metadata.len();
    let modify_time = system_time_to_ms(metadata.modified()?);
    let create_time = metadata.created().map(system_time_to_ms).unwrap_or(modify_time);
    #[cfg(unix)]
    let perms = {
        use std::os::unix::fs::PermissionsExt;
        Permissions::from_mode(metadata.permissions().mode())
    };
    #[cfg(not(unix))]
    let perms = Permissions::from_mode(0o644);

    let now = now_ms();
    let mut local_file = match get_local_file(catalog.connection(), dir.id, rel)? {
        Some(mut lf) => {
            lf.scan_time = now;
            update_local_file(catalog.connection(), &lf)?;
            lf
        }
        None => {
            let mut lf = LocalFile {
                id: 0,
                local_directory_id: dir.id,
                relative_path: rel.to_string(),
                create_time,
                modify_time,
                scan_time: now,
                copy_time: None,
            };
            insert_local_file(catalog.connection(), &mut lf)?;
            lf
        }
    };

    // A zero-byte file records block_count = 0: no VaultFileBlock rows are
    // ever expected for it, satisfying invariant 4 without a special case
    // in the restorer (spec §9, "open question — empty files").
    let block_count = if size == 0 { 0 } else { gfs_core::block_count(size) };

    let mut node_contexts = Vec::with_capacity(vaults.len());
    for (node, vault) in vaults {
        let existing = get_vault_file(catalog.connection(), vault.id, local_file.id)?;
        let (flag, vault_file) = match existing {
            None => {
                let mut vf = VaultFile {
                    id: 0,
                    vault_id: vault.id,
                    local_file_id: local_file.id,
                    create_time,
                    modify_time,
                    origin_filesize: size as i64,
                    block_count: block_count as i64,
                    user_perms: perms.user.to_string(),
                    group_perms: perms.group.to_string(),
                    other_perms: perms.other.to_string(),
                };
                insert_vault_file(catalog.connection(), &mut vf)?;
                (NodeFlag::All, vf)
            }
            Some(mut vf) => {
                if vf.origin_filesize as u64 == size {
                    if vf.modify_time == modify_time {
                        (NodeFlag::None, vf)
                    } else if modify_time > vf.modify_time {
                        vf.modify_time = modify_time;
                        vf.user_perms = perms.user.to_string();
                        vf.group_perms = perms.group.to_string();
                        vf.other_perms = perms.other.to_string();
                        update_vault_file(catalog.connection(), &vf)?;
                        (NodeFlag::Selective, vf)
                    } else {
                        tracing::warn!(
                            file = rel,
                            node = %node.node_name,
                            "disk modify time older than catalog; treating as unchanged (clock skew or restore artifact)"
                        );
                        (NodeFlag::None, vf)
                    }
                } else {
                    vf.origin_filesize = size as i64;
                    vf.block_count = block_count as i64;
                    vf.modify_time = modify_time;
                    vf.user_perms = perms.user.to_string();
                    vf.group_perms = perms.group.to_string();
                    vf.other_perms = perms.other.to_string();
                    update_vault_file(catalog.connection(), &vf)?;
                    (NodeFlag::Selective, vf)
                }
            }
        };
        node_contexts.push(NodeContext { node: node.clone(), vault: vault.clone(), flag, vault_file });
    }

    if node_contexts.iter().any(|c| c.flag != NodeFlag::None) {
        let copied = replicator.replicate_file(catalog, abs_path, block_count, dir.encrypt, &node_contexts)?;
        if copied > 0 {
            local_file.copy_time = Some(now);
            update_local_file(catalog.connection(), &local_file)?;
        }
    }

    Ok(())
}
