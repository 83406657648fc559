//! The transactional catalog (C4): typed CRUD over the six tables in
//! [`crate::schema`], backed by `rusqlite`.

use std::path::Path;

use gfs_core::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::schema::SCHEMA;
use crate::types::{LocalDirectory, LocalFile, StorageNode, Vault, VaultFile, VaultFileBlock};

fn map_rusqlite(e: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(ffi_err, msg) = &e {
        if ffi_err.code == rusqlite::ErrorCode::ConstraintViolation {
            return Error::CatalogConflict(msg.clone().unwrap_or_else(|| e.to_string()));
        }
    }
    Error::Storage(e.to_string())
}

/// Owns the SQLite connection backing one installation's catalog. A single
/// client process owns its catalog; concurrent access from a second process
/// is undefined behavior, per spec §5.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open (creating if absent) the catalog file at `path`, e.g.
    /// `gfs_db.sqlite3`, and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).map_err(map_rusqlite)?;
        conn.execute_batch(SCHEMA).map_err(map_rusqlite)?;
        Ok(Self { conn })
    }

    /// Open an in-memory catalog, used by tests and ephemeral tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_rusqlite)?;
        conn.execute_batch(SCHEMA).map_err(map_rusqlite)?;
        Ok(Self { conn })
    }

    /// Begin an explicit transaction. The caller is responsible for calling
    /// `commit()`/`rollback()` on the returned handle; writes performed by
    /// the scanner for one file SHOULD be a single transaction.
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        self.conn.transaction().map_err(map_rusqlite)
    }

    /// Borrow the underlying connection for ad hoc single-statement calls.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

// --- LocalDirectory ---------------------------------------------------

pub fn insert_local_directory(conn: &Connection, d: &mut LocalDirectory) -> Result<()> {
    conn.execute(
        "INSERT INTO local_directory (path, active, recurse, compress, encrypt, copy_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![d.path, d.active, d.recurse, d.compress, d.encrypt, d.copy_count],
    )
    .map_err(map_rusqlite)?;
    d.id = conn.last_insert_rowid();
    Ok(())
}

pub fn update_local_directory(conn: &Connection, d: &LocalDirectory) -> Result<()> {
    let n = conn
        .execute(
            "UPDATE local_directory SET path=?1, active=?2, recurse=?3, compress=?4, encrypt=?5,
             copy_count=?6 WHERE id=?7",
            rusqlite::params![
                d.path, d.active, d.recurse, d.compress, d.encrypt, d.copy_count, d.id
            ],
        )
        .map_err(map_rusqlite)?;
    if n == 0 {
        return Err(Error::NotFound(format!("local_directory {}", d.id)));
    }
    Ok(())
}

pub fn get_local_directory(conn: &Connection, id: i64) -> Result<LocalDirectory> {
    conn.query_row("SELECT * FROM local_directory WHERE id=?1", [id], row_to_local_directory)
        .optional()
        .map_err(map_rusqlite)?
        .ok_or_else(|| Error::NotFound(format!("local_directory {id}")))
}

pub fn get_local_directory_by_path(conn: &Connection, path: &str) -> Result<Option<LocalDirectory>> {
    conn.query_row(
        "SELECT * FROM local_directory WHERE path=?1",
        [path],
        row_to_local_directory,
    )
    .optional()
    .map_err(map_rusqlite)
}

pub fn list_local_directories(conn: &Connection) -> Result<Vec<LocalDirectory>> {
    let mut stmt = conn.prepare("SELECT * FROM local_directory ORDER BY id").map_err(map_rusqlite)?;
    let rows = stmt
        .query_map([], row_to_local_directory)
        .map_err(map_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(map_rusqlite)?;
    Ok(rows)
}

/// Physical deletion: removes the row outright.
pub fn delete_local_directory(conn: &Connection, d: &mut LocalDirectory) -> Result<()> {
    let rows = conn
        .execute("DELETE FROM local_directory WHERE id=?1", [d.id])
        .map_err(map_rusqlite)?;
    if rows == 0 {
        return Err(Error::NotFound(format!("local_directory {}", d.id)));
    }
    Ok(())
}

fn row_to_local_directory(row: &rusqlite::Row) -> rusqlite::Result<LocalDirectory> {
    Ok(LocalDirectory {
        id: row.get("id")?,
        path: row.get("path")?,
        active: row.get("active")?,
        recurse: row.get("recurse")?,
        compress: row.get("compress")?,
        encrypt: row.get("encrypt")?,
        copy_count: row.get("copy_count")?,
    })
}

// --- LocalFile ----------------------------------------------------------

pub fn insert_local_file(conn: &Connection, f: &mut LocalFile) -> Result<()> {
    conn.execute(
        "INSERT INTO local_file (local_directory_id, relative_path, create_time, modify_time,
         scan_time, copy_time) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            f.local_directory_id,
            f.relative_path,
            f.create_time,
            f.modify_time,
            f.scan_time,
            f.copy_time
        ],
    )
    .map_err(map_rusqlite)?;
    f.id = conn.last_insert_rowid();
    Ok(())
}

pub fn update_local_file(conn: &Connection, f: &LocalFile) -> Result<()> {
    let n = conn
        .execute(
            "UPDATE local_file SET local_directory_id=?1, relative_path=?2, create_time=?3,
             modify_time=?4, scan_time=?5, copy_time=?6 WHERE id=?7",
            rusqlite::params![
                f.local_directory_id,
                f.relative_path,
                f.create_time,
                f.modify_time,
                f.scan_time,
                f.copy_time,
                f.id
            ],
        )
        .map_err(map_rusqlite)?;
    if n == 0 {
        return Err(Error::NotFound(format!("local_file {}", f.id)));
    }
    Ok(())
}

pub fn get_local_file(
    conn: &Connection,
    local_directory_id: i64,
    relative_path: &str,
) -> Result<Option<LocalFile>> {
    conn.query_row(
        "SELECT * FROM local_file WHERE local_directory_id=?1 AND relative_path=?2",
        rusqlite::params![local_directory_id, relative_path],
        row_to_local_file,
    )
    .optional()
    .map_err(map_rusqlite)
}

pub fn get_local_files_for_directory(
    conn: &Connection,
    local_directory_id: i64,
) -> Result<Vec<LocalFile>> {
    let mut stmt = conn
        .prepare("SELECT * FROM local_file WHERE local_directory_id=?1 ORDER BY id")
        .map_err(map_rusqlite)?;
    let rows = stmt
        .query_map([local_directory_id], row_to_local_file)
        .map_err(map_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(map_rusqlite)?;
    Ok(rows)
}

/// Physical deletion: removes the row outright.
pub fn delete_local_file(conn: &Connection, f: &mut LocalFile) -> Result<()> {
    let rows = conn.execute("DELETE FROM local_file WHERE id=?1", [f.id]).map_err(map_rusqlite)?;
    if rows == 0 {
        return Err(Error::NotFound(format!("local_file {}", f.id)));
    }
    Ok(())
}

fn row_to_local_file(row: &rusqlite::Row) -> rusqlite::Result<LocalFile> {
    Ok(LocalFile {
        id: row.get("id")?,
        local_directory_id: row.get("local_directory_id")?,
        relative_path: row.get("relative_path")?,
        create_time: row.get("create_time")?,
        modify_time: row.get("modify_time")?,
        scan_time: row.get("scan_time")?,
        copy_time: row.get("copy_time")?,
    })
}

// --- StorageNode ----------------------------------------------------------

pub fn insert_storage_node(conn: &Connection, n: &mut StorageNode) -> Result<()> {
    conn.execute(
        "INSERT INTO storage_node (node_name, active, ping_time, copy_time) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![n.node_name, n.active, n.ping_time, n.copy_time],
    )
    .map_err(map_rusqlite)?;
    n.id = conn.last_insert_rowid();
    Ok(())
}

pub fn update_storage_node(conn: &Connection, n: &StorageNode) -> Result<()> {
    let rows = conn
        .execute(
            "UPDATE storage_node SET node_name=?1, active=?2, ping_time=?3, copy_time=?4 WHERE id=?5",
            rusqlite::params![n.node_name, n.active, n.ping_time, n.copy_time, n.id],
        )
        .map_err(map_rusqlite)?;
    if rows == 0 {
        return Err(Error::NotFound(format!("storage_node {}", n.id)));
    }
    Ok(())
}

/// Logical deletion: flips `active=false` rather than removing the row.
pub fn delete_storage_node(conn: &Connection, n: &mut StorageNode) -> Result<()> {
    n.active = false;
    update_storage_node(conn, n)
}

pub fn get_storage_node_by_name(conn: &Connection, node_name: &str) -> Result<Option<StorageNode>> {
    conn.query_row(
        "SELECT * FROM storage_node WHERE node_name=?1",
        [node_name],
        row_to_storage_node,
    )
    .optional()
    .map_err(map_rusqlite)
}

pub fn list_active_storage_nodes(conn: &Connection) -> Result<Vec<StorageNode>> {
    let mut stmt =
        conn.prepare("SELECT * FROM storage_node WHERE active=1 ORDER BY id").map_err(map_rusqlite)?;
    let rows = stmt
        .query_map([], row_to_storage_node)
        .map_err(map_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(map_rusqlite)?;
    Ok(rows)
}

pub fn list_storage_nodes(conn: &Connection) -> Result<Vec<StorageNode>> {
    let mut stmt = conn.prepare("SELECT * FROM storage_node ORDER BY id").map_err(map_rusqlite)?;
    let rows = stmt
        .query_map([], row_to_storage_node)
        .map_err(map_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(map_rusqlite)?;
    Ok(rows)
}

fn row_to_storage_node(row: &rusqlite::Row) -> rusqlite::Result<StorageNode> {
    Ok(StorageNode {
        id: row.get("id")?,
        node_name: row.get("node_name")?,
        active: row.get("active")?,
        ping_time: row.get("ping_time")?,
        copy_time: row.get("copy_time")?,
    })
}

// --- Vault ----------------------------------------------------------------

pub fn insert_vault(conn: &Connection, v: &mut Vault) -> Result<()> {
    conn.execute(
        "INSERT INTO vault (storage_node_id, local_directory_id, compress, encrypt)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![v.storage_node_id, v.local_directory_id, v.compress, v.encrypt],
    )
    .map_err(map_rusqlite)?;
    v.id = conn.last_insert_rowid();
    Ok(())
}

pub fn get_vault(
    conn: &Connection,
    storage_node_id: i64,
    local_directory_id: i64,
) -> Result<Option<Vault>> {
    conn.query_row(
        "SELECT * FROM vault WHERE storage_node_id=?1 AND local_directory_id=?2",
        rusqlite::params![storage_node_id, local_directory_id],
        row_to_vault,
    )
    .optional()
    .map_err(map_rusqlite)
}

/// Physical deletion: removes the row outright.
pub fn delete_vault(conn: &Connection, v: &mut Vault) -> Result<()> {
    let rows = conn.execute("DELETE FROM vault WHERE id=?1", [v.id]).map_err(map_rusqlite)?;
    if rows == 0 {
        return Err(Error::NotFound(format!("vault {}", v.id)));
    }
    Ok(())
}

fn row_to_vault(row: &rusqlite::Row) -> rusqlite::Result<Vault> {
    Ok(Vault {
        id: row.get("id")?,
        storage_node_id: row.get("storage_node_id")?,
        local_directory_id: row.get("local_directory_id")?,
        compress: row.get("compress")?,
        encrypt: row.get("encrypt")?,
    })
}

// --- VaultFile --------------------------------------------------------

pub fn insert_vault_file(conn: &Connection, vf: &mut VaultFile) -> Result<()> {
    conn.execute(
        "INSERT INTO vault_file (vault_id, local_file_id, create_time, modify_time,
         origin_filesize, block_count, user_perms, group_perms, other_perms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            vf.vault_id,
            vf.local_file_id,
            vf.create_time,
            vf.modify_time,
            vf.origin_filesize,
            vf.block_count,
            vf.user_perms,
            vf.group_perms,
            vf.other_perms
        ],
    )
    .map_err(map_rusqlite)?;
    vf.id = conn.last_insert_rowid();
    Ok(())
}

pub fn update_vault_file(conn: &Connection, vf: &VaultFile) -> Result<()> {
    let rows = conn
        .execute(
            "UPDATE vault_file SET create_time=?1, modify_time=?2, origin_filesize=?3,
             block_count=?4, user_perms=?5, group_perms=?6, other_perms=?7 WHERE id=?8",
            rusqlite::params![
                vf.create_time,
                vf.modify_time,
                vf.origin_filesize,
                vf.block_count,
                vf.user_perms,
                vf.group_perms,
                vf.other_perms,
                vf.id
            ],
        )
        .map_err(map_rusqlite)?;
    if rows == 0 {
        return Err(Error::NotFound(format!("vault_file {}", vf.id)));
    }
    Ok(())
}

pub fn get_vault_file(
    conn: &Connection,
    vault_id: i64,
    local_file_id: i64,
) -> Result<Option<VaultFile>> {
    conn.query_row(
        "SELECT * FROM vault_file WHERE vault_id=?1 AND local_file_id=?2",
        rusqlite::params![vault_id, local_file_id],
        row_to_vault_file,
    )
    .optional()
    .map_err(map_rusqlite)
}

/// Physical deletion: removes the row outright.
pub fn delete_vault_file(conn: &Connection, vf: &mut VaultFile) -> Result<()> {
    let rows = conn.execute("DELETE FROM vault_file WHERE id=?1", [vf.id]).map_err(map_rusqlite)?;
    if rows == 0 {
        return Err(Error::NotFound(format!("vault_file {}", vf.id)));
    }
    Ok(())
}

fn row_to_vault_file(row: &rusqlite::Row) -> rusqlite::Result<VaultFile> {
    Ok(VaultFile {
        id: row.get("id")?,
        vault_id: row.get("vault_id")?,
        local_file_id: row.get("local_file_id")?,
        create_time: row.get("create_time")?,
        modify_time: row.get("modify_time")?,
        origin_filesize: row.get("origin_filesize")?,
        block_count: row.get("block_count")?,
        user_perms: row.get("user_perms")?,
        group_perms: row.get("group_perms")?,
        other_perms: row.get("other_perms")?,
    })
}

// --- VaultFileBlock -----------------------------------------------------

pub fn insert_vault_file_block(conn: &Connection, b: &mut VaultFileBlock) -> Result<()> {
    conn.execute(
        "INSERT INTO vault_file_block (vault_file_id, create_time, modify_time, stored_time,
         origin_filesize, stored_filesize, block_sequence_number, pad_char_count,
         unique_identifier, node_directory, node_file)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            b.vault_file_id,
            b.create_time,
            b.modify_time,
            b.stored_time,
            b.origin_filesize,
            b.stored_filesize,
            b.block_sequence_number,
            b.pad_char_count,
            b.unique_identifier,
            b.node_directory,
            b.node_file
        ],
    )
    .map_err(map_rusqlite)?;
    b.id = conn.last_insert_rowid();
    Ok(())
}

pub fn update_vault_file_block(conn: &Connection, b: &VaultFileBlock) -> Result<()> {
    let rows = conn
        .execute(
            "UPDATE vault_file_block SET modify_time=?1, stored_time=?2, origin_filesize=?3,
             stored_filesize=?4, pad_char_count=?5, unique_identifier=?6, node_directory=?7,
             node_file=?8 WHERE id=?9",
            rusqlite::params![
                b.modify_time,
                b.stored_time,
                b.origin_filesize,
                b.stored_filesize,
                b.pad_char_count,
                b.unique_identifier,
                b.node_directory,
                b.node_file,
                b.id
            ],
        )
        .map_err(map_rusqlite)?;
    if rows == 0 {
        return Err(Error::NotFound(format!("vault_file_block {}", b.id)));
    }
    Ok(())
}

pub fn get_blocks_for_vault_file(conn: &Connection, vault_file_id: i64) -> Result<Vec<VaultFileBlock>> {
    let mut stmt = conn
        .prepare(
            "SELECT * FROM vault_file_block WHERE vault_file_id=?1 ORDER BY block_sequence_number",
        )
        .map_err(map_rusqlite)?;
    let rows = stmt
        .query_map([vault_file_id], row_to_vault_file_block)
        .map_err(map_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(map_rusqlite)?;
    Ok(rows)
}

pub fn get_vault_file_block(
    conn: &Connection,
    vault_file_id: i64,
    block_sequence_number: i64,
) -> Result<Option<VaultFileBlock>> {
    conn.query_row(
        "SELECT * FROM vault_file_block WHERE vault_file_id=?1 AND block_sequence_number=?2",
        rusqlite::params![vault_file_id, block_sequence_number],
        row_to_vault_file_block,
    )
    .optional()
    .map_err(map_rusqlite)
}

/// Physical deletion: removes the row outright.
pub fn delete_vault_file_block(conn: &Connection, b: &mut VaultFileBlock) -> Result<()> {
    let rows = conn.execute("DELETE FROM vault_file_block WHERE id=?1", [b.id]).map_err(map_rusqlite)?;
    if rows == 0 {
        return Err(Error::NotFound(format!("vault_file_block {}", b.id)));
    }
    Ok(())
}

fn row_to_vault_file_block(row: &rusqlite::Row) -> rusqlite::Result<VaultFileBlock> {
    Ok(VaultFileBlock {
        id: row.get("id")?,
        vault_file_id: row.get("vault_file_id")?,
        create_time: row.get("create_time")?,
        modify_time: row.get("modify_time")?,
        stored_time: row.get("stored_time")?,
        origin_filesize: row.get("origin_filesize")?,
        stored_filesize: row.get("stored_filesize")?,
        block_sequence_number: row.get("block_sequence_number")?,
        pad_char_count: row.get("pad_char_count")?,
        unique_identifier: row.get("unique_identifier")?,
        node_directory: row.get("node_directory")?,
        node_file: row.get("node_file")?,
    })
}
