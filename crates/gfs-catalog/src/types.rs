//! Catalog entity types (spec §3). Integer ids are autoincrement surrogate
//! keys assigned by `insert_*`; `0` is the sentinel for "not yet inserted".

/// A registered local directory root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDirectory {
    pub id: i64,
    pub path: String,
    pub active: bool,
    pub recurse: bool,
    pub compress: bool,
    pub encrypt: bool,
    pub copy_count: i64,
}

/// A file observed under a `LocalDirectory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub id: i64,
    pub local_directory_id: i64,
    pub relative_path: String,
    pub create_time: i64,
    pub modify_time: i64,
    pub scan_time: i64,
    pub copy_time: Option<i64>,
}

/// A storage node the client replicates blocks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageNode {
    pub id: i64,
    pub node_name: String,
    pub active: bool,
    pub ping_time: Option<i64>,
    pub copy_time: Option<i64>,
}

/// The association of one `LocalDirectory` with one `StorageNode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vault {
    pub id: i64,
    pub storage_node_id: i64,
    pub local_directory_id: i64,
    pub compress: bool,
    pub encrypt: bool,
}

/// A file placed into a vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultFile {
    pub id: i64,
    pub vault_id: i64,
    pub local_file_id: i64,
    pub create_time: i64,
    pub modify_time: i64,
    pub origin_filesize: i64,
    pub block_count: i64,
    pub user_perms: String,
    pub group_perms: String,
    pub other_perms: String,
}

/// One placed block of a `VaultFile`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultFileBlock {
    pub id: i64,
    pub vault_file_id: i64,
    pub create_time: i64,
    pub modify_time: i64,
    pub stored_time: i64,
    pub origin_filesize: i64,
    pub stored_filesize: i64,
    pub block_sequence_number: i64,
    pub pad_char_count: i64,
    pub unique_identifier: String,
    pub node_directory: String,
    pub node_file: String,
}
