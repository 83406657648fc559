//! Catalog schema (spec §6): six tables with declarative foreign keys.

pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS local_directory (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    path            TEXT NOT NULL UNIQUE,
    active          INTEGER NOT NULL DEFAULT 1,
    recurse         INTEGER NOT NULL DEFAULT 1,
    compress        INTEGER NOT NULL DEFAULT 0,
    encrypt         INTEGER NOT NULL DEFAULT 0,
    copy_count      INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS local_file (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    local_directory_id  INTEGER NOT NULL REFERENCES local_directory(id),
    relative_path       TEXT NOT NULL,
    create_time         INTEGER NOT NULL,
    modify_time         INTEGER NOT NULL,
    scan_time           INTEGER NOT NULL,
    copy_time           INTEGER,
    UNIQUE(local_directory_id, relative_path)
);

CREATE TABLE IF NOT EXISTS storage_node (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    node_name   TEXT NOT NULL UNIQUE,
    active      INTEGER NOT NULL DEFAULT 1,
    ping_time   INTEGER,
    copy_time   INTEGER
);

CREATE TABLE IF NOT EXISTS vault (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    storage_node_id     INTEGER NOT NULL REFERENCES storage_node(id),
    local_directory_id  INTEGER NOT NULL REFERENCES local_directory(id),
    compress            INTEGER NOT NULL DEFAULT 0,
    encrypt             INTEGER NOT NULL DEFAULT 0,
    UNIQUE(storage_node_id, local_directory_id)
);

CREATE TABLE IF NOT EXISTS vault_file (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    vault_id        INTEGER NOT NULL REFERENCES vault(id),
    local_file_id   INTEGER NOT NULL REFERENCES local_file(id),
    create_time     INTEGER NOT NULL,
    modify_time     INTEGER NOT NULL,
    origin_filesize INTEGER NOT NULL,
    block_count     INTEGER NOT NULL,
    user_perms      TEXT NOT NULL,
    group_perms     TEXT NOT NULL,
    other_perms     TEXT NOT NULL,
    UNIQUE(vault_id, local_file_id)
);

CREATE TABLE IF NOT EXISTS vault_file_block (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    vault_file_id           INTEGER NOT NULL REFERENCES vault_file(id),
    create_time             INTEGER NOT NULL,
    modify_time             INTEGER NOT NULL,
    stored_time             INTEGER NOT NULL,
    origin_filesize         INTEGER NOT NULL,
    stored_filesize         INTEGER NOT NULL,
    block_sequence_number   INTEGER NOT NULL,
    pad_char_count          INTEGER NOT NULL,
    unique_identifier       TEXT NOT NULL,
    node_directory          TEXT NOT NULL,
    node_file               TEXT NOT NULL,
    UNIQUE(vault_file_id, block_sequence_number)
);
"#;
