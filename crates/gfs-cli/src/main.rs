//! The outer CLI: register directories and nodes, drive a sync, and
//! restore from a node back to a local tree.

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use config::Config;
use gfs_catalog::{
    delete_local_directory, delete_storage_node, get_local_directory_by_path, get_local_file,
    get_local_files_for_directory, get_storage_node_by_name, insert_local_directory, insert_storage_node,
    list_active_storage_nodes, list_storage_nodes, Catalog, LocalDirectory, StorageNode,
};
use gfs_core::{Error, Result};
use gfs_node_client::NodeClient;
use gfs_sync::{Replicator, Restorer, Scanner};
use gfs_wire::Message;

#[derive(Parser, Debug)]
#[command(name = "gfs", about = "Multi-node backup/replication client")]
struct Cli {
    /// INI configuration file (node addresses, exclusions).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog database file.
    #[arg(long, global = true, default_value = gfs_catalog::DEFAULT_CATALOG_FILENAME)]
    catalog: PathBuf,

    /// 32-byte AES key, hex-encoded, required for any directory/vault with `encrypt` set.
    #[arg(long, global = true)]
    key_hex: Option<String>,

    /// Request timeout against a node, in milliseconds.
    #[arg(long, global = true, default_value_t = 10_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a local directory as a scan root.
    InitDirectory {
        path: String,
        #[arg(long, default_value_t = true)]
        recurse: bool,
        #[arg(long, default_value_t = false)]
        compress: bool,
        #[arg(long, default_value_t = false)]
        encrypt: bool,
    },
    /// Scan a registered directory and replicate changed files to every active node.
    Sync { path: String },
    /// List files known to the catalog under a registered directory.
    ListFiles { path: String },
    /// List storage nodes known to the catalog.
    ListNodes,
    /// Register a storage node.
    AddNode { name: String },
    /// Logically deactivate a storage node.
    RemoveNode { name: String },
    /// Physically deregister a local directory and its catalog rows.
    RemoveDirectory { path: String },
    /// Restore every file of a directory from one node.
    Restore { node: String, source: String, target: PathBuf },
    /// Restore only files whose relative path starts with `prefix`.
    RestoreSubdir { node: String, source: String, target: PathBuf, prefix: String },
    /// Restore a single file by its relative path.
    RestoreFile { node: String, source: String, target: PathBuf, relative_path: String },
    /// Send a stubbed admin command to a node (cpuStat, deviceStat, ...).
    Probe { node: String, command: String },
}

fn main() -> ExitCode {
    gfs_telemetry::init_json_logging();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => Config::load(path).map_err(|e| Error::Storage(e.to_string()))?,
        None => Config::empty(),
    };
    let key = match &cli.key_hex {
        Some(hex) => Some(decode_hex_key(hex)?),
        None => None,
    };

    let mut catalog = Catalog::open(&cli.catalog)?;

    match &cli.cmd {
        Command::InitDirectory { path, recurse, compress, encrypt } => {
            init_directory(&mut catalog, path, *recurse, *compress, *encrypt)?;
            Ok(true)
        }
        Command::Sync { path } => sync(&mut catalog, &config, path, key, cli.timeout_ms),
        Command::ListFiles { path } => {
            list_files(&catalog, path)?;
            Ok(true)
        }
        Command::ListNodes => {
            list_nodes(&catalog)?;
            Ok(true)
        }
        Command::AddNode { name } => {
            add_node(&mut catalog, name)?;
            Ok(true)
        }
        Command::RemoveNode { name } => {
            remove_node(&mut catalog, name)?;
            Ok(true)
        }
        Command::RemoveDirectory { path } => {
            remove_directory(&mut catalog, path)?;
            Ok(true)
        }
        Command::Restore { node, source, target } => {
            let ctx = RestoreContext { catalog: &catalog, config: &config, node, source, target, key, timeout_ms: cli.timeout_ms };
            restore(&ctx)
        }
        Command::RestoreSubdir { node, source, target, prefix } => {
            let ctx = RestoreContext { catalog: &catalog, config: &config, node, source, target, key, timeout_ms: cli.timeout_ms };
            restore_subdir(&ctx, prefix)
        }
        Command::RestoreFile { node, source, target, relative_path } => {
            let ctx = RestoreContext { catalog: &catalog, config: &config, node, source, target, key, timeout_ms: cli.timeout_ms };
            restore_file(&ctx, relative_path)
        }
        Command::Probe { node, command } => probe(&config, node, command, cli.timeout_ms),
    }
}

/// Bundles the parameters every `restore*` subcommand shares.
struct RestoreContext<'a> {
    catalog: &'a Catalog,
    config: &'a Config,
    node: &'a str,
    source: &'a str,
    target: &'a Path,
    key: Option<Vec<u8>>,
    timeout_ms: u64,
}

fn decode_hex_key(hex: &str) -> Result<Vec<u8>> {
    if hex.len() != 64 {
        return Err(Error::BadKey(hex.len() / 2));
    }
    let mut bytes = Vec::with_capacity(32);
    for i in (0..hex.len()).step_by(2) {
        let byte = u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|e| Error::DecodeError(format!("bad key hex: {e}")))?;
        bytes.push(byte);
    }
    Ok(bytes)
}

fn init_directory(
    catalog: &mut Catalog,
    path: &str,
    recurse: bool,
    compress: bool,
    encrypt: bool,
) -> Result<()> {
    if get_local_directory_by_path(catalog.connection(), path)?.is_some() {
        println!("{path} is already registered");
        return Ok(());
    }
    let mut dir =
        LocalDirectory { id: 0, path: path.to_string(), active: true, recurse, compress, encrypt, copy_count: 0 };
    insert_local_directory(catalog.connection(), &mut dir)?;
    println!("registered directory {path} (id={})", dir.id);
    Ok(())
}

fn require_directory(catalog: &Catalog, path: &str) -> Result<LocalDirectory> {
    get_local_directory_by_path(catalog.connection(), path)?
        .ok_or_else(|| Error::NotFound(format!("local directory {path}")))
}

fn require_node(catalog: &Catalog, name: &str) -> Result<StorageNode> {
    get_storage_node_by_name(catalog.connection(), name)?
        .ok_or_else(|| Error::NotFound(format!("storage node {name}")))
}

fn sync(
    catalog: &mut Catalog,
    config: &Config,
    path: &str,
    key: Option<Vec<u8>>,
    timeout_ms: u64,
) -> Result<bool> {
    let dir = require_directory(catalog, path)?;
    let active_nodes = list_active_storage_nodes(catalog.connection())?;
    let exclusions = config.exclusions.for_directory(path);
    let client = NodeClient::new(config.roster.clone(), Duration::from_millis(timeout_ms));
    let replicator = Replicator::new(client, key);
    let scanner = Scanner::new(&exclusions);

    let summary = scanner.scan_directory(catalog, &replicator, &dir, &active_nodes)?;
    println!("scanned {} files, {} failed", summary.files_scanned, summary.files_failed);
    Ok(summary.files_failed == 0)
}

fn list_files(catalog: &Catalog, path: &str) -> Result<()> {
    let dir = require_directory(catalog, path)?;
    for file in get_local_files_for_directory(catalog.connection(), dir.id)? {
        println!("{}", file.relative_path);
    }
    Ok(())
}

fn list_nodes(catalog: &Catalog) -> Result<()> {
    for node in list_storage_nodes(catalog.connection())? {
        println!("{}\t{}", node.node_name, if node.active { "active" } else { "inactive" });
    }
    Ok(())
}

fn add_node(catalog: &mut Catalog, name: &str) -> Result<()> {
    if get_storage_node_by_name(catalog.connection(), name)?.is_some() {
        println!("{name} is already registered");
        return Ok(());
    }
    let mut node = StorageNode { id: 0, node_name: name.to_string(), active: true, ping_time: None, copy_time: None };
    insert_storage_node(catalog.connection(), &mut node)?;
    println!("registered node {name} (id={})", node.id);
    Ok(())
}

fn remove_node(catalog: &mut Catalog, name: &str) -> Result<()> {
    let mut node = require_node(catalog, name)?;
    delete_storage_node(catalog.connection(), &mut node)?;
    println!("deactivated node {name}");
    Ok(())
}

fn remove_directory(catalog: &mut Catalog, path: &str) -> Result<()> {
    let mut dir = require_directory(catalog, path)?;
    delete_local_directory(catalog.connection(), &mut dir)?;
    println!("deregistered directory {path}");
    Ok(())
}

fn restore(ctx: &RestoreContext) -> Result<bool> {
    let dir = require_directory(ctx.catalog, ctx.source)?;
    let node = require_node(ctx.catalog, ctx.node)?;
    let client = NodeClient::new(ctx.config.roster.clone(), Duration::from_millis(ctx.timeout_ms));
    let restorer = Restorer::new(client, ctx.key.clone());
    let summary = restorer.restore(ctx.catalog, ctx.node, &node, &dir, ctx.target)?;
    println!("restored {} files, {} failed", summary.files_restored, summary.files_failed);
    Ok(summary.files_failed == 0)
}

fn restore_subdir(ctx: &RestoreContext, prefix: &str) -> Result<bool> {
    let dir = require_directory(ctx.catalog, ctx.source)?;
    let node = require_node(ctx.catalog, ctx.node)?;
    let client = NodeClient::new(ctx.config.roster.clone(), Duration::from_millis(ctx.timeout_ms));
    let restorer = Restorer::new(client, ctx.key.clone());

    let mut failed = 0u64;
    let mut restored = 0u64;
    for file in get_local_files_for_directory(ctx.catalog.connection(), dir.id)? {
        if !file.relative_path.starts_with(prefix) {
            continue;
        }
        match restorer.restore_one(ctx.catalog, ctx.node, &node, &dir, &file, ctx.target) {
            Ok(()) => restored += 1,
            Err(e) => {
                tracing::warn!(file = %file.relative_path, error = %e, "restore failed");
                failed += 1;
            }
        }
    }
    println!("restored {restored} files, {failed} failed");
    Ok(failed == 0)
}

fn restore_file(ctx: &RestoreContext, relative_path: &str) -> Result<bool> {
    let dir = require_directory(ctx.catalog, ctx.source)?;
    let node = require_node(ctx.catalog, ctx.node)?;
    let file = get_local_file(ctx.catalog.connection(), dir.id, relative_path)?
        .ok_or_else(|| Error::NotFound(format!("local file {relative_path}")))?;
    let client = NodeClient::new(ctx.config.roster.clone(), Duration::from_millis(ctx.timeout_ms));
    let restorer = Restorer::new(client, ctx.key.clone());
    restorer.restore_one(ctx.catalog, ctx.node, &node, &dir, &file, ctx.target)?;
    println!("restored {relative_path}");
    Ok(true)
}

fn probe(config: &Config, node_name: &str, command: &str, timeout_ms: u64) -> Result<bool> {
    let client = NodeClient::new(config.roster.clone(), Duration::from_millis(timeout_ms));
    let response = client.send(node_name, &Message::new(command))?;
    if response.rc_ok() {
        println!("ok");
        Ok(true)
    } else {
        println!("{}", response.header(gfs_wire::headers::ERROR).unwrap_or("not implemented"));
        Ok(false)
    }
}
