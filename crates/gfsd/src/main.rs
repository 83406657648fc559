//! The block store server binary: pre-creates buckets, accepts TCP
//! connections thread-per-connection, and dispatches the wire commands
//! (spec §6) against a [`gfs_block_store::BlockStore`].

use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use gfs_block_store::BlockStore;
use gfs_wire::{headers, list, read_frame, write_frame, Message};

#[derive(Parser, Debug)]
#[command(name = "gfsd", about = "GFS block store server")]
struct Args {
    /// Root directory the content-addressed store is rooted at.
    #[arg(long)]
    base_dir: PathBuf,

    /// Address to accept connections on.
    #[arg(long, default_value = "127.0.0.1:9000")]
    listen: String,
}

fn main() -> std::io::Result<()> {
    gfs_telemetry::init_json_logging();
    let args = Args::parse();

    let store = match BlockStore::open(&args.base_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "xattr-backed block store failed to initialize, terminating");
            std::process::exit(1);
        }
    };

    let listener = TcpListener::bind(&args.listen)?;
    tracing::info!(listen = %args.listen, base_dir = %args.base_dir.display(), "gfsd listening");

    for incoming in listener.incoming() {
        let stream = match incoming {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "failed to accept connection");
                continue;
            }
        };
        let store = Arc::clone(&store);
        thread::spawn(move || serve_connection(&store, stream));
    }
    Ok(())
}

fn serve_connection(store: &BlockStore, mut stream: TcpStream) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown".into());
    loop {
        let request = match read_frame(&mut stream) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(peer, error = %e, "connection closed");
                return;
            }
        };
        let response = dispatch(store, &request);
        if let Err(e) = write_frame(&mut stream, &response) {
            tracing::warn!(peer, error = %e, "failed to write response");
            return;
        }
    }
}

/// Dispatch one request to the block store and build its response message.
/// Exposed at crate-module level (not `pub`) purely so tests below can call
/// it without standing up a real TCP connection.
fn dispatch(store: &BlockStore, req: &Message) -> Message {
    match req.command.as_str() {
        "fileAdd" => dispatch_file_add(store, req),
        "fileUpdate" => dispatch_file_update(store, req),
        "fileDelete" => dispatch_file_delete(store, req),
        "fileRetrieve" => dispatch_file_retrieve(store, req),
        "fileId" => dispatch_file_id(store, req),
        "fileList" => dispatch_file_list(store, req),
        "dirList" => dispatch_dir_list(store),
        "cpuStat" | "deviceStat" | "ioStat" | "vmStat" | "infoSys" | "uptimeSys" | "deviceList"
        | "fileRetrieveLast" | "fileUpdateLast" => not_implemented(),
        other => {
            tracing::warn!(command = other, "unrecognized command");
            error_response(&format!("unrecognized command: {other}"))
        }
    }
}

fn dispatch_file_add(store: &BlockStore, req: &Message) -> Message {
    let Some(unique_id) = req.header(headers::UNIQUE_ID) else {
        return error_response("missing gfs_unique_id");
    };
    match store.file_add(unique_id, &req.payload) {
        Ok(result) => {
            tracing::debug!(unique_id, bucket = %result.bucket, "fileAdd");
            Message::new("fileAdd")
                .with_header(headers::RC, "true")
                .with_header(headers::UNIQUE_ID, result.unique_id)
                .with_header(headers::FILE, result.name)
                .with_header(headers::DIR, result.bucket)
        }
        Err(e) => {
            tracing::warn!(unique_id, error = %e, "fileAdd failed");
            error_response(&e.to_string())
        }
    }
}

fn dispatch_file_update(store: &BlockStore, req: &Message) -> Message {
    let (Some(dir), Some(file)) = (req.header(headers::DIR), req.header(headers::FILE)) else {
        return error_response("missing gfs_dir/gfs_file");
    };
    match store.file_update(dir, file, &req.payload) {
        Ok(result) => Message::new("fileUpdate")
            .with_header(headers::RC, "true")
            .with_header(headers::UNIQUE_ID, result.unique_id)
            .with_header(headers::FILE, result.name)
            .with_header(headers::DIR, result.bucket),
        Err(e) => {
            tracing::warn!(dir, file, error = %e, "fileUpdate failed");
            error_response(&e.to_string())
        }
    }
}

fn dispatch_file_delete(store: &BlockStore, req: &Message) -> Message {
    let (Some(dir), Some(file)) = (req.header(headers::DIR), req.header(headers::FILE)) else {
        return error_response("missing gfs_dir/gfs_file");
    };
    match store.file_delete(dir, file) {
        Ok(()) => Message::new("fileDelete").with_header(headers::RC, "true"),
        Err(e) => {
            tracing::warn!(dir, file, error = %e, "fileDelete failed");
            error_response(&e.to_string())
        }
    }
}

fn dispatch_file_retrieve(store: &BlockStore, req: &Message) -> Message {
    let (Some(dir), Some(file)) = (req.header(headers::DIR), req.header(headers::FILE)) else {
        return error_response("missing gfs_dir/gfs_file");
    };
    match store.file_retrieve(dir, file) {
        Ok(bytes) => {
            Message::new("fileRetrieve").with_header(headers::RC, "true").with_payload(bytes)
        }
        Err(e) => {
            tracing::warn!(dir, file, error = %e, "fileRetrieve failed");
            error_response(&e.to_string())
        }
    }
}

fn dispatch_file_id(store: &BlockStore, req: &Message) -> Message {
    let (Some(dir), Some(file)) = (req.header(headers::DIR), req.header(headers::FILE)) else {
        return error_response("missing gfs_dir/gfs_file");
    };
    match store.file_id(dir, file) {
        Ok(unique_id) => Message::new("fileId")
            .with_header(headers::RC, "true")
            .with_header(headers::UNIQUE_ID, unique_id),
        Err(e) => {
            tracing::warn!(dir, file, error = %e, "fileId failed");
            error_response(&e.to_string())
        }
    }
}

fn dispatch_file_list(store: &BlockStore, req: &Message) -> Message {
    let Some(dir) = req.header(headers::DIR) else {
        return error_response("missing gfs_dir");
    };
    match store.file_list(dir) {
        Ok(names) => Message::new("fileList")
            .with_header(headers::RC, "true")
            .with_header(headers::FILE_LIST, list::encode(names)),
        Err(e) => {
            tracing::warn!(dir, error = %e, "fileList failed");
            error_response(&e.to_string())
        }
    }
}

fn dispatch_dir_list(store: &BlockStore) -> Message {
    match store.dir_list() {
        Ok(names) => Message::new("dirList")
            .with_header(headers::RC, "true")
            .with_header(headers::DIR_LIST, list::encode(names)),
        Err(e) => {
            tracing::warn!(error = %e, "dirList failed");
            error_response(&e.to_string())
        }
    }
}

fn not_implemented() -> Message {
    Message::new("admin").with_header(headers::RC, "false").with_header(headers::ERROR, "not implemented")
}

fn error_response(detail: &str) -> Message {
    Message::new("error").with_header(headers::RC, "false").with_header(headers::ERROR, detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, BlockStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn file_add_then_retrieve_round_trip() {
        let (_dir, store) = store();
        let unique_id = gfs_core::fingerprint_bytes(b"SGVsbG8=");
        let add_req = Message::new("fileAdd")
            .with_header(headers::UNIQUE_ID, &unique_id)
            .with_payload(b"SGVsbG8=".to_vec());
        let add_resp = dispatch(&store, &add_req);
        assert!(add_resp.rc_ok());
        let bucket = add_resp.header(headers::DIR).unwrap().to_string();

        let retrieve_req =
            Message::new("fileRetrieve").with_header(headers::DIR, &bucket).with_header(headers::FILE, &unique_id);
        let retrieve_resp = dispatch(&store, &retrieve_req);
        assert!(retrieve_resp.rc_ok());
        assert_eq!(retrieve_resp.payload, b"SGVsbG8=");
    }

    #[test]
    fn file_retrieve_missing_is_an_error_response() {
        let (_dir, store) = store();
        let req = Message::new("fileRetrieve").with_header(headers::DIR, "00").with_header(headers::FILE, "ghost");
        let resp = dispatch(&store, &req);
        assert!(!resp.rc_ok());
        assert!(resp.header(headers::ERROR).is_some());
    }

    #[test]
    fn admin_commands_are_stubbed() {
        let (_dir, store) = store();
        let resp = dispatch(&store, &Message::new("cpuStat"));
        assert!(!resp.rc_ok());
        assert_eq!(resp.header(headers::ERROR), Some("not implemented"));
    }

    #[test]
    fn dir_list_reports_precreated_buckets() {
        let (_dir, store) = store();
        let resp = dispatch(&store, &Message::new("dirList"));
        assert!(resp.rc_ok());
        let dirs = list::decode(resp.header(headers::DIR_LIST).unwrap());
        assert!(dirs.contains(&"00".to_string()));
        assert_eq!(dirs.len(), 100);
    }
}
