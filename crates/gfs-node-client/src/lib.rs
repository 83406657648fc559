//! C7 — the node client: `send(node_name, request) -> response`, a thin
//! synchronous RPC over [`gfs-wire`]. Connection establishment, framing, and
//! retry are delegated to the transport; this crate resolves a node name to
//! an address via a [`NodeRoster`] and blocks on one request at a time.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use gfs_core::error::{Error, Result};
use gfs_wire::{read_frame, write_frame, Message};

/// Maps opaque node names (resolved elsewhere, e.g. from `[<service-name>]`
/// INI sections) to a `host:port` the transport can dial.
#[derive(Debug, Clone, Default)]
pub struct NodeRoster {
    addresses: HashMap<String, String>,
}

impl NodeRoster {
    /// An empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the address for `node_name`.
    pub fn register(&mut self, node_name: impl Into<String>, address: impl Into<String>) {
        self.addresses.insert(node_name.into(), address.into());
    }

    /// Look up the address for `node_name`.
    pub fn address_of(&self, node_name: &str) -> Option<&str> {
        self.addresses.get(node_name).map(String::as_str)
    }
}

/// A synchronous client capable of sending one message to one named node at
/// a time and awaiting its typed response.
pub struct NodeClient {
    roster: NodeRoster,
    timeout: Duration,
}

impl NodeClient {
    /// Build a client over `roster` with the given per-request timeout.
    pub fn new(roster: NodeRoster, timeout: Duration) -> Self {
        Self { roster, timeout }
    }

    /// Send `request` to `node_name` and block until the response arrives,
    /// the connection errors, or `timeout` elapses.
    pub fn send(&self, node_name: &str, request: &Message) -> Result<Message> {
        let address = self
            .roster
            .address_of(node_name)
            .ok_or_else(|| Error::NodeUnavailable(node_name.to_string()))?;

        let addr = address
            .to_socket_addrs()
            .map_err(|e| Error::TransportError { node: node_name.to_string(), detail: e.to_string() })?
            .next()
            .ok_or_else(|| Error::NodeUnavailable(node_name.to_string()))?;

        let mut stream = TcpStream::connect_timeout(&addr, self.timeout).map_err(|e| {
            if e.kind() == ErrorKind::TimedOut {
                Error::Timeout(node_name.to_string())
            } else {
                Error::NodeUnavailable(format!("{node_name}: {e}"))
            }
        })?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| Error::TransportError { node: node_name.to_string(), detail: e.to_string() })?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| Error::TransportError { node: node_name.to_string(), detail: e.to_string() })?;

        write_frame(&mut stream, request).map_err(|e| map_wire_err(node_name, e))?;
        let response = read_frame(&mut stream).map_err(|e| map_wire_err(node_name, e))?;

        tracing::debug!(node = node_name, command = %request.command, "node client request completed");
        Ok(response)
    }
}

fn map_wire_err(node_name: &str, e: gfs_wire::WireError) -> Error {
    if let gfs_wire::WireError::Io(io_err) = &e {
        if matches!(io_err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) {
            return Error::Timeout(node_name.to_string());
        }
    }
    Error::TransportError { node: node_name.to_string(), detail: e.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfs_wire::headers;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn send_round_trip_against_a_local_echo_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let req = gfs_wire::read_frame(&mut stream).unwrap();
            assert_eq!(req.command, "fileId");
            let resp = Message::new("fileId")
                .with_header(headers::RC, "true")
                .with_header(headers::UNIQUE_ID, "deadbeef");
            gfs_wire::write_frame(&mut stream, &resp).unwrap();
        });

        let mut roster = NodeRoster::new();
        roster.register("node-a", addr.to_string());
        let client = NodeClient::new(roster, Duration::from_secs(2));

        let req = Message::new("fileId").with_header(headers::DIR, "42").with_header(headers::FILE, "x");
        let resp = client.send("node-a", &req).unwrap();
        assert!(resp.rc_ok());
        assert_eq!(resp.header(headers::UNIQUE_ID), Some("deadbeef"));

        handle.join().unwrap();
    }

    #[test]
    fn unregistered_node_is_unavailable() {
        let client = NodeClient::new(NodeRoster::new(), Duration::from_millis(100));
        let err = client.send("ghost", &Message::new("fileId")).unwrap_err();
        assert!(matches!(err, Error::NodeUnavailable(_)));
    }
}
