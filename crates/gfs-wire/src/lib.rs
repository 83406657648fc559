//! The wire protocol shared by [`gfs-node-client`] and the block store
//! server: a command name, a header map, and an opaque payload (spec §6),
//! framed as length-prefixed JSON over a byte stream.
//!
//! Connection establishment, retry, and raw socket framing are explicitly
//! an external transport collaborator per spec §4.7/§9; this crate is that
//! collaborator's reference implementation over `std::net::TcpStream`, kept
//! deliberately swappable.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while framing or parsing a [`Message`] on the wire.
#[derive(Debug, Error)]
pub enum WireError {
    /// The underlying stream failed.
    #[error("io: {0}")]
    Io(#[from] io::Error),
    /// The frame's JSON body could not be decoded.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The frame length prefix exceeded the configured maximum.
    #[error("frame of {0} bytes exceeds maximum frame size")]
    TooLarge(u32),
}

/// Messages are tagged `Text` or `Binary`; this system only ever sends `Text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// A UTF-8 wire form payload.
    Text,
    /// Reserved; unused by this system.
    Binary,
}

/// One request or response: a command name, a header map, and a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: Kind,
    pub command: String,
    pub headers: HashMap<String, String>,
    #[serde(with = "payload_as_base64")]
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a `Text`-kind request/response with no payload.
    pub fn new(command: impl Into<String>) -> Self {
        Self { kind: Kind::Text, command: command.into(), headers: HashMap::new(), payload: Vec::new() }
    }

    /// Attach a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Attach a payload (e.g. the base64 wire form of a block).
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Read a header, if present.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// True iff `gfs_rc` is the literal `"true"`.
    pub fn rc_ok(&self) -> bool {
        self.header(headers::RC) == Some("true")
    }
}

/// Well-known header keys (the `gfs_` prefix carries GFS semantics per spec §6).
pub mod headers {
    pub const FILE: &str = "gfs_file";
    pub const UNIQUE_ID: &str = "gfs_unique_id";
    pub const STORED_FS: &str = "gfs_stored_fs";
    pub const DIR: &str = "gfs_dir";
    pub const RC: &str = "gfs_rc";
    pub const ERROR: &str = "gfs_error";
    pub const FILE_LIST: &str = "gfs_fileList";
    pub const DIR_LIST: &str = "gfs_dirList";
}

/// `|`-separated list encoding used for `gfs_fileList`/`gfs_dirList`.
pub mod list {
    /// Join `items` with `|`. Items must not themselves contain `|`.
    pub fn encode<I: IntoIterator<Item = S>, S: AsRef<str>>(items: I) -> String {
        items.into_iter().map(|s| s.as_ref().to_string()).collect::<Vec<_>>().join("|")
    }

    /// Split a `|`-separated list; the empty string yields an empty list.
    pub fn decode(s: &str) -> Vec<String> {
        if s.is_empty() {
            Vec::new()
        } else {
            s.split('|').map(str::to_string).collect()
        }
    }
}

/// The largest frame this implementation will read, guarding against a
/// corrupt or hostile length prefix.
pub const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Write `msg` as a length-prefixed JSON frame: a 4-byte big-endian length
/// followed by that many bytes of JSON.
pub fn write_frame<W: Write>(w: &mut W, msg: &Message) -> Result<(), WireError> {
    let body = serde_json::to_vec(msg)?;
    let len = u32::try_from(body.len()).map_err(|_| WireError::TooLarge(u32::MAX))?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(&body)?;
    w.flush()?;
    Ok(())
}

/// Read one length-prefixed JSON frame written by [`write_frame`].
pub fn read_frame<R: Read>(r: &mut R) -> Result<Message, WireError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(WireError::TooLarge(len));
    }
    let mut body = vec![0u8; len as usize];
    r.read_exact(&mut body)?;
    let msg = serde_json::from_slice(&body)?;
    Ok(msg)
}

mod payload_as_base64 {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        BASE64.encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        BASE64.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_over_a_buffer() {
        let msg = Message::new("fileAdd")
            .with_header(headers::FILE, "abc123")
            .with_header(headers::UNIQUE_ID, "abc123")
            .with_payload(b"SGVsbG8=".to_vec());

        let mut buf = Vec::new();
        write_frame(&mut buf, &msg).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let got = read_frame(&mut cursor).unwrap();
        assert_eq!(got, msg);
    }

    #[test]
    fn list_encoding() {
        let encoded = list::encode(["a", "b", "c"]);
        assert_eq!(encoded, "a|b|c");
        assert_eq!(list::decode(&encoded), vec!["a", "b", "c"]);
        assert!(list::decode("").is_empty());
    }

    #[test]
    fn oversized_length_prefix_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame(&mut cursor).unwrap_err();
        assert!(matches!(err, WireError::TooLarge(_)));
    }
}
