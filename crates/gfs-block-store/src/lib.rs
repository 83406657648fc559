//! C10 — the server-side content-addressed block store: a bucketed
//! `<base>/<bucket>/<unique_id>` layout with a reference count held in the
//! `refcount` extended attribute (spec §4.10).
//!
//! All operations are stateless across requests; the xattr is the sole
//! source of truth for reference counts. Writers serialize per-path via an
//! in-memory lock table (grounded in `blob_store`'s atomic
//! write-fsync-rename discipline, generalized to cover the refcount
//! bump/decrement critical section too); readers never lock, since content
//! is never rewritten in place.

#![deny(unsafe_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use gfs_core::error::{Error, Result};
use gfs_core::fingerprint::fingerprint_bytes;

/// Mode bits used for pre-created bucket directories (spec §4.10).
#[cfg(unix)]
const BUCKET_MODE: u32 = 0o700;

/// The xattr name refcounts are stored under. Some filesystems namespace
/// user-writable xattrs under `user.`; we try the bare name first and fall
/// back to the namespaced one transparently.
const REFCOUNT_ATTR_CANDIDATES: [&str; 2] = ["refcount", "user.refcount"];

/// Outcome of a successful `fileAdd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddResult {
    pub unique_id: String,
    pub bucket: String,
    pub name: String,
}

/// Derive the two-digit bucket for `unique_id`: the first two decimal
/// digits found in the hex string, after skipping non-digit hex characters
/// and any leading zeros among the digits found. Fewer than two digits
/// falls back to `"00"`.
pub fn bucket_for(unique_id: &str) -> String {
    let digits: Vec<char> = unique_id.chars().filter(char::is_ascii_digit).collect();
    let first_nonzero = digits.iter().position(|&c| c != '0').unwrap_or(digits.len());
    let trimmed = &digits[first_nonzero..];
    if trimmed.len() < 2 {
        "00".to_string()
    } else {
        format!("{}{}", trimmed[0], trimmed[1])
    }
}

/// The server-side block store rooted at a base directory.
pub struct BlockStore {
    root: PathBuf,
    path_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl BlockStore {
    /// Open (or create) a store rooted at `root`, pre-creating buckets
    /// `00`..`99` with mode `0700` as spec'd for server startup.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let store = Self { root, path_locks: DashMap::new() };
        store.ensure_buckets()?;
        Ok(store)
    }

    fn ensure_buckets(&self) -> Result<()> {
        for tens in 0..10 {
            for ones in 0..10 {
                let bucket = format!("{tens}{ones}");
                let dir = self.root.join(&bucket);
                fs::create_dir_all(&dir)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(&dir, fs::Permissions::from_mode(BUCKET_MODE))?;
                }
            }
        }
        Ok(())
    }

    fn path(&self, dir: &str, name: &str) -> PathBuf {
        self.root.join(dir).join(name)
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.path_locks.entry(path.to_path_buf()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// `fileAdd(name, payload, unique_id)`: bump the refcount if the block
    /// already exists, otherwise write it, verify it, and seed the refcount
    /// at 1.
    pub fn file_add(&self, unique_id: &str, payload: &[u8]) -> Result<AddResult> {
        let bucket = bucket_for(unique_id);
        let path = self.path(&bucket, unique_id);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().unwrap();

        if path.exists() {
            increment_refcount(&path)?;
            return Ok(AddResult { unique_id: unique_id.to_string(), bucket, name: unique_id.to_string() });
        }

        let tmp_path = path.with_extension(format!("tmp-{}", std::process::id()));
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(payload)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        let stored = fs::read(&path)?;
        let actual = fingerprint_bytes(&stored);
        if actual != unique_id {
            let _ = fs::remove_file(&path);
            return Err(Error::IntegrityMismatch {
                key: unique_id.to_string(),
                detail: format!("stored content fingerprints to {actual}"),
            });
        }

        set_refcount(&path, 1)?;
        tracing::debug!(unique_id, bucket, "block stored");
        Ok(AddResult { unique_id: unique_id.to_string(), bucket, name: unique_id.to_string() })
    }

    /// `fileUpdate(dir, name, payload)`: names are content-derived, so a
    /// changed-content update moves the block to a new `(dir, name)` and
    /// decrements the old one's refcount.
    pub fn file_update(&self, dir: &str, name: &str, payload: &[u8]) -> Result<AddResult> {
        let new_id = fingerprint_bytes(payload);
        if new_id == name {
            let bucket = bucket_for(name);
            return Ok(AddResult { unique_id: name.to_string(), bucket, name: name.to_string() });
        }
        self.file_delete(dir, name)?;
        self.file_add(&new_id, payload)
    }

    /// `fileDelete(dir, name)`: decrement if shared, unlink if the last
    /// reference, `NotFound` if the block does not exist.
    pub fn file_delete(&self, dir: &str, name: &str) -> Result<()> {
        let path = self.path(dir, name);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().unwrap();

        if !path.exists() {
            return Err(Error::NotFound(format!("{dir}/{name}")));
        }
        let count = get_refcount(&path)?;
        if count > 1 {
            set_refcount(&path, count - 1)?;
        } else {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// `fileRetrieve(dir, name)`: verbatim on-disk bytes. No locking —
    /// content-addressed files are never rewritten in place.
    pub fn file_retrieve(&self, dir: &str, name: &str) -> Result<Vec<u8>> {
        let path = self.path(dir, name);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("{dir}/{name}"))
            } else {
                Error::IoError(e)
            }
        })
    }

    /// `fileList(dir)`: regular filenames under `<base>/<dir>`.
    pub fn file_list(&self, dir: &str) -> Result<Vec<String>> {
        let dir_path = self.root.join(dir);
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir_path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                out.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        out.sort();
        Ok(out)
    }

    /// `dirList()`: all subdirectory names under `<base>`.
    pub fn dir_list(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                out.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        out.sort();
        Ok(out)
    }

    /// `fileId(dir, name)`: fingerprint recomputed from stored bytes, used
    /// to audit drift between the name and actual content.
    pub fn file_id(&self, dir: &str, name: &str) -> Result<String> {
        let bytes = self.file_retrieve(dir, name)?;
        Ok(fingerprint_bytes(&bytes))
    }

    /// Current refcount for `(dir, name)`, for tests and audits.
    pub fn refcount(&self, dir: &str, name: &str) -> Result<u64> {
        get_refcount(&self.path(dir, name))
    }

    /// Whether `(dir, name)` currently exists on disk.
    pub fn exists(&self, dir: &str, name: &str) -> bool {
        self.path(dir, name).exists()
    }
}

fn get_refcount(path: &Path) -> Result<u64> {
    let mut last_err = None;
    for attr in REFCOUNT_ATTR_CANDIDATES {
        match xattr::get(path, attr) {
            Ok(Some(bytes)) => {
                let text = String::from_utf8_lossy(&bytes);
                return text
                    .trim()
                    .parse()
                    .map_err(|_| Error::Storage(format!("malformed refcount xattr on {path:?}")));
            }
            Ok(None) => continue,
            Err(e) => last_err = Some(xattr_error(e)),
        }
    }
    match last_err {
        Some(e @ Error::XAttrUnsupported(_)) => Err(e),
        _ => Err(Error::NotFound(format!("no refcount xattr on {path:?}"))),
    }
}

fn set_refcount(path: &Path, value: u64) -> Result<()> {
    let text = value.to_string();
    let mut last_err = None;
    for attr in REFCOUNT_ATTR_CANDIDATES {
        match xattr::set(path, attr, text.as_bytes()) {
            Ok(()) => return Ok(()),
            Err(e) => last_err = Some(xattr_error(e)),
        }
    }
    Err(last_err.expect("REFCOUNT_ATTR_CANDIDATES is non-empty"))
}

fn increment_refcount(path: &Path) -> Result<()> {
    let current = get_refcount(path)?;
    set_refcount(path, current + 1)
}

fn xattr_error(e: std::io::Error) -> Error {
    if e.raw_os_error() == Some(libc_enotsup()) {
        Error::XAttrUnsupported(e.to_string())
    } else {
        Error::IoError(e)
    }
}

fn libc_enotsup() -> i32 {
    // ENOTSUP / EOPNOTSUPP share a value on Linux; avoid pulling in libc for one constant.
    #[cfg(target_os = "linux")]
    {
        95
    }
    #[cfg(not(target_os = "linux"))]
    {
        45
    }
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
    fn buckets_precreated() {
        let (dir, _store) = store();
        assert!(dir.path().join("00").is_dir());
        assert!(dir.path().join("99").is_dir());
    }

    #[test]
    fn bucket_derivation_skips_non_digits_and_leading_zeros() {
        assert_eq!(bucket_for("0030abef"), "30");
        assert_eq!(bucket_for("abcdef"), "00");
        assert_eq!(bucket_for("a1bc"), "00");
    }

    #[test]
    fn s1_scenario_add_retrieve_refcount() {
        let (_dir, store) = store();
        let unique_id = fingerprint_bytes(b"SGVsbG8=");
        let res = store.file_add(&unique_id, b"SGVsbG8=").unwrap();
        assert_eq!(res.unique_id, unique_id);
        let bytes = store.file_retrieve(&res.bucket, &res.name).unwrap();
        assert_eq!(bytes, b"SGVsbG8=");
        assert_eq!(store.refcount(&res.bucket, &res.name).unwrap(), 1);
    }

    #[test]
    fn s2_scenario_dedup_increments_refcount() {
        let (_dir, store) = store();
        let unique_id = fingerprint_bytes(b"same-content");
        let first = store.file_add(&unique_id, b"same-content").unwrap();
        let second = store.file_add(&unique_id, b"same-content").unwrap();
        assert_eq!(first.bucket, second.bucket);
        assert_eq!(store.refcount(&first.bucket, &first.name).unwrap(), 2);
    }

    #[test]
    fn reference_count_soundness() {
        let (_dir, store) = store();
        let unique_id = fingerprint_bytes(b"payload");
        let res = store.file_add(&unique_id, b"payload").unwrap();
        store.file_add(&unique_id, b"payload").unwrap();
        store.file_add(&unique_id, b"payload").unwrap();
        assert_eq!(store.refcount(&res.bucket, &res.name).unwrap(), 3);

        store.file_delete(&res.bucket, &res.name).unwrap();
        assert_eq!(store.refcount(&res.bucket, &res.name).unwrap(), 2);
        store.file_delete(&res.bucket, &res.name).unwrap();
        assert!(store.exists(&res.bucket, &res.name));
        store.file_delete(&res.bucket, &res.name).unwrap();
        assert!(!store.exists(&res.bucket, &res.name));
    }

    #[test]
    fn delete_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.file_delete("00", "ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn file_update_moves_content_addressed_name() {
        let (_dir, store) = store();
        let old_id = fingerprint_bytes(b"old");
        let added = store.file_add(&old_id, b"old").unwrap();

        let new_id = fingerprint_bytes(b"new");
        let updated = store.file_update(&added.bucket, &added.name, b"new").unwrap();
        assert_eq!(updated.unique_id, new_id);
        assert!(!store.exists(&added.bucket, &added.name));
        assert!(store.exists(&updated.bucket, &updated.name));
    }

    #[test]
    fn file_update_noop_when_content_unchanged() {
        let (_dir, store) = store();
        let id = fingerprint_bytes(b"same");
        let added = store.file_add(&id, b"same").unwrap();
        let updated = store.file_update(&added.bucket, &added.name, b"same").unwrap();
        assert_eq!(updated.unique_id, id);
        assert!(store.exists(&added.bucket, &added.name));
    }

    #[test]
    fn file_list_and_dir_list() {
        let (_dir, store) = store();
        let id = fingerprint_bytes(b"listed");
        let added = store.file_add(&id, b"listed").unwrap();
        assert!(store.file_list(&added.bucket).unwrap().contains(&added.name));
        assert!(store.dir_list().unwrap().contains(&"00".to_string()));
    }

    #[test]
    fn file_id_detects_drift() {
        let (_dir, store) = store();
        let id = fingerprint_bytes(b"drift-me");
        let added = store.file_add(&id, b"drift-me").unwrap();
        assert_eq!(store.file_id(&added.bucket, &added.name).unwrap(), id);
    }
}
