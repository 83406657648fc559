//! C5 — per-directory exclusion filters (spec §4.5), loaded from the
//! `[Exclusions:<dir-path>]` sections of the INI configuration.
//!
//! Four disjoint lists gate directory traversal and file scanning:
//! `dir_names` / `dir_prefixes` decide whether a subdirectory is walked at
//! all; `file_names` / `file_suffixes` decide whether a file is opened.
//! Exclusions are advisory to the scanner — nothing here touches the
//! catalog directly.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::path::Path;

/// One directory's exclusion lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    dir_names: Vec<String>,
    dir_prefixes: Vec<String>,
    file_names: Vec<String>,
    file_suffixes: Vec<String>,
}

impl ExclusionSet {
    /// Build a set directly from its four lists (e.g. parsed from config).
    pub fn new(
        dir_names: Vec<String>,
        dir_prefixes: Vec<String>,
        file_names: Vec<String>,
        file_suffixes: Vec<String>,
    ) -> Self {
        Self { dir_names, dir_prefixes, file_names, file_suffixes }
    }

    /// True iff `basename` is excluded as a directory: an exact name match
    /// or a prefix match.
    pub fn exclude_directory(&self, basename: &str) -> bool {
        self.dir_names.iter().any(|n| n == basename)
            || self.dir_prefixes.iter().any(|p| basename.starts_with(p.as_str()))
    }

    /// True iff `basename` is excluded as a file: an exact name match or a
    /// suffix match.
    pub fn exclude_file(&self, basename: &str) -> bool {
        self.file_names.iter().any(|n| n == basename)
            || self.file_suffixes.iter().any(|s| basename.ends_with(s.as_str()))
    }
}

/// All exclusion sets known to the client, keyed by the local directory
/// path they apply to.
#[derive(Debug, Clone, Default)]
pub struct ExclusionConfig {
    by_directory: HashMap<String, ExclusionSet>,
}

impl ExclusionConfig {
    /// An empty configuration: nothing is ever excluded.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse `[Exclusions:<dir-path>]` sections out of an already-loaded
    /// INI document.
    pub fn from_ini(ini: &ini::Ini) -> Self {
        let mut by_directory = HashMap::new();
        for (section, props) in ini.iter() {
            let Some(section) = section else { continue };
            let Some(dir_path) = section.strip_prefix("Exclusions:") else { continue };
            let split_csv = |key: &str| -> Vec<String> {
                props
                    .get(key)
                    .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                    .unwrap_or_default()
            };
            let set = ExclusionSet::new(
                split_csv("dir_exclusion_names"),
                split_csv("dir_exclusion_prefixes"),
                split_csv("file_exclusion_names"),
                split_csv("file_exclusion_suffixes"),
            );
            by_directory.insert(dir_path.to_string(), set);
        }
        Self { by_directory }
    }

    /// Load a config file from disk and parse its `[Exclusions:*]` sections.
    pub fn load_from_file(path: &Path) -> Result<Self, ini::Error> {
        let ini = ini::Ini::load_from_file(path)?;
        Ok(Self::from_ini(&ini))
    }

    /// The exclusion set registered for `dir_path`, or an empty set if none
    /// was configured.
    pub fn for_directory(&self, dir_path: &str) -> ExclusionSet {
        self.by_directory.get(dir_path).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> ExclusionSet {
        ExclusionSet::new(
            vec![".git".into(), "node_modules".into()],
            vec![".cache".into()],
            vec![".DS_Store".into()],
            vec![".tmp".into(), ".swp".into()],
        )
    }

    #[test]
    fn exact_directory_names_excluded() {
        let s = set();
        assert!(s.exclude_directory(".git"));
        assert!(s.exclude_directory("node_modules"));
        assert!(!s.exclude_directory("src"));
    }

    #[test]
    fn directory_prefixes_excluded() {
        let s = set();
        assert!(s.exclude_directory(".cache-local"));
        assert!(!s.exclude_directory("localcache"));
    }

    #[test]
    fn exact_file_names_excluded() {
        let s = set();
        assert!(s.exclude_file(".DS_Store"));
        assert!(!s.exclude_file("main.rs"));
    }

    #[test]
    fn file_suffixes_excluded() {
        let s = set();
        assert!(s.exclude_file("scratch.tmp"));
        assert!(s.exclude_file("buffer.swp"));
        assert!(!s.exclude_file("main.rs"));
    }

    #[test]
    fn parses_ini_sections() {
        let text = "\
[Exclusions:/home/user/docs]
dir_exclusion_names = .git, node_modules
dir_exclusion_prefixes = .cache
file_exclusion_names = .DS_Store
file_exclusion_suffixes = .tmp, .swp
";
        let ini = ini::Ini::load_from_str(text).unwrap();
        let cfg = ExclusionConfig::from_ini(&ini);
        let s = cfg.for_directory("/home/user/docs");
        assert!(s.exclude_directory(".git"));
        assert!(s.exclude_file("notes.swp"));
        let empty = cfg.for_directory("/other");
        assert!(!empty.exclude_directory(".git"));
    }
}
