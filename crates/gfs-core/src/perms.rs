//! Conversion between POSIX permission bits and the canonical `rwx`/`-` triples
//! stored on `VaultFile`.

use std::fmt;

/// One `rwx`/`-` permission triple, e.g. `"rwx"`, `"r--"`, `"---"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermTriple {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl PermTriple {
    /// Decode three POSIX bits (order: read, write, execute).
    pub fn from_bits(bits: u32) -> Self {
        Self { read: bits & 0b100 != 0, write: bits & 0b010 != 0, execute: bits & 0b001 != 0 }
    }

    /// Re-encode as the three low bits of a mode nibble.
    pub fn to_bits(self) -> u32 {
        (self.read as u32) << 2 | (self.write as u32) << 1 | (self.execute as u32)
    }

    /// Parse a three-character `"rwx"`/`"-"` string.
    pub fn parse(s: &str) -> Option<Self> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 3 {
            return None;
        }
        let read = match chars[0] {
            'r' => true,
            '-' => false,
            _ => return None,
        };
        let write = match chars[1] {
            'w' => true,
            '-' => false,
            _ => return None,
        };
        let execute = match chars[2] {
            'x' => true,
            '-' => false,
            _ => return None,
        };
        Some(Self { read, write, execute })
    }
}

impl fmt::Display for PermTriple {
    /// Render as `"rwx"`/`"r--"`/etc.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.read { 'r' } else { '-' },
            if self.write { 'w' } else { '-' },
            if self.execute { 'x' } else { '-' },
        )
    }
}

/// The three permission triples (user, group, other) that make up a POSIX mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub user: PermTriple,
    pub group: PermTriple,
    pub other: PermTriple,
}

impl Permissions {
    /// Decode the nine standard bits of a POSIX `mode_t`.
    pub fn from_mode(mode: u32) -> Self {
        Self {
            user: PermTriple::from_bits((mode >> 6) & 0o7),
            group: PermTriple::from_bits((mode >> 3) & 0o7),
            other: PermTriple::from_bits(mode & 0o7),
        }
    }

    /// Re-encode the nine standard bits.
    pub fn to_mode(self) -> u32 {
        (self.user.to_bits() << 6) | (self.group.to_bits() << 3) | self.other.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_over_nine_bits() {
        for mode in [0o000u32, 0o644, 0o755, 0o700, 0o777, 0o640] {
            let perms = Permissions::from_mode(mode);
            assert_eq!(perms.to_mode(), mode);
        }
    }

    #[test]
    fn triple_string_form() {
        assert_eq!(PermTriple::from_bits(0b111).to_string(), "rwx");
        assert_eq!(PermTriple::from_bits(0b100).to_string(), "r--");
        assert_eq!(PermTriple::from_bits(0).to_string(), "---");
        assert_eq!(PermTriple::parse("rwx"), Some(PermTriple::from_bits(0b111)));
        assert_eq!(PermTriple::parse("bogus"), None);
    }
}
