//! Parser for `mount` listing output.
//!
//! Each line reads `<source> on <mountpoint> type <fstype> (<options>)`.
//! Mount points may contain spaces, so the mount point is everything
//! between the first ` on ` and the last ` type `.

use std::path::PathBuf;

/// One line of the mount listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Device or remote spec.
    pub source: String,
    /// Decoded mount point.
    pub mount_point: PathBuf,
    /// Filesystem type token, e.g. `fuse.sshfs`.
    pub fs_type: String,
}

/// Parses one listing line. Returns `None` for lines that do not have the
/// expected shape.
#[must_use]
pub fn parse_line(line: &str) -> Option<MountEntry> {
    let (source, rest) = line.split_once(" on ")?;
    let (mount_point, tail) = rest.rsplit_once(" type ")?;
    let fs_type = tail.split_whitespace().next()?;
    if mount_point.is_empty() {
        return None;
    }

    Some(MountEntry {
        source: source.to_string(),
        mount_point: PathBuf::from(decode_octal(mount_point)),
        fs_type: fs_type.to_string(),
    })
}

/// Parses a full listing, skipping malformed lines.
pub fn parse(output: &str) -> impl Iterator<Item = MountEntry> + '_ {
    output.lines().filter_map(parse_line)
}

/// Decodes `\ooo` octal escapes (`\040` for space, `\011` for tab).
#[must_use]
pub fn decode_octal(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && is_octal_triplet(&bytes[i + 1..]) {
            let value = (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_triplet(bytes: &[u8]) -> bool {
    bytes.len() >= 3
        && bytes[0] <= b'3'
        && bytes[..3].iter().all(|b| (b'0'..=b'7').contains(b))
}
