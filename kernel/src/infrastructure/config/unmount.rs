//! Unmount and mount-listing tools.

use serde::Deserialize;

/// Programs used to detach layers and to read the mount table.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UnmountSettings {
    /// FUSE unmount helper (`-u` graceful, `-uz` forced).
    pub fusermount: String,
    /// System unmount, used for the lazy (`-l`) last resort.
    pub umount: String,
    /// Mount-table listing command.
    pub list: String,
}

impl Default for UnmountSettings {
    fn default() -> Self {
        Self {
            fusermount: "fusermount".to_string(),
            umount: "umount".to_string(),
            list: "mount".to_string(),
        }
    }
}
