//! Union layer configuration.

use serde::Deserialize;

/// Default directory holding workspace mount points and their scaffolds.
pub const DEFAULT_ROOT: &str = "/mnt/cowspace/overlay";

/// Settings for the overlay (union) layer.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OverlaySettings {
    /// Directory whose direct children are workspace mount points.
    pub root: String,
    /// Union mount helper invoked as `<program> -o <opts> <mountpoint>`.
    pub program: String,
    /// When set, passes `index=on` or `index=off` to the union mount.
    pub index: Option<bool>,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            program: "fuse-overlayfs".to_string(),
            index: None,
        }
    }
}
