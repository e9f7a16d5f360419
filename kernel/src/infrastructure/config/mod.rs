//! Configuration management for cowspace.
//!
//! Settings are layered: built-in defaults, then an optional YAML file
//! (`~/.cowspace/config.yaml`, or the path given with `--config`), then
//! environment variables prefixed with `COWSPACE` using `__` as the section
//! separator.
//!
//! # Example
//!
//! ```no_run
//! use cowspace_kernel::infrastructure::config::Settings;
//!
//! let settings = Settings::load(None).expect("Failed to load configuration");
//! settings.validate().expect("Invalid configuration");
//! ```

pub mod overlay;
pub mod sshfs;
pub mod telemetry;
pub mod unmount;

pub use overlay::OverlaySettings;
pub use sshfs::SshfsSettings;
pub use telemetry::TelemetrySettings;
pub use unmount::UnmountSettings;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::vfs::paths::expand_home;

/// Default location of the user configuration file, relative to `$HOME`.
pub const DEFAULT_CONFIG_FILE: &str = "~/.cowspace/config.yaml";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    /// A mount root is empty or cannot be resolved.
    #[error("Invalid {section} root '{value}': {reason}")]
    InvalidRoot {
        /// Section owning the root (`overlay` or `sshfs`).
        section: &'static str,
        /// Raw configured value.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// Overlay and sshfs roots point at the same directory.
    #[error("overlay.root and sshfs.root must differ (both are '{0}')")]
    SharedRoot(PathBuf),
    /// No candidate port is configured, or a port is zero.
    #[error("Invalid sshfs.ports: {0}")]
    InvalidPorts(String),
    /// A helper program name is empty.
    #[error("Program for {0} must not be empty")]
    EmptyProgram(&'static str),
}

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    /// Union layer settings.
    pub overlay: OverlaySettings,
    /// Remote layer settings.
    pub sshfs: SshfsSettings,
    /// Unmount and mount-listing tools.
    pub unmount: UnmountSettings,
    /// Logging settings.
    pub telemetry: TelemetrySettings,
}

impl Settings {
    /// Loads settings from defaults, the config file and the environment.
    ///
    /// When `file` is given it must exist; otherwise the default file is
    /// read only if present.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or deserialized.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match file {
            Some(p) => (p.to_path_buf(), true),
            None => (expand_home(DEFAULT_CONFIG_FILE), false),
        };

        let mut builder = Config::builder()
            .set_default("overlay.root", overlay::DEFAULT_ROOT)?
            .set_default("sshfs.root", sshfs::DEFAULT_ROOT)?
            .set_default("telemetry.log_level", "info")?;

        // An unresolvable home directory expands to an empty path; skip the file then.
        if !path.as_os_str().is_empty() {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Yaml)
                    .required(required),
            );
        }

        let s = builder
            .add_source(
                Environment::with_prefix("COWSPACE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("sshfs.ports")
                    .with_list_parse_key("sshfs.options"),
            )
            .build()?;

        Ok(s.try_deserialize()?)
    }

    /// Checks the invariants the orchestrator relies on.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let overlay_root = resolve_root("overlay", &self.overlay.root)?;
        let sshfs_root = resolve_root("sshfs", &self.sshfs.root)?;
        if overlay_root == sshfs_root {
            return Err(ConfigError::SharedRoot(overlay_root));
        }

        if self.sshfs.ports.is_empty() {
            return Err(ConfigError::InvalidPorts("at least one port is required".into()));
        }
        if self.sshfs.ports.contains(&0) {
            return Err(ConfigError::InvalidPorts("port 0 is not usable".into()));
        }

        for (what, program) in [
            ("overlay.program", &self.overlay.program),
            ("sshfs.program", &self.sshfs.program),
            ("unmount.fusermount", &self.unmount.fusermount),
            ("unmount.umount", &self.unmount.umount),
            ("unmount.list", &self.unmount.list),
        ] {
            if program.trim().is_empty() {
                return Err(ConfigError::EmptyProgram(what));
            }
        }

        Ok(())
    }

    /// Resolved overlay root (home-expanded).
    #[must_use]
    pub fn overlay_root(&self) -> PathBuf {
        expand_home(&self.overlay.root)
    }

    /// Resolved sshfs root (home-expanded).
    #[must_use]
    pub fn sshfs_root(&self) -> PathBuf {
        expand_home(&self.sshfs.root)
    }
}

fn resolve_root(section: &'static str, raw: &str) -> Result<PathBuf, ConfigError> {
    let invalid = |reason| ConfigError::InvalidRoot {
        section,
        value: raw.to_string(),
        reason,
    };

    if raw.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    let path = expand_home(raw);
    if path.as_os_str().is_empty() {
        return Err(invalid("home directory cannot be determined"));
    }
    if !path.is_absolute() {
        return Err(invalid("must be an absolute path"));
    }
    Ok(path.components().collect())
}
