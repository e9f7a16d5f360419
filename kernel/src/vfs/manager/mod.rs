//! Workspace lifecycle orchestration.
//!
//! This module composes mount driver calls into the create, delete and
//! list verbs, with port fallback, rollback of partial creates and
//! best-effort teardown.

pub mod lifecycle;
pub mod naming;
pub mod types;

// Re-export primary types for convenience
pub use lifecycle::WorkspaceManager;
pub use naming::generate_name;
pub use types::{
    CleanOutcome, CreatedWorkspace, DeleteOutcome, DeleteReport, DeleteTarget, FilesystemKind,
    SourceKind, Workspace, WorkspaceError, WorkspaceName,
};
