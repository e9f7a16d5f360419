use serde::Serialize;
use tracing::{info, info_span};

/// Workspace lifecycle event for audit logging.
/// Structured for JSON serialization to enable machine-readable audit trails.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A workspace finished both attach steps.
    WorkspaceCreated {
        /// Workspace name.
        name: String,
        /// Merged view location.
        mount_path: String,
        /// Remote port used, if the source is remote.
        port: Option<u16>,
    },
    /// A failed create undid its earlier layers.
    CreateRolledBack {
        /// Workspace name.
        name: String,
        /// The error that triggered the rollback.
        reason: String,
    },
    /// A workspace was torn down; `errors` lists per-layer failures.
    WorkspaceDeleted {
        /// Workspace name.
        name: String,
        /// Logged, non-fatal failures.
        errors: Vec<String>,
    },
    /// A sweep was interrupted between workspaces.
    SweepCancelled {
        /// Workspaces already processed.
        processed: usize,
        /// Workspaces left untouched.
        remaining: usize,
    },
    /// A clean request hit the path policy.
    CleanRefused {
        /// Requested path.
        path: String,
        /// Policy message.
        reason: String,
    },
}

/// Logs an audit event to the dedicated audit channel as structured JSON.
/// This uses a specific `target` which can be filtered by the subscriber to redirect to a file.
pub fn log_audit(event: &AuditEvent) {
    let span = info_span!(target: "audit", "audit_event");
    let _enter = span.enter();

    let json = serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    info!(target: "audit", audit_json = %json, "Workspace audit event");
}
