/// Audit logging for workspace lifecycle events.
pub mod audit;
/// Configuration management.
pub mod config;
/// Telemetry setup for logging.
pub mod telemetry;
