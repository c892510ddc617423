//! Input-safety and file-trust primitives for the TeamDesk desktop application.
//!
//! Every untrusted string that flows into a filesystem operation, a subprocess
//! argument, or a log line passes through this crate first: path and command
//! validation is strict allowlisting that fails closed, file contents can be
//! paired with checksum sidecars so silent corruption is detected at load time,
//! and personally identifiable information is masked before anything reaches
//! the audit trail or the application logs.

pub mod audit;
pub mod command;
pub mod fs;
pub mod integrity;
pub mod path;
pub mod privacy;
