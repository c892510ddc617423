//! Audit logging for security-sensitive operations.
//!
//! Every sensitive action (record changes, report exports, backup and
//! restore, key access, login/logout) is recorded as a structured JSON event.
//! [`AuditLog::record`] is the only write path and it masks the actor id,
//! resource id, and details through the privacy module before the event is
//! built -- there is no API that accepts a pre-formatted, unmasked line.
//!
//! # Format
//!
//! Each line in the audit log is a complete JSON object (JSON Lines format),
//! easy to parse with standard tools or ingest into log aggregators.
//!
//! # Rotation
//!
//! [`FileAuditSink`] rotates the log file when it exceeds 10 MB, renaming the
//! current file with a timestamp suffix before starting a new one.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::privacy::mask_log_message;

/// Maximum audit log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Security-relevant actions tracked by the audit system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Create a record (developer, attendance entry, issue, ...).
    RecordCreate,
    /// Update a record.
    RecordUpdate,
    /// Delete a record.
    RecordDelete,
    /// Export a report file.
    ReportExport,
    /// Create an encrypted backup.
    BackupCreate,
    /// Restore from a backup.
    BackupRestore,
    /// Modify an application configuration value.
    ConfigChange,
    /// Read a key from the key container.
    KeyAccess,
    /// Export key material for backup.
    KeyExport,
    /// User login.
    Login,
    /// User logout.
    Logout,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RecordCreate => "record_create",
            Self::RecordUpdate => "record_update",
            Self::RecordDelete => "record_delete",
            Self::ReportExport => "report_export",
            Self::BackupCreate => "backup_create",
            Self::BackupRestore => "backup_restore",
            Self::ConfigChange => "config_change",
            Self::KeyAccess => "key_access",
            Self::KeyExport => "key_export",
            Self::Login => "login",
            Self::Logout => "logout",
        };
        write!(f, "{}", s)
    }
}

/// The kind of resource an audit event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Developer,
    Attendance,
    Issue,
    Report,
    Config,
    Backup,
    Key,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Developer => "developer",
            Self::Attendance => "attendance",
            Self::Issue => "issue",
            Self::Report => "report",
            Self::Config => "config",
            Self::Backup => "backup",
            Self::Key => "key",
        };
        write!(f, "{}", s)
    }
}

/// A single audit event. Actor, resource id, and details are stored in
/// masked form only; events are write-once and never edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC).
    pub timestamp: DateTime<Utc>,
    /// Who performed the action, masked.
    pub actor: String,
    /// What was done.
    pub action: AuditAction,
    /// What kind of resource was touched.
    pub resource_type: ResourceType,
    /// Which resource was touched, masked.
    pub resource_id: String,
    /// Free-form context, masked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] actor={} action={} resource={}:{}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.actor,
            self.action,
            self.resource_type,
            self.resource_id,
        )?;
        if let Some(details) = &self.details {
            write!(f, " details={}", details)?;
        }
        Ok(())
    }
}

/// Trait for audit event sinks.
///
/// Implementations must be safe to call from multiple threads and must make
/// a best effort to persist the event: a sink failure is logged but NOT
/// propagated, because audit logging must never fail the audited operation.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &AuditEvent);
}

/// The audit front door. Owns a sink and performs the mandatory masking and
/// timestamping on every recorded event.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record one audit event.
    ///
    /// `actor`, `resource_id`, and `details` pass through the privacy masks
    /// before the event is built; callers cannot bypass masking by
    /// pre-formatting.
    pub fn record(
        &self,
        actor: &str,
        action: AuditAction,
        resource_type: ResourceType,
        resource_id: &str,
        details: Option<&str>,
    ) {
        let event = AuditEvent {
            timestamp: Utc::now(),
            actor: mask_log_message(actor),
            action,
            resource_type,
            resource_id: mask_log_message(resource_id),
            details: details.map(mask_log_message),
        };
        self.sink.append(&event);
    }
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// FileAuditSink
// ---------------------------------------------------------------------------

/// Audit sink that writes JSON Lines to a file.
///
/// Thread-safe via an internal `Mutex`. Rotates the log file when it exceeds
/// [`MAX_LOG_SIZE`].
pub struct FileAuditSink {
    log_path: PathBuf,
    /// `None` if the file could not be opened.
    writer: Mutex<Option<BufWriter<File>>>,
}

impl FileAuditSink {
    /// Open (or create) the audit log at `log_path`, creating parent
    /// directories as needed.
    pub fn new(log_path: &Path) -> Result<Self, AuditError> {
        if let Some(parent) = log_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                info!(path = %parent.display(), "Created audit log directory");
            }
        }

        let file = Self::open_log_file(log_path)?;
        Ok(Self {
            log_path: log_path.to_path_buf(),
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    /// Rotate the log file if it exceeds the size limit.
    ///
    /// The current file is renamed to `<path>.<timestamp>` and a new file is
    /// opened. Returns `true` if rotation occurred.
    fn maybe_rotate(&self, guard: &mut Option<BufWriter<File>>) -> Result<bool, AuditError> {
        let metadata = match fs::metadata(&self.log_path) {
            Ok(m) => m,
            Err(_) => return Ok(false),
        };

        if metadata.len() < MAX_LOG_SIZE {
            return Ok(false);
        }

        if let Some(ref mut w) = guard {
            let _ = w.flush();
        }
        *guard = None;

        let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let rotated_path = PathBuf::from(format!("{}.{}", self.log_path.display(), timestamp));

        fs::rename(&self.log_path, &rotated_path)?;
        info!(
            old = %rotated_path.display(),
            new = %self.log_path.display(),
            "Rotated audit log"
        );

        let file = Self::open_log_file(&self.log_path)?;
        *guard = Some(BufWriter::new(file));
        Ok(true)
    }

    fn open_log_file(path: &Path) -> Result<File, AuditError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(file)
    }

    fn write_event(writer: &mut BufWriter<File>, event: &AuditEvent) -> Result<(), AuditError> {
        let json = serde_json::to_string(event)?;
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl AuditSink for FileAuditSink {
    fn append(&self, event: &AuditEvent) {
        let mut guard = match self.writer.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                error!("Audit sink mutex poisoned, recovering");
                poisoned.into_inner()
            }
        };

        if let Err(e) = self.maybe_rotate(&mut guard) {
            warn!(error = %e, "Failed to check/rotate audit log");
        }

        // Reopen after a failed rotation or initial open.
        if guard.is_none() {
            match Self::open_log_file(&self.log_path) {
                Ok(file) => *guard = Some(BufWriter::new(file)),
                Err(e) => {
                    error!(error = %e, event = %event, "Failed to open audit log, event lost");
                    return;
                }
            }
        }

        if let Some(ref mut writer) = *guard {
            if let Err(e) = Self::write_event(writer, event) {
                error!(error = %e, event = %event, "Failed to write audit event");
            }
        }
    }
}

impl fmt::Debug for FileAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileAuditSink")
            .field("log_path", &self.log_path)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// NullAuditSink / InMemoryAuditSink
// ---------------------------------------------------------------------------

/// A sink that discards all events, for environments where auditing is
/// explicitly disabled.
#[derive(Debug, Clone)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn append(&self, _event: &AuditEvent) {
        // Intentionally empty.
    }
}

/// A sink that stores events in memory, for tests that verify events were
/// emitted.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, event: &AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn in_memory_log() -> (AuditLog, Arc<InMemoryAuditSink>) {
        let sink = Arc::new(InMemoryAuditSink::new());
        (AuditLog::new(sink.clone()), sink)
    }

    #[test]
    fn test_record_masks_all_free_text_fields() {
        let (log, sink) = in_memory_log();
        log.record(
            "김철수",
            AuditAction::RecordUpdate,
            ResourceType::Developer,
            "dev.lead@teamdesk.io",
            Some("updated phone to 010-1234-5678"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.actor, "김*수");
        assert_eq!(event.resource_id, "d***@t***.io");
        assert_eq!(
            event.details.as_deref(),
            Some("updated phone to 010-****-5678")
        );
    }

    #[test]
    fn test_record_accepts_already_masked_input() {
        let (log, sink) = in_memory_log();
        log.record(
            "김*수",
            AuditAction::Login,
            ResourceType::Developer,
            "d***@t***.io",
            None,
        );
        let event = &sink.events()[0];
        assert_eq!(event.actor, "김*수");
        assert_eq!(event.resource_id, "d***@t***.io");
    }

    #[test]
    fn test_event_display_is_a_timestamped_line() {
        let (log, sink) = in_memory_log();
        log.record(
            "admin",
            AuditAction::BackupCreate,
            ResourceType::Backup,
            "weekly",
            Some("full database"),
        );
        let line = sink.events()[0].to_string();
        assert!(line.contains("admin"));
        assert!(line.contains("backup_create"));
        assert!(line.contains("weekly"));
        assert!(line.contains("full database"));
    }

    #[test]
    fn test_file_sink_writes_masked_json_lines() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("audit.log");
        let sink = Arc::new(FileAuditSink::new(&log_path).unwrap());
        let log = AuditLog::new(sink);

        log.record(
            "김철수",
            AuditAction::ReportExport,
            ResourceType::Report,
            "monthly-2026-01",
            None,
        );
        log.record(
            "admin",
            AuditAction::ConfigChange,
            ResourceType::Config,
            "backup.schedule",
            Some("reviewer test.user@company.co.kr"),
        );

        let content = fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.actor, "김*수");
        assert_eq!(first.action, AuditAction::ReportExport);

        let second: AuditEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(
            second.details.as_deref(),
            Some("reviewer t***@c***.co.kr")
        );
    }

    #[test]
    fn test_file_sink_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("nested").join("deep").join("audit.log");
        let sink = FileAuditSink::new(&log_path).unwrap();
        sink.append(&sample_event());
        assert!(log_path.exists());
    }

    #[test]
    fn test_file_sink_appends_across_reopens() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("audit.log");
        {
            let sink = FileAuditSink::new(&log_path).unwrap();
            sink.append(&sample_event());
        }
        {
            let sink = FileAuditSink::new(&log_path).unwrap();
            sink.append(&sample_event());
        }
        let content = fs::read_to_string(&log_path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_file_sink_rotation() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("audit.log");
        let sink = FileAuditSink::new(&log_path).unwrap();

        let big_details = "x".repeat(10_000);
        let events_needed = (MAX_LOG_SIZE as usize / (big_details.len() + 200)) + 10;
        for _ in 0..events_needed {
            let mut event = sample_event();
            event.details = Some(big_details.clone());
            sink.append(&event);
        }

        assert!(log_path.exists(), "current log file should exist");
        let rotated: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("audit.log."))
            .collect();
        assert!(!rotated.is_empty(), "at least one rotated file should exist");
    }

    #[test]
    fn test_null_sink_discards() {
        let sink = NullAuditSink;
        sink.append(&sample_event());
    }

    #[test]
    fn test_all_actions_serialize_roundtrip() {
        let actions = [
            AuditAction::RecordCreate,
            AuditAction::RecordUpdate,
            AuditAction::RecordDelete,
            AuditAction::ReportExport,
            AuditAction::BackupCreate,
            AuditAction::BackupRestore,
            AuditAction::ConfigChange,
            AuditAction::KeyAccess,
            AuditAction::KeyExport,
            AuditAction::Login,
            AuditAction::Logout,
        ];
        for action in actions {
            let mut event = sample_event();
            event.action = action;
            let json = serde_json::to_string(&event).unwrap();
            let roundtrip: AuditEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(roundtrip.action, action);
        }
    }

    fn sample_event() -> AuditEvent {
        AuditEvent {
            timestamp: Utc::now(),
            actor: "admin".into(),
            action: AuditAction::Login,
            resource_type: ResourceType::Developer,
            resource_id: "session".into(),
            details: None,
        }
    }
}
