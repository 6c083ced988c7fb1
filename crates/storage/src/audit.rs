use chrono::{DateTime, Utc};
use eldercare_core::{Event, Paths, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::error;

use crate::store::AuditLog;

/// Mirrors every routed event into `audit/<date>.jsonl`.
pub struct JsonlAuditLog {
    paths: Paths,
    // serializes appends from concurrent publishers
    write_lock: Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(paths: Paths) -> Self {
        Self {
            paths,
            write_lock: Mutex::new(()),
        }
    }

    fn log_file_for(&self, at: &DateTime<Utc>) -> PathBuf {
        self.paths
            .audit_dir()
            .join(format!("{}.jsonl", at.format("%Y-%m-%d")))
    }

    /// Read events logged on a specific date (`YYYY-MM-DD`).
    pub fn read_events(&self, date: &str) -> Result<Vec<Event>> {
        let log_file = self.paths.audit_dir().join(format!("{}.jsonl", date));

        if !log_file.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&log_file)?;
        let mut events = Vec::new();

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    error!(error = %e, line = %line, "Failed to parse audit event");
                }
            }
        }

        Ok(events)
    }

    pub fn read_today(&self) -> Result<Vec<Event>> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        self.read_events(&today)
    }
}

impl AuditLog for JsonlAuditLog {
    fn record(&self, event: &Event) -> Result<()> {
        let log_file = self.log_file_for(&event.created_at);
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| eldercare_core::Error::Storage(format!("Lock error: {}", e)))?;

        if let Some(parent) = log_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eldercare_core::EventType;
    use tempfile::TempDir;

    #[test]
    fn test_jsonl_audit_log() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_base(temp_dir.path().to_path_buf());
        let log = JsonlAuditLog::new(paths);

        let event = Event::new(
            "health_monitoring_agent",
            "care_decision_agent",
            EventType::EmergencyVitals,
            "p1",
            serde_json::json!({"severity": "CRITICAL"}),
        );
        log.record(&event).unwrap();

        let date = event.created_at.format("%Y-%m-%d").to_string();
        let events = log.read_events(&date).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], event);
    }

    #[test]
    fn test_missing_day_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlAuditLog::new(Paths::with_base(temp_dir.path().to_path_buf()));
        assert!(log.read_events("1999-01-01").unwrap().is_empty());
    }
}
