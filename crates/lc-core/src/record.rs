//! Log records

use bytes::Bytes;
use chrono::{DateTime, Local};
use lc_protocol::{GelfMessage, PublishNotice};

use crate::process;
use crate::time::{format_timestamp, unix_seconds, write_timestamp};
use crate::types::Severity;

/// Where a record was emitted from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub func: String,
    pub line: u32,
}

/// One log record, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    host: String,
    facility: String,
    pid: u32,
    severity: Severity,
    source: SourceLocation,
    timestamp: DateTime<Local>,
    message: Bytes,
}

impl LogRecord {
    /// Record stamped with this host, process and the current time
    pub fn new(severity: Severity, message: impl Into<Bytes>) -> Self {
        Self {
            host: process::hostname().to_string(),
            facility: process::program_name().to_string(),
            pid: process::pid(),
            severity,
            source: SourceLocation::default(),
            timestamp: Local::now(),
            message: message.into(),
        }
    }

    /// Set the source location
    pub fn with_source(mut self, file: impl Into<String>, func: impl Into<String>, line: u32) -> Self {
        self.source = SourceLocation {
            file: file.into(),
            func: func.into(),
            line,
        };
        self
    }

    /// Override the facility
    pub fn with_facility(mut self, facility: impl Into<String>) -> Self {
        self.facility = facility.into();
        self
    }

    /// Override the host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Host the record was emitted on
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Facility, the program name unless overridden
    pub fn facility(&self) -> &str {
        &self.facility
    }

    /// Emitting process id
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Severity level
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Source location, empty unless set
    pub fn source(&self) -> &SourceLocation {
        &self.source
    }

    /// Wall-clock time of the record
    pub fn timestamp(&self) -> &DateTime<Local> {
        &self.timestamp
    }

    /// Raw message bytes, untrimmed
    pub fn message(&self) -> &Bytes {
        &self.message
    }

    /// Message as text with surrounding whitespace removed
    pub fn message_text(&self) -> String {
        String::from_utf8_lossy(&self.message).trim().to_string()
    }

    /// `YYYY-MM-DD HH:MM:SS.ffffff`
    pub fn timestamp_text(&self) -> String {
        format_timestamp(&self.timestamp)
    }

    /// Copy this record into a (pooled) notice, reusing its allocations.
    ///
    /// The notice must have been reset. The facility is left for the
    /// distributor, which publishes under its own.
    pub fn fill_notice(&self, notice: &mut PublishNotice) {
        notice.host.push_str(&self.host);
        notice
            .message
            .push_str(String::from_utf8_lossy(&self.message).trim());
        write_timestamp(&mut notice.timestamp, &self.timestamp);
        notice.severity = self.severity.as_i32();
        notice.pid = self.pid;
        notice.source_file.push_str(&self.source.file);
        notice.source_func.push_str(&self.source.func);
        notice.source_line = self.source.line;
    }

    /// GELF document for the point-to-point writer
    pub fn to_gelf(&self) -> GelfMessage {
        let text = String::from_utf8_lossy(&self.message);
        let mut gelf = GelfMessage::new(
            self.host.clone(),
            &text,
            unix_seconds(&self.timestamp),
            self.severity.syslog_level(),
        );
        gelf.facility = self.facility.clone();
        gelf.file = self.source.file.clone();
        gelf.func = self.source.func.clone();
        gelf.line = self.source.line;
        gelf.pid = self.pid;
        gelf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> LogRecord {
        LogRecord::new(Severity::Warning, "  disk 91% full \n")
            .with_host("db-01")
            .with_facility("billing")
            .with_source("src/disk.rs", "disk::check", 88)
            .at(Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_new_stamps_process_facts() {
        let record = LogRecord::new(Severity::Info, "hello");
        assert_eq!(record.pid(), std::process::id());
        assert_eq!(record.host(), process::hostname());
        assert_eq!(record.facility(), process::program_name());
    }

    #[test]
    fn test_fill_notice_trims_message() {
        let mut notice = PublishNotice::default();
        sample().fill_notice(&mut notice);

        assert_eq!(notice.host, "db-01");
        assert_eq!(notice.message, "disk 91% full");
        assert_eq!(notice.timestamp, "2024-05-01 12:00:00.000000");
        assert_eq!(notice.severity, Severity::Warning.as_i32());
        assert_eq!(notice.source_file, "src/disk.rs");
        assert_eq!(notice.source_func, "disk::check");
        assert_eq!(notice.source_line, 88);
        assert!(notice.facility.is_empty());
    }

    #[test]
    fn test_to_gelf_carries_metadata() {
        let gelf = sample().to_gelf();
        assert_eq!(gelf.short_message, "disk 91% full");
        assert_eq!(gelf.level, 4);
        assert_eq!(gelf.facility, "billing");
        assert_eq!(gelf.line, 88);
    }
}
