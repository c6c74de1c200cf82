//! GELF-style framing for the point-to-point writer
//!
//! Each record is a JSON document terminated by a single NUL byte, the
//! framing Graylog's TCP input expects.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// GELF version we emit
pub const GELF_VERSION: &str = "1.1";

/// Frame terminator
pub const FRAME_TERMINATOR: u8 = 0;

/// A single GELF document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GelfMessage {
    pub version: String,
    pub host: String,
    pub short_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_message: Option<String>,
    /// Seconds since the UNIX epoch, microsecond resolution
    pub timestamp: f64,
    /// Syslog severity
    pub level: u8,
    #[serde(rename = "_facility")]
    pub facility: String,
    #[serde(rename = "_file")]
    pub file: String,
    #[serde(rename = "_func")]
    pub func: String,
    #[serde(rename = "_line")]
    pub line: u32,
    #[serde(rename = "_pid")]
    pub pid: u32,
}

impl GelfMessage {
    /// Build a document from raw message text.
    ///
    /// Surrounding whitespace is trimmed. Multi-line text keeps its first line
    /// as the short message and the whole text as the full message.
    pub fn new(host: impl Into<String>, text: &str, timestamp: f64, level: u8) -> Self {
        let text = text.trim();
        let (short_message, full_message) = match text.split_once('\n') {
            Some((first, _)) => (first.to_string(), Some(text.to_string())),
            None => (text.to_string(), None),
        };

        Self {
            version: GELF_VERSION.to_string(),
            host: host.into(),
            short_message,
            full_message,
            timestamp,
            level,
            facility: String::new(),
            file: String::new(),
            func: String::new(),
            line: 0,
            pid: 0,
        }
    }

    /// Serialize into a NUL-terminated frame
    pub fn to_frame(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut frame = serde_json::to_vec(self)?;
        frame.push(FRAME_TERMINATOR);
        Ok(frame)
    }

    /// Parse a frame, with or without its terminator
    pub fn from_frame(frame: &[u8]) -> Result<Self, ProtocolError> {
        let body = frame.strip_suffix(&[FRAME_TERMINATOR]).unwrap_or(frame);
        Ok(serde_json::from_slice(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_nul_terminated() {
        let msg = GelfMessage::new("db-01", "checkpoint complete", 1_700_000_000.25, 6);
        let frame = msg.to_frame().unwrap();

        assert_eq!(frame.last(), Some(&FRAME_TERMINATOR));
        assert_eq!(frame.iter().filter(|b| **b == 0).count(), 1);
        assert_eq!(GelfMessage::from_frame(&frame).unwrap(), msg);
    }

    #[test]
    fn test_multiline_splits_short_and_full() {
        let msg = GelfMessage::new("h", "  panic: boom\n  at main.rs:3\n", 0.0, 2);
        assert_eq!(msg.short_message, "panic: boom");
        assert_eq!(msg.full_message.as_deref(), Some("panic: boom\n  at main.rs:3"));
    }

    #[test]
    fn test_extra_fields_are_underscored() {
        let mut msg = GelfMessage::new("h", "x", 0.0, 6);
        msg.facility = "billing".to_string();
        msg.line = 12;
        let json = String::from_utf8(msg.to_frame().unwrap()).unwrap();
        assert!(json.contains(r#""_facility":"billing""#));
        assert!(json.contains(r#""_line":12"#));
        assert!(!json.contains("full_message"));
    }
}
