//! Message types for the logcast protocol
//!
//! This module defines the messages exchanged between producers (processes
//! emitting logs) and consumers (monitors subscribing to them). Messages are
//! serialized into frames using the codec defined in `codec.rs`.
//!
//! # Message Flow
//!
//! 1. Consumer broadcasts `InfoRequest` across the producer port range
//! 2. Producer answers with `InfoResponse` carrying its facility
//! 3. Consumer sends `SubscribeRequest` for the facility it wants
//! 4. Producer records the subscriber and answers `SubscribeResponse`
//! 5. Producer relays every published record as a `PublishNotice`
//! 6. Consumer re-sends `SubscribeRequest` periodically as a heartbeat
//!
//! Responses carry an `error_message`; an empty string means success.

use serde::{Deserialize, Serialize};

/// Error text returned when a credential or facility check fails.
pub const AUTH_FAILED: &str = "auth failed";

/// Message kind identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Discovery probe
    InfoRequest = 0x01,
    /// Producer identity
    InfoResponse = 0x02,
    /// Subscription request, doubles as heartbeat
    SubscribeRequest = 0x03,
    /// Subscription acknowledgment
    SubscribeResponse = 0x04,
    /// One forwarded log record
    PublishNotice = 0x05,
}

impl MessageKind {
    /// All kinds, in id order
    pub const ALL: [MessageKind; 5] = [
        MessageKind::InfoRequest,
        MessageKind::InfoResponse,
        MessageKind::SubscribeRequest,
        MessageKind::SubscribeResponse,
        MessageKind::PublishNotice,
    ];

    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::InfoRequest),
            0x02 => Some(Self::InfoResponse),
            0x03 => Some(Self::SubscribeRequest),
            0x04 => Some(Self::SubscribeResponse),
            0x05 => Some(Self::PublishNotice),
            _ => None,
        }
    }
}

/// Discovery probe sent by consumers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoRequest {
    pub name: String,
    pub password: String,
}

/// Producer identity, or the reason it refused to give one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub facility: String,
    pub error_message: String,
}

impl InfoResponse {
    /// Successful response advertising `facility`
    pub fn facility(facility: impl Into<String>) -> Self {
        Self {
            facility: facility.into(),
            error_message: String::new(),
        }
    }

    /// Rejection with the given reason
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            facility: String::new(),
            error_message: reason.into(),
        }
    }

    /// Whether the producer accepted the probe
    pub fn is_ok(&self) -> bool {
        self.error_message.is_empty()
    }
}

/// Request to receive one facility's stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub name: String,
    pub password: String,
    pub facility: String,
}

/// Subscription acknowledgment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub error_message: String,
}

impl SubscribeResponse {
    /// Accepted subscription
    pub fn accepted() -> Self {
        Self::default()
    }

    /// Rejected subscription
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            error_message: reason.into(),
        }
    }

    /// Whether the subscription was accepted
    pub fn is_ok(&self) -> bool {
        self.error_message.is_empty()
    }
}

/// One log record forwarded from a producer to its subscribers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishNotice {
    pub host: String,
    pub message: String,
    /// `YYYY-MM-DD HH:MM:SS.ffffff`
    pub timestamp: String,
    pub severity: i32,
    pub pid: u32,
    pub source_file: String,
    pub source_func: String,
    pub source_line: u32,
    pub facility: String,
}

impl PublishNotice {
    /// Clear every field while keeping the string allocations.
    pub fn clear(&mut self) {
        self.host.clear();
        self.message.clear();
        self.timestamp.clear();
        self.severity = 0;
        self.pid = 0;
        self.source_file.clear();
        self.source_func.clear();
        self.source_line = 0;
        self.facility.clear();
    }
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    InfoRequest(InfoRequest),
    InfoResponse(InfoResponse),
    SubscribeRequest(SubscribeRequest),
    SubscribeResponse(SubscribeResponse),
    PublishNotice(PublishNotice),
}

impl Message {
    /// Get the kind of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::InfoRequest(_) => MessageKind::InfoRequest,
            Message::InfoResponse(_) => MessageKind::InfoResponse,
            Message::SubscribeRequest(_) => MessageKind::SubscribeRequest,
            Message::SubscribeResponse(_) => MessageKind::SubscribeResponse,
            Message::PublishNotice(_) => MessageKind::PublishNotice,
        }
    }
}

impl From<InfoRequest> for Message {
    fn from(m: InfoRequest) -> Self {
        Message::InfoRequest(m)
    }
}

impl From<InfoResponse> for Message {
    fn from(m: InfoResponse) -> Self {
        Message::InfoResponse(m)
    }
}

impl From<SubscribeRequest> for Message {
    fn from(m: SubscribeRequest) -> Self {
        Message::SubscribeRequest(m)
    }
}

impl From<SubscribeResponse> for Message {
    fn from(m: SubscribeResponse) -> Self {
        Message::SubscribeResponse(m)
    }
}

impl From<PublishNotice> for Message {
    fn from(m: PublishNotice) -> Self {
        Message::PublishNotice(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_ids_are_stable() {
        let ids: Vec<u8> = MessageKind::ALL.iter().map(|k| k.as_u8()).collect();
        assert_eq!(ids, vec![0x01, 0x02, 0x03, 0x04, 0x05]);
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_u8(kind.as_u8()), Some(kind));
        }
        assert_eq!(MessageKind::from_u8(0x00), None);
        assert_eq!(MessageKind::from_u8(0xFF), None);
    }

    #[test]
    fn test_response_success_is_empty_error() {
        assert!(InfoResponse::facility("billing").is_ok());
        assert!(!InfoResponse::rejected(AUTH_FAILED).is_ok());
        assert!(SubscribeResponse::accepted().is_ok());
        assert!(!SubscribeResponse::rejected(AUTH_FAILED).is_ok());
    }

    #[test]
    fn test_notice_clear_keeps_capacity() {
        let mut notice = PublishNotice {
            host: "db-01".into(),
            message: "disk almost full".into(),
            timestamp: "2024-05-01 10:00:00.000001".into(),
            severity: 2,
            pid: 42,
            source_file: "main.rs".into(),
            source_func: "main".into(),
            source_line: 7,
            facility: "billing".into(),
        };
        let capacity = notice.message.capacity();

        notice.clear();

        assert_eq!(notice, PublishNotice::default());
        assert_eq!(notice.message.capacity(), capacity);
    }
}
