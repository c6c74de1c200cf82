//! lc-protocol: Wire protocol for logcast
//!
//! This crate defines the messages exchanged between log producers and
//! monitoring consumers (discovery, subscription, heartbeat and published
//! records), their datagram framing, and the null-terminated GELF-style
//! framing used by the point-to-point writer.

pub mod codec;
pub mod error;
pub mod frame;
pub mod gelf;
pub mod message;

pub use codec::{decode_datagram, encode_datagram, FrameCodec};
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use gelf::GelfMessage;
pub use message::{
    InfoRequest, InfoResponse, Message, MessageKind, PublishNotice, SubscribeRequest,
    SubscribeResponse,
};
