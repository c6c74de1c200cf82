//! Tokio codec for framed protocol messages

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::message::Message;

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Current header being decoded (if any)
    pending_header: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match FrameHeader::decode(src)? {
                Some(h) => h,
                None => return Ok(None), // Need more data
            },
        };

        let payload_len = header.payload_length as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if src.len() < payload_len {
            // Save header and wait for more data
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload_bytes = src.split_to(payload_len).freeze();
        let message: Message = bincode::deserialize(&payload_bytes)?;

        if message.kind() != header.kind {
            return Err(ProtocolError::KindMismatch {
                header: header.kind,
                payload: message.kind(),
            });
        }

        Ok(Some(message))
    }
}

impl Encoder<&Message> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: &Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = bincode::serialize(message)?;
        let payload_len = payload.len();

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        FrameHeader::new(message.kind(), payload_len as u32).encode(dst);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        <Self as Encoder<&Message>>::encode(self, &message, dst)
    }
}

/// Encode a single message as one datagram.
pub fn encode_datagram(message: &Message) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + 128);
    FrameCodec::new().encode(message, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode a datagram that must contain exactly one frame.
pub fn decode_datagram(datagram: &[u8]) -> Result<Message, ProtocolError> {
    let mut buf = BytesMut::from(datagram);
    let mut codec = FrameCodec::new();

    let message = codec
        .decode(&mut buf)?
        .ok_or_else(|| ProtocolError::IncompleteFrame {
            expected: codec
                .pending_header
                .map(|h| HEADER_SIZE + h.payload_length as usize)
                .unwrap_or(HEADER_SIZE),
            actual: datagram.len(),
        })?;

    if !buf.is_empty() {
        return Err(ProtocolError::TrailingData(buf.len()));
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{InfoRequest, MessageKind, PublishNotice, SubscribeResponse};

    #[test]
    fn test_codec_roundtrip() {
        let mut codec = FrameCodec::new();
        let message = Message::InfoRequest(InfoRequest {
            name: "logcast".to_string(),
            password: "secret".to_string(),
        });

        let mut buf = BytesMut::new();
        codec.encode(&message, &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, message);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = FrameCodec::new();
        let message = Message::PublishNotice(PublishNotice {
            host: "web-3".to_string(),
            message: "request served".to_string(),
            severity: 1,
            facility: "billing".to_string(),
            ..Default::default()
        });

        let mut full_buf = BytesMut::new();
        codec.encode(&message, &mut full_buf).unwrap();

        // Header plus a slice of the payload
        let mut partial = full_buf.split_to(HEADER_SIZE + 3);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full_buf);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let message = Message::SubscribeResponse(SubscribeResponse::accepted());
        let mut buf = BytesMut::from(&encode_datagram(&message).unwrap()[..]);
        // Rewrite the header kind byte
        buf[0] = MessageKind::InfoRequest.as_u8();

        let result = FrameCodec::new().decode(&mut buf);
        assert!(matches!(
            result,
            Err(ProtocolError::KindMismatch {
                header: MessageKind::InfoRequest,
                payload: MessageKind::SubscribeResponse,
            })
        ));
    }

    #[test]
    fn test_datagram_truncated() {
        let message = Message::InfoRequest(InfoRequest::default());
        let bytes = encode_datagram(&message).unwrap();

        let result = decode_datagram(&bytes[..bytes.len() - 1]);
        assert!(matches!(
            result,
            Err(ProtocolError::IncompleteFrame { .. })
        ));
    }

    #[test]
    fn test_datagram_trailing_bytes() {
        let message = Message::SubscribeResponse(SubscribeResponse::accepted());
        let mut bytes = encode_datagram(&message).unwrap().to_vec();
        bytes.extend_from_slice(&[0, 0]);

        assert!(matches!(
            decode_datagram(&bytes),
            Err(ProtocolError::TrailingData(2))
        ));
    }
}
