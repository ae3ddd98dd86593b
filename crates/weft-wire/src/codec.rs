use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{WireError, WireResult};

/// Default upper bound on a single frame's payload.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Frames values as `[4 bytes big-endian length][JSON payload]`.
#[derive(Clone, Copy, Debug)]
pub struct WireCodec {
    max_frame_size: usize,
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl WireCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> WireResult<Vec<u8>> {
        let payload =
            serde_json::to_vec(value).map_err(|e| WireError::Serialization(e.to_string()))?;
        if payload.len() > self.max_frame_size {
            return Err(WireError::FrameTooLarge {
                size: payload.len(),
                max: self.max_frame_size,
            });
        }
        let len = u32::try_from(payload.len()).map_err(|_| WireError::FrameTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;
        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode one frame. Returns the value and the bytes consumed.
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> WireResult<(T, usize)> {
        let header: [u8; HEADER_LEN] = data
            .get(..HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| WireError::Framing("too short".into()))?;
        let len = u32::from_be_bytes(header) as usize;
        if len > self.max_frame_size {
            return Err(WireError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }
        let total = HEADER_LEN + len;
        let payload = data.get(HEADER_LEN..total).ok_or_else(|| {
            WireError::Framing(format!("incomplete: have {}, need {}", data.len(), total))
        })?;
        let value = serde_json::from_slice(payload)
            .map_err(|e| WireError::Deserialization(e.to_string()))?;
        Ok((value, total))
    }

    /// Encode a sequence of values as back-to-back frames.
    pub fn encode_all<T: Serialize>(&self, values: &[T]) -> WireResult<Vec<u8>> {
        let mut buf = Vec::new();
        for value in values {
            buf.extend(self.encode(value)?);
        }
        Ok(buf)
    }

    /// Decode back-to-back frames until the input is exhausted.
    pub fn decode_all<T: DeserializeOwned>(&self, mut data: &[u8]) -> WireResult<Vec<T>> {
        let mut values = Vec::new();
        while !data.is_empty() {
            let (value, consumed) = self.decode(data)?;
            values.push(value);
            data = &data[consumed..];
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::message::{ContainerMessageType, OutboundMessage};

    #[test]
    fn frame_layout() {
        let codec = WireCodec::default();
        let encoded = codec.encode(&json!([1])).unwrap();
        assert_eq!(&encoded[..4], &3u32.to_be_bytes());
        assert_eq!(&encoded[4..], b"[1]");
        let (value, consumed): (serde_json::Value, usize) = codec.decode(&encoded).unwrap();
        assert_eq!(value, json!([1]));
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn stream_of_messages() {
        let codec = WireCodec::default();
        let batch = vec![
            OutboundMessage::new(ContainerMessageType::DataStoreOp, 1, 0, json!("a")),
            OutboundMessage::new(ContainerMessageType::Attach, 2, 0, json!({"b": true})),
        ];
        let bytes = codec.encode_all(&batch).unwrap();
        let decoded: Vec<OutboundMessage> = codec.decode_all(&bytes).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let codec = WireCodec::default();
        let encoded = codec.encode(&json!("hello")).unwrap();
        let err = codec
            .decode::<serde_json::Value>(&encoded[..encoded.len() - 1])
            .unwrap_err();
        assert!(matches!(err, WireError::Framing(_)));
        let err = codec.decode::<serde_json::Value>(&encoded[..2]).unwrap_err();
        assert!(matches!(err, WireError::Framing(_)));
    }

    #[test]
    fn frame_size_limit() {
        let codec = WireCodec::new(4);
        let err = codec.encode(&json!("too long")).unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge { max: 4, .. }));

        let mut forged = 100u32.to_be_bytes().to_vec();
        forged.extend_from_slice(b"[]");
        let err = codec.decode::<serde_json::Value>(&forged).unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge { size: 100, .. }));
    }
}
