//! C5 — AWS binary EventStream frame parser.
//!
//! Hand-rolled against the wire format rather than delegating to a full SDK:
//! frame layout is `[total_len u32][headers_len u32][prelude_crc u32][headers][payload][message_crc u32]`,
//! all big-endian. CRCs are intentionally unchecked (see design notes).

use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use thiserror::Error;
use tokio_util::codec::Decoder;

#[derive(Debug, Error)]
pub enum EventStreamError {
    #[error("eventstream exception frame: {exception_type:?}: {message}")]
    Exception {
        exception_type: Option<String>,
        message: String,
    },
    #[error("malformed eventstream frame: {0}")]
    Malformed(&'static str),
    #[error("eventstream chunk payload was not valid JSON: {0}")]
    InvalidChunkPayload(#[from] serde_json::Error),
    #[error("eventstream chunk payload had invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("eventstream transport error: {0}")]
    Io(#[from] std::io::Error),
}

const PRELUDE_LEN: usize = 12;
const TRAILER_LEN: usize = 4;

/// A `tokio_util::codec::Decoder` over the raw Bedrock `invoke-with-response-stream`
/// body. Yields one decoded Anthropic streaming-event byte blob per `chunk` frame;
/// silently drops non-chunk frames (e.g. the initial-response preamble).
#[derive(Default)]
pub struct EventStreamDecoder;

impl Decoder for EventStreamDecoder {
    type Item = Vec<u8>;
    type Error = EventStreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < PRELUDE_LEN {
                return Ok(None);
            }
            let total_length = (&src[0..4]).get_u32() as usize;
            if src.len() < total_length {
                return Ok(None);
            }
            let frame = src.split_to(total_length);
            if let Some(event) = parse_frame(&frame)? {
                return Ok(Some(event));
            }
            // Frame was complete but carried no event (preamble, etc) — keep
            // draining the buffer rather than waiting for more bytes.
        }
    }
}

fn parse_frame(frame: &[u8]) -> Result<Option<Vec<u8>>, EventStreamError> {
    let total_length = (&frame[0..4]).get_u32() as usize;
    let headers_length = (&frame[4..8]).get_u32() as usize;
    // frame[8..12] is the prelude CRC — unchecked.

    let headers_start = PRELUDE_LEN;
    let headers_end = headers_start
        .checked_add(headers_length)
        .ok_or(EventStreamError::Malformed("headers_length overflow"))?;
    if total_length < headers_end + TRAILER_LEN {
        return Err(EventStreamError::Malformed("total_length too small for headers"));
    }
    let payload_end = total_length - TRAILER_LEN;
    if headers_end > frame.len() || payload_end > frame.len() || headers_end > payload_end {
        return Err(EventStreamError::Malformed("frame length fields out of bounds"));
    }

    let headers = parse_headers(&frame[headers_start..headers_end]);
    let payload = &frame[headers_end..payload_end];

    if headers.get(":message-type").map(String::as_str) == Some("exception") {
        return Err(EventStreamError::Exception {
            exception_type: headers.get(":exception-type").cloned(),
            message: String::from_utf8_lossy(payload).into_owned(),
        });
    }

    if headers.get(":event-type").map(String::as_str) == Some("chunk") {
        let envelope: serde_json::Value = serde_json::from_slice(payload)?;
        let encoded = envelope
            .get("bytes")
            .and_then(|v| v.as_str())
            .ok_or(EventStreamError::Malformed("chunk frame missing bytes field"))?;
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        return Ok(Some(decoded));
    }

    Ok(None)
}

/// Parses header records: `[1] name_len, [name_len] name, [1] type, ...value...`.
/// Only string-typed (type byte 7) values are retained; any other type byte
/// aborts header parsing for the rest of this frame (its remaining bytes are
/// unread, matching the spec's "skip to end of headers" rule).
fn parse_headers(mut buf: &[u8]) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    loop {
        let Some((&name_len, rest)) = buf.split_first() else { break };
        let name_len = name_len as usize;
        if rest.len() < name_len + 1 {
            break;
        }
        let (name_bytes, rest) = rest.split_at(name_len);
        let name = String::from_utf8_lossy(name_bytes).into_owned();
        let (&type_byte, rest) = rest.split_first().expect("checked above");

        if type_byte != 7 {
            break;
        }
        if rest.len() < 2 {
            break;
        }
        let value_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        let rest = &rest[2..];
        if rest.len() < value_len {
            break;
        }
        let (value_bytes, rest) = rest.split_at(value_len);
        headers.insert(name, String::from_utf8_lossy(value_bytes).into_owned());
        buf = rest;
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_string_header(name: &str, value: &str) -> Vec<u8> {
        let mut out = vec![name.len() as u8];
        out.extend_from_slice(name.as_bytes());
        out.push(7u8);
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
        out.extend_from_slice(value.as_bytes());
        out
    }

    fn encode_frame(headers: &[u8], payload: &[u8]) -> Vec<u8> {
        let headers_length = headers.len() as u32;
        let total_length = (PRELUDE_LEN + headers.len() + payload.len() + TRAILER_LEN) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(&total_length.to_be_bytes());
        out.extend_from_slice(&headers_length.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes()); // prelude crc, unchecked
        out.extend_from_slice(headers);
        out.extend_from_slice(payload);
        out.extend_from_slice(&0u32.to_be_bytes()); // message crc, unchecked
        out
    }

    fn chunk_frame(event_json: &str) -> Vec<u8> {
        use base64::Engine;
        let headers = encode_string_header(":event-type", "chunk");
        let encoded = base64::engine::general_purpose::STANDARD.encode(event_json);
        let payload = serde_json::json!({"bytes": encoded}).to_string();
        encode_frame(&headers, payload.as_bytes())
    }

    #[test]
    fn decodes_a_single_chunk_frame() {
        let frame = chunk_frame(r#"{"type":"message_start"}"#);
        let mut buf = BytesMut::from(&frame[..]);
        let mut decoder = EventStreamDecoder;
        let event = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(event, br#"{"type":"message_start"}"#.to_vec());
        assert!(buf.is_empty());
    }

    #[test]
    fn drops_non_chunk_frames_silently() {
        let preamble_headers = encode_string_header(":message-type", "initial-response");
        let preamble = encode_frame(&preamble_headers, b"");
        let chunk = chunk_frame(r#"{"type":"message_stop"}"#);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&preamble);
        buf.extend_from_slice(&chunk);

        let mut decoder = EventStreamDecoder;
        let event = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(event, br#"{"type":"message_stop"}"#.to_vec());
    }

    #[test]
    fn exception_frame_raises_typed_error() {
        let headers = {
            let mut h = encode_string_header(":message-type", "exception");
            h.extend(encode_string_header(":exception-type", "ThrottlingException"));
            h
        };
        let frame = encode_frame(&headers, br#"{"message":"throttled"}"#);
        let mut buf = BytesMut::from(&frame[..]);
        let mut decoder = EventStreamDecoder;
        let err = decoder.decode(&mut buf).unwrap_err();
        match err {
            EventStreamError::Exception { exception_type, message } => {
                assert_eq!(exception_type.as_deref(), Some("ThrottlingException"));
                assert!(message.contains("throttled"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn incomplete_frame_returns_none_and_retains_buffer() {
        let frame = chunk_frame(r#"{"type":"message_start"}"#);
        let mut buf = BytesMut::from(&frame[..frame.len() - 5]);
        let mut decoder = EventStreamDecoder;
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), frame.len() - 5);
    }

    #[test]
    fn byte_boundary_split_yields_identical_events() {
        let a = chunk_frame(r#"{"type":"message_start"}"#);
        let b = chunk_frame(r#"{"type":"message_stop"}"#);
        let mut whole = a.clone();
        whole.extend_from_slice(&b);

        for split in 0..whole.len() {
            let mut buf = BytesMut::new();
            buf.extend_from_slice(&whole[..split]);
            let mut decoder = EventStreamDecoder;
            let mut events = Vec::new();
            loop {
                match decoder.decode(&mut buf) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => break,
                    Err(_) => break,
                }
            }
            buf.extend_from_slice(&whole[split..]);
            loop {
                match decoder.decode(&mut buf) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => break,
                    Err(e) => panic!("split at {split} failed: {e}"),
                }
            }
            assert_eq!(
                events,
                vec![
                    br#"{"type":"message_start"}"#.to_vec(),
                    br#"{"type":"message_stop"}"#.to_vec(),
                ],
                "split at byte {split}"
            );
        }
    }
}
