//! NUL-delimited downstream frame encoding
//!
//! Every frame is one JSON object followed by a single `\0`. The terminal
//! error frame carries a second `\0` so a NUL-splitting client can tell it
//! apart from a normal delta.

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Serialize)]
struct ResponseIdFrame<'a> {
    #[serde(rename = "responseId")]
    response_id: &'a str,
}

#[derive(Serialize)]
struct ErrorFrame<'a> {
    #[serde(rename = "errorMessage")]
    error_message: &'a str,
}

/// `{"responseId": id}\0` - always the first frame of a stream.
pub fn response_id(id: &str) -> Bytes {
    encode(&ResponseIdFrame { response_id: id })
}

/// One upstream delta object, forwarded verbatim, plus `\0`.
pub fn delta(delta: &Map<String, Value>) -> Bytes {
    encode(delta)
}

/// `{"errorMessage": message}\0\0` - terminal, closes the stream.
pub fn error(message: &str) -> Bytes {
    let mut buf = serialize(&ErrorFrame {
        error_message: message,
    });
    buf.push(0);
    buf.push(0);
    Bytes::from(buf)
}

fn encode<T: Serialize>(value: &T) -> Bytes {
    let mut buf = serialize(value);
    buf.push(0);
    Bytes::from(buf)
}

fn serialize<T: Serialize>(value: &T) -> Vec<u8> {
    // The frame types above cannot fail to serialize; fall back to an empty
    // object rather than panicking in the relay path.
    serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_id_frame_bytes() {
        assert_eq!(
            response_id("r1").as_ref(),
            b"{\"responseId\":\"r1\"}\0".as_slice()
        );
    }

    #[test]
    fn test_delta_frame_bytes() {
        let mut map = Map::new();
        map.insert("content".to_string(), Value::String("Hi".to_string()));
        assert_eq!(delta(&map).as_ref(), b"{\"content\":\"Hi\"}\0".as_slice());
    }

    #[test]
    fn test_empty_delta_frame() {
        assert_eq!(delta(&Map::new()).as_ref(), b"{}\0".as_slice());
    }

    #[test]
    fn test_error_frame_is_double_nul_terminated() {
        let bytes = error("boom");
        assert_eq!(bytes.as_ref(), b"{\"errorMessage\":\"boom\"}\0\0".as_slice());
        assert!(bytes.ends_with(b"\0\0"));
    }
}
