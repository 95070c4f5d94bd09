//! Newline-delimited JSON framing.
//!
//! One JSON document per line in both directions. Lines have no length cap;
//! a line that is not valid JSON (or not valid UTF-8) is logged and
//! skipped so that one bad frame never ends the session.

use std::io;

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

/// Codec for newline-delimited JSON-RPC traffic
#[derive(Debug, Default)]
pub struct JsonLineCodec {
    /// Bytes already scanned for `\n` in the current buffer
    next_index: usize,
}

impl JsonLineCodec {
    /// Create a new codec
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parse one framed line, returning `None` for blank or malformed input.
fn parse_line(line: &[u8]) -> Option<Value> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_slice(line) {
        Ok(value) => {
            trace!(bytes = line.len(), "Decoded JSON line");
            Some(value)
        }
        Err(e) => {
            warn!(error = %e, bytes = line.len(), "Dropping malformed JSON line");
            None
        }
    }
}

impl Decoder for JsonLineCodec {
    type Item = Value;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>, io::Error> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.next_index = src.len();
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if let Some(value) = parse_line(&line) {
                return Ok(Some(value));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Value>, io::Error> {
        if let Some(value) = self.decode(src)? {
            return Ok(Some(value));
        }
        if src.is_empty() {
            return Ok(None);
        }

        // Final line without a trailing newline
        let line = src.split_to(src.len());
        self.next_index = 0;
        Ok(parse_line(&line))
    }
}

impl<T: Serialize> Encoder<T> for JsonLineCodec {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), io::Error> {
        serde_json::to_writer(dst.writer(), &item)?;
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{JsonRpcResponse, RequestId};
    use serde_json::json;

    fn decode_all(codec: &mut JsonLineCodec, buf: &mut BytesMut) -> Vec<Value> {
        let mut out = Vec::new();
        while let Some(v) = codec.decode(buf).unwrap() {
            out.push(v);
        }
        out
    }

    #[test]
    fn decodes_one_document_per_line() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&b"{\"a\":1}\n{\"b\":2}\n"[..]);
        assert_eq!(decode_all(&mut codec, &mut buf), vec![json!({"a": 1}), json!({"b": 2})]);
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_newline_across_reads() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&b"{\"method\":\"pi"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"ng\"}\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(json!({"method": "ping"})));
    }

    #[test]
    fn skips_malformed_and_blank_lines() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&b"not json\n\n   \n{\"ok\":true}\n"[..]);
        assert_eq!(decode_all(&mut codec, &mut buf), vec![json!({"ok": true})]);
    }

    #[test]
    fn skips_invalid_utf8() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&b"\xff\xfe\n{\"ok\":1}\n"[..]);
        assert_eq!(decode_all(&mut codec, &mut buf), vec![json!({"ok": 1})]);
    }

    #[test]
    fn tolerates_crlf() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&b"{\"x\":1}\r\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(json!({"x": 1})));
    }

    #[test]
    fn handles_large_lines() {
        let big = "x".repeat(4 * 1024 * 1024);
        let line = format!("{{\"data\":\"{big}\"}}\n");
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::new();
        // Feed in small slices to exercise the incremental scan
        let mut decoded = None;
        for chunk in line.as_bytes().chunks(64 * 1024) {
            buf.extend_from_slice(chunk);
            if let Some(v) = codec.decode(&mut buf).unwrap() {
                decoded = Some(v);
            }
        }
        assert_eq!(decoded.unwrap()["data"].as_str().unwrap().len(), big.len());
    }

    #[test]
    fn decode_eof_parses_unterminated_tail() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&b"{\"tail\":true}"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(json!({"tail": true})));
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_eof_drops_malformed_tail() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&b"{\"tail\":"[..]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn encodes_with_trailing_newline() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::new();
        let response = JsonRpcResponse::success(RequestId::from(1), json!({}));
        codec.encode(response, &mut buf).unwrap();
        assert_eq!(&buf[..], b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");
    }

    #[test]
    fn encodes_one_line_per_value() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(json!({"b": 1, "a": [1, 2]}), &mut buf).unwrap();
        codec.encode(json!("second"), &mut buf).unwrap();

        let text = std::str::from_utf8(&buf).unwrap();
        assert!(text.ends_with('\n'));
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines, vec![json!({"a": [1, 2], "b": 1}), json!("second")]);
    }
}
