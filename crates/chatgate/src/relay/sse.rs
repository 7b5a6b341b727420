//! Pull-style parser for the upstream SSE byte stream
//!
//! Bytes are pushed in as they arrive from the network; complete `data:`
//! payloads are pulled out one at a time. The parser holds only the bytes of
//! the block currently in flight and is not resumable across connections.

use crate::error::{RelayError, Result};

/// Incremental SSE block parser
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of upstream bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        // CR only ever appears in line terminators here (JSON escapes
        // control characters), so dropping it normalizes CRLF to LF.
        self.buffer.extend(chunk.iter().filter(|&&b| b != b'\r'));
    }

    /// Pull the next complete `data:` payload, if one has fully arrived.
    ///
    /// Blocks without data lines (comments, bare `event:` lines) are
    /// consumed and skipped. A complete block that is not valid UTF-8 is a
    /// transport error, never silently repaired.
    pub fn next_payload(&mut self) -> Result<Option<String>> {
        loop {
            let Some(block) = self.take_block()? else {
                return Ok(None);
            };
            if let Some(payload) = extract_data(&block) {
                return Ok(Some(payload));
            }
        }
    }

    /// Consume whatever remains after upstream EOF as a final block.
    pub fn finish(&mut self) -> Result<Option<String>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let block = decode_block(std::mem::take(&mut self.buffer))?;
        Ok(extract_data(&block))
    }

    /// Split off the bytes up to the next blank line, if one has arrived.
    fn take_block(&mut self) -> Result<Option<String>> {
        let Some(end) = self
            .buffer
            .windows(2)
            .position(|window| window == b"\n\n")
        else {
            return Ok(None);
        };

        let rest = self.buffer.split_off(end + 2);
        let block = std::mem::replace(&mut self.buffer, rest);
        decode_block(block).map(Some)
    }
}

/// Blocks are split on `\n\n`, so a multibyte character is never cut here;
/// invalid UTF-8 means the upstream sent garbage.
fn decode_block(block: Vec<u8>) -> Result<String> {
    String::from_utf8(block)
        .map_err(|_| RelayError::StreamTransport("upstream event is not valid UTF-8".into()))
}

/// Join the `data:` lines of one block; `None` when the block has none.
fn extract_data(block: &str) -> Option<String> {
    let mut payload: Option<String> = None;

    for line in block.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            match payload.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(data);
                }
                None => payload = Some(data.to_string()),
            }
        }
    }

    payload
}
