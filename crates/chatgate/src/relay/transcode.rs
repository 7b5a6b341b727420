//! SSE-to-NUL-frame transcoding state machine
//!
//! One transcoder runs per relayed request: INIT until the first well-formed
//! data event supplies the response id, STREAMING while deltas are
//! forwarded, DONE on the `[DONE]` sentinel or a non-null finish reason.
//! A payload that fails to decode aborts the relay; it is never skipped.

use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::frames;
use super::sse::SseParser;
use crate::error::{RelayError, Result};

/// Payload shape of one upstream completion chunk
#[derive(Debug, Deserialize)]
struct ChunkPayload {
    id: String,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<Map<String, Value>>,
    #[serde(default)]
    finish_reason: Option<Value>,
}

/// One upstream SSE payload, classified
#[derive(Debug)]
pub enum CompletionEvent {
    /// A completion chunk: response id, the delta object, and whether the
    /// upstream declared the choice finished
    Chunk {
        id: String,
        delta: Map<String, Value>,
        finished: bool,
    },
    /// The literal `[DONE]` sentinel
    Done,
}

/// Decode one data payload into a [`CompletionEvent`].
pub fn classify(payload: &str) -> Result<CompletionEvent> {
    if payload.trim() == "[DONE]" {
        return Ok(CompletionEvent::Done);
    }

    let parsed: ChunkPayload = serde_json::from_str(payload)
        .map_err(|e| RelayError::StreamTransport(format!("malformed upstream event: {e}")))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RelayError::StreamTransport("upstream event carries no choices".into()))?;

    Ok(CompletionEvent::Chunk {
        id: parsed.id,
        delta: choice.delta.unwrap_or_default(),
        finished: choice.finish_reason.is_some(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayState {
    Init,
    Streaming,
    Done,
}

/// Re-frames upstream SSE events as NUL-delimited downstream frames
#[derive(Debug)]
pub struct StreamTranscoder {
    parser: SseParser,
    state: RelayState,
}

impl Default for StreamTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTranscoder {
    pub fn new() -> Self {
        Self {
            parser: SseParser::new(),
            state: RelayState::Init,
        }
    }

    /// Whether a terminal trigger (or an abort) has been seen.
    pub fn is_done(&self) -> bool {
        self.state == RelayState::Done
    }

    /// Feed a chunk of upstream bytes; returns the frames now ready to
    /// flush, in upstream arrival order.
    ///
    /// An undecodable event is reported alongside the frames, not instead
    /// of them: events parsed earlier in the same chunk keep their frames,
    /// so the caller can flush them before the terminal error frame.
    pub fn push(&mut self, chunk: &[u8]) -> (Vec<Bytes>, Option<RelayError>) {
        self.parser.push(chunk);

        let mut ready = Vec::new();
        while self.state != RelayState::Done {
            let payload = match self.parser.next_payload() {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(e) => return (ready, Some(self.fail(e))),
            };
            if let Err(e) = self.step(&payload, &mut ready) {
                return (ready, Some(self.fail(e)));
            }
        }
        (ready, None)
    }

    /// Upstream EOF: process a trailing block that never got its blank line.
    pub fn finish(&mut self) -> (Vec<Bytes>, Option<RelayError>) {
        let mut ready = Vec::new();
        if self.state != RelayState::Done {
            match self.parser.finish() {
                Ok(Some(payload)) => {
                    if let Err(e) = self.step(&payload, &mut ready) {
                        return (ready, Some(self.fail(e)));
                    }
                }
                Ok(None) => {}
                Err(e) => return (ready, Some(self.fail(e))),
            }
        }
        (ready, None)
    }

    fn step(&mut self, payload: &str, frames: &mut Vec<Bytes>) -> Result<()> {
        match classify(payload)? {
            CompletionEvent::Done => {
                self.state = RelayState::Done;
            }
            CompletionEvent::Chunk {
                id,
                delta,
                finished,
            } => {
                if self.state == RelayState::Init {
                    frames.push(frames::response_id(&id));
                    self.state = RelayState::Streaming;
                }
                frames.push(frames::delta(&delta));
                if finished {
                    self.state = RelayState::Done;
                }
            }
        }
        Ok(())
    }

    /// An abort is terminal; later pushes must not produce frames.
    fn fail(&mut self, error: RelayError) -> RelayError {
        self.state = RelayState::Done;
        error
    }
}
