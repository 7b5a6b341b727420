//! The relay pipeline: HTTP surface, SSE decoding and downstream framing

pub mod frames;
pub mod server;
pub mod sse;
pub mod transcode;

pub use server::{AppState, RelayServer, create_router};
pub use transcode::StreamTranscoder;
