//! HTTP transport and SSE line framing.

mod client;
mod sse;

pub use client::{AuthConfig, BufferedResponse, HttpClient, LineStream, Timeouts, header_map};
pub use sse::{LineBuffer, data_payload};
