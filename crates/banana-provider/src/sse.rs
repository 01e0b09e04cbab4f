// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE chunk stream for streaming generation endpoints.
//!
//! Both flavors send one JSON document per `data:` line. OpenAI-compatible
//! servers end with `data: [DONE]`; Gemini simply closes the stream.

use std::pin::Pin;

use banana_core::FailureReason;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Sentinel closing an OpenAI-style stream.
const DONE: &str = "[DONE]";

pub type ChunkStream<T> = Pin<Box<dyn Stream<Item = Result<T, FailureReason>> + Send>>;

/// Parses a streaming response body into typed chunks.
///
/// Chunks that fail to deserialize are skipped; a transport error ends the
/// stream with [`FailureReason::Transport`].
pub fn parse_sse_stream<T>(response: reqwest::Response) -> ChunkStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    let events = response
        .bytes_stream()
        .eventsource()
        .take_while(|result| {
            let done = matches!(result, Ok(event) if event.data.trim() == DONE);
            futures::future::ready(!done)
        })
        .filter_map(|result| async move {
            match result {
                Ok(event) => {
                    let data = event.data.trim();
                    if data.is_empty() {
                        return None;
                    }
                    match serde_json::from_str::<T>(data) {
                        Ok(chunk) => Some(Ok(chunk)),
                        Err(e) => {
                            debug!(error = %e, "skipping undecodable stream chunk");
                            None
                        }
                    }
                }
                Err(e) => Some(Err(FailureReason::Transport(format!("stream error: {e}")))),
            }
        });
    Box::pin(events)
}
