//! Server-sent events decoding for the Mastodon streaming API

use futures::StreamExt;
use reqwest::Response;
use serde::Deserialize;
use toot_mirror_domain::{EventStream, SourceFeedError, SourcePost, StreamEvent};

use super::read::Status;

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Event { name: String, data: String },
    /// A comment line (`:thump`), sent by the server as keepalive
    Comment,
}

/// Incremental decoder for a `text/event-stream` body
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk of bytes, returning every frame completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }

        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            return Some(SseFrame::Comment);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let name = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame::Event {
            name: name.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[derive(Deserialize)]
struct Notification {
    #[serde(rename = "type")]
    kind: String,
}

/// Translate a frame into a domain event; unknown or undecodable frames yield `None`
pub fn frame_to_event(frame: SseFrame) -> Option<StreamEvent> {
    match frame {
        SseFrame::Comment => Some(StreamEvent::Heartbeat),
        SseFrame::Event { name, data } => match name.as_str() {
            "update" => match serde_json::from_str::<Status>(&data) {
                Ok(status) => Some(StreamEvent::PostCreated(SourcePost::from(status))),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping undecodable status update");
                    None
                }
            },
            "delete" => Some(StreamEvent::PostDeleted(data.trim().to_string())),
            "notification" => match serde_json::from_str::<Notification>(&data) {
                Ok(notification) => Some(StreamEvent::Notification(notification.kind)),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping undecodable notification");
                    None
                }
            },
            other => {
                tracing::debug!(event = %other, "Ignoring stream event");
                None
            }
        },
    }
}

/// Wrap a streaming response body as a stream of domain events
pub(super) fn event_stream(response: Response) -> EventStream {
    let mut decoder = SseDecoder::default();
    response
        .bytes_stream()
        .map(move |chunk| match chunk {
            Ok(bytes) => decoder
                .push(&bytes)
                .into_iter()
                .filter_map(frame_to_event)
                .map(Ok)
                .collect::<Vec<_>>(),
            Err(e) => vec![Err(SourceFeedError::Stream(e.to_string()))],
        })
        .flat_map(futures::stream::iter)
        .boxed()
}
