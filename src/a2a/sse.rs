//! Server-Sent Events decoding
//!
//! Turns an `event:`/`data:` framed byte stream back into [`TaskUpdate`]s.
//! Lines are split by the reader, so frames decode identically no matter how
//! the transport chunks the bytes.

use crate::types::TaskUpdate;
use async_stream::stream;
use futures::Stream;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, warn};

/// A dispatched SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    /// Interpret the frame as a task update, keeping non-JSON data as a string
    pub fn into_update(self) -> TaskUpdate {
        let data = serde_json::from_str(&self.data).unwrap_or(Value::String(self.data));
        TaskUpdate::from_wire(self.event, data)
    }
}

/// Line-oriented SSE frame assembler
#[derive(Debug, Default)]
pub struct SseFrameParser {
    event: Option<String>,
    data: Vec<String>,
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator); returns a frame on blank lines
    pub fn push_line(&mut self, line: &str) -> Option<SseFrame> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
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
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Decode a byte stream into task updates, ending after the first final update
pub fn task_updates<R>(reader: R) -> impl Stream<Item = TaskUpdate>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream! {
        let mut lines = BufReader::new(reader).lines();
        let mut parser = SseFrameParser::new();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("SSE stream closed by server");
                    break;
                }
                Err(e) => {
                    warn!("SSE stream read failed: {}", e);
                    break;
                }
            };

            if let Some(frame) = parser.push_line(&line) {
                let update = frame.into_update();
                let is_final = update.is_final;
                yield update;
                if is_final {
                    break;
                }
            }
        }
    }
}
