//! Decoding and cancellable consumption of recorder telemetry and trial-run log streams.
//!
//! The backend speaks either Server-Sent Events (`data:` lines separated by a blank line)
//! or newline-delimited JSON over a chunked body. Both are handled by [`StreamDecoder`].

use crate::model::{StreamEvent, Transcript};
use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::fmt::Display;
use tokio::sync::mpsc::UnboundedReceiver;

/// Commands accepted by a running stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    /// Stop reading. Lines already received are kept.
    Stop,
}

/// Incremental decoder; chunk boundaries may fall anywhere, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: BytesMut,
    data_lines: Vec<String>,
    event_name: Option<String>,
}

impl StreamDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos);
            self.buf.advance(1);
            let text = String::from_utf8_lossy(&line);
            let text = text.strip_suffix('\r').unwrap_or(text.as_ref()).to_string();
            if let Some(ev) = self.handle_line(&text) {
                out.push(ev);
            }
        }
        out
    }

    /// Flush a trailing unterminated line and any pending SSE event at end of stream.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if !self.buf.is_empty() {
            let rest = self.buf.split();
            let text = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            if let Some(ev) = self.handle_line(&text) {
                out.push(ev);
            }
        }
        if let Some(ev) = self.dispatch() {
            out.push(ev);
        }
        out
    }

    fn handle_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if let Some(rest) = line.strip_prefix("data:") {
            self.data_lines
                .push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            return None;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            self.event_name = Some(rest.trim().to_string());
            return None;
        }
        // SSE comments and fields we have no use for.
        if line.starts_with(':') || line.starts_with("id:") || line.starts_with("retry:") {
            return None;
        }
        // Bare line: NDJSON record or plain text.
        parse_payload(line, None)
    }

    fn dispatch(&mut self) -> Option<StreamEvent> {
        let name = self.event_name.take();
        if self.data_lines.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data_lines).join("\n");
        parse_payload(&data, name.as_deref())
    }
}

fn str_field<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
}

/// Interpret one event payload. Unknown discriminators yield `None` and are ignored.
pub fn parse_payload(data: &str, event_name: Option<&str>) -> Option<StreamEvent> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return None;
    }
    let obj = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(obj)) => obj,
        _ => {
            return Some(StreamEvent::Log {
                line: trimmed.to_string(),
            })
        }
    };

    let message = str_field(&obj, &["message", "line", "log"]).map(str::to_string);
    let kind = str_field(&obj, &["type"]).or(event_name);

    match kind {
        Some("log") => Some(StreamEvent::Log {
            line: message.unwrap_or_default(),
        }),
        Some("phase") => Some(StreamEvent::Phase {
            phase: str_field(&obj, &["phase", "name"])
                .unwrap_or("unknown")
                .to_string(),
            message: message.unwrap_or_default(),
        }),
        Some("status") => Some(StreamEvent::Status {
            status: str_field(&obj, &["status"])
                .map(str::to_string)
                .or(message)
                .unwrap_or_default(),
        }),
        Some("done") | Some("complete") | Some("completed") => {
            Some(StreamEvent::Done { message })
        }
        Some("error") => Some(StreamEvent::Error {
            message: message.unwrap_or_else(|| "stream reported an error".into()),
        }),
        Some(other) => {
            tracing::trace!(kind = other, "ignoring unknown stream event");
            None
        }
        None => {
            if let Some(phase) = str_field(&obj, &["phase"]) {
                return Some(StreamEvent::Phase {
                    phase: phase.to_string(),
                    message: message.unwrap_or_default(),
                });
            }
            // Recorder telemetry: {message, level, details}
            let message = message?;
            let line = match str_field(&obj, &["level"]) {
                Some(level) if level != "info" => format!("[{level}] {message}"),
                _ => message,
            };
            Some(StreamEvent::Log { line })
        }
    }
}

/// Consume `body` until it ends, errors, or a [`StreamControl::Stop`] arrives.
///
/// Every decoded event is handed to `emit`. After a stop the body is dropped, which closes
/// the connection, and no further chunks are read. A stop or a transport error still
/// flushes the decoder, so a trailing line without its newline is kept.
pub async fn drive_stream<S, E, F>(
    body: S,
    mut control: UnboundedReceiver<StreamControl>,
    emit: F,
) -> Transcript
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
    F: Fn(StreamEvent),
{
    let mut body = std::pin::pin!(body);
    let mut decoder = StreamDecoder::default();
    let mut transcript = Transcript::default();
    let mut control_open = true;

    let apply = |events: Vec<StreamEvent>, transcript: &mut Transcript| {
        for ev in events {
            if let Some(line) = ev.transcript_line() {
                transcript.lines.push(line);
            }
            emit(ev);
        }
    };

    loop {
        tokio::select! {
            biased;
            ctrl = control.recv(), if control_open => {
                match ctrl {
                    Some(StreamControl::Stop) => {
                        apply(decoder.finish(), &mut transcript);
                        tracing::info!(lines = transcript.lines.len(), "stream stopped by operator");
                        transcript.stopped = true;
                        break;
                    }
                    None => control_open = false,
                }
            }
            chunk = body.next() => {
                match chunk {
                    Some(Ok(bytes)) => apply(decoder.push(&bytes), &mut transcript),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "stream transport error");
                        let mut events = decoder.finish();
                        events.push(StreamEvent::Error { message: format!("stream interrupted: {e}") });
                        apply(events, &mut transcript);
                        break;
                    }
                    None => {
                        apply(decoder.finish(), &mut transcript);
                        transcript.finished = true;
                        break;
                    }
                }
            }
        }
    }

    transcript
}
