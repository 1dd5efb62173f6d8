use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

/// One decoded incoming line.
///
/// `timestamp` is taken when the delimiter is consumed, not when the first
/// byte of the record arrived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineEvent {
    pub timestamp: DateTime<Local>,
    pub text: String,
}

impl LineEvent {
    pub fn new(text: String) -> Self {
        Self {
            timestamp: Local::now(),
            text,
        }
    }
}

impl fmt::Display for LineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

/// Everything the session core reports to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Line(LineEvent),
    FatalError { message: String },
}

/// Receiver side of the session core.
///
/// Callbacks run on the reader thread. Implementations marshal events onto
/// their own update path; the core only guarantees ordering and at-most-once
/// delivery per line.
pub trait SessionEvents: Send + Sync + 'static {
    fn on_line_event(&self, event: LineEvent);

    /// Called at most once per session, after the session has been torn down.
    fn on_fatal_error(&self, message: String);
}

/// Forward events over a tokio channel. A dropped receiver means the UI is
/// gone, so send failures are ignored.
impl SessionEvents for tokio::sync::mpsc::UnboundedSender<SessionEvent> {
    fn on_line_event(&self, event: LineEvent) {
        let _ = self.send(SessionEvent::Line(event));
    }

    fn on_fatal_error(&self, message: String) {
        let _ = self.send(SessionEvent::FatalError { message });
    }
}
