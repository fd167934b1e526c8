//! Progress emission for a running turn.
//!
//! `message` events are coalesced: at most one per interval, each carrying
//! the delta accumulated since the previous event. `tool_use` events bypass
//! the throttle. `finish` always sends one final `message` event with
//! `is_complete = true`. A dropped receiver is ignored.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use fastpath_types::progress::{ProgressEvent, ProgressKind};

use crate::text::tail_chars;

/// Characters of trailing text carried in the `content` preview.
pub const PREVIEW_CHARS: usize = 200;

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Create a channel for one turn's progress events.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Turn-scoped emitter. Without a sender every method is a no-op apart
/// from snapshot bookkeeping.
#[derive(Debug)]
pub struct ProgressEmitter {
    sender: Option<ProgressSender>,
    interval: Duration,
    last_emit: Option<Instant>,
    snapshot: String,
    pending_delta: String,
}

impl ProgressEmitter {
    pub fn new(sender: Option<ProgressSender>, interval: Duration) -> Self {
        Self {
            sender,
            interval,
            last_emit: None,
            snapshot: String::new(),
            pending_delta: String::new(),
        }
    }

    /// All text pushed so far.
    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }

    /// Record streamed text and emit a `message` event if the interval allows.
    pub fn push_text(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.snapshot.push_str(delta);
        self.pending_delta.push_str(delta);

        let now = Instant::now();
        let due = self
            .last_emit
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if due {
            self.last_emit = Some(now);
            let delta = std::mem::take(&mut self.pending_delta);
            let event = self.message_event(delta, false);
            self.send(event);
        }
    }

    /// Announce a tool call immediately.
    pub fn tool_use(&mut self, tool_name: &str) {
        let event = ProgressEvent {
            kind: ProgressKind::ToolUse,
            content: tool_name.to_string(),
            delta: String::new(),
            snapshot: self.snapshot.clone(),
            is_complete: false,
        };
        self.send(event);
    }

    /// Flush the final answer. Always emits, regardless of the throttle.
    pub fn finish(&mut self, final_text: &str) {
        self.snapshot = final_text.to_string();
        let delta = std::mem::take(&mut self.pending_delta);
        let event = self.message_event(delta, true);
        self.send(event);
    }

    fn message_event(&self, delta: String, is_complete: bool) -> ProgressEvent {
        ProgressEvent {
            kind: ProgressKind::Message,
            content: tail_chars(&self.snapshot, PREVIEW_CHARS).to_string(),
            delta,
            snapshot: self.snapshot.clone(),
            is_complete,
        }
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            // Receiver gone means the caller stopped listening.
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut ProgressReceiver) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_events_are_throttled() {
        let (tx, mut rx) = progress_channel();
        let mut emitter = ProgressEmitter::new(Some(tx), Duration::from_millis(500));

        emitter.push_text("Hel");
        emitter.push_text("lo");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].delta, "Hel");

        tokio::time::advance(Duration::from_millis(500)).await;
        emitter.push_text(" world");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].delta, "lo world");
        assert_eq!(events[0].snapshot, "Hello world");
        assert!(!events[0].is_complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_use_is_unthrottled() {
        let (tx, mut rx) = progress_channel();
        let mut emitter = ProgressEmitter::new(Some(tx), Duration::from_secs(60));

        emitter.push_text("Checking");
        emitter.tool_use("list_tasks");
        emitter.tool_use("get_task");
        let kinds: Vec<_> = drain(&mut rx).into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ProgressKind::Message, ProgressKind::ToolUse, ProgressKind::ToolUse]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_always_flushes() {
        let (tx, mut rx) = progress_channel();
        let mut emitter = ProgressEmitter::new(Some(tx), Duration::from_secs(60));

        emitter.finish("You have 3 tasks.");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_complete);
        assert_eq!(events[0].snapshot, "You have 3 tasks.");
        assert_eq!(events[0].content, "You have 3 tasks.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_inside_throttle_window_carries_pending_delta() {
        let (tx, mut rx) = progress_channel();
        let mut emitter = ProgressEmitter::new(Some(tx), Duration::from_secs(60));

        emitter.push_text("a");
        emitter.push_text("b");
        emitter.finish("ab");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].delta, "b");
        assert!(events[1].is_complete);
    }

    #[test]
    fn test_preview_is_trailing_text() {
        let mut emitter = ProgressEmitter::new(None, Duration::ZERO);
        emitter.snapshot = "x".repeat(300) + "END";
        let event = emitter.message_event(String::new(), false);
        assert_eq!(event.content.chars().count(), PREVIEW_CHARS);
        assert!(event.content.ends_with("END"));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_ignored() {
        let (tx, rx) = progress_channel();
        drop(rx);
        let mut emitter = ProgressEmitter::new(Some(tx), Duration::ZERO);
        emitter.push_text("still fine");
        emitter.tool_use("list_tasks");
        emitter.finish("done");
        assert_eq!(emitter.snapshot(), "done");
    }
}
