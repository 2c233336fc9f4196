use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Everything the core tells the shell. The shell never sees scheduler
/// internals; this enum is the whole contract.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// One received chunk of generated text. `speaker` is set only on the
    /// first chunk of a turn, which opens a new transcript entry; later
    /// chunks append to the open entry.
    TextDelta {
        speaker: Option<String>,
        text: String,
        first: bool,
    },
    /// A turn settled (completed or failed) and its result has been folded
    /// into the transcript. Cancelled turns are discarded without one.
    TurnCompleted { model: String, elapsed_secs: f64 },
    /// Fresh copy of the response-time log, pushed after every completed
    /// turn for the visualization layer.
    ResponseTimes(HashMap<String, Vec<f64>>),
    RoundCompleted { round: u32 },
    CollaborationStopped,
    /// Non-fatal, user-visible failure text. Never a process fault.
    Error(String),
}

pub type EventSender = mpsc::UnboundedSender<UiEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<UiEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Send without caring whether the shell is still listening; a dropped
/// receiver must not fail a turn in flight.
pub fn emit(tx: &EventSender, event: UiEvent) {
    if tx.send(event).is_err() {
        log::debug!("UI event dropped: no listener attached");
    }
}
