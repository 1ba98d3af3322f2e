//! Dead-letter trail for mirror writes that could not be delivered.
//!
//! Every write that exhausts its retries, or that is dropped because the mirror
//! queue is full, becomes one [`DeadLetter`]. Sink: the log, or in-memory for tests.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;

use crate::mirror::MirrorCommand;

/// One undelivered mirror write.
#[derive(Clone, Debug, serde::Serialize)]
pub struct DeadLetter {
    /// Unix timestamp (milliseconds since epoch) when the write was given up.
    pub timestamp_ms: u64,
    pub command: MirrorCommand,
    /// Attempts made before giving up (0 if the write was never attempted).
    pub attempts: u32,
    pub error: String,
}

impl DeadLetter {
    pub fn now(command: MirrorCommand, attempts: u32, error: impl Into<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            timestamp_ms,
            command,
            attempts,
            error: error.into(),
        }
    }
}

/// Destination for undelivered writes.
pub trait DeadLetterSink: Send + Sync {
    fn record(&self, letter: DeadLetter);
}

/// Writes one JSON line per dead letter at `warn` level.
pub struct LogDeadLetterSink;

impl DeadLetterSink for LogDeadLetterSink {
    fn record(&self, letter: DeadLetter) {
        match serde_json::to_string(&letter) {
            Ok(line) => warn!("mirror dead_letter {}", line),
            Err(e) => warn!("mirror dead_letter unserializable error={}", e),
        }
    }
}

/// In-memory sink for tests. Clone shares the same backing buffer.
#[derive(Clone, Default)]
pub struct InMemoryDeadLetterSink {
    letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl InMemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeadLetterSink for InMemoryDeadLetterSink {
    fn record(&self, letter: DeadLetter) {
        self.letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(letter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::ExternalStatus;
    use crate::types::{ExternalOrderId, OrderId};

    fn command() -> MirrorCommand {
        MirrorCommand::UpdateStatus {
            order_id: OrderId(1),
            external_id: ExternalOrderId("ord-1".into()),
            status: ExternalStatus::Preparing,
        }
    }

    #[test]
    fn in_memory_sink_shares_buffer_between_clones() {
        let sink = InMemoryDeadLetterSink::new();
        let other = sink.clone();
        other.record(DeadLetter::now(command(), 3, "store unavailable"));
        assert_eq!(sink.len(), 1);
        let letters = sink.letters();
        assert_eq!(letters[0].attempts, 3);
        assert_eq!(letters[0].error, "store unavailable");
        assert!(letters[0].timestamp_ms > 0);
    }

    #[test]
    fn dead_letter_serializes_command_kind() {
        let letter = DeadLetter::now(command(), 1, "boom");
        let json = serde_json::to_value(&letter).unwrap();
        assert_eq!(json["command"]["kind"], "update_status");
        assert_eq!(json["command"]["status"], "preparing");
        LogDeadLetterSink.record(letter);
    }
}
