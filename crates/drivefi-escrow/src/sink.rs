//! Event sinks: where an agreement publishes its [`EventRecord`]s besides
//! its own log.
//!
//! Sinks are called while the agreement lock is held, so they must be
//! quick and must not call back into the engine.

use drivefi_types::EventRecord;
use parking_lot::Mutex;

/// Receiver of agreement events.
pub trait EventSink: Send + Sync {
    fn publish(&self, record: &EventRecord);
}

/// Writes every event to `tracing` at INFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, record: &EventRecord) {
        tracing::info!(
            agreement = %record.agreement_id,
            seq = record.sequence,
            kind = record.event.kind(),
            "Escrow event"
        );
    }
}

/// Collects events in memory, across all agreements that share it.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<EventRecord>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in publish order.
    #[must_use]
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }

    /// Drain the buffer.
    pub fn take(&self) -> Vec<EventRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, record: &EventRecord) {
        self.records.lock().push(record.clone());
    }
}
