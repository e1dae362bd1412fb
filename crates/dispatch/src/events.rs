//! Transition events.
//!
//! The coordinator emits one event per status change and per driver swap
//! before it releases the request's lock. Each event carries the position of
//! its change in the request's history, so subscribers can order the events
//! of one request even when a submission races the first assignment. Sinks
//! must not block, and delivery failures never reach the operation that
//! produced the event.

use std::sync::{Arc, Mutex};

use lifelink_core::Timestamp;
use lifelink_domain::{DriverId, RequestId, RequestStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Side effect due after a committed change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    /// Status transition; `from` is `None` for submission
    StatusChanged {
        request_id: RequestId,
        from: Option<RequestStatus>,
        to: RequestStatus,
        driver_id: Option<DriverId>,
        /// History length after this change; 1 for submission
        sequence: u64,
        timestamp: Timestamp,
    },
    /// Driver swapped on an `Assigned` request
    DriverReassigned {
        request_id: RequestId,
        previous: DriverId,
        driver_id: DriverId,
        sequence: u64,
        timestamp: Timestamp,
    },
}

impl DispatchEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            DispatchEvent::StatusChanged { request_id, .. }
            | DispatchEvent::DriverReassigned { request_id, .. } => *request_id,
        }
    }

    /// Per-request ordering key
    pub fn sequence(&self) -> u64 {
        match self {
            DispatchEvent::StatusChanged { sequence, .. }
            | DispatchEvent::DriverReassigned { sequence, .. } => *sequence,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            DispatchEvent::StatusChanged { timestamp, .. }
            | DispatchEvent::DriverReassigned { timestamp, .. } => *timestamp,
        }
    }
}

/// Receives dispatch events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &DispatchEvent);
}

/// Writes every event to the structured log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::StatusChanged {
                request_id,
                from,
                to,
                driver_id,
                sequence,
                timestamp,
            } => info!(
                request_id = %request_id,
                from = from.map_or("none", |s| s.as_str()),
                to = %to,
                driver_id = ?driver_id.map(DriverId::get),
                sequence,
                timestamp,
                "Transport request status changed"
            ),
            DispatchEvent::DriverReassigned {
                request_id,
                previous,
                driver_id,
                sequence,
                timestamp,
            } => info!(
                request_id = %request_id,
                previous = %previous,
                driver_id = %driver_id,
                sequence,
                timestamp,
                "Transport request reassigned"
            ),
        }
    }
}

/// Publishes events on a tokio broadcast channel
pub struct BroadcastSink {
    tx: broadcast::Sender<DispatchEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: &DispatchEvent) {
        // Err only means nobody is listening
        if self.tx.send(event.clone()).is_err() {
            debug!(request_id = %event.request_id(), "No event subscribers");
        }
    }
}

/// Forwards each event to several sinks in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &DispatchEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DispatchEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, oldest first
    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn events_for(&self, request_id: RequestId) -> Vec<DispatchEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.request_id() == request_id)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &DispatchEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
