//! Session event stream
//!
//! Events are published on a `tokio::sync::broadcast` channel: one producer
//! (the session worker), any number of consumers. A slow consumer lags and
//! loses the oldest events; the worker never waits on it.

use gazmodem_proto::ParameterRecord;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::registry::DiscoveryPhase;

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Sniffing,
    Scanning,
    Complete,
    Aborted,
    Failed,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionPhase::Complete | SessionPhase::Aborted | SessionPhase::Failed
        )
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Sniffing => "sniffing",
            SessionPhase::Scanning => "scanning",
            SessionPhase::Complete => "complete",
            SessionPhase::Aborted => "aborted",
            SessionPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Category of a non-terminal or fatal diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport could not be opened or dropped
    Connection,
    /// A parameter had a type id outside the table
    UnknownType,
    /// An answer could not be decoded
    Decode,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    Cancelled,
    Failed(String),
}

impl EndReason {
    /// Terminal phase for this reason
    pub fn phase(&self) -> SessionPhase {
        match self {
            EndReason::Completed => SessionPhase::Complete,
            EndReason::Cancelled => SessionPhase::Aborted,
            EndReason::Failed(_) => SessionPhase::Failed,
        }
    }
}

/// Events emitted by a scan session, in chronological order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    PhaseChanged {
        phase: SessionPhase,
    },
    DeviceDiscovered {
        address: u16,
        phase: DiscoveryPhase,
    },
    ScanProgress {
        address: u16,
        index: u16,
    },
    ParameterDecoded {
        record: ParameterRecord,
    },
    DeviceSkipped {
        address: u16,
        last_index: u16,
        streak: u32,
    },
    Error {
        kind: ErrorKind,
        context: String,
    },
    SessionEnded {
        reason: EndReason,
    },
}

/// Publishing side of the event stream
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<ScanEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(ScanEvent::DeviceDiscovered {
            address: 32,
            phase: DiscoveryPhase::Sniffed,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "device_discovered", "address": 32, "phase": "sniffed"})
        );

        let json = serde_json::to_value(ScanEvent::SessionEnded {
            reason: EndReason::Failed("Connection closed".to_string()),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "event": "session_ended",
                "reason": {"kind": "failed", "message": "Connection closed"}
            })
        );
    }

    #[test]
    fn test_emit_without_subscribers() {
        let sink = EventSink::new(4);
        sink.emit(ScanEvent::PhaseChanged {
            phase: SessionPhase::Sniffing,
        });

        let mut rx = sink.subscribe();
        sink.emit(ScanEvent::PhaseChanged {
            phase: SessionPhase::Scanning,
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            ScanEvent::PhaseChanged {
                phase: SessionPhase::Scanning
            }
        );
    }

    #[test]
    fn test_end_reason_phase() {
        assert_eq!(EndReason::Completed.phase(), SessionPhase::Complete);
        assert_eq!(EndReason::Cancelled.phase(), SessionPhase::Aborted);
        assert!(EndReason::Failed(String::new()).phase().is_terminal());
        assert!(!SessionPhase::Scanning.is_terminal());
    }
}
