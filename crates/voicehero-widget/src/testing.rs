//! Test doubles shared by the pipeline's unit tests

use crate::error::WidgetError;
use crate::transport::{EventPayload, EventTransport};
use async_trait::async_trait;
use serde_json::Map;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use voicehero_core::{AnalyticsEvent, EventType};

#[derive(Default)]
pub(crate) struct RecordingTransport {
    failing: AtomicBool,
    attempts: AtomicUsize,
    sent: Mutex<Vec<EventPayload>>,
    beacons: Mutex<Vec<EventPayload>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        let transport = Self::default();
        transport.set_failing(true);
        transport
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<EventPayload> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn beacons(&self) -> Vec<EventPayload> {
        self.beacons.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventTransport for RecordingTransport {
    async fn send(&self, payload: &EventPayload) -> Result<(), WidgetError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(WidgetError::Status {
                status: 503,
                url: "http://test/api/analytics".to_string(),
            });
        }
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }

    fn beacon(&self, payload: EventPayload) {
        self.beacons.lock().unwrap().push(payload);
    }
}

/// Event whose timestamp doubles as a sequence number
pub(crate) fn sample_event(event_type: EventType, seq: i64) -> AnalyticsEvent {
    AnalyticsEvent {
        session_id: "vh-1717000000000-abcdefghi".to_string(),
        event_type,
        timestamp: seq,
        project_id: "project-1".to_string(),
        segment_type: "new_visitor".to_string(),
        segment_id: "segment-1".to_string(),
        audio_version: "1".to_string(),
        script_version: "1".to_string(),
        audio_url: None,
        metadata: Map::new(),
        user_context: Map::new(),
    }
}

pub(crate) fn timestamps(events: &[AnalyticsEvent]) -> Vec<i64> {
    events.iter().map(|e| e.timestamp).collect()
}
