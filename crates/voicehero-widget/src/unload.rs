//! Last-chance delivery while the page is hidden or torn down.

use crate::delivery::DeliveryController;
use crate::transport::{EventPayload, EventTransport};
use std::sync::Arc;
use tracing::debug;
use voicehero_core::AnalyticsEvent;

/// Page lifecycle notifications forwarded by the host page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLifecycle {
    VisibilityHidden,
    VisibilityVisible,
    PageHide,
}

impl PageLifecycle {
    pub fn is_teardown(&self) -> bool {
        matches!(self, Self::VisibilityHidden | Self::PageHide)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnloadFlush {
    pub abandonment_sent: bool,
    pub flushed_events: usize,
}

pub struct UnloadHook {
    transport: Arc<dyn EventTransport>,
    controller: Arc<DeliveryController>,
}

impl UnloadHook {
    pub fn new(controller: Arc<DeliveryController>) -> Self {
        Self {
            transport: controller.transport(),
            controller,
        }
    }

    /// Send the abandonment event (if any) and whatever is queued as two
    /// beacons. Returns immediately.
    pub fn flush(&self, abandonment: Option<AnalyticsEvent>) -> UnloadFlush {
        let mut report = UnloadFlush::default();

        if let Some(event) = abandonment {
            debug!("Sending abandonment beacon for session {}", event.session_id);
            self.transport.beacon(EventPayload::batch(vec![event]));
            report.abandonment_sent = true;
        }

        let queued = self.controller.drain();
        if !queued.is_empty() {
            debug!("Sending {} queued analytics events by beacon", queued.len());
            report.flushed_events = queued.len();
            self.transport.beacon(EventPayload::batch(queued));
        }

        report
    }
}
