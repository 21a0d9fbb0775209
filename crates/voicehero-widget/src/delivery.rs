//! Event queue and delivery mode controller.
//!
//! Delivery starts in [`DeliveryMode::RealTime`]: each tracked event is sent
//! on its own. The first failed send switches to [`DeliveryMode::Batched`],
//! where events accumulate in a bounded FIFO queue that is flushed as one
//! batch on a fixed interval, or early when it first reaches the eager
//! threshold. A successful flush switches back to real-time delivery.
//!
//! The state lock is never held across an `.await`. A flag marks a flush in
//! flight so the interval task and an eager flush cannot drain the queue
//! twice.

use crate::config::DeliveryConfig;
use crate::transport::{EventPayload, EventTransport};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use voicehero_core::AnalyticsEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    RealTime,
    Batched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued
    Empty,
    /// Another flush is still waiting on the network
    InFlight,
    Sent(usize),
    /// Delivery failed and the events went back to the front of the queue
    Requeued(usize),
}

struct DeliveryState {
    mode: DeliveryMode,
    queue: VecDeque<AnalyticsEvent>,
    flush_in_flight: bool,
}

pub struct DeliveryController {
    config: DeliveryConfig,
    transport: Arc<dyn EventTransport>,
    state: Mutex<DeliveryState>,
}

impl DeliveryController {
    pub fn new(transport: Arc<dyn EventTransport>, config: DeliveryConfig) -> Self {
        Self {
            config,
            transport,
            state: Mutex::new(DeliveryState {
                mode: DeliveryMode::RealTime,
                queue: VecDeque::new(),
                flush_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeliveryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn transport(&self) -> Arc<dyn EventTransport> {
        Arc::clone(&self.transport)
    }

    pub fn mode(&self) -> DeliveryMode {
        self.lock().mode
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Snapshot of the queued events, oldest first
    pub fn queued_events(&self) -> Vec<AnalyticsEvent> {
        self.lock().queue.iter().cloned().collect()
    }

    fn enqueue(state: &mut DeliveryState, event: AnalyticsEvent, max_queue: usize) {
        while state.queue.len() >= max_queue {
            if let Some(dropped) = state.queue.pop_front() {
                debug!("Analytics queue full, dropping oldest {} event", dropped.event_type);
            }
        }
        state.queue.push_back(event);
    }

    pub async fn track(&self, event: AnalyticsEvent) {
        let mode = self.lock().mode;

        match mode {
            DeliveryMode::RealTime => {
                let payload = EventPayload::single(event);
                if let Err(e) = self.transport.send(&payload).await {
                    warn!("Real-time analytics delivery failed, switching to batched mode: {}", e);
                    let mut state = self.lock();
                    state.mode = DeliveryMode::Batched;
                    for event in payload.into_events() {
                        Self::enqueue(&mut state, event, self.config.max_queue);
                    }
                }
            }
            DeliveryMode::Batched => {
                // Only the push that crosses the threshold flushes early. A batch
                // that failed and came back stays queued for the interval.
                let eager = {
                    let mut state = self.lock();
                    let before = state.queue.len();
                    Self::enqueue(&mut state, event, self.config.max_queue);
                    let threshold = self.config.eager_flush_threshold;
                    before < threshold && state.queue.len() >= threshold
                };
                if eager {
                    debug!("Analytics queue reached eager threshold, flushing now");
                    self.flush().await;
                }
            }
        }
    }

    /// Send every queued event as one batch.
    pub async fn flush(&self) -> FlushOutcome {
        let batch: Vec<AnalyticsEvent> = {
            let mut state = self.lock();
            if state.flush_in_flight {
                return FlushOutcome::InFlight;
            }
            if state.queue.is_empty() {
                return FlushOutcome::Empty;
            }
            state.flush_in_flight = true;
            state.queue.drain(..).collect()
        };

        let count = batch.len();
        let payload = EventPayload::batch(batch);
        let result = self.transport.send(&payload).await;

        let mut state = self.lock();
        state.flush_in_flight = false;
        match result {
            Ok(()) => {
                // Events tracked while the batch was in flight keep the batched mode
                // so the next interval picks them up.
                if state.queue.is_empty() {
                    state.mode = DeliveryMode::RealTime;
                    debug!("Flushed {} analytics events, back to real-time delivery", count);
                } else {
                    debug!(
                        "Flushed {} analytics events, {} arrived meanwhile",
                        count,
                        state.queue.len()
                    );
                }
                FlushOutcome::Sent(count)
            }
            Err(e) => {
                warn!("Batch flush of {} analytics events failed: {}", count, e);
                for event in payload.into_events().into_iter().rev() {
                    state.queue.push_front(event);
                }
                state.queue.truncate(self.config.max_queue);
                state.mode = DeliveryMode::Batched;
                FlushOutcome::Requeued(count)
            }
        }
    }

    /// Empty the queue without sending, for the page-teardown beacon.
    pub fn drain(&self) -> Vec<AnalyticsEvent> {
        self.lock().queue.drain(..).collect()
    }

    /// Periodically flush while in batched mode. The task ends once the
    /// controller is dropped.
    pub fn spawn_flush_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let controller: Weak<Self> = Arc::downgrade(self);
        let period = self.config.flush_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    debug!("Delivery controller dropped, stopping flush loop");
                    break;
                };
                if controller.mode() == DeliveryMode::Batched {
                    controller.flush().await;
                }
            }
        })
    }
}
