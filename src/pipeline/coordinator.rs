//! Scan Coordinator
//!
//! Single owner of the current scan attempt. Consumes host commands and
//! worker envelopes from one channel in arrival order, and is the only place
//! guidance, live text and decisions are emitted from.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::analysis::events::{EventEmitter, ScanEvent};
use crate::shared::messages::{CoordinatorMessage, Envelope, FrameEvent};

use super::attempt::{AttemptOutput, ScanAttempt};
use super::dispatch::Dispatcher;

pub struct Coordinator {
    rx: Receiver<CoordinatorMessage>,
    events: Arc<EventEmitter>,
    dispatcher: Arc<Dispatcher>,
    tick: Duration,
    current: Option<ScanAttempt>,
    fast_mode: bool,
}

impl Coordinator {
    /// Create a coordinator that wakes at least every `tick` to check budgets
    pub fn new(
        rx: Receiver<CoordinatorMessage>,
        events: Arc<EventEmitter>,
        dispatcher: Arc<Dispatcher>,
        tick: Duration,
    ) -> Self {
        Self {
            rx,
            events,
            dispatcher,
            tick,
            current: None,
            fast_mode: false,
        }
    }

    /// Run until shutdown or until every sender is gone
    pub fn run(mut self) {
        info!("Scan coordinator starting...");
        loop {
            match self.rx.recv_timeout(self.tick) {
                Ok(CoordinatorMessage::Shutdown) => break,
                Ok(msg) => self.handle(msg, Instant::now()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.check_budget(Instant::now());
        }
        if let Some(attempt) = self.current.take() {
            info!("Attempt {} abandoned at shutdown", attempt.id());
        }
        info!("Scan coordinator exiting...");
    }

    /// Handle one message
    pub fn handle(&mut self, msg: CoordinatorMessage, now: Instant) {
        match msg {
            CoordinatorMessage::StartAttempt(attempt) => self.start(*attempt),
            CoordinatorMessage::CancelAttempt(id) => {
                if self.current.as_ref().map(|a| a.id()) == Some(id) {
                    self.current = None;
                    info!("Attempt {} cancelled", id);
                }
            }
            CoordinatorMessage::SetManualRoi(roi) => {
                if let Some(attempt) = self.current.as_mut() {
                    match attempt.set_manual_roi(roi) {
                        Ok(config) => self.dispatcher.publish_config(config),
                        Err(e) => warn!("Manual ROI rejected: {}", e),
                    }
                }
            }
            CoordinatorMessage::ClearManualRoi => {
                if let Some(config) = self.current.as_mut().and_then(|a| a.clear_manual_roi()) {
                    self.dispatcher.publish_config(config);
                }
            }
            CoordinatorMessage::FastMode(fast_mode) => {
                self.fast_mode = fast_mode;
                if let Some(config) = self.current.as_mut().and_then(|a| a.set_fast_mode(fast_mode)) {
                    self.dispatcher.publish_config(config);
                }
            }
            CoordinatorMessage::Frame(envelope) => self.on_envelope(envelope, now),
            CoordinatorMessage::Shutdown => {}
        }
    }

    /// Expire the current attempt once its time budget is spent
    pub fn check_budget(&mut self, now: Instant) {
        let output = self.current.as_mut().and_then(|a| a.check_budget(now));
        if let Some(output) = output {
            self.publish(output);
        }
    }

    /// Get the attempt currently owned by the coordinator
    pub fn current(&self) -> Option<&ScanAttempt> {
        self.current.as_ref()
    }

    fn start(&mut self, mut attempt: ScanAttempt) {
        if let Some(previous) = self.current.take() {
            info!("Attempt {} replaced by {}", previous.id(), attempt.id());
        }
        if let Some(config) = attempt.set_fast_mode(self.fast_mode) {
            self.dispatcher.publish_config(config);
        }
        self.events.emit(ScanEvent::Guidance(attempt.initial_guidance()));
        self.current = Some(attempt);
    }

    fn on_envelope(&mut self, envelope: Envelope, now: Instant) {
        let Some(attempt) = self.current.as_mut().filter(|a| a.id() == envelope.attempt) else {
            debug!("Discarding stale envelope for attempt {}", envelope.attempt);
            self.dispatcher.record(|s| s.stale_envelopes += 1);
            return;
        };

        if let FrameEvent::FrameDone {
            engine_failure: Some(_),
            ..
        } = &envelope.event
        {
            self.dispatcher.record(|s| s.engine_failures += 1);
        }

        let output = attempt.handle(envelope.event, now);
        self.publish(output);
    }

    /// Emit an attempt's output in order: config, live text, guidance, decision
    fn publish(&mut self, output: AttemptOutput) {
        let Some(id) = self.current.as_ref().map(|a| a.id()) else {
            return;
        };

        if let Some(config) = output.config {
            self.dispatcher.publish_config(config);
        }
        if let Some((text, confidence)) = output.live_text {
            self.events.emit(ScanEvent::LiveText {
                attempt: id,
                text,
                confidence,
            });
        }
        if let Some(guidance) = output.guidance {
            self.events.emit(ScanEvent::Guidance(guidance));
        }
        if let Some(decision) = output.decision {
            info!("Attempt {} decided: {}", id, decision);
            self.events.emit(ScanEvent::Decision {
                attempt: id,
                decision,
            });
            self.dispatcher.record(|s| s.decisions += 1);
            if self.dispatcher.active().write().finish(id) {
                self.dispatcher.clear_deferred();
            }
            self.current = None;
        }
    }
}
