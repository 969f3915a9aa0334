//! Poll/correlation engine.
//!
//! The engine plays the MODBUS40 accessory on the bus. It owns the table of
//! outstanding requests and is driven by exactly one caller, one datagram or
//! tick at a time, so a response and a timeout can never race for the same
//! address.
//!
//! ## Bus discipline
//!
//! The heat pump is the bus master. An accessory may only talk when handed a
//! poll token: a read token (`69`) lets it send one read request, a write
//! token (`6B`) one write request. Every other frame addressed to the
//! accessory must be acknowledged immediately or the pump times the bus out.
//!
//! A submitted request is encoded straight away, queued, and sent as the
//! reply to the next matching token. Only one request is on the bus at a
//! time. ACK moves it to waiting for its response, NAK puts it back at the
//! front of the queue, and a repeated token before any handshake resends it.
//!
//! ```text
//!  submit ──► Queued ──token──► Sent ──ACK──► Acked ──response──► Idle
//!               ▲                 │
//!               └──────NAK────────┘        deadline ──► retry or Idle
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nibegw_metrics::{metric_defs, MetricLabels};
use nibegw_model::codec::{self, Decoded};
use nibegw_model::{Catalog, DataItemDefinition, ItemSize, Value};
use nibegw_protocol::{
    BusMessage, DataSlot, FrameCodec, FrameError, Handshake, NibeGwCodec, Origin, ADDR_MODBUS40,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::SubmitError;
use crate::events::{Diagnostic, Provenance, RequestKind, ValueEvent};

// ============================================================================
// Configuration
// ============================================================================

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Node address this engine answers as.
    pub node: u16,
    /// Time from submit until an attempt times out (milliseconds).
    pub request_timeout_ms: u64,
    /// Extra attempts after the first timeout.
    pub max_retries: u32,
    /// Emit values flagged invalid on the value stream as well as reporting them.
    pub publish_invalid: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            node: ADDR_MODBUS40,
            request_timeout_ms: 5000,
            max_retries: 2,
            publish_invalid: true,
        }
    }
}

impl EngineConfig {
    /// The request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

// ============================================================================
// Output Channels
// ============================================================================

/// Sending side of the engine's outputs. Sends never block.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    frames: mpsc::UnboundedSender<Vec<u8>>,
    values: mpsc::UnboundedSender<ValueEvent>,
    diagnostics: mpsc::UnboundedSender<Diagnostic>,
}

/// Receiving side of the engine's outputs.
#[derive(Debug)]
pub struct EngineReceivers {
    /// Encoded datagrams for the bus.
    pub frames: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Decoded values.
    pub values: mpsc::UnboundedReceiver<ValueEvent>,
    /// Failure events.
    pub diagnostics: mpsc::UnboundedReceiver<Diagnostic>,
}

/// Create a connected output/receiver pair.
pub fn output_channel() -> (EngineOutput, EngineReceivers) {
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (values_tx, values_rx) = mpsc::unbounded_channel();
    let (diag_tx, diag_rx) = mpsc::unbounded_channel();
    (
        EngineOutput {
            frames: frames_tx,
            values: values_tx,
            diagnostics: diag_tx,
        },
        EngineReceivers {
            frames: frames_rx,
            values: values_rx,
            diagnostics: diag_rx,
        },
    )
}

// ============================================================================
// State
// ============================================================================

/// Externally visible state of one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// No request outstanding.
    Idle,
    /// A request is outstanding.
    Requested,
}

/// Where an outstanding request is on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusPhase {
    /// Waiting for a matching poll token.
    Queued,
    /// Sent as a token reply, no handshake yet.
    Sent,
    /// Acknowledged, waiting for the response frame.
    Acked,
}

#[derive(Debug)]
struct OutstandingRequest {
    address: u16,
    name: String,
    kind: RequestKind,
    pending_value: Option<Value>,
    frame: Vec<u8>,
    deadline: Instant,
    attempts_left: u32,
    phase: BusPhase,
    submitted_at: Instant,
}

/// Counters kept by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Datagrams handed to [`Engine::on_datagram`].
    pub datagrams_rx: u64,
    /// Datagrams emitted on the frame channel.
    pub datagrams_tx: u64,
    /// Datagrams or frames that failed to decode.
    pub frame_errors: u64,
    /// Frames addressed to other nodes.
    pub foreign_frames: u64,
    /// NAKs received for a request on the bus.
    pub naks: u64,
    /// Frames matching no catalog item or no outstanding request.
    pub unmatched: u64,
    /// Values emitted from data messages.
    pub broadcast_values: u64,
    /// Values emitted from responses.
    pub polled_values: u64,
    /// Values that failed to decode or were flagged invalid.
    pub value_errors: u64,
    /// Requests accepted.
    pub requests_submitted: u64,
    /// Requests rejected as busy.
    pub busy: u64,
    /// Attempts that timed out.
    pub timeouts: u64,
    /// Requests abandoned after the last retry.
    pub exhausted: u64,
    /// Requests failed by shutdown.
    pub aborted: u64,
    /// Writes refused by the heat pump.
    pub writes_rejected: u64,
}

// ============================================================================
// Engine
// ============================================================================

/// The poll/correlation state machine.
pub struct Engine<C: FrameCodec = NibeGwCodec> {
    catalog: Arc<Catalog>,
    config: EngineConfig,
    codec: C,
    output: EngineOutput,
    labels: MetricLabels,
    requests: HashMap<u16, OutstandingRequest>,
    queue: VecDeque<u16>,
    on_bus: Option<u16>,
    awaiting_write_response: VecDeque<u16>,
    stats: EngineStats,
}

impl Engine<NibeGwCodec> {
    /// Create an engine using the default wire layout.
    pub fn new(catalog: Arc<Catalog>, config: EngineConfig, output: EngineOutput) -> Self {
        Engine::with_codec(catalog, config, NibeGwCodec, output)
    }
}

impl<C: FrameCodec> Engine<C> {
    /// Create an engine with a custom frame codec.
    pub fn with_codec(
        catalog: Arc<Catalog>,
        config: EngineConfig,
        codec: C,
        output: EngineOutput,
    ) -> Self {
        let labels = MetricLabels::for_node(config.node, "nibegw");
        Engine {
            catalog,
            config,
            codec,
            output,
            labels,
            requests: HashMap::new(),
            queue: VecDeque::new(),
            on_bus: None,
            awaiting_write_response: VecDeque::new(),
            stats: EngineStats::default(),
        }
    }

    /// Replace the metric labels.
    pub fn with_labels(mut self, labels: MetricLabels) -> Self {
        self.labels = labels;
        self
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Counters so far.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// State of one address.
    pub fn state(&self, address: u16) -> RequestState {
        if self.requests.contains_key(&address) {
            RequestState::Requested
        } else {
            RequestState::Idle
        }
    }

    /// Number of outstanding requests.
    pub fn outstanding(&self) -> usize {
        self.requests.len()
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Queue a write of `value` to the item called `name`.
    ///
    /// The value is encoded before anything is queued, so an invalid value
    /// never produces a frame.
    pub fn submit_write(&mut self, name: &str, value: Value, now: Instant) -> Result<(), SubmitError> {
        let catalog = Arc::clone(&self.catalog);
        let def = self.lookup_name(&catalog, name)?;

        let register_value = codec::encode_register(def, &value).map_err(|source| {
            self.value_error(def, source.to_string(), source.kind());
            SubmitError::Value {
                name: def.id.clone(),
                source,
            }
        })?;

        self.check_idle(def, RequestKind::Write)?;

        // Report what the register will hold, not what was asked for
        let pending = codec::decode(def, &register_value)
            .map(|decoded| decoded.value)
            .unwrap_or(value);

        let message = BusMessage::WriteRequest {
            register: def.address,
            value: register_value,
        };
        self.enqueue(def, RequestKind::Write, Some(pending), message, now)
    }

    /// Queue a write given a JSON scalar, as received from MQTT.
    pub fn submit_write_json(
        &mut self,
        name: &str,
        json: &serde_json::Value,
        now: Instant,
    ) -> Result<(), SubmitError> {
        match Value::try_from(json) {
            Ok(value) => self.submit_write(name, value, now),
            Err(source) => {
                let catalog = Arc::clone(&self.catalog);
                let def = self.lookup_name(&catalog, name)?;
                self.value_error(def, source.to_string(), source.kind());
                Err(SubmitError::Value {
                    name: def.id.clone(),
                    source,
                })
            }
        }
    }

    /// Queue a read of the register at `address`.
    pub fn submit_read(&mut self, address: u16, now: Instant) -> Result<(), SubmitError> {
        let catalog = Arc::clone(&self.catalog);
        let Some(def) = catalog.by_address(address) else {
            self.emit_diagnostic(Diagnostic::UnknownItem {
                name: address.to_string(),
            });
            return Err(SubmitError::UnknownAddress(address));
        };

        self.check_idle(def, RequestKind::Read)?;

        let message = BusMessage::ReadRequest {
            register: def.address,
        };
        self.enqueue(def, RequestKind::Read, None, message, now)
    }

    /// Queue a read of the item called `name`.
    pub fn submit_read_by_name(&mut self, name: &str, now: Instant) -> Result<(), SubmitError> {
        let catalog = Arc::clone(&self.catalog);
        let def = self.lookup_name(&catalog, name)?;
        self.submit_read(def.address, now)
    }

    fn lookup_name<'a>(
        &mut self,
        catalog: &'a Catalog,
        name: &str,
    ) -> Result<&'a DataItemDefinition, SubmitError> {
        catalog.by_name(name).ok_or_else(|| {
            self.emit_diagnostic(Diagnostic::UnknownItem {
                name: name.to_string(),
            });
            SubmitError::UnknownItem(name.to_string())
        })
    }

    fn check_idle(&mut self, def: &DataItemDefinition, kind: RequestKind) -> Result<(), SubmitError> {
        if !self.requests.contains_key(&def.address) {
            return Ok(());
        }
        debug!("{}: busy, rejecting {}", def.id, kind.as_str());
        self.stats.busy += 1;
        metrics::counter!(metric_defs::ENGINE_BUSY.name, &self.labels.to_labels()).increment(1);
        self.emit_diagnostic(Diagnostic::Busy {
            name: def.id.clone(),
            address: def.address,
            request: kind,
        });
        Err(SubmitError::Busy {
            address: def.address,
        })
    }

    fn enqueue(
        &mut self,
        def: &DataItemDefinition,
        kind: RequestKind,
        pending_value: Option<Value>,
        message: BusMessage,
        now: Instant,
    ) -> Result<(), SubmitError> {
        let frame = message.to_frame(Origin::Accessory)?;
        let frame = self.codec.encode(&frame);

        debug!(
            "{}: queued {} ({})",
            def.id,
            kind.as_str(),
            hex::encode(&frame)
        );

        self.requests.insert(
            def.address,
            OutstandingRequest {
                address: def.address,
                name: def.id.clone(),
                kind,
                pending_value,
                frame,
                deadline: now + self.config.request_timeout(),
                attempts_left: self.config.max_retries,
                phase: BusPhase::Queued,
                submitted_at: now,
            },
        );
        self.queue.push_back(def.address);

        self.stats.requests_submitted += 1;
        metrics::counter!(
            metric_defs::ENGINE_REQUESTS.name,
            &self.labels.with(&[("kind", kind.as_str().to_string())])
        )
        .increment(1);
        self.update_outstanding_gauge();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    /// Process one datagram from the bus.
    ///
    /// Polls and every other frame addressed to this node are answered
    /// before this returns. Errors are counted and reported, never returned.
    pub fn on_datagram(&mut self, bytes: &[u8], now: Instant) {
        let started = Instant::now();
        self.stats.datagrams_rx += 1;
        metrics::counter!(metric_defs::BUS_DATAGRAMS_RX.name, &self.labels.to_labels()).increment(1);
        trace!("IN {}", hex::encode(bytes));

        let datagram = match self.codec.decode(bytes) {
            Ok(datagram) => datagram,
            Err(e) => {
                self.frame_error(e);
                return;
            }
        };

        if let Some(handshake) = datagram.handshake {
            self.on_handshake(handshake);
        }

        let Some(frame) = datagram.frame else {
            return;
        };

        if !frame.is_addressed_to(self.config.node) {
            trace!("ignoring frame for {:?}", frame.origin());
            self.stats.foreign_frames += 1;
            metrics::counter!(metric_defs::BUS_FOREIGN_FRAMES.name, &self.labels.to_labels())
                .increment(1);
            return;
        }

        let message = match BusMessage::decode(&frame) {
            Ok(message) => message,
            Err(e) => {
                self.frame_error(e);
                return;
            }
        };

        match message {
            BusMessage::ReadPoll => self.on_poll(RequestKind::Read),
            BusMessage::WritePoll => self.on_poll(RequestKind::Write),
            other => {
                self.send_handshake(Handshake::Ack);
                self.record_turnaround(started);
                self.on_message(other, now);
                return;
            }
        }
        self.record_turnaround(started);
    }

    fn on_handshake(&mut self, handshake: Handshake) {
        let Some(address) = self.on_bus else {
            trace!("{:?} with nothing on the bus", handshake);
            return;
        };
        self.on_bus = None;

        let Some(req) = self.requests.get_mut(&address) else {
            return;
        };

        match handshake {
            Handshake::Ack => {
                trace!("{}: acknowledged", req.name);
                req.phase = BusPhase::Acked;
                if req.kind == RequestKind::Write {
                    self.awaiting_write_response.push_back(address);
                }
            }
            Handshake::Nak => {
                warn!("{}: NAK, requeueing", req.name);
                req.phase = BusPhase::Queued;
                self.queue.push_front(address);
                self.stats.naks += 1;
                metrics::counter!(metric_defs::BUS_NAKS.name, &self.labels.to_labels()).increment(1);
            }
        }
    }

    fn on_poll(&mut self, token: RequestKind) {
        if let Some(address) = self.on_bus {
            match self.requests.get(&address) {
                Some(req) if req.kind == token => {
                    warn!("{}: resending unacked {}", req.name, token.as_str());
                    let frame = req.frame.clone();
                    self.send(frame);
                }
                _ => self.send_handshake(Handshake::Ack),
            }
            return;
        }

        let next = self
            .queue
            .iter()
            .position(|addr| self.requests.get(addr).is_some_and(|r| r.kind == token));

        let Some(index) = next else {
            self.send_handshake(Handshake::Ack);
            return;
        };

        let Some(address) = self.queue.remove(index) else {
            self.send_handshake(Handshake::Ack);
            return;
        };
        let frame = match self.requests.get_mut(&address) {
            Some(req) => {
                req.phase = BusPhase::Sent;
                debug!("{}: sending {}", req.name, token.as_str());
                req.frame.clone()
            }
            None => {
                self.send_handshake(Handshake::Ack);
                return;
            }
        };
        self.on_bus = Some(address);
        self.send(frame);
    }

    fn on_message(&mut self, message: BusMessage, now: Instant) {
        match message {
            BusMessage::ReadResponse { register, value } => self.on_read_response(register, &value, now),
            BusMessage::WriteResponse { accepted } => self.on_write_response(accepted, now),
            BusMessage::DataMessage(slots) => self.on_data_message(&slots),
            other => trace!("ignoring {:?}", other.command()),
        }
    }

    fn on_read_response(&mut self, register: u16, value: &[u8], now: Instant) {
        let catalog = Arc::clone(&self.catalog);
        let Some(def) = catalog.by_address(register) else {
            self.unmatched("unknown_address", register);
            return;
        };

        let matched = self.requests.get(&register).is_some_and(|r| {
            r.kind == RequestKind::Read && matches!(r.phase, BusPhase::Sent | BusPhase::Acked)
        });
        if !matched {
            self.unmatched("no_request", register);
            return;
        }

        if let Some(req) = self.complete(register) {
            self.record_latency(&req, now);
        }

        match codec::decode(def, value) {
            Ok(decoded) => self.emit_value(def, decoded, Provenance::PolledResponse),
            Err(e) => self.value_error(def, e.to_string(), e.kind()),
        }
    }

    fn on_write_response(&mut self, accepted: bool, now: Instant) {
        let address = match self.awaiting_write_response.pop_front() {
            Some(address) => Some(address),
            // ACK lost but the response arrived anyway
            None => self
                .on_bus
                .filter(|a| self.requests.get(a).is_some_and(|r| r.kind == RequestKind::Write)),
        };

        let Some(req) = address.and_then(|a| self.complete(a)) else {
            self.unmatched("no_request", 0);
            return;
        };
        self.record_latency(&req, now);

        if accepted {
            info!("{}: write accepted", req.name);
            if let Some(value) = req.pending_value {
                self.emit_value_event(ValueEvent {
                    name: req.name,
                    address: req.address,
                    value,
                    provenance: Provenance::PolledResponse,
                    invalid: None,
                });
            }
        } else {
            warn!("{}: write rejected", req.name);
            self.stats.writes_rejected += 1;
            metrics::counter!(metric_defs::ENGINE_WRITES_REJECTED.name, &self.labels.to_labels())
                .increment(1);
            self.emit_diagnostic(Diagnostic::WriteRejected {
                name: req.name,
                address: req.address,
            });
        }
    }

    fn on_data_message(&mut self, slots: &[DataSlot]) {
        let catalog = Arc::clone(&self.catalog);
        let mut slots = slots.iter().peekable();

        while let Some(slot) = slots.next() {
            if slot.is_unused() {
                continue;
            }
            let Some(def) = catalog.by_address(slot.register) else {
                self.unmatched("unknown_address", slot.register);
                continue;
            };

            let mut payload = slot.value.to_vec();
            if def.size == ItemSize::Four {
                // High word rides in the slot for the following register
                let high_register = def.address.wrapping_add(1);
                if let Some(high) = slots.next_if(|next| next.register == high_register) {
                    payload.extend_from_slice(&high.value);
                }
            }

            match codec::decode(def, &payload) {
                Ok(decoded) => self.emit_value(def, decoded, Provenance::Broadcast),
                Err(e) => self.value_error(def, e.to_string(), e.kind()),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Timeouts and shutdown
    // ------------------------------------------------------------------------

    /// Expire every request whose deadline is at or before `now`.
    ///
    /// Expired requests with retries left are requeued with a fresh deadline;
    /// the rest are reported as exhausted.
    pub fn on_tick(&mut self, now: Instant) {
        let mut expired: Vec<u16> = self
            .requests
            .values()
            .filter(|r| now >= r.deadline)
            .map(|r| r.address)
            .collect();
        if expired.is_empty() {
            return;
        }
        expired.sort_unstable();

        for address in expired {
            let Some(mut req) = self.complete(address) else {
                continue;
            };

            warn!(
                "{}: {} timed out ({} retries left)",
                req.name,
                req.kind.as_str(),
                req.attempts_left
            );
            self.stats.timeouts += 1;
            metrics::counter!(metric_defs::ENGINE_TIMEOUTS.name, &self.labels.to_labels()).increment(1);
            self.emit_diagnostic(Diagnostic::Timeout {
                name: req.name.clone(),
                address,
                request: req.kind,
                attempts_left: req.attempts_left,
            });

            if req.attempts_left > 0 {
                req.attempts_left -= 1;
                req.deadline = now + self.config.request_timeout();
                req.phase = BusPhase::Queued;
                self.requests.insert(address, req);
                self.queue.push_back(address);
            } else {
                self.stats.exhausted += 1;
                metrics::counter!(metric_defs::ENGINE_EXHAUSTED.name, &self.labels.to_labels())
                    .increment(1);
                self.emit_diagnostic(Diagnostic::Exhausted {
                    name: req.name,
                    address,
                    request: req.kind,
                });
            }
        }
        self.update_outstanding_gauge();
    }

    /// Fail every outstanding request as aborted and clear the table.
    pub fn shutdown(&mut self) {
        let mut addresses: Vec<u16> = self.requests.keys().copied().collect();
        addresses.sort_unstable();

        for address in addresses {
            if let Some(req) = self.complete(address) {
                info!("{}: aborting {}", req.name, req.kind.as_str());
                self.stats.aborted += 1;
                metrics::counter!(metric_defs::ENGINE_ABORTED.name, &self.labels.to_labels())
                    .increment(1);
                self.emit_diagnostic(Diagnostic::Aborted {
                    name: req.name,
                    address,
                    request: req.kind,
                });
            }
        }
        self.update_outstanding_gauge();
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Remove a request from the table and from wherever it sits on the bus.
    fn complete(&mut self, address: u16) -> Option<OutstandingRequest> {
        let req = self.requests.remove(&address)?;
        match req.phase {
            BusPhase::Queued => self.queue.retain(|&a| a != address),
            BusPhase::Sent => {
                if self.on_bus == Some(address) {
                    self.on_bus = None;
                }
            }
            BusPhase::Acked => self.awaiting_write_response.retain(|&a| a != address),
        }
        self.update_outstanding_gauge();
        Some(req)
    }

    fn emit_value(&mut self, def: &DataItemDefinition, decoded: Decoded, provenance: Provenance) {
        if let Some(reason) = &decoded.invalid {
            let error = reason.to_error();
            warn!("{}: invalid value {} ({})", def.id, decoded.value, error);
            self.value_error(def, error.to_string(), error.kind());
            if !self.config.publish_invalid {
                return;
            }
        }

        self.emit_value_event(ValueEvent {
            name: def.id.clone(),
            address: def.address,
            value: decoded.value,
            provenance,
            invalid: decoded.invalid,
        });
    }

    fn emit_value_event(&mut self, event: ValueEvent) {
        debug!("{}: {} ({})", event.name, event.value, event.provenance.as_str());
        match event.provenance {
            Provenance::PolledResponse => self.stats.polled_values += 1,
            Provenance::Broadcast => self.stats.broadcast_values += 1,
        }
        metrics::counter!(
            metric_defs::ENGINE_VALUES.name,
            &self.labels.with(&[("provenance", event.provenance.as_str().to_string())])
        )
        .increment(1);

        if self.output.values.send(event).is_err() {
            trace!("value receiver dropped");
        }
    }

    fn emit_diagnostic(&mut self, diagnostic: Diagnostic) {
        if self.output.diagnostics.send(diagnostic).is_err() {
            trace!("diagnostic receiver dropped");
        }
    }

    fn value_error(&mut self, def: &DataItemDefinition, error: String, kind: &'static str) {
        self.stats.value_errors += 1;
        metrics::counter!(
            metric_defs::ENGINE_VALUE_ERRORS.name,
            &self.labels.with(&[("kind", kind.to_string())])
        )
        .increment(1);
        self.emit_diagnostic(Diagnostic::Value {
            name: def.id.clone(),
            address: def.address,
            error,
        });
    }

    fn frame_error(&mut self, error: FrameError) {
        warn!("dropping datagram: {}", error);
        self.stats.frame_errors += 1;
        metrics::counter!(
            metric_defs::BUS_FRAME_ERRORS.name,
            &self.labels.with(&[("kind", error.kind().to_string())])
        )
        .increment(1);
        self.emit_diagnostic(Diagnostic::Frame {
            reason: error.kind(),
            error: error.to_string(),
        });
    }

    fn unmatched(&mut self, reason: &'static str, register: u16) {
        debug!("unmatched frame for register {} ({})", register, reason);
        self.stats.unmatched += 1;
        metrics::counter!(
            metric_defs::ENGINE_UNMATCHED.name,
            &self.labels.with(&[("reason", reason.to_string())])
        )
        .increment(1);
    }

    fn send(&mut self, frame: Vec<u8>) {
        trace!("OUT {}", hex::encode(&frame));
        self.stats.datagrams_tx += 1;
        metrics::counter!(metric_defs::BUS_DATAGRAMS_TX.name, &self.labels.to_labels()).increment(1);
        if self.output.frames.send(frame).is_err() {
            trace!("frame receiver dropped");
        }
    }

    fn send_handshake(&mut self, handshake: Handshake) {
        let bytes = self.codec.encode_handshake(handshake);
        self.send(bytes);
    }

    fn record_turnaround(&self, started: Instant) {
        metrics::histogram!(metric_defs::BUS_POLL_TURNAROUND.name, &self.labels.to_labels())
            .record(started.elapsed().as_micros() as f64);
    }

    fn record_latency(&self, req: &OutstandingRequest, now: Instant) {
        let latency = now.saturating_duration_since(req.submitted_at);
        metrics::histogram!(
            metric_defs::ENGINE_REQUEST_LATENCY.name,
            &self.labels.with(&[("kind", req.kind.as_str().to_string())])
        )
        .record(latency.as_secs_f64() * 1000.0);
    }

    fn update_outstanding_gauge(&self) {
        metrics::gauge!(metric_defs::ENGINE_OUTSTANDING.name, &self.labels.to_labels())
            .set(self.requests.len() as f64);
    }
}
