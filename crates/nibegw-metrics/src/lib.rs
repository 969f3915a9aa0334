//! Metrics infrastructure for the Nibe accessory gateway.
//!
//! Every metric the gateway records is declared here as a [`Metric`] constant,
//! so names are never spelled twice and descriptions are registered once at
//! startup through [`describe_metrics`]. The `metrics` crate is re-exported.
//!
//! # Example
//!
//! ```rust,ignore
//! use nibegw_metrics::{MetricLabels, metric_defs, describe_metrics};
//!
//! describe_metrics();
//!
//! let labels = MetricLabels::new("0x0020", "nibe");
//! metrics::counter!(metric_defs::BUS_DATAGRAMS_RX.name, &labels.to_labels()).increment(1);
//! ```
//!
//! # Metric Type
//!
//! ```rust
//! use nibegw_metrics::{Metric, MetricKind};
//! use metrics::Unit;
//!
//! const MY_COUNTER: Metric = Metric::counter("my.counter")
//!     .with_description("A counter metric")
//!     .with_unit(Unit::Count)
//!     .with_labels(&["node", "kind"]);
//!
//! MY_COUNTER.describe();
//! metrics::counter!(MY_COUNTER.name).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use nibegw_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const FRAMES: Metric = Metric::counter("nibegw.bus.frames")
///     .with_description("Frames seen")
///     .with_unit(Unit::Count)
///     .with_labels(&["node"]);
///
/// assert_eq!(FRAMES.name, "nibegw.bus.frames");
/// assert_eq!(FRAMES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "nibegw.bus.datagrams_rx").
    pub name: &'static str,
    /// The kind of metric (counter, gauge, histogram).
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the metrics recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }

    /// Returns the unit as a human-readable string.
    pub fn unit_str(&self) -> &'static str {
        match self.unit {
            Some(Unit::Count) => "count",
            Some(Unit::Seconds) => "seconds",
            Some(Unit::Milliseconds) => "milliseconds",
            Some(Unit::Microseconds) => "microseconds",
            Some(Unit::Bytes) => "bytes",
            Some(_) => "other",
            None => "",
        }
    }
}

/// All metric definitions for the gateway.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Standard Label Keys
    // ========================================================================

    /// Labels present on every gateway metric.
    pub const STANDARD_LABELS: &[&str] = &["node", "instance"];

    // ========================================================================
    // Bus Metrics
    // ========================================================================

    /// Datagrams received from the gateway transport.
    pub const BUS_DATAGRAMS_RX: Metric = Metric::counter("nibegw.bus.datagrams_rx")
        .with_description("Datagrams received from the bus")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Datagrams sent back to the bus.
    pub const BUS_DATAGRAMS_TX: Metric = Metric::counter("nibegw.bus.datagrams_tx")
        .with_description("Datagrams sent to the bus")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Datagrams that failed to decode.
    ///
    /// Labels: node, instance, kind (truncated|malformed|checksum_mismatch|too_long)
    pub const BUS_FRAME_ERRORS: Metric = Metric::counter("nibegw.bus.frame_errors")
        .with_description("Datagrams that failed to decode")
        .with_unit(Unit::Count)
        .with_labels(&["node", "instance", "kind"]);

    /// Frames addressed to another node.
    pub const BUS_FOREIGN_FRAMES: Metric = Metric::counter("nibegw.bus.foreign_frames")
        .with_description("Frames addressed to other nodes")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// NAKs received for a transmitted request.
    pub const BUS_NAKS: Metric = Metric::counter("nibegw.bus.naks")
        .with_description("Negative acknowledgements received")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Time spent handling a poll before the reply is queued.
    pub const BUS_POLL_TURNAROUND: Metric = Metric::histogram("nibegw.bus.poll_turnaround_us")
        .with_description("Time from datagram receipt to reply in microseconds")
        .with_unit(Unit::Microseconds)
        .with_labels(STANDARD_LABELS);

    // ========================================================================
    // Engine Metrics
    // ========================================================================

    /// Values emitted.
    ///
    /// Labels: node, instance, provenance (polled|broadcast)
    pub const ENGINE_VALUES: Metric = Metric::counter("nibegw.engine.values")
        .with_description("Decoded values emitted")
        .with_unit(Unit::Count)
        .with_labels(&["node", "instance", "provenance"]);

    /// Values that failed to decode or were flagged invalid.
    ///
    /// Labels: node, instance, kind
    pub const ENGINE_VALUE_ERRORS: Metric = Metric::counter("nibegw.engine.value_errors")
        .with_description("Values rejected or flagged by the value codec")
        .with_unit(Unit::Count)
        .with_labels(&["node", "instance", "kind"]);

    /// Frames that matched no catalog item or no outstanding request.
    ///
    /// Labels: node, instance, reason (unknown_address|no_request)
    pub const ENGINE_UNMATCHED: Metric = Metric::counter("nibegw.engine.unmatched")
        .with_description("Frames dropped without a matching item or request")
        .with_unit(Unit::Count)
        .with_labels(&["node", "instance", "reason"]);

    /// Requests accepted by the engine.
    ///
    /// Labels: node, instance, kind (read|write)
    pub const ENGINE_REQUESTS: Metric = Metric::counter("nibegw.engine.requests")
        .with_description("Requests accepted for transmission")
        .with_unit(Unit::Count)
        .with_labels(&["node", "instance", "kind"]);

    /// Requests rejected because the address was already in flight.
    pub const ENGINE_BUSY: Metric = Metric::counter("nibegw.engine.busy")
        .with_description("Requests rejected as busy")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Request attempts that hit their deadline.
    pub const ENGINE_TIMEOUTS: Metric = Metric::counter("nibegw.engine.timeouts")
        .with_description("Request attempts that timed out")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Requests abandoned after the last retry.
    pub const ENGINE_EXHAUSTED: Metric = Metric::counter("nibegw.engine.exhausted")
        .with_description("Requests abandoned after exhausting retries")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Requests failed by shutdown.
    pub const ENGINE_ABORTED: Metric = Metric::counter("nibegw.engine.aborted")
        .with_description("Requests aborted at shutdown")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Writes the heat pump refused.
    pub const ENGINE_WRITES_REJECTED: Metric = Metric::counter("nibegw.engine.writes_rejected")
        .with_description("Writes rejected by the heat pump")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Requests currently outstanding.
    pub const ENGINE_OUTSTANDING: Metric = Metric::gauge("nibegw.engine.outstanding")
        .with_description("Requests currently outstanding")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Time from submit to fulfillment.
    pub const ENGINE_REQUEST_LATENCY: Metric = Metric::histogram("nibegw.engine.request_latency_ms")
        .with_description("Time from submit to response in milliseconds")
        .with_unit(Unit::Milliseconds)
        .with_labels(&["node", "instance", "kind"]);

    // ========================================================================
    // MQTT Bridge Metrics
    // ========================================================================

    /// Messages published to the broker.
    ///
    /// Labels: node, instance, topic_kind (res|diag)
    pub const MQTT_PUBLISHED: Metric = Metric::counter("nibegw.mqtt.published")
        .with_description("Messages published to the broker")
        .with_unit(Unit::Count)
        .with_labels(&["node", "instance", "topic_kind"]);

    /// Requests received from the broker.
    pub const MQTT_REQUESTS: Metric = Metric::counter("nibegw.mqtt.requests")
        .with_description("Read and write requests received from the broker")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// All metrics, for [`describe_metrics`](super::describe_metrics).
    pub const ALL: &[&Metric] = &[
        // Bus
        &BUS_DATAGRAMS_RX,
        &BUS_DATAGRAMS_TX,
        &BUS_FRAME_ERRORS,
        &BUS_FOREIGN_FRAMES,
        &BUS_NAKS,
        &BUS_POLL_TURNAROUND,
        // Engine
        &ENGINE_VALUES,
        &ENGINE_VALUE_ERRORS,
        &ENGINE_UNMATCHED,
        &ENGINE_REQUESTS,
        &ENGINE_BUSY,
        &ENGINE_TIMEOUTS,
        &ENGINE_EXHAUSTED,
        &ENGINE_ABORTED,
        &ENGINE_WRITES_REJECTED,
        &ENGINE_OUTSTANDING,
        &ENGINE_REQUEST_LATENCY,
        // MQTT
        &MQTT_PUBLISHED,
        &MQTT_REQUESTS,
    ];
}

/// Labels identifying which gateway instance a metric came from.
///
/// ```rust
/// use nibegw_metrics::MetricLabels;
///
/// let labels = MetricLabels::new("0x0020", "nibe");
/// let extended = labels.with(&[("kind", "read".to_string())]);
/// assert_eq!(extended.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct MetricLabels {
    /// Bus node this gateway answers as, e.g. `0x0020`.
    pub node: String,
    /// Instance name, normally the MQTT root topic.
    pub instance: String,
}

impl MetricLabels {
    /// Creates labels for the given node and instance.
    pub fn new(node: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            instance: instance.into(),
        }
    }

    /// Labels for a bus node address.
    pub fn for_node(node: u16, instance: impl Into<String>) -> Self {
        Self::new(format!("0x{:04X}", node), instance)
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![
            ("node", self.node.clone()),
            ("instance", self.instance.clone()),
        ]
    }

    /// Returns labels with additional key-value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describes all metrics used by the gateway.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Installs a Prometheus recorder serving `/metrics` on `addr`.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_labels_new() {
        let labels = MetricLabels::new("0x0020", "nibe");
        assert_eq!(labels.node, "0x0020");
        assert_eq!(labels.instance, "nibe");
    }

    #[test]
    fn test_metric_labels_for_node() {
        let labels = MetricLabels::for_node(0x20, "nibe");
        assert_eq!(labels.node, "0x0020");
    }

    #[test]
    fn test_to_labels() {
        let labels = MetricLabels::new("0x0020", "nibe");
        let label_vec = labels.to_labels();

        assert_eq!(label_vec.len(), 2);
        assert!(label_vec.contains(&("node", "0x0020".to_string())));
        assert!(label_vec.contains(&("instance", "nibe".to_string())));
    }

    #[test]
    fn test_with_extra_labels() {
        let labels = MetricLabels::new("0x0020", "nibe");
        let extended = labels.with(&[("kind", "checksum_mismatch".to_string())]);

        assert_eq!(extended.len(), 3);
        assert!(extended.contains(&("kind", "checksum_mismatch".to_string())));
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::BUS_DATAGRAMS_RX.name, "nibegw.bus.datagrams_rx");
        assert_eq!(metric_defs::BUS_DATAGRAMS_RX.kind, MetricKind::Counter);
        assert_eq!(metric_defs::BUS_POLL_TURNAROUND.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::BUS_POLL_TURNAROUND.unit, Some(Unit::Microseconds));
        assert_eq!(metric_defs::ENGINE_OUTSTANDING.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::ENGINE_UNMATCHED.labels, &["node", "instance", "reason"]);
    }

    #[test]
    fn test_all_metrics_count() {
        assert_eq!(metric_defs::ALL.len(), 19);
    }

    #[test]
    fn test_metric_names_unique() {
        let mut names: Vec<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_metric_minimal() {
        const MINIMAL: Metric = Metric::counter("minimal");

        assert_eq!(MINIMAL.name, "minimal");
        assert_eq!(MINIMAL.kind, MetricKind::Counter);
        assert_eq!(MINIMAL.description, "");
        assert_eq!(MINIMAL.unit, None);
        assert_eq!(MINIMAL.unit_str(), "");
        assert_eq!(MINIMAL.labels, &[] as &[&str]);
    }
}
