//! MQTT side of the service.
//!
//! Topics, relative to the configured root:
//!
//! | Topic            | Direction | Payload                                   |
//! |------------------|-----------|-------------------------------------------|
//! | `req/<name>`     | in        | empty to read, a JSON scalar to write     |
//! | `res/<name>`     | out       | the value as JSON (see [`value_payload`]) |
//! | `diag`           | out       | a [`Diagnostic`] as JSON                  |

use std::time::Duration;

use crossbeam_channel::Sender;
use nibegw_metrics::{metric_defs, MetricLabels};
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::error::ServiceError;
use crate::event_loop::EngineCommand;
use crate::events::{Diagnostic, ValueEvent};
use crate::reactions::Reactions;

/// Delay before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// Turn a message on `<root>/req/<name>` into an engine command.
///
/// Payloads that are not valid JSON are taken as a bare string, so
/// `LUXURY` and `"LUXURY"` both work for enum items.
pub fn parse_request(root: &str, topic: &str, payload: &[u8]) -> Option<EngineCommand> {
    let name = topic.strip_prefix(root)?.strip_prefix("/req/")?;
    if name.is_empty() || name.contains('/') {
        return None;
    }
    let name = name.to_string();

    let text = String::from_utf8_lossy(payload);
    let text = text.trim();
    if text.is_empty() {
        return Some(EngineCommand::Read { name });
    }

    let value = serde_json::from_str(text)
        .unwrap_or_else(|_| serde_json::Value::String(text.to_string()));
    Some(EngineCommand::Write { name, value })
}

/// Publishes engine output under the root topic.
struct Publisher {
    client: AsyncClient,
    root: String,
    qos: QoS,
    envelope: bool,
    labels: MetricLabels,
}

impl Publisher {
    async fn value(&self, event: &ValueEvent) {
        match value_payload(event, self.envelope) {
            Ok(payload) => {
                let topic = format!("{}/res/{}", self.root, event.name);
                self.publish(topic, payload, "res").await;
            }
            Err(e) => warn!("{}: cannot serialize value: {}", event.name, e),
        }
    }

    async fn diagnostic(&self, diagnostic: &Diagnostic) {
        match serde_json::to_string(diagnostic) {
            Ok(payload) => {
                let topic = format!("{}/diag", self.root);
                self.publish(topic, payload, "diag").await;
            }
            Err(e) => warn!("cannot serialize diagnostic: {}", e),
        }
    }

    /// Waits for room in the client queue, so nothing is dropped while the
    /// broker is slow or reconnecting.
    async fn publish(&self, topic: String, payload: String, topic_kind: &'static str) {
        debug!("publish {} {}", topic, payload);
        match self.client.publish(topic.as_str(), self.qos, false, payload).await {
            Ok(()) => {
                metrics::counter!(
                    metric_defs::MQTT_PUBLISHED.name,
                    &self.labels.with(&[("topic_kind", topic_kind.to_string())])
                )
                .increment(1);
            }
            Err(e) => warn!("publish to {} failed: {}", topic, e),
        }
    }
}

/// Payload for `<root>/res/<name>`.
///
/// The bare JSON value by default. With `envelope` set, an object that also
/// carries the provenance and the invalid flag.
pub fn value_payload(event: &ValueEvent, envelope: bool) -> serde_json::Result<String> {
    if !envelope {
        return serde_json::to_string(&event.value);
    }
    serde_json::to_string(&serde_json::json!({
        "value": event.value,
        "provenance": event.provenance,
        "invalid": event.invalid.is_some(),
    }))
}

/// Run the MQTT bridge until the engine's value and diagnostic streams close.
///
/// Each value event is first checked against `reactions`, then published.
/// Publishing waits while the client queue is full; the engine's unbounded
/// output channels absorb the backlog.
pub async fn run_mqtt_bridge(
    config: MqttConfig,
    commands: Sender<EngineCommand>,
    mut values: mpsc::UnboundedReceiver<ValueEvent>,
    mut diagnostics: mpsc::UnboundedReceiver<Diagnostic>,
    reactions: Reactions,
    labels: MetricLabels,
) -> Result<(), ServiceError> {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(config.keep_alive());
    options.set_clean_session(true);
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }

    let qos = qos(config.qos);
    let root = config.topic.clone();
    let (client, mut eventloop) = AsyncClient::new(options, config.channel_capacity.max(1));

    info!("connecting to MQTT broker {}:{}", config.host, config.port);

    let poller = {
        let client = client.clone();
        let commands = commands.clone();
        let labels = labels.clone();
        let root = root.clone();
        let filter = format!("{}/req/#", root);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected, subscribing to {}", filter);
                        // Queued behind any backlog of publishes
                        let client = client.clone();
                        let filter = filter.clone();
                        tokio::spawn(async move {
                            if let Err(e) = client.subscribe(filter.as_str(), qos).await {
                                warn!("subscribe to {} failed: {}", filter, e);
                            }
                        });
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let Some(command) = parse_request(&root, &publish.topic, &publish.payload)
                        else {
                            debug!("ignoring message on {}", publish.topic);
                            continue;
                        };
                        debug!("request {:?}", command);
                        metrics::counter!(metric_defs::MQTT_REQUESTS.name, &labels.to_labels())
                            .increment(1);
                        if commands.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT connection error: {}", e);
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        })
    };

    let publisher = Publisher {
        client: client.clone(),
        root,
        qos,
        envelope: config.envelope,
        labels,
    };

    let mut values_open = true;
    let mut diagnostics_open = true;

    while values_open || diagnostics_open {
        tokio::select! {
            event = values.recv(), if values_open => {
                let Some(event) = event else {
                    values_open = false;
                    continue;
                };
                for command in reactions.apply(&event) {
                    if commands.send(command).is_err() {
                        debug!("engine loop gone, dropping reaction");
                    }
                }
                publisher.value(&event).await;
            }

            diagnostic = diagnostics.recv(), if diagnostics_open => {
                let Some(diagnostic) = diagnostic else {
                    diagnostics_open = false;
                    continue;
                };
                publisher.diagnostic(&diagnostic).await;
            }
        }
    }

    info!("engine streams closed, disconnecting from MQTT");
    if let Err(e) = client.try_disconnect() {
        debug!("MQTT disconnect: {}", e);
    }
    if tokio::time::timeout(Duration::from_secs(2), poller).await.is_err() {
        debug!("MQTT event loop did not stop in time");
    }
    Ok(())
}
