//! MODBUS40 accessory emulator for Nibe heat pumps.
//!
//! The heat pump polls its accessories over RS485; a serial-to-UDP gateway
//! relays every frame as one datagram. This crate answers those polls as the
//! MODBUS40 accessory, reads and writes registers on request, decodes the
//! continuous-logging broadcasts, and bridges the resulting values to MQTT.
//!
//! ## Key Types
//!
//! - [`Engine`]: the poll/correlation state machine
//! - [`EngineLoop`]: owns the engine on a dedicated thread, fed by [`EngineCommand`]s
//! - [`run_udp_bridge`]: ferries datagrams between the gateway and the loop
//! - [`run_mqtt_bridge`]: publishes values and turns MQTT messages into requests

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod events;
pub mod mqtt_bridge;
pub mod reactions;
pub mod udp_server;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Cli, ServiceConfig};
pub use engine::{output_channel, Engine, EngineConfig, EngineOutput, EngineReceivers, EngineStats, RequestState};
pub use error::{ServiceError, SubmitError};
pub use event_loop::{EngineCommand, EngineLoop};
pub use events::{Diagnostic, Provenance, RequestKind, ValueEvent};
pub use mqtt_bridge::run_mqtt_bridge;
pub use reactions::{Reaction, Reactions};
pub use udp_server::run_udp_bridge;
