//! The single thread that owns the engine.
//!
//! Every input to the [`Engine`] (bus datagrams, MQTT requests, ticks and
//! shutdown) arrives through one ordered channel and is handled here, one at a
//! time. Transports and bridges never touch the engine directly.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use nibegw_protocol::{FrameCodec, NibeGwCodec};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::engine::{Engine, EngineStats};

/// Inputs to the engine loop.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    /// A datagram received from the bus gateway.
    Datagram(Vec<u8>),
    /// Read the named item.
    Read {
        /// Item name.
        name: String,
    },
    /// Write a JSON scalar to the named item.
    Write {
        /// Item name.
        name: String,
        /// Value as received.
        value: serde_json::Value,
    },
    /// Abort outstanding requests and stop.
    Shutdown,
}

/// Runs an [`Engine`] against a command channel.
pub struct EngineLoop<C: FrameCodec = NibeGwCodec, K: Clock = SystemClock> {
    engine: Engine<C>,
    commands: Receiver<EngineCommand>,
    clock: K,
    tick_interval: Duration,
}

impl<C: FrameCodec + 'static, K: Clock> EngineLoop<C, K> {
    /// Create a loop with a 100 ms tick.
    pub fn new(engine: Engine<C>, commands: Receiver<EngineCommand>, clock: K) -> Self {
        EngineLoop {
            engine,
            commands,
            clock,
            tick_interval: Duration::from_millis(100),
        }
    }

    /// Set how often timeouts are checked when the channel is idle.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Process commands until [`EngineCommand::Shutdown`] or until every
    /// sender is dropped, then abort whatever is still outstanding.
    pub fn run(mut self) -> EngineStats {
        info!("engine loop started (node 0x{:04X})", self.engine.config().node);

        loop {
            match self.commands.recv_timeout(self.tick_interval) {
                Ok(EngineCommand::Shutdown) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("command channel closed");
                    break;
                }
            }
            self.engine.on_tick(self.clock.now());
        }

        self.engine.shutdown();
        let stats = self.engine.stats().clone();
        info!("engine loop stopped: {:?}", stats);
        stats
    }

    /// Run on a dedicated thread named `engine`.
    pub fn spawn(self) -> io::Result<JoinHandle<EngineStats>> {
        thread::Builder::new()
            .name("engine".to_string())
            .spawn(move || self.run())
    }

    fn handle(&mut self, command: EngineCommand) {
        let now = self.clock.now();
        let result = match command {
            EngineCommand::Datagram(bytes) => {
                self.engine.on_datagram(&bytes, now);
                Ok(())
            }
            EngineCommand::Read { name } => self.engine.submit_read_by_name(&name, now),
            EngineCommand::Write { name, value } => {
                self.engine.submit_write_json(&name, &value, now)
            }
            EngineCommand::Shutdown => Ok(()),
        };

        // Failures are already on the diagnostic channel.
        if let Err(e) = result {
            debug!("request rejected: {}", e);
        }
    }
}
