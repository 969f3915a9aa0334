//! `nibegw`: answer a Nibe heat pump as its MODBUS40 accessory and bridge
//! the register values to MQTT.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use nibegw_metrics::MetricLabels;
use nibegw_model::Catalog;
use nibegw_runner::{
    output_channel, run_mqtt_bridge, run_udp_bridge, Cli, Engine, EngineCommand, EngineLoop,
    ServiceConfig, ServiceError, SystemClock,
};
use tokio::net::UdpSocket;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn main() -> Result<(), ServiceError> {
    let cli = Cli::parse();
    let config = ServiceConfig::from_cli(&cli)?;
    init_tracing(&config.log_level);

    #[cfg(feature = "prometheus")]
    if let Some(addr) = config.metrics_listen {
        nibegw_metrics::install_prometheus(addr)
            .map_err(|e| ServiceError::Metrics(e.to_string()))?;
        info!("serving metrics on http://{}/metrics", addr);
    }
    #[cfg(not(feature = "prometheus"))]
    if config.metrics_listen.is_some() {
        warn!("built without the prometheus feature, ignoring metrics_listen");
    }
    nibegw_metrics::describe_metrics();

    let catalog = Arc::new(Catalog::load(&config.catalog)?);
    let labels = MetricLabels::for_node(config.engine.node, config.mqtt.topic.clone());

    let (output, receivers) = output_channel();
    let mut engine =
        Engine::new(catalog, config.engine.clone(), output).with_labels(labels.clone());

    for name in &config.startup_reads {
        if let Err(e) = engine.submit_read_by_name(name, Instant::now()) {
            warn!("startup read of {} skipped: {}", name, e);
        }
    }

    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();

    let shutdown_tx = cmd_tx.clone();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(EngineCommand::Shutdown);
    })?;

    let engine_thread = EngineLoop::new(engine, cmd_rx, SystemClock)
        .with_tick_interval(config.tick_interval())
        .spawn()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        let socket = UdpSocket::bind((config.udp.bind, config.udp.port)).await?;
        info!(
            "answering as node 0x{:04X} on udp {}:{}",
            config.engine.node, config.udp.bind, config.udp.port
        );

        tokio::try_join!(
            run_udp_bridge(socket, cmd_tx.clone(), receivers.frames),
            run_mqtt_bridge(
                config.mqtt.clone(),
                cmd_tx.clone(),
                receivers.values,
                receivers.diagnostics,
                config.reactions.clone(),
                labels,
            ),
        )?;
        Ok::<(), ServiceError>(())
    });

    // Bridges are down; make sure the engine stops too.
    let _ = cmd_tx.send(EngineCommand::Shutdown);
    drop(cmd_tx);

    let stats = engine_thread
        .join()
        .map_err(|_| ServiceError::EnginePanicked)?;
    info!(
        "stopped: {} datagrams in, {} out, {} values, {} timeouts",
        stats.datagrams_rx,
        stats.datagrams_tx,
        stats.broadcast_values + stats.polled_values,
        stats.timeouts
    );

    result
}
