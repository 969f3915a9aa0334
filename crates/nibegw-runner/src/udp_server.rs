//! UDP link to the serial gateway.
//!
//! The gateway sends each bus frame as one datagram. Replies go back to
//! whichever peer spoke last, since the gateway's source port is not fixed.

use std::net::SocketAddr;

use crossbeam_channel::Sender;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::ServiceError;
use crate::event_loop::EngineCommand;

/// Largest datagram the gateway produces (a full frame plus handshake).
const MAX_DATAGRAM: usize = 2048;

/// Ferry datagrams between `socket` and the engine loop.
///
/// Returns once the engine drops its frame sender or the command channel
/// closes. Frames produced before any peer has spoken are dropped.
pub async fn run_udp_bridge(
    socket: UdpSocket,
    commands: Sender<EngineCommand>,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
) -> Result<(), ServiceError> {
    let mut peer: Option<SocketAddr> = None;
    let mut buf = [0u8; MAX_DATAGRAM];

    if let Ok(local) = socket.local_addr() {
        debug!("listening for gateway on {}", local);
    }

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                let (n, from) = result?;
                if peer != Some(from) {
                    debug!("gateway peer is now {}", from);
                    peer = Some(from);
                }
                trace!("<- {} {}", from, hex::encode(&buf[..n]));
                if commands.send(EngineCommand::Datagram(buf[..n].to_vec())).is_err() {
                    debug!("engine loop gone, closing udp bridge");
                    return Ok(());
                }
            }

            frame = frames.recv() => {
                let Some(frame) = frame else {
                    debug!("engine output closed, closing udp bridge");
                    return Ok(());
                };
                match peer {
                    Some(to) => {
                        trace!("-> {} {}", to, hex::encode(&frame));
                        if let Err(e) = socket.send_to(&frame, to).await {
                            warn!("send to {} failed: {}", to, e);
                        }
                    }
                    None => warn!("no gateway peer yet, dropping {}", hex::encode(&frame)),
                }
            }
        }
    }
}
