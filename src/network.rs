//! Peer-to-peer gossip transport
//!
//! Peers exchange newline-delimited JSON frames over plain TCP: one
//! `{"type": ..., "payload": ...}` object per line. Every connection runs
//! its own task that feeds parsed frames into a single inbound channel; the
//! node's event loop is the only consumer, which keeps all state mutation
//! serialized. Outbound broadcasts fan out through a broadcast channel each
//! connection subscribes to.

use crate::blockchain::Block;
use crate::error::{ChainError, Result};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Per-connection read buffer cap. A peer that streams more than this much
/// data without a newline is disconnected to bound memory usage.
const MAX_FRAME_BYTES: usize = 1 << 20;

/// Outbound fan-out depth per peer before a slow writer starts skipping.
const BROADCAST_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum GossipMessage {
    #[serde(rename = "NEW_BLOCK")]
    NewBlock(Block),
    #[serde(rename = "NEW_TRANSACTION")]
    NewTransaction(Transaction),
}

pub struct NetworkService {
    inbound: mpsc::Sender<GossipMessage>,
    outbound: broadcast::Sender<String>,
    peers: AtomicUsize,
}

impl NetworkService {
    /// `inbound` is the node event loop's ingestion channel; its bounded
    /// capacity is what backpressures peers when the loop falls behind.
    pub fn new(inbound: mpsc::Sender<GossipMessage>) -> Self {
        let (outbound, _) = broadcast::channel(BROADCAST_CAPACITY);
        NetworkService {
            inbound,
            outbound,
            peers: AtomicUsize::new(0),
        }
    }

    /// Binds the listening socket and spawns the accept loop. Returns the
    /// actual bound port (useful when asked for port 0).
    pub async fn listen(self: Arc<Self>, port: u16) -> Result<u16> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await.map_err(|e| {
            ChainError::NetworkError(format!("Failed to bind p2p port {}: {}", port, e))
        })?;
        let local_port = listener
            .local_addr()
            .map(|addr| addr.port())
            .map_err(|e| ChainError::NetworkError(format!("Failed to read local addr: {}", e)))?;
        info!("P2P service listening on port {}", local_port);

        let service = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        tokio::spawn(handle_peer(stream, addr, service.clone()));
                    }
                    Err(e) => warn!("Failed to accept peer connection: {}", e),
                }
            }
        });

        Ok(local_port)
    }

    /// Dials a peer from the static peer list. Connection failures are
    /// logged and do not abort startup.
    pub async fn connect_peer(self: Arc<Self>, addr: &str) {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                let peer_addr = match stream.peer_addr() {
                    Ok(peer_addr) => peer_addr,
                    Err(e) => {
                        warn!("Failed to resolve peer address {}: {}", addr, e);
                        return;
                    }
                };
                info!("Connected to peer {}", peer_addr);
                tokio::spawn(handle_peer(stream, peer_addr, self.clone()));
            }
            Err(e) => warn!("Failed to connect to peer {}: {}", addr, e),
        }
    }

    pub fn broadcast_block(&self, block: &Block) -> Result<()> {
        self.broadcast(&GossipMessage::NewBlock(block.clone()))
    }

    pub fn broadcast_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.broadcast(&GossipMessage::NewTransaction(transaction.clone()))
    }

    fn broadcast(&self, message: &GossipMessage) -> Result<()> {
        let line = serde_json::to_string(message)
            .map_err(|e| ChainError::NetworkError(format!("Failed to serialize message: {}", e)))?;
        // No receivers just means no peers are connected yet.
        let _ = self.outbound.send(line);
        Ok(())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.load(Ordering::Relaxed)
    }
}

/// Drives a single peer connection: reads newline-delimited frames into the
/// inbound channel and writes broadcasts out. A failure on this connection
/// never affects other peers.
async fn handle_peer(stream: TcpStream, addr: SocketAddr, service: Arc<NetworkService>) {
    info!("Handling peer {}", addr);
    service.peers.fetch_add(1, Ordering::Relaxed);

    let mut outbound = service.outbound.subscribe();
    let (mut reader, mut writer) = stream.into_split();
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    'connection: loop {
        select! {
            result = reader.read(&mut chunk) => {
                match result {
                    Ok(0) => {
                        info!("Peer {} disconnected", addr);
                        break 'connection;
                    }
                    Ok(n) => {
                        buffer.extend_from_slice(&chunk[..n]);
                        if buffer.len() > MAX_FRAME_BYTES {
                            warn!("Peer {} exceeded the {} byte frame limit, closing", addr, MAX_FRAME_BYTES);
                            break 'connection;
                        }
                        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                            let line: Vec<u8> = buffer.drain(..=pos).collect();
                            let line = &line[..line.len() - 1];
                            if line.is_empty() {
                                continue;
                            }
                            match serde_json::from_slice::<GossipMessage>(line) {
                                Ok(message) => {
                                    if service.inbound.send(message).await.is_err() {
                                        // Event loop is gone; nothing left to feed.
                                        break 'connection;
                                    }
                                }
                                Err(e) => {
                                    // Malformed frames are dropped; the
                                    // connection stays open.
                                    warn!("Dropping malformed frame from {}: {}", addr, e);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Read error from peer {}: {}", addr, e);
                        break 'connection;
                    }
                }
            }
            result = outbound.recv() => {
                match result {
                    Ok(line) => {
                        if let Err(e) = writer.write_all(line.as_bytes()).await {
                            warn!("Write error to peer {}: {}", addr, e);
                            break 'connection;
                        }
                        if let Err(e) = writer.write_all(b"\n").await {
                            warn!("Write error to peer {}: {}", addr, e);
                            break 'connection;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Peer {} lagged behind, {} broadcasts skipped", addr, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break 'connection,
                }
            }
        }
    }

    service.peers.fetch_sub(1, Ordering::Relaxed);
}
