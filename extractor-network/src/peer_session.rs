//! A single TCP connection to one Bitcoin peer.
//!
//! One connection, a framed read loop, and a bounded send queue drained on
//! a trickle interval. Message *meaning* lives one layer up; this module
//! only owns the wire.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use rand::Rng;
use thiserror::Error;
use tokio::{net::TcpStream, sync::mpsc, time::interval};
use tokio_util::codec::Framed;

use extractor_chain::{block, parameters::Network, transaction::Transaction};

use crate::{
    constants,
    protocol::external::{
        types::{Nonce, PeerServices, ProtocolVersion},
        Codec, InventoryHash, Message, Version,
    },
};

/// Configuration needed to dial and handshake with a single peer.
#[derive(Clone, Debug)]
pub struct PeerConfig {
    pub network: Network,
    pub user_agent: String,
    pub services: PeerServices,
    pub best_block: block::Height,
    pub relay: bool,
}

/// Inbound message callbacks: the session hands off parsed messages, but
/// has no opinion on what happens to them.
///
/// `on_inv` also receives a clone of the outbound sender so it can queue a
/// `getdata` request for whatever it decides it wants, the same way the
/// session answers `ping` with `pong` on its own.
pub struct PeerHandlers {
    pub on_block: Box<dyn Fn(Arc<block::Block>) + Send + Sync>,
    pub on_tx: Box<dyn Fn(Arc<Transaction>) + Send + Sync>,
    pub on_inv: Box<dyn Fn(Vec<InventoryHash>, mpsc::Sender<Message>) + Send + Sync>,
}

#[derive(Error, Debug)]
pub enum PeerError {
    #[error("io error communicating with peer: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire decode/encode error: {0}")]
    Wire(#[from] extractor_chain::serialization::SerializationError),
    #[error("peer did not complete the handshake within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("peer closed the connection during handshake")]
    HandshakeClosed,
    #[error("peer session has already shut down")]
    SessionClosed,
}

/// A handle to a running peer session.
///
/// Dropping all clones of the returned sender (or calling [`PeerSession::send`]
/// after the peer has disconnected) ends the write loop; the read loop ends
/// on its own once the connection closes.
pub struct PeerSession {
    outbound: mpsc::Sender<Message>,
    last_block: Arc<AtomicI64>,
}

impl PeerSession {
    /// Dials `addr`, completes the `version`/`verack` handshake, then spawns
    /// the read and write loops. Returns a handle for queuing outbound
    /// messages; inbound messages are delivered to `handlers`.
    pub async fn connect(
        addr: SocketAddr,
        config: PeerConfig,
        handlers: PeerHandlers,
    ) -> Result<PeerSession, PeerError> {
        let stream = TcpStream::connect(addr).await?;
        let codec = Codec::builder().for_network(config.network).finish();
        let mut framed = Framed::new(stream, codec);

        let nonce = Nonce(rand::thread_rng().gen());
        let our_version = Message::Version(Version::new(
            constants::CURRENT_VERSION,
            addr,
            PeerServices::NODE_NETWORK,
            config.services,
            addr,
            nonce,
            config.user_agent.clone(),
            config.best_block,
            config.relay,
        ));
        framed.send(our_version).await?;

        let handshake = Self::handshake(&mut framed);
        let (_negotiated, peer_best_block) = tokio::time::timeout(constants::HANDSHAKE_TIMEOUT, handshake)
            .await
            .map_err(|_| PeerError::HandshakeTimeout(constants::HANDSHAKE_TIMEOUT))??;

        debug!(%addr, "completed peer handshake");

        let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(constants::PEER_SEND_QUEUE_CAPACITY);
        let (sink, stream) = framed.split();
        let last_block = Arc::new(AtomicI64::new(peer_best_block.0 as i64));

        tokio::spawn(Self::write_loop(addr, sink, outbound_rx));
        tokio::spawn(Self::read_loop(
            addr,
            stream,
            handlers,
            outbound_tx.clone(),
            last_block.clone(),
        ));

        Ok(PeerSession {
            outbound: outbound_tx,
            last_block,
        })
    }

    /// Exchanges `version`/`verack` messages until both sides have sent
    /// both. Anything else arriving mid-handshake is dropped; peers are
    /// permitted to send non-handshake messages before `verack`. Returns the
    /// negotiated protocol version and the peer's self-reported chain
    /// height (`version.best_block`), the seed for tracking how far ahead
    /// of us it claims to be.
    async fn handshake(
        framed: &mut Framed<TcpStream, Codec>,
    ) -> Result<(ProtocolVersion, block::Height), PeerError> {
        let mut sent_verack = false;
        let mut received_verack = false;
        let mut received_version: Option<Version> = None;

        while !(sent_verack && received_verack) {
            match framed.next().await {
                Some(Ok(Message::Version(peer_version))) => {
                    received_version = Some(peer_version);
                    framed.send(Message::Verack).await?;
                    sent_verack = true;
                }
                Some(Ok(Message::Verack)) => received_verack = true,
                Some(Ok(_)) => { /* ignore other messages until the handshake completes */ }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(PeerError::HandshakeClosed),
            }
        }

        let (negotiated, best_block) = match received_version {
            Some(peer_version) => (
                ProtocolVersion(std::cmp::min(peer_version.version.0, constants::CURRENT_VERSION.0)),
                peer_version.best_block,
            ),
            None => (constants::CURRENT_VERSION, block::Height(0)),
        };
        framed.codec_mut().reconfigure_version(negotiated);

        Ok((negotiated, best_block))
    }

    async fn write_loop(
        addr: SocketAddr,
        mut sink: futures::stream::SplitSink<Framed<TcpStream, Codec>, Message>,
        mut outbound_rx: mpsc::Receiver<Message>,
    ) {
        let mut trickle = interval(constants::TRICKLE_INTERVAL);
        loop {
            tokio::select! {
                _ = trickle.tick() => {}
                message = outbound_rx.recv() => {
                    let Some(message) = message else { break };
                    if let Err(error) = sink.send(message).await {
                        warn!(%addr, %error, "failed to write message to peer, closing session");
                        break;
                    }
                }
            }
        }
    }

    async fn read_loop(
        addr: SocketAddr,
        mut stream: futures::stream::SplitStream<Framed<TcpStream, Codec>>,
        handlers: PeerHandlers,
        outbound_tx: mpsc::Sender<Message>,
        last_block: Arc<AtomicI64>,
    ) {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Block(block)) => (handlers.on_block)(block),
                Ok(Message::Tx(tx)) => (handlers.on_tx)(tx),
                Ok(Message::Inv(items)) => {
                    let new_blocks = items
                        .iter()
                        .filter(|item| matches!(item, InventoryHash::Block(_)))
                        .count();
                    if new_blocks > 0 {
                        last_block.fetch_add(new_blocks as i64, Ordering::Relaxed);
                    }
                    (handlers.on_inv)(items, outbound_tx.clone());
                }
                Ok(Message::Ping(nonce)) => {
                    if outbound_tx.send(Message::Pong(nonce)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(%addr, %error, "peer connection closed with an error");
                    break;
                }
            }
        }
        trace!(%addr, "peer read loop ended");
    }

    /// Queues a message for delivery on the next trickle tick.
    pub async fn send(&self, message: Message) -> Result<(), PeerError> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| PeerError::SessionClosed)
    }

    /// Returns a cloneable sender for queuing outbound messages from other tasks.
    pub fn handle(&self) -> mpsc::Sender<Message> {
        self.outbound.clone()
    }

    /// The peer's self-reported chain height: the handshake's
    /// `version.best_block`, kept live by counting new `Block` entries in
    /// every `inv` the peer announces since.
    pub fn last_block(&self) -> i64 {
        self.last_block.load(Ordering::Relaxed)
    }
}
