//! Per-connection outbound façade.
//!
//! Every component talks to a client through its [`PlayerProxy`], which
//! queues [`Outgoing`] items for the connection's writer task. The queue is
//! bounded and split in two by a reserve. Paint operations, live or replayed,
//! only use the slots above the reserve and wait for the writer to drain when
//! those run out. Event-loop packets may use the whole queue. They never wait.
//! When even the reserve is used up the client has stopped reading, and the
//! send fails with [`GameError::ConnectionLost`].

use crate::error::{GameError, GameResult};
use shared::{PaintOp, ServerPacket};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, Notify};

/// Items queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Packet(ServerPacket),
    /// Wipe the canvas and accept painting for `epoch` from now on.
    NewRound { epoch: u64 },
    /// A painting operation belonging to round `epoch`.
    Replay { epoch: u64, op: PaintOp },
}

#[derive(Debug, Clone)]
pub struct PlayerProxy {
    addr: SocketAddr,
    tx: mpsc::Sender<Outgoing>,
    drained: Arc<Notify>,
    reserve: usize,
}

impl PlayerProxy {
    /// Creates a proxy together with the queue its writer drains. A quarter
    /// of `capacity` is held back for packets other than paint operations.
    pub fn channel(addr: SocketAddr, capacity: usize) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::channel(capacity);
        let drained = Arc::new(Notify::new());
        let proxy = Self {
            addr,
            tx,
            drained: Arc::clone(&drained),
            reserve: capacity / 4,
        };
        (proxy, OutboundQueue { rx, drained })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// True while paint operations may still be queued without eating into
    /// the reserve.
    pub fn has_headroom(&self) -> bool {
        self.tx.capacity() > self.reserve
    }

    /// Waits until [`PlayerProxy::has_headroom`] holds or the connection is gone.
    pub async fn wait_for_headroom(&self) {
        while !self.has_headroom() && !self.is_closed() {
            self.drained.notified().await;
        }
    }

    pub fn send(&self, packet: ServerPacket) -> GameResult<()> {
        self.push(Outgoing::Packet(packet))
    }

    pub fn clear(&self, epoch: u64) -> GameResult<()> {
        self.push(Outgoing::NewRound { epoch })
    }

    /// Live delivery of a freshly appended operation.
    pub fn paint(&self, epoch: u64, op: PaintOp) -> GameResult<()> {
        self.push(Outgoing::Replay { epoch, op })
    }

    /// Catch-up delivery. Waits for queue space instead of failing, so a
    /// long replay applies backpressure to its own task only.
    pub async fn replay(&self, epoch: u64, op: PaintOp) -> GameResult<()> {
        self.tx
            .send(Outgoing::Replay { epoch, op })
            .await
            .map_err(|_| GameError::ConnectionLost { addr: self.addr })
    }

    fn push(&self, item: Outgoing) -> GameResult<()> {
        self.tx
            .try_send(item)
            .map_err(|_| GameError::ConnectionLost { addr: self.addr })
    }
}

/// Receiving end of a [`PlayerProxy`]. Every item taken out wakes a replay
/// waiting for headroom.
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::Receiver<Outgoing>,
    drained: Arc<Notify>,
}

impl OutboundQueue {
    pub async fn recv(&mut self) -> Option<Outgoing> {
        let item = self.rx.recv().await;
        self.drained.notify_one();
        item
    }

    pub fn try_recv(&mut self) -> Result<Outgoing, TryRecvError> {
        let item = self.rx.try_recv();
        if item.is_ok() {
            self.drained.notify_one();
        }
        item
    }
}

impl Drop for OutboundQueue {
    fn drop(&mut self) {
        // Close first so a woken replay sees the connection as gone.
        self.rx.close();
        self.drained.notify_one();
    }
}

/// Writer-side filter that turns queued items into packets.
///
/// Catch-up tasks can still be holding operations from a round that already
/// ended. Those arrive tagged with an older epoch than the last
/// [`Outgoing::NewRound`] and are dropped here, after the canvas was cleared.
#[derive(Debug, Default)]
pub struct ReplayGate {
    epoch: u64,
}

impl ReplayGate {
    pub fn admit(&mut self, item: Outgoing) -> Option<ServerPacket> {
        match item {
            Outgoing::Packet(packet) => Some(packet),
            Outgoing::NewRound { epoch } => {
                self.epoch = epoch;
                Some(ServerPacket::Clear)
            }
            Outgoing::Replay { epoch, op } => (epoch == self.epoch).then_some(ServerPacket::Paint(op)),
        }
    }
}
