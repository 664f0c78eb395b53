//! Painting history and per-player replication.
//!
//! The event loop appends operations to [`PaintHistory`] and hands each one
//! straight to every player whose cursor is exactly at the end of the log and
//! whose outbound queue has room. Players that are behind (late joiners, a
//! full queue, or a replay still running) get a [`catch_up`] task instead.
//! Each player's cursor sits behind an async mutex, so at most one replay per
//! player runs at a time while replays for different players proceed
//! concurrently.
//!
//! A replay pass runs up to the length the log had when it began. Operations
//! appended meanwhile are deferred by the fast path and picked up by a
//! follow-up pass of the same task, so one task per player is enough.
//!
//! History and cursors are versioned by a round epoch. Clearing the history
//! bumps the epoch; a replay started for an older epoch stops at its next
//! step, and cursors still pointing at an older epoch are rewound to zero the
//! first time they are touched in the new round.

use crate::error::GameError;
use crate::proxy::PlayerProxy;
use log::debug;
use shared::PaintOp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Log {
    epoch: u64,
    ops: Vec<PaintOp>,
}

/// Append-only log of the current round's paint operations.
///
/// Only the event loop writes. Replay tasks read through a [`HistoryHandle`];
/// locks are held for a single lookup and never across an await.
#[derive(Debug, Default)]
pub struct PaintHistory {
    log: Arc<RwLock<Log>>,
}

impl PaintHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Log> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Log> {
        self.log.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn epoch(&self) -> u64 {
        self.read().epoch
    }

    pub fn len(&self) -> usize {
        self.read().ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().ops.is_empty()
    }

    /// Copy of the current round's operations, oldest first.
    pub fn ops(&self) -> Vec<PaintOp> {
        self.read().ops.clone()
    }

    /// Appends `op` and returns its index, i.e. the length before the append.
    pub fn append(&mut self, op: PaintOp) -> usize {
        let mut log = self.write();
        log.ops.push(op);
        log.ops.len() - 1
    }

    /// Drops all operations and starts a new epoch, which is returned.
    pub fn clear(&mut self) -> u64 {
        let mut log = self.write();
        log.ops.clear();
        log.epoch += 1;
        log.epoch
    }

    pub fn handle(&self) -> HistoryHandle {
        HistoryHandle {
            log: Arc::clone(&self.log),
        }
    }
}

/// Read-only view of a [`PaintHistory`] shared with replay tasks.
#[derive(Debug, Clone)]
pub struct HistoryHandle {
    log: Arc<RwLock<Log>>,
}

impl HistoryHandle {
    fn read(&self) -> RwLockReadGuard<'_, Log> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn epoch(&self) -> u64 {
        self.read().epoch
    }

    /// Current epoch and length, read together.
    pub fn extent(&self) -> (u64, usize) {
        let log = self.read();
        (log.epoch, log.ops.len())
    }

    /// The operation at `index`, provided the log is still in `epoch`.
    pub fn get(&self, epoch: u64, index: usize) -> Option<PaintOp> {
        let log = self.read();
        if log.epoch != epoch {
            return None;
        }
        log.ops.get(index).copied()
    }

    /// True if a cursor at (`epoch`, `sent`) has not seen the whole log.
    pub fn has_pending(&self, epoch: u64, sent: usize) -> bool {
        let log = self.read();
        let sent = if log.epoch == epoch { sent } else { 0 };
        log.ops.len() > sent
    }
}

#[derive(Debug)]
struct Cursor {
    epoch: u64,
    sent: usize,
}

impl Cursor {
    fn align(&mut self, epoch: u64) {
        if self.epoch != epoch {
            self.epoch = epoch;
            self.sent = 0;
        }
    }
}

/// Outcome of trying to hand a new operation to one player directly.
#[derive(Debug)]
pub enum LiveDelivery {
    Sent,
    /// The player is behind, its queue is short on room, or a replay is
    /// running; a catch-up is needed.
    Behind,
    Lost(GameError),
}

/// Replication cursor of one player: how many history entries of the
/// current epoch have been queued for it.
#[derive(Debug, Clone)]
pub struct Replica {
    cursor: Arc<Mutex<Cursor>>,
    scheduled: Arc<AtomicBool>,
}

impl Replica {
    pub fn new(epoch: u64) -> Self {
        Self {
            cursor: Arc::new(Mutex::new(Cursor { epoch, sent: 0 })),
            scheduled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claims the right to run the next catch-up. Returns false if one is
    /// already scheduled or running.
    pub fn schedule(&self) -> bool {
        !self.scheduled.swap(true, Ordering::AcqRel)
    }

    fn release(&self) {
        self.scheduled.store(false, Ordering::Release);
    }

    /// Fast path: sends the operation at `index` if the player has received
    /// exactly `index` operations of `epoch`, no replay holds the cursor and
    /// the queue has headroom.
    pub fn deliver_live(
        &self,
        proxy: &PlayerProxy,
        epoch: u64,
        index: usize,
        op: PaintOp,
    ) -> LiveDelivery {
        let Ok(mut cursor) = self.cursor.try_lock() else {
            return LiveDelivery::Behind;
        };
        cursor.align(epoch);
        if cursor.sent != index {
            return LiveDelivery::Behind;
        }
        if proxy.is_closed() {
            return LiveDelivery::Lost(GameError::ConnectionLost { addr: proxy.addr() });
        }
        if !proxy.has_headroom() {
            return LiveDelivery::Behind;
        }
        match proxy.paint(epoch, op) {
            Ok(()) => {
                cursor.sent += 1;
                LiveDelivery::Sent
            }
            Err(_) if !proxy.is_closed() => LiveDelivery::Behind,
            Err(e) => LiveDelivery::Lost(e),
        }
    }

    /// Cursor position, or `None` while a replay holds it.
    pub fn position(&self) -> Option<(u64, usize)> {
        self.cursor
            .try_lock()
            .ok()
            .map(|cursor| (cursor.epoch, cursor.sent))
    }
}

/// Replays the log to one player from its cursor up to the length the log
/// had when the pass began, then runs follow-up passes while operations
/// remain that the fast path could not deliver. Returns how many operations
/// were sent.
///
/// The caller is expected to have claimed the replica with
/// [`Replica::schedule`]; the claim is released once the task finishes.
/// Every operation waits for headroom in the player's queue first, so a
/// replay never takes the slots the event loop relies on.
pub async fn catch_up(replica: Replica, proxy: PlayerProxy, history: HistoryHandle) -> usize {
    let mut total = 0;
    loop {
        let mut cursor = replica.cursor.lock().await;
        let (epoch, end) = history.extent();
        cursor.align(epoch);

        while cursor.sent < end {
            let Some(op) = history.get(epoch, cursor.sent) else {
                break;
            };
            proxy.wait_for_headroom().await;
            if history.epoch() != epoch {
                debug!("Replay for {} cancelled by round change", proxy.addr());
                break;
            }
            if proxy.replay(epoch, op).await.is_err() {
                drop(cursor);
                replica.release();
                return total;
            }
            cursor.sent += 1;
            total += 1;
        }

        let (epoch, sent) = (cursor.epoch, cursor.sent);
        drop(cursor);
        replica.release();

        // Appends made during this pass, or deferred to it by the fast path,
        // get a follow-up pass.
        if !history.has_pending(epoch, sent) || !replica.schedule() {
            break;
        }
    }

    if total > 0 {
        debug!("Replayed {} operations to {}", total, proxy.addr());
    }
    total
}
