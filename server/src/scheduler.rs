//! Turn scheduler: whose turn it is and how long the current phase lasts.
//!
//! ```text
//!            roster >= min              countdown hits zero / all solved
//!   Idle ------------------> Painting -----------------------------------> Break
//!    ^                          ^                                            |
//!    |                          +--------------- roster >= min --------------+
//!    +---------------------------- roster < min (any state) ----------------+
//! ```
//!
//! The scheduler only holds state. Broadcasting the consequences of a
//! transition is the room's job.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not enough players to play.
    Idle,
    /// A painter is drawing the secret word.
    Painting,
    /// Short pause between two turns.
    Break,
}

impl Phase {
    /// Label shown next to the countdown on clients.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "Waiting",
            Phase::Painting => "Round",
            Phase::Break => "Break",
        }
    }
}

/// Why a painting turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEnd {
    Expired,
    Solved,
    PainterLeft,
    NotEnoughPlayers,
}

/// Whole-second countdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct Countdown {
    remaining: u32,
}

impl Countdown {
    pub fn start(&mut self, seconds: u32) {
        self.remaining = seconds;
    }

    pub fn stop(&mut self) {
        self.remaining = 0;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Decrements, then reports whether zero was reached on this tick.
    /// A countdown already at zero never fires again.
    pub fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining == 0
    }
}

#[derive(Debug)]
pub struct TurnScheduler {
    phase: Phase,
    countdown: Countdown,
    queue: VecDeque<SocketAddr>,
    painter: Option<SocketAddr>,
    secret: Option<String>,
    round_seconds: u32,
    break_seconds: u32,
}

impl TurnScheduler {
    pub fn new(round: Duration, pause: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            countdown: Countdown::default(),
            queue: VecDeque::new(),
            painter: None,
            secret: None,
            round_seconds: whole_seconds(round),
            break_seconds: whole_seconds(pause),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn painter(&self) -> Option<SocketAddr> {
        self.painter
    }

    pub fn is_painter(&self, addr: SocketAddr) -> bool {
        self.painter == Some(addr)
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn remaining(&self) -> u32 {
        self.countdown.remaining()
    }

    pub fn queue(&self) -> impl Iterator<Item = &SocketAddr> {
        self.queue.iter()
    }

    /// Adds a player to the tail of the painting queue. The active painter
    /// and already queued players are left where they are.
    pub fn enqueue(&mut self, addr: SocketAddr) {
        if self.painter != Some(addr) && !self.queue.contains(&addr) {
            self.queue.push_back(addr);
        }
    }

    /// Removes a player from the painting queue.
    pub fn forget(&mut self, addr: SocketAddr) {
        self.queue.retain(|queued| *queued != addr);
    }

    /// Pops the next painter, skipping entries that are no longer connected.
    pub fn next_painter<F>(&mut self, is_connected: F) -> Option<SocketAddr>
    where
        F: Fn(&SocketAddr) -> bool,
    {
        while let Some(addr) = self.queue.pop_front() {
            if is_connected(&addr) {
                return Some(addr);
            }
        }
        None
    }

    pub fn start_painting(&mut self, painter: SocketAddr, secret: String) {
        self.forget(painter);
        self.phase = Phase::Painting;
        self.painter = Some(painter);
        self.secret = Some(secret);
        self.countdown.start(self.round_seconds);
    }

    /// Ends the current turn and starts the break. The former painter goes
    /// back to the tail of the queue when `requeue` is set. Returns the
    /// former painter and the secret word.
    pub fn start_break(&mut self, requeue: bool) -> (Option<SocketAddr>, Option<String>) {
        let painter = self.painter.take();
        let secret = self.secret.take();
        if let (Some(addr), true) = (painter, requeue) {
            self.enqueue(addr);
        }
        self.phase = Phase::Break;
        self.countdown.start(self.break_seconds);
        (painter, secret)
    }

    /// Drops to idle. A painter still set is requeued at the tail.
    pub fn go_idle(&mut self) {
        if let Some(addr) = self.painter.take() {
            self.enqueue(addr);
        }
        self.secret = None;
        self.phase = Phase::Idle;
        self.countdown.stop();
    }

    /// Advances the countdown by one second and returns the phase whose
    /// countdown just ran out, if any.
    pub fn tick(&mut self) -> Option<Phase> {
        if self.phase == Phase::Idle {
            return None;
        }
        self.countdown.tick().then_some(self.phase)
    }
}

/// Countdowns are kept in whole seconds; anything longer than `u32::MAX`
/// seconds saturates instead of wrapping.
fn whole_seconds(duration: Duration) -> u32 {
    u32::try_from(duration.as_secs()).unwrap_or(u32::MAX)
}
