//! The single shared room.
//!
//! `Room` owns every piece of room state and is driven from one place, the
//! server's event loop: inbound packets go through [`Room::dispatch`],
//! countdown ticks through [`Room::tick`] and disconnects through
//! [`Room::leave`]. Only per-player replication cursors are touched from
//! other tasks, and those carry their own lock.
//!
//! Sends never block. A player whose outbound queue refuses a packet is
//! remembered as lost; the event loop collects those with
//! [`Room::take_lost`] and routes them through `leave`.

use crate::config::ServerConfig;
use crate::error::{GameError, GameResult};
use crate::proxy::PlayerProxy;
use crate::replication::{catch_up, LiveDelivery, PaintHistory};
use crate::scheduler::{Phase, TurnEnd, TurnScheduler};
use crate::scoring::{GuessBook, GuessVerdict};
use crate::session::SessionRegistry;
use crate::words::WordList;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ClientPacket, PaintOp, ServerPacket, SCORE_REMOVED};
use std::net::SocketAddr;

pub struct Room {
    sessions: SessionRegistry,
    scheduler: TurnScheduler,
    history: PaintHistory,
    guesses: GuessBook,
    words: WordList,
    rng: StdRng,
    min_players: usize,
    lost: Vec<SocketAddr>,
}

impl Room {
    pub fn new(config: &ServerConfig, words: WordList) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            scheduler: TurnScheduler::new(config.round_duration, config.break_duration),
            history: PaintHistory::new(),
            guesses: GuessBook::new(),
            words,
            rng: StdRng::from_entropy(),
            min_players: config.min_players,
            lost: Vec::new(),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    pub fn painter(&self) -> Option<SocketAddr> {
        self.scheduler.painter()
    }

    pub fn secret(&self) -> Option<&str> {
        self.scheduler.secret()
    }

    pub fn remaining(&self) -> u32 {
        self.scheduler.remaining()
    }

    pub fn history(&self) -> &PaintHistory {
        &self.history
    }

    pub fn solved_count(&self) -> usize {
        self.guesses.len()
    }

    pub fn queue(&self) -> Vec<SocketAddr> {
        self.scheduler.queue().copied().collect()
    }

    /// Routes one decoded packet from the connection behind `proxy`.
    pub fn dispatch(&mut self, proxy: &PlayerProxy, packet: ClientPacket) -> GameResult<()> {
        let addr = proxy.addr();
        match packet {
            ClientPacket::Join { name } => self.join(proxy.clone(), &name),
            ClientPacket::Paint(op) => self.paint(addr, op),
            ClientPacket::Guess { text } => self.submit_guess(addr, &text),
            ClientPacket::Chat { text } => self.chat(addr, text),
            ClientPacket::TimeUp => {
                debug!(
                    "{} reports its countdown expired ({}s left on server)",
                    addr,
                    self.scheduler.remaining()
                );
                Ok(())
            }
        }
    }

    /// Adds a player. Rejected joins are answered on the same connection,
    /// which stays open for another attempt.
    pub fn join(&mut self, proxy: PlayerProxy, name: &str) -> GameResult<()> {
        let addr = proxy.addr();
        let epoch = self.history.epoch();

        let joined = self.sessions.join(proxy.clone(), name, epoch).map(|_| ());
        if let Err(e) = joined {
            let reply = match &e {
                GameError::DuplicateName { name } => Some(ServerPacket::DupName { name: name.clone() }),
                GameError::InvalidName { reason, .. } => Some(ServerPacket::BadName {
                    reason: reason.to_string(),
                }),
                _ => None,
            };
            if let Some(reply) = reply {
                self.track(addr, proxy.send(reply));
            }
            return Err(e);
        }
        self.scheduler.enqueue(addr);

        self.send_to(addr, ServerPacket::Welcome { name: name.to_string() });
        self.broadcast(ServerPacket::Info {
            text: format!("{} joined the room", name),
        });
        self.broadcast(ServerPacket::Score {
            name: name.to_string(),
            score: 0,
        });
        for (other, score) in self.sessions.scoreboard() {
            if other != name {
                self.send_to(addr, ServerPacket::Score { name: other, score: score as i64 });
            }
        }

        // Bring the newcomer's canvas and timer in line with everyone else.
        self.track(addr, proxy.clear(epoch));
        self.send_to(addr, ServerPacket::Lock);
        match self.scheduler.phase() {
            Phase::Idle if self.sessions.len() >= self.min_players => self.start_turn(),
            Phase::Idle => self.send_to(addr, ServerPacket::Info {
                text: "Waiting for more players to join...".to_string(),
            }),
            phase => {
                if let Some(painter) = self.scheduler.painter() {
                    let painter = self.name_of(painter);
                    self.send_to(addr, ServerPacket::Info {
                        text: format!("{} is painting now!", painter),
                    });
                }
                self.send_to(addr, ServerPacket::Time {
                    label: phase.label().to_string(),
                    seconds: self.scheduler.remaining(),
                });
                if phase == Phase::Painting && !self.history.is_empty() {
                    self.spawn_catch_up(addr);
                }
            }
        }
        Ok(())
    }

    /// Removes a player and repairs the turn state around the hole.
    pub fn leave(&mut self, addr: SocketAddr) -> Option<String> {
        let player = self.sessions.leave(&addr)?;
        self.scheduler.forget(addr);
        self.guesses.forget(&addr);

        self.broadcast(ServerPacket::Score {
            name: player.name.clone(),
            score: SCORE_REMOVED,
        });
        self.broadcast(ServerPacket::Info {
            text: format!("{} left the room", player.name),
        });

        if self.scheduler.phase() == Phase::Painting {
            if self.scheduler.is_painter(addr) {
                self.end_turn(TurnEnd::PainterLeft);
            } else if self.sessions.len() < self.min_players {
                self.end_turn(TurnEnd::NotEnoughPlayers);
            } else if self.guesses.all_solved(self.guessers()) {
                self.end_turn(TurnEnd::Solved);
            }
        }
        if self.scheduler.phase() != Phase::Idle && self.sessions.len() < self.min_players {
            self.enter_idle();
        }
        if self.sessions.is_empty() {
            info!("Room is empty");
        }
        Some(player.name)
    }

    /// Appends a painting operation from the active painter and fans it out.
    pub fn paint(&mut self, addr: SocketAddr, op: PaintOp) -> GameResult<()> {
        if self.scheduler.phase() != Phase::Painting || !self.scheduler.is_painter(addr) {
            return Err(GameError::OutOfTurnAction {
                addr,
                action: "PAINT",
            });
        }

        let index = self.history.append(op);
        let epoch = self.history.epoch();
        let mut behind = Vec::new();
        for player in self.sessions.iter().filter(|player| player.addr != addr) {
            match player.replica.deliver_live(&player.proxy, epoch, index, op) {
                LiveDelivery::Sent => {}
                LiveDelivery::Behind => behind.push(player.addr),
                LiveDelivery::Lost(e) => {
                    debug!("Live paint not delivered: {}", e);
                    self.lost.push(player.addr);
                }
            }
        }
        for addr in behind {
            self.spawn_catch_up(addr);
        }
        Ok(())
    }

    pub fn submit_guess(&mut self, addr: SocketAddr, text: &str) -> GameResult<()> {
        let ignored = GameError::OutOfTurnAction {
            addr,
            action: "GUESS",
        };
        if self.scheduler.phase() != Phase::Painting
            || self.scheduler.is_painter(addr)
            || !self.sessions.contains(&addr)
        {
            return Err(ignored);
        }
        let Some(secret) = self.scheduler.secret().map(str::to_string) else {
            return Err(ignored);
        };

        match self.guesses.judge(addr, text, &secret) {
            GuessVerdict::AlreadySolved => Err(ignored),
            GuessVerdict::Wrong => {
                let name = self.name_of(addr);
                self.broadcast(ServerPacket::Info {
                    text: format!("{}: {}", name, text),
                });
                Ok(())
            }
            GuessVerdict::Correct => {
                let (name, score) = match self.sessions.get_mut(&addr) {
                    Some(player) => {
                        player.score += 1;
                        (player.name.clone(), player.score)
                    }
                    None => return Err(ignored),
                };
                info!("{} guessed the word ({} points)", name, score);
                self.broadcast(ServerPacket::Score {
                    name: name.clone(),
                    score: score as i64,
                });
                self.broadcast(ServerPacket::Info {
                    text: format!("{} guessed the word!", name),
                });
                if self.guesses.all_solved(self.guessers()) {
                    self.end_turn(TurnEnd::Solved);
                }
                Ok(())
            }
        }
    }

    /// Relays chat text verbatim to every other player.
    pub fn chat(&mut self, addr: SocketAddr, text: String) -> GameResult<()> {
        if !self.sessions.contains(&addr) {
            return Err(GameError::OutOfTurnAction {
                addr,
                action: "CHAT",
            });
        }
        let failed = self.sessions.broadcast_except(addr, &ServerPacket::Chat { text });
        self.lost.extend(failed);
        Ok(())
    }

    /// One second of wall-clock time passed.
    pub fn tick(&mut self) {
        let expired = self.scheduler.tick();
        if let Some(phase) = expired {
            debug!("{} countdown ran out", phase.label());
        }
        match expired {
            Some(Phase::Painting) => self.end_turn(TurnEnd::Expired),
            Some(Phase::Break) => self.start_turn(),
            Some(Phase::Idle) | None => {}
        }
    }

    /// Players whose outbound queue refused a packet since the last call.
    pub fn take_lost(&mut self) -> Vec<SocketAddr> {
        let mut lost = std::mem::take(&mut self.lost);
        lost.sort();
        lost.dedup();
        lost
    }

    fn start_turn(&mut self) {
        if self.sessions.len() < self.min_players {
            self.enter_idle();
            return;
        }
        let sessions = &self.sessions;
        let Some(painter) = self.scheduler.next_painter(|addr| sessions.contains(addr)) else {
            self.enter_idle();
            return;
        };
        let Some(word) = self.words.choose(&mut self.rng).map(str::to_string) else {
            warn!("Word list is empty, cannot start a turn");
            self.scheduler.enqueue(painter);
            self.enter_idle();
            return;
        };

        self.scheduler.start_painting(painter, word.clone());
        self.guesses.reset();
        self.reset_canvas();

        let name = self.name_of(painter);
        info!("{} is painting", name);
        let everyone: Vec<SocketAddr> = self.sessions.iter().map(|player| player.addr).collect();
        for addr in everyone {
            if addr == painter {
                self.send_to(addr, ServerPacket::Turn);
                self.send_to(addr, ServerPacket::Info {
                    text: format!("Your word is: {}", word),
                });
            } else {
                self.send_to(addr, ServerPacket::Lock);
            }
        }
        self.broadcast(ServerPacket::Info {
            text: format!("{} is painting now!", name),
        });
        self.broadcast(ServerPacket::Time {
            label: Phase::Painting.label().to_string(),
            seconds: self.scheduler.remaining(),
        });
    }

    fn end_turn(&mut self, reason: TurnEnd) {
        let requeue = reason != TurnEnd::PainterLeft;
        let (painter, secret) = self.scheduler.start_break(requeue);
        let secret = secret.unwrap_or_default();
        info!("Turn ended ({:?}), the word was {}", reason, secret);

        let text = match reason {
            TurnEnd::Expired => format!("Time's up! The word was: {}", secret),
            TurnEnd::Solved => "Everyone guessed the word!".to_string(),
            TurnEnd::PainterLeft => format!("The painter left. The word was: {}", secret),
            TurnEnd::NotEnoughPlayers => {
                format!("Not enough players to continue. The word was: {}", secret)
            }
        };
        self.broadcast(ServerPacket::Info { text });
        if let Some(addr) = painter {
            self.send_to(addr, ServerPacket::Lock);
        }

        self.guesses.reset();
        self.reset_canvas();
        if self.sessions.len() >= self.min_players {
            self.broadcast(ServerPacket::Time {
                label: Phase::Break.label().to_string(),
                seconds: self.scheduler.remaining(),
            });
        }
    }

    fn enter_idle(&mut self) {
        self.scheduler.go_idle();
        self.guesses.reset();
        info!("Waiting for players ({} in room)", self.sessions.len());
        self.broadcast(ServerPacket::Info {
            text: "Waiting for more players to join...".to_string(),
        });
        self.broadcast(ServerPacket::Time {
            label: Phase::Idle.label().to_string(),
            seconds: 0,
        });
    }

    /// Empties the history and tells every client to wipe its canvas.
    fn reset_canvas(&mut self) {
        let epoch = self.history.clear();
        let failed: Vec<SocketAddr> = self
            .sessions
            .iter()
            .filter(|player| player.proxy.clear(epoch).is_err())
            .map(|player| player.addr)
            .collect();
        self.lost.extend(failed);
    }

    /// Starts a replay for `addr` unless one is already running; a running
    /// replay follows the log to its end on its own.
    fn spawn_catch_up(&self, addr: SocketAddr) {
        let Some(player) = self.sessions.get(&addr) else {
            return;
        };
        if player.replica.schedule() {
            tokio::spawn(catch_up(
                player.replica.clone(),
                player.proxy.clone(),
                self.history.handle(),
            ));
        }
    }

    fn guessers(&self) -> usize {
        self.sessions
            .iter()
            .filter(|player| !self.scheduler.is_painter(player.addr))
            .count()
    }

    fn name_of(&self, addr: SocketAddr) -> String {
        self.sessions
            .get(&addr)
            .map(|player| player.name.clone())
            .unwrap_or_else(|| addr.to_string())
    }

    fn broadcast(&mut self, packet: ServerPacket) {
        let failed = self.sessions.broadcast(&packet);
        self.lost.extend(failed);
    }

    fn send_to(&mut self, addr: SocketAddr, packet: ServerPacket) {
        let result = match self.sessions.get(&addr) {
            Some(player) => player.proxy.send(packet),
            None => return,
        };
        self.track(addr, result);
    }

    fn track(&mut self, addr: SocketAddr, result: GameResult<()>) {
        if result.is_err() {
            self.lost.push(addr);
        }
    }
}
