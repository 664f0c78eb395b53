//! Session registry: who is in the room.
//!
//! Players are keyed by the remote address of their connection, which never
//! changes while the connection lives. Display names are unique among the
//! players currently in the room and are released again when a player
//! leaves.

use crate::error::{GameError, GameResult};
use crate::proxy::PlayerProxy;
use crate::replication::Replica;
use log::info;
use shared::{ServerPacket, FIELD_SEPARATOR, MAX_NAME_LEN, PACKET_DELIMITER};
use std::collections::HashMap;
use std::net::SocketAddr;

/// A joined participant.
#[derive(Debug)]
pub struct Player {
    pub addr: SocketAddr,
    pub name: String,
    pub score: u32,
    pub proxy: PlayerProxy,
    pub replica: Replica,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    players: HashMap<SocketAddr, Player>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks a requested display name before it is looked up.
    pub fn validate_name(name: &str) -> GameResult<()> {
        let reason = if name.trim().is_empty() {
            "name must not be empty"
        } else if name.chars().count() > MAX_NAME_LEN {
            "name is too long"
        } else if name.contains([FIELD_SEPARATOR, PACKET_DELIMITER]) {
            "name must not contain ',' or '@'"
        } else {
            return Ok(());
        };
        Err(GameError::InvalidName {
            name: name.to_string(),
            reason,
        })
    }

    /// Registers the connection behind `proxy` under `name` with a zero
    /// score. The replication cursor starts at the beginning of `epoch`.
    pub fn join(&mut self, proxy: PlayerProxy, name: &str, epoch: u64) -> GameResult<&Player> {
        let addr = proxy.addr();
        if self.players.contains_key(&addr) {
            return Err(GameError::OutOfTurnAction {
                addr,
                action: "JOIN",
            });
        }
        Self::validate_name(name)?;
        if self.find_by_name(name).is_some() {
            return Err(GameError::DuplicateName {
                name: name.to_string(),
            });
        }

        info!("Player {} joined from {}", name, addr);
        let player = Player {
            addr,
            name: name.to_string(),
            score: 0,
            proxy,
            replica: Replica::new(epoch),
        };
        Ok(self.players.entry(addr).or_insert(player))
    }

    pub fn leave(&mut self, addr: &SocketAddr) -> Option<Player> {
        let player = self.players.remove(addr)?;
        info!("Player {} left ({})", player.name, addr);
        Some(player)
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&Player> {
        self.players.get(addr)
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut Player> {
        self.players.get_mut(addr)
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.players.contains_key(addr)
    }

    /// Exact, case-sensitive lookup.
    pub fn find_by_name(&self, name: &str) -> Option<&Player> {
        self.players.values().find(|player| player.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Name and score of every player, ordered by name.
    pub fn scoreboard(&self) -> Vec<(String, u32)> {
        let mut board: Vec<(String, u32)> = self
            .players
            .values()
            .map(|player| (player.name.clone(), player.score))
            .collect();
        board.sort();
        board
    }

    /// Sends `packet` to everyone. Returns the players whose queue refused it.
    pub fn broadcast(&self, packet: &ServerPacket) -> Vec<SocketAddr> {
        self.broadcast_filtered(packet, |_| true)
    }

    pub fn broadcast_except(&self, except: SocketAddr, packet: &ServerPacket) -> Vec<SocketAddr> {
        self.broadcast_filtered(packet, |player| player.addr != except)
    }

    fn broadcast_filtered<F>(&self, packet: &ServerPacket, include: F) -> Vec<SocketAddr>
    where
        F: Fn(&Player) -> bool,
    {
        self.players
            .values()
            .filter(|player| include(player))
            .filter(|player| player.proxy.send(packet.clone()).is_err())
            .map(|player| player.addr)
            .collect()
    }
}
