//! # Drawing Room Server Library
//!
//! This library provides the authoritative server for a turn-based
//! drawing-and-guessing game. One player paints a secret word while everyone
//! else watches the strokes appear and tries to guess it. The server decides
//! whose turn it is, owns the countdown, judges guesses and keeps every
//! client's canvas in step with the painter's.
//!
//! ## Core Responsibilities
//!
//! ### Turn Coordination
//! Players take turns painting in the order they joined. A turn ends when the
//! countdown expires, when every other player has guessed the word, or when
//! the painter leaves. A short break follows before the next painter starts.
//! With fewer than two players the room waits.
//!
//! ### Canvas Replication
//! Every painting operation of the current round is kept in an append-only
//! history. Players that are caught up receive new operations as they arrive.
//! Late joiners receive a replay of the history first, without ever seeing an
//! operation twice or out of order.
//!
//! ### Scoring
//! The first correct guess of each player in a round earns one point. Scores
//! and roster changes are broadcast so every client keeps its own scoreboard.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! All room state lives in one [`room::Room`] owned by the server's event
//! loop. Connection tasks and the countdown ticker only send messages to that
//! loop, so room logic runs sequentially and needs no locking.
//!
//! ### Bounded Outbound Queues
//! Each connection has a writer task draining a bounded queue. Paint
//! operations and replays only use the upper part of it and wait their turn
//! when it runs out, so a long replay never crowds out chat or turn packets.
//! The event loop never waits on a socket; a client that stops reading until
//! even the reserved part fills up is dropped and leaves the room like any
//! other disconnect.
//!
//! ### Text Protocol over TCP
//! Packets are short comma-separated text records terminated by `@`, defined
//! in the `shared` crate together with the frame splitter.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! TCP listener, per-connection reader and writer tasks, the countdown ticker
//! and the main event loop.
//!
//! ### Room Module (`room`)
//! The aggregate tying sessions, turns, scoring and replication together.
//!
//! ### Session Module (`session`)
//! Roster of joined players with unique names.
//!
//! ### Scheduler Module (`scheduler`)
//! Phase state machine, painter queue and countdown.
//!
//! ### Replication Module (`replication`)
//! Paint history, per-player cursors and catch-up replays.
//!
//! ### Scoring Module (`scoring`)
//! Per-round record of who guessed the word.
//!
//! ### Proxy Module (`proxy`)
//! Outbound façade for one connection.
//!
//! ### Supporting Modules
//! `config` reads tunables from the environment, `words` holds the secret
//! word pool and `error` defines the error type shared by all of the above.

pub mod config;
pub mod error;
pub mod network;
pub mod proxy;
pub mod replication;
pub mod room;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod words;

pub use config::ServerConfig;
pub use error::{GameError, GameResult};
pub use network::Server;
pub use room::Room;
pub use words::WordList;
