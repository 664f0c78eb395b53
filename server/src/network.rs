//! Server network layer handling TCP connections and the room's event loop

use crate::config::ServerConfig;
use crate::error::{GameError, GameResult};
use crate::proxy::{OutboundQueue, PlayerProxy, ReplayGate};
use crate::room::Room;
use crate::words::WordList;
use log::{debug, error, info, warn};
use shared::{ClientPacket, CodecError, FrameDecoder};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from connection and timer tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: ClientPacket,
        addr: SocketAddr,
    },
    Malformed {
        addr: SocketAddr,
        error: CodecError,
    },
    Disconnected {
        addr: SocketAddr,
    },
    /// One second of countdown time elapsed.
    Tick,
}

/// Tells the event loop that one of `addr`'s connection tasks ended. Returns
/// false if the event loop is already gone.
fn report_disconnect(
    server_tx: &mpsc::UnboundedSender<ServerMessage>,
    addr: SocketAddr,
    task: &str,
) -> bool {
    match server_tx.send(ServerMessage::Disconnected { addr }) {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to report disconnect of {} from its {} task: {}", addr, task, e);
            false
        }
    }
}

/// Tasks and outbound queue of one accepted socket.
struct Connection {
    proxy: PlayerProxy,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    fn close(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Main server owning the listener, the open connections and the room
pub struct Server {
    listener: TcpListener,
    room: Room,
    connections: HashMap<SocketAddr, Connection>,
    outbound_queue: usize,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn bind(addr: &str, config: ServerConfig, words: WordList) -> GameResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            room: Room::new(&config, words),
            connections: HashMap::new(),
            outbound_queue: config.outbound_queue,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> GameResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    /// Spawns the task that drives the room countdown, one tick per second
    fn spawn_countdown_ticker(&self) -> JoinHandle<()> {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // Skip the first tick since it fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if server_tx.send(ServerMessage::Tick).is_err() {
                    break;
                }
            }
        })
    }

    /// Spawns the task that splits a socket's byte stream into packets
    fn spawn_reader(
        mut reader: OwnedReadHalf,
        addr: SocketAddr,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            let mut buffer = [0u8; 1024];

            loop {
                match reader.read(&mut buffer).await {
                    Ok(0) => break,
                    Ok(len) => {
                        for frame in decoder.push(&buffer[..len]) {
                            let message =
                                match frame.and_then(|frame| ClientPacket::decode(&frame)) {
                                    Ok(packet) => ServerMessage::PacketReceived { packet, addr },
                                    Err(error) => ServerMessage::Malformed { addr, error },
                                };
                            if server_tx.send(message).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        debug!("Error reading from {}: {}", addr, e);
                        break;
                    }
                }
            }

            report_disconnect(&server_tx, addr, "reader");
        })
    }

    /// Spawns the task that drains a connection's outbound queue into its socket
    fn spawn_writer(
        mut writer: OwnedWriteHalf,
        addr: SocketAddr,
        mut outbound: OutboundQueue,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut gate = ReplayGate::default();

            while let Some(item) = outbound.recv().await {
                let Some(packet) = gate.admit(item) else {
                    continue;
                };
                if let Err(e) = writer.write_all(packet.encode().as_bytes()).await {
                    warn!("Failed to write to {}: {}", addr, e);
                    break;
                }
            }

            report_disconnect(&server_tx, addr, "writer");
        })
    }

    fn accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", addr, e);
        }
        let (read_half, write_half) = stream.into_split();
        let (proxy, outbound) = PlayerProxy::channel(addr, self.outbound_queue);

        let connection = Connection {
            proxy,
            reader: Self::spawn_reader(read_half, addr, self.server_tx.clone()),
            writer: Self::spawn_writer(write_half, addr, outbound, self.server_tx.clone()),
        };
        info!("Connection from {}", addr);

        if let Some(stale) = self.connections.insert(addr, connection) {
            stale.close();
        }
    }

    /// Closes a connection and removes its player from the room
    fn drop_connection(&mut self, addr: SocketAddr) {
        if let Some(connection) = self.connections.remove(&addr) {
            connection.close();
            debug!("Closed connection {}", addr);
        }
        if let Some(name) = self.room.leave(addr) {
            info!("{} disconnected ({})", name, addr);
        }
    }

    /// Drops every connection whose outbound queue refused a packet. Leaving
    /// can itself fail further sends, so this repeats until nothing is left.
    fn reap_lost(&mut self) {
        loop {
            let lost = self.room.take_lost();
            if lost.is_empty() {
                break;
            }
            for addr in lost {
                warn!("Dropping {}: outbound queue full or closed", addr);
                self.drop_connection(addr);
            }
        }
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::PacketReceived { packet, addr } => {
                let Some(proxy) = self.connections.get(&addr).map(|c| c.proxy.clone()) else {
                    return;
                };
                match self.room.dispatch(&proxy, packet) {
                    Ok(()) => {}
                    Err(e @ GameError::OutOfTurnAction { .. }) => debug!("{}", e),
                    Err(e) => warn!("Rejected packet from {}: {}", addr, e),
                }
            }
            ServerMessage::Malformed { addr, error } => {
                warn!("Dropping malformed packet from {}: {}", addr, error);
            }
            ServerMessage::Disconnected { addr } => self.drop_connection(addr),
            ServerMessage::Tick => self.room.tick(),
        }
    }

    /// Main server loop accepting connections and processing room events
    pub async fn run(&mut self) -> GameResult<()> {
        let ticker = self.spawn_countdown_ticker();

        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                },

                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },
            }

            self.reap_lost();
        }

        ticker.abort();
        Ok(())
    }
}
