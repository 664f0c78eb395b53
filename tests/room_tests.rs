//! Room behavior tests
//!
//! These drive a `Room` directly through its operations, with in-memory
//! outbound queues standing in for sockets and synthetic countdown ticks.

use server::error::GameError;
use server::proxy::{OutboundQueue, Outgoing, PlayerProxy, ReplayGate};
use server::scheduler::Phase;
use server::{Room, ServerConfig, WordList};
use shared::{PaintOp, Rgb, ServerPacket, SCORE_REMOVED};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

const ROUND_SECONDS: u64 = 3;
const BREAK_SECONDS: u64 = 2;

/// In-memory client: what a connection's writer task would put on the wire.
struct Client {
    proxy: PlayerProxy,
    rx: OutboundQueue,
    gate: ReplayGate,
    canvas: Vec<PaintOp>,
}

impl Client {
    fn new(port: u16) -> Self {
        Self::with_queue(port, 1024)
    }

    fn with_queue(port: u16, capacity: usize) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let (proxy, rx) = PlayerProxy::channel(addr, capacity);
        Self {
            proxy,
            rx,
            gate: ReplayGate::default(),
            canvas: Vec::new(),
        }
    }

    fn addr(&self) -> SocketAddr {
        self.proxy.addr()
    }

    fn apply(&mut self, item: Outgoing) -> Option<ServerPacket> {
        let packet = self.gate.admit(item)?;
        match &packet {
            ServerPacket::Clear => self.canvas.clear(),
            ServerPacket::Paint(op) => self.canvas.push(*op),
            _ => {}
        }
        Some(packet)
    }

    /// Everything queued so far, without waiting for replay tasks.
    fn drain(&mut self) -> Vec<ServerPacket> {
        let mut packets = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            packets.extend(self.apply(item));
        }
        packets
    }

    /// Receives one item, waiting for replay tasks if nothing is queued.
    async fn step(&mut self) -> Option<ServerPacket> {
        let item = timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("timed out waiting for replay")
            .expect("queue closed");
        self.apply(item)
    }

    /// Waits until the canvas holds `len` operations.
    async fn canvas_of_len(&mut self, len: usize) -> Vec<PaintOp> {
        while self.canvas.len() < len {
            self.step().await;
        }
        self.canvas.clone()
    }

    /// Receives until nothing more arrives for a short while.
    async fn settle(&mut self) -> Vec<ServerPacket> {
        let mut packets = Vec::new();
        while let Ok(Some(item)) = timeout(Duration::from_millis(200), self.rx.recv()).await {
            packets.extend(self.apply(item));
        }
        packets
    }

    fn infos(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|packet| match packet {
                ServerPacket::Info { text } => Some(text),
                _ => None,
            })
            .collect()
    }
}

fn room() -> Room {
    let config = ServerConfig {
        round_duration: Duration::from_secs(ROUND_SECONDS),
        break_duration: Duration::from_secs(BREAK_SECONDS),
        ..ServerConfig::default()
    };
    Room::new(&config, WordList::from_words(["kite"]))
}

fn stroke(i: u16) -> PaintOp {
    PaintOp::new(i * 10, i * 5, Rgb { r: 200, g: 10, b: i as u8 }, 3)
}

fn join_all(room: &mut Room, clients: &[&Client], names: &[&str]) {
    for (client, name) in clients.iter().zip(names) {
        room.join(client.proxy.clone(), name).unwrap();
    }
}

/// Ticks through the rest of the current round and the following break.
fn play_out_turn(room: &mut Room) {
    while room.phase() == Phase::Painting {
        room.tick();
    }
    while room.phase() == Phase::Break {
        room.tick();
    }
}

#[tokio::test]
async fn roster_counts_distinct_joins_only() {
    let mut room = room();
    let clients: Vec<Client> = (1..=4).map(Client::new).collect();
    let names = ["ann", "ben", "cat", "dan"];

    for (i, (client, name)) in clients.iter().zip(names).enumerate() {
        room.join(client.proxy.clone(), name).unwrap();
        assert_eq!(room.sessions().len(), i + 1);
    }

    for (port, name) in (10..).zip(names) {
        let impostor = Client::new(port);
        let err = room.join(impostor.proxy.clone(), name).unwrap_err();
        assert!(matches!(err, GameError::DuplicateName { .. }));
        assert_eq!(room.sessions().len(), names.len());
    }
}

#[tokio::test]
async fn painters_rotate_in_join_order() {
    let mut room = room();
    let (a, b, c) = (Client::new(1), Client::new(2), Client::new(3));
    join_all(&mut room, &[&a, &b, &c], &["a", "b", "c"]);

    let mut painters = Vec::new();
    for _ in 0..4 {
        painters.push(room.painter().unwrap());
        play_out_turn(&mut room);
    }
    assert_eq!(painters, vec![a.addr(), b.addr(), c.addr(), a.addr()]);
}

#[tokio::test]
async fn late_joiner_canvas_matches_early_watcher() {
    let mut room = room();
    let mut painter = Client::new(1);
    let mut early = Client::new(2);
    join_all(&mut room, &[&painter, &early], &["painter", "early"]);
    assert_eq!(room.painter(), Some(painter.addr()));

    for i in 0..5 {
        room.paint(painter.addr(), stroke(i)).unwrap();
    }

    let mut late = Client::new(3);
    room.join(late.proxy.clone(), "late").unwrap();
    for i in 5..8 {
        room.paint(painter.addr(), stroke(i)).unwrap();
    }

    let expected: Vec<PaintOp> = (0..8).map(stroke).collect();
    assert_eq!(early.canvas_of_len(8).await, expected);
    assert_eq!(late.canvas_of_len(8).await, expected);

    // No duplicates trail behind the replay.
    tokio::task::yield_now().await;
    late.drain();
    assert_eq!(late.canvas, expected);
    assert!(painter.drain().iter().all(|p| !matches!(p, ServerPacket::Paint(_))));
}

#[tokio::test]
async fn correct_guess_scores_once() {
    let mut room = room();
    let (a, mut b, c) = (Client::new(1), Client::new(2), Client::new(3));
    join_all(&mut room, &[&a, &b, &c], &["a", "b", "c"]);
    b.drain();

    assert_ok!(room.submit_guess(b.addr(), "kite"));
    let again = assert_err!(room.submit_guess(b.addr(), "kite"));
    assert!(matches!(again, GameError::OutOfTurnAction { .. }));

    assert_eq!(room.sessions().get(&b.addr()).unwrap().score, 1);
    let scores: Vec<ServerPacket> = b
        .drain()
        .into_iter()
        .filter(|p| matches!(p, ServerPacket::Score { name, .. } if name == "b"))
        .collect();
    assert_eq!(
        scores,
        vec![ServerPacket::Score {
            name: "b".to_string(),
            score: 1
        }]
    );
    assert_eq!(room.phase(), Phase::Painting);
}

#[tokio::test]
async fn round_ends_early_when_everyone_guessed() {
    let mut room = room();
    let (mut a, mut b, mut c) = (Client::new(1), Client::new(2), Client::new(3));
    join_all(&mut room, &[&a, &b, &c], &["a", "b", "c"]);
    for client in [&mut a, &mut b, &mut c] {
        client.drain();
    }

    room.submit_guess(b.addr(), "kite").unwrap();
    assert_eq!(room.phase(), Phase::Painting);
    room.submit_guess(c.addr(), "kite").unwrap();
    assert_eq!(room.phase(), Phase::Break);
    assert_eq!(room.remaining(), BREAK_SECONDS as u32);

    for client in [&mut a, &mut b, &mut c] {
        let infos = client.infos();
        assert!(infos.contains(&"Everyone guessed the word!".to_string()));
        assert!(infos.iter().all(|text| !text.contains("The word was")));
    }
}

#[tokio::test]
async fn expiry_transitions_to_break_once() {
    let mut room = room();
    let (mut a, b) = (Client::new(1), Client::new(2));
    join_all(&mut room, &[&a, &b], &["a", "b"]);
    a.drain();

    for _ in 0..ROUND_SECONDS - 1 {
        room.tick();
        assert_eq!(room.phase(), Phase::Painting);
    }
    room.tick();
    assert_eq!(room.phase(), Phase::Break);
    assert_eq!(room.remaining(), BREAK_SECONDS as u32);

    let packets = a.drain();
    let breaks = packets
        .iter()
        .filter(|p| matches!(p, ServerPacket::Time { label, .. } if label == "Break"))
        .count();
    let reveals = packets
        .iter()
        .filter(|p| matches!(p, ServerPacket::Info { text } if text == "Time's up! The word was: kite"))
        .count();
    assert_eq!(breaks, 1);
    assert_eq!(reveals, 1);

    room.tick();
    assert_eq!(room.phase(), Phase::Break);
    room.tick();
    assert_eq!(room.phase(), Phase::Painting);
    assert_eq!(room.painter(), Some(b.addr()));
}

#[tokio::test]
async fn painter_disconnect_idles_until_next_join() {
    let mut room = room();
    let (a, mut b) = (Client::new(1), Client::new(2));
    join_all(&mut room, &[&a, &b], &["a", "b"]);
    assert_eq!(room.painter(), Some(a.addr()));
    b.drain();

    assert_eq!(room.leave(a.addr()).as_deref(), Some("a"));
    assert_eq!(room.sessions().len(), 1);
    assert_eq!(room.phase(), Phase::Idle);
    assert!(room.painter().is_none());

    let packets = b.drain();
    assert!(packets.contains(&ServerPacket::Score {
        name: "a".to_string(),
        score: SCORE_REMOVED
    }));
    assert!(packets.contains(&ServerPacket::Info {
        text: "The painter left. The word was: kite".to_string()
    }));
    assert!(packets.contains(&ServerPacket::Time {
        label: "Waiting".to_string(),
        seconds: 0
    }));

    let c = Client::new(3);
    room.join(c.proxy.clone(), "c").unwrap();
    assert_eq!(room.phase(), Phase::Painting);
    assert_eq!(room.painter(), Some(b.addr()));
}

#[tokio::test]
async fn last_guesser_leaving_ends_round() {
    let mut room = room();
    let (a, b, c) = (Client::new(1), Client::new(2), Client::new(3));
    join_all(&mut room, &[&a, &b, &c], &["a", "b", "c"]);

    room.submit_guess(b.addr(), "kite").unwrap();
    room.leave(c.addr());
    assert_eq!(room.phase(), Phase::Break);
}

#[tokio::test]
async fn new_round_wipes_history() {
    let mut room = room();
    let (a, mut b) = (Client::new(1), Client::new(2));
    join_all(&mut room, &[&a, &b], &["a", "b"]);
    room.paint(a.addr(), stroke(1)).unwrap();
    assert_eq!(room.history().len(), 1);

    play_out_turn(&mut room);
    assert!(room.history().is_empty());
    b.drain();
    assert!(b.canvas.is_empty());

    // Strokes from the previous painter are refused now.
    assert_err!(room.paint(a.addr(), stroke(2)));
    assert_ok!(room.paint(b.addr(), stroke(3)));
    assert_eq!(room.history().ops(), vec![stroke(3)]);
}

#[tokio::test]
async fn painter_leaving_mid_round_starts_break() {
    let mut room = room();
    let (a, mut b, c) = (Client::new(1), Client::new(2), Client::new(3));
    join_all(&mut room, &[&a, &b, &c], &["a", "b", "c"]);
    assert_eq!(room.painter(), Some(a.addr()));
    b.drain();

    room.leave(a.addr());
    assert_eq!(room.phase(), Phase::Break);
    assert_eq!(room.remaining(), BREAK_SECONDS as u32);
    assert!(room.painter().is_none());
    assert_eq!(room.queue(), vec![b.addr(), c.addr()]);
    assert!(b
        .infos()
        .contains(&"The painter left. The word was: kite".to_string()));

    for _ in 0..BREAK_SECONDS {
        room.tick();
    }
    assert_eq!(room.phase(), Phase::Painting);
    assert_eq!(room.painter(), Some(b.addr()));
    assert_eq!(room.queue(), vec![c.addr()]);
}

#[tokio::test]
async fn mid_round_joiner_learns_painter() {
    let mut room = room();
    let (a, b) = (Client::new(1), Client::new(2));
    join_all(&mut room, &[&a, &b], &["a", "b"]);

    let mut late = Client::new(3);
    room.join(late.proxy.clone(), "late").unwrap();
    let packets = late.drain();
    assert!(packets.contains(&ServerPacket::Info {
        text: "a is painting now!".to_string()
    }));
    assert!(packets.contains(&ServerPacket::Time {
        label: "Round".to_string(),
        seconds: ROUND_SECONDS as u32
    }));
    assert!(!packets.contains(&ServerPacket::Turn));
}

#[tokio::test]
async fn long_replay_leaves_room_for_other_packets() {
    let mut room = room();
    let painter = Client::new(1);
    let chatter = Client::new(2);
    join_all(&mut room, &[&painter, &chatter], &["painter", "chatter"]);
    for i in 0..200 {
        room.paint(painter.addr(), stroke(i)).unwrap();
    }

    // The replay is several times longer than the late joiner's queue.
    let mut late = Client::with_queue(3, 32);
    room.join(late.proxy.clone(), "late").unwrap();

    let mut chats = Vec::new();
    let mut steps = 0;
    while late.canvas.len() < 200 {
        if steps % 2 == 0 {
            let text = format!("line {}", steps);
            room.chat(chatter.addr(), text.clone()).unwrap();
            chats.push(text);
        }
        assert!(room.take_lost().is_empty());
        if let Some(ServerPacket::Chat { text }) = late.step().await {
            assert_eq!(Some(&text), chats.first());
            chats.remove(0);
        }
        steps += 1;
    }

    let expected: Vec<PaintOp> = (0..200).map(stroke).collect();
    assert_eq!(late.canvas, expected);
    late.settle().await;
    assert_eq!(late.canvas, expected);
    assert!(room.sessions().contains(&late.addr()));
    assert!(room.take_lost().is_empty());
}

#[tokio::test]
async fn round_change_during_replay_leaves_only_new_strokes() {
    let mut room = room();
    let (a, mut b) = (Client::new(1), Client::new(2));
    join_all(&mut room, &[&a, &b], &["a", "b"]);
    for i in 0..100 {
        room.paint(a.addr(), stroke(i)).unwrap();
    }

    let mut late = Client::with_queue(3, 32);
    room.join(late.proxy.clone(), "late").unwrap();
    // The replay is now parked on a full queue, still in the old round.
    late.canvas_of_len(5).await;
    assert!(room.history().len() > late.canvas.len());

    late.drain();
    while room.phase() == Phase::Painting {
        room.tick();
        late.drain();
    }
    while room.phase() == Phase::Break {
        room.tick();
        late.drain();
    }
    assert_eq!(room.painter(), Some(b.addr()));
    b.drain();

    room.paint(b.addr(), stroke(200)).unwrap();
    room.paint(b.addr(), stroke(201)).unwrap();
    late.settle().await;

    assert_eq!(late.canvas, vec![stroke(200), stroke(201)]);
    assert!(room.take_lost().is_empty());
}
