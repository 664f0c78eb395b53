//! Headless player for exercising a running server.
//!
//! Joins under the given name, logs every packet it receives, paints random
//! dots while it holds the brush and throws random guesses otherwise.

use clap::Parser;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use server::WordList;
use shared::{ClientPacket, FrameDecoder, PaintOp, Rgb, ServerPacket};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to connect to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to connect to
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Display name to join with
    #[clap(short, long, default_value = "bot")]
    name: String,
    /// Milliseconds between two actions
    #[clap(long, default_value = "500")]
    pace_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let stream = TcpStream::connect(&address).await?;
    info!("Connected to {}", address);
    let (mut reader, mut writer) = stream.into_split();

    writer
        .write_all(ClientPacket::Join { name: args.name.clone() }.encode().as_bytes())
        .await?;

    let words = WordList::default();
    let mut rng = StdRng::from_entropy();
    let mut decoder = FrameDecoder::new();
    let mut buffer = [0u8; 1024];
    let mut painting = false;
    let mut guessing = false;

    let mut pace = interval(Duration::from_millis(args.pace_ms.max(10)));
    pace.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            read = reader.read(&mut buffer) => {
                let len = read?;
                if len == 0 {
                    info!("Server closed the connection");
                    break;
                }
                for frame in decoder.push(&buffer[..len]) {
                    let packet = match frame.and_then(|frame| ServerPacket::decode(&frame)) {
                        Ok(packet) => packet,
                        Err(e) => {
                            warn!("Bad packet from server: {}", e);
                            continue;
                        }
                    };
                    match &packet {
                        ServerPacket::Turn => painting = true,
                        ServerPacket::Lock => painting = false,
                        ServerPacket::Time { label, .. } => guessing = label == "Round",
                        ServerPacket::DupName { .. } | ServerPacket::BadName { .. } => {
                            warn!("Name {} was refused", args.name);
                            return Ok(());
                        }
                        _ => {}
                    }
                    info!("{:?}", packet);
                }
            },

            _ = pace.tick() => {
                let packet = if painting {
                    ClientPacket::Paint(PaintOp::new(
                        rng.gen_range(0..800),
                        rng.gen_range(0..600),
                        Rgb { r: rng.gen(), g: rng.gen(), b: rng.gen() },
                        rng.gen_range(1..=16),
                    ))
                } else if guessing && rng.gen_bool(0.2) {
                    match words.choose(&mut rng) {
                        Some(word) => ClientPacket::Guess { text: word.to_string() },
                        None => continue,
                    }
                } else {
                    continue;
                };
                writer.write_all(packet.encode().as_bytes()).await?;
            },
        }
    }

    Ok(())
}
