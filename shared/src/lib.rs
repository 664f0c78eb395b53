//! Wire protocol spoken between the drawing-game server and its clients.
//!
//! A connection is a plain byte stream carrying `@`-terminated text packets.
//! Every packet starts with a one-letter channel:
//!
//! - `G` game control: canvas, painting turn and countdown (`G,PAINT,...`)
//! - `N` game logic: join replies, scores, system messages, guesses
//! - `C` free-text chat, relayed verbatim
//!
//! Packets are decoded once at the boundary into [`ClientPacket`] or
//! [`ServerPacket`], so the rest of the system matches on closed enums
//! instead of comparing type strings.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8000;
pub const PACKET_DELIMITER: char = '@';
pub const FIELD_SEPARATOR: char = ',';
/// Longest run of bytes accepted without seeing a delimiter.
pub const MAX_FRAME_LEN: usize = 4096;
pub const MAX_NAME_LEN: usize = 24;
/// Score value telling clients to drop a name from their scoreboard.
pub const SCORE_REMOVED: i64 = -1;

/// Errors produced while splitting or decoding packets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("empty packet")]
    Empty,
    #[error("unknown channel `{0}`")]
    UnknownChannel(String),
    #[error("unknown packet type `{kind}` on channel {channel}")]
    UnknownType { channel: Channel, kind: String },
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is not a valid number: `{value}`")]
    BadNumber { field: &'static str, value: String },
    #[error("packet is not valid UTF-8")]
    InvalidUtf8,
    #[error("no packet delimiter within {0} bytes")]
    FrameTooLong(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Game,
    Notice,
    Chat,
}

impl Channel {
    pub fn tag(self) -> char {
        match self {
            Channel::Game => 'G',
            Channel::Notice => 'N',
            Channel::Chat => 'C',
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for Channel {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "G" => Ok(Channel::Game),
            "N" => Ok(Channel::Notice),
            "C" => Ok(Channel::Chat),
            other => Err(CodecError::UnknownChannel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// One brush stroke sample as emitted by the painter's canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaintOp {
    pub x: u16,
    pub y: u16,
    pub color: Rgb,
    pub tool_size: u8,
}

impl PaintOp {
    pub fn new(x: u16, y: u16, color: Rgb, tool_size: u8) -> Self {
        Self {
            x,
            y,
            color,
            tool_size,
        }
    }

    fn write_fields(&self, out: &mut String) {
        out.push_str(&format!(
            "PAINT,{},{},{},{},{},{}",
            self.x, self.y, self.color.r, self.color.g, self.color.b, self.tool_size
        ));
    }

    fn read_fields(fields: &mut Fields<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            x: fields.number("x")?,
            y: fields.number("y")?,
            color: Rgb {
                r: fields.number("r")?,
                g: fields.number("g")?,
                b: fields.number("b")?,
            },
            tool_size: fields.number("toolSize")?,
        })
    }
}

/// Packets sent by a client to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    Join { name: String },
    Paint(PaintOp),
    /// The client's own countdown ran out. Informational only.
    TimeUp,
    Guess { text: String },
    Chat { text: String },
}

/// Packets sent by the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    Clear,
    Paint(PaintOp),
    Lock,
    Turn,
    Time { label: String, seconds: u32 },
    Welcome { name: String },
    DupName { name: String },
    BadName { reason: String },
    Info { text: String },
    Score { name: String, score: i64 },
    Chat { text: String },
}

impl ClientPacket {
    pub fn channel(&self) -> Channel {
        match self {
            ClientPacket::Join { .. } | ClientPacket::Paint(_) | ClientPacket::TimeUp => {
                Channel::Game
            }
            ClientPacket::Guess { .. } => Channel::Notice,
            ClientPacket::Chat { .. } => Channel::Chat,
        }
    }

    /// Encodes the packet including its trailing delimiter.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.channel().tag());
        out.push(FIELD_SEPARATOR);
        match self {
            ClientPacket::Join { name } => push_kind_and_text(&mut out, "JOIN", name),
            ClientPacket::Paint(op) => op.write_fields(&mut out),
            ClientPacket::TimeUp => out.push_str("TIME_UP"),
            ClientPacket::Guess { text } => push_kind_and_text(&mut out, "GUESS", text),
            ClientPacket::Chat { text } => out.push_str(&strip_delimiter(text)),
        }
        out.push(PACKET_DELIMITER);
        out
    }

    /// Decodes a single frame with the delimiter already removed.
    pub fn decode(frame: &str) -> Result<Self, CodecError> {
        let (channel, mut fields) = split_frame(frame)?;
        if channel == Channel::Chat {
            return Ok(ClientPacket::Chat {
                text: fields.rest_or_empty().to_string(),
            });
        }

        let kind = fields.field("type")?;
        match (channel, kind) {
            (Channel::Game, "JOIN") => Ok(ClientPacket::Join {
                name: fields.rest("name")?.to_string(),
            }),
            (Channel::Game, "PAINT") => Ok(ClientPacket::Paint(PaintOp::read_fields(&mut fields)?)),
            (Channel::Game, "TIME_UP") => Ok(ClientPacket::TimeUp),
            (Channel::Notice, "GUESS") => Ok(ClientPacket::Guess {
                text: fields.rest_or_empty().to_string(),
            }),
            (channel, kind) => Err(CodecError::UnknownType {
                channel,
                kind: kind.to_string(),
            }),
        }
    }
}

impl ServerPacket {
    pub fn channel(&self) -> Channel {
        match self {
            ServerPacket::Clear
            | ServerPacket::Paint(_)
            | ServerPacket::Lock
            | ServerPacket::Turn
            | ServerPacket::Time { .. } => Channel::Game,
            ServerPacket::Welcome { .. }
            | ServerPacket::DupName { .. }
            | ServerPacket::BadName { .. }
            | ServerPacket::Info { .. }
            | ServerPacket::Score { .. } => Channel::Notice,
            ServerPacket::Chat { .. } => Channel::Chat,
        }
    }

    /// Encodes the packet including its trailing delimiter.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.channel().tag());
        out.push(FIELD_SEPARATOR);
        match self {
            ServerPacket::Clear => out.push_str("CLEAR"),
            ServerPacket::Paint(op) => op.write_fields(&mut out),
            ServerPacket::Lock => out.push_str("LOCK"),
            ServerPacket::Turn => out.push_str("TURN"),
            ServerPacket::Time { label, seconds } => {
                out.push_str(&format!("TIME,{},{}", strip_fields(label), seconds))
            }
            ServerPacket::Welcome { name } => push_kind_and_text(&mut out, "WELCOME", name),
            ServerPacket::DupName { name } => push_kind_and_text(&mut out, "DUPNAME", name),
            ServerPacket::BadName { reason } => push_kind_and_text(&mut out, "BADNAME", reason),
            ServerPacket::Info { text } => push_kind_and_text(&mut out, "INFO", text),
            ServerPacket::Score { name, score } => {
                out.push_str(&format!("SCORE,{},{}", strip_fields(name), score))
            }
            ServerPacket::Chat { text } => out.push_str(&strip_delimiter(text)),
        }
        out.push(PACKET_DELIMITER);
        out
    }

    /// Decodes a single frame with the delimiter already removed.
    pub fn decode(frame: &str) -> Result<Self, CodecError> {
        let (channel, mut fields) = split_frame(frame)?;
        if channel == Channel::Chat {
            return Ok(ServerPacket::Chat {
                text: fields.rest_or_empty().to_string(),
            });
        }

        let kind = fields.field("type")?;
        let packet = match (channel, kind) {
            (Channel::Game, "CLEAR") => ServerPacket::Clear,
            (Channel::Game, "PAINT") => ServerPacket::Paint(PaintOp::read_fields(&mut fields)?),
            (Channel::Game, "LOCK") => ServerPacket::Lock,
            (Channel::Game, "TURN") => ServerPacket::Turn,
            (Channel::Game, "TIME") => ServerPacket::Time {
                label: fields.field("label")?.to_string(),
                seconds: fields.number("seconds")?,
            },
            (Channel::Notice, "WELCOME") => ServerPacket::Welcome {
                name: fields.rest("name")?.to_string(),
            },
            (Channel::Notice, "DUPNAME") => ServerPacket::DupName {
                name: fields.rest("name")?.to_string(),
            },
            (Channel::Notice, "BADNAME") => ServerPacket::BadName {
                reason: fields.rest_or_empty().to_string(),
            },
            (Channel::Notice, "INFO") => ServerPacket::Info {
                text: fields.rest_or_empty().to_string(),
            },
            (Channel::Notice, "SCORE") => ServerPacket::Score {
                name: fields.field("name")?.to_string(),
                score: fields.number("score")?,
            },
            (channel, kind) => {
                return Err(CodecError::UnknownType {
                    channel,
                    kind: kind.to_string(),
                })
            }
        };
        Ok(packet)
    }
}

/// Splits a byte stream into `@`-terminated frames.
///
/// Reads from a stream socket can end anywhere, so bytes after the last
/// delimiter are kept until the next [`FrameDecoder::push`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds freshly read bytes and returns every frame they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, CodecError>> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(pos) = self
            .buffer
            .iter()
            .position(|b| *b == PACKET_DELIMITER as u8)
        {
            let mut frame: Vec<u8> = self.buffer.drain(..=pos).collect();
            frame.pop();

            match String::from_utf8(frame) {
                Ok(text) => {
                    let text = text.trim_matches(|c| c == '\r' || c == '\n');
                    if !text.is_empty() {
                        frames.push(Ok(text.to_string()));
                    }
                }
                Err(_) => frames.push(Err(CodecError::InvalidUtf8)),
            }
        }

        if self.buffer.len() > MAX_FRAME_LEN {
            self.buffer.clear();
            frames.push(Err(CodecError::FrameTooLong(MAX_FRAME_LEN)));
        }

        frames
    }

    /// Number of buffered bytes still waiting for a delimiter.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Cursor over the comma-separated fields of one frame.
struct Fields<'a> {
    rest: Option<&'a str>,
}

impl<'a> Fields<'a> {
    fn field(&mut self, name: &'static str) -> Result<&'a str, CodecError> {
        let rest = self.rest.take().ok_or(CodecError::MissingField(name))?;
        match rest.split_once(FIELD_SEPARATOR) {
            Some((head, tail)) => {
                self.rest = Some(tail);
                Ok(head)
            }
            None => Ok(rest),
        }
    }

    /// Takes everything left, commas included. Fails if nothing is left.
    fn rest(&mut self, name: &'static str) -> Result<&'a str, CodecError> {
        match self.rest.take() {
            Some(rest) if !rest.is_empty() => Ok(rest),
            _ => Err(CodecError::MissingField(name)),
        }
    }

    fn rest_or_empty(&mut self) -> &'a str {
        self.rest.take().unwrap_or("")
    }

    fn number<T: FromStr>(&mut self, name: &'static str) -> Result<T, CodecError> {
        let raw = self.field(name)?;
        raw.trim().parse().map_err(|_| CodecError::BadNumber {
            field: name,
            value: raw.to_string(),
        })
    }
}

fn split_frame(frame: &str) -> Result<(Channel, Fields<'_>), CodecError> {
    let frame = frame.trim_end_matches(PACKET_DELIMITER);
    if frame.is_empty() {
        return Err(CodecError::Empty);
    }
    let (tag, rest) = match frame.split_once(FIELD_SEPARATOR) {
        Some((tag, rest)) => (tag, Some(rest)),
        None => (frame, None),
    };
    Ok((tag.parse()?, Fields { rest }))
}

fn push_kind_and_text(out: &mut String, kind: &str, text: &str) {
    out.push_str(kind);
    out.push(FIELD_SEPARATOR);
    out.push_str(&strip_delimiter(text));
}

fn strip_delimiter(text: &str) -> String {
    text.replace(PACKET_DELIMITER, "")
}

fn strip_fields(text: &str) -> String {
    text.replace([PACKET_DELIMITER, FIELD_SEPARATOR], "")
}
