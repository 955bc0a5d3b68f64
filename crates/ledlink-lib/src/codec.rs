//! Wire codec: `Command` → frame string, inbound frame → [`DeviceEvent`].
//!
//! Pure functions, no I/O. The [`FrameDecoder`] splits a byte stream into
//! frames; a malformed frame yields an error for that frame only and the
//! stream carries on.

use std::fmt;

use serde::Serialize;

use crate::color::Rgb;
use crate::command::{Command, ScheduleAction};
use crate::protocol::{self, *};

// ── Error type ──

/// Inbound frame could not be parsed. Never fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Malformed { frame: String, reason: String },
}

impl DecodeError {
    fn malformed(frame: &str, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            frame: frame.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Malformed { frame, reason } => {
                write!(f, "Malformed frame {frame:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

// ── Inbound events ──

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// `OK`: last command accepted.
    Ack,
    /// `ERR:<message>`: controller rejected a command.
    Error { message: String },
    Power { on: bool },
    /// Brightness as reported on the wire (`0..=255`).
    Brightness { wire: u8 },
    Color { color: Rgb },
    Effect { name: String, speed: u8 },
    MusicMode { on: bool },
}

impl DeviceEvent {
    /// Brightness in percent, if this is a brightness report.
    pub fn brightness_percent(&self) -> Option<u8> {
        match self {
            DeviceEvent::Brightness { wire } => Some(protocol::brightness_from_wire(*wire)),
            _ => None,
        }
    }
}

// ── Encode ──

/// Encode a command as a newline-terminated wire frame.
pub fn encode(command: &Command) -> String {
    match command {
        Command::Power(on) => format!("{KEY_POWER}:{}\n", u8::from(*on)),
        Command::Brightness(p) => {
            format!("{KEY_BRIGHTNESS}:{}\n", protocol::brightness_to_wire(p.get()))
        }
        Command::Color(c) => format!("{KEY_COLOR}:{},{},{}\n", c.r, c.g, c.b),
        Command::Effect(e) => format!(
            "{KEY_EFFECT}:{}:{}\n",
            e.name(),
            e.speed().min(MAX_EFFECT_SPEED)
        ),
        Command::MusicMode(on) => format!("{KEY_MUSIC}:{}\n", u8::from(*on)),
        Command::Schedule(s) => format!(
            "{KEY_SCHEDULE}:{:02}:{:02}:{}:{}\n",
            s.hour(),
            s.minute(),
            u8::from(s.action() == ScheduleAction::PowerOn),
            s.weekdays()
        ),
    }
}

// ── Decode ──

/// Decode a single frame. A trailing `\n` or `\r\n` is accepted.
pub fn decode(bytes: &[u8]) -> Result<DeviceEvent, DecodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| DecodeError::malformed(&String::from_utf8_lossy(bytes), "not UTF-8"))?;
    let frame = text.trim_end_matches(['\r', '\n']);

    if frame == FRAME_OK {
        return Ok(DeviceEvent::Ack);
    }
    let Some((key, payload)) = frame.split_once(KEY_SEPARATOR) else {
        return Err(DecodeError::malformed(frame, "missing ':' separator"));
    };

    match key {
        KEY_ERROR => Ok(DeviceEvent::Error {
            message: payload.to_string(),
        }),
        KEY_POWER => parse_flag(frame, payload).map(|on| DeviceEvent::Power { on }),
        KEY_MUSIC => parse_flag(frame, payload).map(|on| DeviceEvent::MusicMode { on }),
        KEY_BRIGHTNESS => parse_u8(frame, payload).map(|wire| DeviceEvent::Brightness { wire }),
        KEY_COLOR => {
            let parts: Vec<&str> = payload.split(',').collect();
            let [r, g, b] = parts.as_slice() else {
                return Err(DecodeError::malformed(frame, "expected r,g,b"));
            };
            Ok(DeviceEvent::Color {
                color: Rgb::new(
                    parse_u8(frame, r)?,
                    parse_u8(frame, g)?,
                    parse_u8(frame, b)?,
                ),
            })
        }
        KEY_EFFECT => {
            let Some((name, speed)) = payload.rsplit_once(KEY_SEPARATOR) else {
                return Err(DecodeError::malformed(frame, "expected name:speed"));
            };
            if name.is_empty() {
                return Err(DecodeError::malformed(frame, "empty effect name"));
            }
            let speed = parse_u8(frame, speed)?;
            if speed > MAX_EFFECT_SPEED {
                return Err(DecodeError::malformed(frame, "effect speed above 100"));
            }
            Ok(DeviceEvent::Effect {
                name: name.to_string(),
                speed,
            })
        }
        other => Err(DecodeError::malformed(frame, format!("unknown key {other:?}"))),
    }
}

fn parse_flag(frame: &str, payload: &str) -> Result<bool, DecodeError> {
    match payload {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(DecodeError::malformed(frame, "expected 0 or 1")),
    }
}

fn parse_u8(frame: &str, payload: &str) -> Result<u8, DecodeError> {
    payload
        .parse::<u8>()
        .map_err(|_| DecodeError::malformed(frame, format!("{payload:?} is not 0-255")))
}

// ── Stream framing ──

/// Splits an inbound byte stream into newline-terminated frames.
///
/// Partial frames are buffered until their terminator arrives. A buffer
/// that grows past [`MAX_FRAME_LEN`] without a terminator is reported as
/// malformed and discarded.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Set after an overflow: drop bytes until the next terminator.
    skipping: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns one result per completed frame, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<DeviceEvent, DecodeError>> {
        let mut out = Vec::new();
        for &byte in bytes {
            if byte == FRAME_TERMINATOR {
                if self.skipping {
                    self.skipping = false;
                } else {
                    let frame = std::mem::take(&mut self.buf);
                    let trimmed = frame.strip_suffix(b"\r").unwrap_or(frame.as_slice());
                    if !trimmed.is_empty() {
                        out.push(decode(trimmed));
                    }
                }
                self.buf.clear();
                continue;
            }
            if self.skipping {
                continue;
            }
            self.buf.push(byte);
            if self.buf.len() > MAX_FRAME_LEN {
                let preview = String::from_utf8_lossy(&self.buf[..16]).into_owned();
                out.push(Err(DecodeError::malformed(
                    &preview,
                    format!("frame exceeds {MAX_FRAME_LEN} bytes"),
                )));
                self.buf.clear();
                self.skipping = true;
            }
        }
        out
    }

    /// Bytes buffered for an incomplete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
