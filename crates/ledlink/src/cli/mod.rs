//! CLI subcommands: frame encoding/decoding, the simulated end-to-end run,
//! configuration, and (with `serial`) real ports.

mod config_cmd;
mod demo;
mod frames;
#[cfg(feature = "serial")]
mod serial;

use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};
use serde::Serialize;

pub(super) use ledlink_lib::codec::{self, DeviceEvent};
pub(super) use ledlink_lib::command::{self, ScheduleAction, ScheduleSpec};
pub(super) use ledlink_lib::config::Config;
pub(super) use ledlink_lib::error::{LedError, Result};

const PADDING: usize = 2;

/// Alignment width for key-value output: at least PADDING spaces after the
/// longest key, with top-level and indented values in the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indented keys lose 2 columns to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{key:<width$}{value}", width = w);
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// Print `value` as pretty JSON.
pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| LedError::Command(format!("serialize output: {e}")))?;
    println!("{text}");
    Ok(())
}

/// Frame without its terminator, for display.
pub(super) fn show_frame(frame: &str) -> &str {
    frame.trim_end_matches(['\r', '\n'])
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct EncodeOutput {
    pub command: command::Command,
    pub frame: String,
}

#[derive(Serialize)]
pub(super) struct DecodeOutput {
    pub frame: String,
    pub event: DeviceEvent,
    /// Set for brightness reports.
    pub brightness_percent: Option<u8>,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub warnings: Vec<String>,
    pub issues: Vec<String>,
    pub settings: Config,
}

// ── Arguments ──

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    fn is_on(self) -> bool {
        self == Switch::On
    }
}

/// A single outbound command, as typed on the command line.
#[derive(Subcommand, Clone, Debug)]
pub enum Frame {
    /// Turn the strip on or off
    Power { state: Switch },
    /// Brightness in percent (0-100)
    Brightness { percent: u8 },
    /// Color as #RRGGBB, RRGGBB or a name (red, blue, ...)
    Color { color: String },
    /// Built-in effect by name
    Effect {
        name: String,
        /// Effect speed (0-100)
        #[arg(default_value_t = 50)]
        speed: u8,
    },
    /// Sound-reactive mode
    Music { state: Switch },
    /// Controller-side timer, fired daily at HH:MM
    Schedule {
        /// Time of day, HH:MM
        time: String,
        state: Switch,
    },
}

impl Frame {
    pub(super) fn to_command(&self) -> Result<command::Command> {
        use command::Command;
        match self {
            Frame::Power { state } => Ok(Command::Power(state.is_on())),
            Frame::Brightness { percent } => Command::brightness(*percent),
            Frame::Color { color } => Command::color_str(color),
            Frame::Effect { name, speed } => Command::effect(name, *speed),
            Frame::Music { state } => Ok(Command::MusicMode(state.is_on())),
            Frame::Schedule { time, state } => {
                let (hour, minute) = parse_time(time)?;
                let action = if state.is_on() {
                    ScheduleAction::PowerOn
                } else {
                    ScheduleAction::PowerOff
                };
                ScheduleSpec::daily(hour, minute, action).map(Command::Schedule)
            }
        }
    }
}

fn parse_time(s: &str) -> Result<(u8, u8)> {
    let invalid = || LedError::Validation(format!("invalid time {s:?} (expected HH:MM)"));
    let (h, m) = s.split_once(':').ok_or_else(invalid)?;
    let hour = h.parse().map_err(|_| invalid())?;
    let minute = m.parse().map_err(|_| invalid())?;
    Ok((hour, minute))
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the wire frame for a command
    Encode {
        #[command(subcommand)]
        frame: Frame,
    },

    /// Decode an inbound frame, e.g. "BRIGHTNESS:191" or "OK"
    Decode { frame: String },

    /// Drive a simulated controller: scan, connect, control a room, disconnect
    Demo {
        /// How long the scan listens, in milliseconds
        #[arg(long, default_value_t = 200)]
        scan_ms: u64,
        /// Access role to run as (default: from config)
        #[arg(long)]
        role: Option<String>,
    },

    /// Show current configuration and file path
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
        /// Use this config file instead of the platform default
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// List serial ports
    #[cfg(feature = "serial")]
    Ports,

    /// Send one command to a controller on a serial port
    #[cfg(feature = "serial")]
    Send {
        /// Port path, e.g. /dev/ttyUSB0 or COM3
        #[arg(long)]
        port: String,
        /// Baud rate (default: from config)
        #[arg(long)]
        baud: Option<u32>,
        #[command(subcommand)]
        frame: Frame,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool) -> Result<()> {
    match cmd {
        Command::Encode { frame } => frames::cmd_encode(&frame, json),
        Command::Decode { frame } => frames::cmd_decode(&frame, json),
        Command::Demo { scan_ms, role } => {
            if json {
                warn_json_unsupported("demo");
            }
            demo::cmd_demo(scan_ms, role)
        }
        Command::Config { init, path } => config_cmd::cmd_config(json, init, path),
        #[cfg(feature = "serial")]
        Command::Ports => serial::cmd_ports(json),
        #[cfg(feature = "serial")]
        Command::Send { port, baud, frame } => {
            if json {
                warn_json_unsupported("send");
            }
            serial::cmd_send(&port, baud, &frame)
        }
    }
}

/// Current-thread runtime for the async library calls.
pub(super) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(LedError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_width_indent_drives_width() {
        let w = kv_width(&["A:"], &["scan_timeout_ms:"]);
        // 16 + PADDING + 2
        assert_eq!(w, 20);
    }

    #[test]
    fn kv_width_empty_both() {
        assert_eq!(kv_width(&[], &[]), 0);
    }

    #[test]
    fn frames_map_to_commands() {
        let cmd = Frame::Brightness { percent: 75 }.to_command().unwrap();
        assert_eq!(codec::encode(&cmd), "BRIGHTNESS:191\n");
        let cmd = Frame::Music { state: Switch::On }.to_command().unwrap();
        assert_eq!(codec::encode(&cmd), "MUSIC:1\n");
        let cmd = Frame::Schedule {
            time: "07:30".into(),
            state: Switch::Off,
        }
        .to_command()
        .unwrap();
        assert_eq!(codec::encode(&cmd), "SCHEDULE:07:30:0:127\n");
    }

    #[test]
    fn bad_time_is_validation_error() {
        for t in ["7", "ab:cd", "25:00", "12:60"] {
            let frame = Frame::Schedule {
                time: t.into(),
                state: Switch::On,
            };
            assert!(
                matches!(frame.to_command(), Err(LedError::Validation(_))),
                "{t}"
            );
        }
    }

    #[test]
    fn show_frame_strips_terminator() {
        assert_eq!(show_frame("POWER:1\n"), "POWER:1");
        assert_eq!(show_frame("OK\r\n"), "OK");
    }
}
