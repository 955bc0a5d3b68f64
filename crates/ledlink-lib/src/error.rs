//! Unified error type for the ledlink-lib crate.
//!
//! [`LedError`] wraps module-specific errors (`TransportError`, `DecodeError`)
//! and the domain error kinds raised by the control core (`Validation`,
//! `Command`, `AccessDenied`, ...). `From` impls allow `?` to propagate
//! across module boundaries.

use std::fmt;

use crate::codec::DecodeError;
use crate::control::Operation;
use crate::transport::TransportError;

/// Unified error type for ledlink-lib operations.
#[derive(Debug)]
pub enum LedError {
    /// Malformed color, brightness, device name or command input.
    /// Raised before any state change or I/O.
    Validation(String),
    /// Platform permission (Bluetooth / serial access) denied.
    Permission(String),
    /// Transport-level failure (adapter disabled, port vanished, write failed).
    Transport(TransportError),
    /// Every connect attempt failed.
    DeviceConnection {
        device_id: String,
        attempts: u32,
        last_error: TransportError,
    },
    /// Operation attempted while no device is connected.
    Command(String),
    /// The current role may not perform the operation.
    AccessDenied { role: String, operation: Operation },
    /// `apply_scene` with a name the room does not define.
    SceneNotFound(String),
    /// Unparsable inbound frame.
    Decode(DecodeError),
    /// Configuration validation error.
    Config(String),
    /// Standard I/O error (config persistence).
    Io(std::io::Error),
}

impl fmt::Display for LedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedError::Validation(e) => write!(f, "Validation error: {e}"),
            LedError::Permission(e) => write!(f, "Permission denied: {e}"),
            LedError::Transport(e) => write!(f, "{e}"),
            LedError::DeviceConnection {
                device_id,
                attempts,
                last_error,
            } => write!(
                f,
                "Could not connect to {device_id} after {attempts} attempt{}: {last_error}",
                if *attempts == 1 { "" } else { "s" }
            ),
            LedError::Command(e) => write!(f, "Command error: {e}"),
            LedError::AccessDenied { role, operation } => {
                write!(f, "Access denied: role '{role}' may not {operation}")
            }
            LedError::SceneNotFound(name) => write!(f, "Scene not found: {name}"),
            LedError::Decode(e) => write!(f, "{e}"),
            LedError::Config(e) => write!(f, "Config error: {e}"),
            LedError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for LedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedError::Transport(e) => Some(e),
            LedError::DeviceConnection { last_error, .. } => Some(last_error),
            LedError::Decode(e) => Some(e),
            LedError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for LedError {
    fn from(e: TransportError) -> Self {
        LedError::Transport(e)
    }
}

impl From<DecodeError> for LedError {
    fn from(e: DecodeError) -> Self {
        LedError::Decode(e)
    }
}

impl From<std::io::Error> for LedError {
    fn from(e: std::io::Error) -> Self {
        LedError::Io(e)
    }
}

/// Crate-level Result alias using [`LedError`].
pub type Result<T> = std::result::Result<T, LedError>;
