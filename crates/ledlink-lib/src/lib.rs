//! ledlink: connection, wire protocol and control dispatch for serial LED controllers.

pub mod codec;
pub mod color;
pub mod command;
pub mod config;
pub mod connection;
pub mod context;
pub mod control;
pub mod device;
pub mod error;
pub mod mediator;
pub mod protocol;
pub mod proxy;
pub mod retry;
#[cfg(feature = "serial")]
pub mod serial;
pub mod surface;
pub mod transport;
pub mod tree;

pub use error::{LedError, Result};
