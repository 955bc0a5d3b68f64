//! Transport and permission seams: trait + mock backend.
//!
//! Only the `ConnectionManager` talks to a [`Transport`]. Transports push
//! asynchronous happenings (discoveries, inbound bytes, drops) through the
//! [`EventSink`] handed to them by the manager.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::device::Device;

// ── Error type ──

/// Transport-level errors.
///
/// String payloads follow the convention **"context: details"** where
/// *context* names the step (e.g. `"open /dev/ttyUSB0"`) and *details* what
/// went wrong.
#[derive(Debug)]
pub enum TransportError {
    /// Adapter disabled, radio off, port enumeration failed.
    Unavailable(String),
    ConnectFailed(String),
    WriteFailed(String),
    /// Write or disconnect without an open link.
    NotOpen,
    Io(std::io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Unavailable(e) => write!(f, "Transport unavailable: {e}"),
            TransportError::ConnectFailed(e) => write!(f, "Connect failed: {e}"),
            TransportError::WriteFailed(e) => write!(f, "Write failed: {e}"),
            TransportError::NotOpen => write!(f, "Transport not open"),
            TransportError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

// ── Events ──

/// Something the transport observed outside a direct call.
#[derive(Debug)]
pub enum TransportEvent {
    DeviceFound(Device),
    Connected { device_id: String },
    /// Link dropped (remote side, cable pulled, radio lost).
    Disconnected { device_id: String },
    DataReceived(Vec<u8>),
    Error(TransportError),
}

/// Channel end a transport pushes its events into.
pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

// ── Traits ──

/// Byte-stream link to an LED controller.
#[async_trait(?Send)]
pub trait Transport {
    /// Install the sink for discovery, data and link events.
    fn set_event_sink(&self, sink: EventSink);
    /// Begin discovery; results arrive as [`TransportEvent::DeviceFound`].
    async fn start_scan(&self) -> Result<()>;
    async fn stop_scan(&self) -> Result<()>;
    /// Open a link to `device_id`. Resolves once the link is usable.
    async fn connect(&self, device_id: &str) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    /// Write raw bytes to the open link.
    async fn write(&self, bytes: &[u8]) -> Result<()>;
}

/// Platform permission gate (Bluetooth, location, serial device access).
#[async_trait(?Send)]
pub trait PermissionProvider {
    /// Ask for access. `false` means denied; never an error.
    async fn request_permissions(&self) -> bool;
}

/// Permission provider for platforms without a runtime permission model.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrantAll;

#[async_trait(?Send)]
impl PermissionProvider for GrantAll {
    async fn request_permissions(&self) -> bool {
        true
    }
}

// ── Mock implementation ──

pub mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// In-memory transport for tests and demos.
    ///
    /// Announces `devices` when a scan starts, answers `connect` from a
    /// scripted queue (empty queue = success), and records every write.
    #[derive(Default)]
    pub struct MockTransport {
        /// Devices announced on `start_scan`.
        pub devices: RefCell<Vec<Device>>,
        /// Scripted connect outcomes, consumed front to back.
        pub connect_results: RefCell<VecDeque<Result<()>>>,
        /// If true, every connect fails regardless of the script.
        pub fail_all_connects: Cell<bool>,
        /// If true, `start_scan` and `connect` report the adapter as disabled.
        pub unavailable: Cell<bool>,
        /// If true, `write` fails.
        pub fail_writes: Cell<bool>,
        /// If true, every successful write is answered with an `OK` frame.
        pub auto_ack: Cell<bool>,
        /// Recorded writes, one entry per call.
        pub writes: RefCell<Vec<Vec<u8>>>,
        pub connect_calls: Cell<u32>,
        pub disconnect_calls: Cell<u32>,
        pub scans_started: Cell<u32>,
        pub scans_stopped: Cell<u32>,
        pub connected_to: RefCell<Option<String>>,
        sink: RefCell<Option<EventSink>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Mock that will announce the given devices when scanned.
        pub fn with_devices(devices: Vec<Device>) -> Self {
            let t = Self::new();
            *t.devices.borrow_mut() = devices;
            t
        }

        /// Make the next `n` connect calls fail.
        pub fn fail_next_connects(&self, n: usize) {
            let mut script = self.connect_results.borrow_mut();
            for i in 0..n {
                script.push_back(Err(TransportError::ConnectFailed(format!(
                    "mock: scripted failure {}",
                    i + 1
                ))));
            }
        }

        /// Push an event as if the link produced it.
        pub fn emit(&self, event: TransportEvent) {
            if let Some(sink) = self.sink.borrow().as_ref() {
                let _ = sink.send(event);
            }
        }

        /// Simulate inbound bytes from the controller.
        pub fn receive(&self, bytes: &[u8]) {
            self.emit(TransportEvent::DataReceived(bytes.to_vec()));
        }

        /// Simulate the link dropping on the remote side.
        pub fn drop_link(&self) {
            if let Some(id) = self.connected_to.borrow_mut().take() {
                self.emit(TransportEvent::Disconnected { device_id: id });
            }
        }

        /// Recorded writes as strings (frames are ASCII).
        pub fn frames(&self) -> Vec<String> {
            self.writes
                .borrow()
                .iter()
                .map(|w| String::from_utf8_lossy(w).into_owned())
                .collect()
        }

        pub fn write_count(&self) -> usize {
            self.writes.borrow().len()
        }
    }

    #[async_trait(?Send)]
    impl Transport for MockTransport {
        fn set_event_sink(&self, sink: EventSink) {
            *self.sink.borrow_mut() = Some(sink);
        }

        async fn start_scan(&self) -> Result<()> {
            if self.unavailable.get() {
                return Err(TransportError::Unavailable("mock: adapter disabled".into()));
            }
            self.scans_started.set(self.scans_started.get() + 1);
            let devices = self.devices.borrow().clone();
            for device in devices {
                self.emit(TransportEvent::DeviceFound(device));
            }
            Ok(())
        }

        async fn stop_scan(&self) -> Result<()> {
            self.scans_stopped.set(self.scans_stopped.get() + 1);
            Ok(())
        }

        async fn connect(&self, device_id: &str) -> Result<()> {
            self.connect_calls.set(self.connect_calls.get() + 1);
            if self.unavailable.get() {
                return Err(TransportError::Unavailable("mock: adapter disabled".into()));
            }
            if self.fail_all_connects.get() {
                return Err(TransportError::ConnectFailed(format!(
                    "mock: {device_id} unreachable"
                )));
            }
            let scripted = self.connect_results.borrow_mut().pop_front();
            scripted.unwrap_or(Ok(()))?;
            *self.connected_to.borrow_mut() = Some(device_id.to_string());
            self.emit(TransportEvent::Connected {
                device_id: device_id.to_string(),
            });
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            self.disconnect_calls.set(self.disconnect_calls.get() + 1);
            self.connected_to.borrow_mut().take();
            Ok(())
        }

        async fn write(&self, bytes: &[u8]) -> Result<()> {
            if self.connected_to.borrow().is_none() {
                return Err(TransportError::NotOpen);
            }
            if self.fail_writes.get() {
                return Err(TransportError::WriteFailed("mock: write failure injected".into()));
            }
            self.writes.borrow_mut().push(bytes.to_vec());
            if self.auto_ack.get() {
                self.receive(b"OK\n");
            }
            Ok(())
        }
    }

    /// Permission provider with a switchable answer.
    pub struct MockPermissions {
        pub granted: Cell<bool>,
        pub requests: Cell<u32>,
    }

    impl MockPermissions {
        pub fn granting() -> Self {
            MockPermissions {
                granted: Cell::new(true),
                requests: Cell::new(0),
            }
        }

        pub fn denying() -> Self {
            MockPermissions {
                granted: Cell::new(false),
                requests: Cell::new(0),
            }
        }
    }

    #[async_trait(?Send)]
    impl PermissionProvider for MockPermissions {
        async fn request_permissions(&self) -> bool {
            self.requests.set(self.requests.get() + 1);
            self.granted.get()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    #[test]
    fn display_transport_errors() {
        assert_eq!(
            TransportError::Unavailable("adapter off".into()).to_string(),
            "Transport unavailable: adapter off"
        );
        assert_eq!(TransportError::NotOpen.to_string(), "Transport not open");
    }

    #[test]
    fn io_error_is_source() {
        let e: TransportError = std::io::Error::other("port gone").into();
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("port gone"));
    }

    #[tokio::test]
    async fn mock_scripted_connects() {
        let t = MockTransport::new();
        t.fail_next_connects(1);
        assert!(t.connect("dev").await.is_err());
        assert!(t.connect("dev").await.is_ok());
        assert_eq!(t.connect_calls.get(), 2);
        assert_eq!(t.connected_to.borrow().as_deref(), Some("dev"));
    }

    #[tokio::test]
    async fn mock_write_requires_connection() {
        let t = MockTransport::new();
        assert!(matches!(t.write(b"POWER:1\n").await, Err(TransportError::NotOpen)));
        t.connect("dev").await.unwrap();
        t.write(b"POWER:1\n").await.unwrap();
        assert_eq!(t.frames(), vec!["POWER:1\n".to_string()]);
    }

    #[tokio::test]
    async fn mock_scan_announces_devices_to_sink() {
        let t = MockTransport::with_devices(vec![Device::new("a", "A", "1")]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        t.set_event_sink(tx);
        t.start_scan().await.unwrap();
        match rx.try_recv().unwrap() {
            TransportEvent::DeviceFound(d) => assert_eq!(d.id, "a"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn grant_all_grants() {
        assert!(GrantAll.request_permissions().await);
    }
}
