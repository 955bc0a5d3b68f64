//! Connection state machine: permissions, scan, connect with retry, send.
//!
//! The [`ConnectionManager`] is the only owner of the transport and of the
//! single [`ConnectionSession`]. Everything it observes is broadcast as a
//! [`ConnectionEvent`]; it never reconnects on its own.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify, broadcast, mpsc};

use crate::codec::{self, DeviceEvent, FrameDecoder};
use crate::command::Command;
use crate::device::{Device, DeviceList};
use crate::error::{LedError, Result};
use crate::retry::{RetryPolicy, RetryState};
use crate::transport::{PermissionProvider, Transport, TransportEvent};

/// Capacity of the connection event broadcast. Slow subscribers lag, they
/// never block the manager.
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    PermissionPending,
    Scanning,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::PermissionPending => "permission pending",
            ConnectionState::Scanning => "scanning",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// The one active link.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSession {
    pub device: Device,
    pub state: ConnectionState,
    /// When `connect` was called.
    pub started_at: DateTime<Utc>,
    /// When the link came up, if it did.
    pub connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Broadcast to subscribers of [`ConnectionManager::subscribe`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    DeviceFound(Device),
    ScanComplete(Vec<Device>),
    Connected {
        device: Device,
        at: DateTime<Utc>,
    },
    /// `remote` is true when the link dropped rather than being closed by us.
    Disconnected {
        device_id: String,
        remote: bool,
    },
    /// A decoded inbound frame.
    Frame(DeviceEvent),
    /// A failure that did not change the state, such as an undecodable frame.
    Error(String),
}

pub struct ConnectionManager {
    transport: Rc<dyn Transport>,
    permissions: Rc<dyn PermissionProvider>,
    policy: RetryPolicy,
    state: Cell<ConnectionState>,
    session: RefCell<Option<ConnectionSession>>,
    devices: RefCell<DeviceList>,
    decoder: RefCell<FrameDecoder>,
    inbound: Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    scan_stop: Notify,
    events: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionManager {
    /// Take ownership of the transport and install the manager's event sink on it.
    pub fn new(
        transport: Rc<dyn Transport>,
        permissions: Rc<dyn PermissionProvider>,
        policy: RetryPolicy,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        transport.set_event_sink(tx);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            permissions,
            policy,
            state: Cell::new(ConnectionState::Disconnected),
            session: RefCell::new(None),
            devices: RefCell::new(DeviceList::default()),
            decoder: RefCell::new(FrameDecoder::new()),
            inbound: Mutex::new(rx),
            scan_stop: Notify::new(),
            events,
        }
    }

    // ── Accessors ──

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn session(&self) -> Option<ConnectionSession> {
        self.session.borrow().clone()
    }

    pub fn connected_device(&self) -> Option<Device> {
        if !self.is_connected() {
            return None;
        }
        self.session.borrow().as_ref().map(|s| s.device.clone())
    }

    /// Devices found by the current (or most recent) scan.
    pub fn devices(&self) -> Vec<Device> {
        self.devices.borrow().to_vec()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    // ── Permissions ──

    /// Ask the platform for access. Denial returns `false`; the caller decides
    /// whether to go on.
    pub async fn request_permissions(&self) -> bool {
        let previous = self.state();
        self.set_state(ConnectionState::PermissionPending);
        let granted = self.permissions.request_permissions().await;
        if self.state() == ConnectionState::PermissionPending {
            self.set_state(previous);
        }
        if !granted {
            log::warn!("platform permissions denied");
        }
        granted
    }

    /// Like [`request_permissions`](Self::request_permissions) but denial is an error.
    pub async fn ensure_permissions(&self) -> Result<()> {
        if self.request_permissions().await {
            Ok(())
        } else {
            Err(LedError::Permission(
                "Bluetooth/serial access was not granted".into(),
            ))
        }
    }

    // ── Scan ──

    /// Discover devices for `timeout`, then return to `Disconnected`.
    ///
    /// The device list is reset at the start. Reaching the timeout is the
    /// normal way a scan ends; [`stop_scan`](Self::stop_scan) ends it early.
    pub async fn scan(&self, timeout: Duration) -> Result<Vec<Device>> {
        match self.state() {
            ConnectionState::Disconnected | ConnectionState::Error => {}
            other => {
                return Err(LedError::Command(format!("cannot scan while {other}")));
            }
        }
        self.devices.borrow_mut().clear();
        self.set_state(ConnectionState::Scanning);

        if let Err(e) = self.transport.start_scan().await {
            log::warn!("scan failed to start: {e}");
            self.set_state(ConnectionState::Disconnected);
            self.emit(ConnectionEvent::Error(e.to_string()));
            return Err(e.into());
        }
        log::debug!("scanning for {:.1}s", timeout.as_secs_f64());

        let deadline = tokio::time::Instant::now() + timeout;
        {
            let mut rx = self.inbound.lock().await;
            loop {
                tokio::select! {
                    _ = self.scan_stop.notified() => {
                        log::debug!("scan stopped early");
                        break;
                    }
                    next = tokio::time::timeout_at(deadline, rx.recv()) => match next {
                        Ok(Some(event)) => self.handle_event(event),
                        Ok(None) | Err(_) => break,
                    }
                }
            }
        }

        if let Err(e) = self.transport.stop_scan().await {
            log::warn!("could not stop transport scan: {e}");
        }
        // A connect issued mid-scan owns the state now.
        if self.state() == ConnectionState::Scanning {
            self.set_state(ConnectionState::Disconnected);
        }
        let found = self.devices();
        log::info!(
            "scan complete: {} device{}",
            found.len(),
            if found.len() == 1 { "" } else { "s" }
        );
        self.emit(ConnectionEvent::ScanComplete(found.clone()));
        Ok(found)
    }

    /// End an in-progress scan. No-op otherwise.
    pub fn stop_scan(&self) {
        if self.state() == ConnectionState::Scanning {
            self.scan_stop.notify_one();
        }
    }

    // ── Connect / disconnect ──

    /// Connect to `device_id`, retrying per the [`RetryPolicy`].
    ///
    /// Any existing session is closed first. Attempts run strictly one
    /// after another; after the last failure the state is `Disconnected` and
    /// [`LedError::DeviceConnection`] carries the final transport error.
    ///
    /// Callers must not overlap `connect` calls on one manager.
    pub async fn connect(&self, device_id: &str) -> Result<Device> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(LedError::Validation("device id cannot be empty".into()));
        }
        let device = self
            .devices
            .borrow()
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| Device::unscanned(device_id));
        if !device.is_connectable {
            return Err(LedError::Validation(format!(
                "{} ({}) is not connectable",
                device.display_name, device.id
            )));
        }

        if self.session.borrow().is_some() {
            if let Err(e) = self.disconnect().await {
                log::warn!("closing previous session failed: {e}");
            }
        }
        self.stop_scan();

        *self.session.borrow_mut() = Some(ConnectionSession {
            device: device.clone(),
            state: ConnectionState::Connecting,
            started_at: Utc::now(),
            connected_at: None,
            last_error: None,
        });
        self.set_state(ConnectionState::Connecting);

        let mut retry = RetryState::new(self.policy.clone());
        loop {
            let attempt = retry.begin_attempt();
            log::debug!(
                "connecting to {device_id} (attempt {attempt}/{})",
                self.policy.max_attempts
            );
            match self.transport.connect(device_id).await {
                Ok(()) => break,
                Err(e) if retry.can_retry() => {
                    let delay = retry.record_failure();
                    log::warn!(
                        "connect to {device_id} failed: {e} (attempt {attempt}, retry in {:.1}s)",
                        delay.as_secs_f64()
                    );
                    if let Some(s) = self.session.borrow_mut().as_mut() {
                        s.last_error = Some(e.to_string());
                    }
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    log::warn!("connect to {device_id} failed: {e} (giving up after {attempt})");
                    self.session.borrow_mut().take();
                    self.set_state(ConnectionState::Disconnected);
                    self.emit(ConnectionEvent::Error(e.to_string()));
                    return Err(LedError::DeviceConnection {
                        device_id: device_id.to_string(),
                        attempts: retry.attempts(),
                        last_error: e,
                    });
                }
            }
        }

        let at = Utc::now();
        if let Some(s) = self.session.borrow_mut().as_mut() {
            s.connected_at = Some(at);
            s.last_error = None;
        }
        self.set_state(ConnectionState::Connected);
        log::info!("connected to {} ({})", device.display_name, device.id);
        self.emit(ConnectionEvent::Connected {
            device: device.clone(),
            at,
        });
        Ok(device)
    }

    /// Close the session. Idempotent; never retried.
    ///
    /// The state is `Disconnected` afterwards even when the transport reports
    /// an error, which is then returned.
    pub async fn disconnect(&self) -> Result<()> {
        let session = self.session.borrow_mut().take();
        let Some(session) = session else {
            if self.state() != ConnectionState::Disconnected {
                self.set_state(ConnectionState::Disconnected);
            }
            return Ok(());
        };
        let result = self.transport.disconnect().await;
        self.set_state(ConnectionState::Disconnected);
        log::info!("disconnected from {}", session.device.id);
        self.emit(ConnectionEvent::Disconnected {
            device_id: session.device.id,
            remote: false,
        });
        result.map_err(Into::into)
    }

    // ── Send ──

    /// Write one wire frame. Only valid while `Connected`; transport errors
    /// are returned as-is, never retried.
    pub async fn send(&self, frame: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(LedError::Command("No device connected".into()));
        }
        log::debug!("tx {}", frame.trim_end());
        if let Err(e) = self.transport.write(frame.as_bytes()).await {
            if let Some(s) = self.session.borrow_mut().as_mut() {
                s.last_error = Some(e.to_string());
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Encode and send a command.
    pub async fn send_command(&self, command: &Command) -> Result<()> {
        self.send(&codec::encode(command)).await
    }

    // ── Inbound events ──

    /// Handle every transport event already queued. Returns how many ran.
    ///
    /// Returns 0 without waiting while a scan holds the event queue.
    pub fn poll_events(&self) -> usize {
        let Ok(mut rx) = self.inbound.try_lock() else {
            return 0;
        };
        let mut handled = 0;
        while let Ok(event) = rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait for the next transport event and handle it.
    /// Returns `false` once the transport has dropped its sink.
    pub async fn next_event(&self) -> bool {
        let mut rx = self.inbound.lock().await;
        match rx.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::DeviceFound(device) => {
                let is_new = self.devices.borrow_mut().upsert(device.clone());
                if is_new {
                    log::debug!("found {} ({})", device.display_name, device.id);
                    self.emit(ConnectionEvent::DeviceFound(device));
                }
            }
            TransportEvent::Connected { device_id } => {
                log::debug!("transport link up: {device_id}");
            }
            TransportEvent::Disconnected { device_id } => {
                let matches = self
                    .session
                    .borrow()
                    .as_ref()
                    .is_some_and(|s| s.device.id == device_id);
                if !matches {
                    log::debug!("ignoring disconnect for stale link {device_id}");
                    return;
                }
                self.session.borrow_mut().take();
                self.set_state(ConnectionState::Disconnected);
                log::info!("link to {device_id} dropped");
                self.emit(ConnectionEvent::Disconnected {
                    device_id,
                    remote: true,
                });
            }
            TransportEvent::DataReceived(bytes) => {
                let frames = self.decoder.borrow_mut().push(&bytes);
                for frame in frames {
                    match frame {
                        Ok(ev) => {
                            log::debug!("rx {ev:?}");
                            self.emit(ConnectionEvent::Frame(ev));
                        }
                        Err(e) => {
                            log::warn!("dropping inbound frame: {e}");
                            self.emit(ConnectionEvent::Error(e.to_string()));
                        }
                    }
                }
            }
            TransportEvent::Error(e) => {
                let message = e.to_string();
                log::warn!("transport error: {message}");
                if let Some(s) = self.session.borrow_mut().as_mut() {
                    s.last_error = Some(message.clone());
                }
                if self.is_connected() {
                    self.set_state(ConnectionState::Error);
                }
                self.emit(ConnectionEvent::Error(message));
            }
        }
    }

    fn set_state(&self, to: ConnectionState) {
        let from = self.state.replace(to);
        if from == to {
            return;
        }
        log::debug!("state: {from} -> {to}");
        if let Some(s) = self.session.borrow_mut().as_mut() {
            s.state = to;
        }
        self.emit(ConnectionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
