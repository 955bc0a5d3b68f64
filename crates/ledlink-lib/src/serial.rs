//! Serial-port transport (USB-serial adapters and SPP Bluetooth bridges).
//!
//! A scan lists the system's serial ports. While connected, a reader thread
//! forwards inbound bytes to the event sink as `DataReceived`; a read error
//! ends the link with `Error` followed by `Disconnected`.

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use serialport::{SerialPort, SerialPortType};

use crate::device::Device;
use crate::transport::{EventSink, Result, Transport, TransportError, TransportEvent};

/// How long a blocking read waits before re-checking the stop flag.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

const READ_BUF_LEN: usize = 256;

struct Link {
    device_id: String,
    port: Box<dyn SerialPort>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl Link {
    fn close(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                log::warn!("serial reader for {} panicked", self.device_id);
            }
        }
    }
}

pub struct SerialTransport {
    baud_rate: u32,
    link: RefCell<Option<Link>>,
    sink: RefCell<Option<EventSink>>,
}

impl SerialTransport {
    pub fn new(baud_rate: u32) -> Self {
        SerialTransport {
            baud_rate,
            link: RefCell::new(None),
            sink: RefCell::new(None),
        }
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(sink) = self.sink.borrow().as_ref() {
            let _ = sink.send(event);
        }
    }
}

/// Ports on this machine as devices, ids being port paths.
pub fn list_ports() -> Result<Vec<Device>> {
    let ports = serialport::available_ports()
        .map_err(|e| TransportError::Unavailable(format!("list serial ports: {e}")))?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let (name, caps): (String, &[&str]) = match &p.port_type {
                SerialPortType::UsbPort(usb) => (
                    usb.product
                        .clone()
                        .unwrap_or_else(|| format!("USB serial {:04x}:{:04x}", usb.vid, usb.pid)),
                    &["serial", "usb"],
                ),
                SerialPortType::BluetoothPort => ("Bluetooth serial".to_string(), &["serial", "bluetooth"]),
                _ => (p.port_name.clone(), &["serial"]),
            };
            Device::new(&p.port_name, &name, &p.port_name).with_capabilities(caps.iter().copied())
        })
        .collect())
}

fn spawn_reader(
    device_id: String,
    mut port: Box<dyn SerialPort>,
    sink: Option<EventSink>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut buf = [0u8; READ_BUF_LEN];
        let send = |event: TransportEvent| match &sink {
            Some(s) => s.send(event).is_ok(),
            None => true,
        };
        while !stop.load(Ordering::SeqCst) {
            match port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    if !send(TransportEvent::DataReceived(buf[..n].to_vec())) {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => {
                    log::warn!("serial read on {device_id} failed: {e}");
                    send(TransportEvent::Error(TransportError::Io(e)));
                    send(TransportEvent::Disconnected {
                        device_id: device_id.clone(),
                    });
                    break;
                }
            }
        }
        log::debug!("serial reader for {device_id} stopped");
    })
}

#[async_trait(?Send)]
impl Transport for SerialTransport {
    fn set_event_sink(&self, sink: EventSink) {
        *self.sink.borrow_mut() = Some(sink);
    }

    async fn start_scan(&self) -> Result<()> {
        for device in list_ports()? {
            self.emit(TransportEvent::DeviceFound(device));
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        Ok(())
    }

    async fn connect(&self, device_id: &str) -> Result<()> {
        if let Some(old) = self.link.borrow_mut().take() {
            old.close();
        }
        let port = serialport::new(device_id, self.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| TransportError::ConnectFailed(format!("open {device_id}: {e}")))?;
        let reader_port = port
            .try_clone()
            .map_err(|e| TransportError::ConnectFailed(format!("clone {device_id}: {e}")))?;
        let stop = Arc::new(AtomicBool::new(false));
        let reader = spawn_reader(
            device_id.to_string(),
            reader_port,
            self.sink.borrow().clone(),
            stop.clone(),
        );
        *self.link.borrow_mut() = Some(Link {
            device_id: device_id.to_string(),
            port,
            stop,
            reader: Some(reader),
        });
        log::debug!("opened {device_id} at {} baud", self.baud_rate);
        self.emit(TransportEvent::Connected {
            device_id: device_id.to_string(),
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let link = self.link.borrow_mut().take();
        if let Some(link) = link {
            link.close();
        }
        Ok(())
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut link = self.link.borrow_mut();
        let Some(link) = link.as_mut() else {
            return Err(TransportError::NotOpen);
        };
        link.port
            .write_all(bytes)
            .and_then(|()| link.port.flush())
            .map_err(|e| TransportError::WriteFailed(format!("write {}: {e}", link.device_id)))
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_without_link_is_not_open() {
        let t = SerialTransport::new(115_200);
        assert!(matches!(t.write(b"POWER:1\n").await, Err(TransportError::NotOpen)));
        t.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn connect_to_missing_port_fails() {
        let t = SerialTransport::new(115_200);
        let err = t.connect("/dev/ledlink-does-not-exist").await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed(ref m) if m.starts_with("open ")));
    }
}
