//! `ports` / `send` subcommands: a real controller on a serial port.

use std::rc::Rc;
use std::time::Duration;

use ledlink_lib::connection::{ConnectionEvent, ConnectionManager};
use ledlink_lib::serial::{self, SerialTransport};
use ledlink_lib::transport::GrantAll;

use super::{Config, Frame, Result, codec, print_json, runtime, show_frame};

/// How long to wait for the controller's reply after a write.
const REPLY_WAIT: Duration = Duration::from_millis(500);

pub(super) fn cmd_ports(json: bool) -> Result<()> {
    let ports = serial::list_ports()?;
    if json {
        return print_json(&ports);
    }
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    for (i, port) in ports.iter().enumerate() {
        println!("  [{}] {}  {}", i + 1, port.id, port.display_name);
    }
    Ok(())
}

pub(super) fn cmd_send(port: &str, baud: Option<u32>, frame: &Frame) -> Result<()> {
    let command = frame.to_command()?;
    let config = Config::load();
    let baud = baud.unwrap_or(config.connection.baud_rate);

    runtime()?.block_on(async {
        let manager = ConnectionManager::new(
            Rc::new(SerialTransport::new(baud)),
            Rc::new(GrantAll),
            config.retry_policy(),
        );
        let mut events = manager.subscribe();
        manager.connect(port).await?;
        let encoded = codec::encode(&command);
        println!("-> {}", show_frame(&encoded));
        manager.send(&encoded).await?;

        let reply = tokio::time::timeout(REPLY_WAIT, async {
            while manager.next_event().await {
                while let Ok(event) = events.try_recv() {
                    if let ConnectionEvent::Frame(frame) = event {
                        return Some(frame);
                    }
                }
            }
            None
        })
        .await;
        match reply {
            Ok(Some(event)) => println!("<- {event:?}"),
            _ => log::warn!("no reply within {} ms", REPLY_WAIT.as_millis()),
        }
        manager.disconnect().await
    })
}
