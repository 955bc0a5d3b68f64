//! `demo` subcommand: the full control path against a simulated controller.
//!
//! Scans, connects, builds a room of three lights sharing the connection,
//! sets color and brightness, applies a scene, disconnects, then prints the
//! frames that went over the wire and the operation log.

use std::rc::Rc;
use std::time::Duration;

use ledlink_lib::color::Rgb;
use ledlink_lib::command::{Effect, Percent};
use ledlink_lib::context::LedContext;
use ledlink_lib::control::Applied;
use ledlink_lib::device::Device;
use ledlink_lib::mediator::{Colleague, Component, UiCollaborator};
use ledlink_lib::proxy::{OperationRecord, Outcome};
use ledlink_lib::tree::{LedComponent, Scene};

use super::{Config, Result, runtime, show_frame};

const ROOM: &str = "living-room";
const LIGHTS: [&str; 3] = ["ceiling", "sofa", "shelf"];

/// The simulated controller.
fn demo_device() -> Device {
    Device::new("mock-device-1", "SmartLED Pro", "00:11:22:33:44:55")
        .with_capabilities(["rgb", "brightness", "effects", "music"])
}

/// Prints what a UI would show.
struct ConsoleUi;

impl Colleague for ConsoleUi {}

impl UiCollaborator for ConsoleUi {
    fn update_color_display(&self, target: &str, color: Rgb) {
        println!("  ui: {target} color {color}");
    }
    fn update_brightness_display(&self, target: &str, level: u8) {
        println!("  ui: {target} brightness {level}%");
    }
    fn update_power_status(&self, target: &str, power: Option<bool>) {
        let state = match power {
            Some(true) => "on",
            Some(false) => "off",
            None => "mixed",
        };
        println!("  ui: {target} power {state}");
    }
    fn update_effect_display(&self, target: &str, effect: &Effect) {
        println!("  ui: {target} effect {}", effect.name());
    }
    fn show_connection_status(&self, connected: bool) {
        println!(
            "  ui: {}",
            if connected { "connected" } else { "disconnected" }
        );
    }
    fn show_error(&self, message: &str) {
        println!("  ui: error: {message}");
    }
}

fn build_room(ctx: &LedContext) -> Result<LedComponent> {
    let mut room = LedComponent::room(ROOM)?;
    for name in LIGHTS {
        room.add(ctx.leaf(name)?)?;
    }
    room.add_scene(
        "movie",
        Scene {
            color: Some(Rgb::new(64, 0, 128)),
            brightness: Some(Percent::new(20)?),
            effect: None,
        },
    )?;
    room.add_scene(
        "party",
        Scene {
            color: None,
            brightness: Some(Percent::MAX),
            effect: Some(Effect::new("rainbow", 80)?),
        },
    )?;
    Ok(room)
}

/// Print the outcome of one step. Failures don't stop the run.
fn step(label: &str, result: Result<Applied>) {
    match result {
        Ok(applied) => println!(
            "> {label}: ok ({} light{})",
            applied.leaves,
            if applied.leaves == 1 { "" } else { "s" }
        ),
        Err(e) => println!("> {label}: failed: {e}"),
    }
}

fn format_record(r: &OperationRecord) -> String {
    let outcome = match &r.outcome {
        Outcome::Success { leaves } => format!("ok ({leaves})"),
        Outcome::Failure { error } => format!("failed: {error}"),
    };
    format!(
        "{}  {}  {}({})  {outcome}",
        r.timestamp.format("%H:%M:%S%.3f"),
        r.target,
        r.operation,
        r.args
    )
}

pub(super) fn cmd_demo(scan_ms: u64, role: Option<String>) -> Result<()> {
    let (mut config, warnings) = Config::load_with_warnings();
    for w in &warnings {
        log::warn!("{w}");
    }
    if let Some(role) = role {
        config.access.role = role;
    }
    runtime()?.block_on(run(config, Duration::from_millis(scan_ms)))
}

async fn run(config: Config, scan_timeout: Duration) -> Result<()> {
    let (ctx, transport) = LedContext::with_mock_transport(config, vec![demo_device()])?;
    transport.auto_ack.set(true);
    ctx.mediator()
        .register_component("console", Component::Ui(Rc::new(ConsoleUi)));
    let conn = ctx.connection();

    conn.ensure_permissions().await?;
    println!("Scanning for {} ms...", scan_timeout.as_millis());
    let found = conn.scan(scan_timeout).await?;
    println!(
        "Found {} device{}:",
        found.len(),
        if found.len() == 1 { "" } else { "s" }
    );
    for (i, dev) in found.iter().enumerate() {
        println!("  [{}] {} ({})", i + 1, dev.display_name, dev.id);
    }
    let Some(target) = found.first() else {
        return Ok(());
    };

    let device = conn.connect(&target.id).await?;
    println!("Connected to {}", device.display_name);
    ctx.relay_connection_events();

    let room = build_room(&ctx)?;
    println!(
        "Room {ROOM}: {} lights ({}), role {}",
        room.get_count(),
        LIGHTS.join(", "),
        ctx.access().role()
    );
    let mut surface = ctx.control(room);

    step("set_color #FF0000", surface.set_color("#FF0000").await);
    step("set_brightness 75", surface.set_brightness(75).await);
    step("set_color #FF0000 (cached)", surface.set_color("#FF0000").await);
    step("scene movie", surface.apply_scene("movie").await);
    step("toggle_power", surface.toggle_power().await);

    conn.disconnect().await?;
    ctx.relay_connection_events();
    println!("Disconnected");
    println!();

    let frames = transport.frames();
    println!("Frames sent ({}):", frames.len());
    for frame in &frames {
        println!("  {}", show_frame(frame));
    }
    println!();

    let records = ctx.operation_log().records();
    println!("Operation log ({}):", records.len());
    for record in &records {
        println!("  {}", format_record(record));
    }
    Ok(())
}
