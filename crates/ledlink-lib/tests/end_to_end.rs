//! Integration tests: scan → connect → control → disconnect over the mock
//! transport, through the public API only.

use std::rc::Rc;

use ledlink_lib::LedError;
use ledlink_lib::codec::DeviceEvent;
use ledlink_lib::color::Rgb;
use ledlink_lib::command::Percent;
use ledlink_lib::config::Config;
use ledlink_lib::connection::{ConnectionEvent, ConnectionState};
use ledlink_lib::context::LedContext;
use ledlink_lib::control::LedControl;
use ledlink_lib::device::Device;
use ledlink_lib::mediator::Component;
use ledlink_lib::mediator::mock::RecordingCollaborator;
use ledlink_lib::proxy::Outcome;
use ledlink_lib::tree::{LedComponent, Scene};
use ledlink_lib::transport::mock::MockTransport;

fn smart_led() -> Device {
    Device::new("mock-device-1", "SmartLED Pro", "00:11:22:33:44:55")
        .with_capabilities(["rgb", "brightness", "effects"])
}

fn context() -> (LedContext, Rc<MockTransport>) {
    LedContext::with_mock_transport(Config::default(), vec![smart_led()]).unwrap()
}

// ── Test: the reference flow ──

#[tokio::test(start_paused = true)]
async fn scan_connect_color_brightness_disconnect() {
    let (ctx, transport) = context();
    let conn = ctx.connection();

    assert!(conn.request_permissions().await);
    let found = conn.scan(ctx.config().scan_timeout()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "mock-device-1");
    assert_eq!(found[0].display_name, "SmartLED Pro");

    let device = conn.connect("mock-device-1").await.unwrap();
    assert!(device.has_capability("rgb"));
    assert_eq!(conn.state(), ConnectionState::Connected);

    let mut surface = ctx.control(ctx.leaf("desk").unwrap());
    surface.set_rgb(Rgb::new(255, 0, 0)).await.unwrap();
    surface.set_brightness(75).await.unwrap();
    assert_eq!(transport.frames(), ["COLOR:255,0,0\n", "BRIGHTNESS:191\n"]);

    conn.disconnect().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(conn.session().is_none());
}

// ── Test: validation happens before any write ──

#[tokio::test]
async fn out_of_range_brightness_writes_nothing() {
    let (ctx, transport) = context();
    ctx.connection().connect("mock-device-1").await.unwrap();
    let mut surface = ctx.control(ctx.leaf("desk").unwrap());

    let err = surface.set_brightness(150).await.unwrap_err();
    assert!(matches!(err, LedError::Validation(_)));
    assert_eq!(transport.write_count(), 0);
}

#[tokio::test]
async fn commands_without_connection_fail() {
    let (ctx, transport) = context();
    let mut surface = ctx.control(ctx.leaf("desk").unwrap());
    let err = surface.set_color("blue").await.unwrap_err();
    assert_eq!(err.to_string(), "Command error: No device connected");
    assert_eq!(transport.write_count(), 0);

    let records = ctx.operation_log().records();
    assert_eq!(records.len(), 1);
    assert!(matches!(records[0].outcome, Outcome::Failure { .. }));
}

// ── Test: a room of leaves sharing one connection ──

#[tokio::test(start_paused = true)]
async fn room_fans_out_to_every_leaf() {
    let (ctx, transport) = context();
    ctx.connection().connect("mock-device-1").await.unwrap();

    let mut room = LedComponent::room("living").unwrap();
    for name in ["ceiling", "sofa", "shelf"] {
        room.add(ctx.leaf(name).unwrap()).unwrap();
    }
    room.add_scene(
        "movie",
        Scene {
            color: Some(Rgb::new(64, 0, 128)),
            brightness: Some(Percent::new(20).unwrap()),
            effect: None,
        },
    )
    .unwrap();
    let mut surface = ctx.control(room);

    let applied = surface.set_color("#FF0000").await.unwrap();
    assert_eq!(applied.leaves, 3);
    assert_eq!(transport.write_count(), 3);
    assert!(transport.frames().iter().all(|f| f == "COLOR:255,0,0\n"));

    // Same call inside the cache TTL: nothing new on the wire.
    surface.set_color("#FF0000").await.unwrap();
    assert_eq!(transport.write_count(), 3);

    surface.apply_scene("movie").await.unwrap();
    let frames = transport.frames();
    assert_eq!(frames.len(), 9);
    assert!(frames[3..6].iter().all(|f| f == "COLOR:64,0,128\n"));
    assert!(frames[6..].iter().all(|f| f == "BRIGHTNESS:51\n"));
}

#[tokio::test]
async fn group_state_tracks_successful_fan_out() {
    let (ctx, _transport) = context();
    ctx.connection().connect("mock-device-1").await.unwrap();

    let mut group = LedComponent::group("strip")
        .unwrap()
        .with_child(ctx.leaf("left").unwrap())
        .unwrap()
        .with_child(ctx.leaf("right").unwrap())
        .unwrap();
    group.set_color(Rgb::new(0, 255, 0)).await.unwrap();
    for leaf in group.get_leaves() {
        assert_eq!(leaf.state().unwrap().color, Rgb::new(0, 255, 0));
    }
}

// ── Test: connection retry through the context ──

#[tokio::test(start_paused = true)]
async fn flaky_connect_recovers_within_budget() {
    let (ctx, transport) = context();
    transport.fail_next_connects(2);
    ctx.connection().connect("mock-device-1").await.unwrap();
    assert_eq!(transport.connect_calls.get(), 3);
}

#[tokio::test(start_paused = true)]
async fn dead_device_exhausts_budget() {
    let (ctx, transport) = context();
    transport.fail_all_connects.set(true);
    let err = ctx.connection().connect("mock-device-1").await.unwrap_err();
    assert!(matches!(err, LedError::DeviceConnection { attempts: 3, .. }));
    assert_eq!(transport.connect_calls.get(), 3);
    assert_eq!(ctx.connection().state(), ConnectionState::Disconnected);
}

// ── Test: events reach the mediator's collaborators ──

#[tokio::test]
async fn mediator_sees_control_and_connection_events() {
    let (ctx, transport) = context();
    let recorder = RecordingCollaborator::new();
    ctx.mediator()
        .register_component("ui", Component::Ui(recorder.clone()));
    ctx.mediator()
        .register_component("scheduler", Component::Scheduler(recorder.clone()));

    ctx.connection().connect("mock-device-1").await.unwrap();
    ctx.relay_connection_events();

    let mut surface = ctx.control(ctx.leaf("desk").unwrap());
    surface.toggle_power().await.unwrap();
    transport.drop_link();
    ctx.relay_connection_events();

    assert_eq!(
        recorder.calls(),
        [
            "resume_schedules()",
            "show_connection_status(true)",
            "update_power_status(desk, Some(true))",
            "pause_schedules()",
            "show_connection_status(false)",
        ]
    );
}

#[tokio::test]
async fn device_acks_arrive_as_frames() {
    let (ctx, transport) = context();
    transport.auto_ack.set(true);
    let mut events = ctx.connection().subscribe();
    ctx.connection().connect("mock-device-1").await.unwrap();
    let mut surface = ctx.control(ctx.leaf("desk").unwrap());
    surface.set_effect("rainbow", 50).await.unwrap();
    ctx.connection().poll_events();

    let mut acks = 0;
    while let Ok(event) = events.try_recv() {
        if event == ConnectionEvent::Frame(DeviceEvent::Ack) {
            acks += 1;
        }
    }
    assert_eq!(acks, 1);
    assert_eq!(transport.frames(), ["EFFECT:rainbow:50\n"]);
}
