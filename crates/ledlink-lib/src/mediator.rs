//! Control mediator: relays control and connection events to collaborators.
//!
//! Collaborators (UI, analytics, storage, scheduler) register under a name and
//! never talk to each other directly. Each [`MediatorEvent`] is routed through
//! one fixed table to whichever collaborators are registered; ad-hoc
//! listeners run afterwards.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;

use crate::color::Rgb;
use crate::command::Effect;
use crate::device::Device;
use crate::error::Result;

// ── Events ──

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MediatorEvent {
    ColorChanged {
        target: String,
        color: Rgb,
    },
    BrightnessChanged {
        target: String,
        level: u8,
    },
    PowerToggled {
        target: String,
        power: Option<bool>,
    },
    EffectChanged {
        target: String,
        effect: Effect,
    },
    DeviceConnected {
        device: Device,
    },
    DeviceDisconnected {
        device_id: String,
    },
    ErrorOccurred {
        source: String,
        message: String,
    },
    /// Not routed to collaborators; logged and passed to listeners.
    Custom {
        name: String,
        data: serde_json::Value,
    },
}

/// Discriminant of a [`MediatorEvent`], used to subscribe listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    ColorChanged,
    BrightnessChanged,
    PowerToggled,
    EffectChanged,
    DeviceConnected,
    DeviceDisconnected,
    ErrorOccurred,
    Custom,
}

impl MediatorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MediatorEvent::ColorChanged { .. } => EventKind::ColorChanged,
            MediatorEvent::BrightnessChanged { .. } => EventKind::BrightnessChanged,
            MediatorEvent::PowerToggled { .. } => EventKind::PowerToggled,
            MediatorEvent::EffectChanged { .. } => EventKind::EffectChanged,
            MediatorEvent::DeviceConnected { .. } => EventKind::DeviceConnected,
            MediatorEvent::DeviceDisconnected { .. } => EventKind::DeviceDisconnected,
            MediatorEvent::ErrorOccurred { .. } => EventKind::ErrorOccurred,
            MediatorEvent::Custom { .. } => EventKind::Custom,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::ColorChanged => "color_changed",
            EventKind::BrightnessChanged => "brightness_changed",
            EventKind::PowerToggled => "power_toggled",
            EventKind::EffectChanged => "effect_changed",
            EventKind::DeviceConnected => "device_connected",
            EventKind::DeviceDisconnected => "device_disconnected",
            EventKind::ErrorOccurred => "error_occurred",
            EventKind::Custom => "custom",
        };
        f.write_str(s)
    }
}

// ── Collaborators ──

/// Lifecycle hooks shared by every collaborator.
pub trait Colleague {
    /// Called on registration with a handle for sending events back.
    fn attach(&self, _mediator: MediatorHandle) {}
    /// Called on unregistration.
    fn detach(&self) {}
}

/// Everything defaults to a no-op so implementors pick what they show.
pub trait UiCollaborator: Colleague {
    fn update_color_display(&self, _target: &str, _color: Rgb) {}
    fn update_brightness_display(&self, _target: &str, _level: u8) {}
    fn update_power_status(&self, _target: &str, _power: Option<bool>) {}
    fn update_effect_display(&self, _target: &str, _effect: &Effect) {}
    fn show_connection_status(&self, _connected: bool) {}
    fn show_error(&self, _message: &str) {}
}

pub trait AnalyticsCollaborator: Colleague {
    fn track_color_change(&self, _target: &str, _color: Rgb) {}
    fn track_brightness_change(&self, _target: &str, _level: u8) {}
    fn track_power_toggle(&self, _target: &str, _power: Option<bool>) {}
    fn track_effect_change(&self, _target: &str, _effect: &Effect) {}
    fn track_connection(&self, _device: &Device) {}
    fn track_disconnection(&self, _device_id: &str) {}
    fn track_error(&self, _source: &str, _message: &str) {}
}

/// Persistence hooks. Failures are logged by the mediator.
pub trait StorageCollaborator: Colleague {
    fn save_color(&self, _target: &str, _color: Rgb) -> Result<()> {
        Ok(())
    }
    fn save_brightness(&self, _target: &str, _level: u8) -> Result<()> {
        Ok(())
    }
    fn save_power_state(&self, _target: &str, _power: Option<bool>) -> Result<()> {
        Ok(())
    }
    fn save_effect(&self, _target: &str, _effect: &Effect) -> Result<()> {
        Ok(())
    }
    fn save_last_device(&self, _device: &Device) -> Result<()> {
        Ok(())
    }
}

pub trait SchedulerCollaborator: Colleague {
    fn resume_schedules(&self) {}
    fn pause_schedules(&self) {}
}

/// A registered collaborator.
#[derive(Clone)]
pub enum Component {
    Ui(Rc<dyn UiCollaborator>),
    Analytics(Rc<dyn AnalyticsCollaborator>),
    Storage(Rc<dyn StorageCollaborator>),
    Scheduler(Rc<dyn SchedulerCollaborator>),
}

impl Component {
    fn attach(&self, handle: MediatorHandle) {
        match self {
            Component::Ui(c) => c.attach(handle),
            Component::Analytics(c) => c.attach(handle),
            Component::Storage(c) => c.attach(handle),
            Component::Scheduler(c) => c.attach(handle),
        }
    }

    fn detach(&self) {
        match self {
            Component::Ui(c) => c.detach(),
            Component::Analytics(c) => c.detach(),
            Component::Storage(c) => c.detach(),
            Component::Scheduler(c) => c.detach(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Component::Ui(_) => "ui",
            Component::Analytics(_) => "analytics",
            Component::Storage(_) => "storage",
            Component::Scheduler(_) => "scheduler",
        }
    }
}

// ── Mediator ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&str, &MediatorEvent) -> Result<()>>;

struct ListenerEntry {
    id: ListenerId,
    kind: EventKind,
    callback: Listener,
}

/// Non-owning reference to the mediator, handed to collaborators.
#[derive(Clone)]
pub struct MediatorHandle(Weak<ControlMediator>);

impl MediatorHandle {
    /// Send an event. Returns `false` if the mediator is gone.
    pub fn notify(&self, sender: &str, event: MediatorEvent) -> bool {
        match self.0.upgrade() {
            Some(mediator) => {
                mediator.notify(sender, event);
                true
            }
            None => false,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

pub struct ControlMediator {
    me: Weak<ControlMediator>,
    components: RefCell<BTreeMap<String, Component>>,
    listeners: RefCell<Vec<ListenerEntry>>,
    next_listener: Cell<u64>,
}

impl ControlMediator {
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|me| ControlMediator {
            me: me.clone(),
            components: RefCell::new(BTreeMap::new()),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
        })
    }

    pub fn handle(&self) -> MediatorHandle {
        MediatorHandle(self.me.clone())
    }

    /// Register a collaborator. An existing one with the same name is
    /// detached and replaced.
    pub fn register_component(&self, name: &str, component: Component) {
        log::debug!("mediator: registering {} '{name}'", component.role());
        let previous = self
            .components
            .borrow_mut()
            .insert(name.to_string(), component.clone());
        if let Some(old) = previous {
            old.detach();
        }
        component.attach(self.handle());
    }

    /// Returns `false` if no collaborator had that name.
    pub fn unregister_component(&self, name: &str) -> bool {
        let removed = self.components.borrow_mut().remove(name);
        match removed {
            Some(component) => {
                log::debug!("mediator: unregistered {} '{name}'", component.role());
                component.detach();
                true
            }
            None => false,
        }
    }

    pub fn component_names(&self) -> Vec<String> {
        self.components.borrow().keys().cloned().collect()
    }

    pub fn add_event_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&str, &MediatorEvent) -> Result<()> + 'static,
    {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push(ListenerEntry {
            id,
            kind,
            callback: Rc::new(listener),
        });
        id
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Route `event` to the registered collaborators, then to listeners of
    /// its kind. Collaborators may call back into the mediator.
    pub fn notify(&self, sender: &str, event: MediatorEvent) {
        log::debug!("mediator: {} from {sender}", event.kind());
        if let MediatorEvent::Custom { name, data } = &event {
            log::info!("mediator: custom event '{name}' from {sender}: {data}");
        } else {
            let components: Vec<Component> = self.components.borrow().values().cloned().collect();
            for component in &components {
                route(component, &event);
            }
        }

        let kind = event.kind();
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.callback.clone())
            .collect();
        for listener in listeners {
            if let Err(e) = listener(sender, &event) {
                log::warn!("mediator: {kind} listener failed: {e}");
            }
        }
    }
}

fn log_storage(what: &str, result: Result<()>) {
    if let Err(e) = result {
        log::warn!("storage: {what} failed: {e}");
    }
}

/// The routing table.
fn route(component: &Component, event: &MediatorEvent) {
    use MediatorEvent as E;

    match (component, event) {
        (Component::Ui(ui), E::ColorChanged { target, color }) => {
            ui.update_color_display(target, *color)
        }
        (Component::Ui(ui), E::BrightnessChanged { target, level }) => {
            ui.update_brightness_display(target, *level)
        }
        (Component::Ui(ui), E::PowerToggled { target, power }) => {
            ui.update_power_status(target, *power)
        }
        (Component::Ui(ui), E::EffectChanged { target, effect }) => {
            ui.update_effect_display(target, effect)
        }
        (Component::Ui(ui), E::DeviceConnected { .. }) => ui.show_connection_status(true),
        (Component::Ui(ui), E::DeviceDisconnected { .. }) => ui.show_connection_status(false),
        (Component::Ui(ui), E::ErrorOccurred { message, .. }) => ui.show_error(message),

        (Component::Analytics(a), E::ColorChanged { target, color }) => {
            a.track_color_change(target, *color)
        }
        (Component::Analytics(a), E::BrightnessChanged { target, level }) => {
            a.track_brightness_change(target, *level)
        }
        (Component::Analytics(a), E::PowerToggled { target, power }) => {
            a.track_power_toggle(target, *power)
        }
        (Component::Analytics(a), E::EffectChanged { target, effect }) => {
            a.track_effect_change(target, effect)
        }
        (Component::Analytics(a), E::DeviceConnected { device }) => a.track_connection(device),
        (Component::Analytics(a), E::DeviceDisconnected { device_id }) => {
            a.track_disconnection(device_id)
        }
        (Component::Analytics(a), E::ErrorOccurred { source, message }) => {
            a.track_error(source, message)
        }

        (Component::Storage(s), E::ColorChanged { target, color }) => {
            log_storage("save_color", s.save_color(target, *color))
        }
        (Component::Storage(s), E::BrightnessChanged { target, level }) => {
            log_storage("save_brightness", s.save_brightness(target, *level))
        }
        (Component::Storage(s), E::PowerToggled { target, power }) => {
            log_storage("save_power_state", s.save_power_state(target, *power))
        }
        (Component::Storage(s), E::EffectChanged { target, effect }) => {
            log_storage("save_effect", s.save_effect(target, effect))
        }
        (Component::Storage(s), E::DeviceConnected { device }) => {
            log_storage("save_last_device", s.save_last_device(device))
        }

        (Component::Scheduler(s), E::DeviceConnected { .. }) => s.resume_schedules(),
        (Component::Scheduler(s), E::DeviceDisconnected { .. }) => s.pause_schedules(),

        _ => {}
    }
}

// ── Mock implementation ──

pub mod mock {
    use super::*;
    use crate::error::LedError;

    /// Collaborator that plays every role and records each call as
    /// `"<method>(<args>)"`.
    #[derive(Default)]
    pub struct RecordingCollaborator {
        pub calls: RefCell<Vec<String>>,
        pub handle: RefCell<Option<MediatorHandle>>,
        pub detached: Cell<bool>,
        /// Make every storage call fail.
        pub fail_storage: Cell<bool>,
    }

    impl RecordingCollaborator {
        pub fn new() -> Rc<Self> {
            Rc::new(Self::default())
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn record(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }

        fn store(&self, call: String) -> Result<()> {
            self.record(call);
            if self.fail_storage.get() {
                return Err(LedError::Io(std::io::Error::other("disk full")));
            }
            Ok(())
        }
    }

    impl Colleague for RecordingCollaborator {
        fn attach(&self, mediator: MediatorHandle) {
            *self.handle.borrow_mut() = Some(mediator);
        }

        fn detach(&self) {
            self.detached.set(true);
            self.handle.borrow_mut().take();
        }
    }

    impl UiCollaborator for RecordingCollaborator {
        fn update_color_display(&self, target: &str, color: Rgb) {
            self.record(format!("update_color_display({target}, {color})"));
        }
        fn update_brightness_display(&self, target: &str, level: u8) {
            self.record(format!("update_brightness_display({target}, {level})"));
        }
        fn update_power_status(&self, target: &str, power: Option<bool>) {
            self.record(format!("update_power_status({target}, {power:?})"));
        }
        fn update_effect_display(&self, target: &str, effect: &Effect) {
            self.record(format!("update_effect_display({target}, {})", effect.name()));
        }
        fn show_connection_status(&self, connected: bool) {
            self.record(format!("show_connection_status({connected})"));
        }
        fn show_error(&self, message: &str) {
            self.record(format!("show_error({message})"));
        }
    }

    impl AnalyticsCollaborator for RecordingCollaborator {
        fn track_color_change(&self, target: &str, color: Rgb) {
            self.record(format!("track_color_change({target}, {color})"));
        }
        fn track_brightness_change(&self, target: &str, level: u8) {
            self.record(format!("track_brightness_change({target}, {level})"));
        }
        fn track_power_toggle(&self, target: &str, power: Option<bool>) {
            self.record(format!("track_power_toggle({target}, {power:?})"));
        }
        fn track_effect_change(&self, target: &str, effect: &Effect) {
            self.record(format!("track_effect_change({target}, {})", effect.name()));
        }
        fn track_connection(&self, device: &Device) {
            self.record(format!("track_connection({})", device.id));
        }
        fn track_disconnection(&self, device_id: &str) {
            self.record(format!("track_disconnection({device_id})"));
        }
        fn track_error(&self, source: &str, message: &str) {
            self.record(format!("track_error({source}, {message})"));
        }
    }

    impl StorageCollaborator for RecordingCollaborator {
        fn save_color(&self, target: &str, color: Rgb) -> Result<()> {
            self.store(format!("save_color({target}, {color})"))
        }
        fn save_brightness(&self, target: &str, level: u8) -> Result<()> {
            self.store(format!("save_brightness({target}, {level})"))
        }
        fn save_power_state(&self, target: &str, power: Option<bool>) -> Result<()> {
            self.store(format!("save_power_state({target}, {power:?})"))
        }
        fn save_effect(&self, target: &str, effect: &Effect) -> Result<()> {
            self.store(format!("save_effect({target}, {})", effect.name()))
        }
        fn save_last_device(&self, device: &Device) -> Result<()> {
            self.store(format!("save_last_device({})", device.id))
        }
    }

    impl SchedulerCollaborator for RecordingCollaborator {
        fn resume_schedules(&self) {
            self.record("resume_schedules()".into());
        }
        fn pause_schedules(&self) {
            self.record("pause_schedules()".into());
        }
    }
}
