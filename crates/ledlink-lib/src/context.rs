//! Application context: builds and owns the shared services.
//!
//! Everything that would otherwise be a global (connection manager,
//! mediator, access control, operation log) is created here from a
//! [`Config`] and handed out as `Rc` handles.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::config::Config;
use crate::connection::{ConnectionEvent, ConnectionManager};
use crate::control::DeviceController;
use crate::device::Device;
use crate::error::{LedError, Result};
use crate::mediator::{ControlMediator, MediatorEvent};
use crate::proxy::{AccessControl, OperationLog, ProxyChain};
use crate::surface::ControlSurface;
use crate::transport::mock::{MockPermissions, MockTransport};
use crate::transport::{PermissionProvider, Transport};
use crate::tree::LedComponent;

/// Sender name used for events relayed from the connection manager.
const CONNECTION_SENDER: &str = "connection";

pub struct LedContext {
    config: Config,
    connection: Rc<ConnectionManager>,
    mediator: Rc<ControlMediator>,
    access: Rc<AccessControl>,
    log: Rc<OperationLog>,
    events: RefCell<broadcast::Receiver<ConnectionEvent>>,
}

impl LedContext {
    /// Validate `config` and wire up the services around `transport`.
    pub fn new(
        config: Config,
        transport: Rc<dyn Transport>,
        permissions: Rc<dyn PermissionProvider>,
    ) -> Result<Self> {
        if let Err(issues) = config.validate() {
            let joined: Vec<String> = issues.iter().map(ToString::to_string).collect();
            return Err(LedError::Config(joined.join("; ")));
        }
        let access = Rc::new(AccessControl::new(
            config.access_policy()?,
            &config.access.role,
        )?);
        let connection = Rc::new(ConnectionManager::new(
            transport,
            permissions,
            config.retry_policy(),
        ));
        let events = RefCell::new(connection.subscribe());
        Ok(LedContext {
            config,
            connection,
            mediator: ControlMediator::new(),
            access,
            log: Rc::new(OperationLog::new()),
            events,
        })
    }

    /// Context over a [`MockTransport`] that announces `devices` and grants
    /// permissions. The transport is returned for inspection.
    pub fn with_mock_transport(
        config: Config,
        devices: Vec<Device>,
    ) -> Result<(Self, Rc<MockTransport>)> {
        let transport = Rc::new(MockTransport::with_devices(devices));
        let context = Self::new(
            config,
            transport.clone(),
            Rc::new(MockPermissions::granting()),
        )?;
        Ok((context, transport))
    }

    // ── Accessors ──

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connection(&self) -> &Rc<ConnectionManager> {
        &self.connection
    }

    pub fn mediator(&self) -> &Rc<ControlMediator> {
        &self.mediator
    }

    pub fn access(&self) -> &Rc<AccessControl> {
        &self.access
    }

    pub fn operation_log(&self) -> &Rc<OperationLog> {
        &self.log
    }

    // ── Factories ──

    pub fn device_controller(&self, name: &str) -> DeviceController {
        DeviceController::new(name, self.connection.clone())
    }

    /// A leaf driving the connected device.
    pub fn leaf(&self, name: &str) -> Result<LedComponent> {
        LedComponent::leaf(name, self.device_controller(name))
    }

    /// The proxy chain enabled by `[proxy]`.
    pub fn proxy_chain(&self) -> ProxyChain {
        let p = &self.config.proxy;
        let mut chain = ProxyChain::new();
        if p.access_control {
            chain = chain.with_access_control(self.access.clone());
        }
        if p.caching {
            chain = chain.with_caching(self.config.cache_ttl());
        }
        if p.logging {
            chain = chain.with_logging(self.log.clone());
        }
        chain
    }

    /// Wrap `component` in the configured proxies and connect it to the
    /// mediator. A room's scenes are offered by the surface.
    pub fn control(&self, component: LedComponent) -> ControlSurface {
        let scenes = component.scenes();
        let control = self.proxy_chain().wrap(component);
        ControlSurface::new(control, self.mediator.clone()).with_scenes(scenes)
    }

    /// A leaf surface whose controller is only created on the first call
    /// that passes the configured proxies.
    pub fn lazy_control(&self, name: &str) -> ControlSurface {
        let connection = self.connection.clone();
        let leaf_name = name.to_string();
        let control = self.proxy_chain().wrap_lazy(name, move || {
            let leaf = LedComponent::leaf(
                &leaf_name,
                DeviceController::new(&leaf_name, connection.clone()),
            );
            async move { leaf }
        });
        ControlSurface::new(control, self.mediator.clone())
    }

    // ── Connection → mediator ──

    /// Handle queued transport events, then forward connection, disconnection
    /// and error events to the mediator. Returns how many were forwarded.
    pub fn relay_connection_events(&self) -> usize {
        self.connection.poll_events();
        let mut rx = self.events.borrow_mut();
        let mut relayed = 0;
        loop {
            let event = match rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Lagged(missed)) => {
                    log::warn!("relay fell behind, {missed} connection events lost");
                    continue;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            };
            let forwarded = match event {
                ConnectionEvent::Connected { device, .. } => {
                    MediatorEvent::DeviceConnected { device }
                }
                ConnectionEvent::Disconnected { device_id, .. } => {
                    MediatorEvent::DeviceDisconnected { device_id }
                }
                ConnectionEvent::Error(message) => MediatorEvent::ErrorOccurred {
                    source: CONNECTION_SENDER.to_string(),
                    message,
                },
                _ => continue,
            };
            self.mediator.notify(CONNECTION_SENDER, forwarded);
            relayed += 1;
        }
        relayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediator::Component;
    use crate::mediator::mock::RecordingCollaborator;

    fn mock_context() -> (LedContext, Rc<MockTransport>) {
        LedContext::with_mock_transport(Config::default(), vec![]).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.connection.max_connect_attempts = 0;
        config.access.role = "root".into();
        let err = LedContext::with_mock_transport(config, vec![])
            .err()
            .unwrap();
        let msg = err.to_string();
        assert!(msg.starts_with("Config error: "));
        assert!(msg.contains("max_connect_attempts"));
        assert!(msg.contains("Unknown access role: root"));
    }

    #[tokio::test]
    async fn leaf_surface_sends_through_connection() {
        let (ctx, transport) = mock_context();
        ctx.connection().connect("dev").await.unwrap();
        let mut surface = ctx.control(ctx.leaf("desk").unwrap());
        surface.set_color("red").await.unwrap();
        assert_eq!(transport.frames(), ["COLOR:255,0,0\n"]);
        assert_eq!(ctx.operation_log().len(), 1);
    }

    #[tokio::test]
    async fn role_from_config_applies_to_surfaces() {
        let mut config = Config::default();
        config.access.role = "guest".into();
        let (ctx, transport) = LedContext::with_mock_transport(config, vec![]).unwrap();
        ctx.connection().connect("dev").await.unwrap();
        let mut surface = ctx.control(ctx.leaf("desk").unwrap());

        assert!(matches!(
            surface.set_brightness(50).await,
            Err(LedError::AccessDenied { .. })
        ));
        assert_eq!(transport.write_count(), 0);
        ctx.access().set_role("user").unwrap();
        surface.set_brightness(50).await.unwrap();
        assert_eq!(transport.write_count(), 1);
    }

    #[tokio::test]
    async fn disabled_proxies_are_skipped() {
        let mut config = Config::default();
        config.proxy.logging = false;
        config.proxy.caching = false;
        let (ctx, transport) = LedContext::with_mock_transport(config, vec![]).unwrap();
        ctx.connection().connect("dev").await.unwrap();
        let mut surface = ctx.control(ctx.leaf("desk").unwrap());
        surface.set_color("red").await.unwrap();
        surface.set_color("red").await.unwrap();
        assert_eq!(transport.write_count(), 2);
        assert!(ctx.operation_log().is_empty());
    }

    #[tokio::test]
    async fn connection_events_reach_mediator() {
        let (ctx, transport) = mock_context();
        let ui = RecordingCollaborator::new();
        ctx.mediator()
            .register_component("ui", Component::Ui(ui.clone()));

        ctx.connection().connect("dev").await.unwrap();
        assert_eq!(ctx.relay_connection_events(), 1);
        transport.drop_link();
        assert_eq!(ctx.relay_connection_events(), 1);
        assert_eq!(
            ui.calls(),
            ["show_connection_status(true)", "show_connection_status(false)"]
        );
        assert_eq!(ctx.relay_connection_events(), 0);
    }

    #[tokio::test]
    async fn lazy_surface_reaches_the_device() {
        let (ctx, transport) = mock_context();
        ctx.connection().connect("dev").await.unwrap();
        let mut surface = ctx.lazy_control("porch");
        surface.set_color("blue").await.unwrap();
        assert_eq!(transport.frames(), ["COLOR:0,0,255\n"]);
        assert_eq!(ctx.operation_log().len(), 1);
    }
}
