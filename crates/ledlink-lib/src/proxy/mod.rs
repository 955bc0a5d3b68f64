//! Control proxies and the chain builder that stacks them.
//!
//! Whatever subset is enabled, the order from the outside in is always
//! access control → cache → logging → controller. Denied calls are neither
//! cached nor logged; cache hits are not logged.

pub mod access;
pub mod caching;
pub mod lazy;
pub mod logging;

use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

pub use access::{AccessControl, AccessControlProxy, AccessPolicy, PermissionSet};
pub use caching::{CachingProxy, DEFAULT_CACHE_TTL};
pub use lazy::LazyProxy;
pub use logging::{LoggingProxy, OperationLog, OperationRecord, Outcome};

use crate::control::LedControl;
use crate::error::Result;

#[derive(Default)]
pub struct ProxyChain {
    access: Option<Rc<AccessControl>>,
    cache_ttl: Option<Duration>,
    log: Option<Rc<OperationLog>>,
}

impl ProxyChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_access_control(mut self, access: Rc<AccessControl>) -> Self {
        self.access = Some(access);
        self
    }

    pub fn with_caching(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_logging(mut self, log: Rc<OperationLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Wrap `inner` in the enabled proxies.
    pub fn wrap(self, inner: impl LedControl + 'static) -> Box<dyn LedControl> {
        let mut control: Box<dyn LedControl> = Box::new(inner);
        if let Some(log) = self.log {
            control = Box::new(LoggingProxy::new(control, log));
        }
        if let Some(ttl) = self.cache_ttl {
            control = Box::new(CachingProxy::new(control, ttl));
        }
        if let Some(access) = self.access {
            control = Box::new(AccessControlProxy::new(control, access));
        }
        control
    }

    /// Like [`wrap`](Self::wrap), but the controller is only built by
    /// `factory` when a call gets past the outer proxies.
    pub fn wrap_lazy<F, Fut, C>(self, target: &str, factory: F) -> Box<dyn LedControl>
    where
        F: FnMut() -> Fut + 'static,
        Fut: Future<Output = Result<C>> + 'static,
        C: LedControl + 'static,
    {
        self.wrap(LazyProxy::new(target, factory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::control::mock::MockControl;
    use crate::error::LedError;
    use std::cell::Cell;

    fn full_chain(role: &str, log: &Rc<OperationLog>) -> (Box<dyn LedControl>, MockControl) {
        let access = Rc::new(AccessControl::new(AccessPolicy::default(), role).unwrap());
        let mock = MockControl::new("lamp");
        let chain = ProxyChain::new()
            .with_logging(log.clone())
            .with_access_control(access)
            .with_caching(DEFAULT_CACHE_TTL)
            .wrap(mock.clone());
        (chain, mock)
    }

    #[tokio::test(start_paused = true)]
    async fn denied_calls_are_not_logged() {
        let log = Rc::new(OperationLog::new());
        let (mut chain, mock) = full_chain("guest", &log);

        let err = chain.set_color(Rgb::RED).await.unwrap_err();
        assert!(matches!(err, LedError::AccessDenied { .. }));
        assert!(log.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hits_skip_logging_and_inner() {
        let log = Rc::new(OperationLog::new());
        let (mut chain, mock) = full_chain("user", &log);

        chain.set_color(Rgb::RED).await.unwrap();
        chain.set_color(Rgb::RED).await.unwrap();
        assert_eq!(mock.call_count(), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(chain.target(), "lamp");
    }

    #[tokio::test]
    async fn empty_chain_is_transparent() {
        let mock = MockControl::new("lamp");
        let mut control = ProxyChain::new().wrap(mock.clone());
        control.toggle_power().await.unwrap();
        control.toggle_power().await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn lazy_controller_is_built_behind_the_chain() {
        let log = Rc::new(OperationLog::new());
        let access = Rc::new(AccessControl::new(AccessPolicy::default(), "guest").unwrap());
        let builds = Rc::new(Cell::new(0));
        let mock = MockControl::new("lamp");

        let counter = builds.clone();
        let built = mock.clone();
        let mut chain = ProxyChain::new()
            .with_logging(log.clone())
            .with_access_control(access.clone())
            .with_caching(DEFAULT_CACHE_TTL)
            .wrap_lazy("lamp", move || {
                counter.set(counter.get() + 1);
                let m = built.clone();
                async move { Ok(m) }
            });
        assert_eq!(chain.target(), "lamp");
        assert_eq!(builds.get(), 0);

        // Denied before the lazy layer is reached.
        assert!(chain.set_color(Rgb::RED).await.is_err());
        assert_eq!(builds.get(), 0);

        access.set_role("user").unwrap();
        chain.set_color(Rgb::RED).await.unwrap();
        assert_eq!(builds.get(), 1);
        assert_eq!(log.len(), 1);

        chain.set_color(Rgb::RED).await.unwrap();
        assert_eq!(builds.get(), 1);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(log.len(), 1);
    }
}
