//! Deferred construction of an expensive controller.

use std::future::Future;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::color::Rgb;
use crate::command::{Effect, Percent};
use crate::control::{Applied, Call, LedControl};
use crate::error::Result;

type Factory = Box<dyn FnMut() -> LocalBoxFuture<'static, Result<Box<dyn LedControl>>>>;

/// Builds its controller on the first call and reuses it afterwards.
///
/// A failed build is reported to that caller and attempted again on the
/// next call.
pub struct LazyProxy {
    target: String,
    factory: Factory,
    inner: Option<Box<dyn LedControl>>,
    builds: u32,
}

impl LazyProxy {
    pub fn new<F, Fut, C>(target: &str, mut factory: F) -> Self
    where
        F: FnMut() -> Fut + 'static,
        Fut: Future<Output = Result<C>> + 'static,
        C: LedControl + 'static,
    {
        let factory: Factory = Box::new(move || {
            let pending = factory();
            async move { Ok(Box::new(pending.await?) as Box<dyn LedControl>) }.boxed_local()
        });
        LazyProxy {
            target: target.to_string(),
            factory,
            inner: None,
            builds: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    /// Factory invocations so far, failed ones included.
    pub fn builds(&self) -> u32 {
        self.builds
    }

    async fn forward(&mut self, call: Call) -> Result<Applied> {
        let mut inner = match self.inner.take() {
            Some(inner) => inner,
            None => {
                self.builds += 1;
                log::debug!("{}: building controller (attempt {})", self.target, self.builds);
                (self.factory)().await?
            }
        };
        let result = call.invoke(inner.as_mut()).await;
        self.inner = Some(inner);
        result
    }
}

#[async_trait(?Send)]
impl LedControl for LazyProxy {
    fn target(&self) -> &str {
        &self.target
    }

    async fn set_color(&mut self, color: Rgb) -> Result<Applied> {
        self.forward(Call::SetColor(color)).await
    }

    async fn set_brightness(&mut self, level: Percent) -> Result<Applied> {
        self.forward(Call::SetBrightness(level)).await
    }

    async fn toggle_power(&mut self) -> Result<Applied> {
        self.forward(Call::TogglePower).await
    }

    async fn set_effect(&mut self, effect: Effect) -> Result<Applied> {
        self.forward(Call::SetEffect(effect)).await
    }
}
