//! Short-lived result cache in front of a controller.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::color::Rgb;
use crate::command::{Effect, Percent};
use crate::control::{Applied, Call, LedControl};
use crate::error::Result;

/// Default time a cached result stays valid.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Applied,
    expires_at: Instant,
}

/// Answers a repeated `set_color` / `set_brightness` / `set_effect` with the
/// previous result while it is younger than the TTL, without touching the
/// inner controller.
///
/// Entries are keyed by operation and arguments and expire only by TTL (or
/// [`clear_cache`](Self::clear_cache)). Only successes are cached.
/// `toggle_power` always goes through.
pub struct CachingProxy<C> {
    inner: C,
    ttl: Duration,
    entries: HashMap<Call, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl<C: LedControl> CachingProxy<C> {
    pub fn new(inner: C, ttl: Duration) -> Self {
        CachingProxy {
            inner,
            ttl,
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn clear_cache(&mut self) {
        log::debug!("{}: cache cleared ({} entries)", self.inner.target(), self.entries.len());
        self.entries.clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn cached(&mut self, call: Call) -> Result<Applied> {
        if let Some(entry) = self.entries.get(&call) {
            if entry.expires_at > Instant::now() {
                self.hits += 1;
                log::debug!("{}: cache hit for {call}", self.inner.target());
                return Ok(entry.value.clone());
            }
        }
        self.misses += 1;
        let value = call.clone().invoke(&mut self.inner).await?;
        let now = Instant::now();
        self.entries.retain(|_, e| e.expires_at > now);
        self.entries.insert(
            call,
            CacheEntry {
                value: value.clone(),
                expires_at: now + self.ttl,
            },
        );
        Ok(value)
    }
}

#[async_trait(?Send)]
impl<C: LedControl> LedControl for CachingProxy<C> {
    fn target(&self) -> &str {
        self.inner.target()
    }

    async fn set_color(&mut self, color: Rgb) -> Result<Applied> {
        self.cached(Call::SetColor(color)).await
    }

    async fn set_brightness(&mut self, level: Percent) -> Result<Applied> {
        self.cached(Call::SetBrightness(level)).await
    }

    async fn toggle_power(&mut self) -> Result<Applied> {
        self.inner.toggle_power().await
    }

    async fn set_effect(&mut self, effect: Effect) -> Result<Applied> {
        self.cached(Call::SetEffect(effect)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::mock::MockControl;

    fn proxy() -> (CachingProxy<MockControl>, MockControl) {
        let mock = MockControl::new("lamp");
        (CachingProxy::new(mock.clone(), DEFAULT_CACHE_TTL), mock)
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_within_ttl_is_served_from_cache() {
        let (mut p, mock) = proxy();
        let first = p.set_color(Rgb::RED).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        let second = p.set_color(Rgb::RED).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(mock.call_count(), 1);
        assert_eq!((p.hits(), p.misses()), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_goes_to_inner() {
        let (mut p, mock) = proxy();
        p.set_color(Rgb::RED).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        p.set_color(Rgb::RED).await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn different_arguments_are_different_keys() {
        let (mut p, mock) = proxy();
        p.set_brightness(Percent::new(10).unwrap()).await.unwrap();
        p.set_brightness(Percent::new(20).unwrap()).await.unwrap();
        p.set_color(Rgb::RED).await.unwrap();
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn each_argument_set_keeps_its_own_entry() {
        let (mut p, mock) = proxy();
        p.set_color(Rgb::RED).await.unwrap();
        p.set_color(Rgb::WHITE).await.unwrap();
        p.set_color(Rgb::RED).await.unwrap();
        assert_eq!(mock.call_count(), 2);
        assert_eq!((p.hits(), p.misses()), (1, 2));

        tokio::time::advance(Duration::from_secs(6)).await;
        p.set_color(Rgb::RED).await.unwrap();
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_power_is_never_cached() {
        let (mut p, mock) = proxy();
        p.toggle_power().await.unwrap();
        p.toggle_power().await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_not_cached() {
        let (mut p, mock) = proxy();
        mock.fail.set(true);
        assert!(p.set_color(Rgb::RED).await.is_err());
        mock.fail.set(false);
        p.set_color(Rgb::RED).await.unwrap();
        assert_eq!(mock.call_count(), 1);
        assert_eq!(p.hits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cache_forces_miss() {
        let (mut p, mock) = proxy();
        p.set_color(Rgb::RED).await.unwrap();
        p.clear_cache();
        p.set_color(Rgb::RED).await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }
}
