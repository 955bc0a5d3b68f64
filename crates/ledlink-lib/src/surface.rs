//! User-facing entry point: raw input in, mediator notifications out.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::color::{Rgb, parse_color};
use crate::command::{Effect, Percent};
use crate::control::{Applied, LedControl};
use crate::error::{LedError, Result};
use crate::mediator::{ControlMediator, MediatorEvent};
use crate::tree::Scene;

/// Validates raw user input, runs it through a (proxied) controller and
/// tells the mediator what happened.
///
/// Every success produces the matching change event; every failure,
/// validation included, produces `ErrorOccurred`. The result is returned
/// unchanged either way.
pub struct ControlSurface {
    control: Box<dyn LedControl>,
    scenes: BTreeMap<String, Scene>,
    mediator: Rc<ControlMediator>,
}

impl ControlSurface {
    pub fn new(control: Box<dyn LedControl>, mediator: Rc<ControlMediator>) -> Self {
        ControlSurface {
            control,
            scenes: BTreeMap::new(),
            mediator,
        }
    }

    /// Scenes offered by [`apply_scene`](Self::apply_scene).
    pub fn with_scenes(mut self, scenes: BTreeMap<String, Scene>) -> Self {
        self.scenes = scenes;
        self
    }

    pub fn target(&self) -> &str {
        self.control.target()
    }

    pub fn scene_names(&self) -> Vec<&str> {
        self.scenes.keys().map(String::as_str).collect()
    }

    /// `#RRGGBB`, `RRGGBB` or a color name.
    pub async fn set_color(&mut self, color: &str) -> Result<Applied> {
        match parse_color(color) {
            Ok(rgb) => self.set_rgb(rgb).await,
            Err(e) => Err(self.report(e)),
        }
    }

    pub async fn set_rgb(&mut self, color: Rgb) -> Result<Applied> {
        let result = self.control.set_color(color).await;
        self.finish(result, |a| MediatorEvent::ColorChanged {
            target: a.target.clone(),
            color,
        })
    }

    /// Percent, `0..=100`.
    pub async fn set_brightness(&mut self, level: u8) -> Result<Applied> {
        let level = match Percent::new(level) {
            Ok(p) => p,
            Err(_) => {
                return Err(self.report(LedError::Validation(format!(
                    "brightness {level} out of range (0-100)"
                ))));
            }
        };
        let result = self.control.set_brightness(level).await;
        self.finish(result, |a| MediatorEvent::BrightnessChanged {
            target: a.target.clone(),
            level: level.get(),
        })
    }

    pub async fn toggle_power(&mut self) -> Result<Applied> {
        let result = self.control.toggle_power().await;
        self.finish(result, |a| MediatorEvent::PowerToggled {
            target: a.target.clone(),
            power: a.power,
        })
    }

    pub async fn set_effect(&mut self, name: &str, speed: u8) -> Result<Applied> {
        let effect = match Effect::new(name, speed) {
            Ok(e) => e,
            Err(e) => return Err(self.report(e)),
        };
        let result = self.control.set_effect(effect.clone()).await;
        self.finish(result, |a| MediatorEvent::EffectChanged {
            target: a.target.clone(),
            effect,
        })
    }

    /// Apply a named scene through the controller: color, then brightness,
    /// then effect. Stops at the first failure.
    pub async fn apply_scene(&mut self, name: &str) -> Result<Applied> {
        let Some(scene) = self.scenes.get(name).cloned() else {
            return Err(self.report(LedError::SceneNotFound(name.to_string())));
        };
        let mut applied = Applied {
            target: self.target().to_string(),
            leaves: 0,
            power: None,
        };
        let mut steps = Vec::new();
        if let Some(color) = scene.color {
            steps.push(self.set_rgb(color).await?);
        }
        if let Some(level) = scene.brightness {
            steps.push(self.set_brightness(level.get()).await?);
        }
        if let Some(effect) = scene.effect {
            steps.push(self.set_effect(effect.name(), effect.speed()).await?);
        }
        applied.leaves = steps.iter().map(|s| s.leaves).max().unwrap_or(0);
        Ok(applied)
    }

    fn finish(
        &self,
        result: Result<Applied>,
        event: impl FnOnce(&Applied) -> MediatorEvent,
    ) -> Result<Applied> {
        match result {
            Ok(applied) => {
                self.mediator.notify(self.target(), event(&applied));
                Ok(applied)
            }
            Err(e) => Err(self.report(e)),
        }
    }

    fn report(&self, error: LedError) -> LedError {
        self.mediator.notify(
            self.target(),
            MediatorEvent::ErrorOccurred {
                source: self.target().to_string(),
                message: error.to_string(),
            },
        );
        error
    }
}
