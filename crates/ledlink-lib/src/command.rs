//! Validated, immutable LED commands.
//!
//! Every payload type checks its invariants in its constructor, so a
//! [`Command`] value can always be encoded without further checks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::error::{LedError, Result};
use crate::protocol::{ALL_WEEKDAYS, MAX_BRIGHTNESS_PERCENT, MAX_EFFECT_NAME_LEN};

/// A value in `0..=100`. Used for brightness and effect speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Percent(u8);

impl Percent {
    pub const MAX: Percent = Percent(MAX_BRIGHTNESS_PERCENT);

    pub fn new(value: u8) -> Result<Self> {
        if value > MAX_BRIGHTNESS_PERCENT {
            return Err(LedError::Validation(format!(
                "{value} is out of range (0-{MAX_BRIGHTNESS_PERCENT})"
            )));
        }
        Ok(Percent(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl<'de> Deserialize<'de> for Percent {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let v = u8::deserialize(d)?;
        Percent::new(v).map_err(serde::de::Error::custom)
    }
}

/// A named lighting effect with a speed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Effect {
    name: String,
    speed: Percent,
}

impl Effect {
    /// Validate an effect name and speed.
    ///
    /// Names are 1–32 characters of ASCII letters, digits, `_` or `-` (the
    /// wire separators `:` `,` and newlines can never appear).
    pub fn new(name: &str, speed: u8) -> Result<Self> {
        let name = name.trim();
        validate_effect_name(name)?;
        let speed = Percent::new(speed)
            .map_err(|_| LedError::Validation(format!("effect speed {speed} out of range (0-100)")))?;
        Ok(Effect {
            name: name.to_string(),
            speed,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn speed(&self) -> u8 {
        self.speed.get()
    }
}

fn validate_effect_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LedError::Validation("effect name cannot be empty".into()));
    }
    if name.len() > MAX_EFFECT_NAME_LEN {
        return Err(LedError::Validation(format!(
            "effect name longer than {MAX_EFFECT_NAME_LEN} characters: {name}"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(LedError::Validation(format!(
            "effect name contains invalid character {bad:?}: {name}"
        )));
    }
    Ok(())
}

/// What a schedule entry does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleAction {
    PowerOn,
    PowerOff,
}

/// A controller-side timer: fire `action` at `hour:minute` on the given weekdays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScheduleSpec {
    hour: u8,
    minute: u8,
    action: ScheduleAction,
    /// Bit 0 = Monday … bit 6 = Sunday.
    weekdays: u8,
}

impl ScheduleSpec {
    pub fn new(hour: u8, minute: u8, action: ScheduleAction, weekdays: u8) -> Result<Self> {
        if hour > 23 {
            return Err(LedError::Validation(format!("schedule hour {hour} out of range (0-23)")));
        }
        if minute > 59 {
            return Err(LedError::Validation(format!(
                "schedule minute {minute} out of range (0-59)"
            )));
        }
        if weekdays == 0 || weekdays > ALL_WEEKDAYS {
            return Err(LedError::Validation(format!(
                "schedule weekday mask 0b{weekdays:b} must select 1-7 days"
            )));
        }
        Ok(ScheduleSpec {
            hour,
            minute,
            action,
            weekdays,
        })
    }

    /// Every day of the week.
    pub fn daily(hour: u8, minute: u8, action: ScheduleAction) -> Result<Self> {
        Self::new(hour, minute, action, ALL_WEEKDAYS)
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn action(&self) -> ScheduleAction {
        self.action
    }

    pub fn weekdays(&self) -> u8 {
        self.weekdays
    }
}

/// One LED control intent, prior to wire encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Command {
    Power(bool),
    Brightness(Percent),
    Color(Rgb),
    Effect(Effect),
    MusicMode(bool),
    Schedule(ScheduleSpec),
}

impl Command {
    /// Brightness in percent; values above 100 are a validation error.
    pub fn brightness(percent: u8) -> Result<Self> {
        Percent::new(percent)
            .map(Command::Brightness)
            .map_err(|_| {
                LedError::Validation(format!("brightness {percent} out of range (0-100)"))
            })
    }

    /// Color from a `#RRGGBB` / named color string.
    pub fn color_str(s: &str) -> Result<Self> {
        crate::color::parse_color(s).map(Command::Color)
    }

    pub fn effect(name: &str, speed: u8) -> Result<Self> {
        Effect::new(name, speed).map(Command::Effect)
    }

    /// Short name of the command kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Power(_) => "power",
            Command::Brightness(_) => "brightness",
            Command::Color(_) => "color",
            Command::Effect(_) => "effect",
            Command::MusicMode(_) => "music",
            Command::Schedule(_) => "schedule",
        }
    }
}
