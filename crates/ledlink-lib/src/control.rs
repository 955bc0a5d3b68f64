//! The LED control interface shared by tree nodes, proxies and the real
//! device controller.
//!
//! Arguments are already-validated value types ([`Rgb`], [`Percent`],
//! [`Effect`]); raw user input is parsed at the surface before it gets here.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::command::{Command, Effect, Percent, ScheduleSpec};
use crate::connection::ConnectionManager;
use crate::error::{LedError, Result};

// ── Operations and calls ──

/// The four user-facing control operations. Access policies grant these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    SetColor,
    SetBrightness,
    TogglePower,
    SetEffect,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::SetColor,
        Operation::SetBrightness,
        Operation::TogglePower,
        Operation::SetEffect,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::SetColor => "set_color",
            Operation::SetBrightness => "set_brightness",
            Operation::TogglePower => "toggle_power",
            Operation::SetEffect => "set_effect",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = LedError;

    fn from_str(s: &str) -> Result<Self> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| LedError::Validation(format!("unknown operation: {s}")))
    }
}

/// One operation together with its arguments. Used as the cache key and as
/// the record of what a proxy forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    SetColor(Rgb),
    SetBrightness(Percent),
    TogglePower,
    SetEffect(Effect),
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::SetColor(_) => Operation::SetColor,
            Call::SetBrightness(_) => Operation::SetBrightness,
            Call::TogglePower => Operation::TogglePower,
            Call::SetEffect(_) => Operation::SetEffect,
        }
    }

    /// Arguments rendered for logs (`#FF0000`, `75`, `rainbow@50`, empty).
    pub fn args(&self) -> String {
        match self {
            Call::SetColor(c) => c.to_hex(),
            Call::SetBrightness(p) => p.get().to_string(),
            Call::TogglePower => String::new(),
            Call::SetEffect(e) => format!("{}@{}", e.name(), e.speed()),
        }
    }

    /// Forward this call to `control`.
    pub async fn invoke(self, control: &mut (dyn LedControl + '_)) -> Result<Applied> {
        match self {
            Call::SetColor(c) => control.set_color(c).await,
            Call::SetBrightness(p) => control.set_brightness(p).await,
            Call::TogglePower => control.toggle_power().await,
            Call::SetEffect(e) => control.set_effect(e).await,
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self.args();
        if args.is_empty() {
            write!(f, "{}()", self.operation())
        } else {
            write!(f, "{}({args})", self.operation())
        }
    }
}

/// What a successful operation touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Applied {
    /// Name of the node the call was made on.
    pub target: String,
    /// Number of leaf endpoints the call reached.
    pub leaves: usize,
    /// Power state after a `toggle_power`, when it is the same everywhere.
    pub power: Option<bool>,
}

impl Applied {
    pub fn leaf(target: &str) -> Self {
        Applied {
            target: target.to_string(),
            leaves: 1,
            power: None,
        }
    }

    /// Combine the results of a fan-out into one result for `target`.
    pub fn merge(target: &str, parts: &[Applied]) -> Self {
        let mut power = parts.first().and_then(|p| p.power);
        if parts.iter().any(|p| p.power != power) {
            power = None;
        }
        Applied {
            target: target.to_string(),
            leaves: parts.iter().map(|p| p.leaves).sum(),
            power,
        }
    }
}

// ── Control trait ──

/// Something that can be told to change its LEDs.
#[async_trait(?Send)]
pub trait LedControl {
    /// Name of the controlled node.
    fn target(&self) -> &str;
    async fn set_color(&mut self, color: Rgb) -> Result<Applied>;
    async fn set_brightness(&mut self, level: Percent) -> Result<Applied>;
    async fn toggle_power(&mut self) -> Result<Applied>;
    async fn set_effect(&mut self, effect: Effect) -> Result<Applied>;
}

#[async_trait(?Send)]
impl<C: LedControl + ?Sized> LedControl for Box<C> {
    fn target(&self) -> &str {
        (**self).target()
    }

    async fn set_color(&mut self, color: Rgb) -> Result<Applied> {
        (**self).set_color(color).await
    }

    async fn set_brightness(&mut self, level: Percent) -> Result<Applied> {
        (**self).set_brightness(level).await
    }

    async fn toggle_power(&mut self) -> Result<Applied> {
        (**self).toggle_power().await
    }

    async fn set_effect(&mut self, effect: Effect) -> Result<Applied> {
        (**self).set_effect(effect).await
    }
}

// ── Real controller ──

/// Drives the connected controller: encodes each call as a [`Command`] and
/// sends it through the [`ConnectionManager`].
///
/// Power is tracked locally so `toggle_power` knows which frame to send; it
/// starts off.
pub struct DeviceController {
    name: String,
    connection: Rc<ConnectionManager>,
    powered: bool,
}

impl DeviceController {
    pub fn new(name: &str, connection: Rc<ConnectionManager>) -> Self {
        DeviceController {
            name: name.to_string(),
            connection,
            powered: false,
        }
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Switch power to an explicit state.
    pub async fn set_power(&mut self, on: bool) -> Result<Applied> {
        self.connection.send_command(&Command::Power(on)).await?;
        self.powered = on;
        Ok(Applied {
            power: Some(on),
            ..Applied::leaf(&self.name)
        })
    }

    pub async fn set_music_mode(&mut self, on: bool) -> Result<Applied> {
        self.connection.send_command(&Command::MusicMode(on)).await?;
        Ok(Applied::leaf(&self.name))
    }

    /// Program a controller-side timer.
    pub async fn schedule(&mut self, spec: ScheduleSpec) -> Result<Applied> {
        self.connection.send_command(&Command::Schedule(spec)).await?;
        Ok(Applied::leaf(&self.name))
    }
}

#[async_trait(?Send)]
impl LedControl for DeviceController {
    fn target(&self) -> &str {
        &self.name
    }

    async fn set_color(&mut self, color: Rgb) -> Result<Applied> {
        self.connection.send_command(&Command::Color(color)).await?;
        Ok(Applied::leaf(&self.name))
    }

    async fn set_brightness(&mut self, level: Percent) -> Result<Applied> {
        self.connection
            .send_command(&Command::Brightness(level))
            .await?;
        Ok(Applied::leaf(&self.name))
    }

    async fn toggle_power(&mut self) -> Result<Applied> {
        let next = !self.powered;
        self.set_power(next).await
    }

    async fn set_effect(&mut self, effect: Effect) -> Result<Applied> {
        self.connection.send_command(&Command::Effect(effect)).await?;
        Ok(Applied::leaf(&self.name))
    }
}

// ── Mock implementation ──

pub mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Controller that records every call and can be told to fail.
    ///
    /// Clones share the call log and failure switch, so a test keeps one
    /// clone and hands the other to the code under test.
    #[derive(Clone, Default)]
    pub struct MockControl {
        pub name: String,
        pub calls: Rc<RefCell<Vec<Call>>>,
        pub fail: Rc<Cell<bool>>,
        pub powered: Rc<Cell<bool>>,
    }

    impl MockControl {
        pub fn new(name: &str) -> Self {
            MockControl {
                name: name.to_string(),
                ..Default::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }

        fn record(&self, call: Call) -> Result<Applied> {
            if self.fail.get() {
                return Err(LedError::Command(format!("mock: {} failed", self.name)));
            }
            self.calls.borrow_mut().push(call);
            Ok(Applied::leaf(&self.name))
        }
    }

    #[async_trait(?Send)]
    impl LedControl for MockControl {
        fn target(&self) -> &str {
            &self.name
        }

        async fn set_color(&mut self, color: Rgb) -> Result<Applied> {
            self.record(Call::SetColor(color))
        }

        async fn set_brightness(&mut self, level: Percent) -> Result<Applied> {
            self.record(Call::SetBrightness(level))
        }

        async fn toggle_power(&mut self) -> Result<Applied> {
            let mut applied = self.record(Call::TogglePower)?;
            let next = !self.powered.get();
            self.powered.set(next);
            applied.power = Some(next);
            Ok(applied)
        }

        async fn set_effect(&mut self, effect: Effect) -> Result<Applied> {
            self.record(Call::SetEffect(effect))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockControl;
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::transport::mock::{MockPermissions, MockTransport};

    fn connected(t: &Rc<MockTransport>) -> Rc<ConnectionManager> {
        Rc::new(ConnectionManager::new(
            t.clone(),
            Rc::new(MockPermissions::granting()),
            RetryPolicy::immediate(1),
        ))
    }

    #[test]
    fn operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("reboot".parse::<Operation>().is_err());
        assert_eq!(
            serde_json::to_string(&Operation::TogglePower).unwrap(),
            r#""toggle_power""#
        );
    }

    #[test]
    fn call_display() {
        assert_eq!(Call::SetColor(Rgb::RED).to_string(), "set_color(#FF0000)");
        assert_eq!(Call::TogglePower.to_string(), "toggle_power()");
        let e = Effect::new("rainbow", 50).unwrap();
        assert_eq!(Call::SetEffect(e).args(), "rainbow@50");
    }

    #[test]
    fn merge_sums_leaves_and_agrees_on_power() {
        let on = Applied {
            power: Some(true),
            ..Applied::leaf("a")
        };
        let off = Applied {
            power: Some(false),
            ..Applied::leaf("b")
        };
        let m = Applied::merge("room", &[on.clone(), on.clone()]);
        assert_eq!(m.leaves, 2);
        assert_eq!(m.power, Some(true));
        assert_eq!(Applied::merge("room", &[on, off]).power, None);
        assert_eq!(Applied::merge("empty", &[]).leaves, 0);
    }

    #[tokio::test]
    async fn invoke_routes_to_matching_method() {
        let mock = MockControl::new("lamp");
        let mut control = mock.clone();
        Call::SetBrightness(Percent::new(40).unwrap())
            .invoke(&mut control)
            .await
            .unwrap();
        assert_eq!(
            *mock.calls.borrow(),
            vec![Call::SetBrightness(Percent::new(40).unwrap())]
        );
    }

    #[tokio::test]
    async fn device_controller_sends_frames() {
        let t = Rc::new(MockTransport::new());
        let conn = connected(&t);
        conn.connect("dev").await.unwrap();
        let mut ctl = DeviceController::new("desk", conn);

        ctl.set_color(Rgb::RED).await.unwrap();
        ctl.set_brightness(Percent::new(75).unwrap()).await.unwrap();
        let applied = ctl.toggle_power().await.unwrap();
        assert_eq!(applied.power, Some(true));
        ctl.toggle_power().await.unwrap();
        ctl.set_effect(Effect::new("rainbow", 50).unwrap())
            .await
            .unwrap();
        ctl.set_music_mode(true).await.unwrap();

        assert_eq!(
            t.frames(),
            vec![
                "COLOR:255,0,0\n",
                "BRIGHTNESS:191\n",
                "POWER:1\n",
                "POWER:0\n",
                "EFFECT:rainbow:50\n",
                "MUSIC:1\n",
            ]
        );
        assert!(!ctl.is_powered());
    }

    #[tokio::test]
    async fn device_controller_keeps_power_on_failed_toggle() {
        let t = Rc::new(MockTransport::new());
        let mut ctl = DeviceController::new("desk", connected(&t));
        let err = ctl.toggle_power().await.unwrap_err();
        assert!(matches!(err, LedError::Command(_)));
        assert!(!ctl.is_powered());
    }
}
