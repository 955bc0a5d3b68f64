//! Role-based access control for control operations.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use async_trait::async_trait;

use crate::color::Rgb;
use crate::command::{Effect, Percent};
use crate::control::{Applied, LedControl, Operation};
use crate::error::{LedError, Result};

/// Operations a role may perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionSet {
    All,
    Only(BTreeSet<Operation>),
}

impl PermissionSet {
    pub fn only(ops: impl IntoIterator<Item = Operation>) -> Self {
        PermissionSet::Only(ops.into_iter().collect())
    }

    pub fn allows(&self, op: Operation) -> bool {
        match self {
            PermissionSet::All => true,
            PermissionSet::Only(ops) => ops.contains(&op),
        }
    }
}

/// Role name → permission set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    roles: BTreeMap<String, PermissionSet>,
}

impl Default for AccessPolicy {
    /// `admin` may do anything, `user` the four control operations, `guest`
    /// only toggle power.
    fn default() -> Self {
        AccessPolicy::empty()
            .with_role("admin", PermissionSet::All)
            .with_role("user", PermissionSet::only(Operation::ALL))
            .with_role("guest", PermissionSet::only([Operation::TogglePower]))
    }
}

impl AccessPolicy {
    pub fn empty() -> Self {
        AccessPolicy {
            roles: BTreeMap::new(),
        }
    }

    pub fn with_role(mut self, role: &str, permissions: PermissionSet) -> Self {
        self.roles.insert(role.to_string(), permissions);
        self
    }

    pub fn permissions(&self, role: &str) -> Option<&PermissionSet> {
        self.roles.get(role)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// Unknown roles may do nothing.
    pub fn allows(&self, role: &str, op: Operation) -> bool {
        self.permissions(role).is_some_and(|p| p.allows(op))
    }
}

/// The policy plus the current role. Constructed once and shared by `Rc`
/// between the proxies and whoever switches roles.
#[derive(Debug)]
pub struct AccessControl {
    policy: AccessPolicy,
    role: RefCell<String>,
}

impl AccessControl {
    pub fn new(policy: AccessPolicy, role: &str) -> Result<Self> {
        if !policy.has_role(role) {
            return Err(LedError::Validation(format!("unknown role: {role}")));
        }
        Ok(AccessControl {
            policy,
            role: RefCell::new(role.to_string()),
        })
    }

    pub fn role(&self) -> String {
        self.role.borrow().clone()
    }

    pub fn set_role(&self, role: &str) -> Result<()> {
        if !self.policy.has_role(role) {
            return Err(LedError::Validation(format!("unknown role: {role}")));
        }
        log::info!("access role: {} -> {role}", self.role.borrow());
        *self.role.borrow_mut() = role.to_string();
        Ok(())
    }

    pub fn has_permission(&self, role: &str, op: Operation) -> bool {
        self.policy.allows(role, op)
    }

    /// Check `op` for the current role.
    pub fn check(&self, op: Operation) -> Result<()> {
        let role = self.role();
        if self.has_permission(&role, op) {
            Ok(())
        } else {
            log::warn!("access denied: role '{role}' may not {op}");
            Err(LedError::AccessDenied {
                role,
                operation: op,
            })
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }
}

/// Refuses operations the current role lacks, before the inner controller
/// sees them.
pub struct AccessControlProxy<C> {
    inner: C,
    access: Rc<AccessControl>,
}

impl<C: LedControl> AccessControlProxy<C> {
    pub fn new(inner: C, access: Rc<AccessControl>) -> Self {
        AccessControlProxy { inner, access }
    }
}

#[async_trait(?Send)]
impl<C: LedControl> LedControl for AccessControlProxy<C> {
    fn target(&self) -> &str {
        self.inner.target()
    }

    async fn set_color(&mut self, color: Rgb) -> Result<Applied> {
        self.access.check(Operation::SetColor)?;
        self.inner.set_color(color).await
    }

    async fn set_brightness(&mut self, level: Percent) -> Result<Applied> {
        self.access.check(Operation::SetBrightness)?;
        self.inner.set_brightness(level).await
    }

    async fn toggle_power(&mut self) -> Result<Applied> {
        self.access.check(Operation::TogglePower)?;
        self.inner.toggle_power().await
    }

    async fn set_effect(&mut self, effect: Effect) -> Result<Applied> {
        self.access.check(Operation::SetEffect)?;
        self.inner.set_effect(effect).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::mock::MockControl;

    fn access(role: &str) -> Rc<AccessControl> {
        Rc::new(AccessControl::new(AccessPolicy::default(), role).unwrap())
    }

    #[test]
    fn default_policy_roles() {
        let policy = AccessPolicy::default();
        assert_eq!(policy.roles().collect::<Vec<_>>(), ["admin", "guest", "user"]);
        for op in Operation::ALL {
            assert!(policy.allows("admin", op));
            assert!(policy.allows("user", op));
        }
        assert!(policy.allows("guest", Operation::TogglePower));
        assert!(!policy.allows("guest", Operation::SetColor));
        assert!(!policy.allows("intruder", Operation::TogglePower));
    }

    #[test]
    fn unknown_role_rejected() {
        assert!(AccessControl::new(AccessPolicy::default(), "root").is_err());
        let ac = access("user");
        assert!(ac.set_role("root").is_err());
        assert_eq!(ac.role(), "user");
    }

    #[tokio::test]
    async fn denied_call_never_reaches_inner() {
        let mock = MockControl::new("lamp");
        let mut proxy = AccessControlProxy::new(mock.clone(), access("guest"));

        let err = proxy.set_color(Rgb::RED).await.unwrap_err();
        match err {
            LedError::AccessDenied { role, operation } => {
                assert_eq!(role, "guest");
                assert_eq!(operation, Operation::SetColor);
            }
            other => panic!("expected AccessDenied, got {other:?}"),
        }
        assert_eq!(mock.call_count(), 0);

        proxy.toggle_power().await.unwrap();
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn role_switch_takes_effect_immediately() {
        let ac = access("guest");
        let mock = MockControl::new("lamp");
        let mut proxy = AccessControlProxy::new(mock.clone(), ac.clone());

        assert!(proxy.set_brightness(Percent::new(50).unwrap()).await.is_err());
        ac.set_role("admin").unwrap();
        proxy.set_brightness(Percent::new(50).unwrap()).await.unwrap();
        assert_eq!(mock.call_count(), 1);
    }
}
