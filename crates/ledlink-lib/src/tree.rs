//! Composite LED tree: leaves, groups, rooms and zones.
//!
//! Nodes own their children. A node's parent is found through its
//! [`NodePath`] (child indices from the root), never through a stored
//! back-reference, so the tree cannot contain cycles.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;

use crate::color::Rgb;
use crate::command::{Effect, Percent};
use crate::control::{Applied, Call, LedControl};
use crate::error::{LedError, Result};

/// Last successfully applied state of a leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedState {
    pub power: bool,
    pub brightness: Percent,
    pub color: Rgb,
    pub effect: Option<Effect>,
}

impl Default for LedState {
    fn default() -> Self {
        LedState {
            power: false,
            brightness: Percent::MAX,
            color: Rgb::WHITE,
            effect: None,
        }
    }
}

/// A named room preset. Unset fields are left alone when applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scene {
    pub color: Option<Rgb>,
    pub brightness: Option<Percent>,
    pub effect: Option<Effect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKind {
    Plain,
    Room {
        scenes: BTreeMap<String, Scene>,
    },
    /// Metadata for an external scheduler; no behavior of its own.
    Zone {
        priority: i32,
        schedule: Option<String>,
    },
}

/// Child indices from the root to a node. The root's path is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        NodePath(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Path of the parent node, `None` for the root.
    pub fn parent(&self) -> Option<NodePath> {
        let (_, rest) = self.0.split_last()?;
        Some(NodePath(rest.to_vec()))
    }

    fn child(&self, index: usize) -> NodePath {
        let mut v = self.0.clone();
        v.push(index);
        NodePath(v)
    }
}

pub enum LedComponent {
    Leaf {
        name: String,
        state: LedState,
        controller: Box<dyn LedControl>,
    },
    Group {
        name: String,
        kind: GroupKind,
        children: Vec<LedComponent>,
    },
}

impl std::fmt::Debug for LedComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedComponent::Leaf { name, state, .. } => f
                .debug_struct("Leaf")
                .field("name", name)
                .field("state", state)
                .finish_non_exhaustive(),
            LedComponent::Group {
                name,
                kind,
                children,
            } => f
                .debug_struct("Group")
                .field("name", name)
                .field("kind", kind)
                .field("children", children)
                .finish(),
        }
    }
}

/// Serializable view of a subtree, for display.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<LedState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedError::Validation("component name cannot be empty".into()));
    }
    Ok(name.to_string())
}

impl LedComponent {
    // ── Construction ──

    pub fn leaf(name: &str, controller: impl LedControl + 'static) -> Result<Self> {
        Ok(LedComponent::Leaf {
            name: validate_name(name)?,
            state: LedState::default(),
            controller: Box::new(controller),
        })
    }

    pub fn group(name: &str) -> Result<Self> {
        Self::with_kind(name, GroupKind::Plain)
    }

    pub fn room(name: &str) -> Result<Self> {
        Self::with_kind(
            name,
            GroupKind::Room {
                scenes: BTreeMap::new(),
            },
        )
    }

    pub fn zone(name: &str, priority: i32, schedule: Option<&str>) -> Result<Self> {
        Self::with_kind(
            name,
            GroupKind::Zone {
                priority,
                schedule: schedule.map(str::to_string),
            },
        )
    }

    fn with_kind(name: &str, kind: GroupKind) -> Result<Self> {
        Ok(LedComponent::Group {
            name: validate_name(name)?,
            kind,
            children: Vec::new(),
        })
    }

    /// Builder form of [`add`](Self::add).
    pub fn with_child(mut self, child: LedComponent) -> Result<Self> {
        self.add(child)?;
        Ok(self)
    }

    // ── Inspection ──

    pub fn name(&self) -> &str {
        match self {
            LedComponent::Leaf { name, .. } | LedComponent::Group { name, .. } => name,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, LedComponent::Leaf { .. })
    }

    pub fn state(&self) -> Option<&LedState> {
        match self {
            LedComponent::Leaf { state, .. } => Some(state),
            LedComponent::Group { .. } => None,
        }
    }

    pub fn kind(&self) -> Option<&GroupKind> {
        match self {
            LedComponent::Leaf { .. } => None,
            LedComponent::Group { kind, .. } => Some(kind),
        }
    }

    pub fn children(&self) -> &[LedComponent] {
        match self {
            LedComponent::Leaf { .. } => &[],
            LedComponent::Group { children, .. } => children,
        }
    }

    /// Zone priority, `None` for anything but a zone.
    pub fn priority(&self) -> Option<i32> {
        match self.kind() {
            Some(GroupKind::Zone { priority, .. }) => Some(*priority),
            _ => None,
        }
    }

    /// Zone schedule reference.
    pub fn schedule(&self) -> Option<&str> {
        match self.kind() {
            Some(GroupKind::Zone { schedule, .. }) => schedule.as_deref(),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let kind = match self.kind() {
            None => "leaf",
            Some(GroupKind::Plain) => "group",
            Some(GroupKind::Room { .. }) => "room",
            Some(GroupKind::Zone { .. }) => "zone",
        };
        NodeSnapshot {
            name: self.name().to_string(),
            kind,
            state: self.state().cloned(),
            children: self.children().iter().map(Self::snapshot).collect(),
        }
    }

    // ── Navigation ──

    /// Depth-first search, this node first.
    pub fn find(&self, name: &str) -> Option<&LedComponent> {
        if self.name() == name {
            return Some(self);
        }
        self.children().iter().find_map(|c| c.find(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut LedComponent> {
        if self.name() == name {
            return Some(self);
        }
        match self {
            LedComponent::Leaf { .. } => None,
            LedComponent::Group { children, .. } => {
                children.iter_mut().find_map(|c| c.find_mut(name))
            }
        }
    }

    /// Path to the first node named `name`, in [`find`](Self::find) order.
    pub fn path_of(&self, name: &str) -> Option<NodePath> {
        self.path_from(name, NodePath::root())
    }

    fn path_from(&self, name: &str, here: NodePath) -> Option<NodePath> {
        if self.name() == name {
            return Some(here);
        }
        self.children()
            .iter()
            .enumerate()
            .find_map(|(i, c)| c.path_from(name, here.child(i)))
    }

    pub fn node_at(&self, path: &NodePath) -> Option<&LedComponent> {
        path.indices()
            .iter()
            .try_fold(self, |node, &i| node.children().get(i))
    }

    /// The group directly containing `name`. `None` for the root or an unknown name.
    pub fn parent_of(&self, name: &str) -> Option<&LedComponent> {
        let parent = self.path_of(name)?.parent()?;
        self.node_at(&parent)
    }

    /// All leaves below (or equal to) this node, left to right.
    pub fn get_leaves(&self) -> Vec<&LedComponent> {
        match self {
            LedComponent::Leaf { .. } => vec![self],
            LedComponent::Group { children, .. } => {
                children.iter().flat_map(|c| c.get_leaves()).collect()
            }
        }
    }

    /// Recursive leaf count.
    pub fn get_count(&self) -> usize {
        match self {
            LedComponent::Leaf { .. } => 1,
            LedComponent::Group { children, .. } => children.iter().map(Self::get_count).sum(),
        }
    }

    // ── Mutation ──

    /// Append a child. Only groups take children; sibling names must be unique.
    pub fn add(&mut self, child: LedComponent) -> Result<()> {
        let LedComponent::Group { name, children, .. } = self else {
            return Err(LedError::Validation(format!(
                "cannot add {} to leaf {}",
                child.name(),
                self.name()
            )));
        };
        if children.iter().any(|c| c.name() == child.name()) {
            return Err(LedError::Validation(format!(
                "{name} already has a child named {}",
                child.name()
            )));
        }
        children.push(child);
        Ok(())
    }

    /// Detach the first descendant named `name` and return its subtree.
    pub fn remove(&mut self, name: &str) -> Option<LedComponent> {
        let LedComponent::Group { children, .. } = self else {
            return None;
        };
        if let Some(i) = children.iter().position(|c| c.name() == name) {
            return Some(children.remove(i));
        }
        children.iter_mut().find_map(|c| c.remove(name))
    }

    // ── Rooms ──

    pub fn add_scene(&mut self, scene_name: &str, scene: Scene) -> Result<()> {
        let scene_name = validate_name(scene_name)?;
        match self {
            LedComponent::Group {
                kind: GroupKind::Room { scenes },
                ..
            } => {
                scenes.insert(scene_name, scene);
                Ok(())
            }
            other => Err(LedError::Validation(format!(
                "{} is not a room",
                other.name()
            ))),
        }
    }

    /// The room's presets; empty for anything but a room.
    pub fn scenes(&self) -> BTreeMap<String, Scene> {
        match self.kind() {
            Some(GroupKind::Room { scenes }) => scenes.clone(),
            _ => BTreeMap::new(),
        }
    }

    pub fn scene_names(&self) -> Vec<&str> {
        match self.kind() {
            Some(GroupKind::Room { scenes }) => scenes.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Apply a room preset: color, then brightness, then effect.
    pub async fn apply_scene(&mut self, scene_name: &str) -> Result<Applied> {
        let scene = match self.kind() {
            Some(GroupKind::Room { scenes }) => scenes.get(scene_name).cloned(),
            _ => None,
        }
        .ok_or_else(|| LedError::SceneNotFound(scene_name.to_string()))?;

        log::debug!("{}: applying scene {scene_name}", self.name());
        if let Some(color) = scene.color {
            self.apply(Call::SetColor(color)).await?;
        }
        if let Some(level) = scene.brightness {
            self.apply(Call::SetBrightness(level)).await?;
        }
        if let Some(effect) = scene.effect {
            self.apply(Call::SetEffect(effect)).await?;
        }
        Ok(Applied {
            target: self.name().to_string(),
            leaves: self.get_count(),
            power: None,
        })
    }

    // ── Dispatch ──

    /// Run `call` on this node. Leaves update their state on success; groups
    /// fan out to every child concurrently.
    ///
    /// A group call fails if any child failed, reporting the first error in
    /// child order. Children that succeeded keep their new state.
    pub async fn apply(&mut self, call: Call) -> Result<Applied> {
        match self {
            LedComponent::Leaf {
                name,
                state,
                controller,
            } => {
                let reported = call.clone().invoke(controller.as_mut()).await?;
                let mut applied = Applied::leaf(name);
                match call {
                    Call::SetColor(c) => state.color = c,
                    Call::SetBrightness(p) => state.brightness = p,
                    Call::TogglePower => {
                        state.power = reported.power.unwrap_or(!state.power);
                        applied.power = Some(state.power);
                    }
                    Call::SetEffect(e) => state.effect = Some(e),
                }
                Ok(applied)
            }
            LedComponent::Group { name, children, .. } => {
                let results =
                    join_all(children.iter_mut().map(|c| call.clone().invoke(c))).await;
                let total = results.len();
                let mut applied = Vec::with_capacity(total);
                let mut first_error = None;
                for result in results {
                    match result {
                        Ok(a) => applied.push(a),
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
                if let Some(e) = first_error {
                    log::warn!(
                        "{name}: {call} failed on {} of {total} children",
                        total - applied.len()
                    );
                    return Err(e);
                }
                Ok(Applied::merge(name, &applied))
            }
        }
    }
}

#[async_trait(?Send)]
impl LedControl for LedComponent {
    fn target(&self) -> &str {
        self.name()
    }

    async fn set_color(&mut self, color: Rgb) -> Result<Applied> {
        self.apply(Call::SetColor(color)).await
    }

    async fn set_brightness(&mut self, level: Percent) -> Result<Applied> {
        self.apply(Call::SetBrightness(level)).await
    }

    async fn toggle_power(&mut self) -> Result<Applied> {
        self.apply(Call::TogglePower).await
    }

    async fn set_effect(&mut self, effect: Effect) -> Result<Applied> {
        self.apply(Call::SetEffect(effect)).await
    }
}
