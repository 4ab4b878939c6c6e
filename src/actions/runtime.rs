use super::dpad::DPadState;
use super::leaf::{ButtonState, MouseState, TriggerState};
use super::macros::MacroState;
use super::modifier::{BallState, DoubleClickState, ModeState, SmoothState};
use super::ActionRef;
use std::collections::HashMap;
use std::rc::Rc;

/// Identity of a node inside the active tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(usize);

impl NodeKey {
    pub fn of(action: &ActionRef) -> Self {
        Self(Rc::as_ptr(action) as usize)
    }
}

/// Mutable per-node state of the active profile, one table per node kind.
///
/// Entries are created on first dispatch and dropped together when the
/// profile changes.
#[derive(Debug, Default)]
pub struct RuntimeState {
    pub(crate) buttons: HashMap<NodeKey, ButtonState>,
    pub(crate) mice: HashMap<NodeKey, MouseState>,
    pub(crate) dpads: HashMap<NodeKey, DPadState>,
    pub(crate) triggers: HashMap<NodeKey, TriggerState>,
    pub(crate) macros: HashMap<NodeKey, MacroState>,
    pub(crate) modes: HashMap<NodeKey, ModeState>,
    pub(crate) doubleclicks: HashMap<NodeKey, DoubleClickState>,
    pub(crate) balls: HashMap<NodeKey, BallState>,
    pub(crate) smooths: HashMap<NodeKey, SmoothState>,
}

impl RuntimeState {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Number of nodes currently carrying state
    pub fn len(&self) -> usize {
        self.buttons.len()
            + self.mice.len()
            + self.dpads.len()
            + self.triggers.len()
            + self.macros.len()
            + self.modes.len()
            + self.doubleclicks.len()
            + self.balls.len()
            + self.smooths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
