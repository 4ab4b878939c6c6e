//! Action/modifier tree.
//!
//! A profile binds every input channel to one tree of [`Action`] nodes. Leaves
//! produce output (keys, axes, pointer motion), modifiers wrap exactly one child
//! and change how input reaches it, macros run a sequence of children over time.
//!
//! Nodes are immutable and shared through [`ActionRef`]. Whatever a node has to
//! remember between two dispatches (held mode branches, double-click phase,
//! trackball velocity, ...) lives in the mapper's [`RuntimeState`], keyed by the
//! node's address, so a tree can be dropped and rebuilt wholesale on profile swap.
//!
//! # Dispatch surface
//!
//! ```text
//! on_button(pressed)        buttons
//! on_axis(value, what)      triggers, single stick axis
//! on_pair(x, y, what)       stick, pads (both axes together)
//! on_delta(dx, dy, what)    relative motion from trackball/pad tracking
//! on_gyro(pitch, yaw, roll) gyroscope
//! ```

mod dpad;
mod leaf;
mod macros;
mod modifier;
mod registry;
mod runtime;
mod text;

pub use dpad::{DPadAction, Region, Section};
pub use leaf::{
    AxisAction, ButtonAction, GyroAction, InvalidAction, MouseAction, MultiAction, NoAction,
    TriggerAction, TriggerRange, XYAction,
};
pub use macros::{Macro, PressAction, PressKind, SleepAction};
pub use modifier::{
    BallModifier, ClickModifier, DeadzoneModifier, DoubleClickModifier, FeedbackModifier,
    ModeModifier, NameModifier, OsdModifier, RotateModifier, SensitivityModifier,
    SmoothModifier,
};
pub use registry::{build_action, is_action_name, Param};
pub use runtime::{NodeKey, RuntimeState};
pub use text::{format_number, quote_string, TextWriter};

use crate::controller::Source;
use crate::mapper::Mapper;
use crate::output::HapticData;
use std::fmt;
use std::rc::Rc;

/// Shared, immutable handle to a tree node
pub type ActionRef = Rc<Action>;

/// Behavior every node kind provides. Dispatch defaults to doing nothing, so a
/// kind only spells out the channels it reacts to.
pub trait Node: fmt::Debug {
    fn on_button(&self, _this: &ActionRef, _m: &mut Mapper, _pressed: bool) {}

    fn on_axis(&self, _this: &ActionRef, _m: &mut Mapper, _value: f64, _what: Source) {}

    fn on_pair(&self, _this: &ActionRef, _m: &mut Mapper, _x: f64, _y: f64, _what: Source) {}

    fn on_delta(&self, _this: &ActionRef, _m: &mut Mapper, _dx: f64, _dy: f64, _what: Source) {}

    fn on_gyro(&self, _this: &ActionRef, _m: &mut Mapper, _pitch: f64, _yaw: f64, _roll: f64) {}

    /// Writes text the parser turns back into an equivalent node
    fn write_text(&self, w: &mut TextWriter);

    fn describe(&self) -> String;

    fn children(&self) -> Vec<&ActionRef> {
        Vec::new()
    }

    fn compress(&self, this: &ActionRef) -> ActionRef {
        this.clone()
    }

    /// Copy of this subtree with the haptic request stored in its leaves
    fn with_haptic(&self, this: &ActionRef, _haptic: HapticData) -> ActionRef {
        this.clone()
    }

    fn haptic(&self) -> Option<HapticData> {
        None
    }
}

/// Every node kind the expression language can build
#[derive(Debug, Clone)]
pub enum Action {
    None,
    Invalid(InvalidAction),
    Button(ButtonAction),
    Axis(AxisAction),
    Mouse(MouseAction),
    XY(XYAction),
    DPad(DPadAction),
    Trigger(TriggerAction),
    Gyro(GyroAction),
    Multi(MultiAction),
    Macro(Macro),
    Sleep(SleepAction),
    Press(PressAction),
    Sensitivity(SensitivityModifier),
    Deadzone(DeadzoneModifier),
    Smooth(SmoothModifier),
    Feedback(FeedbackModifier),
    Mode(ModeModifier),
    Click(ClickModifier),
    Rotate(RotateModifier),
    DoubleClick(DoubleClickModifier),
    Ball(BallModifier),
    Osd(OsdModifier),
    Name(NameModifier),
}

static NO_ACTION: NoAction = NoAction;

thread_local! {
    static NONE: ActionRef = Rc::new(Action::None);
}

/// The shared no-op node
pub fn none() -> ActionRef {
    NONE.with(Rc::clone)
}

impl Action {
    pub fn node(&self) -> &dyn Node {
        match self {
            Action::None => &NO_ACTION,
            Action::Invalid(a) => a,
            Action::Button(a) => a,
            Action::Axis(a) => a,
            Action::Mouse(a) => a,
            Action::XY(a) => a,
            Action::DPad(a) => a,
            Action::Trigger(a) => a,
            Action::Gyro(a) => a,
            Action::Multi(a) => a,
            Action::Macro(a) => a,
            Action::Sleep(a) => a,
            Action::Press(a) => a,
            Action::Sensitivity(a) => a,
            Action::Deadzone(a) => a,
            Action::Smooth(a) => a,
            Action::Feedback(a) => a,
            Action::Mode(a) => a,
            Action::Click(a) => a,
            Action::Rotate(a) => a,
            Action::DoubleClick(a) => a,
            Action::Ball(a) => a,
            Action::Osd(a) => a,
            Action::Name(a) => a,
        }
    }

    pub fn into_ref(self) -> ActionRef {
        Rc::new(self)
    }

    pub fn on_button(self: &Rc<Self>, m: &mut Mapper, pressed: bool) {
        self.node().on_button(self, m, pressed);
    }

    pub fn on_axis(self: &Rc<Self>, m: &mut Mapper, value: f64, what: Source) {
        self.node().on_axis(self, m, value, what);
    }

    pub fn on_pair(self: &Rc<Self>, m: &mut Mapper, x: f64, y: f64, what: Source) {
        self.node().on_pair(self, m, x, y, what);
    }

    pub fn on_delta(self: &Rc<Self>, m: &mut Mapper, dx: f64, dy: f64, what: Source) {
        self.node().on_delta(self, m, dx, dy, what);
    }

    pub fn on_gyro(self: &Rc<Self>, m: &mut Mapper, pitch: f64, yaw: f64, roll: f64) {
        self.node().on_gyro(self, m, pitch, yaw, roll);
    }

    pub fn describe(&self) -> String {
        self.node().describe()
    }

    /// Multi-line text form; parses back to the same tree as the one-line form
    pub fn to_string_multiline(&self) -> String {
        let mut w = TextWriter::new(true);
        w.action(self);
        w.finish()
    }

    /// Semantically equivalent tree without redundant wrappers
    pub fn compress(self: &Rc<Self>) -> ActionRef {
        self.node().compress(self)
    }

    pub fn with_haptic(self: &Rc<Self>, haptic: HapticData) -> ActionRef {
        self.node().with_haptic(self, haptic)
    }

    pub fn haptic(&self) -> Option<HapticData> {
        self.node().haptic()
    }

    pub fn children(&self) -> Vec<&ActionRef> {
        self.node().children()
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Action::None)
    }

    /// False when an invalid sentinel sits anywhere in the tree
    pub fn is_valid(&self) -> bool {
        match self {
            Action::Invalid(_) => false,
            _ => self.children().iter().all(|c| c.is_valid()),
        }
    }

    /// First parse error stored in the tree, if any
    pub fn invalid_reason(&self) -> Option<String> {
        match self {
            Action::Invalid(a) => Some(a.error.clone()),
            _ => self.children().iter().find_map(|c| c.invalid_reason()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut w = TextWriter::new(false);
        w.action(self);
        f.write_str(&w.finish())
    }
}

/// Runtime key of a node, derived from its address inside the shared tree
pub(crate) fn node_key(this: &ActionRef) -> NodeKey {
    NodeKey::of(this)
}
