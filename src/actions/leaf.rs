use super::{node_key, none, Action, ActionRef, Node, TextWriter};
use crate::constants::{Axes, Keys, Rels};
use crate::controller::{Source, STICK_PAD_MAX, TRIGGER_CLICK, TRIGGER_MAX};
use crate::mapper::Mapper;
use crate::output::HapticData;

/// Stick/pad deflection that counts as a press for `button(...)`
pub const STICK_BUTTON_THRESHOLD: f64 = STICK_PAD_MAX as f64 / 2.0;
/// Pixels per raw pad unit when a pad drives the pointer
pub const PAD_MOUSE_SCALE: f64 = 0.005;
/// Pixels per update at full stick deflection
pub const STICK_MOUSE_SPEED: f64 = 10.0;
/// Pixels per raw gyro unit
pub const GYRO_MOUSE_SCALE: f64 = 0.01;
/// Pointer travel converted into one wheel detent
pub const WHEEL_PIXELS: f64 = 20.0;
/// Pointer travel between two haptic ticks
pub const HAPTIC_DISTANCE: f64 = 40.0;

#[derive(Debug)]
pub struct NoAction;

impl Node for NoAction {
    fn write_text(&self, w: &mut TextWriter) {
        w.push("None");
    }

    fn describe(&self) -> String {
        "(not set)".to_owned()
    }
}

/// Sentinel for text that failed to parse. Keeps the text so a profile
/// round-trips unchanged; never produces output.
#[derive(Debug, Clone)]
pub struct InvalidAction {
    pub text: String,
    pub error: String,
}

impl InvalidAction {
    pub fn new(text: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: error.into(),
        }
    }
}

impl Node for InvalidAction {
    fn write_text(&self, w: &mut TextWriter) {
        w.push(&self.text);
    }

    fn describe(&self) -> String {
        format!("Invalid: {}", self.error)
    }
}

#[derive(Debug, Default)]
pub(crate) struct ButtonState {
    pressed: Option<Keys>,
}

/// `button(KEY[, KEY2])`
///
/// Presses `key` for buttons. On a single stick axis the negative side
/// presses `key` and the positive side `key2` (falling back to `key`).
#[derive(Debug, Clone)]
pub struct ButtonAction {
    pub key: Keys,
    pub key2: Option<Keys>,
    pub haptic: Option<HapticData>,
}

impl ButtonAction {
    pub fn new(key: Keys, key2: Option<Keys>) -> Self {
        Self {
            key,
            key2,
            haptic: None,
        }
    }

    fn set_pressed(&self, this: &ActionRef, m: &mut Mapper, key: Option<Keys>) {
        let state = m.runtime.buttons.entry(node_key(this)).or_default();
        let old = state.pressed;
        if old == key {
            return;
        }
        state.pressed = key;
        if let Some(old) = old {
            m.release_key(old);
        }
        if let Some(new) = key {
            m.press_key(new);
            if let Some(haptic) = self.haptic {
                m.feedback(haptic);
            }
        }
    }
}

impl Node for ButtonAction {
    fn on_button(&self, this: &ActionRef, m: &mut Mapper, pressed: bool) {
        self.set_pressed(this, m, pressed.then_some(self.key));
    }

    fn on_axis(&self, this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        let key = if what.is_trigger() {
            (value >= TRIGGER_CLICK as f64).then_some(self.key)
        } else if value <= -STICK_BUTTON_THRESHOLD {
            Some(self.key)
        } else if value >= STICK_BUTTON_THRESHOLD {
            Some(self.key2.unwrap_or(self.key))
        } else {
            None
        };
        self.set_pressed(this, m, key);
    }

    fn on_pair(&self, this: &ActionRef, m: &mut Mapper, x: f64, y: f64, _what: Source) {
        let pressed = x.hypot(y) >= STICK_BUTTON_THRESHOLD;
        self.set_pressed(this, m, pressed.then_some(self.key));
    }

    fn write_text(&self, w: &mut TextWriter) {
        w.open("button");
        w.push(&self.key.to_string());
        if let Some(key2) = self.key2 {
            w.sep();
            w.push(&key2.to_string());
        }
        w.close();
    }

    fn describe(&self) -> String {
        match self.key2 {
            Some(key2) => format!("{} / {}", self.key.label(), key2.label()),
            None => self.key.label(),
        }
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Button(Self {
            haptic: Some(haptic),
            ..self.clone()
        })
        .into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.haptic
    }
}

/// `axis(AXIS[, min, max])` and its reversed twin `raxis(...)`
#[derive(Debug, Clone)]
pub struct AxisAction {
    pub axis: Axes,
    pub range: Option<(i32, i32)>,
    pub reversed: bool,
    pub haptic: Option<HapticData>,
}

impl AxisAction {
    pub fn new(axis: Axes, range: Option<(i32, i32)>, reversed: bool) -> Self {
        Self {
            axis,
            range,
            reversed,
            haptic: None,
        }
    }

    /// Output bounds, the axis' natural range unless overridden
    pub fn bounds(&self) -> (i32, i32) {
        self.range.unwrap_or_else(|| self.axis.range())
    }

    /// Maps a position in `0.0..=1.0` onto the output bounds
    fn emit(&self, m: &mut Mapper, position: f64) {
        let position = if self.reversed { 1.0 - position } else { position };
        let (min, max) = self.bounds();
        let value = min as f64 + position.clamp(0.0, 1.0) * (max - min) as f64;
        m.set_axis(self.axis, value.round() as i32);
    }
}

impl Node for AxisAction {
    fn on_button(&self, _this: &ActionRef, m: &mut Mapper, pressed: bool) {
        let (min, max) = self.bounds();
        let value = if pressed {
            if self.reversed {
                min
            } else {
                max
            }
        } else {
            0.clamp(min.min(max), min.max(max))
        };
        m.set_axis(self.axis, value);
        if pressed {
            if let Some(haptic) = self.haptic {
                m.feedback(haptic);
            }
        }
    }

    fn on_axis(&self, _this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        let position = if what.is_trigger() {
            value / TRIGGER_MAX as f64
        } else {
            ((value / STICK_PAD_MAX as f64).clamp(-1.0, 1.0) + 1.0) / 2.0
        };
        self.emit(m, position);
    }

    fn write_text(&self, w: &mut TextWriter) {
        w.open(if self.reversed { "raxis" } else { "axis" });
        w.push(&self.axis.to_string());
        if let Some((min, max)) = self.range {
            w.sep();
            w.number(min as f64);
            w.sep();
            w.number(max as f64);
        }
        w.close();
    }

    fn describe(&self) -> String {
        if self.reversed {
            format!("{} (reversed)", self.axis.label())
        } else {
            self.axis.label().to_owned()
        }
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Axis(Self {
            haptic: Some(haptic),
            ..self.clone()
        })
        .into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.haptic
    }
}

#[derive(Debug, Default)]
pub(crate) struct MouseState {
    last: Option<(f64, f64)>,
    travelled: f64,
}

/// `mouse([REL][, speed])`
///
/// Pads move the pointer by finger travel, the stick moves it continuously
/// while deflected, wheel axes scroll.
#[derive(Debug, Clone)]
pub struct MouseAction {
    pub axis: Option<Rels>,
    pub speed: f64,
    pub haptic: Option<HapticData>,
}

impl MouseAction {
    pub fn new(axis: Option<Rels>, speed: f64) -> Self {
        Self {
            axis,
            speed,
            haptic: None,
        }
    }

    fn tick_haptic(&self, this: &ActionRef, m: &mut Mapper, distance: f64) {
        let Some(haptic) = self.haptic else {
            return;
        };
        let state = m.runtime.mice.entry(node_key(this)).or_default();
        state.travelled += distance;
        if state.travelled >= HAPTIC_DISTANCE {
            state.travelled %= HAPTIC_DISTANCE;
            m.feedback(haptic);
        }
    }
}

impl Node for MouseAction {
    fn on_axis(&self, this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        let full = if what.is_trigger() {
            TRIGGER_MAX as f64
        } else {
            STICK_PAD_MAX as f64
        };
        let d = value / full * STICK_MOUSE_SPEED;
        if d == 0.0 {
            return;
        }
        match self.axis {
            Some(Rels::REL_Y) | Some(Rels::REL_WHEEL) => self.on_delta(this, m, 0.0, -d, what),
            _ => self.on_delta(this, m, d, 0.0, what),
        }
        m.force_event(what);
    }

    fn on_pair(&self, this: &ActionRef, m: &mut Mapper, x: f64, y: f64, what: Source) {
        if what.is_pad() {
            let touched = m.is_touched(what);
            let state = m.runtime.mice.entry(node_key(this)).or_default();
            let last = state.last;
            state.last = touched.then_some((x, y));
            if let (true, Some((lx, ly))) = (touched, last) {
                let dx = (x - lx) * PAD_MOUSE_SCALE;
                let dy = -(y - ly) * PAD_MOUSE_SCALE;
                self.on_delta(this, m, dx, dy, what);
            }
        } else if x != 0.0 || y != 0.0 {
            let dx = x / STICK_PAD_MAX as f64 * STICK_MOUSE_SPEED;
            let dy = -y / STICK_PAD_MAX as f64 * STICK_MOUSE_SPEED;
            self.on_delta(this, m, dx, dy, what);
            m.force_event(what);
        }
    }

    fn on_delta(&self, this: &ActionRef, m: &mut Mapper, dx: f64, dy: f64, _what: Source) {
        let (dx, dy) = (dx * self.speed, dy * self.speed);
        match self.axis {
            None => m.move_mouse(dx, dy),
            Some(Rels::REL_X) => m.move_mouse(dx, 0.0),
            Some(Rels::REL_Y) => m.move_mouse(0.0, dy),
            Some(Rels::REL_HWHEEL) => m.scroll(dx / WHEEL_PIXELS, 0.0),
            Some(Rels::REL_WHEEL) => m.scroll(0.0, -dy / WHEEL_PIXELS),
        }
        self.tick_haptic(this, m, dx.hypot(dy));
    }

    fn on_gyro(&self, this: &ActionRef, m: &mut Mapper, pitch: f64, yaw: f64, _roll: f64) {
        let dx = -yaw * GYRO_MOUSE_SCALE;
        let dy = -pitch * GYRO_MOUSE_SCALE;
        self.on_delta(this, m, dx, dy, Source::Gyro);
    }

    fn write_text(&self, w: &mut TextWriter) {
        w.open("mouse");
        if let Some(axis) = self.axis {
            w.push(&axis.to_string());
            if self.speed != 1.0 {
                w.sep();
            }
        }
        if self.speed != 1.0 {
            w.number(self.speed);
        }
        w.close();
    }

    fn describe(&self) -> String {
        match self.axis {
            None => "Mouse".to_owned(),
            Some(Rels::REL_X) => "Mouse X".to_owned(),
            Some(Rels::REL_Y) => "Mouse Y".to_owned(),
            Some(Rels::REL_WHEEL) => "Wheel".to_owned(),
            Some(Rels::REL_HWHEEL) => "Horizontal Wheel".to_owned(),
        }
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Mouse(Self {
            haptic: Some(haptic),
            ..self.clone()
        })
        .into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.haptic
    }
}

/// `XY(x, y)` splits a two-axis input between two children
#[derive(Debug, Clone)]
pub struct XYAction {
    pub x: ActionRef,
    pub y: ActionRef,
}

impl XYAction {
    pub fn new(x: ActionRef, y: ActionRef) -> Self {
        Self { x, y }
    }
}

impl Node for XYAction {
    fn on_button(&self, _this: &ActionRef, m: &mut Mapper, pressed: bool) {
        self.x.on_button(m, pressed);
    }

    fn on_axis(&self, _this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        self.x.on_axis(m, value, what);
    }

    fn on_pair(&self, _this: &ActionRef, m: &mut Mapper, x: f64, y: f64, what: Source) {
        self.x.on_axis(m, x, what);
        self.y.on_axis(m, y, what);
    }

    fn on_delta(&self, _this: &ActionRef, m: &mut Mapper, dx: f64, dy: f64, what: Source) {
        self.x.on_delta(m, dx, 0.0, what);
        self.y.on_delta(m, 0.0, dy, what);
    }

    fn write_text(&self, w: &mut TextWriter) {
        w.open("XY");
        w.action(&self.x);
        w.sep();
        w.action(&self.y);
        w.close();
    }

    fn describe(&self) -> String {
        match (&*self.x, &*self.y) {
            (Action::Mouse(_), Action::Mouse(_)) => "Mouse".to_owned(),
            (Action::Axis(x), Action::Axis(_)) => match x.axis {
                Axes::ABS_X | Axes::ABS_Y => "LStick".to_owned(),
                Axes::ABS_RX | Axes::ABS_RY => "RStick".to_owned(),
                _ => format!("{} / {}", self.x.describe(), self.y.describe()),
            },
            _ => format!("{} / {}", self.x.describe(), self.y.describe()),
        }
    }

    fn children(&self) -> Vec<&ActionRef> {
        vec![&self.x, &self.y]
    }

    fn compress(&self, _this: &ActionRef) -> ActionRef {
        Action::XY(Self::new(self.x.compress(), self.y.compress())).into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::XY(Self::new(
            self.x.with_haptic(haptic),
            self.y.with_haptic(haptic),
        ))
        .into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.x.haptic().or_else(|| self.y.haptic())
    }
}

#[derive(Debug, Default)]
pub(crate) struct TriggerState {
    pressed: bool,
}

/// `trigger(press[, release], action)`
///
/// With `release >= press` the child is held while the trigger sits inside
/// `press..=release`. The range has no memory: leaving it at either end
/// releases the child and coming back into it presses again, so a stage
/// capped below the full-press level hands over to the full stage and takes
/// over again on the way down. With `release < press` the child is pressed at
/// `press` and held until the trigger drops below `release`.
#[derive(Debug, Clone)]
pub struct TriggerAction {
    pub press_level: i32,
    pub release_level: Option<i32>,
    pub child: ActionRef,
    pub haptic: Option<HapticData>,
}

/// One stage of a split trigger binding
#[derive(Debug, Clone)]
pub struct TriggerRange {
    pub press: i32,
    pub release: Option<i32>,
    pub action: ActionRef,
}

impl TriggerAction {
    pub fn new(press_level: i32, release_level: Option<i32>, child: ActionRef) -> Self {
        Self {
            press_level,
            release_level,
            child,
            haptic: None,
        }
    }

    /// Builds the usual half-press / full-press / analog trigger binding.
    ///
    /// Unless `release_partially` is set the half-press stage ends where the
    /// full-press stage begins, so only one of them is held at a time.
    pub fn split(
        half: Option<TriggerRange>,
        full: Option<TriggerRange>,
        analog: Option<ActionRef>,
        release_partially: bool,
    ) -> ActionRef {
        let mut parts = Vec::new();
        if let Some(mut half) = half {
            if let (false, Some(full)) = (release_partially, &full) {
                let upper = half.release.unwrap_or(TRIGGER_MAX);
                half.release = Some(upper.min(full.press - 1));
            }
            parts.push(Action::Trigger(Self::new(half.press, half.release, half.action)).into_ref());
        }
        if let Some(full) = full {
            parts.push(Action::Trigger(Self::new(full.press, full.release, full.action)).into_ref());
        }
        if let Some(analog) = analog {
            parts.push(analog);
        }
        match parts.len() {
            0 => none(),
            1 => parts.remove(0),
            _ => Action::Multi(MultiAction::new(parts)).into_ref(),
        }
    }

    fn is_active(&self, value: f64, pressed: bool) -> bool {
        let press = self.press_level as f64;
        let release = self.release_level.unwrap_or(TRIGGER_MAX) as f64;
        if release >= press {
            value >= press && value <= release
        } else if pressed {
            value >= release
        } else {
            value >= press
        }
    }
}

impl Node for TriggerAction {
    fn on_button(&self, _this: &ActionRef, m: &mut Mapper, pressed: bool) {
        self.child.on_button(m, pressed);
    }

    fn on_axis(&self, this: &ActionRef, m: &mut Mapper, value: f64, _what: Source) {
        let state = m.runtime.triggers.entry(node_key(this)).or_default();
        let was = state.pressed;
        let now = self.is_active(value, was);
        if now == was {
            return;
        }
        state.pressed = now;
        self.child.on_button(m, now);
        if now {
            if let Some(haptic) = self.haptic {
                m.feedback(haptic);
            }
        }
    }

    fn write_text(&self, w: &mut TextWriter) {
        w.open("trigger");
        w.number(self.press_level as f64);
        if let Some(release) = self.release_level {
            w.sep();
            w.number(release as f64);
        }
        w.sep();
        w.action(&self.child);
        w.close();
    }

    fn describe(&self) -> String {
        self.child.describe()
    }

    fn children(&self) -> Vec<&ActionRef> {
        vec![&self.child]
    }

    fn compress(&self, _this: &ActionRef) -> ActionRef {
        Action::Trigger(Self {
            child: self.child.compress(),
            ..self.clone()
        })
        .into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Trigger(Self {
            haptic: Some(haptic),
            ..self.clone()
        })
        .into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.haptic
    }
}

/// `gyro(AXIS, AXIS[, AXIS])` writes pitch, yaw and roll to gamepad axes
#[derive(Debug, Clone)]
pub struct GyroAction {
    pub axes: Vec<Axes>,
    pub haptic: Option<HapticData>,
}

impl GyroAction {
    pub fn new(axes: Vec<Axes>) -> Self {
        Self { axes, haptic: None }
    }
}

impl Node for GyroAction {
    fn on_gyro(&self, _this: &ActionRef, m: &mut Mapper, pitch: f64, yaw: f64, roll: f64) {
        for (axis, value) in self.axes.iter().zip([pitch, yaw, roll]) {
            let (min, max) = axis.range();
            m.set_axis(*axis, (value.round() as i32).clamp(min, max));
        }
    }

    fn write_text(&self, w: &mut TextWriter) {
        w.open("gyro");
        for (i, axis) in self.axes.iter().enumerate() {
            if i > 0 {
                w.sep();
            }
            w.push(&axis.to_string());
        }
        w.close();
    }

    fn describe(&self) -> String {
        "Gyro".to_owned()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Gyro(Self {
            haptic: Some(haptic),
            ..self.clone()
        })
        .into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.haptic
    }
}

/// `a and b and ...` runs every child with the same input
#[derive(Debug, Clone)]
pub struct MultiAction {
    pub actions: Vec<ActionRef>,
}

impl MultiAction {
    /// Nested multis are flattened into one list
    pub fn new(actions: Vec<ActionRef>) -> Self {
        let mut flat = Vec::with_capacity(actions.len());
        for action in actions {
            match &*action {
                Action::Multi(inner) => flat.extend(inner.actions.iter().cloned()),
                _ => flat.push(action),
            }
        }
        Self { actions: flat }
    }
}

impl Node for MultiAction {
    fn on_button(&self, _this: &ActionRef, m: &mut Mapper, pressed: bool) {
        for action in &self.actions {
            action.on_button(m, pressed);
        }
    }

    fn on_axis(&self, _this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        for action in &self.actions {
            action.on_axis(m, value, what);
        }
    }

    fn on_pair(&self, _this: &ActionRef, m: &mut Mapper, x: f64, y: f64, what: Source) {
        for action in &self.actions {
            action.on_pair(m, x, y, what);
        }
    }

    fn on_delta(&self, _this: &ActionRef, m: &mut Mapper, dx: f64, dy: f64, what: Source) {
        for action in &self.actions {
            action.on_delta(m, dx, dy, what);
        }
    }

    fn on_gyro(&self, _this: &ActionRef, m: &mut Mapper, pitch: f64, yaw: f64, roll: f64) {
        for action in &self.actions {
            action.on_gyro(m, pitch, yaw, roll);
        }
    }

    fn write_text(&self, w: &mut TextWriter) {
        for (i, action) in self.actions.iter().enumerate() {
            if i > 0 {
                w.push(" and ");
            }
            w.action(action);
        }
    }

    fn describe(&self) -> String {
        self.actions
            .iter()
            .map(|a| a.describe())
            .collect::<Vec<_>>()
            .join(" and ")
    }

    fn children(&self) -> Vec<&ActionRef> {
        self.actions.iter().collect()
    }

    fn compress(&self, _this: &ActionRef) -> ActionRef {
        let mut actions: Vec<ActionRef> = self
            .actions
            .iter()
            .map(|a| a.compress())
            .filter(|a| !a.is_none())
            .collect();
        match actions.len() {
            0 => none(),
            1 => actions.remove(0),
            _ => Action::Multi(Self::new(actions)).into_ref(),
        }
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        let actions = self.actions.iter().map(|a| a.with_haptic(haptic)).collect();
        Action::Multi(Self::new(actions)).into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.actions.iter().find_map(|a| a.haptic())
    }
}
