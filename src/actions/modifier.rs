use super::leaf::PAD_MOUSE_SCALE;
use super::{node_key, none, Action, ActionRef, Node, TextWriter};
use crate::constants::HapticPos;
use crate::controller::{SCButton, Source};
use crate::mapper::Mapper;
use crate::output::HapticData;
use crate::scheduler::TaskId;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::info;

/// Forwards every input channel to `self.child` unchanged
macro_rules! forward_input {
    () => {
        fn on_button(&self, _this: &ActionRef, m: &mut Mapper, pressed: bool) {
            self.child.on_button(m, pressed);
        }

        fn on_axis(&self, _this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
            self.child.on_axis(m, value, what);
        }

        fn on_pair(&self, _this: &ActionRef, m: &mut Mapper, x: f64, y: f64, what: Source) {
            self.child.on_pair(m, x, y, what);
        }

        fn on_delta(&self, _this: &ActionRef, m: &mut Mapper, dx: f64, dy: f64, what: Source) {
            self.child.on_delta(m, dx, dy, what);
        }

        fn on_gyro(&self, _this: &ActionRef, m: &mut Mapper, pitch: f64, yaw: f64, roll: f64) {
            self.child.on_gyro(m, pitch, yaw, roll);
        }
    };
}

/// `sens(x[, y[, z]], a)` scales every axis of the input
#[derive(Debug, Clone)]
pub struct SensitivityModifier {
    pub factors: [f64; 3],
    pub child: ActionRef,
}

impl SensitivityModifier {
    pub fn new(factors: [f64; 3], child: ActionRef) -> Self {
        Self { factors, child }
    }
}

impl Node for SensitivityModifier {
    fn on_button(&self, _this: &ActionRef, m: &mut Mapper, pressed: bool) {
        self.child.on_button(m, pressed);
    }

    fn on_axis(&self, _this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        self.child.on_axis(m, value * self.factors[0], what);
    }

    fn on_pair(&self, _this: &ActionRef, m: &mut Mapper, x: f64, y: f64, what: Source) {
        let [fx, fy, _] = self.factors;
        self.child.on_pair(m, x * fx, y * fy, what);
    }

    fn on_delta(&self, _this: &ActionRef, m: &mut Mapper, dx: f64, dy: f64, what: Source) {
        let [fx, fy, _] = self.factors;
        self.child.on_delta(m, dx * fx, dy * fy, what);
    }

    fn on_gyro(&self, _this: &ActionRef, m: &mut Mapper, pitch: f64, yaw: f64, roll: f64) {
        let [fx, fy, fz] = self.factors;
        self.child.on_gyro(m, pitch * fx, yaw * fy, roll * fz);
    }

    fn write_text(&self, w: &mut TextWriter) {
        // trailing 1.0 factors are implied
        let used = self
            .factors
            .iter()
            .rposition(|f| *f != 1.0)
            .map_or(1, |last| last + 1);
        w.open("sens");
        for factor in &self.factors[..used] {
            w.number(*factor);
            w.sep();
        }
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
        let child = self.child.compress();
        if self.factors == [1.0; 3] {
            return child;
        }
        Action::Sensitivity(Self::new(self.factors, child)).into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Sensitivity(Self::new(self.factors, self.child.with_haptic(haptic))).into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.child.haptic()
    }
}

/// `deadzone(lower[, upper], a)` zeroes input outside `lower..=upper`
#[derive(Debug, Clone)]
pub struct DeadzoneModifier {
    pub lower: f64,
    pub upper: Option<f64>,
    pub child: ActionRef,
}

impl DeadzoneModifier {
    pub fn new(lower: f64, upper: Option<f64>, child: ActionRef) -> Self {
        Self {
            lower,
            upper,
            child,
        }
    }

    fn outside(&self, distance: f64) -> bool {
        distance < self.lower || self.upper.is_some_and(|upper| distance > upper)
    }
}

impl Node for DeadzoneModifier {
    fn on_button(&self, _this: &ActionRef, m: &mut Mapper, pressed: bool) {
        self.child.on_button(m, pressed);
    }

    fn on_axis(&self, _this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        let value = if self.outside(value.abs()) { 0.0 } else { value };
        self.child.on_axis(m, value, what);
    }

    fn on_pair(&self, _this: &ActionRef, m: &mut Mapper, x: f64, y: f64, what: Source) {
        if self.outside(x.hypot(y)) {
            self.child.on_pair(m, 0.0, 0.0, what);
        } else {
            self.child.on_pair(m, x, y, what);
        }
    }

    fn on_delta(&self, _this: &ActionRef, m: &mut Mapper, dx: f64, dy: f64, what: Source) {
        self.child.on_delta(m, dx, dy, what);
    }

    fn on_gyro(&self, _this: &ActionRef, m: &mut Mapper, pitch: f64, yaw: f64, roll: f64) {
        self.child.on_gyro(m, pitch, yaw, roll);
    }

    fn write_text(&self, w: &mut TextWriter) {
        w.open("deadzone");
        w.number(self.lower);
        w.sep();
        if let Some(upper) = self.upper {
            w.number(upper);
            w.sep();
        }
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
        let child = self.child.compress();
        if self.lower <= 0.0 && self.upper.is_none() {
            return child;
        }
        Action::Deadzone(Self::new(self.lower, self.upper, child)).into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Deadzone(Self::new(self.lower, self.upper, self.child.with_haptic(haptic))).into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.child.haptic()
    }
}

#[derive(Debug, Default)]
pub(crate) struct SmoothState {
    history: VecDeque<(f64, f64)>,
    last: Option<(f64, f64)>,
}

/// `smooth([level[, multiplier[, filter]]], a)`
///
/// Replaces each position with a weighted average of the last `level`
/// positions, newest weighted highest. Moves shorter than `filter` are held
/// back.
#[derive(Debug, Clone)]
pub struct SmoothModifier {
    pub level: usize,
    pub multiplier: f64,
    pub filter: f64,
    pub child: ActionRef,
}

impl SmoothModifier {
    pub const DEFAULT_LEVEL: usize = 8;
    pub const DEFAULT_MULTIPLIER: f64 = 0.75;
    pub const DEFAULT_FILTER: f64 = 2.0;

    pub fn new(level: usize, multiplier: f64, filter: f64, child: ActionRef) -> Self {
        Self {
            level: level.max(1),
            multiplier,
            filter,
            child,
        }
    }

    fn average(&self, history: &VecDeque<(f64, f64)>) -> (f64, f64) {
        let mut weight = 1.0;
        let (mut sx, mut sy, mut total) = (0.0, 0.0, 0.0);
        for (x, y) in history {
            sx += x * weight;
            sy += y * weight;
            total += weight;
            weight *= self.multiplier;
        }
        if total == 0.0 {
            (0.0, 0.0)
        } else {
            (sx / total, sy / total)
        }
    }
}

impl Node for SmoothModifier {
    fn on_button(&self, _this: &ActionRef, m: &mut Mapper, pressed: bool) {
        self.child.on_button(m, pressed);
    }

    fn on_axis(&self, _this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        self.child.on_axis(m, value, what);
    }

    fn on_pair(&self, this: &ActionRef, m: &mut Mapper, x: f64, y: f64, what: Source) {
        let touched = if what.is_pad() {
            m.is_touched(what)
        } else {
            x != 0.0 || y != 0.0
        };
        let state = m.runtime.smooths.entry(node_key(this)).or_default();
        if !touched {
            state.history.clear();
            state.last = None;
            self.child.on_pair(m, x, y, what);
            return;
        }
        state.history.push_front((x, y));
        state.history.truncate(self.level);
        let (ax, ay) = self.average(&state.history);
        if let Some((lx, ly)) = state.last {
            if (ax - lx).hypot(ay - ly) < self.filter {
                return;
            }
        }
        state.last = Some((ax, ay));
        self.child.on_pair(m, ax, ay, what);
    }

    fn on_delta(&self, _this: &ActionRef, m: &mut Mapper, dx: f64, dy: f64, what: Source) {
        self.child.on_delta(m, dx, dy, what);
    }

    fn on_gyro(&self, _this: &ActionRef, m: &mut Mapper, pitch: f64, yaw: f64, roll: f64) {
        self.child.on_gyro(m, pitch, yaw, roll);
    }

    fn write_text(&self, w: &mut TextWriter) {
        let params = [self.level as f64, self.multiplier, self.filter];
        let defaults = [
            Self::DEFAULT_LEVEL as f64,
            Self::DEFAULT_MULTIPLIER,
            Self::DEFAULT_FILTER,
        ];
        let used = params
            .iter()
            .zip(defaults)
            .rposition(|(p, d)| *p != d)
            .map_or(0, |last| last + 1);
        w.open("smooth");
        for param in &params[..used] {
            w.number(*param);
            w.sep();
        }
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
        Action::Smooth(Self::new(self.level, self.multiplier, self.filter, self.child.compress()))
            .into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Smooth(Self::new(
            self.level,
            self.multiplier,
            self.filter,
            self.child.with_haptic(haptic),
        ))
        .into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.child.haptic()
    }
}

/// `feedback(POS[, amplitude[, frequency[, period[, count]]]], a)`
///
/// Stores the haptic request in every leaf below it at construction time.
/// Nested feedback modifiers keep their own request, the innermost wins.
#[derive(Debug, Clone)]
pub struct FeedbackModifier {
    pub haptic: HapticData,
    pub child: ActionRef,
}

impl FeedbackModifier {
    pub fn new(haptic: HapticData, child: ActionRef) -> Self {
        Self {
            haptic,
            child: child.with_haptic(haptic),
        }
    }

    pub fn position(&self) -> HapticPos {
        self.haptic.position
    }
}

impl Node for FeedbackModifier {
    forward_input!();

    fn write_text(&self, w: &mut TextWriter) {
        let h = self.haptic;
        let params = [h.amplitude, h.frequency, h.period, h.count];
        let defaults = [
            HapticData::DEFAULT_AMPLITUDE,
            HapticData::DEFAULT_FREQUENCY,
            HapticData::DEFAULT_PERIOD,
            HapticData::DEFAULT_COUNT,
        ];
        let used = params
            .iter()
            .zip(defaults)
            .rposition(|(p, d)| *p != d)
            .map_or(0, |last| last + 1);
        w.open("feedback");
        w.push(h.position.name());
        for param in &params[..used] {
            w.sep();
            w.number(*param as f64);
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
        Action::Feedback(Self::new(self.haptic, self.child.compress())).into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        Some(self.haptic)
    }
}

#[derive(Debug, Default)]
pub(crate) struct ModeState {
    held: Vec<usize>,
    active: Option<usize>,
}

/// `mode(BUTTON, a, BUTTON, b, ..., [default])`
///
/// Routes input to the branch of the first held button in declaration order,
/// or to the default. A branch pressed through this node is released through
/// it, whichever branch is selected at release time.
#[derive(Debug, Clone)]
pub struct ModeModifier {
    pub modes: Vec<(SCButton, ActionRef)>,
    pub default: ActionRef,
}

impl ModeModifier {
    pub fn new(modes: Vec<(SCButton, ActionRef)>, default: ActionRef) -> Self {
        Self { modes, default }
    }

    fn branch(&self, index: usize) -> &ActionRef {
        self.modes.get(index).map_or(&self.default, |(_, a)| a)
    }

    fn select(&self, m: &Mapper) -> usize {
        self.modes
            .iter()
            .position(|(button, _)| m.is_pressed(*button))
            .unwrap_or(self.modes.len())
    }

    /// Selects the branch for continuous input, returning the previously
    /// active branch when the selection changed
    fn switch(&self, this: &ActionRef, m: &mut Mapper) -> (usize, Option<usize>) {
        let index = self.select(m);
        let state = m.runtime.modes.entry(node_key(this)).or_default();
        let previous = state.active.replace(index);
        (index, previous.filter(|p| *p != index))
    }
}

impl Node for ModeModifier {
    fn on_button(&self, this: &ActionRef, m: &mut Mapper, pressed: bool) {
        if pressed {
            let index = self.select(m);
            let state = m.runtime.modes.entry(node_key(this)).or_default();
            if !state.held.contains(&index) {
                state.held.push(index);
            }
            self.branch(index).on_button(m, true);
        } else {
            let held = std::mem::take(&mut m.runtime.modes.entry(node_key(this)).or_default().held);
            for index in held {
                self.branch(index).on_button(m, false);
            }
        }
    }

    fn on_axis(&self, this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        let (index, previous) = self.switch(this, m);
        if let Some(previous) = previous {
            self.branch(previous).on_axis(m, 0.0, what);
        }
        self.branch(index).on_axis(m, value, what);
    }

    fn on_pair(&self, this: &ActionRef, m: &mut Mapper, x: f64, y: f64, what: Source) {
        let (index, previous) = self.switch(this, m);
        if let Some(previous) = previous {
            self.branch(previous).on_pair(m, 0.0, 0.0, what);
        }
        self.branch(index).on_pair(m, x, y, what);
    }

    fn on_delta(&self, _this: &ActionRef, m: &mut Mapper, dx: f64, dy: f64, what: Source) {
        let index = self.select(m);
        self.branch(index).on_delta(m, dx, dy, what);
    }

    fn on_gyro(&self, this: &ActionRef, m: &mut Mapper, pitch: f64, yaw: f64, roll: f64) {
        let (index, previous) = self.switch(this, m);
        if let Some(previous) = previous {
            self.branch(previous).on_gyro(m, 0.0, 0.0, 0.0);
        }
        self.branch(index).on_gyro(m, pitch, yaw, roll);
    }

    fn write_text(&self, w: &mut TextWriter) {
        let has_default = !self.default.is_none();
        w.open("mode");
        if w.multiline() {
            w.indented(|w| {
                for (i, (button, action)) in self.modes.iter().enumerate() {
                    w.newline();
                    w.push(button.name());
                    w.sep();
                    w.action(action);
                    if i + 1 < self.modes.len() || has_default {
                        w.push(",");
                    }
                }
                if has_default {
                    w.newline();
                    w.action(&self.default);
                }
            });
            w.newline();
        } else {
            for (i, (button, action)) in self.modes.iter().enumerate() {
                if i > 0 {
                    w.sep();
                }
                w.push(button.name());
                w.sep();
                w.action(action);
            }
            if has_default {
                w.sep();
                w.action(&self.default);
            }
        }
        w.close();
    }

    fn describe(&self) -> String {
        if self.default.is_none() {
            "Mode Shift".to_owned()
        } else {
            self.default.describe()
        }
    }

    fn children(&self) -> Vec<&ActionRef> {
        self.modes
            .iter()
            .map(|(_, a)| a)
            .chain(std::iter::once(&self.default))
            .collect()
    }

    fn compress(&self, _this: &ActionRef) -> ActionRef {
        let modes: Vec<(SCButton, ActionRef)> = self
            .modes
            .iter()
            .map(|(button, action)| (*button, action.compress()))
            .collect();
        let default = self.default.compress();
        if modes.is_empty() {
            return default;
        }
        if default.is_none() && modes.iter().all(|(_, a)| a.is_none()) {
            return none();
        }
        Action::Mode(Self::new(modes, default)).into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        let modes = self
            .modes
            .iter()
            .map(|(button, action)| (*button, action.with_haptic(haptic)))
            .collect();
        Action::Mode(Self::new(modes, self.default.with_haptic(haptic))).into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.default
            .haptic()
            .or_else(|| self.modes.iter().find_map(|(_, a)| a.haptic()))
    }
}

/// `click(a)`: passes stick/pad input on only while the channel is clicked
#[derive(Debug, Clone)]
pub struct ClickModifier {
    pub child: ActionRef,
}

impl ClickModifier {
    pub fn new(child: ActionRef) -> Self {
        Self { child }
    }

    /// `Some(true)` while clicked, `Some(false)` on the update the click ends
    fn gate(m: &Mapper, what: Source) -> Option<bool> {
        match what.press_button() {
            Some(button) if m.is_pressed(button) => Some(true),
            Some(button) if m.was_pressed(button) => Some(false),
            Some(_) => None,
            None => Some(true),
        }
    }
}

impl Node for ClickModifier {
    fn on_button(&self, _this: &ActionRef, m: &mut Mapper, pressed: bool) {
        self.child.on_button(m, pressed);
    }

    fn on_axis(&self, _this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        match Self::gate(m, what) {
            Some(true) => self.child.on_axis(m, value, what),
            Some(false) => self.child.on_axis(m, 0.0, what),
            None => {}
        }
    }

    fn on_pair(&self, _this: &ActionRef, m: &mut Mapper, x: f64, y: f64, what: Source) {
        match Self::gate(m, what) {
            Some(true) => self.child.on_pair(m, x, y, what),
            Some(false) => self.child.on_pair(m, 0.0, 0.0, what),
            None => {}
        }
    }

    fn on_delta(&self, _this: &ActionRef, m: &mut Mapper, dx: f64, dy: f64, what: Source) {
        if Self::gate(m, what) == Some(true) {
            self.child.on_delta(m, dx, dy, what);
        }
    }

    fn on_gyro(&self, _this: &ActionRef, m: &mut Mapper, pitch: f64, yaw: f64, roll: f64) {
        self.child.on_gyro(m, pitch, yaw, roll);
    }

    fn write_text(&self, w: &mut TextWriter) {
        w.open("click");
        w.action(&self.child);
        w.close();
    }

    fn describe(&self) -> String {
        format!("{} (click)", self.child.describe())
    }

    fn children(&self) -> Vec<&ActionRef> {
        vec![&self.child]
    }

    fn compress(&self, _this: &ActionRef) -> ActionRef {
        Action::Click(Self::new(self.child.compress())).into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Click(Self::new(self.child.with_haptic(haptic))).into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.child.haptic()
    }
}

/// `rotate(degrees, a)` rotates two-axis input counter-clockwise
#[derive(Debug, Clone)]
pub struct RotateModifier {
    pub angle: f64,
    pub child: ActionRef,
}

impl RotateModifier {
    pub fn new(angle: f64, child: ActionRef) -> Self {
        Self { angle, child }
    }

    fn rotate(&self, x: f64, y: f64) -> (f64, f64) {
        let (sin, cos) = self.angle.to_radians().sin_cos();
        (x * cos - y * sin, x * sin + y * cos)
    }
}

impl Node for RotateModifier {
    fn on_button(&self, _this: &ActionRef, m: &mut Mapper, pressed: bool) {
        self.child.on_button(m, pressed);
    }

    fn on_axis(&self, _this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        self.child.on_axis(m, value, what);
    }

    fn on_pair(&self, _this: &ActionRef, m: &mut Mapper, x: f64, y: f64, what: Source) {
        let (x, y) = self.rotate(x, y);
        self.child.on_pair(m, x, y, what);
    }

    fn on_delta(&self, _this: &ActionRef, m: &mut Mapper, dx: f64, dy: f64, what: Source) {
        let (dx, dy) = self.rotate(dx, dy);
        self.child.on_delta(m, dx, dy, what);
    }

    fn on_gyro(&self, _this: &ActionRef, m: &mut Mapper, pitch: f64, yaw: f64, roll: f64) {
        self.child.on_gyro(m, pitch, yaw, roll);
    }

    fn write_text(&self, w: &mut TextWriter) {
        w.open("rotate");
        w.number(self.angle);
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
        let child = self.child.compress();
        if self.angle.rem_euclid(360.0) == 0.0 {
            return child;
        }
        Action::Rotate(Self::new(self.angle, child)).into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Rotate(Self::new(self.angle, self.child.with_haptic(haptic))).into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.child.haptic()
    }
}

/// Seconds a double-click/hold node waits before deciding, unless overridden
pub const DEFAULT_DOUBLECLICK_TIMEOUT: f64 = 0.2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    /// Timer running; `pressed` tells whether the input is still down
    Waiting { pressed: bool },
    Doubled,
    Held,
    Normal,
}

#[derive(Debug, Default)]
pub(crate) struct DoubleClickState {
    phase: Phase,
    task: Option<TaskId>,
}

/// `doubleclick(d, n[, timeout])` and `hold(h, n[, timeout])`
///
/// One node carries all three branches so `doubleclick(d, hold(h, n))` acts
/// on a single timer.
#[derive(Debug, Clone)]
pub struct DoubleClickModifier {
    pub normal: ActionRef,
    pub double: ActionRef,
    pub hold: ActionRef,
    pub timeout: Option<f64>,
}

impl DoubleClickModifier {
    pub fn doubleclick(double: ActionRef, normal: ActionRef, timeout: Option<f64>) -> Self {
        Self {
            normal,
            double,
            hold: none(),
            timeout,
        }
        .fold()
    }

    pub fn hold(hold: ActionRef, normal: ActionRef, timeout: Option<f64>) -> Self {
        Self {
            normal,
            double: none(),
            hold,
            timeout,
        }
        .fold()
    }

    /// Merges a nested double-click/hold node whose branches do not overlap
    /// with this one and whose timeout agrees
    fn fold(self) -> Self {
        let Action::DoubleClick(inner) = &*self.normal else {
            return self;
        };
        let fills_double = self.double.is_none() || inner.double.is_none();
        let fills_hold = self.hold.is_none() || inner.hold.is_none();
        let timeout_agrees = match (self.timeout, inner.timeout) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        if !(fills_double && fills_hold && timeout_agrees) {
            return self;
        }
        let pick = |outer: &ActionRef, inner: &ActionRef| {
            if outer.is_none() {
                inner.clone()
            } else {
                outer.clone()
            }
        };
        Self {
            double: pick(&self.double, &inner.double),
            hold: pick(&self.hold, &inner.hold),
            normal: inner.normal.clone(),
            timeout: self.timeout.or(inner.timeout),
        }
    }

    fn timeout_duration(&self) -> Duration {
        let seconds = self.timeout.unwrap_or(DEFAULT_DOUBLECLICK_TIMEOUT).max(0.0);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }

    fn set_phase(this: &ActionRef, m: &mut Mapper, phase: Phase) {
        m.runtime.doubleclicks.entry(node_key(this)).or_default().phase = phase;
    }

    fn cancel_timer(this: &ActionRef, m: &mut Mapper) {
        let task = m
            .runtime
            .doubleclicks
            .get_mut(&node_key(this))
            .and_then(|s| s.task.take());
        if let Some(task) = task {
            m.cancel(task);
        }
    }

    fn start_timer(&self, this: &ActionRef, m: &mut Mapper) {
        let node = this.clone();
        let task = m.schedule(self.timeout_duration(), move |m| {
            if let Action::DoubleClick(dc) = &*node {
                dc.on_timeout(&node, m);
            }
        });
        m.runtime.doubleclicks.entry(node_key(this)).or_default().task = Some(task);
    }

    fn tap_normal(&self, m: &mut Mapper) {
        self.normal.on_button(m, true);
        self.normal.on_button(m, false);
    }

    fn on_timeout(&self, this: &ActionRef, m: &mut Mapper) {
        let state = m.runtime.doubleclicks.entry(node_key(this)).or_default();
        state.task = None;
        match state.phase {
            Phase::Waiting { pressed: true } => {
                if self.hold.is_none() {
                    state.phase = Phase::Normal;
                    self.normal.on_button(m, true);
                } else {
                    state.phase = Phase::Held;
                    self.hold.on_button(m, true);
                }
            }
            Phase::Waiting { pressed: false } => {
                state.phase = Phase::Idle;
                self.tap_normal(m);
            }
            _ => {}
        }
    }
}

impl Node for DoubleClickModifier {
    fn on_button(&self, this: &ActionRef, m: &mut Mapper, pressed: bool) {
        let phase = m
            .runtime
            .doubleclicks
            .get(&node_key(this))
            .map(|s| s.phase)
            .unwrap_or_default();
        match (pressed, phase) {
            (true, Phase::Idle) => {
                if self.double.is_none() && self.hold.is_none() {
                    Self::set_phase(this, m, Phase::Normal);
                    self.normal.on_button(m, true);
                } else {
                    Self::set_phase(this, m, Phase::Waiting { pressed: true });
                    self.start_timer(this, m);
                }
            }
            (true, Phase::Waiting { pressed: false }) => {
                Self::cancel_timer(this, m);
                Self::set_phase(this, m, Phase::Doubled);
                self.double.on_button(m, true);
            }
            (false, Phase::Waiting { pressed: true }) => {
                if self.double.is_none() {
                    Self::cancel_timer(this, m);
                    Self::set_phase(this, m, Phase::Idle);
                    self.tap_normal(m);
                } else {
                    Self::set_phase(this, m, Phase::Waiting { pressed: false });
                }
            }
            (false, Phase::Doubled) => {
                Self::set_phase(this, m, Phase::Idle);
                self.double.on_button(m, false);
            }
            (false, Phase::Held) => {
                Self::set_phase(this, m, Phase::Idle);
                self.hold.on_button(m, false);
            }
            (false, Phase::Normal) => {
                Self::set_phase(this, m, Phase::Idle);
                self.normal.on_button(m, false);
            }
            _ => {}
        }
    }

    fn on_axis(&self, _this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        self.normal.on_axis(m, value, what);
    }

    fn on_pair(&self, _this: &ActionRef, m: &mut Mapper, x: f64, y: f64, what: Source) {
        self.normal.on_pair(m, x, y, what);
    }

    fn on_delta(&self, _this: &ActionRef, m: &mut Mapper, dx: f64, dy: f64, what: Source) {
        self.normal.on_delta(m, dx, dy, what);
    }

    fn on_gyro(&self, _this: &ActionRef, m: &mut Mapper, pitch: f64, yaw: f64, roll: f64) {
        self.normal.on_gyro(m, pitch, yaw, roll);
    }

    fn write_text(&self, w: &mut TextWriter) {
        let write_timeout = |w: &mut TextWriter| {
            if let Some(timeout) = self.timeout {
                w.sep();
                w.number(timeout);
            }
        };
        if self.double.is_none() && !self.hold.is_none() {
            w.open("hold");
            w.action(&self.hold);
            w.sep();
            w.action(&self.normal);
            write_timeout(w);
            w.close();
            return;
        }
        w.open("doubleclick");
        w.action(&self.double);
        w.sep();
        if self.hold.is_none() {
            w.action(&self.normal);
        } else {
            w.open("hold");
            w.action(&self.hold);
            w.sep();
            w.action(&self.normal);
            w.close();
        }
        write_timeout(w);
        w.close();
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.double.is_none() {
            parts.push(format!("double: {}", self.double.describe()));
        }
        if !self.hold.is_none() {
            parts.push(format!("hold: {}", self.hold.describe()));
        }
        parts.push(self.normal.describe());
        parts.join(", ")
    }

    fn children(&self) -> Vec<&ActionRef> {
        vec![&self.normal, &self.double, &self.hold]
    }

    fn compress(&self, _this: &ActionRef) -> ActionRef {
        let double = self.double.compress();
        let hold = self.hold.compress();
        let normal = self.normal.compress();
        if double.is_none() && hold.is_none() {
            return normal;
        }
        let folded = Self {
            normal,
            double,
            hold,
            timeout: self.timeout,
        }
        .fold();
        Action::DoubleClick(folded).into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::DoubleClick(Self {
            normal: self.normal.with_haptic(haptic),
            double: self.double.with_haptic(haptic),
            hold: self.hold.with_haptic(haptic),
            timeout: self.timeout,
        })
        .into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.normal
            .haptic()
            .or_else(|| self.double.haptic())
            .or_else(|| self.hold.haptic())
    }
}

/// Interval between two trackball decay ticks
pub const BALL_TICK: Duration = Duration::from_millis(10);
/// Per-tick travel below which the ball stops
pub const BALL_EPSILON: f64 = 0.05;
/// Shortest sample interval used for velocity estimation
const BALL_MIN_DT: f64 = 0.001;

#[derive(Debug, Default)]
pub(crate) struct BallState {
    last: Option<(f64, f64)>,
    last_time: Duration,
    history: VecDeque<(f64, f64, f64)>,
    velocity: (f64, f64),
    source: Option<Source>,
    task: Option<TaskId>,
}

/// `ball([friction[, mean_len]], a)`
///
/// Converts pad positions into relative motion. When the finger lifts, the
/// average velocity of the last `mean_len` samples keeps rolling and decays
/// by `exp(-friction * dt)` per tick.
#[derive(Debug, Clone)]
pub struct BallModifier {
    pub friction: f64,
    pub mean_len: usize,
    pub child: ActionRef,
}

impl BallModifier {
    pub const DEFAULT_FRICTION: f64 = 10.0;
    pub const DEFAULT_MEAN_LEN: usize = 10;

    pub fn new(friction: f64, mean_len: usize, child: ActionRef) -> Self {
        Self {
            friction,
            mean_len: mean_len.max(1),
            child,
        }
    }

    fn roll(&self, this: &ActionRef, m: &mut Mapper) {
        let node = this.clone();
        let task = m.schedule(BALL_TICK, move |m| {
            if let Action::Ball(ball) = &*node {
                ball.tick(&node, m);
            }
        });
        m.runtime.balls.entry(node_key(this)).or_default().task = Some(task);
    }

    fn tick(&self, this: &ActionRef, m: &mut Mapper) {
        let dt = BALL_TICK.as_secs_f64();
        let decay = (-self.friction * dt).exp();
        let state = m.runtime.balls.entry(node_key(this)).or_default();
        state.task = None;
        let (vx, vy) = (state.velocity.0 * decay, state.velocity.1 * decay);
        let (dx, dy) = (vx * dt, vy * dt);
        if dx.hypot(dy) < BALL_EPSILON {
            state.velocity = (0.0, 0.0);
            return;
        }
        state.velocity = (vx, vy);
        let what = state.source.unwrap_or(Source::Stick);
        self.child.on_delta(m, dx, dy, what);
        self.roll(this, m);
    }
}

impl Node for BallModifier {
    fn on_button(&self, _this: &ActionRef, m: &mut Mapper, pressed: bool) {
        self.child.on_button(m, pressed);
    }

    fn on_axis(&self, _this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        self.child.on_axis(m, value, what);
    }

    fn on_pair(&self, this: &ActionRef, m: &mut Mapper, x: f64, y: f64, what: Source) {
        let touched = m.is_touched(what);
        let now = m.now();
        let state = m.runtime.balls.entry(node_key(this)).or_default();
        if touched {
            let pending = state.task.take();
            state.velocity = (0.0, 0.0);
            let delta = state
                .last
                .map(|(lx, ly)| ((x - lx) * PAD_MOUSE_SCALE, -(y - ly) * PAD_MOUSE_SCALE));
            let dt = now.saturating_sub(state.last_time).as_secs_f64().max(BALL_MIN_DT);
            state.last = Some((x, y));
            state.last_time = now;
            state.source = Some(what);
            if let Some((dx, dy)) = delta {
                state.history.push_back((dx, dy, dt));
                while state.history.len() > self.mean_len {
                    state.history.pop_front();
                }
            }
            if let Some(task) = pending {
                m.cancel(task);
            }
            if let Some((dx, dy)) = delta {
                self.child.on_delta(m, dx, dy, what);
            }
        } else if state.last.take().is_some() {
            let (sx, sy, st) = state
                .history
                .drain(..)
                .fold((0.0, 0.0, 0.0), |(ax, ay, at), (dx, dy, dt)| {
                    (ax + dx, ay + dy, at + dt)
                });
            if st > 0.0 && (sx != 0.0 || sy != 0.0) {
                state.velocity = (sx / st, sy / st);
                self.roll(this, m);
            }
        }
    }

    fn on_delta(&self, _this: &ActionRef, m: &mut Mapper, dx: f64, dy: f64, what: Source) {
        self.child.on_delta(m, dx, dy, what);
    }

    fn on_gyro(&self, _this: &ActionRef, m: &mut Mapper, pitch: f64, yaw: f64, roll: f64) {
        self.child.on_gyro(m, pitch, yaw, roll);
    }

    fn write_text(&self, w: &mut TextWriter) {
        w.open("ball");
        if self.mean_len != Self::DEFAULT_MEAN_LEN {
            w.number(self.friction);
            w.sep();
            w.number(self.mean_len as f64);
            w.sep();
        } else if self.friction != Self::DEFAULT_FRICTION {
            w.number(self.friction);
            w.sep();
        }
        w.action(&self.child);
        w.close();
    }

    fn describe(&self) -> String {
        format!("{} (trackball)", self.child.describe())
    }

    fn children(&self) -> Vec<&ActionRef> {
        vec![&self.child]
    }

    fn compress(&self, _this: &ActionRef) -> ActionRef {
        Action::Ball(Self::new(self.friction, self.mean_len, self.child.compress())).into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Ball(Self::new(
            self.friction,
            self.mean_len,
            self.child.with_haptic(haptic),
        ))
        .into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.child.haptic()
    }
}

/// `osd([timeout,] a)` announces the child's description when pressed
#[derive(Debug, Clone)]
pub struct OsdModifier {
    pub timeout: Option<f64>,
    pub child: ActionRef,
}

impl OsdModifier {
    pub fn new(timeout: Option<f64>, child: ActionRef) -> Self {
        Self { timeout, child }
    }
}

impl Node for OsdModifier {
    fn on_button(&self, _this: &ActionRef, m: &mut Mapper, pressed: bool) {
        if pressed {
            info!("OSD: {}", self.child.describe());
        }
        self.child.on_button(m, pressed);
    }

    fn on_axis(&self, _this: &ActionRef, m: &mut Mapper, value: f64, what: Source) {
        self.child.on_axis(m, value, what);
    }

    fn on_pair(&self, _this: &ActionRef, m: &mut Mapper, x: f64, y: f64, what: Source) {
        self.child.on_pair(m, x, y, what);
    }

    fn on_delta(&self, _this: &ActionRef, m: &mut Mapper, dx: f64, dy: f64, what: Source) {
        self.child.on_delta(m, dx, dy, what);
    }

    fn on_gyro(&self, _this: &ActionRef, m: &mut Mapper, pitch: f64, yaw: f64, roll: f64) {
        self.child.on_gyro(m, pitch, yaw, roll);
    }

    fn write_text(&self, w: &mut TextWriter) {
        w.open("osd");
        if let Some(timeout) = self.timeout {
            w.number(timeout);
            w.sep();
        }
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
        Action::Osd(Self::new(self.timeout, self.child.compress())).into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Osd(Self::new(self.timeout, self.child.with_haptic(haptic))).into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.child.haptic()
    }
}

/// `name('label', a)` gives a subtree a display name
#[derive(Debug, Clone)]
pub struct NameModifier {
    pub name: String,
    pub child: ActionRef,
}

impl NameModifier {
    pub fn new(name: impl Into<String>, child: ActionRef) -> Self {
        Self {
            name: name.into(),
            child,
        }
    }
}

impl Node for NameModifier {
    forward_input!();

    fn write_text(&self, w: &mut TextWriter) {
        w.open("name");
        w.string(&self.name);
        w.sep();
        w.action(&self.child);
        w.close();
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn children(&self) -> Vec<&ActionRef> {
        vec![&self.child]
    }

    fn compress(&self, _this: &ActionRef) -> ActionRef {
        Action::Name(Self::new(self.name.clone(), self.child.compress())).into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Name(Self::new(self.name.clone(), self.child.with_haptic(haptic))).into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.child.haptic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ButtonAction, MouseAction};
    use crate::constants::Keys;
    use crate::controller::{ControllerState, SCButtons};
    use crate::output::{OutputEvent, RecordingSink};
    use crate::profile::Profile;

    fn key(k: Keys) -> ActionRef {
        Action::Button(ButtonAction::new(k, None)).into_ref()
    }

    #[test]
    fn doubleclick_over_hold_folds_into_one_node() {
        let inner = Action::DoubleClick(DoubleClickModifier::hold(
            key(Keys::KEY_H),
            key(Keys::KEY_N),
            None,
        ))
        .into_ref();
        let outer = DoubleClickModifier::doubleclick(key(Keys::KEY_D), inner, None);
        assert!(!outer.double.is_none());
        assert!(!outer.hold.is_none());
        assert!(matches!(&*outer.normal, Action::Button(_)));
        assert_eq!(
            Action::DoubleClick(outer).to_string(),
            "doubleclick(button(Keys.KEY_D), hold(button(Keys.KEY_H), button(Keys.KEY_N)))"
        );
    }

    #[test]
    fn conflicting_timeouts_stay_nested() {
        let inner = Action::DoubleClick(DoubleClickModifier::hold(
            key(Keys::KEY_H),
            key(Keys::KEY_N),
            Some(0.5),
        ))
        .into_ref();
        let outer = DoubleClickModifier::doubleclick(key(Keys::KEY_D), inner, Some(0.3));
        assert!(outer.hold.is_none());
        assert!(matches!(&*outer.normal, Action::DoubleClick(_)));
    }

    #[test]
    fn sens_drops_trailing_unit_factors() {
        let sens = Action::Sensitivity(SensitivityModifier::new([2.0, 1.0, 1.0], key(Keys::KEY_A)));
        assert_eq!(sens.to_string(), "sens(2, button(Keys.KEY_A))");
        let sens = Action::Sensitivity(SensitivityModifier::new([1.0, 0.5, 1.0], key(Keys::KEY_A)));
        assert_eq!(sens.to_string(), "sens(1, 0.5, button(Keys.KEY_A))");
    }

    #[test]
    fn feedback_marks_leaves_and_prints_only_overrides() {
        let mut haptic = HapticData::new(HapticPos::LEFT);
        haptic.frequency = 8;
        let fb = FeedbackModifier::new(haptic, key(Keys::KEY_A));
        assert_eq!(fb.child.haptic(), Some(haptic));
        assert_eq!(
            Action::Feedback(fb).to_string(),
            "feedback(LEFT, 512, 8, button(Keys.KEY_A))"
        );
    }

    #[test]
    fn innermost_feedback_wins() {
        let inner = Action::Feedback(FeedbackModifier::new(
            HapticData::new(HapticPos::RIGHT),
            key(Keys::KEY_A),
        ))
        .into_ref();
        let outer = FeedbackModifier::new(HapticData::new(HapticPos::LEFT), inner);
        let Action::Feedback(inner) = &*outer.child else {
            panic!("feedback node expected");
        };
        assert_eq!(inner.child.haptic().map(|h| h.position), Some(HapticPos::RIGHT));
    }

    #[test]
    fn mode_multiline_layout() {
        let mode = Action::Mode(ModeModifier::new(
            vec![(SCButton::A, key(Keys::KEY_A)), (SCButton::B, key(Keys::KEY_B))],
            key(Keys::KEY_C),
        ));
        assert_eq!(
            mode.to_string(),
            "mode(A, button(Keys.KEY_A), B, button(Keys.KEY_B), button(Keys.KEY_C))"
        );
        assert_eq!(
            mode.to_string_multiline(),
            "mode(\n    A, button(Keys.KEY_A),\n    B, button(Keys.KEY_B),\n    button(Keys.KEY_C)\n)"
        );
    }

    #[test]
    fn rotate_quarter_turn() {
        let rotate = RotateModifier::new(90.0, none());
        let (x, y) = rotate.rotate(1.0, 0.0);
        assert!(x.abs() < 1e-9);
        assert!((y - 1.0).abs() < 1e-9);
    }

    fn rolling_ball() -> (Mapper, RecordingSink) {
        let mouse = Action::Mouse(MouseAction::new(None, 1.0)).into_ref();
        let mut profile = Profile::empty();
        profile.right_pad = Action::Ball(BallModifier::new(10.0, 10, mouse)).into_ref();
        let sink = RecordingSink::new();
        let mut m = Mapper::new(profile, Box::new(sink.clone()));
        m.input(touching(0), ms(0));
        m.input(touching(2000), ms(10));
        m.input(touching(4000), ms(20));
        m.input(ControllerState::default(), ms(30));
        (m, sink)
    }

    fn touching(x: i16) -> ControllerState {
        ControllerState {
            buttons: SCButtons::from_buttons(&[SCButton::RPADTOUCH]),
            rpad_x: x,
            ..Default::default()
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn ball_speed(m: &Mapper) -> f64 {
        m.runtime
            .balls
            .values()
            .map(|s| s.velocity.0.hypot(s.velocity.1))
            .sum()
    }

    #[test]
    fn ball_decays_until_below_epsilon() {
        let (mut m, sink) = rolling_ball();
        assert_eq!(
            sink.writes(),
            vec![OutputEvent::Move(10, 0), OutputEvent::Move(10, 0)]
        );
        let mut last = ball_speed(&m);
        assert!((last - 1000.0).abs() < 1e-6);

        let mut t = 30;
        while m.pending_tasks() > 0 {
            t += 10;
            m.run_scheduled(ms(t));
            let speed = ball_speed(&m);
            assert!(speed < last, "{} !< {} at {}ms", speed, last, t);
            last = speed;
            assert!(t < 10_000, "ball never stopped");
        }
        assert_eq!(last, 0.0);
        let moved: i32 = sink
            .writes()
            .iter()
            .map(|e| match e {
                OutputEvent::Move(dx, _) => *dx,
                _ => 0,
            })
            .sum();
        // 20 px while touching plus roughly 1000 * 0.01 * 0.905 / (1 - 0.905) px of coasting
        assert!(moved > 100 && moved < 120, "moved {}", moved);
    }

    #[test]
    fn recontact_cancels_decay() {
        let (mut m, sink) = rolling_ball();
        assert_eq!(m.pending_tasks(), 1);
        sink.take();
        m.input(touching(4000), ms(35));
        assert_eq!(m.pending_tasks(), 0);
        m.run_scheduled(ms(200));
        assert!(sink.writes().is_empty());
        assert_eq!(ball_speed(&m), 0.0);
    }

    #[test]
    fn smooth_average_prefers_newest() {
        let smooth = SmoothModifier::new(3, 0.5, 0.0, none());
        let history: VecDeque<(f64, f64)> = [(4.0, 0.0), (0.0, 0.0)].into_iter().collect();
        let (x, _) = smooth.average(&history);
        assert!((x - 4.0 / 1.5).abs() < 1e-9);
    }
}
