use super::{node_key, Action, ActionRef, Node, TextWriter};
use crate::mapper::Mapper;
use crate::output::HapticData;
use std::time::Duration;

/// Time a macro step stays pressed, and the gap before a repeat cycle
pub const MACRO_STEP_DELAY: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressKind {
    Press,
    Release,
    Tap(u32),
}

/// `press(a)`, `release(a)` and `tap(a[, count])`: one half (or both halves)
/// of a button cycle, meant as macro steps
#[derive(Debug, Clone)]
pub struct PressAction {
    pub kind: PressKind,
    pub action: ActionRef,
}

impl PressAction {
    pub fn new(kind: PressKind, action: ActionRef) -> Self {
        Self { kind, action }
    }
}

impl Node for PressAction {
    fn on_button(&self, _this: &ActionRef, m: &mut Mapper, pressed: bool) {
        if !pressed {
            return;
        }
        match self.kind {
            PressKind::Press => self.action.on_button(m, true),
            PressKind::Release => self.action.on_button(m, false),
            PressKind::Tap(count) => {
                for _ in 0..count {
                    self.action.on_button(m, true);
                    self.action.on_button(m, false);
                }
            }
        }
    }

    fn write_text(&self, w: &mut TextWriter) {
        match self.kind {
            PressKind::Press => w.open("press"),
            PressKind::Release => w.open("release"),
            PressKind::Tap(_) => w.open("tap"),
        }
        w.action(&self.action);
        if let PressKind::Tap(count) = self.kind {
            if count != 1 {
                w.sep();
                w.number(count as f64);
            }
        }
        w.close();
    }

    fn describe(&self) -> String {
        match self.kind {
            PressKind::Press => format!("Press {}", self.action.describe()),
            PressKind::Release => format!("Release {}", self.action.describe()),
            PressKind::Tap(1) => format!("Tap {}", self.action.describe()),
            PressKind::Tap(count) => format!("Tap {} {count}x", self.action.describe()),
        }
    }

    fn children(&self) -> Vec<&ActionRef> {
        vec![&self.action]
    }

    fn compress(&self, _this: &ActionRef) -> ActionRef {
        Action::Press(Self::new(self.kind, self.action.compress())).into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::Press(Self::new(self.kind, self.action.with_haptic(haptic))).into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.action.haptic()
    }
}

/// `sleep(ms)`: a macro step that only waits
#[derive(Debug, Clone)]
pub struct SleepAction {
    pub duration: Duration,
}

impl SleepAction {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    fn millis(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

impl Node for SleepAction {
    fn write_text(&self, w: &mut TextWriter) {
        w.open("sleep");
        w.number(self.millis());
        w.close();
    }

    fn describe(&self) -> String {
        format!("Wait {} ms", super::format_number(self.millis()))
    }
}

#[derive(Debug, Default)]
pub(crate) struct MacroState {
    running: bool,
    held: bool,
    step: usize,
    release_pending: bool,
}

impl MacroState {
    fn is_busy(&self) -> bool {
        self.running || self.release_pending
    }
}

/// `a; b; c` or `repeat(a; b)`
///
/// Each step is pressed, held for its delay and released before the next one
/// starts. A repeating macro starts over for as long as its input stays held.
#[derive(Debug, Clone)]
pub struct Macro {
    pub steps: Vec<ActionRef>,
    pub repeat: bool,
}

impl Macro {
    /// Nested plain sequences are spliced into this one
    pub fn new(steps: Vec<ActionRef>, repeat: bool) -> Self {
        let mut flat = Vec::with_capacity(steps.len());
        for step in steps {
            match &*step {
                Action::Macro(inner) if !inner.repeat => flat.extend(inner.steps.iter().cloned()),
                _ => flat.push(step),
            }
        }
        Self { steps: flat, repeat }
    }

    fn step_delay(step: &Action) -> Duration {
        match step {
            Action::Sleep(sleep) => sleep.duration,
            _ => MACRO_STEP_DELAY,
        }
    }

    fn start_step(&self, this: &ActionRef, m: &mut Mapper) {
        let key = node_key(this);
        let Some(index) = m.runtime.macros.get(&key).map(|s| s.step) else {
            return;
        };
        let Some(step) = self.steps.get(index).cloned() else {
            return;
        };
        step.on_button(m, true);
        let node = this.clone();
        m.schedule(Self::step_delay(&step), move |m| {
            if let Action::Macro(mac) = &*node {
                mac.finish_step(&node, m);
            }
        });
        if let Some(state) = m.runtime.macros.get_mut(&key) {
            state.release_pending = true;
        }
    }

    fn finish_step(&self, this: &ActionRef, m: &mut Mapper) {
        let key = node_key(this);
        let Some(state) = m.runtime.macros.get_mut(&key) else {
            return;
        };
        state.release_pending = false;
        let index = state.step;
        if let Some(step) = self.steps.get(index).cloned() {
            step.on_button(m, false);
        }

        let Some(state) = m.runtime.macros.get_mut(&key) else {
            return;
        };
        state.step += 1;
        if state.step < self.steps.len() {
            self.start_step(this, m);
        } else if self.repeat && state.held {
            state.step = 0;
            let node = this.clone();
            m.schedule(MACRO_STEP_DELAY, move |m| {
                if let Action::Macro(mac) = &*node {
                    mac.start_step(&node, m);
                }
            });
        } else {
            state.running = false;
        }
    }
}

impl Node for Macro {
    fn on_button(&self, this: &ActionRef, m: &mut Mapper, pressed: bool) {
        let state = m.runtime.macros.entry(node_key(this)).or_default();
        state.held = pressed;
        if pressed && !state.is_busy() {
            state.running = true;
            state.step = 0;
            self.start_step(this, m);
        }
    }

    fn write_text(&self, w: &mut TextWriter) {
        if self.repeat {
            w.open("repeat");
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                if w.multiline() {
                    w.push(";");
                    w.newline();
                } else {
                    w.push("; ");
                }
            }
            w.action(step);
        }
        if self.repeat {
            w.close();
        }
    }

    fn describe(&self) -> String {
        let steps = self
            .steps
            .iter()
            .map(|s| s.describe())
            .collect::<Vec<_>>()
            .join(", ");
        if self.repeat {
            format!("Repeat: {steps}")
        } else {
            steps
        }
    }

    fn children(&self) -> Vec<&ActionRef> {
        self.steps.iter().collect()
    }

    fn compress(&self, _this: &ActionRef) -> ActionRef {
        let mut steps: Vec<ActionRef> = self.steps.iter().map(|s| s.compress()).collect();
        if !self.repeat && steps.len() == 1 {
            return steps.remove(0);
        }
        Action::Macro(Self::new(steps, self.repeat)).into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        let steps = self.steps.iter().map(|s| s.with_haptic(haptic)).collect();
        Action::Macro(Self::new(steps, self.repeat)).into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.steps.iter().find_map(|s| s.haptic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ButtonAction, TextWriter};
    use crate::constants::Keys;

    fn key(k: Keys) -> ActionRef {
        Action::Button(ButtonAction::new(k, None)).into_ref()
    }

    #[test]
    fn nested_sequences_are_spliced() {
        let inner = Action::Macro(Macro::new(vec![key(Keys::KEY_A), key(Keys::KEY_B)], false)).into_ref();
        let outer = Macro::new(vec![inner, key(Keys::KEY_C)], false);
        assert_eq!(outer.steps.len(), 3);
    }

    #[test]
    fn repeat_blocks_stay_nested() {
        let inner = Action::Macro(Macro::new(vec![key(Keys::KEY_A)], true)).into_ref();
        let outer = Macro::new(vec![inner, key(Keys::KEY_C)], false);
        assert_eq!(outer.steps.len(), 2);
    }

    #[test]
    fn text_forms() {
        let mac = Action::Macro(Macro::new(
            vec![
                key(Keys::KEY_A),
                Action::Sleep(SleepAction::new(Duration::from_millis(100))).into_ref(),
                Action::Press(PressAction::new(PressKind::Tap(3), key(Keys::KEY_B))).into_ref(),
            ],
            false,
        ));
        assert_eq!(
            mac.to_string(),
            "button(Keys.KEY_A); sleep(100); tap(button(Keys.KEY_B), 3)"
        );
        let mut w = TextWriter::new(true);
        w.action(&mac);
        assert_eq!(
            w.finish(),
            "button(Keys.KEY_A);\nsleep(100);\ntap(button(Keys.KEY_B), 3)"
        );
    }

    #[test]
    fn single_step_sequence_compresses_to_step() {
        let mac = Action::Macro(Macro::new(vec![key(Keys::KEY_A)], false)).into_ref();
        assert_eq!(mac.compress().to_string(), "button(Keys.KEY_A)");
        let rep = Action::Macro(Macro::new(vec![key(Keys::KEY_A)], true)).into_ref();
        assert_eq!(rep.compress().to_string(), "repeat(button(Keys.KEY_A))");
    }
}
