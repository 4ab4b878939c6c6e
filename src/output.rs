//! Write surface toward the virtual device.
//!
//! The engine never looks at results from the sink: every call is fire and
//! forget, and the mapper batches one `synchronize` per update.

use crate::constants::{Axes, HapticPos, Keys};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info};

/// Haptic pulse request carried down an action tree by `feedback(...)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HapticData {
    pub position: HapticPos,
    pub amplitude: u16,
    pub frequency: u16,
    pub period: u16,
    pub count: u16,
}

impl HapticData {
    pub const DEFAULT_AMPLITUDE: u16 = 512;
    pub const DEFAULT_FREQUENCY: u16 = 4;
    pub const DEFAULT_PERIOD: u16 = 1024;
    pub const DEFAULT_COUNT: u16 = 1;

    pub fn new(position: HapticPos) -> Self {
        Self {
            position,
            amplitude: Self::DEFAULT_AMPLITUDE,
            frequency: Self::DEFAULT_FREQUENCY,
            period: Self::DEFAULT_PERIOD,
            count: Self::DEFAULT_COUNT,
        }
    }
}

/// Virtual keyboard/mouse/gamepad the engine writes to
pub trait OutputSink {
    fn press(&mut self, key: Keys);
    fn release(&mut self, key: Keys);
    fn set_axis(&mut self, axis: Axes, value: i32);
    fn move_relative(&mut self, dx: i32, dy: i32);
    fn scroll_relative(&mut self, dx: i32, dy: i32);
    fn feedback(&mut self, _haptic: &HapticData) {}
    /// Commits every write since the previous call as one report
    fn synchronize(&mut self);
}

/// Everything a sink can observe, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Press(Keys),
    Release(Keys),
    Axis(Axes, i32),
    Move(i32, i32),
    Scroll(i32, i32),
    Feedback(HapticData),
    Sync,
}

/// Sink that records calls; clones share one log
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Rc<RefCell<Vec<OutputEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.events.borrow().clone()
    }

    /// Returns and clears the log
    pub fn take(&self) -> Vec<OutputEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// Recorded events without the `Sync` markers
    pub fn writes(&self) -> Vec<OutputEvent> {
        self.events
            .borrow()
            .iter()
            .filter(|e| **e != OutputEvent::Sync)
            .cloned()
            .collect()
    }

    fn push(&self, event: OutputEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl OutputSink for RecordingSink {
    fn press(&mut self, key: Keys) {
        self.push(OutputEvent::Press(key));
    }

    fn release(&mut self, key: Keys) {
        self.push(OutputEvent::Release(key));
    }

    fn set_axis(&mut self, axis: Axes, value: i32) {
        self.push(OutputEvent::Axis(axis, value));
    }

    fn move_relative(&mut self, dx: i32, dy: i32) {
        self.push(OutputEvent::Move(dx, dy));
    }

    fn scroll_relative(&mut self, dx: i32, dy: i32) {
        self.push(OutputEvent::Scroll(dx, dy));
    }

    fn feedback(&mut self, haptic: &HapticData) {
        self.push(OutputEvent::Feedback(*haptic));
    }

    fn synchronize(&mut self) {
        self.push(OutputEvent::Sync);
    }
}

/// Sink that only reports writes through tracing
#[derive(Debug, Default)]
pub struct LogSink {
    writes: usize,
}

impl OutputSink for LogSink {
    fn press(&mut self, key: Keys) {
        self.writes += 1;
        info!("press {}", key.name());
    }

    fn release(&mut self, key: Keys) {
        self.writes += 1;
        info!("release {}", key.name());
    }

    fn set_axis(&mut self, axis: Axes, value: i32) {
        self.writes += 1;
        debug!("axis {} = {}", axis.name(), value);
    }

    fn move_relative(&mut self, dx: i32, dy: i32) {
        self.writes += 1;
        debug!("move {:+} {:+}", dx, dy);
    }

    fn scroll_relative(&mut self, dx: i32, dy: i32) {
        self.writes += 1;
        debug!("scroll {:+} {:+}", dx, dy);
    }

    fn feedback(&mut self, haptic: &HapticData) {
        debug!("feedback {:?}", haptic);
    }

    fn synchronize(&mut self) {
        if self.writes > 0 {
            debug!("sync ({} writes)", self.writes);
        }
        self.writes = 0;
    }
}
