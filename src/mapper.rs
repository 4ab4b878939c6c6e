//! Mapper runtime: turns pairs of controller snapshots into dispatch calls on
//! the bound action trees and batches the resulting writes.
//!
//! # Update order
//!
//! ```text
//! buttons (changed bits, dispatch order) ──► stick ──► left pad ──► right pad
//!     ──► left trigger ──► right trigger ──► gyro ──► flush (one synchronize)
//! ```
//!
//! The mapper is single threaded. Timers run through [`Mapper::run_scheduled`]
//! from the same loop that feeds snapshots, so no two dispatches ever overlap.

use crate::actions::{ActionRef, RuntimeState};
use crate::constants::{Axes, Keys};
use crate::controller::{ControllerState, SCButton, Source};
use crate::output::{HapticData, OutputSink};
use crate::profile::Profile;
use crate::scheduler::{Scheduler, TaskId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, trace};

pub struct Mapper {
    profile: Profile,
    sink: Box<dyn OutputSink>,
    scheduler: Scheduler<Mapper>,
    previous: ControllerState,
    current: ControllerState,
    /// Per-node state of the bound trees, keyed by node address
    pub(crate) runtime: RuntimeState,
    held_keys: HashMap<Keys, u32>,
    forced: HashSet<Source>,
    forced_next: HashSet<Source>,
    motion: (f64, f64),
    wheel: (f64, f64),
    dirty: bool,
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("now", &self.scheduler.now())
            .field("held_keys", &self.held_keys)
            .field("pending_tasks", &self.scheduler.len())
            .field("runtime_entries", &self.runtime.len())
            .finish()
    }
}

impl Mapper {
    pub fn new(profile: Profile, sink: Box<dyn OutputSink>) -> Self {
        info!(
            "Creating mapper with {} button bindings",
            profile.buttons.len()
        );
        Self {
            profile,
            sink,
            scheduler: Scheduler::new(),
            previous: ControllerState::default(),
            current: ControllerState::default(),
            runtime: RuntimeState::default(),
            held_keys: HashMap::new(),
            forced: HashSet::new(),
            forced_next: HashSet::new(),
            motion: (0.0, 0.0),
            wheel: (0.0, 0.0),
            dirty: false,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Replaces the binding table.
    ///
    /// Every key still held is released, pending timers are dropped and node
    /// state is discarded, so nothing from the old trees leaks into the new ones.
    pub fn set_profile(&mut self, profile: Profile) {
        info!(
            "Swapping profile ({} held keys, {} pending tasks)",
            self.held_keys.len(),
            self.scheduler.len()
        );
        let mut held: Vec<Keys> = self.held_keys.drain().map(|(key, _)| key).collect();
        held.sort();
        for key in held {
            self.sink.release(key);
            self.dirty = true;
        }
        self.scheduler.clear();
        self.runtime.clear();
        self.forced.clear();
        self.forced_next.clear();
        self.profile = profile;
        self.flush();
    }

    /// Clock of the last update or scheduler run
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    pub fn state(&self) -> &ControllerState {
        &self.current
    }

    pub fn is_pressed(&self, button: SCButton) -> bool {
        self.current.is_pressed(button)
    }

    pub fn was_pressed(&self, button: SCButton) -> bool {
        self.previous.is_pressed(button)
    }

    pub fn is_touched(&self, source: Source) -> bool {
        self.current.is_touched(source)
    }

    pub fn was_touched(&self, source: Source) -> bool {
        self.previous.is_touched(source)
    }

    /// Number of actions currently holding `key` down
    pub fn key_holders(&self, key: Keys) -> u32 {
        self.held_keys.get(&key).copied().unwrap_or(0)
    }

    pub fn press_key(&mut self, key: Keys) {
        let count = self.held_keys.entry(key).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.sink.press(key);
            self.dirty = true;
        }
    }

    /// Releases one hold on `key`; the key goes up once nobody holds it
    pub fn release_key(&mut self, key: Keys) {
        let Some(count) = self.held_keys.get_mut(&key) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.held_keys.remove(&key);
            self.sink.release(key);
            self.dirty = true;
        }
    }

    pub fn set_axis(&mut self, axis: Axes, value: i32) {
        self.sink.set_axis(axis, value);
        self.dirty = true;
    }

    /// Adds pointer motion; whole pixels are written at flush
    pub fn move_mouse(&mut self, dx: f64, dy: f64) {
        self.motion.0 += dx;
        self.motion.1 += dy;
    }

    /// Adds wheel motion in detents
    pub fn scroll(&mut self, dx: f64, dy: f64) {
        self.wheel.0 += dx;
        self.wheel.1 += dy;
    }

    pub fn feedback(&mut self, haptic: HapticData) {
        self.sink.feedback(&haptic);
    }

    /// Makes the next update dispatch `source` even if its values did not change
    pub fn force_event(&mut self, source: Source) {
        self.forced_next.insert(source);
    }

    pub fn schedule(
        &mut self,
        delay: Duration,
        callback: impl FnOnce(&mut Mapper) + 'static,
    ) -> TaskId {
        self.scheduler.schedule(delay, callback)
    }

    pub fn cancel(&mut self, task: TaskId) -> bool {
        self.scheduler.cancel(task)
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    /// Earliest time a pending task wants to run
    pub fn next_due(&mut self) -> Option<Duration> {
        self.scheduler.next_due()
    }

    /// Feeds a new snapshot taken at `now`. Timers due by then run first.
    pub fn input(&mut self, state: ControllerState, now: Duration) {
        self.run_due(now);
        let previous = self.current;
        self.update(previous, state);
    }

    /// Runs every task due at `now`, then flushes once
    pub fn run_scheduled(&mut self, now: Duration) {
        self.run_due(now);
        self.flush();
    }

    fn run_due(&mut self, now: Duration) {
        let horizon = self.scheduler.horizon();
        let mut fired = 0;
        while let Some(callback) = self.scheduler.pop_due(now, horizon) {
            callback(self);
            fired += 1;
        }
        if fired > 0 {
            trace!("Ran {} scheduled tasks at {:?}", fired, now);
        }
    }

    /// Dispatches every difference between two snapshots, then flushes
    pub fn update(&mut self, previous: ControllerState, current: ControllerState) {
        self.previous = previous;
        self.current = current;
        self.forced = std::mem::take(&mut self.forced_next);

        for button in previous.buttons.changed(current.buttons) {
            let pressed = current.is_pressed(button);
            if let Some(action) = self.profile.buttons.get(&button).cloned() {
                trace!("{} {}", button, if pressed { "pressed" } else { "released" });
                action.on_button(self, pressed);
            }
        }

        for source in Source::PAIRS {
            self.update_pair(source);
        }
        for source in Source::TRIGGERS {
            self.update_trigger(source);
        }
        self.update_gyro();

        self.flush();
    }

    fn binding(&self, source: Source) -> ActionRef {
        self.profile.binding(source).clone()
    }

    fn press_changed(&self, source: Source) -> bool {
        source
            .press_button()
            .is_some_and(|b| self.previous.is_pressed(b) != self.current.is_pressed(b))
    }

    fn update_pair(&mut self, source: Source) {
        let forced = self.forced.contains(&source);
        let moved = self.previous.pair(source) != self.current.pair(source);
        let press_changed = self.press_changed(source);
        let touched = self.is_touched(source);
        let dispatch = if source.is_pad() {
            let touch_changed = touched != self.was_touched(source);
            (touched && moved) || touch_changed || press_changed || forced
        } else {
            moved || press_changed || forced
        };
        if !dispatch {
            return;
        }
        let (x, y) = if source.is_pad() && !touched {
            (0, 0)
        } else {
            self.current.pair(source)
        };
        trace!("{:?} at ({}, {})", source, x, y);
        self.binding(source).on_pair(self, x as f64, y as f64, source);
    }

    fn update_trigger(&mut self, source: Source) {
        let value = self.current.trigger(source);
        if value == self.previous.trigger(source) && !self.forced.contains(&source) {
            return;
        }
        trace!("{:?} at {}", source, value);
        self.binding(source).on_axis(self, value as f64, source);
    }

    fn update_gyro(&mut self) {
        let gyro = self.current.gyro();
        if gyro == self.previous.gyro() && !self.forced.contains(&Source::Gyro) {
            return;
        }
        let (pitch, yaw, roll) = gyro;
        self.binding(Source::Gyro)
            .on_gyro(self, pitch as f64, yaw as f64, roll as f64);
    }

    /// Writes whole units of accumulated motion and commits the batch
    pub fn flush(&mut self) {
        let (mx, my) = (self.motion.0.trunc(), self.motion.1.trunc());
        if mx != 0.0 || my != 0.0 {
            self.motion.0 -= mx;
            self.motion.1 -= my;
            self.sink.move_relative(mx as i32, my as i32);
            self.dirty = true;
        }
        let (wx, wy) = (self.wheel.0.trunc(), self.wheel.1.trunc());
        if wx != 0.0 || wy != 0.0 {
            self.wheel.0 -= wx;
            self.wheel.1 -= wy;
            self.sink.scroll_relative(wx as i32, wy as i32);
            self.dirty = true;
        }
        if self.dirty {
            self.sink.synchronize();
            self.dirty = false;
            debug!("Synchronized output at {:?}", self.now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{OutputEvent, RecordingSink};
    use crate::parser::parse;
    use crate::controller::SCButtons;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn mapper_with(button: SCButton, expr: &str) -> (Mapper, RecordingSink) {
        let mut profile = Profile::empty();
        profile.buttons.insert(button, parse(expr).unwrap());
        let sink = RecordingSink::new();
        (Mapper::new(profile, Box::new(sink.clone())), sink)
    }

    fn with_buttons(buttons: &[SCButton]) -> ControllerState {
        ControllerState {
            buttons: SCButtons::from_buttons(buttons),
            ..Default::default()
        }
    }

    #[test]
    fn button_press_and_release_are_synchronized_once_each() {
        let (mut mapper, sink) = mapper_with(SCButton::A, "button(Keys.KEY_A)");
        mapper.input(with_buttons(&[SCButton::A]), ms(0));
        mapper.input(with_buttons(&[]), ms(10));
        assert_eq!(
            sink.events(),
            vec![
                OutputEvent::Press(Keys::KEY_A),
                OutputEvent::Sync,
                OutputEvent::Release(Keys::KEY_A),
                OutputEvent::Sync,
            ]
        );
    }

    #[test]
    fn unchanged_snapshot_writes_nothing() {
        let (mut mapper, sink) = mapper_with(SCButton::A, "button(Keys.KEY_A)");
        mapper.input(with_buttons(&[SCButton::A]), ms(0));
        sink.take();
        mapper.input(with_buttons(&[SCButton::A]), ms(10));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn shared_key_is_released_by_its_last_holder() {
        let mut profile = Profile::empty();
        profile.buttons.insert(SCButton::A, parse("button(Keys.KEY_LEFTSHIFT)").unwrap());
        profile.buttons.insert(SCButton::B, parse("button(Keys.KEY_LEFTSHIFT)").unwrap());
        let sink = RecordingSink::new();
        let mut mapper = Mapper::new(profile, Box::new(sink.clone()));

        mapper.input(with_buttons(&[SCButton::A]), ms(0));
        mapper.input(with_buttons(&[SCButton::A, SCButton::B]), ms(10));
        assert_eq!(mapper.key_holders(Keys::KEY_LEFTSHIFT), 2);
        mapper.input(with_buttons(&[SCButton::B]), ms(20));
        assert_eq!(sink.writes(), vec![OutputEvent::Press(Keys::KEY_LEFTSHIFT)]);
        mapper.input(with_buttons(&[]), ms(30));
        assert_eq!(
            sink.writes(),
            vec![
                OutputEvent::Press(Keys::KEY_LEFTSHIFT),
                OutputEvent::Release(Keys::KEY_LEFTSHIFT),
            ]
        );
    }

    #[test]
    fn releasing_an_unheld_key_is_ignored() {
        let (mut mapper, sink) = mapper_with(SCButton::A, "button(Keys.KEY_A)");
        mapper.release_key(Keys::KEY_B);
        mapper.flush();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn sub_pixel_motion_carries_over() {
        let (mut mapper, sink) = mapper_with(SCButton::A, "None");
        mapper.move_mouse(0.6, -0.4);
        mapper.flush();
        assert!(sink.events().is_empty());
        mapper.move_mouse(0.6, -0.7);
        mapper.flush();
        assert_eq!(sink.writes(), vec![OutputEvent::Move(1, -1)]);
        mapper.move_mouse(0.3, 0.0);
        mapper.flush();
        assert_eq!(sink.writes(), vec![OutputEvent::Move(1, -1), OutputEvent::Move(1, 0)]);
    }

    #[test]
    fn timers_run_before_the_snapshot_they_precede() {
        let (mut mapper, sink) = mapper_with(SCButton::A, "None");
        mapper.schedule(ms(5), |m| m.press_key(Keys::KEY_Z));
        mapper.input(with_buttons(&[]), ms(4));
        assert!(sink.events().is_empty());
        mapper.run_scheduled(ms(5));
        assert_eq!(sink.writes(), vec![OutputEvent::Press(Keys::KEY_Z)]);
        assert_eq!(mapper.pending_tasks(), 0);
    }

    #[test]
    fn profile_swap_releases_everything() {
        let (mut mapper, sink) = mapper_with(SCButton::A, "button(Keys.KEY_A)");
        mapper.input(with_buttons(&[SCButton::A]), ms(0));
        mapper.schedule(ms(100), |m| m.press_key(Keys::KEY_Q));
        mapper.set_profile(Profile::empty());
        assert_eq!(mapper.pending_tasks(), 0);
        assert_eq!(mapper.key_holders(Keys::KEY_A), 0);
        mapper.run_scheduled(ms(200));
        assert_eq!(
            sink.writes(),
            vec![OutputEvent::Press(Keys::KEY_A), OutputEvent::Release(Keys::KEY_A)]
        );
    }

    #[test]
    fn stick_dispatches_both_axes_together() {
        let mut profile = Profile::empty();
        profile.stick = parse("XY(axis(Axes.ABS_X), axis(Axes.ABS_Y))").unwrap();
        let sink = RecordingSink::new();
        let mut mapper = Mapper::new(profile, Box::new(sink.clone()));
        let state = ControllerState {
            stick_x: 32767,
            ..Default::default()
        };
        mapper.input(state, ms(0));
        let writes = sink.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], OutputEvent::Axis(Axes::ABS_X, 32767));
        assert!(matches!(writes[1], OutputEvent::Axis(Axes::ABS_Y, _)));
    }
}
