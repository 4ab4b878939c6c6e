use padmapper::actions::{Action, DoubleClickModifier, TriggerAction, TriggerRange};
use padmapper::constants::{Axes, HapticPos, Keys};
use padmapper::controller::{ControllerState, SCButton, SCButtons, Source};
use padmapper::output::{OutputEvent, RecordingSink};
use padmapper::{parse, ActionRef, Mapper, Profile};
use std::time::Duration;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn key(k: Keys) -> ActionRef {
    parse(&format!("button({})", k)).unwrap()
}

struct Harness {
    mapper: Mapper,
    sink: RecordingSink,
    state: ControllerState,
}

impl Harness {
    fn new(profile: Profile) -> Self {
        let sink = RecordingSink::new();
        let mapper = Mapper::new(profile, Box::new(sink.clone()));
        Self {
            mapper,
            sink,
            state: ControllerState::default(),
        }
    }

    fn with_button(button: SCButton, expr: &str) -> Self {
        let mut profile = Profile::empty();
        profile.buttons.insert(button, parse(expr).unwrap());
        Self::new(profile)
    }

    fn with_source(source: Source, action: ActionRef) -> Self {
        let mut profile = Profile::empty();
        *profile.binding_mut(source) = action;
        Self::new(profile)
    }

    fn input(&mut self, t: u64, state: ControllerState) {
        self.state = state;
        self.mapper.input(state, ms(t));
    }

    fn hold(&mut self, t: u64, buttons: &[SCButton]) {
        let state = ControllerState {
            buttons: SCButtons::from_buttons(buttons),
            ..self.state
        };
        self.input(t, state);
    }

    fn trigger(&mut self, t: u64, value: u8) {
        let state = ControllerState {
            ltrig: value,
            ..self.state
        };
        self.input(t, state);
    }

    fn tick(&mut self, t: u64) {
        self.mapper.run_scheduled(ms(t));
    }

    /// Writes since the previous call
    fn drain(&self) -> Vec<OutputEvent> {
        self.sink
            .take()
            .into_iter()
            .filter(|e| *e != OutputEvent::Sync)
            .collect()
    }
}

use OutputEvent::{Press, Release};

#[test]
fn mode_shift_routes_by_held_button_and_releases_what_it_pressed() {
    let mut h = Harness::with_button(
        SCButton::C,
        "mode(A, button(Keys.KEY_1), B, button(Keys.KEY_2), button(Keys.KEY_0))",
    );

    h.hold(0, &[SCButton::C]);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_0)]);
    h.hold(10, &[]);
    assert_eq!(h.drain(), vec![Release(Keys::KEY_0)]);

    h.hold(20, &[SCButton::A]);
    h.hold(30, &[SCButton::A, SCButton::C]);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_1)]);

    h.hold(40, &[SCButton::A, SCButton::B, SCButton::C]);
    h.hold(50, &[SCButton::B, SCButton::C]);
    assert!(h.drain().is_empty());

    // B is selected now, but the release still goes to the branch that pressed
    h.hold(60, &[SCButton::B]);
    assert_eq!(h.drain(), vec![Release(Keys::KEY_1)]);

    h.hold(70, &[SCButton::B, SCButton::C]);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_2)]);
    h.hold(80, &[]);
    assert_eq!(h.drain(), vec![Release(Keys::KEY_2)]);
}

#[test]
fn mode_shift_on_stick_resets_the_branch_it_leaves() {
    let action =
        parse("mode(A, XY(axis(Axes.ABS_RX), axis(Axes.ABS_RY)), XY(axis(Axes.ABS_X), axis(Axes.ABS_Y)))")
            .unwrap();
    let mut h = Harness::with_source(Source::Stick, action);
    h.input(
        0,
        ControllerState {
            stick_x: 32767,
            ..Default::default()
        },
    );
    assert_eq!(
        h.drain(),
        vec![OutputEvent::Axis(Axes::ABS_X, 32767), OutputEvent::Axis(Axes::ABS_Y, 0)]
    );

    // the switch happens with the next stick event
    h.hold(10, &[SCButton::A]);
    assert!(h.drain().is_empty());
    h.input(
        20,
        ControllerState {
            stick_x: 32000,
            ..h.state
        },
    );
    assert_eq!(
        h.drain(),
        vec![
            OutputEvent::Axis(Axes::ABS_X, 0),
            OutputEvent::Axis(Axes::ABS_Y, 0),
            OutputEvent::Axis(Axes::ABS_RX, 32000),
            OutputEvent::Axis(Axes::ABS_RY, 0),
        ]
    );
}

#[test]
fn doubleclick_fires_double_branch_once() {
    let mut h = Harness::with_button(
        SCButton::A,
        "doubleclick(button(Keys.KEY_D), button(Keys.KEY_N))",
    );
    h.hold(0, &[SCButton::A]);
    h.hold(50, &[]);
    h.hold(100, &[SCButton::A]);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_D)]);
    h.hold(150, &[]);
    h.tick(1000);
    assert_eq!(h.drain(), vec![Release(Keys::KEY_D)]);
    assert_eq!(h.mapper.pending_tasks(), 0);
}

#[test]
fn hold_fires_held_branch_once_and_never_normal() {
    let mut h = Harness::with_button(SCButton::A, "hold(button(Keys.KEY_H), button(Keys.KEY_N))");
    h.hold(0, &[SCButton::A]);
    h.tick(150);
    assert!(h.drain().is_empty());
    h.tick(250);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_H)]);
    h.hold(400, &[]);
    h.tick(1000);
    assert_eq!(h.drain(), vec![Release(Keys::KEY_H)]);
}

#[test]
fn quick_tap_on_hold_fires_normal_immediately() {
    let mut h = Harness::with_button(SCButton::A, "hold(button(Keys.KEY_H), button(Keys.KEY_N))");
    h.hold(0, &[SCButton::A]);
    h.hold(50, &[]);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_N), Release(Keys::KEY_N)]);
    assert_eq!(h.mapper.pending_tasks(), 0);
}

#[test]
fn single_tap_on_doubleclick_waits_for_timeout() {
    let mut h = Harness::with_button(
        SCButton::A,
        "doubleclick(button(Keys.KEY_D), hold(button(Keys.KEY_H), button(Keys.KEY_N)), 0.3)",
    );
    h.hold(0, &[SCButton::A]);
    h.hold(50, &[]);
    h.tick(250);
    assert!(h.drain().is_empty());
    h.tick(300);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_N), Release(Keys::KEY_N)]);
}

#[test]
fn oversized_doubleclick_timeout_is_refused_at_parse_time() {
    assert!(parse("doubleclick(button(Keys.KEY_D), button(Keys.KEY_N), 1e300)").is_err());

    // built directly, the node still never panics: the timer just never fires
    let node = Action::DoubleClick(DoubleClickModifier::doubleclick(
        key(Keys::KEY_D),
        key(Keys::KEY_N),
        Some(1e300),
    ))
    .into_ref();
    let mut profile = Profile::empty();
    profile.buttons.insert(SCButton::A, node);
    let mut h = Harness::new(profile);
    h.hold(0, &[SCButton::A]);
    h.hold(50, &[]);
    h.tick(10_000);
    assert!(h.drain().is_empty());
    assert_eq!(h.mapper.pending_tasks(), 1);
    h.hold(100, &[SCButton::A]);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_D)]);
}

#[test]
fn deadzone_on_scalar_channel() {
    let mut h = Harness::new(Profile::empty());
    let dz = parse("deadzone(100, 2000, axis(Axes.ABS_X))").unwrap();
    for value in [50.0, 150.0, 2500.0] {
        dz.on_axis(&mut h.mapper, value, Source::Stick);
    }
    h.mapper.flush();
    assert_eq!(
        h.drain(),
        vec![
            OutputEvent::Axis(Axes::ABS_X, 0),
            OutputEvent::Axis(Axes::ABS_X, 150),
            OutputEvent::Axis(Axes::ABS_X, 0),
        ]
    );
}

#[test]
fn deadzone_on_pair_uses_distance() {
    let action = parse("deadzone(1000, XY(axis(Axes.ABS_X), axis(Axes.ABS_Y)))").unwrap();
    let mut h = Harness::with_source(Source::Stick, action);
    let stick = |x: i16, y: i16| ControllerState {
        stick_x: x,
        stick_y: y,
        ..Default::default()
    };
    h.input(0, stick(600, 600));
    assert_eq!(
        h.drain(),
        vec![OutputEvent::Axis(Axes::ABS_X, 0), OutputEvent::Axis(Axes::ABS_Y, 0)]
    );
    h.input(10, stick(800, 800));
    assert_eq!(
        h.drain(),
        vec![OutputEvent::Axis(Axes::ABS_X, 800), OutputEvent::Axis(Axes::ABS_Y, 800)]
    );
}

fn split_trigger(release_partially: bool) -> ActionRef {
    TriggerAction::split(
        Some(TriggerRange {
            press: 10,
            release: Some(254),
            action: key(Keys::KEY_H),
        }),
        Some(TriggerRange {
            press: 200,
            release: Some(254),
            action: key(Keys::KEY_F),
        }),
        None,
        release_partially,
    )
}

#[test]
fn partial_release_keeps_half_press_held() {
    let mut h = Harness::with_source(Source::LeftTrigger, split_trigger(true));
    h.trigger(0, 50);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_H)]);
    h.trigger(10, 210);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_F)]);
    h.trigger(20, 150);
    assert_eq!(h.drain(), vec![Release(Keys::KEY_F)]);
    h.trigger(30, 5);
    assert_eq!(h.drain(), vec![Release(Keys::KEY_H)]);
}

#[test]
fn exclusive_stages_hand_over_at_full_press() {
    let mut h = Harness::with_source(Source::LeftTrigger, split_trigger(false));
    h.trigger(0, 50);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_H)]);
    h.trigger(10, 210);
    assert_eq!(h.drain(), vec![Release(Keys::KEY_H), Press(Keys::KEY_F)]);
    h.trigger(20, 150);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_H), Release(Keys::KEY_F)]);
}

#[test]
fn trigger_with_lower_release_level_has_hysteresis() {
    let action = parse("trigger(200, 100, button(Keys.KEY_T))").unwrap();
    let mut h = Harness::with_source(Source::LeftTrigger, action);
    h.trigger(0, 150);
    assert!(h.drain().is_empty());
    h.trigger(10, 220);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_T)]);
    h.trigger(20, 150);
    assert!(h.drain().is_empty());
    h.trigger(30, 90);
    assert_eq!(h.drain(), vec![Release(Keys::KEY_T)]);
}

#[test]
fn macro_steps_are_spaced_in_time() {
    let mut h = Harness::with_button(
        SCButton::A,
        "button(Keys.KEY_A); sleep(100); button(Keys.KEY_B)",
    );
    h.hold(0, &[SCButton::A]);
    h.hold(5, &[]);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_A)]);
    h.tick(30);
    assert_eq!(h.drain(), vec![Release(Keys::KEY_A)]);
    h.tick(129);
    assert!(h.drain().is_empty());
    h.tick(130);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_B)]);
    h.tick(160);
    assert_eq!(h.drain(), vec![Release(Keys::KEY_B)]);
    assert_eq!(h.mapper.pending_tasks(), 0);
}

#[test]
fn repeat_runs_while_held() {
    let mut h = Harness::with_button(SCButton::A, "repeat(button(Keys.KEY_R))");
    h.hold(0, &[SCButton::A]);
    h.tick(30);
    h.tick(60);
    h.hold(70, &[]);
    h.tick(90);
    h.tick(500);
    assert_eq!(
        h.drain(),
        vec![
            Press(Keys::KEY_R),
            Release(Keys::KEY_R),
            Press(Keys::KEY_R),
            Release(Keys::KEY_R),
        ]
    );
    assert_eq!(h.mapper.pending_tasks(), 0);
}

#[test]
fn click_gates_stick_until_pressed() {
    let action = parse("click(button(Keys.KEY_SPACE))").unwrap();
    let mut h = Harness::with_source(Source::Stick, action);
    h.input(
        0,
        ControllerState {
            stick_x: 30000,
            ..Default::default()
        },
    );
    assert!(h.drain().is_empty());
    h.hold(10, &[SCButton::STICKPRESS]);
    assert_eq!(h.drain(), vec![Press(Keys::KEY_SPACE)]);
    h.hold(20, &[]);
    assert_eq!(h.drain(), vec![Release(Keys::KEY_SPACE)]);
}

#[test]
fn feedback_is_surfaced_with_the_press() {
    let mut h = Harness::with_button(SCButton::A, "feedback(LEFT, 256, button(Keys.KEY_A))");
    h.hold(0, &[SCButton::A]);
    let events = h.drain();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], Press(Keys::KEY_A));
    let OutputEvent::Feedback(haptic) = &events[1] else {
        panic!("feedback expected, got {:?}", events[1]);
    };
    assert_eq!(haptic.position, HapticPos::LEFT);
    assert_eq!(haptic.amplitude, 256);
}

#[test]
fn gyro_writes_axes() {
    let action = parse("gyro(Axes.ABS_RX, Axes.ABS_RY)").unwrap();
    let mut h = Harness::with_source(Source::Gyro, action);
    h.input(
        0,
        ControllerState {
            gpitch: 100,
            gyaw: -50,
            ..Default::default()
        },
    );
    assert_eq!(
        h.drain(),
        vec![OutputEvent::Axis(Axes::ABS_RX, 100), OutputEvent::Axis(Axes::ABS_RY, -50)]
    );
}
