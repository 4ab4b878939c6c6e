use padmapper::constants::Keys;
use padmapper::controller::{ControllerState, SCButton, SCButtons, Source};
use padmapper::output::{OutputEvent, RecordingSink};
use padmapper::{parse, Mapper, Profile};
use std::time::Duration;

const DESKTOP: &str = r#"{
    "name": "desktop",
    "buttons": {
        "A": {"action": "button(Keys.BTN_LEFT)"},
        "B": {"action": "button(Keys.BTN_RIGHT)"},
        "X": {"action": "button(Keys.KEY_ENTER)", "hold": {"action": "button(Keys.KEY_ESC)"}},
        "START": {"action": "tap(button(Keys.KEY_SPACE), 2)"},
        "LB": {"action": "oops("}
    },
    "stick": {"action": "XY(axis(Axes.ABS_X), raxis(Axes.ABS_Y))", "deadzone": {"lower": 2000}},
    "right_pad": {"action": "ball(mouse())", "sensitivity": [2.0]},
    "trigger_left": {"action": "trigger(254, button(Keys.BTN_MIDDLE))"}
}"#;

fn scratch_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("padmapper-test-{}", std::process::id()))
        .join(name)
}

#[tokio::test]
async fn saved_profile_loads_back_equal() {
    let profile = Profile::from_json(DESKTOP).unwrap();
    assert_eq!(profile.diagnostics.len(), 1);
    assert_eq!(profile.diagnostics[0].entry, "buttons.LB");

    let path = scratch_path("desktop.json");
    profile.save(&path).await.unwrap();
    let loaded = Profile::load(&path).await.unwrap();
    let _ = tokio::fs::remove_file(&path).await;

    assert_eq!(loaded.name, "desktop");
    // the broken LB entry is written back as the user left it
    assert_eq!(loaded.diagnostics.len(), 1);
    assert_eq!(loaded.diagnostics[0].entry, "buttons.LB");
    assert_eq!(loaded.diagnostics[0].raw, profile.diagnostics[0].raw);
    assert_eq!(loaded.buttons.len(), 4);
    for (button, action) in &profile.buttons {
        assert_eq!(loaded.button(*button).to_string(), action.to_string());
    }
    for source in Source::ALL {
        assert_eq!(
            loaded.binding(source).to_string(),
            profile.binding(source).to_string()
        );
    }
}

#[test]
fn loaded_profile_drives_the_mapper() {
    let profile = Profile::from_json(DESKTOP).unwrap();
    let sink = RecordingSink::new();
    let mut mapper = Mapper::new(profile, Box::new(sink.clone()));
    let buttons = |b: &[SCButton]| ControllerState {
        buttons: SCButtons::from_buttons(b),
        ..Default::default()
    };

    mapper.input(buttons(&[SCButton::START]), Duration::from_millis(0));
    mapper.input(buttons(&[SCButton::A]), Duration::from_millis(10));
    mapper.input(buttons(&[]), Duration::from_millis(20));
    assert_eq!(
        sink.writes(),
        vec![
            OutputEvent::Press(Keys::KEY_SPACE),
            OutputEvent::Release(Keys::KEY_SPACE),
            OutputEvent::Press(Keys::KEY_SPACE),
            OutputEvent::Release(Keys::KEY_SPACE),
            OutputEvent::Press(Keys::BTN_LEFT),
            OutputEvent::Release(Keys::BTN_LEFT),
        ]
    );
}

#[test]
fn swapping_profiles_mid_press_releases_old_keys() {
    let mut first = Profile::empty();
    first.buttons.insert(SCButton::A, parse("button(Keys.KEY_A)").unwrap());
    let mut second = Profile::empty();
    second.buttons.insert(SCButton::A, parse("button(Keys.KEY_B)").unwrap());

    let sink = RecordingSink::new();
    let mut mapper = Mapper::new(first, Box::new(sink.clone()));
    let held = ControllerState {
        buttons: SCButtons::from_buttons(&[SCButton::A]),
        ..Default::default()
    };
    mapper.input(held, Duration::from_millis(0));
    mapper.set_profile(second);
    // the new binding only reacts to the next edge
    mapper.input(ControllerState::default(), Duration::from_millis(10));
    mapper.input(held, Duration::from_millis(20));
    assert_eq!(
        sink.writes(),
        vec![
            OutputEvent::Press(Keys::KEY_A),
            OutputEvent::Release(Keys::KEY_A),
            OutputEvent::Press(Keys::KEY_B),
        ]
    );
}
