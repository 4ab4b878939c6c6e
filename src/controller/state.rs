use serde::{Deserialize, Serialize};
use std::fmt;

pub const STICK_PAD_MIN: i32 = -32768;
pub const STICK_PAD_MAX: i32 = 32767;
pub const TRIGGER_MIN: i32 = 0;
pub const TRIGGER_MAX: i32 = 255;
/// Trigger level at which a plain button bound to a trigger is pressed
pub const TRIGGER_CLICK: i32 = 254;

macro_rules! sc_buttons {
    ($($name:ident = $bit:expr),* $(,)?) => {
        /// Physical buttons of the controller, as they appear in the state bitmask
        #[allow(non_camel_case_types, clippy::upper_case_acronyms)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum SCButton {
            $($name),*
        }

        impl SCButton {
            /// All buttons in dispatch order
            pub const ALL: &'static [SCButton] = &[$(SCButton::$name),*];

            pub const fn bit(self) -> u32 {
                match self {
                    $(SCButton::$name => $bit),*
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(SCButton::$name => stringify!($name)),*
                }
            }

            pub fn from_name(name: &str) -> Option<SCButton> {
                match name {
                    $(stringify!($name) => Some(SCButton::$name),)*
                    _ => None,
                }
            }
        }
    };
}

sc_buttons! {
    A = 1 << 0,
    B = 1 << 1,
    X = 1 << 2,
    Y = 1 << 3,
    LB = 1 << 4,
    RB = 1 << 5,
    LT = 1 << 6,
    RT = 1 << 7,
    LGRIP = 1 << 8,
    RGRIP = 1 << 9,
    BACK = 1 << 10,
    C = 1 << 11,
    START = 1 << 12,
    STICKPRESS = 1 << 13,
    LPAD = 1 << 14,
    RPAD = 1 << 15,
    LPADTOUCH = 1 << 16,
    RPADTOUCH = 1 << 17,
}

impl fmt::Display for SCButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Button bitmask of one controller report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SCButtons(pub u32);

impl SCButtons {
    pub const fn empty() -> Self {
        SCButtons(0)
    }

    pub fn from_buttons(buttons: &[SCButton]) -> Self {
        SCButtons(buttons.iter().fold(0, |acc, b| acc | b.bit()))
    }

    pub fn contains(self, button: SCButton) -> bool {
        self.0 & button.bit() != 0
    }

    pub fn with(self, button: SCButton) -> Self {
        SCButtons(self.0 | button.bit())
    }

    pub fn without(self, button: SCButton) -> Self {
        SCButtons(self.0 & !button.bit())
    }

    /// Buttons whose bit differs between the two masks, in dispatch order
    pub fn changed(self, other: SCButtons) -> impl Iterator<Item = SCButton> {
        let xor = self.0 ^ other.0;
        SCButton::ALL
            .iter()
            .copied()
            .filter(move |b| xor & b.bit() != 0)
    }
}

/// Input channel a value was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    Stick,
    LeftPad,
    RightPad,
    LeftTrigger,
    RightTrigger,
    Gyro,
}

impl Source {
    pub const ALL: [Source; 6] = [
        Source::Stick,
        Source::LeftPad,
        Source::RightPad,
        Source::LeftTrigger,
        Source::RightTrigger,
        Source::Gyro,
    ];
    pub const PAIRS: [Source; 3] = [Source::Stick, Source::LeftPad, Source::RightPad];
    pub const TRIGGERS: [Source; 2] = [Source::LeftTrigger, Source::RightTrigger];

    pub fn is_pad(self) -> bool {
        matches!(self, Source::LeftPad | Source::RightPad)
    }

    pub fn is_trigger(self) -> bool {
        matches!(self, Source::LeftTrigger | Source::RightTrigger)
    }

    /// Button that reports the channel as physically pressed (clicked)
    pub fn press_button(self) -> Option<SCButton> {
        match self {
            Source::Stick => Some(SCButton::STICKPRESS),
            Source::LeftPad => Some(SCButton::LPAD),
            Source::RightPad => Some(SCButton::RPAD),
            Source::LeftTrigger => Some(SCButton::LT),
            Source::RightTrigger => Some(SCButton::RT),
            Source::Gyro => None,
        }
    }

    /// Button that reports finger contact, only pads have one
    pub fn touch_button(self) -> Option<SCButton> {
        match self {
            Source::LeftPad => Some(SCButton::LPADTOUCH),
            Source::RightPad => Some(SCButton::RPADTOUCH),
            _ => None,
        }
    }

    /// Raw value range of a single axis of this channel
    pub fn range(self) -> (i32, i32) {
        if self.is_trigger() {
            (TRIGGER_MIN, TRIGGER_MAX)
        } else {
            (STICK_PAD_MIN, STICK_PAD_MAX)
        }
    }
}

/// Immutable snapshot of one controller report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerState {
    pub buttons: SCButtons,
    pub ltrig: u8,
    pub rtrig: u8,
    pub stick_x: i16,
    pub stick_y: i16,
    pub lpad_x: i16,
    pub lpad_y: i16,
    pub rpad_x: i16,
    pub rpad_y: i16,
    pub gpitch: i16,
    pub groll: i16,
    pub gyaw: i16,
    pub q1: i16,
    pub q2: i16,
    pub q3: i16,
    pub q4: i16,
}

impl ControllerState {
    pub fn is_pressed(&self, button: SCButton) -> bool {
        self.buttons.contains(button)
    }

    /// Both axes of a two-axis channel
    pub fn pair(&self, source: Source) -> (i32, i32) {
        match source {
            Source::Stick => (self.stick_x as i32, self.stick_y as i32),
            Source::LeftPad => (self.lpad_x as i32, self.lpad_y as i32),
            Source::RightPad => (self.rpad_x as i32, self.rpad_y as i32),
            Source::LeftTrigger => (self.ltrig as i32, 0),
            Source::RightTrigger => (self.rtrig as i32, 0),
            Source::Gyro => (self.gpitch as i32, self.gyaw as i32),
        }
    }

    pub fn trigger(&self, source: Source) -> i32 {
        match source {
            Source::LeftTrigger => self.ltrig as i32,
            Source::RightTrigger => self.rtrig as i32,
            _ => 0,
        }
    }

    /// Angular rates as (pitch, yaw, roll)
    pub fn gyro(&self) -> (i32, i32, i32) {
        (self.gpitch as i32, self.gyaw as i32, self.groll as i32)
    }

    /// Finger contact for pads; the stick counts as touched while deflected
    pub fn is_touched(&self, source: Source) -> bool {
        match source.touch_button() {
            Some(touch) => self.buttons.contains(touch),
            None => {
                let (x, y) = self.pair(source);
                x != 0 || y != 0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_lists_buttons_in_dispatch_order() {
        let old = SCButtons::from_buttons(&[SCButton::B, SCButton::START]);
        let new = SCButtons::from_buttons(&[SCButton::A, SCButton::START]);
        let changed: Vec<_> = old.changed(new).collect();
        assert_eq!(changed, vec![SCButton::A, SCButton::B]);
    }

    #[test]
    fn button_names_resolve_back() {
        for b in SCButton::ALL {
            assert_eq!(SCButton::from_name(b.name()), Some(*b));
        }
        assert_eq!(SCButton::from_name("KEY_A"), None);
    }

    #[test]
    fn pad_touch_comes_from_bitmask() {
        let mut state = ControllerState::default();
        assert!(!state.is_touched(Source::LeftPad));
        state.buttons = state.buttons.with(SCButton::LPADTOUCH);
        assert!(state.is_touched(Source::LeftPad));
        assert!(!state.is_touched(Source::RightPad));
        state.stick_x = 100;
        assert!(state.is_touched(Source::Stick));
    }

    #[test]
    fn snapshot_deserializes_with_defaults() {
        let state: ControllerState =
            serde_json::from_str(r#"{"buttons": 3, "ltrig": 40}"#).unwrap();
        assert!(state.is_pressed(SCButton::A));
        assert!(state.is_pressed(SCButton::B));
        assert_eq!(state.trigger(Source::LeftTrigger), 40);
        assert_eq!(state.stick_x, 0);
    }
}
