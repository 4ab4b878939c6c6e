//! Closed enumerations the expression language can name.
//!
//! Every group is reachable from an expression through its namespace, e.g.
//! `Keys.KEY_A`, `Axes.ABS_X`, `Rels.REL_WHEEL` or `HapticPos.LEFT`. Codes follow
//! the Linux input event codes so an output sink can forward them unchanged.

use std::fmt;

macro_rules! named_codes {
    ($(#[$meta:meta])* $ty:ident, $ns:literal { $($name:ident = $code:expr),* $(,)? }) => {
        $(#[$meta])*
        #[allow(non_camel_case_types, clippy::upper_case_acronyms)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $ty {
            $($name),*
        }

        impl $ty {
            pub const NAMESPACE: &'static str = $ns;
            pub const ALL: &'static [$ty] = &[$($ty::$name),*];

            pub const fn code(self) -> u16 {
                match self {
                    $($ty::$name => $code),*
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($ty::$name => stringify!($name)),*
                }
            }

            pub fn from_name(name: &str) -> Option<$ty> {
                match name {
                    $(stringify!($name) => Some($ty::$name),)*
                    _ => None,
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}.{}", $ns, self.name())
            }
        }
    };
}

named_codes! {
    /// Keyboard keys, mouse buttons and gamepad buttons
    Keys, "Keys" {
        KEY_ESC = 1,
        KEY_1 = 2,
        KEY_2 = 3,
        KEY_3 = 4,
        KEY_4 = 5,
        KEY_5 = 6,
        KEY_6 = 7,
        KEY_7 = 8,
        KEY_8 = 9,
        KEY_9 = 10,
        KEY_0 = 11,
        KEY_MINUS = 12,
        KEY_EQUAL = 13,
        KEY_BACKSPACE = 14,
        KEY_TAB = 15,
        KEY_Q = 16,
        KEY_W = 17,
        KEY_E = 18,
        KEY_R = 19,
        KEY_T = 20,
        KEY_Y = 21,
        KEY_U = 22,
        KEY_I = 23,
        KEY_O = 24,
        KEY_P = 25,
        KEY_LEFTBRACE = 26,
        KEY_RIGHTBRACE = 27,
        KEY_ENTER = 28,
        KEY_LEFTCTRL = 29,
        KEY_A = 30,
        KEY_S = 31,
        KEY_D = 32,
        KEY_F = 33,
        KEY_G = 34,
        KEY_H = 35,
        KEY_J = 36,
        KEY_K = 37,
        KEY_L = 38,
        KEY_SEMICOLON = 39,
        KEY_APOSTROPHE = 40,
        KEY_GRAVE = 41,
        KEY_LEFTSHIFT = 42,
        KEY_BACKSLASH = 43,
        KEY_Z = 44,
        KEY_X = 45,
        KEY_C = 46,
        KEY_V = 47,
        KEY_B = 48,
        KEY_N = 49,
        KEY_M = 50,
        KEY_COMMA = 51,
        KEY_DOT = 52,
        KEY_SLASH = 53,
        KEY_RIGHTSHIFT = 54,
        KEY_KPASTERISK = 55,
        KEY_LEFTALT = 56,
        KEY_SPACE = 57,
        KEY_CAPSLOCK = 58,
        KEY_F1 = 59,
        KEY_F2 = 60,
        KEY_F3 = 61,
        KEY_F4 = 62,
        KEY_F5 = 63,
        KEY_F6 = 64,
        KEY_F7 = 65,
        KEY_F8 = 66,
        KEY_F9 = 67,
        KEY_F10 = 68,
        KEY_NUMLOCK = 69,
        KEY_SCROLLLOCK = 70,
        KEY_F11 = 87,
        KEY_F12 = 88,
        KEY_RIGHTCTRL = 97,
        KEY_RIGHTALT = 100,
        KEY_HOME = 102,
        KEY_UP = 103,
        KEY_PAGEUP = 104,
        KEY_LEFT = 105,
        KEY_RIGHT = 106,
        KEY_END = 107,
        KEY_DOWN = 108,
        KEY_PAGEDOWN = 109,
        KEY_INSERT = 110,
        KEY_DELETE = 111,
        KEY_MUTE = 113,
        KEY_VOLUMEDOWN = 114,
        KEY_VOLUMEUP = 115,
        KEY_PAUSE = 119,
        KEY_LEFTMETA = 125,
        KEY_RIGHTMETA = 126,
        KEY_NEXTSONG = 163,
        KEY_PLAYPAUSE = 164,
        KEY_PREVIOUSSONG = 165,
        BTN_LEFT = 0x110,
        BTN_RIGHT = 0x111,
        BTN_MIDDLE = 0x112,
        BTN_SIDE = 0x113,
        BTN_EXTRA = 0x114,
        BTN_A = 0x130,
        BTN_B = 0x131,
        BTN_X = 0x133,
        BTN_Y = 0x134,
        BTN_TL = 0x136,
        BTN_TR = 0x137,
        BTN_TL2 = 0x138,
        BTN_TR2 = 0x139,
        BTN_SELECT = 0x13a,
        BTN_START = 0x13b,
        BTN_MODE = 0x13c,
        BTN_THUMBL = 0x13d,
        BTN_THUMBR = 0x13e,
    }
}

named_codes! {
    /// Absolute axes of the emulated gamepad
    Axes, "Axes" {
        ABS_X = 0x00,
        ABS_Y = 0x01,
        ABS_Z = 0x02,
        ABS_RX = 0x03,
        ABS_RY = 0x04,
        ABS_RZ = 0x05,
        ABS_HAT0X = 0x10,
        ABS_HAT0Y = 0x11,
    }
}

named_codes! {
    /// Relative axes of the emulated mouse
    Rels, "Rels" {
        REL_X = 0x00,
        REL_Y = 0x01,
        REL_HWHEEL = 0x06,
        REL_WHEEL = 0x08,
    }
}

named_codes! {
    /// Haptic actuator selection
    HapticPos, "HapticPos" {
        LEFT = 0,
        RIGHT = 1,
        BOTH = 2,
    }
}

impl Keys {
    /// Short human label, `KEY_A` -> `A`, `BTN_LEFT` -> `Mouse Left`
    pub fn label(self) -> String {
        let name = self.name();
        match self {
            Keys::BTN_LEFT => "Mouse Left".to_owned(),
            Keys::BTN_RIGHT => "Mouse Right".to_owned(),
            Keys::BTN_MIDDLE => "Mouse Middle".to_owned(),
            _ => name
                .strip_prefix("KEY_")
                .or_else(|| name.strip_prefix("BTN_"))
                .unwrap_or(name)
                .to_owned(),
        }
    }
}

impl Axes {
    /// Output range of the axis on the emulated gamepad
    pub fn range(self) -> (i32, i32) {
        match self {
            Axes::ABS_Z | Axes::ABS_RZ => (0, 255),
            Axes::ABS_HAT0X | Axes::ABS_HAT0Y => (-1, 1),
            _ => (-32767, 32767),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Axes::ABS_X => "LStick X",
            Axes::ABS_Y => "LStick Y",
            Axes::ABS_Z => "Left Trigger",
            Axes::ABS_RX => "RStick X",
            Axes::ABS_RY => "RStick Y",
            Axes::ABS_RZ => "Right Trigger",
            Axes::ABS_HAT0X => "DPad X",
            Axes::ABS_HAT0Y => "DPad Y",
        }
    }
}

impl Rels {
    pub fn is_wheel(self) -> bool {
        matches!(self, Rels::REL_WHEEL | Rels::REL_HWHEEL)
    }
}

/// Any constant an expression can name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    Key(Keys),
    Axis(Axes),
    Rel(Rels),
    Haptic(HapticPos),
    Button(crate::controller::SCButton),
}

impl Constant {
    /// Resolves `namespace.member`
    pub fn resolve(namespace: &str, member: &str) -> Option<Constant> {
        match namespace {
            Keys::NAMESPACE => Keys::from_name(member).map(Constant::Key),
            Axes::NAMESPACE => Axes::from_name(member).map(Constant::Axis),
            Rels::NAMESPACE => Rels::from_name(member).map(Constant::Rel),
            HapticPos::NAMESPACE => HapticPos::from_name(member).map(Constant::Haptic),
            "SCButtons" => crate::controller::SCButton::from_name(member).map(Constant::Button),
            _ => None,
        }
    }

    pub fn is_namespace(name: &str) -> bool {
        matches!(
            name,
            Keys::NAMESPACE | Axes::NAMESPACE | Rels::NAMESPACE | HapticPos::NAMESPACE | "SCButtons"
        )
    }

    /// Constants usable without a namespace: button ids and haptic positions
    pub fn resolve_bare(name: &str) -> Option<Constant> {
        crate::controller::SCButton::from_name(name)
            .map(Constant::Button)
            .or_else(|| HapticPos::from_name(name).map(Constant::Haptic))
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Key(k) => fmt::Display::fmt(k, f),
            Constant::Axis(a) => fmt::Display::fmt(a, f),
            Constant::Rel(r) => fmt::Display::fmt(r, f),
            Constant::Haptic(h) => f.write_str(h.name()),
            Constant::Button(b) => f.write_str(b.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::SCButton;

    #[test]
    fn dotted_lookup_resolves_every_group() {
        assert_eq!(Constant::resolve("Keys", "KEY_A"), Some(Constant::Key(Keys::KEY_A)));
        assert_eq!(Constant::resolve("Axes", "ABS_RZ"), Some(Constant::Axis(Axes::ABS_RZ)));
        assert_eq!(Constant::resolve("Rels", "REL_WHEEL"), Some(Constant::Rel(Rels::REL_WHEEL)));
        assert_eq!(
            Constant::resolve("SCButtons", "LGRIP"),
            Some(Constant::Button(SCButton::LGRIP))
        );
        assert_eq!(Constant::resolve("Keys", "ABS_X"), None);
        assert_eq!(Constant::resolve("Nope", "KEY_A"), None);
    }

    #[test]
    fn display_uses_namespace() {
        assert_eq!(Keys::BTN_LEFT.to_string(), "Keys.BTN_LEFT");
        assert_eq!(Constant::Haptic(HapticPos::BOTH).to_string(), "BOTH");
        assert_eq!(Keys::KEY_SPACE.label(), "SPACE");
        assert_eq!(Keys::BTN_LEFT.label(), "Mouse Left");
    }
}
