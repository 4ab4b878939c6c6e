use super::{
    none, quote_string, Action, ActionRef, AxisAction, BallModifier, ButtonAction, ClickModifier,
    DPadAction, DeadzoneModifier, DoubleClickModifier, FeedbackModifier, GyroAction, Macro,
    ModeModifier, MouseAction, NameModifier, OsdModifier, PressAction, PressKind, RotateModifier,
    SensitivityModifier, SleepAction, SmoothModifier, TriggerAction, XYAction,
};
use crate::constants::{Axes, Constant, HapticPos, Keys, Rels};
use crate::controller::{SCButton, TRIGGER_MAX, TRIGGER_MIN};
use crate::error::ParseError;
use crate::output::HapticData;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Names the expression language can call
const ACTION_NAMES: &[&str] = &[
    "None",
    "button",
    "axis",
    "raxis",
    "mouse",
    "XY",
    "dpad",
    "trigger",
    "gyro",
    "sens",
    "deadzone",
    "smooth",
    "feedback",
    "mode",
    "click",
    "rotate",
    "doubleclick",
    "hold",
    "ball",
    "osd",
    "name",
    "repeat",
    "sleep",
    "press",
    "release",
    "tap",
];

pub fn is_action_name(name: &str) -> bool {
    ACTION_NAMES.contains(&name)
}

/// Parameter value as produced by the parser
#[derive(Debug, Clone)]
pub enum Param {
    Number(f64),
    Str(String),
    Const(Constant),
    Action(ActionRef),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Number(n) => f.write_str(&super::format_number(*n)),
            Param::Str(s) => f.write_str(&quote_string(s)),
            Param::Const(c) => fmt::Display::fmt(c, f),
            Param::Action(a) => fmt::Display::fmt(a, f),
        }
    }
}

/// Cursor over the parameters of one call
struct Params<'a> {
    name: &'a str,
    items: VecDeque<Param>,
}

impl<'a> Params<'a> {
    fn new(name: &'a str, items: Vec<Param>) -> Self {
        Self {
            name,
            items: items.into(),
        }
    }

    fn error(&self, message: impl fmt::Display) -> ParseError {
        ParseError::construction(format!("{}: {}", self.name, message))
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn missing(&self, what: &str) -> ParseError {
        self.error(format_args!("missing {what}"))
    }

    fn number(&mut self, what: &str) -> Result<f64, ParseError> {
        match self.items.pop_front() {
            Some(Param::Number(n)) => Ok(n),
            Some(other) => Err(self.error(format_args!("expected {what}, found {other}"))),
            None => Err(self.missing(what)),
        }
    }

    fn opt_number(&mut self) -> Option<f64> {
        match self.items.front() {
            Some(Param::Number(n)) => {
                let n = *n;
                self.items.pop_front();
                Some(n)
            }
            _ => None,
        }
    }

    fn integer(&mut self, value: f64, what: &str, min: i64, max: i64) -> Result<i64, ParseError> {
        if value.fract() != 0.0 || value < min as f64 || value > max as f64 {
            return Err(self.error(format_args!(
                "{what} must be a whole number in {min}..={max}, found {}",
                super::format_number(value)
            )));
        }
        Ok(value as i64)
    }

    fn constant(&mut self, what: &str) -> Result<Constant, ParseError> {
        match self.items.pop_front() {
            Some(Param::Const(c)) => Ok(c),
            Some(other) => Err(self.error(format_args!("expected {what}, found {other}"))),
            None => Err(self.missing(what)),
        }
    }

    fn key(&mut self) -> Result<Keys, ParseError> {
        match self.constant("key")? {
            Constant::Key(key) => Ok(key),
            other => Err(self.error(format_args!("expected key, found {other}"))),
        }
    }

    fn opt_key(&mut self) -> Result<Option<Keys>, ParseError> {
        match self.items.front() {
            Some(Param::Const(_)) => self.key().map(Some),
            _ => Ok(None),
        }
    }

    fn axis(&mut self) -> Result<Axes, ParseError> {
        match self.constant("axis")? {
            Constant::Axis(axis) => Ok(axis),
            other => Err(self.error(format_args!("expected axis, found {other}"))),
        }
    }

    fn opt_rel(&mut self) -> Result<Option<Rels>, ParseError> {
        match self.items.front() {
            Some(Param::Const(_)) => match self.constant("relative axis")? {
                Constant::Rel(rel) => Ok(Some(rel)),
                other => Err(self.error(format_args!("expected relative axis, found {other}"))),
            },
            _ => Ok(None),
        }
    }

    fn haptic_position(&mut self) -> Result<HapticPos, ParseError> {
        match self.constant("haptic position")? {
            Constant::Haptic(pos) => Ok(pos),
            other => Err(self.error(format_args!("expected haptic position, found {other}"))),
        }
    }

    fn button(&mut self) -> Result<SCButton, ParseError> {
        match self.constant("button")? {
            Constant::Button(button) => Ok(button),
            other => Err(self.error(format_args!("expected button, found {other}"))),
        }
    }

    fn string(&mut self, what: &str) -> Result<String, ParseError> {
        match self.items.pop_front() {
            Some(Param::Str(s)) => Ok(s),
            Some(other) => Err(self.error(format_args!("expected {what}, found {other}"))),
            None => Err(self.missing(what)),
        }
    }

    fn action(&mut self) -> Result<ActionRef, ParseError> {
        match self.items.pop_front() {
            Some(Param::Action(a)) => Ok(a),
            Some(other) => Err(self.error(format_args!("expected action, found {other}"))),
            None => Err(self.missing("action")),
        }
    }

    fn opt_action(&mut self) -> Option<ActionRef> {
        match self.items.front() {
            Some(Param::Action(a)) => {
                let a = a.clone();
                self.items.pop_front();
                Some(a)
            }
            _ => None,
        }
    }

    /// Modifiers take their wrapped action last
    fn last_action(&mut self) -> Result<ActionRef, ParseError> {
        match self.items.pop_back() {
            Some(Param::Action(a)) => Ok(a),
            Some(other) => Err(self.error(format_args!("expected action as last parameter, found {other}"))),
            None => Err(self.missing("action")),
        }
    }

    fn finish(self) -> Result<(), ParseError> {
        match self.items.front() {
            None => Ok(()),
            Some(extra) => Err(self.error(format_args!("unexpected parameter {extra}"))),
        }
    }
}

fn trigger_level(params: &mut Params<'_>, value: f64, what: &str) -> Result<i32, ParseError> {
    params
        .integer(value, what, TRIGGER_MIN as i64, TRIGGER_MAX as i64)
        .map(|v| v as i32)
}

fn haptic_field(params: &mut Params<'_>, value: Option<f64>, default: u16, what: &str) -> Result<u16, ParseError> {
    match value {
        Some(v) => params.integer(v, what, 0, u16::MAX as i64).map(|v| v as u16),
        None => Ok(default),
    }
}

/// Builds the node called `name`, validating its parameters
pub fn build_action(name: &str, params: Vec<Param>) -> Result<ActionRef, ParseError> {
    let mut p = Params::new(name, params);
    let action = match name {
        "None" => {
            p.finish()?;
            return Ok(none());
        }
        "button" => {
            let key = p.key()?;
            let key2 = p.opt_key()?;
            p.finish()?;
            Action::Button(ButtonAction::new(key, key2))
        }
        "axis" | "raxis" => {
            let axis = p.axis()?;
            let range = match p.len() {
                0 => None,
                2 => {
                    let min = p.number("minimum")?;
                    let max = p.number("maximum")?;
                    Some((min.round() as i32, max.round() as i32))
                }
                _ => return Err(p.error("expects both minimum and maximum or neither")),
            };
            p.finish()?;
            Action::Axis(AxisAction::new(axis, range, name == "raxis"))
        }
        "mouse" => {
            let axis = p.opt_rel()?;
            let speed = p.opt_number().unwrap_or(1.0);
            p.finish()?;
            Action::Mouse(MouseAction::new(axis, speed))
        }
        "XY" => {
            let x = p.action()?;
            let y = p.action()?;
            p.finish()?;
            Action::XY(XYAction::new(x, y))
        }
        "dpad" => {
            if p.len() == 0 || p.len() > 4 {
                return Err(p.error("expects one to four actions"));
            }
            let mut actions = [none(), none(), none(), none()];
            for slot in actions.iter_mut() {
                if p.len() == 0 {
                    break;
                }
                *slot = p.action()?;
            }
            p.finish()?;
            Action::DPad(DPadAction::new(actions))
        }
        "trigger" => {
            let child = p.last_action()?;
            let press = p.number("press level")?;
            let press = trigger_level(&mut p, press, "press level")?;
            let release = match p.opt_number() {
                Some(v) => Some(trigger_level(&mut p, v, "release level")?),
                None => None,
            };
            p.finish()?;
            Action::Trigger(TriggerAction::new(press, release, child))
        }
        "gyro" => {
            let mut axes = vec![p.axis()?, p.axis()?];
            if p.len() > 0 {
                axes.push(p.axis()?);
            }
            p.finish()?;
            Action::Gyro(GyroAction::new(axes))
        }
        "sens" => {
            let child = p.last_action()?;
            let mut factors = [1.0; 3];
            factors[0] = p.number("sensitivity")?;
            for factor in factors.iter_mut().skip(1) {
                match p.opt_number() {
                    Some(v) => *factor = v,
                    None => break,
                }
            }
            p.finish()?;
            Action::Sensitivity(SensitivityModifier::new(factors, child))
        }
        "deadzone" => {
            let child = p.last_action()?;
            let lower = p.number("lower bound")?;
            let upper = p.opt_number();
            p.finish()?;
            if lower < 0.0 {
                return Err(ParseError::construction(format!(
                    "deadzone: lower bound must not be negative, found {}",
                    super::format_number(lower)
                )));
            }
            if let Some(upper) = upper.filter(|u| *u < lower) {
                return Err(ParseError::construction(format!(
                    "deadzone: upper bound {} is below lower bound {}",
                    super::format_number(upper),
                    super::format_number(lower)
                )));
            }
            Action::Deadzone(DeadzoneModifier::new(lower, upper, child))
        }
        "smooth" => {
            let child = p.last_action()?;
            let level = match p.opt_number() {
                Some(v) => p.integer(v, "level", 1, 256)? as usize,
                None => SmoothModifier::DEFAULT_LEVEL,
            };
            let multiplier = p.opt_number().unwrap_or(SmoothModifier::DEFAULT_MULTIPLIER);
            let filter = p.opt_number().unwrap_or(SmoothModifier::DEFAULT_FILTER);
            p.finish()?;
            Action::Smooth(SmoothModifier::new(level, multiplier, filter, child))
        }
        "feedback" => {
            let child = p.last_action()?;
            let position = p.haptic_position()?;
            let mut haptic = HapticData::new(position);
            let amplitude = p.opt_number();
            haptic.amplitude = haptic_field(&mut p, amplitude, HapticData::DEFAULT_AMPLITUDE, "amplitude")?;
            let frequency = p.opt_number();
            haptic.frequency = haptic_field(&mut p, frequency, HapticData::DEFAULT_FREQUENCY, "frequency")?;
            let period = p.opt_number();
            haptic.period = haptic_field(&mut p, period, HapticData::DEFAULT_PERIOD, "period")?;
            let count = p.opt_number();
            haptic.count = haptic_field(&mut p, count, HapticData::DEFAULT_COUNT, "count")?;
            p.finish()?;
            Action::Feedback(FeedbackModifier::new(haptic, child))
        }
        "mode" => {
            if p.len() == 0 {
                return Err(p.missing("button"));
            }
            let mut modes = Vec::new();
            while p.len() >= 2 {
                let button = p.button()?;
                let action = p.action()?;
                if modes.iter().any(|(b, _)| *b == button) {
                    return Err(ParseError::construction(format!(
                        "mode: button {} is listed twice",
                        button.name()
                    )));
                }
                modes.push((button, action));
            }
            let default = p.opt_action().unwrap_or_else(none);
            p.finish()?;
            Action::Mode(ModeModifier::new(modes, default))
        }
        "click" => {
            let child = p.action()?;
            p.finish()?;
            Action::Click(ClickModifier::new(child))
        }
        "rotate" => {
            let angle = p.number("angle")?;
            let child = p.action()?;
            p.finish()?;
            Action::Rotate(RotateModifier::new(angle, child))
        }
        "doubleclick" | "hold" => {
            let first = p.action()?;
            let normal = p.action()?;
            let timeout = p.opt_number();
            p.finish()?;
            if let Some(t) = timeout.filter(|t| Duration::try_from_secs_f64(*t).is_err()) {
                return Err(ParseError::construction(format!(
                    "{name}: timeout must be a non-negative number of seconds, found {}",
                    super::format_number(t)
                )));
            }
            if name == "hold" {
                Action::DoubleClick(DoubleClickModifier::hold(first, normal, timeout))
            } else {
                Action::DoubleClick(DoubleClickModifier::doubleclick(first, normal, timeout))
            }
        }
        "ball" => {
            let child = p.last_action()?;
            let friction = p.opt_number().unwrap_or(BallModifier::DEFAULT_FRICTION);
            let mean_len = match p.opt_number() {
                Some(v) => p.integer(v, "mean length", 1, 1000)? as usize,
                None => BallModifier::DEFAULT_MEAN_LEN,
            };
            p.finish()?;
            if friction <= 0.0 {
                return Err(ParseError::construction(format!(
                    "ball: friction must be positive, found {}",
                    super::format_number(friction)
                )));
            }
            Action::Ball(BallModifier::new(friction, mean_len, child))
        }
        "osd" => {
            let child = p.last_action()?;
            let timeout = p.opt_number();
            p.finish()?;
            Action::Osd(OsdModifier::new(timeout, child))
        }
        "name" => {
            let label = p.string("name")?;
            let child = p.action()?;
            p.finish()?;
            Action::Name(NameModifier::new(label, child))
        }
        "repeat" => {
            let body = p.action()?;
            p.finish()?;
            let steps = match &*body {
                Action::Macro(mac) if !mac.repeat => mac.steps.clone(),
                _ => vec![body],
            };
            Action::Macro(Macro::new(steps, true))
        }
        "sleep" => {
            let millis = p.number("delay")?;
            p.finish()?;
            if !(0.0..=3_600_000.0).contains(&millis) {
                return Err(ParseError::construction(format!(
                    "sleep: delay out of range, found {}",
                    super::format_number(millis)
                )));
            }
            Action::Sleep(SleepAction::new(Duration::from_secs_f64(millis / 1000.0)))
        }
        "press" | "release" => {
            let child = p.action()?;
            p.finish()?;
            let kind = if name == "press" {
                PressKind::Press
            } else {
                PressKind::Release
            };
            Action::Press(PressAction::new(kind, child))
        }
        "tap" => {
            let child = p.action()?;
            let count = match p.opt_number() {
                Some(v) => p.integer(v, "count", 1, 1000)? as u32,
                None => 1,
            };
            p.finish()?;
            Action::Press(PressAction::new(PressKind::Tap(count), child))
        }
        _ => return Err(ParseError::construction(format!("unknown action '{name}'"))),
    };
    Ok(action.into_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: Keys) -> Param {
        Param::Const(Constant::Key(k))
    }

    fn act(a: ActionRef) -> Param {
        Param::Action(a)
    }

    #[test]
    fn builds_button() {
        let a = build_action("button", vec![key(Keys::KEY_A)]).unwrap();
        assert_eq!(a.to_string(), "button(Keys.KEY_A)");
    }

    #[test]
    fn wrong_constant_kind_is_construction_error() {
        let err = build_action("button", vec![Param::Const(Constant::Axis(Axes::ABS_X))]).unwrap_err();
        assert!(matches!(err, ParseError::Construction { .. }));
        assert!(err.to_string().contains("expected key"));
    }

    #[test]
    fn trigger_levels_are_range_checked() {
        let child = build_action("button", vec![key(Keys::KEY_A)]).unwrap();
        let err = build_action("trigger", vec![Param::Number(300.0), act(child.clone())]).unwrap_err();
        assert!(err.to_string().contains("press level"));
        let ok = build_action(
            "trigger",
            vec![Param::Number(10.0), Param::Number(200.0), act(child)],
        )
        .unwrap();
        assert_eq!(ok.to_string(), "trigger(10, 200, button(Keys.KEY_A))");
    }

    #[test]
    fn mode_with_odd_params_takes_default() {
        let a = build_action("button", vec![key(Keys::KEY_A)]).unwrap();
        let c = build_action("button", vec![key(Keys::KEY_C)]).unwrap();
        let mode = build_action(
            "mode",
            vec![Param::Const(Constant::Button(SCButton::A)), act(a), act(c)],
        )
        .unwrap();
        let Action::Mode(mode) = &*mode else {
            panic!("mode expected");
        };
        assert_eq!(mode.modes.len(), 1);
        assert!(!mode.default.is_none());
    }

    #[test]
    fn extra_parameters_are_rejected() {
        let err = build_action("click", vec![act(none()), act(none())]).unwrap_err();
        assert!(err.to_string().contains("unexpected parameter"));
    }

    #[test]
    fn ball_rejects_zero_friction() {
        let err = build_action("ball", vec![Param::Number(0.0), act(none())]).unwrap_err();
        assert!(err.to_string().contains("friction"));
    }

    #[test]
    fn doubleclick_timeout_must_fit_a_duration() {
        let dc = |t: f64| {
            build_action(
                "doubleclick",
                vec![act(none()), act(none()), Param::Number(t)],
            )
        };
        for bad in [1e300, -0.5, f64::INFINITY, f64::NAN] {
            let err = dc(bad).unwrap_err();
            assert!(matches!(err, ParseError::Construction { .. }), "{bad}");
            assert!(err.to_string().contains("timeout"));
        }
        assert!(dc(0.0).is_ok());
        assert!(dc(2.5).is_ok());
        let err = build_action("hold", vec![act(none()), act(none()), Param::Number(1e300)]).unwrap_err();
        assert!(err.to_string().starts_with("hold:"));
    }

    #[test]
    fn unknown_name() {
        assert!(!is_action_name("bogus"));
        assert!(build_action("bogus", vec![]).is_err());
    }
}
