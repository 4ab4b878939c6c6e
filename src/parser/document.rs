//! Nested key/value form of an action, as stored in profile documents.
//!
//! ```json
//! {"action": "button(Keys.KEY_A)", "sensitivity": [2.0], "modes": {"LB": {...}}}
//! ```
//!
//! Reserved keys wrap the base action in a fixed order, innermost first:
//! deadzone, sensitivity, feedback, osd, click, name, modes, doubleclick,
//! hold, dpad.

use crate::actions::{build_action, none, Action, ActionRef, Macro, MultiAction, Param};
use crate::constants::{Constant, HapticPos};
use crate::controller::SCButton;
use crate::error::ParseError;
use serde_json::{Map, Value};

/// Builds the action described by a document node
pub fn decode(doc: &Value) -> Result<ActionRef, ParseError> {
    let obj = match doc {
        Value::Object(obj) => obj,
        Value::String(text) => return parse_text(text),
        Value::Null => return Ok(none()),
        other => return Err(invalid("action document", other)),
    };

    let mut action = if let Some(text) = obj.get("action") {
        match text {
            Value::String(text) => parse_text(text)?,
            other => return Err(invalid("action", other)),
        }
    } else if obj.contains_key("X") || obj.contains_key("Y") {
        let x = obj.get("X").map(decode).transpose()?.unwrap_or_else(none);
        let y = obj.get("Y").map(decode).transpose()?.unwrap_or_else(none);
        Action::XY(crate::actions::XYAction::new(x, y)).into_ref()
    } else {
        none()
    };

    if let Some(deadzone) = obj.get("deadzone") {
        let mut params = Vec::new();
        match deadzone {
            Value::Object(bounds) => {
                let lower = match bounds.get("lower") {
                    Some(value) => number(value, "deadzone.lower")?,
                    None => 0.0,
                };
                params.push(Param::Number(lower));
                if let Some(upper) = bounds.get("upper") {
                    params.push(Param::Number(number(upper, "deadzone.upper")?));
                }
            }
            other => return Err(invalid("deadzone", other)),
        }
        params.push(Param::Action(action));
        action = build_action("deadzone", params)?;
    }

    if let Some(sensitivity) = obj.get("sensitivity") {
        let mut params = numbers(sensitivity, "sensitivity")?;
        params.push(Param::Action(action));
        action = build_action("sens", params)?;
    }

    if let Some(feedback) = obj.get("feedback") {
        let Value::Array(items) = feedback else {
            return Err(invalid("feedback", feedback));
        };
        let Some((position, rest)) = items.split_first() else {
            return Err(ParseError::construction("feedback: missing haptic position"));
        };
        let position = position
            .as_str()
            .and_then(HapticPos::from_name)
            .ok_or_else(|| invalid("feedback position", position))?;
        let mut params = vec![Param::Const(Constant::Haptic(position))];
        params.extend(numbers(&Value::Array(rest.to_vec()), "feedback")?);
        params.push(Param::Action(action));
        action = build_action("feedback", params)?;
    }

    if let Some(osd) = obj.get("osd") {
        let timeout = match osd {
            Value::Bool(false) => None,
            Value::Bool(true) => Some(None),
            Value::Number(_) => Some(Some(number(osd, "osd")?)),
            other => return Err(invalid("osd", other)),
        };
        if let Some(timeout) = timeout {
            let mut params: Vec<Param> = timeout.map(Param::Number).into_iter().collect();
            params.push(Param::Action(action));
            action = build_action("osd", params)?;
        }
    }

    if let Some(click) = obj.get("click") {
        match click {
            Value::Bool(true) => action = build_action("click", vec![Param::Action(action)])?,
            Value::Bool(false) => {}
            other => return Err(invalid("click", other)),
        }
    }

    if let Some(name) = obj.get("name") {
        let Value::String(name) = name else {
            return Err(invalid("name", name));
        };
        action = build_action("name", vec![Param::Str(name.clone()), Param::Action(action)])?;
    }

    if let Some(modes) = obj.get("modes") {
        let Value::Object(modes) = modes else {
            return Err(invalid("modes", modes));
        };
        let mut params = Vec::with_capacity(modes.len() * 2 + 1);
        for (button, branch) in modes {
            let button = SCButton::from_name(button).ok_or_else(|| {
                ParseError::construction(format!("modes: unknown button '{button}'"))
            })?;
            params.push(Param::Const(Constant::Button(button)));
            params.push(Param::Action(decode(branch)?));
        }
        params.push(Param::Action(action));
        action = build_action("mode", params)?;
    }

    let timeout = obj.get("timeout").map(|t| number(t, "timeout")).transpose()?;
    for key in ["doubleclick", "hold"] {
        if let Some(branch) = obj.get(key) {
            let mut params = vec![Param::Action(decode(branch)?), Param::Action(action)];
            params.extend(timeout.map(Param::Number));
            action = build_action(key, params)?;
        }
    }

    if let Some(dpad) = obj.get("dpad") {
        let Value::Array(items) = dpad else {
            return Err(invalid("dpad", dpad));
        };
        let params = items
            .iter()
            .map(|item| decode(item).map(Param::Action))
            .collect::<Result<Vec<_>, _>>()?;
        let dpad = build_action("dpad", params)?;
        action = if action.is_none() {
            dpad
        } else {
            join_and(&action, dpad)
        };
    }

    Ok(action)
}

/// `action and extra`, built the way the text `<action> and <extra>` parses:
/// `and` binds tighter than `;`, so a sequence takes `extra` on its last step.
fn join_and(action: &ActionRef, extra: ActionRef) -> ActionRef {
    match &**action {
        Action::Macro(mac) if !mac.repeat => {
            let mut steps = mac.steps.clone();
            if let Some(last) = steps.pop() {
                steps.push(join_and(&last, extra));
            }
            Action::Macro(Macro::new(steps, false)).into_ref()
        }
        _ => Action::Multi(MultiAction::new(vec![action.clone(), extra])).into_ref(),
    }
}

/// Document form of an action; `decode(&encode(a))` rebuilds the same tree
pub fn encode(action: &Action) -> Value {
    let mut doc = Map::new();
    encode_into(action, &mut doc, Rank::Outside);
    Value::Object(doc)
}

impl Action {
    pub fn encode(&self) -> Value {
        encode(self)
    }
}

/// Position of a wrapper in the decoding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Deadzone,
    Sensitivity,
    Feedback,
    Osd,
    Click,
    Name,
    Modes,
    DoubleClick,
    Outside,
}

fn rank(action: &Action) -> Option<Rank> {
    match action {
        Action::Deadzone(_) => Some(Rank::Deadzone),
        Action::Sensitivity(_) => Some(Rank::Sensitivity),
        Action::Feedback(_) => Some(Rank::Feedback),
        Action::Osd(_) => Some(Rank::Osd),
        Action::Click(_) => Some(Rank::Click),
        Action::Name(_) => Some(Rank::Name),
        Action::Mode(_) => Some(Rank::Modes),
        Action::DoubleClick(_) => Some(Rank::DoubleClick),
        _ => None,
    }
}

/// Peels wrappers into reserved keys while they appear in decoding order;
/// whatever remains is stored as expression text.
fn encode_into(action: &Action, doc: &mut Map<String, Value>, limit: Rank) {
    let Some(rank) = rank(action).filter(|r| *r < limit) else {
        match action {
            Action::None => {}
            Action::XY(xy) => {
                doc.insert("X".to_owned(), encode(&xy.x));
                doc.insert("Y".to_owned(), encode(&xy.y));
            }
            other => {
                doc.insert("action".to_owned(), Value::String(other.to_string()));
            }
        }
        return;
    };

    let inner: &Action = match action {
        Action::Deadzone(dz) => {
            let mut bounds = Map::new();
            bounds.insert("lower".to_owned(), number_value(dz.lower));
            if let Some(upper) = dz.upper {
                bounds.insert("upper".to_owned(), number_value(upper));
            }
            doc.insert("deadzone".to_owned(), Value::Object(bounds));
            &dz.child
        }
        Action::Sensitivity(sens) => {
            let used = sens
                .factors
                .iter()
                .rposition(|f| *f != 1.0)
                .map_or(1, |last| last + 1);
            let factors = sens.factors[..used].iter().map(|f| number_value(*f)).collect();
            doc.insert("sensitivity".to_owned(), Value::Array(factors));
            &sens.child
        }
        Action::Feedback(fb) => {
            let h = fb.haptic;
            let items = vec![
                Value::String(h.position.name().to_owned()),
                Value::from(h.amplitude),
                Value::from(h.frequency),
                Value::from(h.period),
                Value::from(h.count),
            ];
            doc.insert("feedback".to_owned(), Value::Array(items));
            &fb.child
        }
        Action::Osd(osd) => {
            let value = osd.timeout.map_or(Value::Bool(true), number_value);
            doc.insert("osd".to_owned(), value);
            &osd.child
        }
        Action::Click(click) => {
            doc.insert("click".to_owned(), Value::Bool(true));
            &click.child
        }
        Action::Name(name) => {
            doc.insert("name".to_owned(), Value::String(name.name.clone()));
            &name.child
        }
        Action::Mode(mode) => {
            let mut branches = Map::new();
            // dispatch picks the first branch for a button
            for (button, branch) in &mode.modes {
                branches
                    .entry(button.name().to_owned())
                    .or_insert_with(|| encode(branch));
            }
            doc.insert("modes".to_owned(), Value::Object(branches));
            &mode.default
        }
        Action::DoubleClick(dc) => {
            if !dc.double.is_none() {
                doc.insert("doubleclick".to_owned(), encode(&dc.double));
            }
            if !dc.hold.is_none() {
                doc.insert("hold".to_owned(), encode(&dc.hold));
            }
            if let Some(timeout) = dc.timeout {
                doc.insert("timeout".to_owned(), number_value(timeout));
            }
            &dc.normal
        }
        _ => return,
    };
    encode_into(inner, doc, rank);
}

fn parse_text(text: &str) -> Result<ActionRef, ParseError> {
    if text.trim().is_empty() {
        Ok(none())
    } else {
        super::parse(text)
    }
}

fn invalid(what: &str, value: &Value) -> ParseError {
    ParseError::construction(format!("{what}: unexpected value {value}"))
}

fn number(value: &Value, what: &str) -> Result<f64, ParseError> {
    value.as_f64().ok_or_else(|| invalid(what, value))
}

fn numbers(value: &Value, what: &str) -> Result<Vec<Param>, ParseError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| number(item, what).map(Param::Number))
            .collect(),
        Value::Number(_) => Ok(vec![Param::Number(number(value, what)?)]),
        other => Err(invalid(what, other)),
    }
}

fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_action_text() {
        let a = decode(&json!({"action": "button(Keys.KEY_A)"})).unwrap();
        assert_eq!(a.to_string(), "button(Keys.KEY_A)");
    }

    #[test]
    fn reserved_keys_apply_in_fixed_order() {
        let doc = json!({
            "name": "Aim",
            "sensitivity": [2.0, 3.0],
            "deadzone": {"lower": 100, "upper": 2000},
            "action": "mouse()"
        });
        let a = decode(&doc).unwrap();
        assert_eq!(
            a.to_string(),
            "name('Aim', sens(2, 3, deadzone(100, 2000, mouse())))"
        );
    }

    #[test]
    fn doubleclick_and_hold_share_one_node() {
        let doc = json!({
            "action": "button(Keys.KEY_N)",
            "doubleclick": {"action": "button(Keys.KEY_D)"},
            "hold": {"action": "button(Keys.KEY_H)"},
            "timeout": 0.3
        });
        let a = decode(&doc).unwrap();
        assert_eq!(
            a.to_string(),
            "doubleclick(button(Keys.KEY_D), hold(button(Keys.KEY_H), button(Keys.KEY_N)), 0.3)"
        );
    }

    #[test]
    fn dpad_without_action_replaces_it() {
        let doc = json!({"dpad": [
            {"action": "button(Keys.KEY_UP)"},
            {"action": "button(Keys.KEY_DOWN)"}
        ]});
        let a = decode(&doc).unwrap();
        assert_eq!(
            a.to_string(),
            "dpad(button(Keys.KEY_UP), button(Keys.KEY_DOWN))"
        );
    }

    #[test]
    fn xy_keys() {
        let doc = json!({"X": {"action": "axis(Axes.ABS_X)"}, "Y": {"action": "raxis(Axes.ABS_Y)"}});
        assert_eq!(
            decode(&doc).unwrap().to_string(),
            "XY(axis(Axes.ABS_X), raxis(Axes.ABS_Y))"
        );
    }

    #[test]
    fn modes_take_the_base_action_as_default() {
        let doc = json!({
            "action": "button(Keys.KEY_C)",
            "modes": {"A": {"action": "button(Keys.KEY_A)"}}
        });
        assert_eq!(
            decode(&doc).unwrap().to_string(),
            "mode(A, button(Keys.KEY_A), button(Keys.KEY_C))"
        );
    }

    #[test]
    fn encode_then_decode_rebuilds_the_tree() {
        let text = "mode(A, button(Keys.KEY_A), feedback(LEFT, 256, sens(2, deadzone(100, mouse()))))";
        let a = super::super::parse(text).unwrap();
        let doc = a.encode();
        assert!(doc.get("modes").is_some());
        assert!(doc.get("feedback").is_some());
        assert_eq!(decode(&doc).unwrap().to_string(), a.to_string());
    }

    #[test]
    fn out_of_order_wrappers_fall_back_to_text() {
        let a = super::super::parse("deadzone(10, sens(2, mouse()))").unwrap();
        let doc = a.encode();
        assert!(doc.get("sensitivity").is_none());
        assert_eq!(decode(&doc).unwrap().to_string(), a.to_string());
    }

    #[test]
    fn dpad_beside_a_sequence_joins_its_last_step() {
        let doc = json!({
            "action": "button(Keys.KEY_A); button(Keys.KEY_B)",
            "dpad": [{"action": "button(Keys.KEY_UP)"}]
        });
        let a = decode(&doc).unwrap();
        let Action::Macro(mac) = &*a else {
            panic!("sequence expected, got {a}");
        };
        assert_eq!(mac.steps.len(), 2);
        assert!(matches!(&*mac.steps[1], Action::Multi(_)));
        let reparsed = super::super::parse(&a.to_string()).unwrap();
        assert_eq!(format!("{reparsed:?}"), format!("{a:?}"));
    }

    #[test]
    fn encoder_keeps_the_branch_dispatch_would_pick() {
        use crate::actions::ModeModifier;

        let x = super::super::parse("button(Keys.KEY_X)").unwrap();
        let y = super::super::parse("button(Keys.KEY_Y)").unwrap();
        let mode = Action::Mode(ModeModifier::new(
            vec![(SCButton::A, x), (SCButton::A, y)],
            none(),
        ));
        let doc = encode(&mode);
        assert_eq!(doc["modes"]["A"]["action"], "button(Keys.KEY_X)");
        assert_eq!(
            decode(&doc).unwrap().to_string(),
            "mode(A, button(Keys.KEY_X))"
        );
    }

    #[test]
    fn bad_values_are_construction_errors() {
        let err = decode(&json!({"action": "mouse()", "click": "yes"})).unwrap_err();
        assert!(matches!(err, ParseError::Construction { .. }));
    }
}
