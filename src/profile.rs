//! Per-channel binding table and its JSON document form.
//!
//! ```json
//! {
//!     "buttons": {"A": {"action": "button(Keys.KEY_ENTER)"}},
//!     "stick": {"action": "XY(axis(Axes.ABS_X), raxis(Axes.ABS_Y))"},
//!     "left_pad": {"dpad": [...]},
//!     "right_pad": {"action": "ball(mouse())"},
//!     "trigger_left": {"action": "axis(Axes.ABS_Z)"},
//!     "trigger_right": {"action": "axis(Axes.ABS_RZ)"},
//!     "gyro": {}
//! }
//! ```
//!
//! A broken entry never aborts a load. It is bound to `None` and reported as a
//! [`ProfileDiagnostic`], which keeps the entry's document so saving the
//! profile writes it back untouched.

use crate::actions::{none, ActionRef};
use crate::controller::{SCButton, Source};
use crate::error::{ParseError, ProfileError};
use crate::parser::decode;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

const STICK_KEY: &str = "stick";
const LEFT_PAD_KEY: &str = "left_pad";
const RIGHT_PAD_KEY: &str = "right_pad";
const LEFT_TRIGGER_KEY: &str = "trigger_left";
const RIGHT_TRIGGER_KEY: &str = "trigger_right";
const GYRO_KEY: &str = "gyro";
const BUTTONS_KEY: &str = "buttons";

/// Entry that could not be decoded and was bound to `None` instead
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDiagnostic {
    /// Document path of the entry, e.g. `buttons.A` or `stick`
    pub entry: String,
    pub error: ParseError,
    /// The entry as it appeared in the document
    pub raw: Value,
}

impl fmt::Display for ProfileDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entry, self.error)
    }
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub buttons: BTreeMap<SCButton, ActionRef>,
    pub stick: ActionRef,
    pub left_pad: ActionRef,
    pub right_pad: ActionRef,
    pub left_trigger: ActionRef,
    pub right_trigger: ActionRef,
    pub gyro: ActionRef,
    pub diagnostics: Vec<ProfileDiagnostic>,
}

impl Default for Profile {
    fn default() -> Self {
        Self::empty()
    }
}

impl Profile {
    /// Profile that binds nothing
    pub fn empty() -> Self {
        Self {
            name: String::new(),
            buttons: BTreeMap::new(),
            stick: none(),
            left_pad: none(),
            right_pad: none(),
            left_trigger: none(),
            right_trigger: none(),
            gyro: none(),
            diagnostics: Vec::new(),
        }
    }

    /// Tree bound to a non-button channel
    pub fn binding(&self, source: Source) -> &ActionRef {
        match source {
            Source::Stick => &self.stick,
            Source::LeftPad => &self.left_pad,
            Source::RightPad => &self.right_pad,
            Source::LeftTrigger => &self.left_trigger,
            Source::RightTrigger => &self.right_trigger,
            Source::Gyro => &self.gyro,
        }
    }

    pub fn binding_mut(&mut self, source: Source) -> &mut ActionRef {
        match source {
            Source::Stick => &mut self.stick,
            Source::LeftPad => &mut self.left_pad,
            Source::RightPad => &mut self.right_pad,
            Source::LeftTrigger => &mut self.left_trigger,
            Source::RightTrigger => &mut self.right_trigger,
            Source::Gyro => &mut self.gyro,
        }
    }

    pub fn button(&self, button: SCButton) -> ActionRef {
        self.buttons.get(&button).cloned().unwrap_or_else(none)
    }

    /// True when every bound tree decoded cleanly
    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
            && self.buttons.values().all(|a| a.is_valid())
            && Source::ALL.iter().all(|s| self.binding(*s).is_valid())
    }

    pub fn from_json(text: &str) -> Result<Self, ProfileError> {
        let doc: Value = serde_json::from_str(text)?;
        Self::from_value(&doc)
    }

    /// Builds a profile from a parsed document.
    ///
    /// Fails only when the document is not an object at all.
    pub fn from_value(doc: &Value) -> Result<Self, ProfileError> {
        let Value::Object(obj) = doc else {
            return Err(ProfileError::NotAnObject(kind_of(doc).to_owned()));
        };
        let mut profile = Self::empty();
        if let Some(Value::String(name)) = obj.get("name") {
            profile.name = name.clone();
        }

        match obj.get(BUTTONS_KEY) {
            Some(Value::Object(buttons)) => {
                for (name, entry) in buttons {
                    let path = format!("{}.{}", BUTTONS_KEY, name);
                    let Some(button) = SCButton::from_name(name) else {
                        let error = ParseError::construction(format!("unknown button '{}'", name));
                        profile.report(path, error, entry);
                        continue;
                    };
                    let action = profile.decode_entry(path, entry);
                    if !action.is_none() {
                        profile.buttons.insert(button, action);
                    }
                }
            }
            Some(other) => profile.report(
                BUTTONS_KEY.to_owned(),
                ParseError::construction(format!("expected an object, found {}", kind_of(other))),
                other,
            ),
            None => {}
        }

        for source in Source::ALL {
            let key = source_key(source);
            if let Some(entry) = obj.get(key) {
                let action = profile.decode_entry(key.to_owned(), entry);
                *profile.binding_mut(source) = action;
            }
        }

        if profile.diagnostics.is_empty() {
            debug!("Profile '{}' decoded cleanly", profile.name);
        } else {
            warn!(
                "Profile '{}' loaded with {} broken entries",
                profile.name,
                profile.diagnostics.len()
            );
        }
        Ok(profile)
    }

    /// Reads and decodes a profile file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let mut profile = Self::from_json(&content)?;
        if profile.name.is_empty() {
            if let Some(stem) = path.file_stem() {
                profile.name = stem.to_string_lossy().into_owned();
            }
        }
        info!("Loaded profile '{}' from {}", profile.name, path.display());
        Ok(profile)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ProfileError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(&self.to_json())?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        info!("Saved profile '{}' to {}", self.name, path.display());
        Ok(())
    }

    /// Document form; unbound channels are left out, broken entries from the
    /// loaded document come back verbatim unless their slot was rebound
    pub fn to_json(&self) -> Value {
        let mut doc = Map::new();
        if !self.name.is_empty() {
            doc.insert("name".to_owned(), Value::String(self.name.clone()));
        }
        let mut buttons: Map<String, Value> = self
            .buttons
            .iter()
            .filter(|(_, a)| !a.is_none())
            .map(|(b, a)| (b.name().to_owned(), a.encode()))
            .collect();
        for diagnostic in &self.diagnostics {
            match diagnostic.entry.split_once('.') {
                Some((BUTTONS_KEY, name)) => {
                    buttons
                        .entry(name.to_owned())
                        .or_insert_with(|| diagnostic.raw.clone());
                }
                Some(_) => {}
                None if diagnostic.entry == BUTTONS_KEY => {
                    if buttons.is_empty() {
                        doc.insert(BUTTONS_KEY.to_owned(), diagnostic.raw.clone());
                    }
                }
                None => {
                    doc.entry(diagnostic.entry.clone())
                        .or_insert_with(|| diagnostic.raw.clone());
                }
            }
        }
        if !buttons.is_empty() {
            doc.insert(BUTTONS_KEY.to_owned(), Value::Object(buttons));
        }
        for source in Source::ALL {
            let action = self.binding(source);
            if !action.is_none() {
                doc.insert(source_key(source).to_owned(), action.encode());
            }
        }
        Value::Object(doc)
    }

    fn decode_entry(&mut self, entry: String, doc: &Value) -> ActionRef {
        match decode(doc) {
            Ok(action) => action,
            Err(error) => {
                self.report(entry, error, doc);
                none()
            }
        }
    }

    fn report(&mut self, entry: String, error: ParseError, raw: &Value) {
        warn!("Profile entry {} disabled: {}", entry, error);
        self.diagnostics.push(ProfileDiagnostic {
            entry,
            error,
            raw: raw.clone(),
        });
    }
}

fn source_key(source: Source) -> &'static str {
    match source {
        Source::Stick => STICK_KEY,
        Source::LeftPad => LEFT_PAD_KEY,
        Source::RightPad => RIGHT_PAD_KEY,
        Source::LeftTrigger => LEFT_TRIGGER_KEY,
        Source::RightTrigger => RIGHT_TRIGGER_KEY,
        Source::Gyro => GYRO_KEY,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
