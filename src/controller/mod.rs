//! Controller input as the engine sees it
//!
//! The physical device layer is outside this crate: it hands the engine one
//! [`ControllerState`] per report. Everything here is plain data.

pub mod state;

pub use state::{
    ControllerState, SCButton, SCButtons, Source, STICK_PAD_MAX, STICK_PAD_MIN, TRIGGER_CLICK,
    TRIGGER_MAX, TRIGGER_MIN,
};
