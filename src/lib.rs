//! Controller-to-input mapping engine.
//!
//! A [`profile::Profile`] binds every controller channel to a tree of actions
//! written in a small expression language (see [`parser`]). The
//! [`mapper::Mapper`] compares consecutive controller snapshots, dispatches the
//! differences into those trees and writes the resulting key, axis and pointer
//! events to an [`output::OutputSink`]. The [`driver`] runs a mapper from a
//! tokio queue.

pub mod actions;
pub mod config;
pub mod constants;
pub mod controller;
pub mod driver;
pub mod error;
pub mod ids;
pub mod mapper;
pub mod output;
pub mod parser;
pub mod profile;
pub mod scheduler;

pub use actions::{Action, ActionRef};
pub use error::{ConfigError, DriverError, ParseError, ProfileError};
pub use mapper::Mapper;
pub use parser::parse;
pub use profile::Profile;
