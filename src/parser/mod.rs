//! Expression parser.
//!
//! Turns text such as `mode(LB, button(Keys.KEY_A), sens(2, mouse()))` into an
//! action tree. Every tree prints back (`to_string`) to text this parser
//! accepts.

pub mod document;
mod expression;
mod tokenizer;

pub use document::{decode, encode};
pub use expression::Parser;
pub use tokenizer::{tokenize, Token, TokenKind};

use crate::actions::{Action, ActionRef, InvalidAction};
use crate::error::ParseError;
use tracing::warn;

/// Parses `text` into an action tree
pub fn parse(text: &str) -> Result<ActionRef, ParseError> {
    Parser::new(text)?.parse()
}

/// Like [`parse`], but a failure becomes an invalid sentinel node that keeps
/// the original text and the error message
pub fn parse_or_invalid(text: &str) -> ActionRef {
    match parse(text) {
        Ok(action) => action,
        Err(err) => {
            warn!("failed to parse '{}': {}", text, err);
            Action::Invalid(InvalidAction::new(text, err.to_string())).into_ref()
        }
    }
}
