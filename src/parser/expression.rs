use super::tokenizer::{tokenize, Token, TokenKind};
use crate::actions::{build_action, is_action_name, Action, ActionRef, Macro, MultiAction, Param};
use crate::constants::Constant;
use crate::error::ParseError;
use tracing::trace;

static EOF: TokenKind = TokenKind::Eof;

/// Recursive-descent parser over a token list.
///
/// ```text
/// sequence := chain ((';' | NEWLINE)+ chain)* (';' | NEWLINE)*
/// chain    := action ('and' action)*
/// action   := NAME ['(' [param (',' param)*] ')']
/// param    := NUMBER | STRING | NAMESPACE '.' NAME | BARE_CONSTANT | sequence
/// ```
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(text: &str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
        })
    }

    /// Parses the whole input as one action
    pub fn parse(mut self) -> Result<ActionRef, ParseError> {
        while self.peek() == &TokenKind::Newline {
            self.next();
        }
        if self.peek() == &TokenKind::Eof {
            return Err(ParseError::syntax(0, "empty expression"));
        }
        let action = self.parse_sequence()?;
        match self.peek() {
            TokenKind::Eof => Ok(action),
            TokenKind::RParen => Err(self.error("unmatched ')'")),
            other => {
                let message = format!("unexpected {}", describe(other));
                Err(self.error(message))
            }
        }
    }

    fn peek(&self) -> &TokenKind {
        self.tokens.get(self.pos).map_or(&EOF, |t| &t.kind)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.position)
    }

    fn next(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::syntax(self.position(), message)
    }

    fn is_joiner(kind: &TokenKind) -> bool {
        matches!(kind, TokenKind::Semicolon | TokenKind::Newline)
    }

    fn parse_sequence(&mut self) -> Result<ActionRef, ParseError> {
        let mut steps = vec![self.parse_chain()?];
        while Self::is_joiner(self.peek()) {
            while Self::is_joiner(self.peek()) {
                self.next();
            }
            if matches!(
                self.peek(),
                TokenKind::Eof | TokenKind::RParen | TokenKind::Comma
            ) {
                break;
            }
            steps.push(self.parse_chain()?);
        }
        if steps.len() == 1 {
            return Ok(steps.remove(0));
        }
        Ok(Action::Macro(Macro::new(steps, false)).into_ref())
    }

    fn parse_chain(&mut self) -> Result<ActionRef, ParseError> {
        let mut actions = vec![self.parse_action()?];
        while self.peek() == &TokenKind::And {
            self.next();
            actions.push(self.parse_action()?);
        }
        if actions.len() == 1 {
            return Ok(actions.remove(0));
        }
        Ok(Action::Multi(MultiAction::new(actions)).into_ref())
    }

    fn parse_action(&mut self) -> Result<ActionRef, ParseError> {
        let start = self.position();
        let name = match self.next() {
            TokenKind::Name(name) => name,
            TokenKind::Eof => return Err(ParseError::syntax(start, "expected action, found end of input")),
            other => {
                return Err(ParseError::syntax(
                    start,
                    format!("expected action, found {}", describe(&other)),
                ))
            }
        };
        if !is_action_name(&name) {
            let message = if Constant::is_namespace(&name) || Constant::resolve_bare(&name).is_some() {
                format!("constant '{name}' used where an action is expected")
            } else {
                format!("unknown action '{name}'")
            };
            return Err(ParseError::syntax(start, message));
        }
        let params = if self.peek() == &TokenKind::LParen {
            self.next();
            self.parse_params()?
        } else {
            Vec::new()
        };
        trace!(action = %name, params = params.len(), "building action");
        build_action(&name, params)
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        if self.peek() == &TokenKind::RParen {
            self.next();
            return Ok(params);
        }
        loop {
            params.push(self.parse_param()?);
            match self.next() {
                TokenKind::Comma => continue,
                TokenKind::RParen => return Ok(params),
                TokenKind::Eof => return Err(self.error("unmatched '('")),
                other => {
                    let message = format!("expected ',' or ')', found {}", describe(&other));
                    return Err(self.error(message));
                }
            }
        }
    }

    fn parse_param(&mut self) -> Result<Param, ParseError> {
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.next();
                Ok(Param::Number(n))
            }
            TokenKind::Str(s) => {
                self.next();
                Ok(Param::Str(s))
            }
            TokenKind::Name(name) if Constant::is_namespace(&name) => {
                let start = self.position();
                self.next();
                if self.next() != TokenKind::Dot {
                    return Err(ParseError::syntax(
                        start,
                        format!("expected '.' after namespace '{name}'"),
                    ));
                }
                let TokenKind::Name(member) = self.next() else {
                    return Err(ParseError::syntax(start, format!("expected member of '{name}'")));
                };
                Constant::resolve(&name, &member)
                    .map(Param::Const)
                    .ok_or_else(|| ParseError::syntax(start, format!("unknown constant '{name}.{member}'")))
            }
            TokenKind::Name(name) if !is_action_name(&name) => {
                let start = self.position();
                match Constant::resolve_bare(&name) {
                    Some(constant) => {
                        self.next();
                        Ok(Param::Const(constant))
                    }
                    None => Err(ParseError::syntax(start, format!("unknown name '{name}'"))),
                }
            }
            _ => self.parse_sequence().map(Param::Action),
        }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Name(name) => format!("'{name}'"),
        TokenKind::Number(n) => format!("number {n}"),
        TokenKind::Str(_) => "string".to_owned(),
        TokenKind::LParen => "'('".to_owned(),
        TokenKind::RParen => "')'".to_owned(),
        TokenKind::Comma => "','".to_owned(),
        TokenKind::Dot => "'.'".to_owned(),
        TokenKind::Semicolon => "';'".to_owned(),
        TokenKind::Newline => "line break".to_owned(),
        TokenKind::And => "'and'".to_owned(),
        TokenKind::Eof => "end of input".to_owned(),
    }
}
