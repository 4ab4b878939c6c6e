use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
    Newline,
    And,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset into the source text
    pub position: usize,
}

/// Splits expression text into tokens.
///
/// Line breaks only count as joiners outside parentheses; inside a parameter
/// list they are plain whitespace.
pub fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer {
        chars: text.char_indices().peekable(),
        len: text.len(),
        depth: 0,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    len: usize,
    depth: usize,
}

impl Lexer<'_> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        loop {
            let Some(&(position, c)) = self.chars.peek() else {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    position: self.len,
                });
            };
            let kind = match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                    continue;
                }
                '\n' => {
                    self.bump();
                    if self.depth > 0 {
                        continue;
                    }
                    TokenKind::Newline
                }
                '(' => {
                    self.bump();
                    self.depth += 1;
                    TokenKind::LParen
                }
                ')' => {
                    self.bump();
                    self.depth = self.depth.saturating_sub(1);
                    TokenKind::RParen
                }
                ',' => {
                    self.bump();
                    TokenKind::Comma
                }
                '.' if !self.next_is_digit_after(position) => {
                    self.bump();
                    TokenKind::Dot
                }
                ';' => {
                    self.bump();
                    TokenKind::Semicolon
                }
                '\'' | '"' => TokenKind::Str(self.string(position)?),
                c if c.is_ascii_digit() || c == '.' || c == '-' || c == '+' => {
                    TokenKind::Number(self.number(position)?)
                }
                c if c.is_alphabetic() || c == '_' => {
                    let name = self.name();
                    if name == "and" {
                        TokenKind::And
                    } else {
                        TokenKind::Name(name)
                    }
                }
                other => {
                    return Err(ParseError::syntax(
                        position,
                        format!("unexpected character '{other}'"),
                    ))
                }
            };
            return Ok(Token { kind, position });
        }
    }

    /// True when the character after the one at `position` is a digit
    fn next_is_digit_after(&self, position: usize) -> bool {
        let mut ahead = self.chars.clone();
        ahead.next();
        matches!(ahead.peek(), Some((p, c)) if *p == position + 1 && c.is_ascii_digit())
    }

    fn name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        name
    }

    fn number(&mut self, start: usize) -> Result<f64, ParseError> {
        let mut negative = false;
        if let Some(sign @ ('-' | '+')) = self.peek() {
            negative = sign == '-';
            self.bump();
        }

        let radix = if self.peek() == Some('0') {
            let mut ahead = self.chars.clone();
            ahead.next();
            match ahead.peek().map(|(_, c)| *c) {
                Some('x' | 'X') => 16,
                Some('b' | 'B') => 2,
                _ => 10,
            }
        } else {
            10
        };

        let value = if radix == 10 {
            let mut literal = String::new();
            let mut seen_exponent = false;
            while let Some(c) = self.peek() {
                let exponent_sign = seen_exponent
                    && (c == '-' || c == '+')
                    && matches!(literal.chars().last(), Some('e' | 'E'));
                if c.is_ascii_digit() || c == '.' || exponent_sign {
                    literal.push(c);
                } else if (c == 'e' || c == 'E') && !seen_exponent {
                    seen_exponent = true;
                    literal.push(c);
                } else {
                    break;
                }
                self.bump();
            }
            literal
                .parse::<f64>()
                .map_err(|_| ParseError::syntax(start, format!("malformed number '{literal}'")))?
        } else {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c.is_digit(radix) {
                    digits.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            i64::from_str_radix(&digits, radix)
                .map_err(|_| ParseError::syntax(start, format!("malformed number '{digits}'")))?
                as f64
        };

        if let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                return Err(ParseError::syntax(
                    start,
                    format!("unexpected character '{c}' in number"),
                ));
            }
        }
        Ok(if negative { -value } else { value })
    }

    fn string(&mut self, start: usize) -> Result<String, ParseError> {
        let quote = self.bump();
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(ParseError::syntax(start, "unterminated string"));
            };
            if Some(c) == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some(escaped) = self.bump() else {
                return Err(ParseError::syntax(start, "unterminated string"));
            };
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' | '\'' | '"' => out.push(escaped),
                'x' => {
                    let hex: String = (0..2).filter_map(|_| self.bump()).collect();
                    let code = u8::from_str_radix(&hex, 16).map_err(|_| {
                        ParseError::syntax(start, format!("malformed escape '\\x{hex}'"))
                    })?;
                    out.push(char::from(code));
                }
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn call_with_constant() {
        assert_eq!(
            kinds("button(Keys.KEY_A)"),
            vec![
                TokenKind::Name("button".into()),
                TokenKind::LParen,
                TokenKind::Name("Keys".into()),
                TokenKind::Dot,
                TokenKind::Name("KEY_A".into()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn number_forms() {
        assert_eq!(
            kinds("1 -2.5 1e3 0x1F 0b101 .5"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Number(-2.5),
                TokenKind::Number(1000.0),
                TokenKind::Number(31.0),
                TokenKind::Number(5.0),
                TokenKind::Number(0.5),
                TokenKind::Eof,
            ]
        );
        assert_eq!(kinds("2e-2")[0], TokenKind::Number(0.02));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\tb" '\x41'"#),
            vec![
                TokenKind::Str("it's".into()),
                TokenKind::Str("a\tb".into()),
                TokenKind::Str("A".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn newlines_inside_parens_are_whitespace() {
        assert_eq!(
            kinds("f(\n1)\ng"),
            vec![
                TokenKind::Name("f".into()),
                TokenKind::LParen,
                TokenKind::Number(1.0),
                TokenKind::RParen,
                TokenKind::Newline,
                TokenKind::Name("g".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn and_is_a_keyword() {
        assert_eq!(kinds("a and b")[1], TokenKind::And);
    }

    #[test]
    fn unterminated_string_reports_start() {
        assert_eq!(
            tokenize("name('abc"),
            Err(ParseError::syntax(5, "unterminated string"))
        );
    }

    #[test]
    fn stray_character() {
        assert!(matches!(
            tokenize("button(@)"),
            Err(ParseError::Syntax { position: 7, .. })
        ));
    }
}
