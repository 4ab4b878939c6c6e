use super::Action;

const INDENT: &str = "    ";

/// Accumulates the text form of a tree.
///
/// One-line output separates everything with single spaces. Multi-line output
/// breaks mode branches and macro steps onto their own lines; the extra line
/// breaks either sit inside parentheses or double as macro joiners, so both
/// forms parse to the same tree.
#[derive(Debug)]
pub struct TextWriter {
    out: String,
    multiline: bool,
    indent: usize,
}

impl TextWriter {
    pub fn new(multiline: bool) -> Self {
        Self {
            out: String::new(),
            multiline,
            indent: 0,
        }
    }

    pub fn multiline(&self) -> bool {
        self.multiline
    }

    pub fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub fn action(&mut self, action: &Action) {
        action.node().write_text(self);
    }

    pub fn number(&mut self, value: f64) {
        let text = format_number(value);
        self.out.push_str(&text);
    }

    pub fn string(&mut self, value: &str) {
        let text = quote_string(value);
        self.out.push_str(&text);
    }

    /// Line break followed by the current indentation
    pub fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    pub fn indented(&mut self, f: impl FnOnce(&mut Self)) {
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    /// Opens `name(`
    pub fn open(&mut self, name: &str) {
        self.out.push_str(name);
        self.out.push('(');
    }

    /// Parameter separator
    pub fn sep(&mut self) {
        self.out.push_str(", ");
    }

    pub fn close(&mut self) {
        self.out.push(')');
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Integers print without a fractional part, everything else uses the
/// shortest representation that reads back to the same value.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
