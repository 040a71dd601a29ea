//! Reader and printer for the Lisp data subset used by recipes, package
//! files, and archive indexes.
//!
//! Supported: integers, strings, symbols, proper and dotted lists, vectors,
//! `'x` and `#'x` reader shorthands, and `;` comments. `nil` and `()` read as
//! the empty list, which prints as `nil`. Printing never elides nested
//! structure.

use std::fmt::{self, Write as _};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SexpError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected '{ch}' at offset {offset}")]
    Unexpected { ch: char, offset: usize },
    #[error("misplaced '.' at offset {0}")]
    InvalidDot(usize),
    #[error("trailing input at offset {0}")]
    TrailingInput(usize),
    #[error("nesting too deep at offset {0}")]
    TooDeep(usize),
}

/// Deepest nesting of lists, vectors, and quotes the reader accepts.
pub const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sexp {
    Int(i64),
    Str(String),
    Symbol(String),
    /// A proper list. The empty list is `nil`.
    List(Vec<Sexp>),
    /// An improper list: non-empty head followed by a non-list tail.
    Dotted(Vec<Sexp>, Box<Sexp>),
    Vector(Vec<Sexp>),
}

impl Sexp {
    pub fn nil() -> Self {
        Sexp::List(Vec::new())
    }

    pub fn symbol(s: impl Into<String>) -> Self {
        Sexp::Symbol(s.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Sexp::Str(s.into())
    }

    pub fn keyword(name: &str) -> Self {
        Sexp::Symbol(format!(":{name}"))
    }

    pub fn quote(inner: Sexp) -> Self {
        Sexp::List(vec![Sexp::symbol("quote"), inner])
    }

    /// Build `(car . cdr)`, normalizing to a proper list when `cdr` is one.
    pub fn cons(car: Sexp, cdr: Sexp) -> Self {
        match cdr {
            Sexp::List(mut items) => {
                items.insert(0, car);
                Sexp::List(items)
            }
            Sexp::Dotted(mut head, tail) => {
                head.insert(0, car);
                Sexp::Dotted(head, tail)
            }
            other => Sexp::Dotted(vec![car], Box::new(other)),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Sexp::List(items) if items.is_empty())
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Sexp::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Sexp::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Sexp::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::List(items) => Some(items),
            _ => None,
        }
    }

    /// Keyword name without the leading colon, if this is a keyword symbol.
    pub fn as_keyword(&self) -> Option<&str> {
        self.as_symbol().and_then(|s| s.strip_prefix(':'))
    }

    /// Strip one level of `(quote x)` or `(function x)`.
    pub fn unquote(&self) -> &Sexp {
        if let Sexp::List(items) = self {
            if items.len() == 2 && matches!(items[0].as_symbol(), Some("quote" | "function")) {
                return &items[1];
            }
        }
        self
    }

    /// Symbol or string content, whichever this value is.
    pub fn as_name(&self) -> Option<&str> {
        self.as_symbol().or_else(|| self.as_str())
    }
}

/// Look up `:key` in a property list, returning the value that follows it.
pub fn plist_get<'a>(plist: &'a [Sexp], key: &str) -> Option<&'a Sexp> {
    plist
        .chunks(2)
        .find(|pair| pair[0].as_keyword() == Some(key))
        .and_then(|pair| pair.get(1))
}

/// Read exactly one datum. Trailing whitespace and comments are allowed.
pub fn read(input: &str) -> Result<Sexp, SexpError> {
    let mut reader = Reader::new(input);
    let value = reader.datum()?;
    reader.skip_atmosphere();
    if reader.pos < reader.src.len() {
        return Err(SexpError::TrailingInput(reader.pos));
    }
    Ok(value)
}

/// Read every datum in `input`.
pub fn read_all(input: &str) -> Result<Vec<Sexp>, SexpError> {
    let mut reader = Reader::new(input);
    let mut out = Vec::new();
    loop {
        reader.skip_atmosphere();
        if reader.pos >= reader.src.len() {
            return Ok(out);
        }
        out.push(reader.datum()?);
    }
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

enum Token {
    Datum(Sexp),
    Close(char),
    Dot,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0, depth: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_atmosphere(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
            } else if ch == ';' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn datum(&mut self) -> Result<Sexp, SexpError> {
        let start = self.pos;
        match self.token()? {
            Token::Datum(d) => Ok(d),
            Token::Close(ch) => Err(SexpError::Unexpected { ch, offset: start }),
            Token::Dot => Err(SexpError::InvalidDot(start)),
        }
    }

    fn token(&mut self) -> Result<Token, SexpError> {
        self.skip_atmosphere();
        let start = self.pos;
        let ch = self.peek().ok_or(SexpError::UnexpectedEof)?;
        match ch {
            '(' => {
                self.bump();
                self.nested(Self::list)
            }
            '[' => {
                self.bump();
                self.nested(Self::vector)
            }
            ')' | ']' => {
                self.bump();
                Ok(Token::Close(ch))
            }
            '"' => {
                self.bump();
                self.string().map(Token::Datum)
            }
            '\'' => {
                self.bump();
                let inner = self.nested(Self::datum)?;
                Ok(Token::Datum(Sexp::quote(inner)))
            }
            '#' if self.src[self.pos..].starts_with("#'") => {
                self.pos += 2;
                let inner = self.nested(Self::datum)?;
                Ok(Token::Datum(Sexp::List(vec![Sexp::symbol("function"), inner])))
            }
            _ => {
                let (text, escaped) = self.atom();
                if text.is_empty() {
                    return Err(SexpError::Unexpected { ch, offset: start });
                }
                if !escaped && text == "." {
                    return Ok(Token::Dot);
                }
                Ok(Token::Datum(classify_atom(text, escaped)))
            }
        }
    }

    fn nested<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, SexpError>,
    ) -> Result<T, SexpError> {
        if self.depth >= MAX_DEPTH {
            return Err(SexpError::TooDeep(self.pos));
        }
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    fn list(&mut self) -> Result<Token, SexpError> {
        let mut items = Vec::new();
        loop {
            let at = self.pos;
            match self.token()? {
                Token::Datum(d) => items.push(d),
                Token::Close(')') => return Ok(Token::Datum(Sexp::List(items))),
                Token::Close(ch) => return Err(SexpError::Unexpected { ch, offset: at }),
                Token::Dot => {
                    if items.is_empty() {
                        return Err(SexpError::InvalidDot(at));
                    }
                    let tail = self.datum()?;
                    let close_at = self.pos;
                    return match self.token()? {
                        Token::Close(')') => {
                            let mut whole = tail;
                            while let Some(car) = items.pop() {
                                whole = Sexp::cons(car, whole);
                            }
                            Ok(Token::Datum(whole))
                        }
                        _ => Err(SexpError::InvalidDot(close_at)),
                    };
                }
            }
        }
    }

    fn vector(&mut self) -> Result<Token, SexpError> {
        let mut items = Vec::new();
        loop {
            let at = self.pos;
            match self.token()? {
                Token::Datum(d) => items.push(d),
                Token::Close(']') => return Ok(Token::Datum(Sexp::Vector(items))),
                Token::Close(ch) => return Err(SexpError::Unexpected { ch, offset: at }),
                Token::Dot => return Err(SexpError::InvalidDot(at)),
            }
        }
    }

    fn string(&mut self) -> Result<Sexp, SexpError> {
        let mut out = String::new();
        loop {
            match self.bump().ok_or(SexpError::UnexpectedEof)? {
                '"' => return Ok(Sexp::Str(out)),
                '\\' => match self.bump().ok_or(SexpError::UnexpectedEof)? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    // Escaped newline is a line continuation.
                    '\n' => {}
                    other => out.push(other),
                },
                c => out.push(c),
            }
        }
    }

    fn atom(&mut self) -> (String, bool) {
        let mut text = String::new();
        let mut escaped = false;
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || matches!(ch, '(' | ')' | '[' | ']' | '"' | ';' | '\'') {
                break;
            }
            self.bump();
            if ch == '\\' {
                if let Some(next) = self.bump() {
                    text.push(next);
                    escaped = true;
                }
            } else {
                text.push(ch);
            }
        }
        (text, escaped)
    }
}

fn classify_atom(text: String, escaped: bool) -> Sexp {
    if !escaped {
        if text == "nil" {
            return Sexp::nil();
        }
        if looks_like_int(&text) {
            if let Ok(n) = text.parse::<i64>() {
                return Sexp::Int(n);
            }
        }
    }
    Sexp::Symbol(text)
}

fn looks_like_int(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Int(n) => write!(f, "{n}"),
            Sexp::Str(s) => write_string(f, s),
            Sexp::Symbol(s) => write_symbol(f, s),
            Sexp::List(items) if items.is_empty() => f.write_str("nil"),
            Sexp::List(items) => {
                if items.len() == 2 && items[0].as_symbol() == Some("quote") {
                    return write!(f, "'{}", items[1]);
                }
                write_seq(f, '(', items, ')')
            }
            Sexp::Dotted(head, tail) => {
                f.write_char('(')?;
                for item in head {
                    write!(f, "{item} ")?;
                }
                write!(f, ". {tail})")
            }
            Sexp::Vector(items) => write_seq(f, '[', items, ']'),
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: char, items: &[Sexp], close: char) -> fmt::Result {
    f.write_char(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_char(' ')?;
        }
        write!(f, "{item}")?;
    }
    f.write_char(close)
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('"')?;
    for ch in s.chars() {
        if ch == '"' || ch == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(ch)?;
    }
    f.write_char('"')
}

fn write_symbol(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    if s.is_empty() {
        return f.write_str("##");
    }
    if s == "nil" || looks_like_int(s) || s == "." {
        f.write_char('\\')?;
    }
    for (i, ch) in s.chars().enumerate() {
        let special = ch.is_whitespace()
            || matches!(ch, '(' | ')' | '[' | ']' | '"' | ';' | '\'' | '\\' | '`' | ',')
            || (i == 0 && matches!(ch, '#' | '?'));
        if special {
            f.write_char('\\')?;
        }
        f.write_char(ch)?;
    }
    Ok(())
}
