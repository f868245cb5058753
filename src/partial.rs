//! Best-effort parsing of possibly-truncated JSON.
//!
//! Structured output arrives as a JSON document split into arbitrary text
//! deltas. After every delta the accumulated buffer is handed to
//! [`parse_partial`], which distinguishes three situations:
//!
//! - [`PartialParse::Complete`]: the buffer is one complete JSON document.
//! - [`PartialParse::Incomplete`]: the buffer is a valid prefix of some JSON
//!   document. The carried value holds everything that is already certain.
//! - [`PartialParse::Invalid`]: no continuation can make the buffer valid.
//!
//! A value is "certain" only once its token has ended. Truncated strings,
//! numbers and literals at the end of the buffer are dropped, as are object keys
//! whose value has not started yet; open objects and arrays are closed
//! implicitly and keep the members parsed so far:
//!
//! ```rust
//! use structured_stream::{parse_partial, PartialParse};
//! use serde_json::json;
//!
//! let parsed = parse_partial(r#"{"title":"Sourdough","steps":["Mix","Fol"#);
//! assert_eq!(
//!     parsed,
//!     PartialParse::Incomplete(Some(json!({"title": "Sourdough", "steps": ["Mix"]})))
//! );
//! ```

use serde_json::{Map, Number, Value};

const MAX_DEPTH: usize = 128;

/// Outcome of parsing a possibly-truncated JSON buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialParse {
    Complete(Value),
    /// `None` when nothing certain has been parsed yet.
    Incomplete(Option<Value>),
    Invalid(String),
}

impl PartialParse {
    /// The best-effort value, whether complete or not.
    pub fn value(&self) -> Option<&Value> {
        match self {
            PartialParse::Complete(v) => Some(v),
            PartialParse::Incomplete(v) => v.as_ref(),
            PartialParse::Invalid(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            PartialParse::Complete(v) => Some(v),
            PartialParse::Incomplete(v) => v,
            PartialParse::Invalid(_) => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, PartialParse::Complete(_))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, PartialParse::Invalid(_))
    }
}

/// Parse `input` as a possibly-truncated JSON document.
pub fn parse_partial(input: &str) -> PartialParse {
    let mut parser = Parser {
        src: input.as_bytes(),
        pos: 0,
        depth: 0,
    };

    match parser.value() {
        Ok(Parsed::Done(value)) => {
            parser.skip_ws();
            if parser.at_end() {
                PartialParse::Complete(value)
            } else {
                PartialParse::Invalid(format!("trailing characters at offset {}", parser.pos))
            }
        }
        Ok(Parsed::Truncated(value)) => PartialParse::Incomplete(value),
        Err(msg) => PartialParse::Invalid(msg),
    }
}

enum Parsed {
    Done(Value),
    /// Input ended inside this value.
    Truncated(Option<Value>),
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn unexpected(&self, byte: u8) -> String {
        format!(
            "unexpected character '{}' at offset {}",
            byte.escape_ascii(),
            self.pos
        )
    }

    fn value(&mut self) -> Result<Parsed, String> {
        self.skip_ws();
        let Some(byte) = self.peek() else {
            return Ok(Parsed::Truncated(None));
        };

        match byte {
            b'{' => self.nested(Self::object),
            b'[' => self.nested(Self::array),
            b'"' => Ok(match self.string()? {
                Some(s) => Parsed::Done(Value::String(s)),
                None => Parsed::Truncated(None),
            }),
            b'-' | b'0'..=b'9' => self.number(),
            b't' => self.literal("true", Value::Bool(true)),
            b'f' => self.literal("false", Value::Bool(false)),
            b'n' => self.literal("null", Value::Null),
            other => Err(self.unexpected(other)),
        }
    }

    fn nested(&mut self, parse: fn(&mut Self) -> Result<Parsed, String>) -> Result<Parsed, String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(format!("nesting deeper than {} levels", MAX_DEPTH));
        }
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn object(&mut self) -> Result<Parsed, String> {
        self.pos += 1; // '{'
        let mut map = Map::new();

        self.skip_ws();
        match self.peek() {
            None => return Ok(Parsed::Truncated(Some(Value::Object(map)))),
            Some(b'}') => {
                self.pos += 1;
                return Ok(Parsed::Done(Value::Object(map)));
            }
            _ => {}
        }

        loop {
            self.skip_ws();
            match self.peek() {
                None => return Ok(Parsed::Truncated(Some(Value::Object(map)))),
                Some(b'"') => {}
                Some(other) => return Err(self.unexpected(other)),
            }

            let Some(key) = self.string()? else {
                return Ok(Parsed::Truncated(Some(Value::Object(map))));
            };

            self.skip_ws();
            match self.peek() {
                None => return Ok(Parsed::Truncated(Some(Value::Object(map)))),
                Some(b':') => self.pos += 1,
                Some(other) => return Err(self.unexpected(other)),
            }

            match self.value()? {
                Parsed::Done(value) => {
                    map.insert(key, value);
                }
                Parsed::Truncated(value) => {
                    if let Some(value) = value {
                        map.insert(key, value);
                    }
                    return Ok(Parsed::Truncated(Some(Value::Object(map))));
                }
            }

            self.skip_ws();
            match self.peek() {
                None => return Ok(Parsed::Truncated(Some(Value::Object(map)))),
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Parsed::Done(Value::Object(map)));
                }
                Some(other) => return Err(self.unexpected(other)),
            }
        }
    }

    fn array(&mut self) -> Result<Parsed, String> {
        self.pos += 1; // '['
        let mut items = Vec::new();

        self.skip_ws();
        match self.peek() {
            None => return Ok(Parsed::Truncated(Some(Value::Array(items)))),
            Some(b']') => {
                self.pos += 1;
                return Ok(Parsed::Done(Value::Array(items)));
            }
            _ => {}
        }

        loop {
            match self.value()? {
                Parsed::Done(value) => items.push(value),
                Parsed::Truncated(value) => {
                    items.extend(value);
                    return Ok(Parsed::Truncated(Some(Value::Array(items))));
                }
            }

            self.skip_ws();
            match self.peek() {
                None => return Ok(Parsed::Truncated(Some(Value::Array(items)))),
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Parsed::Done(Value::Array(items)));
                }
                Some(other) => return Err(self.unexpected(other)),
            }
        }
    }

    /// Returns `None` if the input ends before the closing quote.
    fn string(&mut self) -> Result<Option<String>, String> {
        self.pos += 1; // opening quote
        let mut out: Vec<u8> = Vec::new();

        loop {
            let Some(byte) = self.peek() else {
                return Ok(None);
            };
            self.pos += 1;

            match byte {
                b'"' => {
                    return String::from_utf8(out)
                        .map(Some)
                        .map_err(|e| format!("invalid UTF-8 in string: {}", e));
                }
                b'\\' => {
                    let Some(escape) = self.peek() else {
                        return Ok(None);
                    };
                    self.pos += 1;
                    let unescaped = match escape {
                        b'"' => '"',
                        b'\\' => '\\',
                        b'/' => '/',
                        b'b' => '\u{8}',
                        b'f' => '\u{c}',
                        b'n' => '\n',
                        b'r' => '\r',
                        b't' => '\t',
                        b'u' => match self.unicode_escape()? {
                            Some(c) => c,
                            None => return Ok(None),
                        },
                        other => {
                            return Err(format!("invalid escape '\\{}'", other.escape_ascii()));
                        }
                    };
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(unescaped.encode_utf8(&mut buf).as_bytes());
                }
                0x00..=0x1f => {
                    return Err(format!("control character in string at offset {}", self.pos - 1));
                }
                other => out.push(other),
            }
        }
    }

    /// Parses the hex digits after `\u`, including a trailing low surrogate.
    fn unicode_escape(&mut self) -> Result<Option<char>, String> {
        let Some(high) = self.hex4()? else {
            return Ok(None);
        };

        if !(0xD800..0xDC00).contains(&high) {
            return char::from_u32(high)
                .map(Some)
                .ok_or_else(|| format!("invalid unicode escape {:04x}", high));
        }

        // High surrogate: a `\uDC00..\uDFFF` must follow.
        for expected in [b'\\', b'u'] {
            match self.peek() {
                None => return Ok(None),
                Some(b) if b == expected => self.pos += 1,
                Some(_) => return Err(format!("unpaired surrogate {:04x}", high)),
            }
        }
        let Some(low) = self.hex4()? else {
            return Ok(None);
        };
        if !(0xDC00..0xE000).contains(&low) {
            return Err(format!("invalid low surrogate {:04x}", low));
        }
        let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        char::from_u32(combined)
            .map(Some)
            .ok_or_else(|| format!("invalid surrogate pair {:04x} {:04x}", high, low))
    }

    fn hex4(&mut self) -> Result<Option<u32>, String> {
        let mut code = 0u32;
        for _ in 0..4 {
            let Some(byte) = self.peek() else {
                return Ok(None);
            };
            let digit = (byte as char)
                .to_digit(16)
                .ok_or_else(|| format!("invalid hex digit at offset {}", self.pos))?;
            code = code * 16 + digit;
            self.pos += 1;
        }
        Ok(Some(code))
    }

    fn number(&mut self) -> Result<Parsed, String> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E')
        ) {
            self.pos += 1;
        }

        // A number touching the end of input may still grow.
        if self.at_end() {
            return Ok(Parsed::Truncated(None));
        }

        let text = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|e| format!("invalid number: {}", e))?;
        serde_json::from_str::<Number>(text)
            .map(|n| Parsed::Done(Value::Number(n)))
            .map_err(|_| format!("invalid number '{}' at offset {}", text, start))
    }

    fn literal(&mut self, word: &str, value: Value) -> Result<Parsed, String> {
        let rest = &self.src[self.pos..];
        let word = word.as_bytes();

        if rest.len() < word.len() {
            if word.starts_with(rest) {
                self.pos = self.src.len();
                return Ok(Parsed::Truncated(None));
            }
        } else if rest.starts_with(word) {
            self.pos += word.len();
            return Ok(Parsed::Done(value));
        }
        Err(format!("invalid literal at offset {}", self.pos))
    }
}
