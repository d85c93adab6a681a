use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static SINGLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']*)'").expect("valid quote pattern"));
static DANGLING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid comma pattern"));

/// Parse a payload cell that may be strict JSON, single-quoted
/// pseudo-JSON, or a Python-style literal dump. Returns `None` when every
/// attempt fails; callers degrade to an empty value.
pub fn parse_loose(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    if let Ok(value) = serde_json::from_str(&repair_quotes(trimmed)) {
        return Some(value);
    }
    parse_literal(trimmed)
}

/// Quote-normalization repair: single-quoted strings become
/// double-quoted and commas dangling before a closing bracket are
/// dropped.
pub fn repair_quotes(raw: &str) -> String {
    let requoted = SINGLE_QUOTED.replace_all(raw, "\"$1\"");
    DANGLING_COMMA.replace_all(&requoted, "$1").into_owned()
}

/// Last-resort literal parser: accepts either quote style, bare words
/// inside containers, `None`/`True`/`False`, and trailing commas. Free
/// text that is not a container or a quoted/known scalar is rejected.
fn parse_literal(raw: &str) -> Option<Value> {
    let mut parser = Literal {
        src: raw.as_bytes(),
        pos: 0,
    };
    parser.skip_ws();
    let value = match parser.peek()? {
        b'{' | b'[' | b'\'' | b'"' => parser.value()?,
        _ => return known_scalar(raw.trim()),
    };
    parser.skip_ws();
    if parser.pos == parser.src.len() {
        Some(value)
    } else {
        None
    }
}

fn known_scalar(word: &str) -> Option<Value> {
    match word {
        "None" | "null" => return Some(Value::Null),
        "True" | "true" => return Some(Value::Bool(true)),
        "False" | "false" => return Some(Value::Bool(false)),
        _ => {}
    }
    if let Ok(n) = word.parse::<i64>() {
        return Some(Value::from(n));
    }
    word.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

struct Literal<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Literal<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Option<Value> {
        match self.peek()? {
            b'{' => self.object(),
            b'[' => self.array(),
            b'\'' | b'"' => self.string().map(Value::String),
            _ => self.scalar(),
        }
    }

    fn object(&mut self) -> Option<Value> {
        self.pos += 1;
        let mut map = serde_json::Map::new();
        loop {
            self.skip_ws();
            match self.peek()? {
                b'}' => {
                    self.pos += 1;
                    return Some(Value::Object(map));
                }
                b',' => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }
            let key = match self.peek()? {
                b'\'' | b'"' => self.string()?,
                _ => self.bare(&[b':'])?.trim().to_string(),
            };
            self.skip_ws();
            if self.peek()? != b':' {
                return None;
            }
            self.pos += 1;
            self.skip_ws();
            let value = self.value()?;
            map.insert(key, value);
        }
    }

    fn array(&mut self) -> Option<Value> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek()? {
                b']' => {
                    self.pos += 1;
                    return Some(Value::Array(items));
                }
                b',' => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }
            items.push(self.value()?);
        }
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.src[self.pos];
        self.pos += 1;
        let mut buf = Vec::new();
        while self.pos < self.src.len() {
            let c = self.src[self.pos];
            if c == b'\\' && self.pos + 1 < self.src.len() {
                let escaped = self.src[self.pos + 1];
                buf.push(match escaped {
                    b'n' => b'\n',
                    b't' => b'\t',
                    b'r' => b'\r',
                    other => other,
                });
                self.pos += 2;
            } else if c == quote {
                self.pos += 1;
                return Some(String::from_utf8_lossy(&buf).into_owned());
            } else {
                buf.push(c);
                self.pos += 1;
            }
        }
        None
    }

    fn scalar(&mut self) -> Option<Value> {
        let word = self.bare(&[b',', b'}', b']'])?;
        let word = word.trim();
        if word.is_empty() {
            return None;
        }
        known_scalar(word).or_else(|| Some(Value::String(word.to_string())))
    }

    fn bare(&mut self, stops: &[u8]) -> Option<String> {
        let start = self.pos;
        while self.pos < self.src.len() && !stops.contains(&self.src[self.pos]) {
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            Some(String::from_utf8_lossy(&self.src[start..self.pos]).into_owned())
        }
    }
}
