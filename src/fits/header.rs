use std::fmt;

/// Size of one FITS logical record.
pub const BLOCK_SIZE: usize = 2880;
/// Size of one header card.
pub const CARD_SIZE: usize = 80;

// ---------------------------------------------------------------------------
// HeaderValue – the value part of a keyword card
// ---------------------------------------------------------------------------

/// A parsed header keyword value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(i) => Some(*i),
            HeaderValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(f) => Some(*f),
            HeaderValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Str(s) => write!(f, "{s}"),
            HeaderValue::Int(i) => write!(f, "{i}"),
            HeaderValue::Float(v) => write!(f, "{v}"),
            HeaderValue::Bool(b) => write!(f, "{}", if *b { "T" } else { "F" }),
        }
    }
}

// ---------------------------------------------------------------------------
// Header – ordered keyword cards of one HDU
// ---------------------------------------------------------------------------

/// Keyword/value cards of one HDU, in file order. Keywords are stored upper-case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<(String, HeaderValue)>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a keyword.
    pub fn set(&mut self, key: &str, value: HeaderValue) {
        let key = key.trim().to_ascii_uppercase();
        match self.cards.iter_mut().find(|(k, _)| *k == key) {
            Some(card) => card.1 = value,
            None => self.cards.push((key, value)),
        }
    }

    /// Builder-style [`Header::set`].
    pub fn with(mut self, key: &str, value: HeaderValue) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        let key = key.trim();
        self.cards
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HeaderValue::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(HeaderValue::as_i64)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Consume one 2880-byte header block. Returns `true` once the `END` card is seen.
    pub(crate) fn read_block(&mut self, block: &[u8]) -> bool {
        for card in block.chunks_exact(CARD_SIZE) {
            if card.starts_with(b"END") && card[3..8].iter().all(|&b| b == b' ') {
                return true;
            }
            if let Some((key, value)) = parse_card(card) {
                self.cards.push((key, value));
            }
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Card parsing
// ---------------------------------------------------------------------------

/// Parse one 80-byte card. Commentary cards and cards without a value
/// indicator yield `None`.
pub(crate) fn parse_card(card: &[u8]) -> Option<(String, HeaderValue)> {
    if card.len() < 10 {
        return None;
    }
    let keyword = String::from_utf8_lossy(&card[..8]).trim().to_ascii_uppercase();
    if keyword.is_empty() || keyword == "COMMENT" || keyword == "HISTORY" {
        return None;
    }
    if &card[8..10] != b"= " {
        return None;
    }
    let value = String::from_utf8_lossy(&card[10..]);
    Some((keyword, parse_value(&value)))
}

fn parse_value(raw: &str) -> HeaderValue {
    let s = raw.trim_start();

    if let Some(rest) = s.strip_prefix('\'') {
        // Quotes inside strings are doubled.
        let mut out = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    out.push('\'');
                    continue;
                }
                break;
            }
            out.push(c);
        }
        return HeaderValue::Str(out.trim_end().to_string());
    }

    let value_part = match s.find('/') {
        Some(idx) => s[..idx].trim(),
        None => s.trim(),
    };

    match value_part {
        "T" => return HeaderValue::Bool(true),
        "F" => return HeaderValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = value_part.parse::<i64>() {
        return HeaderValue::Int(i);
    }
    if let Ok(f) = value_part.replace(['D', 'd'], "E").parse::<f64>() {
        return HeaderValue::Float(f);
    }
    HeaderValue::Str(value_part.to_string())
}

/// Render one keyword card. Strings start at column 11, other values are
/// right-justified to column 30.
pub(crate) fn format_card(key: &str, value: &HeaderValue) -> [u8; CARD_SIZE] {
    let mut card = [b' '; CARD_SIZE];
    let key = key.to_ascii_uppercase();
    let key_bytes = key.as_bytes();
    let key_len = key_bytes.len().min(8);
    card[..key_len].copy_from_slice(&key_bytes[..key_len]);
    card[8] = b'=';

    let text = match value {
        HeaderValue::Str(s) => format!("'{:<8}'", s.replace('\'', "''")),
        HeaderValue::Int(i) => format!("{i:>20}"),
        HeaderValue::Float(f) => format!("{:>20}", format!("{f:.15E}")),
        HeaderValue::Bool(b) => format!("{:>20}", if *b { "T" } else { "F" }),
    };
    let bytes = text.as_bytes();
    let len = bytes.len().min(CARD_SIZE - 10);
    card[10..10 + len].copy_from_slice(&bytes[..len]);
    card
}

/// The `END` card.
pub(crate) fn end_card() -> [u8; CARD_SIZE] {
    let mut card = [b' '; CARD_SIZE];
    card[..3].copy_from_slice(b"END");
    card
}
