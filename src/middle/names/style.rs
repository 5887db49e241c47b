//! Identifier style conversion
//!
//! Words are split on `_`, `-`, whitespace and case transitions
//! (`parseHTTPRequest` → `parse`, `http`, `request`), then re-joined in the
//! requested style.

use serde::{Deserialize, Serialize};

/// Target identifier style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentStyle {
    /// `fooBar`
    Camel,
    /// `FooBar`
    Pascal,
    /// `foo_bar`
    Snake,
    /// `FOO_BAR`
    LoudSnake,
    /// `foo-bar`
    Dash,
}

impl IdentStyle {
    /// Convert `text` into this style
    pub fn convert(
        self,
        text: &str,
    ) -> String {
        let words = split_words(text);
        if words.is_empty() {
            return String::new();
        }
        let mut out = String::with_capacity(text.len() + words.len());
        for (i, word) in words.iter().enumerate() {
            match self {
                IdentStyle::Camel if i == 0 => out.push_str(word),
                IdentStyle::Camel | IdentStyle::Pascal => push_capitalized(&mut out, word),
                IdentStyle::Snake => {
                    if i > 0 {
                        out.push('_');
                    }
                    out.push_str(word);
                }
                IdentStyle::LoudSnake => {
                    if i > 0 {
                        out.push('_');
                    }
                    out.push_str(&word.to_uppercase());
                }
                IdentStyle::Dash => {
                    if i > 0 {
                        out.push('-');
                    }
                    out.push_str(word);
                }
            }
        }
        out
    }
}

fn push_capitalized(
    out: &mut String,
    word: &str,
) {
    let mut chars = word.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.push_str(chars.as_str());
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Upper,
    Lower,
    Digit,
}

fn class_of(c: char) -> CharClass {
    if c.is_uppercase() {
        CharClass::Upper
    } else if c.is_numeric() {
        CharClass::Digit
    } else {
        CharClass::Lower
    }
}

/// Split an identifier into lowercase words
pub fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    for chunk in text.split(|c: char| c == '_' || c == '-' || c.is_whitespace()) {
        let chars: Vec<char> = chunk.chars().collect();
        let mut start = 0;
        for i in 1..chars.len() {
            let prev = class_of(chars[i - 1]);
            let cur = class_of(chars[i]);
            let next_is_lower = chars
                .get(i + 1)
                .map(|c| class_of(*c) == CharClass::Lower)
                .unwrap_or(false);
            let boundary = match (prev, cur) {
                (CharClass::Lower, CharClass::Upper) => true,
                (CharClass::Digit, CharClass::Upper) => true,
                // `HTTPRequest`: the `R` starts a new word
                (CharClass::Upper, CharClass::Upper) => next_is_lower,
                _ => false,
            };
            if boundary {
                words.push(chars[start..i].iter().collect::<String>().to_lowercase());
                start = i;
            }
        }
        if start < chars.len() {
            words.push(chars[start..].iter().collect::<String>().to_lowercase());
        }
    }
    words
}
