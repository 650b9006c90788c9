//! Content validator — pure length + blocked-phrase gate over LM output.
//!
//! Grounded on `original_source/core/services/content_filter.py::validate`. Two
//! distinct matching strategies per spec.md §4.2 step 7: word-boundary regex for
//! phrases (so "investigation" never trips on "invest"), plain substring matching
//! for URL-shaped tokens.

use once_cell::sync::Lazy;
use regex::Regex;

const BLOCKED_PHRASES: &[&str] = &[
    "buy",
    "sell",
    "invest",
    "investing",
    "price target",
    "prediction",
    "click",
    "subscribe",
    "go to",
    "check out",
    "breaking news",
];

const BLOCKED_SUBSTRINGS: &[&str] = &["http", "www.", ".com", ".org", ".net"];

pub const DEFAULT_MIN_WORDS: u32 = 15;
pub const DEFAULT_MAX_WORDS: u32 = 100;
pub const DEFAULT_MAX_CHARS: u32 = 600;
pub const DEFAULT_BREAKING_MIN_WORDS: u32 = 10;
pub const DEFAULT_BREAKING_MAX_WORDS: u32 = 50;

static WORD_BOUNDARY_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    BLOCKED_PHRASES
        .iter()
        .map(|phrase| {
            let pattern = format!(r"\b{}\b", regex::escape(phrase));
            (*phrase, Regex::new(&pattern).expect("static pattern"))
        })
        .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    TooShort { words: usize, min: u32 },
    TooLong { words: usize, max: u32 },
    TooManyChars { chars: usize, max: u32 },
    BlockedPhrase(String),
    BlockedSubstring(String),
}

impl Rejection {
    pub fn reason(&self) -> String {
        match self {
            Rejection::Empty => "empty script".to_string(),
            Rejection::TooShort { words, min } => {
                format!("too short ({words} words, min {min})")
            }
            Rejection::TooLong { words, max } => {
                format!("too long ({words} words, max {max})")
            }
            Rejection::TooManyChars { chars, max } => {
                format!("exceeds {max} chars (got {chars})")
            }
            Rejection::BlockedPhrase(p) => format!("blocked word: '{p}'"),
            Rejection::BlockedSubstring(p) => format!("blocked pattern: '{p}'"),
        }
    }
}

pub struct ValidationBounds {
    pub min_words: u32,
    pub max_words: u32,
    pub max_chars: u32,
}

pub fn validate(
    script: &str,
    is_breaking: bool,
    bounds: &ValidationBounds,
) -> Result<(), Rejection> {
    if script.trim().is_empty() {
        return Err(Rejection::Empty);
    }

    let words: Vec<&str> = script.split_whitespace().collect();

    if words.len() < bounds.min_words as usize {
        return Err(Rejection::TooShort {
            words: words.len(),
            min: bounds.min_words,
        });
    }
    if words.len() > bounds.max_words as usize {
        return Err(Rejection::TooLong {
            words: words.len(),
            max: bounds.max_words,
        });
    }
    if script.chars().count() > bounds.max_chars as usize {
        return Err(Rejection::TooManyChars {
            chars: script.chars().count(),
            max: bounds.max_chars,
        });
    }

    let lower = script.to_lowercase();

    for (phrase, re) in WORD_BOUNDARY_PATTERNS.iter() {
        if *phrase == "breaking news" && is_breaking {
            continue;
        }
        if re.is_match(&lower) {
            return Err(Rejection::BlockedPhrase(phrase.to_string()));
        }
    }

    for sub in BLOCKED_SUBSTRINGS {
        if lower.contains(sub) {
            return Err(Rejection::BlockedSubstring(sub.to_string()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> ValidationBounds {
        ValidationBounds {
            min_words: DEFAULT_MIN_WORDS,
            max_words: DEFAULT_MAX_WORDS,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    fn long_enough(suffix: &str) -> String {
        let filler = "word ".repeat(DEFAULT_MIN_WORDS as usize);
        format!("{filler}{suffix}")
    }

    #[test]
    fn rejects_domain_substring() {
        let script = long_enough("Please visit example.com today");
        let err = validate(&script, false, &bounds()).unwrap_err();
        assert_eq!(err, Rejection::BlockedSubstring(".com".to_string()));
    }

    #[test]
    fn accepts_investigation_word_boundary() {
        let script = long_enough("The investigation continues into the matter at hand");
        assert!(validate(&script, false, &bounds()).is_ok());
    }

    #[test]
    fn rejects_too_short() {
        let err = validate("Too short.", false, &bounds()).unwrap_err();
        assert!(matches!(err, Rejection::TooShort { .. }));
    }

    #[test]
    fn rejects_too_long() {
        let script = "word ".repeat(DEFAULT_MAX_WORDS as usize + 5);
        let err = validate(&script, false, &bounds()).unwrap_err();
        assert!(matches!(err, Rejection::TooLong { .. }));
    }

    #[test]
    fn breaking_news_phrase_allowed_only_when_breaking() {
        let script = long_enough("This is breaking news from the studio");
        assert!(validate(&script, false, &bounds()).is_err());
        assert!(validate(&script, true, &bounds()).is_ok());
    }

    #[test]
    fn rejects_blocked_investment_phrase() {
        let script = long_enough("you should buy this stock immediately friend");
        let err = validate(&script, false, &bounds()).unwrap_err();
        assert_eq!(err, Rejection::BlockedPhrase("buy".to_string()));
    }
}
