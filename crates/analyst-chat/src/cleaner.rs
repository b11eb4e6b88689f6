//! Reduces a gathering-mode reply to a single clarifying question.

use std::sync::LazyLock;

use regex::Regex;

use analyst_core::types::ConversationMode;

pub const DEFAULT_FALLBACK_QUESTION: &str = "Could you tell me more about that?";

/// Longest question emitted, in characters.
pub const MAX_QUESTION_CHARS: usize = 200;

const QUESTION_WORDS: [&str; 11] = [
    "what", "who", "where", "when", "why", "how", "which", "can", "could", "would", "will",
];

// Leading "1." / "2)" / "- " / "• " / "* " markers.
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+[.)]\s*|[-•*]\s+)").expect("Invalid marker regex")
});

#[derive(Debug, Clone)]
pub struct ResponseCleaner {
    fallback: String,
}

impl Default for ResponseCleaner {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_QUESTION)
    }
}

impl ResponseCleaner {
    pub fn new(fallback: impl Into<String>) -> Self {
        let fallback = fallback.into();
        Self {
            fallback: if fallback.trim().is_empty() {
                DEFAULT_FALLBACK_QUESTION.to_string()
            } else {
                fallback
            },
        }
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Clean `raw` for `mode`. Only gathering replies are rewritten.
    pub fn clean(&self, raw: &str, mode: ConversationMode) -> String {
        if mode != ConversationMode::Gathering {
            return raw.to_string();
        }

        split_sentences(raw)
            .into_iter()
            .find_map(|s| qualify(&s))
            .map(|q| truncate_question(&q))
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Split on `.`, `!` or `?` followed by whitespace (or the end), and on
/// line breaks. Enumeration markers and wrapping quotes are removed.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();

    for line in text.lines() {
        let chars: Vec<char> = line.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            current.push(c);
            let boundary = matches!(c, '.' | '!' | '?')
                && chars.get(i + 1).map_or(true, |next| next.is_whitespace())
                && !(c == '.' && is_abbreviation(&current[..current.len() - 1]));
            if boundary {
                push_sentence(&mut sentences, &current);
                current.clear();
            }
        }
        push_sentence(&mut sentences, &current);
    }

    sentences
}

/// Whether the word ending `text` is an abbreviation such as "e.g" or
/// "U.S", or a lone initial.
fn is_abbreviation(text: &str) -> bool {
    let word = text.rsplit(char::is_whitespace).next().unwrap_or("");
    let letters = word.chars().filter(|c| c.is_alphabetic()).count();
    word.contains('.') || (letters == 1 && word.chars().count() == 1)
}

fn push_sentence(out: &mut Vec<String>, raw: &str) {
    let mut s = raw.trim().to_string();
    while let Some(m) = MARKER.find(&s) {
        if m.end() == 0 {
            break;
        }
        s = s[m.end()..].to_string();
    }
    let s = s
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\u{201c}' | '\u{201d}'))
        .trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}

/// A sentence qualifies if it is a question of at least three words, or
/// starts with a question word (in which case it is made into a question).
fn qualify(sentence: &str) -> Option<String> {
    if sentence.ends_with('?') && sentence.split_whitespace().count() >= 3 {
        return Some(sentence.to_string());
    }

    let first = sentence
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    // "what's", "how's", "who’s"
    let first = first.split(['\'', '\u{2019}']).next().unwrap_or("");
    if !QUESTION_WORDS.contains(&first) {
        return None;
    }

    if sentence.ends_with('?') {
        Some(sentence.to_string())
    } else {
        Some(format!("{}?", sentence.trim_end_matches(['.', '!']).trim_end()))
    }
}

fn truncate_question(question: &str) -> String {
    if question.chars().count() <= MAX_QUESTION_CHARS {
        return question.to_string();
    }
    let (keep, suffix) = if question.ends_with('?') {
        (MAX_QUESTION_CHARS - 2, "\u{2026}?")
    } else {
        (MAX_QUESTION_CHARS - 1, "\u{2026}")
    };
    let head: String = question.chars().take(keep).collect();
    format!("{}{}", head.trim_end(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(raw: &str) -> String {
        ResponseCleaner::default().clean(raw, ConversationMode::Gathering)
    }

    #[test]
    fn test_numbered_list_keeps_first_question() {
        assert_eq!(
            clean("1. What is your target market? 2. What is your budget?"),
            "What is your target market?"
        );
    }

    #[test]
    fn test_statement_falls_back() {
        assert_eq!(clean("Sure, I can help with that."), DEFAULT_FALLBACK_QUESTION);
    }

    #[test]
    fn test_question_word_gets_question_mark() {
        assert_eq!(clean("Great idea. Who will use the app."), "Who will use the app?");
    }

    #[test]
    fn test_preamble_skipped() {
        assert_eq!(
            clean("Thanks for sharing!\nWhat problem does the bakery solve for its customers?"),
            "What problem does the bakery solve for its customers?"
        );
    }

    #[test]
    fn test_bullets_and_quotes_stripped() {
        assert_eq!(clean("- \"Who are your competitors?\""), "Who are your competitors?");
        assert_eq!(clean("• How will you reach them?"), "How will you reach them?");
    }

    #[test]
    fn test_short_question_without_question_word_rejected() {
        assert_eq!(clean("Really?"), DEFAULT_FALLBACK_QUESTION);
    }

    #[test]
    fn test_long_question_truncated() {
        let long = format!("What {}?", "very ".repeat(60));
        let cleaned = clean(&long);
        assert_eq!(cleaned.chars().count(), MAX_QUESTION_CHARS);
        assert!(cleaned.ends_with("\u{2026}?"));
    }

    #[test]
    fn test_idempotent() {
        let long = format!("Which {}?", "option ".repeat(50));
        for raw in [
            "What is your target market?",
            "1. What is your target market? 2. What is your budget?",
            "Sure.",
            "Who is the main stakeholder, e.g. the owner or the manager?",
            "Which U.S. states will you launch in?",
            long.as_str(),
        ] {
            let once = clean(raw);
            assert_eq!(clean(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_abbreviations_do_not_split() {
        let question = "Who is the main stakeholder, e.g. the owner or the manager?";
        assert_eq!(clean(question), question);
        assert_eq!(
            clean("Noted. Which U.S. states will you launch in?"),
            "Which U.S. states will you launch in?"
        );
    }

    #[test]
    fn test_contracted_question_word() {
        assert_eq!(clean("What's your target launch date."), "What's your target launch date?");
        assert_eq!(
            clean("Got it. How\u{2019}s the product priced"),
            "How\u{2019}s the product priced?"
        );
    }

    #[test]
    fn test_other_modes_untouched() {
        let cleaner = ResponseCleaner::default();
        let raw = "## 1. Executive Summary\n- item";
        assert_eq!(cleaner.clean(raw, ConversationMode::Generating), raw);
        assert_eq!(cleaner.clean(raw, ConversationMode::General), raw);
    }

    #[test]
    fn test_custom_fallback() {
        let cleaner = ResponseCleaner::new("What else should I know?");
        assert_eq!(
            cleaner.clean("ok", ConversationMode::Gathering),
            "What else should I know?"
        );
        assert_eq!(ResponseCleaner::new(" ").fallback(), DEFAULT_FALLBACK_QUESTION);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(clean(""), DEFAULT_FALLBACK_QUESTION);
    }
}
