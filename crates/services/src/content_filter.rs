//! Content/safety filter for user-submitted text.
//!
//! Pure keyword and heuristic checks; no state, no network. Categories are
//! checked in a fixed order and the first hit wins.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCategory {
    Profanity,
    Harassment,
    Spam,
    PersonalInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResult {
    pub is_safe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<FilterCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub confidence: f32,
}

impl FilterResult {
    fn safe() -> Self {
        Self {
            is_safe: true,
            category: None,
            reason: None,
            confidence: 1.0,
        }
    }

    fn flagged(category: FilterCategory, reason: impl Into<String>, confidence: f32) -> Self {
        Self {
            is_safe: false,
            category: Some(category),
            reason: Some(reason.into()),
            confidence,
        }
    }
}

const PROFANITY: &[&str] = &[
    "fuck", "fucking", "fucker", "shit", "shitty", "bitch", "bastard", "asshole", "dick",
    "cunt", "motherfucker", "bullshit", "dumbass", "jackass", "whore", "slut", "piss",
    "wanker", "prick",
];

const HARASSMENT: &[&str] = &[
    "kill yourself",
    "kys",
    "go die",
    "nobody likes you",
    "you should die",
    "i will hurt you",
    "you are worthless",
    "you're worthless",
];

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}@$]+").unwrap());
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bhttps?://|\bwww\.").unwrap());
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[\s.-]?)?\(?\b\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}\b").unwrap()
});
static SSN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

/// Undo the usual character swaps used to dodge word lists.
fn deleet(word: &str) -> String {
    word.chars()
        .map(|c| match c {
            '0' => 'o',
            '1' => 'i',
            '3' => 'e',
            '4' => 'a',
            '5' => 's',
            '@' => 'a',
            '$' => 's',
            other => other,
        })
        .collect()
}

fn find_profanity(lower: &str) -> Option<String> {
    for m in WORD.find_iter(lower) {
        let word = m.as_str();
        if PROFANITY.contains(&word) {
            return Some(word.to_string());
        }
        let has_letter = word.chars().any(|c| c.is_alphabetic());
        if has_letter {
            let plain = deleet(word);
            if PROFANITY.contains(&plain.as_str()) {
                return Some(plain);
            }
        }
    }
    None
}

fn find_harassment(lower: &str) -> Option<&'static str> {
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    let normalized = words.join(" ");
    HARASSMENT.iter().copied().find(|phrase| {
        if phrase.contains(' ') {
            normalized.contains(phrase)
        } else {
            words.contains(phrase)
        }
    })
}

fn spam_reason(text: &str) -> Option<String> {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= 10 {
        let upper = letters.iter().filter(|c| c.is_uppercase()).count();
        let ratio = upper as f32 / letters.len() as f32;
        if ratio > 0.7 {
            return Some(format!("excessive capitals ({:.0}%)", ratio * 100.0));
        }
    }

    let mut run = 1;
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if Some(c) == prev && !c.is_whitespace() {
            run += 1;
            if run >= 8 {
                return Some(format!("character '{}' repeated {}+ times", c, run));
            }
        } else {
            run = 1;
        }
        prev = Some(c);
    }

    let links = LINK.find_iter(text).count();
    if links > 3 {
        return Some(format!("too many links ({})", links));
    }

    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if words.len() >= 8 {
        let unique: std::collections::HashSet<&String> = words.iter().collect();
        let ratio = unique.len() as f32 / words.len() as f32;
        if ratio < 0.3 {
            return Some("repetitive text".to_string());
        }
    }
    None
}

fn personal_info_reason(text: &str) -> Option<&'static str> {
    if SSN.is_match(text) {
        Some("looks like a social security number")
    } else if PHONE.is_match(text) {
        Some("contains a phone number")
    } else if EMAIL.is_match(text) {
        Some("contains an email address")
    } else {
        None
    }
}

/// Classify `text`. Empty text is safe.
pub fn check_content(text: &str) -> FilterResult {
    let text = text.trim();
    if text.is_empty() {
        return FilterResult::safe();
    }
    let lower = text.to_lowercase();

    if let Some(word) = find_profanity(&lower) {
        return FilterResult::flagged(
            FilterCategory::Profanity,
            format!("contains inappropriate language (\"{}\")", word),
            0.95,
        );
    }
    if let Some(phrase) = find_harassment(&lower) {
        return FilterResult::flagged(
            FilterCategory::Harassment,
            format!("contains harassing language (\"{}\")", phrase),
            0.9,
        );
    }
    if let Some(reason) = spam_reason(text) {
        return FilterResult::flagged(FilterCategory::Spam, reason, 0.7);
    }
    if let Some(reason) = personal_info_reason(text) {
        return FilterResult::flagged(FilterCategory::PersonalInfo, reason, 0.8);
    }
    FilterResult::safe()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_is_safe() {
        let result = check_content("Can someone explain the chain rule before Friday's quiz?");
        assert!(result.is_safe);
        assert_eq!(result.category, None);
    }

    #[test]
    fn profanity_is_flagged() {
        let result = check_content("this homework is shit");
        assert!(!result.is_safe);
        assert_eq!(result.category, Some(FilterCategory::Profanity));
    }

    #[test]
    fn leetspeak_profanity_is_flagged() {
        let result = check_content("what a b1tch of an exam");
        assert_eq!(result.category, Some(FilterCategory::Profanity));
    }

    #[test]
    fn word_boundaries_avoid_false_positives() {
        // "class" and "assess" contain "ass"; "Dickens" is not "dick"
        assert!(check_content("We assess the class reading of Dickens").is_safe);
        assert!(check_content("Scunthorpe is a town").is_safe);
    }

    #[test]
    fn harassment_phrases_are_flagged() {
        let result = check_content("honestly just kill   yourself");
        assert_eq!(result.category, Some(FilterCategory::Harassment));
    }

    #[test]
    fn shouting_is_spam() {
        let result = check_content("BUY CHEAP ESSAYS NOW CLICK HERE");
        assert_eq!(result.category, Some(FilterCategory::Spam));
    }

    #[test]
    fn repeated_characters_are_spam() {
        assert_eq!(
            check_content("helloooooooooo").category,
            Some(FilterCategory::Spam)
        );
    }

    #[test]
    fn repetitive_words_are_spam() {
        assert_eq!(
            check_content("free free free free free free free free free").category,
            Some(FilterCategory::Spam)
        );
    }

    #[test]
    fn phone_numbers_are_personal_info() {
        let result = check_content("text me at 555-123-4567 tonight");
        assert_eq!(result.category, Some(FilterCategory::PersonalInfo));
    }

    #[test]
    fn empty_text_is_safe() {
        assert!(check_content("   ").is_safe);
    }

    #[test]
    fn serializes_with_camel_case_flags() {
        let json = serde_json::to_value(check_content("shit")).unwrap();
        assert_eq!(json["isSafe"], false);
        assert_eq!(json["category"], "profanity");
        let json = serde_json::to_value(check_content("hello")).unwrap();
        assert_eq!(json["isSafe"], true);
        assert!(json.get("category").is_none());
    }
}
