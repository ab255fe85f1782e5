//! Phrase-based triggers deciding whether a heard command belongs to a handler.
//!
//! A trigger holds alternative key phrases and one match style. Evaluation is
//! pure and runs for every (activity, command) pair on every poll.

use serde::{Deserialize, Serialize};

use crate::models::Activity;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum MatchStyle {
    /// Command text starts with the key phrase text.
    #[default]
    #[serde(alias = "StartsWith", alias = "starts_with")]
    StartsWith,
    /// Command text ends with the key phrase text.
    #[serde(alias = "EndsWith", alias = "ends_with")]
    EndsWith,
    /// Command contains every word of the key phrase, in any order.
    #[serde(alias = "AnyOrder", alias = "any_order")]
    AnyOrder,
}

/// A list of words that triggers a command.
///
/// Configured as a single string; words may be separated by whitespace or commas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct KeyPhrase {
    words: Vec<String>,
}

impl KeyPhrase {
    pub fn new(raw: &str) -> Self {
        let words = raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|word| !word.is_empty())
            .map(|word| word.to_lowercase())
            .collect();
        Self { words }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Space-joined phrase text.
    pub fn text(&self) -> String {
        self.words.join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl From<String> for KeyPhrase {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for KeyPhrase {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<KeyPhrase> for String {
    fn from(phrase: KeyPhrase) -> Self {
        phrase.text()
    }
}

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
    /// Text left after the matched phrase is stripped. Never computed for
    /// `AnyOrder`, and `None` when nothing remains.
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(default)]
    pub key_phrases: Vec<KeyPhrase>,
    #[serde(default)]
    pub match_style: MatchStyle,
}

impl Trigger {
    pub fn new<I, P>(key_phrases: I, match_style: MatchStyle) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPhrase>,
    {
        Self {
            key_phrases: key_phrases.into_iter().map(Into::into).collect(),
            match_style,
        }
    }

    /// Tests the activity command against each key phrase in order; the first
    /// phrase that matches wins.
    pub fn is_match(&self, activity: &Activity) -> Option<TriggerMatch> {
        let command = activity.command();
        if command.is_empty() {
            return None;
        }

        self.key_phrases
            .iter()
            .filter(|phrase| !phrase.is_empty())
            .find_map(|phrase| match self.match_style {
                MatchStyle::StartsWith => {
                    strip_prefix_ignore_case(command, &phrase.text()).map(residual)
                }
                MatchStyle::EndsWith => {
                    strip_suffix_ignore_case(command, &phrase.text()).map(residual)
                }
                MatchStyle::AnyOrder => {
                    let words = activity.command_words();
                    phrase
                        .words()
                        .iter()
                        .all(|word| words.contains(word))
                        .then_some(TriggerMatch { query: None })
                }
            })
    }
}

/// Returns what follows `prefix` in `text`; `prefix` must already be lowercase.
fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut expected = prefix.chars().peekable();
    for (idx, ch) in text.char_indices() {
        if expected.peek().is_none() {
            return Some(&text[idx..]);
        }
        for lower in ch.to_lowercase() {
            if expected.next() != Some(lower) {
                return None;
            }
        }
    }
    expected.peek().is_none().then_some("")
}

/// Returns what precedes `suffix` in `text`; `suffix` must already be lowercase.
fn strip_suffix_ignore_case<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let mut expected = suffix.chars().rev().peekable();
    for (idx, ch) in text.char_indices().rev() {
        if expected.peek().is_none() {
            return Some(&text[..idx + ch.len_utf8()]);
        }
        let lowered: Vec<char> = ch.to_lowercase().collect();
        for lower in lowered.into_iter().rev() {
            if expected.next() != Some(lower) {
                return None;
            }
        }
    }
    expected.peek().is_none().then_some("")
}

fn residual(rest: &str) -> TriggerMatch {
    let rest = rest.trim();
    TriggerMatch {
        query: (!rest.is_empty()).then(|| rest.to_string()),
    }
}
