use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::normalize_command;

const REASON_PLACEHOLDER: &str = "[reason]";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ResponseType {
    /// Spoken through the text-to-speech engine.
    #[default]
    #[serde(alias = "TTS", alias = "Tts")]
    Tts,
    /// Played from a sound file; the text is spoken if playback fails.
    #[serde(alias = "WAV", alias = "Wav")]
    Wav,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMessage {
    #[serde(rename = "type", default)]
    pub kind: ResponseType,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<PathBuf>,
}

impl ResponseMessage {
    pub fn tts(value: &str) -> Self {
        Self {
            kind: ResponseType::Tts,
            value: normalize_command(value),
            file_name: None,
        }
    }

    pub fn wav(file_name: impl Into<PathBuf>, fallback: &str) -> Self {
        Self {
            kind: ResponseType::Wav,
            value: normalize_command(fallback),
            file_name: Some(file_name.into()),
        }
    }

    /// Response text with any `[reason]` placeholder replaced, case-insensitively.
    ///
    /// The placeholder is left untouched when there is no reason to report.
    pub fn render(&self, failure_reason: Option<&str>) -> String {
        let text = normalize_command(&self.value);
        match failure_reason.map(str::trim).filter(|reason| !reason.is_empty()) {
            Some(reason) => replace_ignore_case(&text, REASON_PLACEHOLDER, reason),
            None => text,
        }
    }

    pub(crate) fn resolve_paths(&mut self, base_dir: &Path) {
        if let Some(file_name) = self.file_name.as_mut() {
            if file_name.is_relative() {
                *file_name = base_dir.join(&*file_name);
            }
        }
    }
}

/// Responses returned when a command succeeds or fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(default)]
    pub succeeded: Option<ResponseMessage>,
    #[serde(default)]
    pub failed: Option<ResponseMessage>,
}

fn replace_ignore_case(haystack: &str, needle: &str, replacement: &str) -> String {
    let lowered = haystack.to_ascii_lowercase();
    let mut output = String::with_capacity(haystack.len());
    let mut cursor = 0;
    while let Some(offset) = lowered[cursor..].find(needle) {
        let start = cursor + offset;
        output.push_str(&haystack[cursor..start]);
        output.push_str(replacement);
        cursor = start + needle.len();
    }
    output.push_str(&haystack[cursor..]);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_placeholder_is_replaced_case_insensitively() {
        let message = ResponseMessage::tts("Could not arm: [Reason]. Sorry, [REASON]");
        assert_eq!(
            message.render(Some("door open")),
            "Could not arm: door open. Sorry, door open"
        );
    }

    #[test]
    fn placeholder_kept_without_reason() {
        let message = ResponseMessage::tts("failed because [reason]");
        assert_eq!(message.render(None), "failed because [reason]");
        assert_eq!(message.render(Some("  ")), "failed because [reason]");
    }

    #[test]
    fn render_normalizes_whitespace() {
        let message = ResponseMessage {
            kind: ResponseType::Tts,
            value: "  all   done \n".into(),
            file_name: None,
        };
        assert_eq!(message.render(None), "all done");
    }

    #[test]
    fn relative_sound_files_resolve_against_base() {
        let mut message = ResponseMessage::wav("chime.wav", "done");
        message.resolve_paths(Path::new("/etc/echodo"));
        assert_eq!(message.file_name, Some(PathBuf::from("/etc/echodo/chime.wav")));
    }

    #[test]
    fn response_type_accepts_legacy_spellings() {
        let message: ResponseMessage =
            serde_json::from_str(r#"{"type":"WAV","fileName":"a.wav","value":"x"}"#).unwrap();
        assert_eq!(message.kind, ResponseType::Wav);
    }
}
