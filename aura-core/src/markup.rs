//! Post-processing of model output.
//!
//! Reasoning models wrap their chain-of-thought in `<think>…</think>`
//! blocks, and the persona prompts ask for `[REACT: emoji]` tags at the end
//! of chat replies. Neither may ever reach the speech synthesizer, and the
//! reaction tag is lifted out of the displayed text.

use regex::Regex;
use std::sync::LazyLock;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

// A block the model never closed: drop everything from the opening tag on.
static THINK_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*\z").expect("valid regex"));

static REACT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[REACT:\s*([^\]\s]+)\s*\]").expect("valid regex"));

static ANGLE_MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static SPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));

/// Remove internal reasoning blocks, leaving only the spoken/displayed reply.
///
/// Text without any reasoning markup passes through unchanged.
pub fn strip_reasoning(text: &str) -> String {
    let stripped = THINK_BLOCK.replace_all(text, "");
    THINK_OPEN.replace(&stripped, "").trim().to_string()
}

/// Pull a trailing `[REACT: emoji]` tag out of a reply.
///
/// Returns the reply with the tag removed, and the emoji if one was present.
pub fn extract_reaction(text: &str) -> (String, Option<String>) {
    match REACT_TAG.captures(text) {
        Some(caps) => {
            let emoji = caps.get(1).map(|m| m.as_str().to_string());
            (REACT_TAG.replace(text, "").trim().to_string(), emoji)
        }
        None => (text.trim().to_string(), None),
    }
}

/// Produce the text handed to a speech synthesizer: reasoning blocks,
/// reaction tags and residual angle-bracket markup all removed.
pub fn strip_spoken_markup(text: &str) -> String {
    let text = strip_reasoning(text);
    let text = REACT_TAG.replace_all(&text, "");
    let text = ANGLE_MARKUP.replace_all(&text, "");
    SPACE_RUNS.replace_all(&text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_reasoning_removes_block() {
        let text = "<think>The user greeted me, keep it warm.</think>Hey! Good to hear you.";
        assert_eq!(strip_reasoning(text), "Hey! Good to hear you.");
    }

    #[test]
    fn test_strip_reasoning_passthrough() {
        let text = "Nothing hidden here.";
        assert_eq!(strip_reasoning(text), text);
    }

    #[test]
    fn test_strip_reasoning_multiline() {
        let text = "<think>line one\nline two\n</think>\nAnswer.";
        assert_eq!(strip_reasoning(text), "Answer.");
    }

    #[test]
    fn test_strip_reasoning_unclosed_block() {
        let text = "Sure thing. <think>wait, should I";
        assert_eq!(strip_reasoning(text), "Sure thing.");
    }

    #[test]
    fn test_extract_reaction() {
        let (reply, emoji) = extract_reaction("Good morning! [REACT: ☀️]");
        assert_eq!(reply, "Good morning!");
        assert_eq!(emoji.as_deref(), Some("☀️"));
    }

    #[test]
    fn test_extract_reaction_absent() {
        let (reply, emoji) = extract_reaction("Just text.");
        assert_eq!(reply, "Just text.");
        assert!(emoji.is_none());
    }

    #[test]
    fn test_spoken_markup_is_fully_clean() {
        let text = "<think>plan</think>Chalo, done! [REACT: ✅] <b>bold</b>";
        assert_eq!(strip_spoken_markup(text), "Chalo, done! bold");
    }
}
