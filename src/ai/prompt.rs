//! Prompt shaping shared by the generators and the conversation controller.

use crate::core::model::Turn;

/// Prepend `preamble` as a user turn when `turns` is the first turn of a new
/// conversation. Longer histories are returned unchanged.
#[must_use]
pub fn with_preamble(turns: &[Turn], preamble: &str) -> Vec<Turn> {
    let mut out = Vec::with_capacity(turns.len() + 1);
    if turns.len() == 1 && !preamble.trim().is_empty() {
        out.push(Turn::user(preamble));
    }
    out.extend_from_slice(turns);
    out
}

/// Single-turn request asking for a short title of `text`.
#[must_use]
pub fn title_request(text: &str, words: usize) -> Vec<Turn> {
    vec![Turn::user(format!(
        "Summarize the following message in {words} words or less. Reply with the summary only.\n\n{text}"
    ))]
}

/// First `words` words of the model's answer, or `None` if it was blank.
#[must_use]
pub fn title_from_reply(reply: &str, words: usize) -> Option<String> {
    let title = reply
        .split_whitespace()
        .take(words)
        .collect::<Vec<_>>()
        .join(" ");
    let title = title.trim_matches(|c: char| c == '"' || c == '*').trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Role;

    #[test]
    fn test_preamble_only_for_single_turn() {
        let first = with_preamble(&[Turn::user("Hello")], "You are Pluxie.");
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].content, "You are Pluxie.");
        assert_eq!(first[0].role, Role::User);
        assert_eq!(first[1].content, "Hello");

        let history = [Turn::user("Hello"), Turn::model("Hi"), Turn::user("How?")];
        assert_eq!(with_preamble(&history, "You are Pluxie."), history.to_vec());
    }

    #[test]
    fn test_title_keeps_first_words() {
        assert_eq!(
            title_from_reply("\"Planning a trip to Lisbon in spring\"", 5).as_deref(),
            Some("Planning a trip to Lisbon")
        );
        assert_eq!(title_from_reply("   \n ", 5), None);
    }

    #[test]
    fn test_title_request_is_single_turn() {
        let turns = title_request("What is Rust?", 5);
        assert_eq!(turns.len(), 1);
        assert!(turns[0].content.contains("What is Rust?"));
    }
}
