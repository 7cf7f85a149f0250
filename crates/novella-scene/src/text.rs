//! Prose segmentation shared by scenes and validators
//!
//! Paragraphs, sentences, word tokens and quoted dialogue. The rules are
//! deliberately simple and deterministic; every validator sees the same
//! segmentation of the same text.

use once_cell::sync::Lazy;
use regex::Regex;

/// Blank line (possibly containing spaces) between paragraphs
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("Failed to compile paragraph break regex"));

/// A sentence: a run of text up to terminal punctuation plus any closing quotes
static SENTENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[^.!?…]+(?:[.!?…]+["'”’)\]]*|$)"#).expect("Failed to compile sentence regex")
});

/// A word token, apostrophes kept inside contractions
static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+(?:['’][\p{L}]+)*").expect("Failed to compile word regex"));

/// Straight or curly double-quoted span
static DIALOGUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"]*)"|“([^”]*)”"#).expect("Failed to compile dialogue regex")
});

/// Split text into trimmed, non-empty paragraphs.
///
/// Paragraphs are separated by blank lines. Text without any blank line but
/// with several lines treats every non-empty line as a paragraph.
#[must_use]
pub fn paragraphs(text: &str) -> Vec<&str> {
    let blocks: Vec<&str> = PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if blocks.len() == 1 && blocks[0].contains('\n') {
        return blocks[0]
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
    }
    blocks
}

/// Split text into trimmed sentences that contain at least one word
#[must_use]
pub fn sentences(text: &str) -> Vec<&str> {
    SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|s| WORD.is_match(s))
        .collect()
}

/// Lowercased word tokens, curly apostrophes normalized to `'`
#[must_use]
pub fn words(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase().replace('’', "'"))
        .collect()
}

/// Number of word tokens
#[inline]
#[must_use]
pub fn word_count(text: &str) -> usize {
    WORD.find_iter(text).count()
}

/// Contents of every quoted span, in order of appearance
#[must_use]
pub fn dialogue_lines(text: &str) -> Vec<&str> {
    DIALOGUE
        .captures_iter(text)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect()
}

/// The text with every quoted span replaced by a single space
#[must_use]
pub fn strip_dialogue(text: &str) -> String {
    DIALOGUE.replace_all(text, " ").into_owned()
}

/// Whether `phrase` occurs in `tokens` as a contiguous run of words.
///
/// `phrase` is tokenized with [`words`], so casing and punctuation are ignored.
#[must_use]
pub fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    position_of_phrase(tokens, phrase).is_some()
}

/// Word offset of the first occurrence of `phrase` in `tokens`
#[must_use]
pub fn position_of_phrase(tokens: &[String], phrase: &str) -> Option<usize> {
    let needle = words(phrase);
    if needle.is_empty() || needle.len() > tokens.len() {
        return None;
    }
    tokens.windows(needle.len()).position(|w| w == needle.as_slice())
}

/// Number of (possibly overlapping) occurrences of `phrase` in `tokens`
#[must_use]
pub fn count_phrase(tokens: &[String], phrase: &str) -> usize {
    let needle = words(phrase);
    if needle.is_empty() || needle.len() > tokens.len() {
        return 0;
    }
    tokens
        .windows(needle.len())
        .filter(|w| *w == needle.as_slice())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let text = "First line.\nStill first.\n\n  \nSecond.\n\nThird.";
        let paras = paragraphs(text);
        assert_eq!(paras.len(), 3);
        assert_eq!(paras[2], "Third.");
    }

    #[test]
    fn paragraphs_fall_back_to_lines() {
        let paras = paragraphs("One.\nTwo.\nThree.");
        assert_eq!(paras, vec!["One.", "Two.", "Three."]);
    }

    #[test]
    fn sentences_keep_closing_quotes() {
        let sents = sentences("She ran. \"Stop!\" he said. Why?");
        assert_eq!(sents, vec!["She ran.", "\"Stop!\"", "he said.", "Why?"]);
    }

    #[test]
    fn sentences_accept_unterminated_tail() {
        let sents = sentences("It was over. Or was it");
        assert_eq!(sents.len(), 2);
        assert_eq!(sents[1], "Or was it");
    }

    #[test]
    fn words_are_lowercased_with_contractions() {
        assert_eq!(words("I Don’t know."), vec!["i", "don't", "know"]);
        assert_eq!(word_count("I don't know."), 3);
    }

    #[test]
    fn dialogue_extraction_and_stripping() {
        let text = "He said, \"Run now.\" Then “wait,” she answered.";
        assert_eq!(dialogue_lines(text), vec!["Run now.", "wait,"]);
        let stripped = strip_dialogue(text);
        assert!(!stripped.contains("Run"));
        assert!(stripped.contains("she answered"));
    }

    #[test]
    fn phrase_matching_ignores_case_and_punctuation() {
        let tokens = words("Her heart Skipped a beat. Then her heart skipped a beat again.");
        assert!(contains_phrase(&tokens, "heart skipped a beat"));
        assert_eq!(count_phrase(&tokens, "Heart skipped a beat"), 2);
        assert_eq!(position_of_phrase(&tokens, "skipped"), Some(2));
        assert_eq!(count_phrase(&tokens, ""), 0);
    }
}
