//! Rule-based cleanup of recognizer output.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use super::corrections::{Confusion, CONFUSIONS, WORD_FIXES};

/// Upper bound on passes when iterating the pipeline to a fixpoint.
const MAX_PASSES: usize = 8;

static MERGED_WORDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([a-z])([A-Z])").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.!?;:])").unwrap());

/// Compiled word-fix patterns, in table order, flagged when the fix
/// collapses a repeated word.
static WORD_FIX_PATTERNS: LazyLock<Vec<(Regex, &'static str, bool)>> = LazyLock::new(|| {
    WORD_FIXES
        .iter()
        .map(|(key, target)| {
            let body = key
                .split(' ')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+");
            let pattern = format!(r"(?i)\b{}\b", body);
            let repeat = key.split(' ').count() > 1 && key.split(' ').all(|w| w == *target);
            (Regex::new(&pattern).unwrap(), *target, repeat)
        })
        .collect()
});

/// Clean up raw OCR text.
///
/// Splits merged words, fixes symbol confusions and common handwriting
/// slips, tidies whitespace and punctuation, capitalizes the first character
/// and terminates the sentence. The result is a fixpoint:
/// `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_PASSES {
        let next = normalize_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// One pass of the cleanup pipeline.
fn normalize_once(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let text = MERGED_WORDS.replace_all(text, "$1 $2");
    let text = apply_confusions(&text);
    let text = apply_word_fixes(&text);
    let text = tidy_spacing(&text);
    if text.is_empty() {
        return text;
    }

    let mut text = capitalize_first(&text);
    if !text.ends_with(['.', '!', '?']) {
        text.push('.');
    }
    text
}

fn apply_confusions(text: &str) -> String {
    let mut text = text.to_string();
    for rule in CONFUSIONS {
        text = match *rule {
            Confusion::Substring { from, to } => text.replace(from, to),
            Confusion::BetweenLetters { from, to } => replace_between_letters(&text, from, to),
            Confusion::CollapseRun(c) => collapse_runs(&text, c),
        };
    }
    text
}

/// Replace runs of `from` that are flanked by letters on both sides.
fn replace_between_letters(text: &str, from: char, to: char) -> String {
    if !text.contains(from) {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != from {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && chars[i] == from {
            i += 1;
        }
        let before = start.checked_sub(1).map(|j| chars[j]);
        let after = chars.get(i).copied();
        let inside = matches!(
            (before, after),
            (Some(b), Some(a)) if b.is_alphabetic() && a.is_alphabetic()
        );
        let replacement = if inside { to } else { from };
        out.extend(std::iter::repeat(replacement).take(i - start));
    }
    out
}

fn collapse_runs(text: &str, target: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev = None;
    for c in text.chars() {
        if c == target && prev == Some(target) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

fn apply_word_fixes(text: &str) -> String {
    let mut text = text.to_string();
    for (pattern, target, repeat) in WORD_FIX_PATTERNS.iter() {
        // matches don't overlap, so a run of repeats only halves per replace
        while pattern.is_match(&text) {
            text = pattern
                .replace_all(&text, |caps: &Captures| {
                    let matched = &caps[0];
                    if matched.starts_with(char::is_uppercase) {
                        capitalize_first(target)
                    } else {
                        (*target).to_string()
                    }
                })
                .into_owned();
            if !repeat {
                break;
            }
        }
    }
    text
}

fn tidy_spacing(text: &str) -> String {
    let text = WHITESPACE.replace_all(text, " ");
    let text = text.trim();
    SPACE_BEFORE_PUNCT.replace_all(text, "$1").into_owned()
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n\t "), "");
    }

    #[test]
    fn test_terminates_and_capitalizes() {
        assert_eq!(normalize("Hello World"), "Hello World.");
        assert_eq!(normalize("hello world"), "Hello world.");
        assert_eq!(normalize("is it done?"), "Is it done?");
    }

    #[test]
    fn test_splits_merged_words() {
        assert_eq!(normalize("keepThe balance"), "Keep The balance.");
    }

    #[test]
    fn test_symbol_confusions_inside_words() {
        assert_eq!(normalize("he||o there"), "Hello there.");
        assert_eq!(normalize("c0de and we1l"), "Code and well.");
        assert_eq!(normalize("th!s works"), "This works.");
    }

    #[test]
    fn test_symbols_outside_words_are_kept() {
        assert_eq!(normalize("wow!!!"), "Wow!!!");
        assert_eq!(normalize("room 101"), "Room 101.");
    }

    #[test]
    fn test_word_fixes() {
        assert_eq!(normalize("teh qick fox"), "The qick fox.");
        assert_eq!(normalize("we need balence"), "We need balance.");
        assert_eq!(normalize("i think adn then"), "I think and then.");
    }

    #[test]
    fn test_word_fixes_preserve_leading_capital() {
        assert_eq!(normalize("a Teh b"), "A The b.");
    }

    #[test]
    fn test_repeated_words_collapse() {
        assert_eq!(normalize("the the the cat"), "The cat.");
    }

    #[test]
    fn test_punctuation_spacing() {
        assert_eq!(normalize("well , that  is\n fine ."), "Well, that is fine.");
    }

    #[test]
    fn test_hello_keeps_double_l() {
        assert_eq!(normalize("hello"), "Hello.");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "Hello World",
            "teh qick fox",
            "keepThe ballance fer teh busines",
            "||||||||||",
            "wow!!!  ok",
            "ththe cat sat , on teh mat",
            "iiiii uuuu",
            "I'm fine thanks",
            "a!B!c",
            "x",
        ];
        for input in inputs {
            let once = normalize(input);
            let twice = normalize(&once);
            assert_eq!(once, twice, "normalize not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_long_repeated_run_collapses_in_one_call() {
        let input = format!("{}cat", "the ".repeat(600));
        let once = normalize(&input);
        assert_eq!(once, "The cat.");
        assert_eq!(normalize(&once), once);

        let input = format!("we went {}home", "to ".repeat(301));
        assert_eq!(normalize(&input), "We went to home.");
    }
}
