//! Deterministic string normalization and n-gram tokenization.
//!
//! Used at both fuzzy-index build time and query time; the same
//! transliteration table and n-gram parameters must be used on both sides
//! or similarity scores become meaningless.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static NON_WORD_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_ ]").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

/// Unicode combining marks (diacriticals) stripped after NFKD decomposition.
fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// NFKD-decompose, drop combining marks, then transliterate whatever
/// non-ASCII remains (Cyrillic, Hebrew, CJK, ...) to ASCII.
fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

/// Display-normalized form: single interior spaces preserved.
pub fn normalize_display(text: &str) -> String {
    let ascii = fold_to_ascii(text);
    let stripped = NON_WORD_SPACE.replace_all(&ascii, "");
    MULTI_SPACE.replace_all(stripped.trim(), " ").to_string()
}

/// Token-key form: all spaces removed, used as the n-gram vectorizer input.
pub fn normalize_token_key(text: &str) -> String {
    normalize_display(text).replace(' ', "")
}

/// Extract character n-grams from the token-key form, padded with one
/// leading and one trailing space so edge characters appear in multiple
/// grams. `n` and the padding must match at build and query time.
pub fn ngrams(token_key: &str, n: usize) -> Vec<String> {
    let padded = format!(" {} ", token_key);
    let chars: Vec<char> = padded.chars().collect();
    if chars.len() < n {
        return Vec::new();
    }
    (0..=chars.len() - n)
        .map(|i| chars[i..i + n].iter().collect())
        .collect()
}

/// Normalize and n-gram a `(artist_name, recording_name)` pair the way the
/// fuzzy index does: token-key forms concatenated with no separator, then
/// 3-grammed.
pub fn ngrams_for_pair(artist_name: &str, recording_name: &str) -> Vec<String> {
    let key = format!(
        "{}{}",
        normalize_token_key(artist_name),
        normalize_token_key(recording_name)
    );
    ngrams(&key, 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_collapses_spaces() {
        assert_eq!(normalize_display("The  Song!! (Live)"), "the song live");
    }

    #[test]
    fn token_key_removes_all_spaces() {
        assert_eq!(normalize_token_key("Massive Attack"), "massiveattack");
    }

    #[test]
    fn transliterates_accents() {
        assert_eq!(normalize_display("Beyoncé"), "beyonce");
    }

    #[test]
    fn ngrams_are_padded() {
        let grams = ngrams("abc", 3);
        assert_eq!(grams, vec![" ab", "abc", "bc "]);
    }

    #[test]
    fn ngrams_short_input_yields_empty() {
        assert!(ngrams("a", 3).is_empty());
    }

    #[test]
    fn pair_ngrams_concatenate_without_separator() {
        let grams = ngrams_for_pair("AB", "CD");
        assert_eq!(grams, ngrams("abcd", 3));
    }
}
