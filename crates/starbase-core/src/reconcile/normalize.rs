//! Name folding used by the matching tiers.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Replace accented letters with their unaccented base, keeping case.
///
/// "René" becomes "Rene"; characters without a decomposition pass through.
#[must_use]
pub fn strip_accents(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Comparison form of a name: accents stripped, lowercased, trimmed, and
/// internal whitespace collapsed to single spaces.
#[must_use]
pub fn fold(s: &str) -> String {
    let stripped = strip_accents(s).to_lowercase();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a display name at the first run of whitespace.
///
/// The remainder, however many words, is the last name. A single word
/// yields an empty last name.
#[must_use]
pub fn split_person_name(name: &str) -> (String, String) {
    let trimmed = name.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (trimmed.to_string(), String::new()),
    }
}

/// Word tokens of an already folded name.
pub fn words(folded: &str) -> impl Iterator<Item = &str> {
    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

/// True when the words of `needle` appear as a contiguous run of whole
/// words in `haystack`. Both arguments must already be folded.
#[must_use]
pub fn contains_words(haystack: &str, needle: &str) -> bool {
    let hay: Vec<&str> = words(haystack).collect();
    let pin: Vec<&str> = words(needle).collect();
    if pin.is_empty() || pin.len() > hay.len() {
        return false;
    }
    hay.windows(pin.len()).any(|window| window == pin.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_accents() {
        assert_eq!(strip_accents("René Auberjonois"), "Rene Auberjonois");
        assert_eq!(strip_accents("Zoë Saldaña"), "Zoe Saldana");
        assert_eq!(strip_accents("Worf"), "Worf");
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold("  René   AUBERJONOIS "), "rene auberjonois");
        assert_eq!(fold(""), "");
    }

    #[test]
    fn test_split_person_name() {
        assert_eq!(
            split_person_name("LeVar Burton"),
            ("LeVar".to_string(), "Burton".to_string())
        );
        assert_eq!(
            split_person_name(" Sir  Patrick Stewart"),
            ("Sir".to_string(), "Patrick Stewart".to_string())
        );
        assert_eq!(split_person_name("Q"), ("Q".to_string(), String::new()));
    }

    #[test]
    fn test_contains_words() {
        assert!(contains_words("nyota uhura", "uhura"));
        assert!(contains_words("jean-luc picard", "picard"));
        assert!(!contains_words("data", "dat"));
        assert!(!contains_words("odo", "odo's bucket"));
        assert!(!contains_words("worf", ""));
    }
}
