use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// Identity-preserving normalization for fingerprints. Order matters:
// dates before times, long identifiers before bare numbers.
static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}|\b\d{1,2}/\d{1,2}/\d{2,4}\b").unwrap()
});

static RE_TIME: Lazy<Regex> = Lazy::new(|| {
    // No leading \b so the `T10:11:12` tail of an ISO timestamp still matches.
    Regex::new(r"\d{1,2}:\d{2}(?::\d{2})?(?:[.,]\d{1,9})?(?:Z|[+-]\d{2}:?\d{2})?").unwrap()
});

static RE_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b").unwrap()
});

static RE_HEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:0[xX])?[0-9a-fA-F]{8,}\b").unwrap()
});

static RE_ALNUM_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9_-]{12,}\b").unwrap()
});

static RE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+(?:[.,]\d+)*").unwrap()
});

// Coarser shape tokens, used only by the pattern learner.
static RE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b[a-zA-Z][a-zA-Z0-9+.-]*://[^\s"']+"#).unwrap()
});

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

static RE_IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(?::\d{1,5})?\b").unwrap()
});

static RE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?x)
        (?:
            (?:^|\s)/[\w.\-]+(?:/[\w.\-]+)+
          | \./[\w.\-]+(?:/[\w.\-]+)*
          | ~/[\w.\-]+(?:/[\w.\-]+)*
          | \b[A-Za-z]:\\[\w.\-\\]+
        )
    ").unwrap()
});

static RE_QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""[^"]*"|'[^']*'"#).unwrap()
});

const SHAPE_TOKENS: usize = 12;

fn has_digit(s: &str) -> bool {
    s.bytes().any(|b| b.is_ascii_digit())
}

fn has_alpha(s: &str) -> bool {
    s.bytes().any(|b| b.is_ascii_alphabetic())
}

/// Replaces dynamic literals with stable tokens so that two occurrences of
/// the same error with different ids, counts or timestamps normalize alike.
pub fn normalize_message(input: &str) -> String {
    let s = RE_UUID.replace_all(input, "ID");
    let s = RE_DATE.replace_all(&s, "DATE");
    let s = RE_TIME.replace_all(&s, "TIME");
    let s = RE_HEX.replace_all(&s, |c: &Captures| {
        let m = &c[0];
        if has_digit(m) { "ID".to_string() } else { m.to_string() }
    });
    let s = RE_ALNUM_ID.replace_all(&s, |c: &Captures| {
        let m = &c[0];
        if has_digit(m) && has_alpha(m) { "ID".to_string() } else { m.to_string() }
    });
    let s = RE_NUMBER.replace_all(&s, "NUMBER");
    s.trim().to_string()
}

/// Coarse message shape: literals masked, lowercased, whitespace collapsed,
/// first few tokens kept.
pub fn message_shape(input: &str) -> String {
    let s = RE_URL.replace_all(input, " URL ");
    let s = RE_EMAIL.replace_all(&s, " EMAIL ");
    let s = RE_IPV4.replace_all(&s, " IP ");
    let s = RE_PATH.replace_all(&s, " PATH ");
    let s = RE_QUOTED.replace_all(&s, " STR ");
    let s = normalize_message(&s).to_lowercase();
    s.split_whitespace().take(SHAPE_TOKENS).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_alpha_hex_words_survive() {
        assert_eq!(normalize_message("deadbeefcafe failed"), "deadbeefcafe failed");
        assert_eq!(normalize_message("token deadbeef01 failed"), "token ID failed");
    }

    #[test]
    fn long_identifier_needs_a_letter_and_digit() {
        assert_eq!(normalize_message("order ORD2024XYZ991 rejected"), "order ID rejected");
        assert_eq!(normalize_message("ConnectionPoolManager down"), "ConnectionPoolManager down");
    }
}
