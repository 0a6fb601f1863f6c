//! Code and name normalization.
//!
//! The portal embeds term codes inside course codes on some pages and
//! renders instructor names in two different orders depending on academic
//! level. Everything here is pure and total: any non-empty input produces a
//! deterministic value, empty input produces an empty string.

use std::sync::LazyLock;

use regex::Regex;

/// Trailing embedded term code: semester digit + 4-digit year.
static TERM_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-2]\d{4}$").unwrap());

/// Extract a trailing embedded term code from a composite string.
///
/// `"LLAW 11312018"` -> `Some("12018")`. Returns `None` when no plausible
/// 5-digit term code terminates the string.
pub fn extract_term_code(raw: &str) -> Option<String> {
    TERM_SUFFIX_RE.find(raw.trim()).map(|m| m.as_str().to_string())
}

/// Canonicalize a course code.
///
/// Splits the leading letter prefix from the numeric catalog part and strips
/// an embedded trailing term code, detected by a term-shaped 5-digit suffix
/// plus an implausibly long numeric part: a decimal fraction longer than 3
/// digits, or an undotted number longer than 4. Shorter variant suffixes
/// (".03") survive. Joint cross-listed codes containing `/` pass through
/// case-folded only.
///
/// Idempotent: a code that already fits the plausible shape is returned
/// unchanged (modulo case and whitespace).
pub fn normalize_course_code(raw: &str) -> String {
    let folded = collapse_whitespace(&raw.to_ascii_uppercase());
    if folded.is_empty() {
        return folded;
    }
    if folded.contains('/') {
        return folded;
    }

    // Split at the first digit: letter prefix (may contain spaces) + catalog part.
    let Some(digit_at) = folded.find(|c: char| c.is_ascii_digit()) else {
        return folded;
    };
    let (prefix, number) = folded.split_at(digit_at);
    let number = number.trim();

    // A term code only ever appends ASCII digits, so a regex match also
    // guarantees the 5-byte suffix slice lands on a char boundary.
    let has_term_suffix = TERM_SUFFIX_RE.is_match(number);
    let stripped = match number.rsplit_once('.') {
        Some((_, fraction)) => {
            if has_term_suffix && fraction.chars().count() > 3 && number.chars().count() > 5 {
                &number[..number.len() - 5]
            } else {
                number
            }
        }
        None => {
            if has_term_suffix && number.chars().count() > 4 {
                &number[..number.len() - 5]
            } else {
                number
            }
        }
    };

    collapse_whitespace(&format!("{prefix}{stripped}"))
}

/// Canonicalize an instructor name to `"SURNAME, Given names"`.
///
/// Already comma-formatted input passes through. Otherwise the rightmost
/// all-uppercase token of length >= 2 is taken as the surname (the length
/// bound distinguishes a surname from a single-letter middle initial) and
/// the remaining tokens keep their original order. Input with no such token
/// passes through unchanged.
pub fn normalize_instructor_name(raw: &str) -> String {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() || cleaned.contains(',') {
        return cleaned;
    }

    let tokens: Vec<&str> = cleaned.split(' ').collect();
    let surname_idx = tokens.iter().rposition(|t| is_surname_token(t));
    let Some(idx) = surname_idx else {
        return cleaned;
    };

    let given: Vec<&str> = tokens
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != idx)
        .map(|(_, t)| *t)
        .collect();

    if given.is_empty() {
        return tokens[idx].to_string();
    }
    format!("{}, {}", tokens[idx], given.join(" "))
}

/// An all-uppercase alphabetic token of length >= 2.
fn is_surname_token(token: &str) -> bool {
    let letters: Vec<char> = token.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase())
}

/// Collapse runs of whitespace into single spaces and trim.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- normalize_course_code ---

    #[test]
    fn test_course_code_strips_embedded_term() {
        assert_eq!(normalize_course_code("LLAW 11312018"), "LLAW 113");
    }

    #[test]
    fn test_course_code_strips_term_preserving_variant_suffix() {
        assert_eq!(normalize_course_code("MATH 31.212018"), "MATH 31.2");
    }

    #[test]
    fn test_course_code_plain_passthrough() {
        assert_eq!(normalize_course_code("LLAW 113"), "LLAW 113");
        assert_eq!(normalize_course_code("MATH 31.2"), "MATH 31.2");
        assert_eq!(normalize_course_code("PHYS 10.03"), "PHYS 10.03");
    }

    #[test]
    fn test_course_code_case_folds_and_collapses() {
        assert_eq!(normalize_course_code("  llaw   113 "), "LLAW 113");
    }

    #[test]
    fn test_course_code_cross_listed_passthrough() {
        assert_eq!(normalize_course_code("soc 101/psy 101"), "SOC 101/PSY 101");
    }

    #[test]
    fn test_course_code_empty() {
        assert_eq!(normalize_course_code(""), "");
        assert_eq!(normalize_course_code("   "), "");
    }

    #[test]
    fn test_course_code_no_digits() {
        assert_eq!(normalize_course_code("NSTP"), "NSTP");
    }

    #[test]
    fn test_course_code_non_ascii_passthrough() {
        // Garbage cell text must never panic, whatever bytes it carries.
        assert_eq!(normalize_course_code("X 1É2345"), "X 1É2345");
        assert_eq!(normalize_course_code("FRANÇAIS 101"), "FRANÇAIS 101");
    }

    #[test]
    fn test_course_code_long_number_without_term_suffix() {
        // Five trailing digits that cannot be a term code stay untouched.
        assert_eq!(normalize_course_code("ENGG 98765"), "ENGG 98765");
    }

    #[test]
    fn test_course_code_idempotent() {
        for raw in [
            "LLAW 11312018",
            "MATH 31.212018",
            "LLAW 113",
            "soc 101/psy 101",
            "NSTP",
            "PE 101.03",
            "X 1É2345",
            "",
        ] {
            let once = normalize_course_code(raw);
            assert_eq!(normalize_course_code(&once), once, "input: {raw:?}");
        }
    }

    // --- normalize_instructor_name ---

    #[test]
    fn test_instructor_reorders_trailing_surname() {
        assert_eq!(
            normalize_instructor_name("Juan Carlos SANTOS"),
            "SANTOS, Juan Carlos"
        );
    }

    #[test]
    fn test_instructor_comma_passthrough() {
        assert_eq!(normalize_instructor_name("SANTOS, Juan"), "SANTOS, Juan");
    }

    #[test]
    fn test_instructor_skips_single_letter_initials() {
        // "B." must not be mistaken for the surname.
        assert_eq!(
            normalize_instructor_name("Maria B. REYES"),
            "REYES, Maria B."
        );
    }

    #[test]
    fn test_instructor_surname_not_last_token() {
        // Rightmost uppercase token wins even with trailing mixed-case tokens.
        assert_eq!(
            normalize_instructor_name("Jose GARCIA Jr"),
            "GARCIA, Jose Jr"
        );
    }

    #[test]
    fn test_instructor_no_uppercase_token_passthrough() {
        assert_eq!(normalize_instructor_name("Juan Santos"), "Juan Santos");
    }

    #[test]
    fn test_instructor_empty() {
        assert_eq!(normalize_instructor_name(""), "");
        assert_eq!(normalize_instructor_name("  "), "");
    }

    #[test]
    fn test_instructor_idempotent() {
        for raw in ["Juan Carlos SANTOS", "SANTOS, Juan", "Juan Santos", ""] {
            let once = normalize_instructor_name(raw);
            assert_eq!(normalize_instructor_name(&once), once, "input: {raw:?}");
        }
    }

    // --- extract_term_code ---

    #[test]
    fn test_extract_term_code_trailing() {
        assert_eq!(extract_term_code("LLAW 11312018"), Some("12018".to_string()));
        assert_eq!(extract_term_code("02024"), Some("02024".to_string()));
    }

    #[test]
    fn test_extract_term_code_absent() {
        assert_eq!(extract_term_code("LLAW 113"), None);
        assert_eq!(extract_term_code(""), None);
    }
}
