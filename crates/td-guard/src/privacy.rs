//! PII masking for log lines and audit records.
//!
//! Phone numbers, email addresses, and personal names are masked before any
//! string reaches a log sink. Masked output matches none of the detection
//! patterns, so every masking function is idempotent and safe to apply to
//! text that has already been partially masked.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// `NNN-NNNN-NNNN`-shaped phone numbers (two or three digit prefix).
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{2,3})-(\d{3,4})-(\d{4})\b").expect("phone pattern"));

/// Simplified email shape, tight enough to never match masked output.
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z0-9._%+-])([A-Za-z0-9._%+-]*)@([A-Za-z0-9])([A-Za-z0-9-]*)((?:\.[A-Za-z0-9-]+)+)")
        .expect("email pattern")
});

/// Mask the middle group of every phone number, preserving the first and
/// last groups: `010-1234-5678` becomes `010-****-5678`.
pub fn mask_phone(text: &str) -> String {
    PHONE_RE
        .replace_all(text, |caps: &Captures<'_>| {
            format!("{}-{}-{}", &caps[1], "*".repeat(caps[2].len()), &caps[3])
        })
        .into_owned()
}

/// Mask every email address, keeping the first character of the local part
/// and of the domain and preserving the top-level domain suffix:
/// `test.user@company.co.kr` becomes `t***@c***.co.kr`.
pub fn mask_email(text: &str) -> String {
    EMAIL_RE
        .replace_all(text, |caps: &Captures<'_>| {
            format!("{}***@{}***{}", &caps[1], &caps[3], &caps[5])
        })
        .into_owned()
}

/// Mask a personal name, independent of script.
///
/// One character stays as-is, two characters keep the first, three or more
/// keep the first and last with the interior starred out.
pub fn mask_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    match chars.len() {
        0 => String::new(),
        1 => name.to_owned(),
        2 => format!("{}*", chars[0]),
        n => {
            let mut out = String::with_capacity(name.len());
            out.push(chars[0]);
            out.extend(std::iter::repeat('*').take(n - 2));
            out.push(chars[n - 1]);
            out
        }
    }
}

fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// Apply [`mask_name`] to every maximal Hangul-syllable run of two to four
/// characters. Korean personal names are the PII population of TeamDesk's
/// records; longer runs are prose and single syllables carry nothing to
/// mask, so both pass through unchanged.
fn mask_hangul_names(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();

    let mut flush = |out: &mut String, run: &mut String| {
        if run.is_empty() {
            return;
        }
        let len = run.chars().count();
        if (2..=4).contains(&len) {
            out.push_str(&mask_name(run));
        } else {
            out.push_str(run);
        }
        run.clear();
    };

    for c in text.chars() {
        if is_hangul_syllable(c) {
            run.push(c);
        } else {
            flush(&mut out, &mut run);
            out.push(c);
        }
    }
    flush(&mut out, &mut run);
    out
}

/// Mask all recognized PII in a free-form message: phone numbers, then email
/// addresses, then names. Idempotent; applying it to already-masked text is
/// a no-op.
pub fn mask_log_message(text: &str) -> String {
    let masked = mask_phone(text);
    let masked = mask_email(&masked);
    mask_hangul_names(&masked)
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- phone --------------------------------------------------------------

    #[test]
    fn test_mask_phone_keeps_outer_groups() {
        assert_eq!(mask_phone("010-1234-5678"), "010-****-5678");
        assert_eq!(mask_phone("02-555-1234"), "02-***-1234");
    }

    #[test]
    fn test_mask_phone_in_free_text() {
        assert_eq!(
            mask_phone("on-call: 010-1234-5678 (primary)"),
            "on-call: 010-****-5678 (primary)"
        );
    }

    #[test]
    fn test_mask_phone_leaves_non_phones_alone() {
        assert_eq!(mask_phone("build 2026-01-15"), "build 2026-01-15");
        assert_eq!(mask_phone("no digits here"), "no digits here");
    }

    // -- email --------------------------------------------------------------

    #[test]
    fn test_mask_email_preserves_tld() {
        assert_eq!(mask_email("test.user@company.co.kr"), "t***@c***.co.kr");
        assert_eq!(mask_email("alice@example.com"), "a***@e***.com");
    }

    #[test]
    fn test_mask_email_in_free_text() {
        assert_eq!(
            mask_email("reported by dev.lead@teamdesk.io today"),
            "reported by d***@t***.io today"
        );
    }

    // -- name ---------------------------------------------------------------

    #[test]
    fn test_mask_name_by_length() {
        assert_eq!(mask_name(""), "");
        assert_eq!(mask_name("김"), "김");
        assert_eq!(mask_name("김수"), "김*");
        assert_eq!(mask_name("김철수"), "김*수");
        assert_eq!(mask_name("남궁민수"), "남**수");
        assert_eq!(mask_name("John"), "J**n");
    }

    // -- mask_log_message ---------------------------------------------------

    #[test]
    fn test_mask_log_message_applies_all_passes() {
        let masked = mask_log_message("김철수 (010-1234-5678, test.user@company.co.kr) logged in");
        assert_eq!(masked, "김*수 (010-****-5678, t***@c***.co.kr) logged in");
    }

    #[test]
    fn test_mask_log_message_is_idempotent() {
        let inputs = [
            "김철수 called 010-1234-5678",
            "contact test.user@company.co.kr",
            "already masked: 김*수 010-****-5678 t***@c***.co.kr",
            "plain ascii message",
            "홍길동",
        ];
        for input in inputs {
            let once = mask_log_message(input);
            let twice = mask_log_message(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_mask_log_message_leaves_long_hangul_prose() {
        // Five or more consecutive syllables are prose, not a name.
        let text = "출석기록변경완료 by admin";
        assert_eq!(mask_log_message(text), "출석기록변경완료 by admin");
    }

    #[test]
    fn test_mask_log_message_safe_on_partial_masking() {
        let partially = "김*수 reported 010-1234-5678";
        assert_eq!(mask_log_message(partially), "김*수 reported 010-****-5678");
    }
}
