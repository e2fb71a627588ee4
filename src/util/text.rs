use std::borrow::Cow;

/// Truncates a string to at most `max_chars` characters.
///
/// Cuts on character boundaries, so multi-byte text never splits mid-codepoint.
/// Returns `Cow::Borrowed` when the string already fits.
///
/// # Examples
///
/// ```
/// use infovore::util::truncate_chars;
///
/// assert_eq!(truncate_chars("short", 10), "short");
/// assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(s[..cut].to_string()),
        None => Cow::Borrowed(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fits_is_borrowed() {
        assert!(matches!(truncate_chars("abc", 3), Cow::Borrowed("abc")));
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
        assert_eq!(truncate_chars("abcdef", 0), "");
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_limit(s in ".{0,400}", max in 0usize..300) {
            let out = truncate_chars(&s, max);
            prop_assert!(out.chars().count() <= max);
            prop_assert!(s.starts_with(out.as_ref()));
        }
    }
}
