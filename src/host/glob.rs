//! Redis-style glob matching for the embedded host's `KEYS`.
//!
//! - `*` matches any run of bytes, including none
//! - `?` matches exactly one byte
//! - `[abc]`, `[^abc]`, `[a-z]` match one byte from (or not from) a set
//! - `\x` matches `x` literally, inside or outside a set
//!
//! Matching is on raw bytes, so binary keys are matched like any other.

/// Returns true if `key` matches `pattern` in full.
///
/// Runs in `O(pattern.len() * key.len())`: only the most recent star is a
/// backtrack point, since every other token consumes exactly one byte.
pub fn matches(pattern: &[u8], key: &[u8]) -> bool {
    let (mut p, mut k) = (0, 0);
    // Pattern position after the last star, and the key position it resumes at.
    let mut resume: Option<(usize, usize)> = None;

    while k < key.len() {
        if pattern.get(p) == Some(&b'*') {
            p += trim_leading_stars(&pattern[p..]);
            if p == pattern.len() {
                return true;
            }
            resume = Some((p, k));
            continue;
        }

        if let Some(width) = match_one(&pattern[p..], key[k]) {
            p += width;
            k += 1;
            continue;
        }

        match resume {
            Some((star_p, star_k)) => {
                resume = Some((star_p, star_k + 1));
                p = star_p;
                k = star_k + 1;
            }
            None => return false,
        }
    }

    p + trim_leading_stars(&pattern[p..]) == pattern.len()
}

/// Matches the token at the front of `pattern` against one byte, returning
/// the token's width on success.
fn match_one(pattern: &[u8], byte: u8) -> Option<usize> {
    match *pattern.first()? {
        b'?' => Some(1),
        b'[' => match parse_class(&pattern[1..]) {
            Some((class, rest)) => class.contains(byte).then(|| pattern.len() - rest.len()),
            // An unterminated class is matched literally, as Redis does.
            None => (byte == b'[').then_some(1),
        },
        b'\\' if pattern.len() > 1 => (pattern[1] == byte).then_some(2),
        literal => (literal == byte).then_some(1),
    }
}

/// Number of consecutive stars at the front of `pattern`.
fn trim_leading_stars(pattern: &[u8]) -> usize {
    pattern.iter().take_while(|&&b| b == b'*').count()
}

/// A bracket expression, borrowed from the pattern.
struct Class<'p> {
    negated: bool,
    body: &'p [u8],
}

impl Class<'_> {
    fn contains(&self, byte: u8) -> bool {
        let mut found = false;
        let body = self.body;
        let mut i = 0;
        while i < body.len() {
            if body[i] == b'\\' && i + 1 < body.len() {
                found |= body[i + 1] == byte;
                i += 2;
            } else if i + 2 < body.len() && body[i + 1] == b'-' {
                let (lo, hi) = if body[i] <= body[i + 2] {
                    (body[i], body[i + 2])
                } else {
                    (body[i + 2], body[i])
                };
                found |= (lo..=hi).contains(&byte);
                i += 3;
            } else {
                found |= body[i] == byte;
                i += 1;
            }
        }
        found != self.negated
    }
}

/// Splits `[...]` (without the opening bracket) into the class and the rest
/// of the pattern. Returns `None` when the closing bracket is missing.
fn parse_class(after_bracket: &[u8]) -> Option<(Class<'_>, &[u8])> {
    let negated = after_bracket.first() == Some(&b'^');
    let start = usize::from(negated);

    let mut i = start;
    while i < after_bracket.len() {
        match after_bracket[i] {
            b'\\' => i += 2,
            b']' => {
                let class = Class {
                    negated,
                    body: &after_bracket[start..i],
                };
                return Some((class, &after_bracket[i + 1..]));
            }
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::matches;
    use std::time::{Duration, Instant};

    fn m(pattern: &str, key: &str) -> bool {
        matches(pattern.as_bytes(), key.as_bytes())
    }

    #[test]
    fn test_star() {
        assert!(m("*", ""));
        assert!(m("*", "anything"));
        assert!(m("key:for:delete:*", "key:for:delete:1"));
        assert!(m("key:for:delete:*", "key:for:delete:"));
        assert!(!m("key:for:delete:*", "key:for:set:1"));
        assert!(m("a*b*c", "aXXbYYc"));
        assert!(!m("a*b*c", "aXXbYY"));
        assert!(m("a**", "abc"));
    }

    #[test]
    fn test_question_mark() {
        assert!(m("h?llo", "hello"));
        assert!(m("h?llo", "hallo"));
        assert!(!m("h?llo", "hllo"));
    }

    #[test]
    fn test_classes() {
        assert!(m("h[ae]llo", "hello"));
        assert!(!m("h[ae]llo", "hillo"));
        assert!(m("h[^e]llo", "hallo"));
        assert!(!m("h[^e]llo", "hello"));
        assert!(m("key:[0-9]", "key:7"));
        assert!(!m("key:[0-9]", "key:x"));
        assert!(m("key:[9-0]", "key:3"));
        assert!(m("[\\]]", "]"));
    }

    #[test]
    fn test_escapes_and_literals() {
        assert!(m("literal\\*", "literal*"));
        assert!(!m("literal\\*", "literalX"));
        assert!(m("exact", "exact"));
        assert!(!m("exact", "exactly"));
        assert!(m("[unterminated", "[unterminated"));
    }

    #[test]
    fn test_many_stars_with_a_failing_tail_stay_fast() {
        let started = Instant::now();
        assert!(!matches(b"*a*a*a*a*a*a*a*a*a*b", &[b'a'; 40]));
        assert!(!matches(b"*a*a*a*a*a*a*a*a*a*a*a*a*b", &[b'a'; 10_000]));
        assert!(matches(b"*a*a*a*a*a*a*a*a*a*b", b"aaaaaaaaaaaaaaaaaaaab"));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_backtracking_past_classes_and_escapes() {
        assert!(m("*[0-9]x", "12a3x"));
        assert!(!m("*[0-9]x", "12a3y"));
        assert!(m("*\\*end", "a*b*end"));
        assert!(m("a*?c", "abbc"));
        assert!(!m("a*?c", "ac"));
        assert!(m("*:*", "user:1"));
        assert!(!m("*:*", "user1"));
    }

    #[test]
    fn test_binary_keys() {
        assert!(matches(b"bin:*", b"bin:\xff\x00"));
        assert!(matches(b"bin:?\x00", b"bin:\xff\x00"));
    }
}
