// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of KVPool.
//
// KVPool is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// KVPool is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with KVPool. If not, see <https://www.gnu.org/licenses/>.

//! Redis-style glob matching for the in-memory store.
//!
//! Supports `*`, `?`, character classes (`[abc]`, `[^abc]`, `[a-z]`) and
//! backslash escapes, with the same semantics as `KEYS`/`SCAN MATCH`.

/// Whether `key` matches the glob `pattern`.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let (p, s) = (pattern.as_bytes(), key.as_bytes());
    let (mut pi, mut si) = (0usize, 0usize);
    // Position of the last `*` and the key offset it is currently absorbing up to.
    let mut star: Option<(usize, usize)> = None;

    while si < s.len() {
        let next = match p.get(pi) {
            Some(b'*') => {
                star = Some((pi, si));
                pi += 1;
                continue;
            }
            Some(b'?') => Some(pi + 1),
            Some(b'[') => match_class(p, pi, s[si]),
            Some(b'\\') if pi + 1 < p.len() => (p[pi + 1] == s[si]).then_some(pi + 2),
            Some(&c) => (c == s[si]).then_some(pi + 1),
            None => None,
        };

        match (next, star) {
            (Some(n), _) => {
                pi = n;
                si += 1;
            }
            (None, Some((star_pi, star_si))) => {
                pi = star_pi + 1;
                si = star_si + 1;
                star = Some((star_pi, star_si + 1));
            }
            (None, None) => return false,
        }
    }

    while p.get(pi) == Some(&b'*') {
        pi += 1;
    }
    pi == p.len()
}

/// Match `c` against the class starting at `p[start] == b'['`.
/// Returns the pattern index after the class when it matches.
fn match_class(p: &[u8], start: usize, c: u8) -> Option<usize> {
    let mut i = start + 1;
    let negate = p.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    let end = loop {
        match p.get(i) {
            // Unterminated class runs to the end of the pattern
            None => break i,
            Some(b']') => break i + 1,
            Some(b'\\') if i + 1 < p.len() => {
                matched |= p[i + 1] == c;
                i += 2;
            }
            Some(&lo)
                if p.get(i + 1) == Some(&b'-') && p.get(i + 2).is_some_and(|&hi| hi != b']') =>
            {
                let hi = p[i + 2];
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                matched |= (lo..=hi).contains(&c);
                i += 3;
            }
            Some(&literal) => {
                matched |= literal == c;
                i += 1;
            }
        }
    };

    (matched != negate).then_some(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_star() {
        assert!(glob_match("test:session:*", "test:session:1"));
        assert!(glob_match("test:session:*", "test:session:"));
        assert!(!glob_match("test:session:*", "other:key"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[test]
    fn test_question_mark() {
        assert!(glob_match("h?llo", "hello"));
        assert!(glob_match("h?llo", "hallo"));
        assert!(!glob_match("h?llo", "hllo"));
    }

    #[test]
    fn test_classes() {
        assert!(glob_match("h[ae]llo", "hello"));
        assert!(glob_match("h[ae]llo", "hallo"));
        assert!(!glob_match("h[ae]llo", "hillo"));
        assert!(glob_match("h[^e]llo", "hallo"));
        assert!(!glob_match("h[^e]llo", "hello"));
        assert!(glob_match("h[a-b]llo", "hbllo"));
        assert!(!glob_match("h[a-b]llo", "hcllo"));
        assert!(glob_match("h[z-a]llo", "hmllo"));
    }

    #[test]
    fn test_escapes_and_unterminated() {
        assert!(glob_match("a\\*b", "a*b"));
        assert!(!glob_match("a\\*b", "aXb"));
        assert!(glob_match("[\\]]", "]"));
    }

    #[test]
    fn test_unterminated_class_runs_to_end() {
        assert!(glob_match("a[b", "ab"));
        assert!(!glob_match("a[b", "a[b"));
        assert!(glob_match("a[bc", "ac"));
        assert!(!glob_match("a[bc", "ad"));
        assert!(glob_match("a[^b", "ax"));
        assert!(!glob_match("a[", "a"));
    }
}
