//   Copyright (c) 2024-2026 Anton Kundenko <singaraiona@gmail.com>
//   All rights reserved.
//
//   Permission is hereby granted, free of charge, to any person obtaining a copy
//   of this software and associated documentation files (the "Software"), to deal
//   in the Software without restriction, including without limitation the rights
//   to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//   copies of the Software, and to permit persons to whom the Software is
//   furnished to do so, subject to the following conditions:
//
//   The above copyright notice and this permission notice shall be included in all
//   copies or substantial portions of the Software.
//
//   THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//   IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//   FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//   AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//   LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//   OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//   SOFTWARE.

//! Scalar string kernels (spec.md §4.13): UPPER/LOWER/TRIM/STRLEN/SUBSTR/
//! REPLACE/CONCAT/LIKE/ILIKE. Operates on `&str`/`String`; the expression
//! VM wraps these per row.

pub fn upper(s: &str) -> String {
    s.to_uppercase()
}

pub fn lower(s: &str) -> String {
    s.to_lowercase()
}

pub fn trim(s: &str) -> &str {
    s.trim()
}

/// Counts Unicode scalar values, not bytes (spec.md's `STRLEN` is a
/// character count, matching the donor's UTF-8-aware length opcode).
pub fn strlen(s: &str) -> i64 {
    s.chars().count() as i64
}

/// `SUBSTR(s, start, len)`, 1-based start per SQL convention. A `start`
/// outside `[1, chars+1]` or a non-positive `len` yields an empty string
/// rather than panicking.
pub fn substr(s: &str, start: i64, len: i64) -> String {
    if len <= 0 {
        return String::new();
    }
    let chars: Vec<char> = s.chars().collect();
    let start0 = (start - 1).max(0) as usize;
    if start0 >= chars.len() {
        return String::new();
    }
    let end = (start0 + len as usize).min(chars.len());
    chars[start0..end].iter().collect()
}

pub fn replace(s: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return s.to_string();
    }
    s.replace(from, to)
}

/// `CONCAT(args...)`, at least 2 and at most spec.md's documented arg cap;
/// callers validate arity (see [`crate::expr`]) before calling this.
pub fn concat(parts: &[&str]) -> String {
    parts.concat()
}

/// `LIKE`/`ILIKE`: SQL wildcard match, `%` = any run of characters,
/// `_` = exactly one character. No escape-character support.
pub fn like_match(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let (t, p): (Vec<char>, Vec<char>) = if case_insensitive {
        (
            text.to_lowercase().chars().collect(),
            pattern.to_lowercase().chars().collect(),
        )
    } else {
        (text.chars().collect(), pattern.chars().collect())
    };
    like_match_chars(&t, &p)
}

fn like_match_chars(t: &[char], p: &[char]) -> bool {
    // Classic DP: dp[i][j] = does t[..i] match p[..j].
    let (tn, pn) = (t.len(), p.len());
    let mut dp = vec![vec![false; pn + 1]; tn + 1];
    dp[0][0] = true;
    for j in 1..=pn {
        if p[j - 1] == '%' {
            dp[0][j] = dp[0][j - 1];
        }
    }
    for i in 1..=tn {
        for j in 1..=pn {
            dp[i][j] = match p[j - 1] {
                '%' => dp[i - 1][j] || dp[i][j - 1],
                '_' => dp[i - 1][j - 1],
                c => c == t[i - 1] && dp[i - 1][j - 1],
            };
        }
    }
    dp[tn][pn]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substr_clamps_to_bounds() {
        assert_eq!(substr("hello world", 1, 5), "hello");
        assert_eq!(substr("hello", 3, 100), "llo");
        assert_eq!(substr("hello", 10, 5), "");
        assert_eq!(substr("hello", 1, 0), "");
    }

    #[test]
    fn strlen_counts_unicode_scalars() {
        assert_eq!(strlen("abc"), 3);
        assert_eq!(strlen("héllo"), 5);
    }

    #[test]
    fn like_supports_percent_and_underscore() {
        assert!(like_match("hello", "h_llo", false));
        assert!(like_match("hello world", "hello%", false));
        assert!(like_match("hello world", "%world", false));
        assert!(!like_match("hello", "h_llx", false));
        assert!(like_match("HELLO", "hello", true));
        assert!(!like_match("HELLO", "hello", false));
    }

    #[test]
    fn replace_substitutes_all_occurrences() {
        assert_eq!(replace("aXbXc", "X", "-"), "a-b-c");
        assert_eq!(replace("abc", "", "Z"), "abc");
    }
}
