/*
 * Multistore (C) 2024 - 2026 Multistore Contributors.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 */

//! Glob matching and path utilities (spec §4.2 `glob`, §4.7 utilities).
//!
//! Patterns use fnmatch-style semantics: `*` matches any run not
//! containing `/`, `?` matches one non-`/` character, and `**` matches
//! zero or more path segments (including the separators between them).

use regex::Regex;

use crate::error::GlobError;

/// Compiles a glob pattern into a regex that matches a full logical path.
///
/// A `**` path segment is translated with its neighboring `/` folded in —
/// not a bare `.*` substitution — so it matches *zero* or more whole
/// segments: `x/**/*.bin` must match `x/data-0.bin` (zero segments between
/// `x` and the filename) as well as `x/y/z/data-0.bin`. Treating `**` as a
/// plain `.*` would leave the separating `/` mandatory and break the
/// zero-segment case.
pub fn compile(pattern: &str) -> Result<Regex, GlobError> {
    let segments: Vec<&str> = pattern.split('/').collect();
    let mut regex_src = String::with_capacity(pattern.len() * 2 + 2);
    regex_src.push('^');

    // Whether the next literal segment needs an explicit `/` before it.
    // `**` segments fold the adjacent slash into their own (possibly
    // optional) group instead, so they manage this flag themselves.
    let mut pending_slash = false;
    let mut i = 0;
    while i < segments.len() {
        if segments[i] == "**" {
            let is_start = i == 0;
            let mut j = i + 1;
            while j < segments.len() && segments[j] == "**" {
                j += 1;
            }
            let is_end = j == segments.len();

            if is_start && is_end {
                // The whole pattern is `**` (or a run of them): match anything.
                regex_src.push_str(".*");
                pending_slash = false;
            } else if is_start {
                // `**/rest`: zero or more whole segments, each consuming its
                // own trailing `/`, before whatever follows.
                regex_src.push_str("(?:.*/)?");
                pending_slash = false;
            } else if is_end {
                // `rest/**`: zero or more whole segments, each consuming its
                // own leading `/`, after whatever precedes.
                regex_src.push_str("(?:/.*)?");
                pending_slash = false;
            } else {
                // `a/**/b`: zero or more whole segments between neighbors;
                // the mandatory `/` before `b` is still required.
                regex_src.push_str("(?:/.*)?");
                pending_slash = true;
            }
            i = j;
            continue;
        }

        if pending_slash {
            regex_src.push('/');
        }
        regex_src.push_str(&translate_segment(segments[i]));
        pending_slash = true;
        i += 1;
    }
    regex_src.push('$');

    Regex::new(&regex_src).map_err(|e| GlobError::InvalidPattern(pattern.to_string(), e.to_string()))
}

/// Translates one `/`-free path segment: `*` to any run not containing
/// `/`, `?` to one non-`/` character, a `**` substring (when not the
/// entire segment — that case is handled in [`compile`] for cross-segment
/// semantics) to `.*`, and everything else escaped as a regex literal.
fn translate_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() * 2);
    let chars: Vec<char> = segment.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                if i + 1 < chars.len() && chars[i + 1] == '*' {
                    out.push_str(".*");
                    i += 2;
                } else {
                    out.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c => {
                if regex_syntax_needs_escape(c) {
                    out.push('\\');
                }
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn regex_syntax_needs_escape(c: char) -> bool {
    matches!(
        c,
        '.' | '+' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '\\'
    )
}

/// Returns whether `path` matches `pattern` (fnmatch/`**` semantics above).
pub fn matches(pattern: &str, path: &str) -> Result<bool, GlobError> {
    Ok(compile(pattern)?.is_match(path))
}

/// Extracts the literal (non-wildcard) prefix of a glob pattern, splitting
/// on `/` and dropping any trailing partial segment that contains a
/// metacharacter (spec §4.7 `extract_prefix_from_glob`). Used to minimize
/// the listing a `glob` call has to perform.
pub fn extract_prefix_from_glob(pattern: &str) -> String {
    let meta_pos = pattern.find(|c| c == '*' || c == '?' || c == '[');
    let literal = match meta_pos {
        Some(pos) => &pattern[..pos],
        None => pattern,
    };
    match literal.rfind('/') {
        Some(slash) => literal[..=slash].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_does_not_cross_slash() {
        assert!(matches("a/*.bin", "a/data-0.bin").unwrap());
        assert!(!matches("a/*.bin", "a/b/data-0.bin").unwrap());
    }

    #[test]
    fn double_star_crosses_slashes() {
        assert!(matches("x/**/*.bin", "x/data-0.bin").unwrap());
        assert!(matches("x/**/*.bin", "x/y/z/data-0.bin").unwrap());
    }

    #[test]
    fn leading_and_trailing_double_star_allow_zero_segments() {
        assert!(matches("**/foo", "foo").unwrap());
        assert!(matches("**/foo", "bar/foo").unwrap());
        assert!(matches("foo/**", "foo").unwrap());
        assert!(matches("foo/**", "foo/bar/baz").unwrap());
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(matches("file?.txt", "file1.txt").unwrap());
        assert!(!matches("file?.txt", "file12.txt").unwrap());
    }

    #[test]
    fn extract_prefix_stops_before_metachar() {
        assert_eq!(extract_prefix_from_glob("x/y/*.bin"), "x/y/");
        assert_eq!(extract_prefix_from_glob("x/y/**/z"), "x/y/");
        assert_eq!(extract_prefix_from_glob("no/wildcards/here"), "no/wildcards/");
        assert_eq!(extract_prefix_from_glob("*"), "");
    }

    #[test]
    fn literal_dots_are_escaped() {
        assert!(matches("a.b.txt", "a.b.txt").unwrap());
        assert!(!matches("a.b.txt", "aXbXtxt").unwrap());
    }
}
