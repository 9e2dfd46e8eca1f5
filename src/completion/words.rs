//! Character-indexed word boundaries within an input line.

/// Bounds `(start, end)` of the whitespace-delimited word around `cursor`.
///
/// Offsets count characters, not bytes. A cursor past the end is clamped.
pub fn word_bounds(line: &str, cursor: usize) -> (usize, usize) {
    let chars: Vec<char> = line.chars().collect();
    bounds_in(&chars, cursor)
}

pub(crate) fn bounds_in(chars: &[char], cursor: usize) -> (usize, usize) {
    let cursor = cursor.min(chars.len());
    let mut start = cursor;
    while start > 0 && !chars[start - 1].is_whitespace() {
        start -= 1;
    }
    let mut end = cursor;
    while end < chars.len() && !chars[end].is_whitespace() {
        end += 1;
    }
    (start, end)
}

/// Replace characters `start..end` of `line` with `suggestion`.
///
/// Returns the new line and the cursor position just after the inserted text.
pub fn apply_suggestion(line: &str, suggestion: &str, start: usize, end: usize) -> (String, usize) {
    let chars: Vec<char> = line.chars().collect();
    let end = end.min(chars.len());
    let start = start.min(end);
    let mut out: String = chars[..start].iter().collect();
    out.push_str(suggestion);
    out.extend(&chars[end..]);
    (out, start + suggestion.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_around_cursor() {
        assert_eq!(word_bounds("git checkout main", 6), (4, 12));
        assert_eq!(word_bounds("git checkout main", 4), (4, 12));
        assert_eq!(word_bounds("git ", 4), (4, 4));
        assert_eq!(word_bounds("", 0), (0, 0));
        assert_eq!(word_bounds("ls", 99), (0, 2));
    }

    #[test]
    fn bounds_count_characters() {
        // "é" is two bytes but one character.
        assert_eq!(word_bounds("cat é.txt", 9), (4, 9));
    }

    #[test]
    fn apply_then_rederive_is_stable() {
        let line = "git che";
        let (start, end) = word_bounds(line, 7);
        let (applied, cursor) = apply_suggestion(line, "checkout", start, end);
        assert_eq!(applied, "git checkout");
        assert_eq!(cursor, start + "checkout".chars().count());

        let (s2, e2) = word_bounds(&applied, cursor);
        assert_eq!(e2, cursor);
        let (again, cursor2) = apply_suggestion(&applied, "checkout", s2, e2);
        assert_eq!(again, applied);
        assert_eq!(cursor2, cursor);
    }

    #[test]
    fn apply_in_middle_keeps_tail() {
        let (out, cursor) = apply_suggestion("cd sr && ls", "src/", 3, 5);
        assert_eq!(out, "cd src/ && ls");
        assert_eq!(cursor, 7);
    }
}
