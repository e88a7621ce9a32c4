//! Reassembly of truncated generation fragments.
//!
//! A continuation request is primed with a few lines from the end of the
//! previous fragment, and the model tends to re-emit the partial last line.
//! [`DropLastLine`] trims that line before each merge. The heuristic is kept
//! behind [`StitchPolicy`] so it can be replaced if a model behaves otherwise.

use std::fmt::Debug;

/// Strategy for joining fragments into one document.
pub trait StitchPolicy: Send + Sync + Debug {
    /// Joins the fragments, in order, into one document.
    fn stitch(&self, fragments: &[String]) -> String;
}

/// Drops the last line of the accumulated text before appending each
/// subsequent fragment. No separator is inserted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropLastLine;

impl StitchPolicy for DropLastLine {
    fn stitch(&self, fragments: &[String]) -> String {
        let Some((first, rest)) = fragments.split_first() else {
            return String::new();
        };

        let mut document = first.clone();
        for fragment in rest {
            // A document without a newline is kept whole.
            if let Some(idx) = document.rfind('\n') {
                document.truncate(idx);
            }
            document.push_str(fragment);
        }
        document
    }
}

/// Plain concatenation, for models that resume exactly where they stopped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Concatenate;

impl StitchPolicy for Concatenate {
    fn stitch(&self, fragments: &[String]) -> String {
        fragments.concat()
    }
}

/// Number of trailing lines considered when building a prefill.
const PREFILL_WINDOW: usize = 3;

/// Builds the prefill hint for a continuation request.
///
/// Splits `fragment` at its last three newlines into a window of up to four
/// parts: everything before, then the trailing lines. The first part (the
/// head) and the last part (the possibly cut-off final line) are dropped and
/// the middle parts are rejoined and trimmed, so `"a\nb\nc\nd\ne"` gives
/// `"c\nd"` and `"a\nb\nc"` gives `"b"`. Fragments with fewer than three
/// lines give an empty string.
#[must_use]
pub fn continuation_prefill(fragment: &str) -> String {
    // rsplitn yields the tail first: [last, middle.., head]
    let mut parts: Vec<&str> = fragment.rsplitn(PREFILL_WINDOW + 1, '\n').collect();
    parts.reverse();

    if parts.len() < 3 {
        return String::new();
    }
    parts[1..parts.len() - 1].join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_single_fragment_verbatim() {
        let fragments = frags(&["line one\nline two\n"]);
        assert_eq!(DropLastLine.stitch(&fragments), "line one\nline two\n");
    }

    #[test]
    fn test_two_fragments() {
        let fragments = frags(&["A\nB\nC", "X\nY"]);
        assert_eq!(DropLastLine.stitch(&fragments), "A\nBX\nY");
        assert_eq!(DropLastLine.stitch(&fragments), format!("{}{}", "A\nB", "X\nY"));
    }

    #[test]
    fn test_three_fragments() {
        let fragments = frags(&["A\nB\nC", "X\nY", "Z"]);
        // "A\nBX\nY" loses "\nY", then "Z" is appended.
        assert_eq!(DropLastLine.stitch(&fragments), "A\nBXZ");
    }

    #[test]
    fn test_fragment_without_newline_kept_whole() {
        let fragments = frags(&["abc", "def"]);
        assert_eq!(DropLastLine.stitch(&fragments), "abcdef");
    }

    #[test]
    fn test_trailing_newline_drops_empty_line() {
        let fragments = frags(&["A\nB\n", "C"]);
        assert_eq!(DropLastLine.stitch(&fragments), "A\nBC");
    }

    #[test]
    fn test_empty_fragments() {
        assert_eq!(DropLastLine.stitch(&[]), "");
    }

    #[test]
    fn test_concatenate_policy() {
        let fragments = frags(&["A\nB", "C"]);
        assert_eq!(Concatenate.stitch(&fragments), "A\nBC");
    }

    #[test]
    fn test_prefill_takes_middle_of_last_three_lines() {
        assert_eq!(continuation_prefill("a\nb\nc\nd\ne"), "c\nd");
        assert_eq!(continuation_prefill("a\nb\nc"), "b");
        assert_eq!(continuation_prefill("  x\n  int y = 0;  \n  z"), "int y = 0;");
    }

    #[test]
    fn test_prefill_short_fragments() {
        assert_eq!(continuation_prefill(""), "");
        assert_eq!(continuation_prefill("only"), "");
        assert_eq!(continuation_prefill("a\nb"), "");
    }
}
