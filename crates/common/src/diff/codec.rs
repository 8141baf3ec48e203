// Patch text format.
//
//   patch := hunk*
//   hunk  := "@@ -" range " +" range " @@\n" line*
//   range := start "," len | start
//   line  := (" " | "-" | "+") escaped "\n"
//
// `start` is 1-based unless `len` is 0, in which case it is the offset the
// empty range sits at. A bare `start` means a length of one.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;

use super::myers::EditOp;
use super::patch::{Hunk, Patch};

/// Bytes left unescaped in patch bodies.
const PATCH_TEXT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b'-')
    .remove(b'.')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'?')
    .remove(b'@')
    .remove(b'_')
    .remove(b'~')
    .remove(b' ');

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchParseError {
    #[error("line {line}: expected a hunk header, found {found:?}")]
    MissingHeader { line: usize, found: String },

    #[error("line {line}: malformed hunk header {header:?}")]
    InvalidHeader { line: usize, header: String },

    #[error("line {line}: unknown operation {sign:?}")]
    InvalidOperation { line: usize, sign: char },

    #[error("line {line}: invalid escape sequence")]
    InvalidEscape { line: usize },

    #[error("hunk at line {line}: header lengths do not match its body")]
    LengthMismatch { line: usize },
}

impl Patch {
    /// Serializes the patch in the hunk text format.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    pub fn from_text(text: &str) -> Result<Self, PatchParseError> {
        text.parse()
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for hunk in &self.hunks {
            write!(f, "{hunk}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "@@ -{} +{} @@",
            format_range(self.source_start, self.source_len),
            format_range(self.target_start, self.target_len)
        )?;
        for op in &self.ops {
            let sign = match op {
                EditOp::Equal(_) => ' ',
                EditOp::Delete(_) => '-',
                EditOp::Insert(_) => '+',
            };
            writeln!(f, "{sign}{}", utf8_percent_encode(op.text(), PATCH_TEXT))?;
        }
        Ok(())
    }
}

fn format_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{len}", start + 1),
    }
}

impl FromStr for Patch {
    type Err = PatchParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut hunks: Vec<Hunk> = Vec::new();
        let mut header_line = 0usize;

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            if line.is_empty() {
                continue;
            }

            if line.starts_with("@@") {
                if let Some(previous) = hunks.last() {
                    check_lengths(previous, header_line)?;
                }
                hunks.push(parse_header(line, line_no)?);
                header_line = line_no;
                continue;
            }

            let Some(hunk) = hunks.last_mut() else {
                return Err(PatchParseError::MissingHeader {
                    line: line_no,
                    found: line.to_owned(),
                });
            };

            let mut chars = line.chars();
            let sign = chars.next().unwrap_or(' ');
            let body = percent_decode_str(chars.as_str())
                .decode_utf8()
                .map_err(|_| PatchParseError::InvalidEscape { line: line_no })?
                .into_owned();

            let op = match sign {
                ' ' => EditOp::Equal(body),
                '-' => EditOp::Delete(body),
                '+' => EditOp::Insert(body),
                other => {
                    return Err(PatchParseError::InvalidOperation {
                        line: line_no,
                        sign: other,
                    })
                }
            };
            hunk.ops.push(op);
        }

        if let Some(last) = hunks.last() {
            check_lengths(last, header_line)?;
        }

        Ok(Self { hunks })
    }
}

fn parse_header(line: &str, line_no: usize) -> Result<Hunk, PatchParseError> {
    let invalid = || PatchParseError::InvalidHeader {
        line: line_no,
        header: line.to_owned(),
    };

    let inner = line
        .strip_prefix("@@ -")
        .and_then(|rest| rest.strip_suffix(" @@"))
        .ok_or_else(invalid)?;
    let (source, target) = inner.split_once(" +").ok_or_else(invalid)?;
    let (source_start, source_len) = parse_range(source).ok_or_else(invalid)?;
    let (target_start, target_len) = parse_range(target).ok_or_else(invalid)?;

    Ok(Hunk {
        source_start,
        target_start,
        source_len,
        target_len,
        ops: Vec::new(),
    })
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        None => {
            let start: usize = range.parse().ok()?;
            Some((start.checked_sub(1)?, 1))
        }
        Some((start, len)) => {
            let start: usize = start.parse().ok()?;
            let len: usize = len.parse().ok()?;
            if len == 0 {
                Some((start, 0))
            } else {
                Some((start.checked_sub(1)?, len))
            }
        }
    }
}

fn check_lengths(hunk: &Hunk, line: usize) -> Result<(), PatchParseError> {
    let source_len = hunk.source_text().chars().count();
    let target_len = hunk.target_text().chars().count();
    if source_len == hunk.source_len && target_len == hunk.target_len {
        Ok(())
    } else {
        Err(PatchParseError::LengthMismatch { line })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::patch::diff;

    #[test]
    fn serializes_header_ranges() {
        assert_eq!(format_range(0, 0), "0,0");
        assert_eq!(format_range(4, 1), "5");
        assert_eq!(format_range(4, 9), "5,9");
    }

    #[test]
    fn serializes_known_patch() {
        let patch = diff("hello", "hello world");
        assert_eq!(patch.to_text(), "@@ -1,5 +1,11 @@\n hello\n+ world\n");
    }

    #[test]
    fn escapes_newlines_and_percent() {
        let patch = diff("a\nb", "a\n100%\nb");
        let text = patch.to_text();
        assert!(text.contains("%0A"));
        assert!(text.contains("100%25"));
        assert_eq!(text.lines().filter(|line| line.starts_with("@@")).count(), 1);
    }

    #[test]
    fn parses_what_it_serializes() {
        let source = "The quick brown fox\njumps over\nthe lazy dog.\n";
        let target = "The quick red fox\njumps over\nthe lazy dog!\nThe end.\n";
        let patch = diff(source, target);
        let parsed: Patch = patch.to_text().parse().expect("patch should parse");
        assert_eq!(parsed, patch);
        let (applied, clean) = parsed.apply(source);
        assert!(clean);
        assert_eq!(applied, target);
    }

    #[test]
    fn empty_text_is_empty_patch() {
        assert_eq!(Patch::from_text("").expect("empty patch"), Patch::default());
        assert_eq!(Patch::default().to_text(), "");
    }

    #[test]
    fn rejects_body_without_header() {
        let err = Patch::from_text(" context\n").expect_err("should fail");
        assert!(matches!(err, PatchParseError::MissingHeader { line: 1, .. }));
    }

    #[test]
    fn rejects_malformed_header() {
        let err = Patch::from_text("@@ -x,1 +1 @@\n").expect_err("should fail");
        assert!(matches!(err, PatchParseError::InvalidHeader { line: 1, .. }));
    }

    #[test]
    fn rejects_unknown_operation() {
        let err = Patch::from_text("@@ -1 +1 @@\n*a\n").expect_err("should fail");
        assert_eq!(err, PatchParseError::InvalidOperation { line: 2, sign: '*' });
    }

    #[test]
    fn rejects_invalid_utf8_escape() {
        let err = Patch::from_text("@@ -1 +1 @@\n %FF\n").expect_err("should fail");
        assert_eq!(err, PatchParseError::InvalidEscape { line: 2 });
    }

    #[test]
    fn rejects_lengths_that_disagree_with_body() {
        let err = Patch::from_text("@@ -1,3 +1,3 @@\n ab\n").expect_err("should fail");
        assert_eq!(err, PatchParseError::LengthMismatch { line: 1 });
    }
}
