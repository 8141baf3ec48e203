// Context-anchored patches: hunk construction and fuzzy application.

use super::myers::{diff_chars, map_index, EditOp};

/// Characters of context kept on each side of a change.
pub const PATCH_MARGIN: usize = 4;
/// Upper bound on a hunk's source pattern while growing context for uniqueness.
pub const MAX_PATTERN_CHARS: usize = 32;
/// How far from its expected location a hunk may be re-anchored.
pub const MATCH_DISTANCE: usize = 64;
/// Largest tolerated share of mismatching characters in a fuzzy anchor.
pub const MATCH_THRESHOLD: f64 = 0.5;

/// A contiguous change with its surrounding context.
///
/// Offsets are character offsets into the text the hunk applies to, assuming
/// every earlier hunk of the same patch has already been applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hunk {
    pub source_start: usize,
    pub target_start: usize,
    pub source_len: usize,
    pub target_len: usize,
    pub ops: Vec<EditOp>,
}

impl Hunk {
    /// Text the hunk expects to find (context plus deletions).
    pub fn source_text(&self) -> String {
        super::myers::source_text(&self.ops)
    }

    /// Text the hunk leaves behind (context plus insertions).
    pub fn target_text(&self) -> String {
        super::myers::target_text(&self.ops)
    }
}

/// Ordered hunks turning a source text into a target text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub hunks: Vec<Hunk>,
}

/// Why a hunk could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchAnchorFailure {
    /// Neither an exact nor a fuzzy match exists near the expected location.
    ContextNotFound,
    /// The text under a deletion no longer equals what the hunk removes.
    DeletedTextChanged,
}

impl std::fmt::Display for PatchAnchorFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContextNotFound => f.write_str("context not found"),
            Self::DeletedTextChanged => f.write_str("deleted text changed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunkOutcome {
    Applied { at: usize },
    Failed(PatchAnchorFailure),
}

/// Result of applying a patch with per-hunk detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub text: String,
    pub outcomes: Vec<HunkOutcome>,
}

impl ApplyReport {
    pub fn applied_cleanly(&self) -> bool {
        self.outcomes
            .iter()
            .all(|outcome| matches!(outcome, HunkOutcome::Applied { .. }))
    }

    /// Indices of hunks that were skipped, paired with the reason.
    pub fn failures(&self) -> Vec<(usize, PatchAnchorFailure)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| match outcome {
                HunkOutcome::Failed(reason) => Some((index, *reason)),
                HunkOutcome::Applied { .. } => None,
            })
            .collect()
    }
}

/// Computes the patch turning `source` into `target`.
pub fn diff(source: &str, target: &str) -> Patch {
    Patch::make(source, target)
}

/// Applies `patch` to `base`, returning the new text and whether every hunk
/// applied.
pub fn apply(patch: &Patch, base: &str) -> (String, bool) {
    patch.apply(base)
}

impl Patch {
    pub fn make(source: &str, target: &str) -> Self {
        let source_chars: Vec<char> = source.chars().collect();
        let target_chars: Vec<char> = target.chars().collect();
        let ops = diff_chars(&source_chars, &target_chars);
        Self::from_ops(source_chars, &ops)
    }

    fn from_ops(source_chars: Vec<char>, ops: &[EditOp]) -> Self {
        if ops.iter().all(EditOp::is_equal) {
            return Self::default();
        }

        let mut hunks = Vec::new();
        let mut current = Hunk::default();
        let mut source_count = 0usize;
        let mut target_count = 0usize;
        // Context for each hunk is taken from the text with all earlier hunks
        // applied, so contexts never straddle a neighbour's change.
        let mut prepatch = source_chars;
        let mut postpatch = prepatch.clone();

        for (index, op) in ops.iter().enumerate() {
            let chars: Vec<char> = op.text().chars().collect();
            let len = chars.len();

            if current.ops.is_empty() && !op.is_equal() {
                current.source_start = source_count;
                current.target_start = target_count;
            }

            match op {
                EditOp::Insert(_) => {
                    current.ops.push(op.clone());
                    current.target_len += len;
                    postpatch.splice(target_count..target_count, chars);
                }
                EditOp::Delete(_) => {
                    current.ops.push(op.clone());
                    current.source_len += len;
                    postpatch.drain(target_count..target_count + len);
                }
                EditOp::Equal(_) => {
                    let is_last = index + 1 == ops.len();
                    if len <= 2 * PATCH_MARGIN && !current.ops.is_empty() && !is_last {
                        current.ops.push(op.clone());
                        current.source_len += len;
                        current.target_len += len;
                    }
                    if len >= 2 * PATCH_MARGIN && !current.ops.is_empty() {
                        add_context(&mut current, &prepatch);
                        hunks.push(std::mem::take(&mut current));
                        prepatch = postpatch.clone();
                        source_count = target_count;
                    }
                }
            }

            if !matches!(op, EditOp::Insert(_)) {
                source_count += len;
            }
            if !matches!(op, EditOp::Delete(_)) {
                target_count += len;
            }
        }

        if !current.ops.is_empty() {
            add_context(&mut current, &prepatch);
            hunks.push(current);
        }

        Self { hunks }
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn apply(&self, base: &str) -> (String, bool) {
        let report = self.apply_detailed(base);
        let clean = report.applied_cleanly();
        (report.text, clean)
    }

    /// Applies every hunk in order, re-anchoring each one near its expected
    /// location. Hunks that cannot be anchored are skipped.
    pub fn apply_detailed(&self, base: &str) -> ApplyReport {
        let mut text: Vec<char> = base.chars().collect();
        let mut outcomes = Vec::with_capacity(self.hunks.len());
        let mut drift: isize = 0;

        for hunk in &self.hunks {
            let expected = clamp_offset(hunk.source_start as isize + drift, text.len());
            let source: Vec<char> = hunk.source_text().chars().collect();

            let outcome = match locate(&text, &source, expected) {
                Some(start) => match plan_edits(hunk, &source, &text, start) {
                    Ok(edits) => {
                        for edit in edits.into_iter().rev() {
                            match edit {
                                PlannedEdit::Insert { at, chars } => {
                                    text.splice(at..at, chars);
                                }
                                PlannedEdit::Remove { at, len } => {
                                    text.drain(at..at + len);
                                }
                            }
                        }
                        drift += start as isize - expected as isize;
                        HunkOutcome::Applied { at: start }
                    }
                    Err(reason) => HunkOutcome::Failed(reason),
                },
                None => HunkOutcome::Failed(PatchAnchorFailure::ContextNotFound),
            };

            if matches!(outcome, HunkOutcome::Failed(_)) {
                // Later hunks assume this one changed the text length.
                drift -= hunk.target_len as isize - hunk.source_len as isize;
            }
            outcomes.push(outcome);
        }

        ApplyReport {
            text: text.into_iter().collect(),
            outcomes,
        }
    }
}

enum PlannedEdit {
    Insert { at: usize, chars: Vec<char> },
    Remove { at: usize, len: usize },
}

fn plan_edits(
    hunk: &Hunk,
    source: &[char],
    text: &[char],
    start: usize,
) -> Result<Vec<PlannedEdit>, PatchAnchorFailure> {
    let actual = &text[start..(start + source.len()).min(text.len())];
    let drifted = (actual != source).then(|| diff_chars(source, actual));
    let map = |index: usize| match &drifted {
        Some(ops) => map_index(ops, index),
        None => index,
    };

    let mut edits = Vec::new();
    let mut source_index = 0usize;
    for op in &hunk.ops {
        let len = op.char_len();
        match op {
            EditOp::Equal(_) => source_index += len,
            EditOp::Insert(inserted) => {
                edits.push(PlannedEdit::Insert {
                    at: start + map(source_index),
                    chars: inserted.chars().collect(),
                });
            }
            EditOp::Delete(deleted) => {
                let from = start + map(source_index);
                let to = start + map(source_index + len);
                if to > text.len() || !text[from..to].iter().copied().eq(deleted.chars()) {
                    return Err(PatchAnchorFailure::DeletedTextChanged);
                }
                edits.push(PlannedEdit::Remove { at: from, len: to - from });
                source_index += len;
            }
        }
    }
    Ok(edits)
}

/// Finds where `pattern` best matches `text` near `expected`.
fn locate(text: &[char], pattern: &[char], expected: usize) -> Option<usize> {
    if pattern.is_empty() {
        return Some(expected.min(text.len()));
    }
    if pattern.len() > text.len() {
        return None;
    }

    let max_start = text.len() - pattern.len();
    let low = expected.saturating_sub(MATCH_DISTANCE);
    let high = max_start.min(expected + MATCH_DISTANCE);
    if low > high {
        return None;
    }

    let exact = (low..=high)
        .filter(|&start| &text[start..start + pattern.len()] == pattern)
        .min_by_key(|&start| (start.abs_diff(expected), start));
    if exact.is_some() {
        return exact;
    }

    (low..=high)
        .filter_map(|start| {
            let mismatches = text[start..start + pattern.len()]
                .iter()
                .zip(pattern)
                .filter(|(actual, wanted)| actual != wanted)
                .count();
            let ratio = mismatches as f64 / pattern.len() as f64;
            (ratio <= MATCH_THRESHOLD).then_some((mismatches, start.abs_diff(expected), start))
        })
        .min()
        .map(|(_, _, start)| start)
}

/// Grows the hunk's context until its source pattern is unique in `text`,
/// then adds one more margin on each side.
fn add_context(hunk: &mut Hunk, text: &[char]) {
    if text.is_empty() {
        return;
    }

    let pattern_end = |padding: usize| (hunk.source_start + hunk.source_len + padding).min(text.len());
    let mut padding = 0usize;
    let mut pattern = &text[hunk.source_start..pattern_end(0)];
    while !is_unique(text, pattern) && pattern.len() < MAX_PATTERN_CHARS - 2 * PATCH_MARGIN {
        padding += PATCH_MARGIN;
        pattern = &text[hunk.source_start.saturating_sub(padding)..pattern_end(padding)];
    }
    padding += PATCH_MARGIN;

    let prefix_start = hunk.source_start.saturating_sub(padding);
    let prefix: String = text[prefix_start..hunk.source_start].iter().collect();
    let suffix_start = (hunk.source_start + hunk.source_len).min(text.len());
    let suffix: String = text[suffix_start..pattern_end(padding)].iter().collect();

    let prefix_len = prefix.chars().count();
    let suffix_len = suffix.chars().count();

    if !prefix.is_empty() {
        hunk.ops.insert(0, EditOp::Equal(prefix));
    }
    if !suffix.is_empty() {
        match hunk.ops.last_mut() {
            Some(EditOp::Equal(tail)) => tail.push_str(&suffix),
            _ => hunk.ops.push(EditOp::Equal(suffix)),
        }
    }

    hunk.source_start -= prefix_len;
    hunk.target_start -= prefix_len;
    hunk.source_len += prefix_len + suffix_len;
    hunk.target_len += prefix_len + suffix_len;
}

fn is_unique(text: &[char], pattern: &[char]) -> bool {
    if pattern.is_empty() {
        return text.is_empty();
    }
    if pattern.len() > text.len() {
        return true;
    }
    let mut matches = text.windows(pattern.len()).filter(|window| *window == pattern);
    matches.next().is_some() && matches.next().is_none()
}

fn clamp_offset(offset: isize, len: usize) -> usize {
    offset.clamp(0, len as isize) as usize
}
