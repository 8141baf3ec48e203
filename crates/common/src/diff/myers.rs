// Character-level Myers diff producing coalesced equal/insert/delete spans.

/// One span of a diff between two texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    Equal(String),
    Insert(String),
    Delete(String),
}

impl EditOp {
    pub fn text(&self) -> &str {
        match self {
            Self::Equal(text) | Self::Insert(text) | Self::Delete(text) => text,
        }
    }

    /// Length of the span in characters.
    pub fn char_len(&self) -> usize {
        self.text().chars().count()
    }

    pub fn is_equal(&self) -> bool {
        matches!(self, Self::Equal(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharEdit {
    Equal(char),
    Insert(char),
    Delete(char),
}

/// Computes the edit spans turning `old_text` into `new_text`.
///
/// Adjacent edits of the same kind are merged, so the result never holds two
/// consecutive spans with the same variant.
pub fn diff_ops(old_text: &str, new_text: &str) -> Vec<EditOp> {
    let old_chars: Vec<char> = old_text.chars().collect();
    let new_chars: Vec<char> = new_text.chars().collect();
    diff_chars(&old_chars, &new_chars)
}

pub(crate) fn diff_chars(old_chars: &[char], new_chars: &[char]) -> Vec<EditOp> {
    let mut edits = Vec::with_capacity(old_chars.len().max(new_chars.len()));
    char_edits(old_chars, new_chars, &mut edits);
    coalesce(&edits)
}

fn common_prefix(a: &[char], b: &[char]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[char], b: &[char]) -> usize {
    a.iter().rev().zip(b.iter().rev()).take_while(|(x, y)| x == y).count()
}

/// Appends the edits turning `old_chars` into `new_chars`. Common affixes are
/// peeled off first; the remainder is split at its middle snake.
fn char_edits(old_chars: &[char], new_chars: &[char], edits: &mut Vec<CharEdit>) {
    let prefix = common_prefix(old_chars, new_chars);
    let suffix = common_suffix(&old_chars[prefix..], &new_chars[prefix..]);
    let old_mid = &old_chars[prefix..old_chars.len() - suffix];
    let new_mid = &new_chars[prefix..new_chars.len() - suffix];

    edits.extend(old_chars[..prefix].iter().copied().map(CharEdit::Equal));
    if old_mid.is_empty() {
        edits.extend(new_mid.iter().copied().map(CharEdit::Insert));
    } else if new_mid.is_empty() {
        edits.extend(old_mid.iter().copied().map(CharEdit::Delete));
    } else {
        match middle_snake(old_mid, new_mid) {
            Some((x, y)) => {
                char_edits(&old_mid[..x], &new_mid[..y], edits);
                char_edits(&old_mid[x..], &new_mid[y..], edits);
            }
            None => {
                edits.extend(old_mid.iter().copied().map(CharEdit::Delete));
                edits.extend(new_mid.iter().copied().map(CharEdit::Insert));
            }
        }
    }
    edits.extend(old_chars[old_chars.len() - suffix..].iter().copied().map(CharEdit::Equal));
}

/// Myers' bidirectional search in linear space. Returns the point where the
/// forward and reverse paths overlap, or `None` when the texts share no
/// usable split point. Both inputs must be non-empty.
fn middle_snake(old_chars: &[char], new_chars: &[char]) -> Option<(usize, usize)> {
    let old_len = old_chars.len() as isize;
    let new_len = new_chars.len() as isize;
    let max_d = (old_len + new_len + 1) / 2;
    let offset = max_d;
    let width = (2 * max_d + 2) as usize;
    let mut forward = vec![-1isize; width];
    let mut reverse = vec![-1isize; width];
    forward[(offset + 1) as usize] = 0;
    reverse[(offset + 1) as usize] = 0;

    let delta = old_len - new_len;
    let front = delta % 2 != 0;
    let (mut k1_start, mut k1_end, mut k2_start, mut k2_end) = (0isize, 0isize, 0isize, 0isize);

    for d in 0..max_d {
        let mut k1 = -d + k1_start;
        while k1 <= d - k1_end {
            let k1_idx = (offset + k1) as usize;
            let mut x1 = if k1 == -d || (k1 != d && forward[k1_idx - 1] < forward[k1_idx + 1]) {
                forward[k1_idx + 1]
            } else {
                forward[k1_idx - 1] + 1
            };
            let mut y1 = x1 - k1;
            while x1 < old_len && y1 < new_len && old_chars[x1 as usize] == new_chars[y1 as usize]
            {
                x1 += 1;
                y1 += 1;
            }
            forward[k1_idx] = x1;

            if x1 > old_len {
                k1_end += 2;
            } else if y1 > new_len {
                k1_start += 2;
            } else if front {
                let k2_idx = offset + delta - k1;
                if (0..width as isize).contains(&k2_idx) && reverse[k2_idx as usize] != -1 {
                    let x2 = old_len - reverse[k2_idx as usize];
                    if x1 >= x2 {
                        return split_point(x1, y1, old_len, new_len);
                    }
                }
            }
            k1 += 2;
        }

        let mut k2 = -d + k2_start;
        while k2 <= d - k2_end {
            let k2_idx = (offset + k2) as usize;
            let mut x2 = if k2 == -d || (k2 != d && reverse[k2_idx - 1] < reverse[k2_idx + 1]) {
                reverse[k2_idx + 1]
            } else {
                reverse[k2_idx - 1] + 1
            };
            let mut y2 = x2 - k2;
            while x2 < old_len
                && y2 < new_len
                && old_chars[(old_len - x2 - 1) as usize] == new_chars[(new_len - y2 - 1) as usize]
            {
                x2 += 1;
                y2 += 1;
            }
            reverse[k2_idx] = x2;

            if x2 > old_len {
                k2_end += 2;
            } else if y2 > new_len {
                k2_start += 2;
            } else if !front {
                let k1_idx = offset + delta - k2;
                if (0..width as isize).contains(&k1_idx) && forward[k1_idx as usize] != -1 {
                    let x1 = forward[k1_idx as usize];
                    let y1 = offset + x1 - k1_idx;
                    if x1 >= old_len - x2 {
                        return split_point(x1, y1, old_len, new_len);
                    }
                }
            }
            k2 += 2;
        }
    }

    None
}

/// A split at either corner would not shrink the problem.
fn split_point(x: isize, y: isize, old_len: isize, new_len: isize) -> Option<(usize, usize)> {
    let corner = (x == 0 && y == 0) || (x == old_len && y == new_len);
    let inside = (0..=old_len).contains(&x) && (0..=new_len).contains(&y);
    (inside && !corner).then_some((x as usize, y as usize))
}

/// Merges per-character edits into spans. Within a run of changes, deletions
/// are emitted before insertions so a replacement reads `Delete, Insert`.
fn coalesce(edits: &[CharEdit]) -> Vec<EditOp> {
    let mut ops = Vec::new();
    let mut equal = String::new();
    let mut deleted = String::new();
    let mut inserted = String::new();

    for edit in edits {
        match edit {
            CharEdit::Equal(ch) => {
                flush_changes(&mut ops, &mut deleted, &mut inserted);
                equal.push(*ch);
            }
            CharEdit::Delete(ch) => {
                flush_equal(&mut ops, &mut equal);
                deleted.push(*ch);
            }
            CharEdit::Insert(ch) => {
                flush_equal(&mut ops, &mut equal);
                inserted.push(*ch);
            }
        }
    }

    flush_changes(&mut ops, &mut deleted, &mut inserted);
    flush_equal(&mut ops, &mut equal);
    ops
}

fn flush_equal(ops: &mut Vec<EditOp>, equal: &mut String) {
    if !equal.is_empty() {
        ops.push(EditOp::Equal(std::mem::take(equal)));
    }
}

fn flush_changes(ops: &mut Vec<EditOp>, deleted: &mut String, inserted: &mut String) {
    if !deleted.is_empty() {
        ops.push(EditOp::Delete(std::mem::take(deleted)));
    }
    if !inserted.is_empty() {
        ops.push(EditOp::Insert(std::mem::take(inserted)));
    }
}

/// Reconstructs the source text of a diff (equal and deleted spans).
pub fn source_text(ops: &[EditOp]) -> String {
    ops.iter()
        .filter(|op| !matches!(op, EditOp::Insert(_)))
        .map(EditOp::text)
        .collect()
}

/// Reconstructs the target text of a diff (equal and inserted spans).
pub fn target_text(ops: &[EditOp]) -> String {
    ops.iter()
        .filter(|op| !matches!(op, EditOp::Delete(_)))
        .map(EditOp::text)
        .collect()
}

/// Maps a character offset in the source of `ops` to the equivalent offset
/// in its target. Offsets inside a deleted span map to the deletion point.
pub fn map_index(ops: &[EditOp], source_index: usize) -> usize {
    let mut source_chars = 0usize;
    let mut target_chars = 0usize;
    let mut last_source = 0usize;
    let mut last_target = 0usize;
    let mut overshot = None;

    for (position, op) in ops.iter().enumerate() {
        let len = op.char_len();
        if !matches!(op, EditOp::Insert(_)) {
            source_chars += len;
        }
        if !matches!(op, EditOp::Delete(_)) {
            target_chars += len;
        }
        if source_chars > source_index {
            overshot = Some(position);
            break;
        }
        last_source = source_chars;
        last_target = target_chars;
    }

    if let Some(position) = overshot {
        if matches!(ops[position], EditOp::Delete(_)) {
            return last_target;
        }
    }
    last_target + (source_index - last_source)
}
