pub mod codec;
pub mod delta;
pub mod myers;
pub mod patch;

pub use codec::PatchParseError;
pub use delta::{apply_deltas, editor_deltas, EditorDelta};
pub use myers::{diff_ops, EditOp};
pub use patch::{
    apply, diff, ApplyReport, Hunk, HunkOutcome, Patch, PatchAnchorFailure, MATCH_DISTANCE,
    MATCH_THRESHOLD, PATCH_MARGIN,
};
