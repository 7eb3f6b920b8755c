//! Line-level diff engine — the `LineDiffer` component (spec §4.1).
//!
//! Computes line-level changes between two texts and normalizes each change
//! to a single line plus a line number anchored in the *baseline* text.
//!
//! # Line numbering
//!
//! Baseline lines are numbered from `0`. Walking the diff output in order,
//! a running `counter` starts at `0`:
//!
//! - `Common` or `Removed` changes take `line_number = counter`, then
//!   `counter` advances by one.
//! - `Added` changes take `line_number = counter - 1` — the last baseline
//!   line seen before the insertion point. An insertion before the very
//!   first baseline line gets `line_number = -1`.
//!
//! This lets the [`crate::merge::merge`] step re-anchor every overlay's
//! insertions against the same baseline coordinate space.

use similar::{ChangeTag, TextDiff};

// ---------------------------------------------------------------------------
// Change / ChangeList
// ---------------------------------------------------------------------------

/// Which side of a [`crate::block::MergeBlock::Conflict`] a conflicted
/// change was placed on by the merger (spec §4.2 step 3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictGroup {
    Former,
    Current,
}

/// One line of content relative to a baseline.
///
/// `added` and `removed` are never both `true`; both `false` means the line
/// is unchanged ("common"). The line's trailing `\n`, if any, is preserved
/// in `value` — the differ never fabricates or strips a terminator the
/// source text didn't have.
///
/// `conflicted`/`conflict_group` are set only by [`crate::merge::merge`];
/// a fresh [`diff`] result always has `conflicted: false`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    /// The line's content, including its trailing newline if the source had
    /// one.
    pub value: String,
    /// `true` if this line exists only in `current`, not in `baseline`.
    pub added: bool,
    /// `true` if this line exists only in `baseline`, not in `current`.
    pub removed: bool,
    /// Baseline-anchored line number. See module docs for the numbering
    /// rule; negative only for an insertion before the first baseline line.
    pub line_number: i64,
    /// Set by the merger when two or more overlays inserted at the same
    /// anchor (spec §4.2 step 3).
    pub conflicted: bool,
    /// Which side of the eventual conflict fence this change belongs on.
    /// Only meaningful when `conflicted` is `true`.
    pub conflict_group: Option<ConflictGroup>,
}

impl Change {
    #[must_use]
    pub const fn is_common(&self) -> bool {
        !self.added && !self.removed
    }

    fn new(value: String, added: bool, removed: bool, line_number: i64) -> Self {
        Self {
            value,
            added,
            removed,
            line_number,
            conflicted: false,
            conflict_group: None,
        }
    }
}

/// An ordered sequence of [`Change`]s representing one file version
/// relative to a baseline.
pub type ChangeList = Vec<Change>;

// ---------------------------------------------------------------------------
// diff
// ---------------------------------------------------------------------------

/// Compute the [`ChangeList`] of `current` relative to `baseline`.
///
/// If `current` is `None`, returns the self-diff of `baseline` against
/// itself — a `ChangeList` of all-common lines. This is how the
/// orchestrator establishes the baseline `ChangeList` for a freshly seen
/// file (spec §4.6 step 6).
///
/// An empty `baseline` with no `current` yields an empty `ChangeList`.
#[must_use]
pub fn diff(baseline: &str, current: Option<&str>) -> ChangeList {
    let current = current.unwrap_or(baseline);
    if baseline.is_empty() && current.is_empty() {
        return Vec::new();
    }

    let text_diff = TextDiff::from_lines(baseline, current);
    let mut changes = Vec::with_capacity(text_diff.iter_all_changes().count());
    let mut counter: i64 = 0;

    for change in text_diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Equal => {
                changes.push(Change::new(change.value().to_owned(), false, false, counter));
                counter += 1;
            }
            ChangeTag::Delete => {
                changes.push(Change::new(change.value().to_owned(), false, true, counter));
                counter += 1;
            }
            ChangeTag::Insert => {
                changes.push(Change::new(change.value().to_owned(), true, false, counter - 1));
            }
        }
    }

    changes
}

/// Reconstitute the text a [`ChangeList`] was diffed *against* — i.e. the
/// `baseline` argument to [`diff`] that produced it. Concatenates every
/// non-`added` change's value in order.
#[must_use]
pub fn reconstitute_baseline(changes: &[Change]) -> String {
    changes
        .iter()
        .filter(|c| !c.added)
        .map(|c| c.value.as_str())
        .collect()
}

/// Reconstitute the text a [`ChangeList`] was diffed *to* — i.e. the
/// `current` argument to [`diff`]. Concatenates every non-`removed`
/// change's value in order.
#[must_use]
pub fn reconstitute_current(changes: &[Change]) -> String {
    changes
        .iter()
        .filter(|c| !c.removed)
        .map(|c| c.value.as_str())
        .collect()
}
