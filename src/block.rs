//! Merge blocks and conflict fences — the `BlockParser` component (spec §4.3).
//!
//! Converts a merged [`ChangeList`] to and from a sequence of [`MergeBlock`]s
//! — contiguous runs of non-conflicting lines, or two-sided conflicts — and
//! serializes blocks to the conflict-fence text format used for interactive
//! resolution and for the final emitted file content.

use serde::{Deserialize, Serialize};

use crate::diff::{diff, Change, ChangeList, ConflictGroup};

// ---------------------------------------------------------------------------
// MergeBlock
// ---------------------------------------------------------------------------

/// A run of output lines: either agreed (`Ok`) or a two-sided conflict.
///
/// Adjacent blocks of the same kind are never produced directly by
/// [`to_blocks`] except that consecutive `Ok` runs are naturally coalesced
/// by construction (spec §3 `MergeTable` invariant).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MergeBlock {
    /// A contiguous run of non-conflicting output lines.
    Ok { lines: Vec<String> },
    /// Two alternative line groups at the same baseline position.
    Conflict {
        former: Vec<String>,
        current: Vec<String>,
        /// Set by [`crate::resolver::ResolverLoop`] when a human explicitly
        /// defers this conflict; it still renders (via `current`) but is
        /// still reported as unresolved (spec §4.7).
        ignored: bool,
    },
}

impl MergeBlock {
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

// ---------------------------------------------------------------------------
// to_blocks
// ---------------------------------------------------------------------------

/// Convert a merged [`ChangeList`] into a sequence of [`MergeBlock`]s.
///
/// `removed` changes are dropped entirely. `conflicted` changes are
/// appended to the `former`/`current` side named by their
/// [`ConflictGroup`], opening a new `Conflict` block if the tail isn't
/// already one. Everything else is appended to the tail `Ok` block's
/// `lines`, opening a new one if the tail is a `Conflict` block or the
/// block list is empty.
#[must_use]
pub fn to_blocks(changes: &[Change]) -> Vec<MergeBlock> {
    let mut blocks: Vec<MergeBlock> = Vec::new();

    for change in changes {
        if change.removed {
            continue;
        }

        if change.conflicted {
            let group = change.conflict_group.unwrap_or(ConflictGroup::Current);
            let needs_new_block = !matches!(blocks.last(), Some(MergeBlock::Conflict { .. }));
            if needs_new_block {
                blocks.push(MergeBlock::Conflict {
                    former: Vec::new(),
                    current: Vec::new(),
                    ignored: false,
                });
            }
            if let Some(MergeBlock::Conflict { former, current, .. }) = blocks.last_mut() {
                match group {
                    ConflictGroup::Former => former.push(change.value.clone()),
                    ConflictGroup::Current => current.push(change.value.clone()),
                }
            }
        } else {
            let needs_new_block = !matches!(blocks.last(), Some(MergeBlock::Ok { .. }));
            if needs_new_block {
                blocks.push(MergeBlock::Ok { lines: Vec::new() });
            }
            if let Some(MergeBlock::Ok { lines }) = blocks.last_mut() {
                lines.push(change.value.clone());
            }
        }
    }

    blocks
}

// ---------------------------------------------------------------------------
// to_text
// ---------------------------------------------------------------------------

/// Serialize [`MergeBlock`]s into the file's text, using the conflict fence
/// format from spec §6:
///
/// ```text
/// <<<<<<< former
/// {former lines}=======
/// {current lines}>>>>>>> current
/// ```
///
/// Every marker is on its own line; the content groups' own trailing
/// newlines (or lack thereof) are preserved verbatim.
#[must_use]
pub fn to_text(blocks: &[MergeBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        match block {
            MergeBlock::Ok { lines } => {
                for line in lines {
                    out.push_str(line);
                }
            }
            MergeBlock::Conflict { former, current, .. } => {
                out.push_str("<<<<<<< former\n");
                for line in former {
                    out.push_str(line);
                }
                out.push_str("=======\n");
                for line in current {
                    out.push_str(line);
                }
                out.push_str(">>>>>>> current\n");
            }
        }
    }
    out
}

/// Render the block list the way it would appear if every unresolved
/// conflict picked its `current` side — used by the resolver loop to show
/// "ignored" conflicts their eventual rendering (spec §4.7).
#[must_use]
pub fn to_text_current_wins(blocks: &[MergeBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        match block {
            MergeBlock::Ok { lines } => {
                for line in lines {
                    out.push_str(line);
                }
            }
            MergeBlock::Conflict { current, .. } => {
                for line in current {
                    out.push_str(line);
                }
            }
        }
    }
    out
}

/// Render the block list the way it should be emitted into the final
/// project: unresolved conflicts still render with the full fence (spec
/// §4.6 step 11's `toText`), but a conflict the resolver marked `ignored`
/// collapses to its `current` side with no fence — the only case
/// `to_text_current_wins` applies to (spec §4.7).
#[must_use]
pub fn to_text_for_emit(blocks: &[MergeBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        match block {
            MergeBlock::Ok { lines } => {
                for line in lines {
                    out.push_str(line);
                }
            }
            MergeBlock::Conflict {
                former,
                current,
                ignored: true,
            } => {
                let _ = former;
                for line in current {
                    out.push_str(line);
                }
            }
            MergeBlock::Conflict {
                former,
                current,
                ignored: false,
            } => {
                out.push_str("<<<<<<< former\n");
                for line in former {
                    out.push_str(line);
                }
                out.push_str("=======\n");
                for line in current {
                    out.push_str(line);
                }
                out.push_str(">>>>>>> current\n");
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// from_text
// ---------------------------------------------------------------------------

/// Parse raw file content into [`MergeBlock`]s — equivalent to
/// `to_blocks(diff(content, None))`, i.e. treating `content` as its own
/// baseline (no conflicts, one `Ok` block per contiguous region).
#[must_use]
pub fn from_text(content: &str) -> Vec<MergeBlock> {
    to_blocks(&diff(content, None))
}
