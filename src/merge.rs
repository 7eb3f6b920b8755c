//! N-way overlay merge — the `Merger` component (spec §4.2).
//!
//! Takes a baseline [`ChangeList`] (all-common, as produced by
//! [`crate::diff::diff`] with no `current`) plus zero or more overlay
//! `ChangeList`s, each computed against that same baseline text, and
//! produces one merged `ChangeList` with conflicts flagged in place.
//!
//! This is a deliberately simple merge: there is no common-ancestor
//! three-way logic beyond "every overlay diffs against the same baseline".
//! A baseline anchor becomes a conflict exactly when more than one overlay
//! inserted at it — see the module docs on [`crate::diff`] for what
//! "anchor" means.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::diff::{Change, ChangeList, ConflictGroup};

#[derive(Default)]
struct PatchEntry {
    /// Inserted changes accumulated at this anchor, across all overlays, in
    /// overlay-processing order.
    changes: Vec<Change>,
    /// Number of *distinct overlays* that inserted at this anchor — not the
    /// number of inserted lines (spec §4.2 step 2).
    modify_count: usize,
}

/// Merge a baseline [`ChangeList`] with zero or more overlay `ChangeList`s.
///
/// - `overlays` empty → returns `baseline` unchanged (even if `baseline` is
///   itself empty).
/// - `baseline` empty (and `overlays` non-empty) → returns an empty
///   `ChangeList`.
/// - Never panics on malformed input: any overlay change whose
///   `line_number` falls outside the baseline's range is silently dropped.
#[must_use]
pub fn merge(baseline: &ChangeList, overlays: &[ChangeList]) -> ChangeList {
    if overlays.is_empty() {
        return baseline.clone();
    }
    if baseline.is_empty() {
        return Vec::new();
    }

    let mut baseline_lines: Vec<Change> = baseline.clone();
    let baseline_len = baseline_lines.len() as i64;

    let mut patch_table: BTreeMap<i64, PatchEntry> = BTreeMap::new();

    for overlay in overlays {
        let mut touched_anchors: BTreeSet<i64> = BTreeSet::new();

        for change in overlay {
            if change.removed {
                let idx = change.line_number;
                if idx >= 0 && (idx as usize) < baseline_lines.len() {
                    baseline_lines[idx as usize].removed = true;
                }
                // Out-of-range removals are silently dropped (spec §4.2 "Failure").
            } else if change.added {
                if change.line_number < -1 || change.line_number >= baseline_len {
                    continue;
                }
                patch_table
                    .entry(change.line_number)
                    .or_default()
                    .changes
                    .push(change.clone());
                touched_anchors.insert(change.line_number);
            }
            // Common lines in an overlay are context only; they carry no
            // information the merger needs.
        }

        for anchor in touched_anchors {
            patch_table.entry(anchor).or_default().modify_count += 1;
        }
    }

    for entry in patch_table.values_mut() {
        if entry.modify_count > 1 {
            for change in &mut entry.changes {
                change.conflicted = true;
                change.conflict_group = Some(ConflictGroup::Current);
            }
        }
    }

    let mut result = Vec::with_capacity(baseline_lines.len());
    let mut cursor: i64 = 0;

    for (&anchor, entry) in &patch_table {
        if anchor >= 0 {
            while cursor <= anchor && (cursor as usize) < baseline_lines.len() {
                result.push(baseline_lines[cursor as usize].clone());
                cursor += 1;
            }
        }
        result.extend(entry.changes.iter().cloned());
    }

    while (cursor as usize) < baseline_lines.len() {
        result.push(baseline_lines[cursor as usize].clone());
        cursor += 1;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;

    fn baseline_of(text: &str) -> ChangeList {
        diff(text, None)
    }

    #[test]
    fn empty_overlays_returns_baseline_unchanged() {
        let baseline = baseline_of("a\nb\n");
        let merged = merge(&baseline, &[]);
        assert_eq!(merged, baseline);
    }

    #[test]
    fn empty_baseline_returns_empty() {
        let merged = merge(&Vec::new(), &[baseline_of("x\n")]);
        assert!(merged.is_empty());
    }

    #[test]
    fn single_overlay_has_no_conflicts() {
        let baseline = baseline_of("1\n2\n3\n");
        let overlay = diff("1\n2\n3\n", Some("1\n1.5\n2\n3\n"));
        let merged = merge(&baseline, &[overlay]);
        assert!(merged.iter().all(|c| !c.conflicted));
        let text: String = merged
            .iter()
            .filter(|c| !c.removed)
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(text, "1\n1.5\n2\n3\n");
    }

    #[test]
    fn distinct_anchors_produce_no_conflict_in_ascending_order() {
        let baseline = baseline_of("a\nb\nc\n");
        let overlay_x = diff("a\nb\nc\n", Some("X\na\nb\nc\n"));
        let overlay_y = diff("a\nb\nc\n", Some("a\nb\nc\nY\n"));
        let merged = merge(&baseline, &[overlay_x, overlay_y]);
        assert!(merged.iter().all(|c| !c.conflicted));
        let text: String = merged
            .iter()
            .filter(|c| !c.removed)
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(text, "X\na\nb\nc\nY\n");
    }

    #[test]
    fn same_anchor_insertions_conflict() {
        let baseline = baseline_of("A\nB\n");
        let overlay_x = diff("A\nB\n", Some("A\nX\nB\n"));
        let overlay_y = diff("A\nB\n", Some("A\nY\nB\n"));
        let merged = merge(&baseline, &[overlay_x, overlay_y]);
        let conflicted: Vec<_> = merged.iter().filter(|c| c.conflicted).collect();
        assert_eq!(conflicted.len(), 2);
        assert!(conflicted.iter().any(|c| c.value == "X\n"));
        assert!(conflicted.iter().any(|c| c.value == "Y\n"));
    }

    #[test]
    fn removal_with_no_replacement_drops_the_line() {
        let baseline = baseline_of("x\ny\nz\n");
        let overlay = diff("x\ny\nz\n", Some("x\nz\n"));
        let merged = merge(&baseline, &[overlay]);
        let text: String = merged
            .iter()
            .filter(|c| !c.removed)
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(text, "x\nz\n");
        assert!(merged.iter().all(|c| !c.conflicted));
    }

    proptest::proptest! {
        /// Spec §8 invariant: merging with a single overlay never
        /// produces a conflict, regardless of what that overlay changed.
        #[test]
        fn single_overlay_never_conflicts(
            baseline_lines in proptest::collection::vec("[a-z]{0,4}", 0..8),
            overlay_lines in proptest::collection::vec("[a-z]{0,4}", 0..8),
        ) {
            let baseline_text: String = baseline_lines.iter().map(|l| format!("{l}\n")).collect();
            let overlay_text: String = overlay_lines.iter().map(|l| format!("{l}\n")).collect();
            let baseline = baseline_of(&baseline_text);
            let overlay = diff(&baseline_text, Some(&overlay_text));
            let merged = merge(&baseline, &[overlay]);
            proptest::prop_assert!(merged.iter().all(|c| !c.conflicted));
        }
    }

    #[test]
    fn out_of_range_overlay_changes_are_dropped_not_panicking() {
        let baseline = baseline_of("only\n");
        let mut stray = diff("only\n", Some("only\n"));
        stray.push(Change {
            value: "ghost\n".to_owned(),
            added: true,
            removed: false,
            line_number: 999,
            conflicted: false,
            conflict_group: None,
        });
        let merged = merge(&baseline, &[stray]);
        assert!(merged.iter().all(|c| c.value != "ghost\n"));
    }
}
