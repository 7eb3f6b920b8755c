//! Conflict resolution loop — the `ResolverLoop` component (spec §4.7).
//!
//! After `merge` produces a [`crate::block::MergeBlock`] sequence for each
//! touched path, any `Conflict` block is handed to a caller-supplied
//! [`ConflictSolver`] one at a time. The solver's verdict decides what
//! replaces the block: a concrete resolution, an explicit defer (the
//! conflict renders with its `current` side but remains flagged
//! unresolved), or no opinion (left untouched for the next pass).

use crate::block::MergeBlock;
use crate::error::OverlayError;
use crate::tables::MergeTable;

/// What a [`ConflictSolver`] decided for one conflict block.
pub enum Verdict {
    /// Replace the conflict with these resolved lines.
    Resolved(Vec<String>),
    /// Defer: keep rendering the `current` side, but keep the block
    /// flagged as a conflict (spec §4.7: "ignored conflicts still count
    /// toward an unresolved run").
    Ignored,
    /// No opinion — leave the block exactly as it is.
    Undecided,
}

/// Resolves one conflict at a time.
///
/// Implementors might prompt a human, apply a fixed precedence rule (e.g.
/// "current always wins"), or run a merge heuristic. The engine imposes no
/// policy beyond the three-way [`Verdict`] contract.
pub trait ConflictSolver {
    /// `path` is the file being resolved; `former`/`current` are the two
    /// conflicting line groups.
    fn resolve(&mut self, path: &str, former: &[String], current: &[String]) -> Result<Verdict, OverlayError>;
}

/// Drive `solver` over every unresolved conflict in `table`, mutating
/// blocks in place.
///
/// Returns the paths that still contain at least one conflict after the
/// pass (either `Undecided` ones, or solver-`Ignored` ones — both count as
/// unresolved per spec §4.7, §7 `ConflictsRemain`).
pub fn run(table: &mut MergeTable, solver: &mut dyn ConflictSolver) -> Result<Vec<String>, OverlayError> {
    let paths: Vec<String> = table.paths().map(str::to_owned).collect();
    let mut still_unresolved = Vec::new();

    for path in paths {
        let Some(blocks) = table.get_mut(&path) else {
            continue;
        };

        let mut any_unresolved = false;
        for block in blocks.iter_mut() {
            let MergeBlock::Conflict {
                former,
                current,
                ignored,
            } = block
            else {
                continue;
            };

            match solver.resolve(&path, former, current)? {
                Verdict::Resolved(lines) => {
                    *block = MergeBlock::Ok { lines };
                }
                Verdict::Ignored => {
                    *ignored = true;
                    any_unresolved = true;
                }
                Verdict::Undecided => {
                    any_unresolved = true;
                }
            }
        }

        if any_unresolved {
            still_unresolved.push(path);
        }
    }

    Ok(still_unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysCurrent;
    impl ConflictSolver for AlwaysCurrent {
        fn resolve(&mut self, _path: &str, _former: &[String], current: &[String]) -> Result<Verdict, OverlayError> {
            Ok(Verdict::Resolved(current.to_vec()))
        }
    }

    struct AlwaysIgnore;
    impl ConflictSolver for AlwaysIgnore {
        fn resolve(&mut self, _path: &str, _former: &[String], _current: &[String]) -> Result<Verdict, OverlayError> {
            Ok(Verdict::Ignored)
        }
    }

    struct Undecided;
    impl ConflictSolver for Undecided {
        fn resolve(&mut self, _path: &str, _former: &[String], _current: &[String]) -> Result<Verdict, OverlayError> {
            Ok(Verdict::Undecided)
        }
    }

    fn conflict_table() -> MergeTable {
        let mut table = MergeTable::new();
        table.insert(
            "a.txt",
            vec![MergeBlock::Conflict {
                former: vec!["x\n".to_owned()],
                current: vec!["y\n".to_owned()],
                ignored: false,
            }],
        );
        table
    }

    #[test]
    fn resolved_verdict_clears_conflict() {
        let mut table = conflict_table();
        let mut solver = AlwaysCurrent;
        let remaining = run(&mut table, &mut solver).unwrap();
        assert!(remaining.is_empty());
        assert!(matches!(table.get("a.txt").unwrap()[0], MergeBlock::Ok { .. }));
    }

    #[test]
    fn ignored_verdict_keeps_conflict_flagged() {
        let mut table = conflict_table();
        let mut solver = AlwaysIgnore;
        let remaining = run(&mut table, &mut solver).unwrap();
        assert_eq!(remaining, vec!["a.txt".to_owned()]);
        match &table.get("a.txt").unwrap()[0] {
            MergeBlock::Conflict { ignored, .. } => assert!(*ignored),
            MergeBlock::Ok { .. } => unreachable!(),
        }
    }

    #[test]
    fn undecided_verdict_leaves_block_untouched() {
        let mut table = conflict_table();
        let mut solver = Undecided;
        let remaining = run(&mut table, &mut solver).unwrap();
        assert_eq!(remaining, vec!["a.txt".to_owned()]);
        match &table.get("a.txt").unwrap()[0] {
            MergeBlock::Conflict { ignored, .. } => assert!(!*ignored),
            MergeBlock::Ok { .. } => unreachable!(),
        }
    }
}
