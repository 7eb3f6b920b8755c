//! Per-file policy resolution — the `GlobMatcher` component (spec §4.5).
//!
//! Resolves whether a pathname should be merged (vs. copy-last/overwrite)
//! or deleted, based on glob lists a template author declares in
//! `files.merge` / `files.delete`. The matcher is built once per run from
//! the *union* of the main template's globs and every activated extend
//! template's globs (spec §4.6 step 5).

use glob::Pattern;

use crate::error::OverlayError;

/// Which policy list to consult.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    Merge,
    Delete,
}

/// Compiled glob lists for the `merge` and `delete` file policies.
#[derive(Debug, Default)]
pub struct GlobMatcher {
    merge: Vec<Pattern>,
    delete: Vec<Pattern>,
}

impl GlobMatcher {
    /// Compile the merge/delete glob lists. An absent list behaves as
    /// empty, per spec §4.5.
    pub fn build(merge_globs: &[String], delete_globs: &[String]) -> Result<Self, OverlayError> {
        Ok(Self {
            merge: compile(merge_globs)?,
            delete: compile(delete_globs)?,
        })
    }

    /// `true` if `pathname` matches any glob in the named policy's list.
    #[must_use]
    pub fn matches(&self, pathname: &str, kind: PolicyKind) -> bool {
        let patterns = match kind {
            PolicyKind::Merge => &self.merge,
            PolicyKind::Delete => &self.delete,
        };
        patterns.iter().any(|p| p.matches(pathname))
    }
}

fn compile(globs: &[String]) -> Result<Vec<Pattern>, OverlayError> {
    globs
        .iter()
        .map(|g| {
            Pattern::new(g).map_err(|e| OverlayError::InvalidGlob {
                pattern: g.clone(),
                detail: e.to_string(),
            })
        })
        .collect()
}
