//! Post-merge cleanup callbacks — the `CleanupRunner` component (spec
//! §4.8).
//!
//! After conflicts are resolved and the merged result has been written
//! into the output tree, each activated template (main plus every
//! extend, in activation order) gets one last chance to add, delete, or
//! inspect files in that *emitted* project through a narrow
//! [`CleanupContext`] — not in its own template source tree, which by
//! this point has already served its purpose. This is where a port's
//! "postpone" step would run project-generation glue that isn't
//! expressible as a plain merge, e.g. stripping a scaffold marker file or
//! writing a computed lockfile. `label` is carried through purely for
//! error attribution (spec §7 `CleanupFailed`).

use crate::error::OverlayError;
use crate::vtree::VirtualTree;

/// The surface a [`CleanupCallback`] is allowed to touch: the emitted
/// project tree, rooted at `/`.
pub struct CleanupContext<'a> {
    tree: &'a mut VirtualTree,
}

impl<'a> CleanupContext<'a> {
    #[must_use]
    pub fn new(tree: &'a mut VirtualTree) -> Self {
        Self { tree }
    }

    fn scoped(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_owned()
        } else {
            format!("/{path}")
        }
    }

    /// Write a text file, creating parent directories as needed.
    pub fn add_file(&mut self, path: &str, content: &str) {
        let full = self.scoped(path);
        self.tree.write_file(&full, content.as_bytes().to_vec());
    }

    /// Write a binary file, creating parent directories as needed.
    pub fn add_binary_file(&mut self, path: &str, bytes: Vec<u8>) {
        let full = self.scoped(path);
        self.tree.write_file(&full, bytes);
    }

    /// Remove every path matching `paths` from the tree. Missing paths are
    /// silently ignored — a cleanup asking to delete something already
    /// gone is not an error.
    pub fn delete_files(&mut self, paths: &[String]) {
        for path in paths {
            let full = self.scoped(path);
            self.tree.remove(&full);
        }
    }

    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.tree.exists(&self.scoped(path))
    }

    #[must_use]
    pub fn get_text_file_content(&self, path: &str) -> Option<String> {
        let full = self.scoped(path);
        self.tree
            .read_file(&full)
            .ok()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    #[must_use]
    pub fn get_binary_file_buffer(&self, path: &str) -> Option<Vec<u8>> {
        let full = self.scoped(path);
        self.tree.read_file(&full).ok().map(<[u8]>::to_vec)
    }
}

/// One template's post-merge hook.
pub trait CleanupCallback {
    /// `label` identifies which template registered this callback
    /// (`"main"` or `"extend:<id>"`) — forwarded into any error so a
    /// caller can tell which template's cleanup failed.
    fn run(&mut self, label: &str, ctx: &mut CleanupContext<'_>) -> Result<(), OverlayError>;
}

/// Run every registered `(label, callback)` pair in order against the
/// emitted project tree. Stops at the first failure — spec §7 treats a
/// cleanup failure as fatal to the run, not a per-template quarantine.
pub fn run_all(
    tree: &mut VirtualTree,
    callbacks: &mut [(String, Box<dyn CleanupCallback>)],
) -> Result<(), OverlayError> {
    for (label, callback) in callbacks.iter_mut() {
        let mut ctx = CleanupContext::new(tree);
        callback.run(label, &mut ctx).map_err(|err| OverlayError::CleanupFailed {
            label: label.clone(),
            detail: err.to_string(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AddsMarker;
    impl CleanupCallback for AddsMarker {
        fn run(&mut self, _label: &str, ctx: &mut CleanupContext<'_>) -> Result<(), OverlayError> {
            ctx.add_file("MARKER", "done\n");
            Ok(())
        }
    }

    struct AlwaysFails;
    impl CleanupCallback for AlwaysFails {
        fn run(&mut self, _label: &str, _ctx: &mut CleanupContext<'_>) -> Result<(), OverlayError> {
            Err(OverlayError::Context {
                detail: "boom".to_owned(),
            })
        }
    }

    #[test]
    fn callback_writes_into_emitted_project_root() {
        let mut tree = VirtualTree::new();
        let mut callbacks: Vec<(String, Box<dyn CleanupCallback>)> =
            vec![("main".to_owned(), Box::new(AddsMarker))];
        run_all(&mut tree, &mut callbacks).unwrap();
        assert!(tree.exists("/MARKER"));
    }

    #[test]
    fn extend_callback_writes_into_same_emitted_root() {
        let mut tree = VirtualTree::new();
        let mut callbacks: Vec<(String, Box<dyn CleanupCallback>)> =
            vec![("extend:docker".to_owned(), Box::new(AddsMarker))];
        run_all(&mut tree, &mut callbacks).unwrap();
        assert!(tree.exists("/MARKER"));
    }

    #[test]
    fn failing_callback_becomes_cleanup_failed() {
        let mut tree = VirtualTree::new();
        let mut callbacks: Vec<(String, Box<dyn CleanupCallback>)> =
            vec![("main".to_owned(), Box::new(AlwaysFails))];
        let err = run_all(&mut tree, &mut callbacks).unwrap_err();
        assert!(matches!(err, OverlayError::CleanupFailed { label, .. } if label == "main"));
    }
}
