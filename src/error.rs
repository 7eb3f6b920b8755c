//! Error types for the overlay engine.
//!
//! Defines [`OverlayError`], the unified error type for the orchestrator
//! pipeline. Error messages describe what went wrong and, where there is an
//! obvious fix, how to fix it — the engine has no human operator of its own,
//! but its errors are surfaced verbatim to whatever CLI or service embeds it.

use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// OverlayError
// ---------------------------------------------------------------------------

/// Unified error type for the overlay pipeline (§7).
///
/// All variants are fatal to the run except the two degrade cases the
/// pipeline itself handles without raising: an unparseable template config
/// file falls back to an empty [`crate::config::TemplateConfig`], and an
/// unrecognized archive entry is skipped. Both are logged via
/// `tracing::warn!` at the call site rather than modeled as error variants.
#[derive(Debug)]
pub enum OverlayError {
    /// `project_name` or `template_reference` was missing or empty.
    InvalidInput {
        /// Name of the offending argument.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Origin resolution failed: duplicate origin name, unknown origin id,
    /// or a handler that returned a malformed result.
    Context {
        /// Human-readable description of the contextual failure.
        detail: String,
    },

    /// Fetching a template archive failed or timed out.
    LoaderFailure {
        /// The URL that was being fetched.
        url: String,
        /// Description of the failure (timeout, transport error, non-2xx).
        detail: String,
    },

    /// A glob pattern supplied by a template's `files.merge`/`files.delete`
    /// list failed to compile.
    InvalidGlob {
        /// The glob pattern that failed to compile.
        pattern: String,
        /// Underlying parse error.
        detail: String,
    },

    /// A cleanup callback returned an error.
    CleanupFailed {
        /// Which template (main or `extend:<id>`) registered the callback.
        label: String,
        /// Description of the failure.
        detail: String,
    },

    /// Rendering a single file through the template engine failed. Per
    /// spec.md §7, rendering errors abort the run — there is no per-file
    /// quarantine.
    RenderFailed {
        /// Path of the file being rendered, relative to the template root.
        path: PathBuf,
        /// Description of the failure.
        detail: String,
    },

    /// An I/O error occurred against the virtual tree or an external
    /// archive source.
    Io(std::io::Error),

    /// A JSON template-config file could not be deserialized into the
    /// expected shape. Note: a missing or malformed config file is *not*
    /// itself an error — the pipeline degrades to an empty config for that
    /// case. This variant is for callers that explicitly want strict
    /// parsing (e.g. validating a template author's config ahead of time).
    ConfigParse {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying parse error.
        detail: String,
    },
}

impl fmt::Display for OverlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { field, reason } => {
                write!(f, "invalid input for '{field}': {reason}")
            }
            Self::Context { detail } => write!(f, "{detail}"),
            Self::LoaderFailure { url, detail } => {
                write!(f, "failed to fetch template archive from {url}: {detail}")
            }
            Self::InvalidGlob { pattern, detail } => {
                write!(f, "invalid glob pattern '{pattern}': {detail}")
            }
            Self::CleanupFailed { label, detail } => {
                write!(f, "cleanup callback for '{label}' failed: {detail}")
            }
            Self::RenderFailed { path, detail } => {
                write!(f, "failed to render '{}': {detail}", path.display())
            }
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::ConfigParse { path, detail } => {
                write!(f, "failed to parse template config '{}': {detail}", path.display())
            }
        }
    }
}

impl std::error::Error for OverlayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for OverlayError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for OverlayError {
    fn from(e: serde_json::Error) -> Self {
        Self::ConfigParse {
            path: PathBuf::new(),
            detail: e.to_string(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OverlayError>;
