//! Template-declared configuration (spec §4.6, §6).
//!
//! A template's root directory may carry a config file naming its
//! questions, its extend templates, and its file policies. Config files are
//! JSON; a missing or malformed file degrades to an empty [`TemplateConfig`]
//! rather than aborting the run (spec §7, `TemplateFailure`).
//!
//! Per spec §9's own allowance ("a port may restrict to JSON config and
//! drop script support"), the sandboxed script-config path is not
//! implemented here — see DESIGN.md for the Open Question resolution.
//! Cleanup callbacks are therefore not declared inside the config file
//! (functions aren't JSON data); callers register them out-of-band via
//! [`crate::orchestrator::RunConfig::cleanups`], keyed by template label.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::OverlayError;

/// Config file names recognized at a template's root, in lookup order. The
/// first one present wins (spec §4.6 step 3).
pub const CONFIG_FILE_NAMES: &[&str] = &["template.config.json", "overlay.config.json"];

/// Prefix stripped from a rendered file's output name (spec §4.6 step 6,
/// §6 "Template archive layout").
pub const TEMPLATE_FILE_MARKER: &str = "__template.";

// ---------------------------------------------------------------------------
// Question
// ---------------------------------------------------------------------------

/// One prompt shown to the user via `TemplatePropsSource` (spec §4.6 step
/// 4). A question whose `name` starts with `$EXTEND$` routes its answer to
/// pending extend-template activation rather than to `props` — see
/// [`crate::answers::parse_answers`].
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Question {
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// FilesPolicy
// ---------------------------------------------------------------------------

/// A template's declared `merge`/`delete` glob lists (spec §4.5, §6).
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilesPolicy {
    pub merge: Vec<String>,
    pub delete: Vec<String>,
}

// ---------------------------------------------------------------------------
// ExtendTemplateConfig
// ---------------------------------------------------------------------------

/// A single entry in `extendTemplates` — what an activated extend template
/// contributes once its id is enqueued.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtendTemplateConfig {
    pub questions: Vec<Question>,
    pub files: FilesPolicy,
}

// ---------------------------------------------------------------------------
// TemplateConfig
// ---------------------------------------------------------------------------

/// Parsed `template.config.json` (or equivalent) at a template's root.
///
/// Missing fields default to empty — a template with no config file at all
/// is equivalent to `TemplateConfig::default()`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemplateConfig {
    pub questions: Vec<Question>,
    pub extend_templates: BTreeMap<String, ExtendTemplateConfig>,
    pub files: FilesPolicy,
}

impl TemplateConfig {
    /// Parse a config file's raw bytes as JSON. Returns the parse error
    /// rather than degrading — callers that want the non-fatal "missing or
    /// malformed config degrades to empty" behavior of spec §7 should use
    /// [`Self::load_or_default`] instead.
    pub fn parse(bytes: &[u8]) -> Result<Self, OverlayError> {
        serde_json::from_slice(bytes).map_err(|e| OverlayError::ConfigParse {
            path: std::path::PathBuf::new(),
            detail: e.to_string(),
        })
    }

    /// Parse `bytes` if present, degrading to an empty config (and logging
    /// a warning) on `None` or a parse failure. This is what the
    /// orchestrator's pipeline step 3 actually calls.
    #[must_use]
    pub fn load_or_default(bytes: Option<&[u8]>) -> Self {
        match bytes {
            None => Self::default(),
            Some(bytes) => Self::parse(bytes).unwrap_or_else(|err| {
                tracing::warn!(%err, "template config failed to parse; using defaults");
                Self::default()
            }),
        }
    }

    /// Questions to ask for the given template label, per spec §9's Open
    /// Question resolution: "main label queries `main.questions`; extend
    /// label queries `extendTemplates.<id>.questions`" (this is the
    /// canonical branch; there is no divergent variant in this port).
    #[must_use]
    pub fn questions_for_label(&self, label: &str) -> &[Question] {
        if label == "main" {
            &self.questions
        } else if let Some(id) = label.strip_prefix("extend:") {
            self.extend_templates
                .get(id)
                .map_or(&[], |cfg| cfg.questions.as_slice())
        } else {
            &[]
        }
    }
}
