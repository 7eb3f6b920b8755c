//! Template rendering — substitutes props into a file's raw text before it
//! enters the diff/merge pipeline (spec §4.6 step 6).
//!
//! The substitution syntax itself is an external contract a real port can
//! swap out (spec §9: "the templating syntax is not this engine's
//! concern"); [`TemplateRenderer`] exists so a caller can plug in whatever
//! engine their templates were authored against. [`ErbRenderer`] is the
//! default: a minimal ERB-style `<%= name %>` interpolator, adequate for
//! the scenarios in spec §8 and for testing the rest of the pipeline
//! without pulling in a full template-language dependency.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;

use crate::error::OverlayError;

/// Renders a file's raw text against a props map.
///
/// Implementors decide what syntax they recognize; the pipeline only
/// requires that unknown/missing props be handled without panicking.
pub trait TemplateRenderer {
    /// Render `source` against `props`. Binary files never reach this
    /// trait — the orchestrator skips rendering for anything
    /// `VirtualTree`'s binary heuristic flags (spec §4.4, §4.6 step 6).
    fn render(&self, source: &str, props: &BTreeMap<String, Value>) -> Result<String, OverlayError>;
}

/// Default `<%= name %>` interpolator.
///
/// `name` may contain letters, digits, `_`, and `.` (for nested access via
/// dotted paths, e.g. `<%= pkg.name %>`). A placeholder whose name is
/// absent from `props` renders as an empty string rather than erroring —
/// templates commonly declare optional fields a given run never answers.
pub struct ErbRenderer {
    pattern: Regex,
}

impl ErbRenderer {
    /// Build a renderer. The regex is fixed and always compiles; this
    /// can't fail in practice but returns `Result` to keep the
    /// constructor honest about doing real work.
    pub fn new() -> Result<Self, OverlayError> {
        let pattern = Regex::new(r"<%=\s*([A-Za-z0-9_.]+)\s*%>").map_err(|e| OverlayError::RenderFailed {
            path: std::path::PathBuf::new(),
            detail: e.to_string(),
        })?;
        Ok(Self { pattern })
    }

    fn lookup<'a>(props: &'a BTreeMap<String, Value>, name: &str) -> Option<&'a Value> {
        let mut parts = name.split('.');
        let first = parts.next()?;
        let mut current = props.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    fn stringify(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl Default for ErbRenderer {
    fn default() -> Self {
        Self::new().expect("fixed interpolation pattern always compiles")
    }
}

impl TemplateRenderer for ErbRenderer {
    fn render(&self, source: &str, props: &BTreeMap<String, Value>) -> Result<String, OverlayError> {
        let mut out = String::with_capacity(source.len());
        let mut last_end = 0;
        for caps in self.pattern.captures_iter(source) {
            let whole = caps.get(0).unwrap();
            out.push_str(&source[last_end..whole.start()]);
            let name = &caps[1];
            let rendered = Self::lookup(props, name).map_or_else(String::new, Self::stringify);
            out.push_str(&rendered);
            last_end = whole.end();
        }
        out.push_str(&source[last_end..]);
        Ok(out)
    }
}
