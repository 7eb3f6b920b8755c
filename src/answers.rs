//! Answer parsing — routes a question batch's raw answers into template
//! props vs. pending extend-template activations (spec §4.6 step 4, §6).
//!
//! A question named `$EXTEND$<id>` is a meta-question: its answer, if
//! truthy, activates the extend template `<id>` rather than contributing a
//! prop. Every other answer becomes a prop under its (possibly
//! disambiguated) question name.
//!
//! Per spec §9's design note, question names are disambiguated across
//! labels with a monotonic counter, not randomness — "a counter suffices,
//! no RNG required".

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

const EXTEND_PREFIX: &str = "$EXTEND$";

static POSTFIX_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Result of routing one label's raw answers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedAnswers {
    /// Non-`$EXTEND$` answers, keyed by (possibly postfixed) question name.
    pub props: BTreeMap<String, Value>,
    /// Extend template ids this batch of answers activates, in the order
    /// their questions appeared.
    pub pending_extend_template_labels: Vec<String>,
}

/// A truthy answer activates the extend template named after `$EXTEND$`.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_none_or(|f| f != 0.0),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Disambiguate a question name across labels by appending a run-unique
/// counter suffix. Only applied when `uniquify` is requested by the
/// caller (the main label's own question names need no postfix — see
/// [`parse_answers`]).
fn postfixed(name: &str) -> String {
    let n = POSTFIX_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{name}#{n}")
}

/// Route one label's raw question answers into props and pending extend
/// activations.
///
/// `raw_answers` is keyed by the question's original `name` (as declared in
/// `questions`, before any disambiguation). `uniquify_props` controls
/// whether non-extend prop names get a counter postfix — the orchestrator
/// passes `true` for every label after the first so that same-named
/// questions across main and multiple extends don't collide in the merged
/// props map (spec §6: "To keep question names unique across extends,
/// `answersParser` appends a random postfix to matching names during
/// parsing").
#[must_use]
pub fn parse_answers(raw_answers: &BTreeMap<String, Value>, uniquify_props: bool) -> ParsedAnswers {
    let mut parsed = ParsedAnswers::default();

    for (name, value) in raw_answers {
        if let Some(id) = name.strip_prefix(EXTEND_PREFIX) {
            if is_truthy(value) {
                parsed.pending_extend_template_labels.push(id.to_owned());
            }
            continue;
        }

        let key = if uniquify_props {
            postfixed(name)
        } else {
            name.clone()
        };
        parsed.props.insert(key, value.clone());
    }

    parsed
}
