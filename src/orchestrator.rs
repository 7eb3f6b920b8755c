//! The end-to-end overlay run (spec §4.6).
//!
//! `Orchestrator::run` drives every other component through one pass:
//! validate input, resolve the main template's origin, parse its config,
//! ask questions and activate extend templates, render and diff every
//! touched file, merge overlays, resolve conflicts, run cleanups, and
//! emit the finished project as a flat path → text map. Everything it
//! calls is a narrow trait a caller supplies — the orchestrator itself
//! holds no I/O, no templating syntax, and no UI.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::answers::parse_answers;
use crate::block::{to_blocks, MergeBlock};
use crate::cleanup::{self, CleanupCallback};
use crate::config::{Question, TemplateConfig, CONFIG_FILE_NAMES, TEMPLATE_FILE_MARKER};
use crate::diff::diff;
use crate::error::OverlayError;
use crate::glob_matcher::{GlobMatcher, PolicyKind};
use crate::merge::merge;
use crate::origin::{load_archive, Origin, OriginHandler};
use crate::render::TemplateRenderer;
use crate::resolver::{self, ConflictSolver};
use crate::tables::{BinaryTable, CacheTable, MergeTable, PropsTable};
use crate::vtree::VirtualTree;

/// Label for the template driving the run. Every extend gets
/// `"extend:<id>"`.
const MAIN_LABEL: &str = "main";

/// Decodes an origin's raw archive bytes into a flat file listing
/// (relative path, content). Kept separate from [`OriginHandler`] because
/// the archive format (tarball, zip, a plain directory read back as
/// bytes, an in-memory fixture) is a transport concern the engine has no
/// opinion on.
pub trait ArchiveReader {
    fn read(&self, bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>, OverlayError>;
}

/// Supplies answers to a template's declared questions. A real caller
/// prompts a human or reads a non-interactive answers file; tests can
/// supply canned answers.
pub trait TemplatePropsSource {
    fn answer(&mut self, label: &str, questions: &[Question]) -> Result<BTreeMap<String, Value>, OverlayError>;
}

/// Everything one run needs, supplied by the embedding caller.
pub struct RunConfig {
    pub project_name: String,
    pub main_origin: Origin,
    /// Origins for extend templates the main config may activate, keyed
    /// by the id used in `extendTemplates`.
    pub extend_origins: BTreeMap<String, Origin>,
    pub origin_handler: Box<dyn OriginHandler>,
    pub archive_reader: Box<dyn ArchiveReader>,
    pub props_source: Box<dyn TemplatePropsSource>,
    pub renderer: Box<dyn TemplateRenderer>,
    pub conflict_solver: Box<dyn ConflictSolver>,
    /// `(label, callback)` pairs run in order once merging is done.
    pub cleanups: Vec<(String, Box<dyn CleanupCallback>)>,
}

/// What one run produced.
pub struct RunOutcome {
    /// Final emitted project, path (no leading slash) → rendered text.
    pub files: BTreeMap<String, String>,
    /// Paths that still contain at least one unresolved conflict after
    /// the resolver pass (spec §7 `ConflictsRemain`) — callers decide
    /// whether that's fatal.
    pub conflicts: Vec<String>,
    /// The emitted project as a [`VirtualTree`], post-cleanup, for
    /// callers that want to inspect or materialize it directly rather
    /// than walk `files`.
    pub tree: VirtualTree,
}

pub struct Orchestrator;

impl Orchestrator {
    /// Run the full pipeline described in spec §4.6.
    pub fn run(mut config: RunConfig) -> Result<RunOutcome, OverlayError> {
        validate(&config)?;

        let mut tree = VirtualTree::new();
        let mut cache = CacheTable::new();
        let mut props_table = PropsTable::new();

        fetch_into(
            &*config.origin_handler,
            &*config.archive_reader,
            &config.main_origin,
            &mut cache,
            &mut tree,
            &VirtualTree::main_prefix(),
        )?;

        tracing::info!(reference = %config.main_origin.reference, "main template fetched");

        let main_config = load_config(&tree, &VirtualTree::main_prefix());

        let main_questions = main_config.questions_for_label(MAIN_LABEL);
        let main_raw_answers = config.props_source.answer(MAIN_LABEL, main_questions)?;
        let main_parsed = parse_answers(&main_raw_answers, false);
        props_table.insert(MAIN_LABEL, main_parsed.props);

        let mut activated: Vec<String> = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for id in main_parsed.pending_extend_template_labels {
            if seen.insert(id.clone()) {
                activated.push(id);
            }
        }
        if !activated.is_empty() {
            tracing::info!(extends = ?activated, "extend templates activated");
        }

        let mut files_policy_merge: Vec<String> = main_config.files.merge.clone();
        let mut files_policy_delete: Vec<String> = main_config.files.delete.clone();

        for id in &activated {
            let label = format!("extend:{id}");
            let origin = config
                .extend_origins
                .get(id)
                .ok_or_else(|| OverlayError::Context {
                    detail: format!("no origin registered for activated extend template '{id}'"),
                })?
                .clone();

            fetch_into(
                &*config.origin_handler,
                &*config.archive_reader,
                &origin,
                &mut cache,
                &mut tree,
                &VirtualTree::extend_prefix(id),
            )?;

            let Some(extend_cfg) = main_config.extend_templates.get(id) else {
                continue;
            };
            files_policy_merge.extend(extend_cfg.files.merge.iter().cloned());
            files_policy_delete.extend(extend_cfg.files.delete.iter().cloned());

            let raw_answers = config.props_source.answer(&label, &extend_cfg.questions)?;
            let parsed = parse_answers(&raw_answers, true);
            props_table.insert(label, parsed.props);
        }

        let glob_matcher = GlobMatcher::build(&files_policy_merge, &files_policy_delete)?;
        let props = props_table.flatten();

        let labels: Vec<(String, String)> = std::iter::once((MAIN_LABEL.to_owned(), VirtualTree::main_prefix()))
            .chain(activated.iter().map(|id| (format!("extend:{id}"), VirtualTree::extend_prefix(id))))
            .collect();

        let mut merge_table = MergeTable::new();
        let mut binary_table = BinaryTable::new();

        for source_rel in collect_relative_paths(&tree, &labels) {
            let (is_template, output_path) = split_template_marker(&source_rel);

            if glob_matcher.matches(&output_path, PolicyKind::Delete) {
                continue;
            }

            let versions = collect_versions(
                &tree,
                &labels,
                &source_rel,
                is_template,
                &*config.renderer,
                &props,
                &mut binary_table,
                &output_path,
            )?;
            let Some(versions) = versions else {
                continue; // binary: already recorded in binary_table
            };
            if versions.is_empty() {
                continue;
            }

            if glob_matcher.matches(&output_path, PolicyKind::Merge) {
                let (_, baseline_text) = &versions[0];
                let baseline_changes = diff(baseline_text, None);
                let overlay_changes: Vec<_> = versions[1..]
                    .iter()
                    .map(|(_, text)| diff(baseline_text, Some(text)))
                    .collect();
                let merged = merge(&baseline_changes, &overlay_changes);
                tracing::debug!(path = %output_path, overlays = overlay_changes.len(), "merged file");
                merge_table.insert(output_path, to_blocks(&merged));
            } else {
                let (_, winning_text) = versions.last().expect("non-empty");
                merge_table.insert(output_path, to_blocks(&diff(winning_text, None)));
            }
        }

        tracing::info!(files = merge_table.paths().count(), "rendered and merged");

        let conflicts = resolver::run(&mut merge_table, &mut *config.conflict_solver)?;
        if !conflicts.is_empty() {
            tracing::warn!(paths = ?conflicts, "unresolved conflicts remain");
        }

        for path in merge_table.paths().map(str::to_owned).collect::<Vec<_>>() {
            let blocks = merge_table.get(&path).unwrap_or(&[]);
            let text = render_final(blocks);
            tree.write_file(&format!("/{path}"), text.into_bytes());
        }
        for path in binary_table.paths().map(str::to_owned).collect::<Vec<_>>() {
            if let Some(bytes) = binary_table.get(&path) {
                tree.write_file(&format!("/{path}"), bytes.to_vec());
            }
        }

        cleanup::run_all(&mut tree, &mut config.cleanups)?;

        // Built solely from the post-cleanup tree so a cleanup's
        // `delete_files` is reflected — no pre-cleanup entries survive here.
        let mut files = BTreeMap::new();
        for entity in tree.walk("/") {
            if entity.is_directory {
                continue;
            }
            let rel = if entity.relative_directory_path.is_empty() {
                entity.name.clone()
            } else {
                format!("{}/{}", entity.relative_directory_path, entity.name)
            };
            if let Ok(bytes) = tree.read_file(&entity.absolute_path) {
                if !entity.is_binary {
                    files.insert(rel, String::from_utf8_lossy(bytes).into_owned());
                }
            }
        }

        Ok(RunOutcome { files, conflicts, tree })
    }
}

fn validate(config: &RunConfig) -> Result<(), OverlayError> {
    if config.project_name.trim().is_empty() {
        return Err(OverlayError::InvalidInput {
            field: "project_name",
            reason: "must not be empty".to_owned(),
        });
    }
    if config.main_origin.reference.trim().is_empty() {
        return Err(OverlayError::InvalidInput {
            field: "main_origin",
            reason: "template reference must not be empty".to_owned(),
        });
    }
    Ok(())
}

fn fetch_into(
    handler: &dyn OriginHandler,
    reader: &dyn ArchiveReader,
    origin: &Origin,
    cache: &mut CacheTable,
    tree: &mut VirtualTree,
    prefix: &str,
) -> Result<(), OverlayError> {
    let bytes = load_archive(handler, origin, cache)?;
    for (rel, content) in reader.read(&bytes)? {
        tree.write_file(&format!("{prefix}/{rel}"), content);
    }
    Ok(())
}

fn load_config(tree: &VirtualTree, prefix: &str) -> TemplateConfig {
    for name in CONFIG_FILE_NAMES {
        let path = format!("{prefix}/{name}");
        if let Ok(bytes) = tree.read_file(&path) {
            return TemplateConfig::load_or_default(Some(bytes));
        }
    }
    TemplateConfig::load_or_default(None)
}

fn collect_relative_paths(tree: &VirtualTree, labels: &[(String, String)]) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    for (_, prefix) in labels {
        for entity in tree.walk(prefix) {
            if entity.is_directory {
                continue;
            }
            let rel = if entity.relative_directory_path.is_empty() {
                entity.name.clone()
            } else {
                format!("{}/{}", entity.relative_directory_path, entity.name)
            };
            if is_config_or_marker(&rel) {
                continue;
            }
            paths.insert(rel);
        }
    }
    paths
}

fn is_config_or_marker(rel: &str) -> bool {
    CONFIG_FILE_NAMES.contains(&rel)
}

/// Split a source-tree path into "does its basename carry the
/// `__template.` marker" and the output path the emitted project sees —
/// the marker stripped from the basename, directory portion untouched
/// (spec §4.6 step 6).
fn split_template_marker(rel: &str) -> (bool, String) {
    let (dir, name) = match rel.rfind('/') {
        Some(idx) => (&rel[..idx], &rel[idx + 1..]),
        None => ("", rel),
    };
    match name.strip_prefix(TEMPLATE_FILE_MARKER) {
        Some(stripped) => {
            let output = if dir.is_empty() {
                stripped.to_owned()
            } else {
                format!("{dir}/{stripped}")
            };
            (true, output)
        }
        None => (false, rel.to_owned()),
    }
}

/// Collect each label's text for `rel` (the source path, marker intact),
/// in label order, skipping labels that don't have this path. Only
/// renders through `renderer` when `render` is set — spec §4.6 step 6
/// restricts templating substitution to files whose name begins with
/// `__template.`; every other file's text passes through unchanged so
/// literal `<%= ... %>`-shaped content in non-template files survives.
///
/// Returns `None` (and records the winning raw bytes in `binary_table`
/// under `output_path`) when any present version is binary — binary
/// files never enter the render/diff pipeline (spec §4.4, §4.6 step 6).
/// Last writer present wins for binary content.
fn collect_versions(
    tree: &VirtualTree,
    labels: &[(String, String)],
    rel: &str,
    render: bool,
    renderer: &dyn TemplateRenderer,
    props: &BTreeMap<String, Value>,
    binary_table: &mut BinaryTable,
    output_path: &str,
) -> Result<Option<Vec<(String, String)>>, OverlayError> {
    let mut is_binary = false;
    let mut last_bytes: Option<Vec<u8>> = None;
    let mut versions = Vec::new();

    for (label, prefix) in labels {
        let path = format!("{prefix}/{rel}");
        let Ok(bytes) = tree.read_file(&path) else {
            continue;
        };
        if tree.is_binary_at(&path).unwrap_or(false) {
            is_binary = true;
            last_bytes = Some(bytes.to_vec());
            continue;
        }
        let text = String::from_utf8_lossy(bytes).into_owned();
        let rendered = if render {
            renderer.render(&text, props).map_err(|err| OverlayError::RenderFailed {
                path: std::path::PathBuf::from(output_path),
                detail: err.to_string(),
            })?
        } else {
            text
        };
        versions.push((label.clone(), rendered));
    }

    if is_binary {
        if let Some(bytes) = last_bytes {
            binary_table.insert(output_path.to_owned(), bytes);
        }
        return Ok(None);
    }

    Ok(Some(versions))
}

/// Render a path's final blocks to text. Unresolved conflicts — whether
/// still `Undecided` or explicitly left unresolved — keep their fence
/// (spec §4.6 step 11); only a conflict the resolver marked `ignored`
/// collapses to its `current` side (spec §4.7).
fn render_final(blocks: &[MergeBlock]) -> String {
    crate::block::to_text_for_emit(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ErbRenderer;
    use crate::resolver::Verdict;

    struct FixtureHandler;
    impl OriginHandler for FixtureHandler {
        fn resolve(&self, origin: &Origin) -> Result<crate::origin::FetchRequest, OverlayError> {
            Ok(crate::origin::FetchRequest {
                url: origin.reference.clone(),
                headers: Vec::new(),
            })
        }
        fn fetch(&self, request: &crate::origin::FetchRequest) -> Result<Vec<u8>, OverlayError> {
            Ok(request.url.clone().into_bytes())
        }
    }

    /// Looks up a fixed file listing by the "archive bytes" (really just
    /// the origin reference, echoed back by `FixtureHandler::fetch`) —
    /// good enough to drive the pipeline in tests without a real archive
    /// format.
    struct ManifestReader {
        files: BTreeMap<String, Vec<(String, Vec<u8>)>>,
    }
    impl ArchiveReader for ManifestReader {
        fn read(&self, bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>, OverlayError> {
            let key = String::from_utf8_lossy(bytes).into_owned();
            Ok(self.files.get(&key).cloned().unwrap_or_default())
        }
    }

    struct NoQuestions;
    impl TemplatePropsSource for NoQuestions {
        fn answer(&mut self, _label: &str, _questions: &[Question]) -> Result<BTreeMap<String, Value>, OverlayError> {
            Ok(BTreeMap::new())
        }
    }

    struct PreferCurrent;
    impl ConflictSolver for PreferCurrent {
        fn resolve(&mut self, _path: &str, _former: &[String], current: &[String]) -> Result<Verdict, OverlayError> {
            Ok(Verdict::Resolved(current.to_vec()))
        }
    }

    fn base_config(files: BTreeMap<String, Vec<(String, Vec<u8>)>>) -> RunConfig {
        RunConfig {
            project_name: "demo".to_owned(),
            main_origin: Origin::new("main", "main"),
            extend_origins: BTreeMap::new(),
            origin_handler: Box::new(FixtureHandler),
            archive_reader: Box::new(ManifestReader { files }),
            props_source: Box::new(NoQuestions),
            renderer: Box::new(ErbRenderer::default()),
            conflict_solver: Box::new(PreferCurrent),
            cleanups: Vec::new(),
        }
    }

    #[test]
    fn rejects_empty_project_name() {
        let mut cfg = base_config(BTreeMap::new());
        cfg.project_name = String::new();
        let err = Orchestrator::run(cfg).unwrap_err();
        assert!(matches!(err, OverlayError::InvalidInput { field: "project_name", .. }));
    }

    #[test]
    fn marker_prefixed_file_renders_and_strips_its_marker() {
        let mut files = BTreeMap::new();
        files.insert(
            "main".to_owned(),
            vec![("__template.greeting.txt".to_owned(), b"hello <%= name %>\n".to_vec())],
        );
        let mut cfg = base_config(files);
        cfg.project_name = "demo".to_owned();

        struct NameAnswer;
        impl TemplatePropsSource for NameAnswer {
            fn answer(
                &mut self,
                _label: &str,
                _questions: &[Question],
            ) -> Result<BTreeMap<String, Value>, OverlayError> {
                Ok(BTreeMap::from([("name".to_owned(), Value::String("world".to_owned()))]))
            }
        }
        cfg.props_source = Box::new(NameAnswer);

        let outcome = Orchestrator::run(cfg).unwrap();
        assert_eq!(outcome.files.get("greeting.txt").unwrap(), "hello world\n");
        assert!(!outcome.files.contains_key("__template.greeting.txt"));
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn non_template_file_passes_through_without_rendering() {
        let mut files = BTreeMap::new();
        files.insert(
            "main".to_owned(),
            vec![("README.md".to_owned(), b"hello <%= name %>\n".to_vec())],
        );
        let cfg = base_config(files);
        let outcome = Orchestrator::run(cfg).unwrap();
        assert_eq!(outcome.files.get("README.md").unwrap(), "hello <%= name %>\n");
    }

    #[test]
    fn binary_file_passes_through_unrendered() {
        let mut files = BTreeMap::new();
        files.insert(
            "main".to_owned(),
            vec![("logo.png".to_owned(), vec![0u8, 1, 2, 3])],
        );
        let cfg = base_config(files);
        let outcome = Orchestrator::run(cfg).unwrap();
        assert!(!outcome.files.contains_key("logo.png"));
        assert!(outcome.tree.exists("/logo.png"));
        assert_eq!(outcome.tree.read_file("/logo.png").unwrap(), &[0u8, 1, 2, 3]);
    }

    #[test]
    fn unresolved_conflict_emits_with_fence() {
        struct LeaveUndecided;
        impl ConflictSolver for LeaveUndecided {
            fn resolve(&mut self, _path: &str, _former: &[String], _current: &[String]) -> Result<Verdict, OverlayError> {
                Ok(Verdict::Undecided)
            }
        }

        let mut files = BTreeMap::new();
        files.insert(
            "main".to_owned(),
            vec![
                ("a.txt".to_owned(), b"A\nB\n".to_vec()),
                (
                    "template.config.json".to_owned(),
                    br#"{"files": {"merge": ["*.txt"]}}"#.to_vec(),
                ),
            ],
        );
        files.insert(
            "extend:x".to_owned(),
            vec![("a.txt".to_owned(), b"A\nX\nB\n".to_vec())],
        );
        files.insert(
            "extend:y".to_owned(),
            vec![("a.txt".to_owned(), b"A\nY\nB\n".to_vec())],
        );
        let mut cfg = base_config(files);
        cfg.extend_origins = BTreeMap::from([
            ("x".to_owned(), Origin::new("x", "extend:x")),
            ("y".to_owned(), Origin::new("y", "extend:y")),
        ]);
        cfg.conflict_solver = Box::new(LeaveUndecided);

        struct ActivateBoth;
        impl TemplatePropsSource for ActivateBoth {
            fn answer(
                &mut self,
                _label: &str,
                _questions: &[Question],
            ) -> Result<BTreeMap<String, Value>, OverlayError> {
                Ok(BTreeMap::from([
                    ("$EXTEND$x".to_owned(), Value::Bool(true)),
                    ("$EXTEND$y".to_owned(), Value::Bool(true)),
                ]))
            }
        }
        cfg.props_source = Box::new(ActivateBoth);

        let outcome = Orchestrator::run(cfg).unwrap();
        let text = outcome.files.get("a.txt").unwrap();
        assert!(text.contains("<<<<<<< former\n"));
        assert!(text.contains(">>>>>>> current\n"));
        assert_eq!(outcome.conflicts, vec!["a.txt".to_owned()]);
    }

    #[test]
    fn cleanup_deleting_a_merged_file_removes_it_from_outcome() {
        struct DeletesReadme;
        impl CleanupCallback for DeletesReadme {
            fn run(&mut self, _label: &str, ctx: &mut crate::cleanup::CleanupContext<'_>) -> Result<(), OverlayError> {
                ctx.delete_files(&["README.md".to_owned()]);
                Ok(())
            }
        }

        let mut files = BTreeMap::new();
        files.insert(
            "main".to_owned(),
            vec![("README.md".to_owned(), b"hello\n".to_vec())],
        );
        let mut cfg = base_config(files);
        cfg.cleanups = vec![("main".to_owned(), Box::new(DeletesReadme))];

        let outcome = Orchestrator::run(cfg).unwrap();
        assert!(!outcome.files.contains_key("README.md"));
        assert!(!outcome.tree.exists("/README.md"));
    }
}
