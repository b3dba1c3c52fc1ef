use std::path::PathBuf;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analysis::subset::filter_graph;
use crate::analysis::tasks::{task_view, TaskSummary};
use crate::analysis::{build_graph, ResolutionSummary};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::EngineError;
use crate::model::graph::{CallGraph, Direction};
use crate::model::{Language, ScopeTree, SourceFile};
use crate::parser::ParserRegistry;
use crate::resolver::CallResolver;
use crate::symbols::SymbolTable;

/// Options controlling one run of the pipeline.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Downgrade parse failures to diagnostics and keep going.
    pub skip_parse_errors: bool,
    /// Suppress informational progress logging.
    pub quiet: bool,
    /// Qualified-name fragments to filter the graph around. Empty keeps everything.
    pub target_names: Vec<String>,
    pub direction: Direction,
    pub max_depth: Option<usize>,
    /// Attribute module-level calls to a synthetic `<module>` node per file.
    pub include_module_scope: bool,
    /// Reduce the graph to registered tasks and the calls between them.
    pub tasks_only: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            skip_parse_errors: false,
            quiet: false,
            target_names: Vec::new(),
            direction: Direction::Both,
            max_depth: None,
            include_module_scope: false,
            tasks_only: false,
        }
    }
}

/// A file to analyze, already tagged with its language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInput {
    pub path: PathBuf,
    pub language: Language,
}

impl SourceInput {
    pub fn new(path: impl Into<PathBuf>, language: Language) -> Self {
        Self {
            path: path.into(),
            language,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub files: usize,
    pub files_parsed: usize,
    pub files_skipped: usize,
    pub definitions: usize,
    pub calls: usize,
    /// Module-level calls dropped because no module node was requested.
    pub dropped_calls: usize,
    pub resolution: ResolutionSummary,
    /// Filled in when the task view was requested.
    pub tasks: Option<TaskSummary>,
    pub nodes: usize,
    pub edges: usize,
    pub duration_ms: u128,
}

/// Everything a successful run produces.
#[derive(Debug)]
pub struct RunReport {
    pub graph: CallGraph,
    pub diagnostics: Diagnostics,
    pub stats: RunStats,
}

/// Pipeline driver: parse, index, resolve, assemble, filter.
pub struct Engine {
    options: RunOptions,
    registry: ParserRegistry,
}

impl Engine {
    pub fn new(options: RunOptions) -> Self {
        Self::with_registry(options, ParserRegistry::with_defaults())
    }

    pub fn with_registry(options: RunOptions, registry: ParserRegistry) -> Self {
        Self { options, registry }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Read and analyze files from disk. Files are read and parsed in
    /// parallel; a file that cannot be read aborts the run.
    pub fn run(&self, inputs: &[SourceInput]) -> Result<RunReport, EngineError> {
        let start = Instant::now();
        if !self.options.quiet {
            info!(files = inputs.len(), "parsing sources");
        }

        let parsed: Vec<Result<ScopeTree, EngineError>> = inputs
            .par_iter()
            .map(|input| {
                let source = load_source(input)?;
                self.registry.parse(&source)
            })
            .collect();

        self.analyze(parsed, start)
    }

    /// Analyze sources already held in memory.
    pub fn run_sources(&self, sources: &[SourceFile]) -> Result<RunReport, EngineError> {
        let start = Instant::now();
        let parsed: Vec<Result<ScopeTree, EngineError>> = sources
            .par_iter()
            .map(|source| self.registry.parse(source))
            .collect();
        self.analyze(parsed, start)
    }

    fn analyze(
        &self,
        parsed: Vec<Result<ScopeTree, EngineError>>,
        start: Instant,
    ) -> Result<RunReport, EngineError> {
        let mut diagnostics = Diagnostics::new();
        let mut stats = RunStats {
            files: parsed.len(),
            ..Default::default()
        };

        // Input order, so the first failing file is the one reported
        let mut trees = Vec::with_capacity(parsed.len());
        for result in parsed {
            match result {
                Ok(tree) => trees.push(tree),
                Err(EngineError::Parse {
                    path,
                    line,
                    message,
                }) if self.options.skip_parse_errors => {
                    debug!(file = %path.display(), line, "skipping unparsable file");
                    stats.files_skipped += 1;
                    diagnostics.report(
                        DiagnosticKind::SkippedFile,
                        path.clone(),
                        line,
                        path.display().to_string(),
                        format!("skipped {}: {}", path.display(), message),
                    );
                }
                Err(e) => return Err(e),
            }
        }
        stats.files_parsed = trees.len();

        let symbols =
            SymbolTable::build(trees, self.options.include_module_scope, &mut diagnostics);
        stats.definitions = symbols.definition_count();
        stats.calls = symbols.calls().len();
        stats.dropped_calls = symbols.dropped_calls();
        if !self.options.quiet {
            info!(
                files = stats.files_parsed,
                definitions = stats.definitions,
                calls = stats.calls,
                tasks = symbols.task_count(),
                "built symbol table"
            );
        }

        let reports = CallResolver::new(&symbols).resolve_all();
        let (mut graph, resolution) = build_graph(&symbols, &reports, &mut diagnostics);
        stats.resolution = resolution;
        if !self.options.quiet {
            info!(
                nodes = graph.node_count(),
                edges = graph.edge_count(),
                ambiguous = resolution.ambiguous,
                unresolved = resolution.unresolved,
                "assembled call graph"
            );
        }

        if self.options.tasks_only {
            let (view, summary) = task_view(&graph);
            if summary.tasks == 0 {
                warn!("no registered tasks found");
            } else if !self.options.quiet {
                info!(
                    tasks = summary.tasks,
                    direct = summary.direct,
                    possible = summary.possible,
                    "reduced to task calls"
                );
            }
            graph = view;
            stats.tasks = Some(summary);
        }

        if !self.options.target_names.is_empty() {
            graph = filter_graph(
                &graph,
                &self.options.target_names,
                self.options.direction,
                self.options.max_depth,
            )?;
            if !self.options.quiet {
                info!(
                    nodes = graph.node_count(),
                    edges = graph.edge_count(),
                    direction = %self.options.direction,
                    "filtered to targets"
                );
            }
        }

        stats.nodes = graph.node_count();
        stats.edges = graph.edge_count();
        stats.duration_ms = start.elapsed().as_millis();

        Ok(RunReport {
            graph,
            diagnostics,
            stats,
        })
    }
}

fn load_source(input: &SourceInput) -> Result<SourceFile, EngineError> {
    let bytes = std::fs::read(&input.path).map_err(|source| EngineError::Io {
        path: input.path.clone(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|e| {
        let valid = &e.as_bytes()[..e.utf8_error().valid_up_to()];
        EngineError::Parse {
            path: input.path.clone(),
            line: valid.iter().filter(|&&b| b == b'\n').count() + 1,
            message: "file is not valid UTF-8".to_string(),
        }
    })?;
    Ok(SourceFile::new(input.path.clone(), text, input.language))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn py(path: &str, text: &str) -> SourceFile {
        SourceFile::new(path, text, Language::Python)
    }

    fn names(report: &RunReport) -> Vec<String> {
        report
            .graph
            .nodes()
            .map(|d| d.qualified_name.clone())
            .collect()
    }

    #[test]
    fn test_mixed_languages_in_one_graph() {
        let engine = Engine::new(RunOptions::default());
        let report = engine
            .run_sources(&[
                py("jobs.py", "def nightly():\n    cleanup()\n\ndef cleanup():\n    pass\n"),
                SourceFile::new(
                    "web.js",
                    "function render() { format(); }\nfunction format() {}\n",
                    Language::JavaScript,
                ),
            ])
            .unwrap();

        assert_eq!(
            names(&report),
            vec!["jobs.nightly", "jobs.cleanup", "web.render", "web.format"]
        );
        assert_eq!(report.stats.edges, 2);
        assert_eq!(report.stats.files_parsed, 2);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_parse_error_aborts_by_default() {
        let engine = Engine::new(RunOptions::default());
        let err = engine
            .run_sources(&[py("ok.py", "def f():\n    pass\n"), py("bad.py", "def (:\n")])
            .unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_skip_parse_errors_records_diagnostic() {
        let engine = Engine::new(RunOptions {
            skip_parse_errors: true,
            ..Default::default()
        });
        let report = engine
            .run_sources(&[py("ok.py", "def f():\n    pass\n"), py("bad.py", "def (:\n")])
            .unwrap();

        assert_eq!(names(&report), vec!["ok.f"]);
        assert_eq!(report.stats.files_skipped, 1);
        let skipped: Vec<_> = report.diagnostics.of_kind(DiagnosticKind::SkippedFile).collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].file, PathBuf::from("bad.py"));
    }

    #[test]
    fn test_target_filter_applies() {
        let engine = Engine::new(RunOptions {
            target_names: vec!["b".to_string()],
            direction: Direction::Downstream,
            ..Default::default()
        });
        let report = engine
            .run_sources(&[py(
                "chain.py",
                "def a():\n    b()\n\ndef b():\n    c()\n\ndef c():\n    pass\n",
            )])
            .unwrap();
        assert_eq!(names(&report), vec!["chain.b", "chain.c"]);
        assert_eq!(report.stats.nodes, 2);
        assert_eq!(report.stats.edges, 1);
    }

    #[test]
    fn test_tasks_only_keeps_registered_tasks() {
        let engine = Engine::new(RunOptions {
            tasks_only: true,
            ..Default::default()
        });
        let report = engine
            .run_sources(&[py(
                "worker.py",
                "class Sync:\n    def execute(self, task):\n        push(task)\n\n\
                 def push(task):\n    notify(task)\n\n\
                 def notify(task):\n    pass\n\n\
                 def start(cc):\n    Sync.register(cc)\n    cc.register(\"notify\", {}, notify)\n",
            )])
            .unwrap();

        assert_eq!(names(&report), vec!["worker.Sync.execute", "worker.notify"]);
        let edges: Vec<_> = report.graph.edges().collect();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].possible);
        assert_eq!(
            report.stats.tasks,
            Some(TaskSummary {
                tasks: 2,
                direct: 0,
                possible: 1,
            })
        );
    }

    #[test]
    fn test_empty_target_is_fatal() {
        let engine = Engine::new(RunOptions {
            target_names: vec!["missing".to_string()],
            ..Default::default()
        });
        let err = engine
            .run_sources(&[py("a.py", "def a():\n    pass\n")])
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyTarget { .. }));
    }

    #[test]
    fn test_run_reads_files_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.py");
        fs::write(&path, "def build():\n    test()\n\ndef test():\n    pass\n").unwrap();

        let engine = Engine::new(RunOptions::default());
        let report = engine
            .run(&[SourceInput::new(&path, Language::Python)])
            .unwrap();
        assert_eq!(report.graph.edge_count(), 1);
        assert_eq!(report.graph.nodes().next().unwrap().file, path);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::new(RunOptions {
            skip_parse_errors: true,
            ..Default::default()
        });
        let err = engine
            .run(&[SourceInput::new(dir.path().join("gone.py"), Language::Python)])
            .unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }

    #[test]
    fn test_invalid_utf8_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.py");
        fs::write(&path, b"def f():\n    s = '\xe9'\n").unwrap();

        let engine = Engine::new(RunOptions::default());
        match engine.run(&[SourceInput::new(&path, Language::Python)]).unwrap_err() {
            EngineError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
