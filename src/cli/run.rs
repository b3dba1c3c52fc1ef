use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::Cli;
use crate::config::CallflowConfig;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::discovery::discover_sources;
use crate::engine::{Engine, RunOptions, RunReport, SourceInput};

/// Discover the requested sources and run the pipeline over them.
pub fn execute(cli: &Cli, config: &CallflowConfig, options: RunOptions) -> Result<RunReport> {
    let discovery = config.discovery_config(&cli.exclude);
    let files = discover_sources(&cli.paths, &discovery).context("failed to discover sources")?;
    if files.is_empty() {
        warn!("no Python, JavaScript or TypeScript sources found");
    }

    let inputs: Vec<SourceInput> = files.into_iter().map(SourceInput::from).collect();
    let quiet = options.quiet;
    let report = Engine::new(options).run(&inputs)?;

    if !quiet {
        info!(
            files = report.stats.files_parsed,
            skipped = report.stats.files_skipped,
            nodes = report.stats.nodes,
            edges = report.stats.edges,
            duration_ms = report.stats.duration_ms as u64,
            "done"
        );
    }
    Ok(report)
}

/// Render diagnostics, one per line. Unresolved calls are summarised unless
/// `verbose` is set.
pub fn write_diagnostics<W: Write>(
    out: &mut W,
    diagnostics: &Diagnostics,
    verbose: bool,
    quiet: bool,
) -> io::Result<()> {
    for diagnostic in diagnostics.iter() {
        if diagnostic.kind == DiagnosticKind::UnresolvedCall && !verbose {
            continue;
        }
        writeln!(out, "{}", diagnostic)?;
    }

    let unresolved = diagnostics.count(DiagnosticKind::UnresolvedCall);
    if unresolved > 0 && !verbose && !quiet {
        writeln!(
            out,
            "note: {} unresolved call{} (use --verbose to list them)",
            unresolved,
            if unresolved == 1 { "" } else { "s" }
        )?;
    }
    Ok(())
}
