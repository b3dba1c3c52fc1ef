use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ignore::WalkBuilder;
use tracing::debug;

use crate::engine::SourceInput;
use crate::model::Language;

/// A discovered source file with its language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub language: Language,
}

impl From<DiscoveredFile> for SourceInput {
    fn from(file: DiscoveredFile) -> Self {
        SourceInput::new(file.path, file.language)
    }
}

/// Configuration for file discovery.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    /// Glob patterns to exclude.
    pub exclude: Vec<String>,
    /// Extension to language overrides, consulted before the built-in table.
    pub languages: BTreeMap<String, Language>,
}

impl DiscoveryConfig {
    pub fn language_for(&self, path: &Path) -> Option<Language> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        self.languages
            .iter()
            .find(|(configured, _)| configured.trim_start_matches('.') == ext)
            .map(|(_, language)| *language)
            .or_else(|| Language::from_extension(ext))
    }
}

/// Default exclude patterns for dependency, cache and build directories.
const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    ".git/",
    // Python
    "__pycache__/", ".venv/", "venv/", ".tox/", "*.egg-info/",
    // JavaScript / TypeScript
    "node_modules/", "dist/", "coverage/",
];

/// Expand `paths` into source files.
///
/// Files are taken as given and must have a known language. Directories are
/// walked recursively, respecting .gitignore, and contribute only files with
/// a known language, sorted by path. Argument order is preserved and
/// duplicates are dropped.
pub fn discover_sources(
    paths: &[PathBuf],
    config: &DiscoveryConfig,
) -> Result<Vec<DiscoveredFile>> {
    let mut files = Vec::new();
    let mut seen = HashSet::new();

    for path in paths {
        if path.is_dir() {
            for file in discover_files(path, config)? {
                if seen.insert(file.path.clone()) {
                    files.push(file);
                }
            }
        } else if path.is_file() {
            let Some(language) = config.language_for(path) else {
                bail!("cannot determine the language of {}", path.display());
            };
            if seen.insert(path.clone()) {
                files.push(DiscoveredFile {
                    path: path.clone(),
                    language,
                });
            }
        } else {
            bail!("no such file or directory: {}", path.display());
        }
    }

    debug!(files = files.len(), "discovered sources");
    Ok(files)
}

/// Discover source files in a directory, respecting .gitignore.
pub fn discover_files(root: &Path, config: &DiscoveryConfig) -> Result<Vec<DiscoveredFile>> {
    let mut files = Vec::new();

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false) // don't skip dot-prefixed dirs entirely (let gitignore decide)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .parents(true);

    let mut overrides = ignore::overrides::OverrideBuilder::new(root);
    for pattern in DEFAULT_EXCLUDE_PATTERNS {
        overrides
            .add(&format!("!{}", pattern))
            .context("invalid default exclude pattern")?;
    }
    for pattern in &config.exclude {
        overrides
            .add(&format!("!{}", pattern))
            .with_context(|| format!("invalid exclude pattern '{}'", pattern))?;
    }
    builder.overrides(overrides.build().context("failed to build overrides")?);

    for entry in builder.build() {
        let entry = entry.context("error reading directory entry")?;

        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let path = entry.path();
        let Some(language) = config.language_for(path) else {
            continue; // skip unsupported files
        };

        files.push(DiscoveredFile {
            path: path.to_path_buf(),
            language,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}
