use thiserror::Error;
use tree_sitter::{Node, Tree};

use crate::error::EngineError;
use crate::model::{Language, ScopeTree, SourceFile};

pub mod javascript;
pub mod python;

/// A file's text is not valid for its declared language.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

/// Trait for language-specific source adapters.
///
/// Each language walks its own tree-sitter CST and produces a [`ScopeTree`]
/// holding, per scope, the definitions declared directly in it and the call
/// sites appearing directly in it.
pub trait LanguageParser: Send + Sync {
    fn parse(&self, source: &SourceFile) -> Result<ScopeTree, ParseError>;

    /// Which languages does this parser handle?
    fn supported_languages(&self) -> &[Language];
}

/// Registry of language parsers.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn LanguageParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Create a registry with all built-in parsers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(python::PythonParser::new()));
        registry.register(Box::new(javascript::JavaScriptParser::new()));
        registry
    }

    pub fn register(&mut self, parser: Box<dyn LanguageParser>) {
        self.parsers.push(parser);
    }

    /// Find a parser that supports the given language.
    pub fn parser_for(&self, language: Language) -> Option<&dyn LanguageParser> {
        self.parsers
            .iter()
            .find(|p| p.supported_languages().contains(&language))
            .map(|p| p.as_ref())
    }

    /// Parse a source file using the appropriate language parser.
    pub fn parse(&self, source: &SourceFile) -> Result<ScopeTree, EngineError> {
        let parser = self
            .parser_for(source.language)
            .ok_or(EngineError::UnsupportedLanguage {
                language: source.language,
            })?;
        parser.parse(source).map_err(|e| EngineError::Parse {
            path: source.path.clone(),
            line: e.line,
            message: e.message,
        })
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Reject trees where tree-sitter had to recover from invalid syntax.
pub(crate) fn check_syntax(tree: &Tree) -> Result<(), ParseError> {
    let root = tree.root_node();
    if !root.has_error() {
        return Ok(());
    }
    let node = first_error(root).unwrap_or(root);
    let message = if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else {
        "invalid syntax".to_string()
    };
    Err(ParseError {
        line: node.start_position().row + 1,
        message,
    })
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(found) = first_error(child) {
                return Some(found);
            }
        }
    }
    None
}
