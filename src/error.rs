use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::Language;

/// Fatal errors that abort a run before any output is produced.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{}:{line}: parse error: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("no definition matches target {requested}")]
    EmptyTarget { requested: String },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no parser registered for {language}")]
    UnsupportedLanguage { language: Language },

    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl EngineError {
    pub fn is_parse(&self) -> bool {
        matches!(self, EngineError::Parse { .. })
    }
}
