pub mod analysis;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod resolver;
pub mod symbols;

pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use engine::{Engine, RunOptions, RunReport, SourceInput};
pub use error::EngineError;
pub use model::graph::{CallGraph, Direction};
