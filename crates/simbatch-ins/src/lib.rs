pub mod factor;
pub mod normaliser;
pub mod parameter;
pub mod parser;

pub use crate::factor::Factor;
pub use crate::normaliser::{normalise, resolve_imports, NormalisedFile};
pub use crate::parameter::InstructionParameter;
pub use crate::parser::{Block, Item, Line, LineEnding, ParameterOccurrence, ParsedFile, Segment};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum InsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("import cycle: {}", format_chain(chain))]
    ImportCycle { chain: Vec<PathBuf> },
    #[error("cannot interpret '{value}' as {expected}")]
    Value { value: String, expected: String },
    #[error("no block named '{name}'{}", kind.as_ref().map(|kind| format!(" with type '{kind}'")).unwrap_or_default())]
    UnknownBlock { kind: Option<String>, name: String },
    #[error("block name '{name}' is used by several block types: {}", kinds.join(", "))]
    AmbiguousBlock { name: String, kinds: Vec<String> },
    #[error("block {kind} \"{name}\" closes on its header line and cannot take new parameters")]
    InlineBlock { kind: String, name: String },
    #[error("malformed factor name '{name}': expected 'parameter' or 'block.parameter'")]
    MalformedFactorName { name: String },
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("pft '{name}' is not defined in {}", path.display())]
    UnknownPft { name: String, path: PathBuf },
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
