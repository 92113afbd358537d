//! Error taxonomy for the report engine.
//!
//! Only structurally fatal conditions surface here: malformed input XML,
//! broken style declarations, non-numeric attributes, and layout states the
//! engine cannot make progress on. Recoverable conditions (unknown style
//! keys, missing object ids, unsatisfiable span heights) are absorbed at
//! the point of detection and reported through `log`.

use thiserror::Error;

/// Fatal failure raised while parsing or building a document.
#[derive(Error, Debug)]
pub enum Error {
    /// The input XML is structurally broken (unclosed or mismatched tags,
    /// truncated markup). Carries the byte offset and a short description.
    #[error("xml parse error at byte {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// A style declaration could not be interpreted, e.g. a `key:value`
    /// pair missing its `:` separator.
    #[error("invalid style declaration {declaration:?}: {message}")]
    Style {
        declaration: String,
        message: String,
    },

    /// A required attribute failed to parse (usually a non-numeric value
    /// where a number is expected).
    #[error("attribute {name}={value:?}: invalid value")]
    Attribute { name: String, value: String },

    /// The document cannot be laid out: a flowable is wider than its cell
    /// with bounds errors disallowed, or a table can never legally split
    /// into the available page space.
    #[error("layout error: {0}")]
    Layout(String),

    /// PDF emission failed.
    #[error("render error: {0}")]
    Render(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
