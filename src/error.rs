//! Error types for the input surface.
//!
//! Layout itself never fails: unsatisfiable constraints degrade (forced
//! breaks, clamped sizes, overflow) instead of erroring. The variants here
//! cover the places where callers hand us data we cannot interpret.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LayoutError {
    /// A registered font face could not be parsed.
    #[error("failed to parse font face for family {family:?}")]
    BadFontData { family: String },

    /// JSON input failed to deserialize as a document.
    #[error("failed to parse document: {0}")]
    Parse(#[from] serde_json::Error),
}
