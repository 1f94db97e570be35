//! # Quire
//!
//! A fragmentation-aware document layout engine.
//!
//! Most layout engines treat a document as an endlessly tall canvas and
//! slice it into pages at the very end. The slice points land mid-line,
//! mid-row and mid-flex-item, and everything downstream fights the damage.
//!
//! Quire takes the opposite stance: **the page boundary is a first-class
//! layout constraint.** Every block, line box, flex line and column is
//! placed knowing exactly how much of the current page (or column) is
//! left. Content that does not fit is not clipped; layout returns a
//! continuation token, the sequencer opens the next page, and the content
//! flows on, honoring forced breaks, `break-inside: avoid`, orphans and
//! widows along the way.
//!
//! ## Pipeline
//!
//! ```text
//! Styled element tree (cascade already resolved, upstream)
//!       ↓
//!   [layout]   — box tree, block/inline/flex/multicolumn layout
//!   [text]     — line breaking, bidi, justification
//!   [measure]  — font metrics behind the TextMeasure trait
//!       ↓
//!   [page]     — page sequencing, @page rules, margin boxes, counters
//!       ↓
//!   Vec<Page>  — absolute geometry, ready for a painting backend
//! ```
//!
//! Text shaping, style cascade, image decoding and final painting are the
//! caller's business; the engine consumes measurements through the
//! [`measure::TextMeasure`] trait and produces positioned fragments.

pub mod counters;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod measure;
pub mod model;
pub mod page;
pub mod style;
pub mod text;

pub use error::LayoutError;
pub use measure::{CharGrid, FontMeasure, TextMeasure};
pub use page::{paginate, Page};

use model::Document;

/// Lay out a document described as JSON.
///
/// Convenience wrapper over [`paginate`] for callers holding serialized
/// documents.
pub fn paginate_json(json: &str, measure: &dyn TextMeasure) -> Result<Vec<Page>, LayoutError> {
    let document: Document = serde_json::from_str(json)?;
    Ok(paginate(&document, measure))
}
