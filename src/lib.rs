//! # pdf-loom – XML report engine with table pagination
//!
//! This crate renders structured report documents (tables, paragraphs,
//! images, spacers) described in a custom XML dialect into paginated PDF
//! output. The pipeline stages are:
//!
//! 1. **Parse** – XML string → DOM tree ([`dom`])
//! 2. **Build** – rows, style commands, variables ([`row`], [`style`], [`table`])
//! 3. **Measure** – resolve row heights at known column widths ([`measure`])
//! 4. **Paginate** – fill page frames, splitting tables on overflow
//!    ([`paginate`], [`split`])
//! 5. **Render** – emit PDF bytes via printpdf ([`render`])
//!
//! The heart of the crate is the split-point engine ([`split`]): given the
//! vertical space left on a page it finds the latest legal row boundary
//! (respecting spans, keep blocks, header/footer reservations and blank-row
//! rules) and materialises two structurally valid sub-tables with every
//! border, span and style command re-derived for the new row numbering.

pub mod dom;
pub mod error;
pub mod flowable;
pub mod fonts;
pub mod layout_config;
pub mod measure;
pub mod paginate;
pub mod paragraph;
pub mod pipeline;
pub mod render;
pub mod row;
pub mod split;
pub mod style;
pub mod table;
pub mod templates;

// Re-exports for convenience
pub use error::Error;
pub use pipeline::{compute_layout_config, generate_pdf, PipelineConfig};
