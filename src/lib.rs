//! # Markdown Segmenter Library
//!
//! Turns a flat stream of page-annotated markdown lines (the output of an
//! image-to-markdown OCR step) into two structured products: a catalogue of
//! extracted table blocks with page provenance and surrounding context, and a
//! two-level section tree of the remaining prose, re-chunked to a bounded
//! size.
//!
//! ## Example Usage
//!
//! ```rust
//! use markdown_segmenter::{HeaderSplitter, SegmentConfig, Segmenter};
//!
//! let content = "PAGE_INDEX-0\n# Overview\nsome prose\nmetric|value\nco2|12.4\ntrailing prose";
//! let config = SegmentConfig::default();
//!
//! // Single pass: tables out, position index built, prose kept.
//! let document = Segmenter::new().segment(content, &config);
//! assert_eq!(document.tables.len(), 1);
//!
//! // Context for the table interpreter, bounded around the placeholder.
//! let context = document.positions.context_window(&document.tables[0].label);
//! assert!(context.is_some());
//!
//! // Two-level header split plus re-chunking of the leaves.
//! let sections = HeaderSplitter::new().split(&document.prose, &config);
//! assert!(!sections.is_empty());
//! ```

pub mod error;
pub mod services;
pub mod types;

// Re-export main types and services for easier usage
pub use error::{Result, SegmenterError};
pub use services::{
    HeaderSplitter, HttpPageRenderer, Rechunker, Segmenter, SourceReader, TableInterpreter,
};
pub use services::renderer::render_document;
pub use types::{
    ApiConfig, DocumentMetadata, InterpretationResult, PageImage, PositionElement, PositionIndex,
    PromptSet, RenderOptions, RenderedDocument, Section, SectionBody, SegmentConfig,
    SegmentedDocument, SourceType, StructuredTable, TableBlock, TableInterpretation,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
