//! DocChat Parser - PDF text extraction and chunking
//!
//! Turns a stored PDF into the ordered chunk sequence the ingestion
//! pipeline embeds and indexes. Extraction failures are fatal for the
//! job (no retry benefit); everything downstream of extraction is pure
//! and deterministic so re-processing under queue redelivery is safe.

pub mod chunk;
pub mod pdf;

pub use chunk::split_text;
pub use pdf::extract_pdf_text;
