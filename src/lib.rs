//! Flow tokenizer and text assembler for position-stable ebook pagination.
//!
//! The pipeline starts from semantic document elements produced by a markup
//! extractor, flattens them into atomic [`FlowToken`]s, and concatenates the
//! tokens into one addressable [`AssembledText`] carrying heading style spans,
//! chapter-start offsets, and inline marker spans.
//!
//! Measuring and slicing the assembled text into pages lives in the
//! `epub-reflow-render` crate.
//!
//! ```rust
//! use epub_reflow::{assemble, tokenize, MarkerConfig, SemanticElement};
//!
//! let elements = vec![
//!     SemanticElement::heading(1, "Chapter One"),
//!     SemanticElement::paragraph("Hello world. Second sentence!"),
//! ];
//! let tokens = tokenize(&elements);
//! let text = assemble(&tokens, &MarkerConfig::default());
//! assert!(text.as_str().starts_with("Chapter One\n\nHello world.\nSecond sentence!\n"));
//! assert!(text.is_chapter_start(0));
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

extern crate alloc;

pub mod assemble;
pub mod flow;

pub use assemble::{
    assemble, AssembledText, ImageAnchor, MarkerAnnotation, MarkerConfig, MarkerSpan, StyleSpan,
    StyleTag, DEFAULT_MARKER_LABEL,
};
pub use flow::{split_sentences, tokenize, tokenize_with, FlowToken, SemanticElement};
