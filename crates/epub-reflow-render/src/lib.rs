//! Layout, pagination and position-stable repagination for `epub-reflow`.

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

mod render_engine;
mod render_ir;
mod render_layout;

pub use epub_reflow::{AssembledText, MarkerConfig, StyleTag};
pub use render_engine::{
    decode_page_cache, encode_page_cache, page_index_for_offset, MarkerResolved,
    PaginationEngine, PaginationEngineError, ReaderSession, ReadingPosition, ReflowOptions,
};
pub use render_ir::{
    LayoutLine, LayoutProfileId, LineMetrics, PageSlice, PaginationResult, SpanStyle, TextStyle,
    Viewport, REPAGINATE_EPSILON_PX,
};
pub use render_layout::{
    paginate, paginate_lines, FixedAdvanceMeasurer, LineMeasureError, LineMeasurer,
};
