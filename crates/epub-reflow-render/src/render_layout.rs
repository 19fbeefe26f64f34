use epub_reflow::{AssembledText, StyleTag};
use std::collections::BTreeSet;
use std::fmt;

use crate::render_ir::{LayoutLine, LineMetrics, PageSlice, TextStyle};

/// Line-measurement capability supplied by the host text system.
///
/// Implementations must be deterministic: identical text, style and width
/// must produce identical line metadata.
pub trait LineMeasurer: Send + Sync {
    /// Wrap `text` at `max_width` px and report every line in order.
    fn measure_lines(
        &self,
        text: &AssembledText,
        style: &TextStyle,
        max_width: f32,
    ) -> Result<LineMetrics, LineMeasureError>;
}

/// Failure reported by a [`LineMeasurer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineMeasureError {
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: Box<str>,
}

impl LineMeasureError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into().into_boxed_str(),
        }
    }
}

impl fmt::Display for LineMeasureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for LineMeasureError {}

/// Deterministic measurer that treats every glyph as `size_px * advance_ratio`
/// wide.
///
/// Each `\n` ends a line, and the text after a trailing `\n` forms one more
/// (empty) line. Lines wrap greedily at whitespace; a word wider than the
/// line is broken between chars.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixedAdvanceMeasurer;

impl LineMeasurer for FixedAdvanceMeasurer {
    fn measure_lines(
        &self,
        text: &AssembledText,
        style: &TextStyle,
        max_width: f32,
    ) -> Result<LineMetrics, LineMeasureError> {
        if max_width.is_nan() {
            return Err(LineMeasureError::new(
                "invalid_width",
                "max width must be a number",
            ));
        }
        let mut wrap = LineWrap {
            text,
            style,
            max_width: max_width.max(0.0),
            out: LineMetrics::default(),
            cursor_y: 0.0,
        };
        let s = text.as_str();
        let mut segment_start = 0usize;
        loop {
            let newline = s[segment_start..].find('\n').map(|i| segment_start + i);
            wrap.wrap_segment(segment_start, newline.unwrap_or(s.len()));
            match newline {
                Some(nl) => segment_start = nl + 1,
                None => break,
            }
        }
        Ok(wrap.out)
    }
}

struct LineWrap<'a> {
    text: &'a AssembledText,
    style: &'a TextStyle,
    max_width: f32,
    out: LineMetrics,
    cursor_y: f32,
}

impl<'a> LineWrap<'a> {
    fn emit(&mut self, start: usize, height: f32) {
        let top = self.cursor_y;
        self.cursor_y += height;
        self.out.lines.push(LayoutLine {
            start,
            top,
            bottom: self.cursor_y,
        });
    }

    fn glyph(&self, offset: usize) -> (f32, f32) {
        let span = self.style.span_style(self.text.style_at(offset));
        (
            span.size_px * self.style.advance_ratio,
            span.size_px * self.style.line_height,
        )
    }

    fn wrap_segment(&mut self, start: usize, end: usize) {
        if start == end {
            let height = self.style.line_height_px(StyleTag::Default);
            self.emit(start, height);
            return;
        }

        let mut line_start = start;
        // Width/height of the line up to the last break opportunity.
        let mut committed_w = 0.0f32;
        let mut committed_h = 0.0f32;
        // Width/height of the pending word after that break opportunity.
        let mut word_w = 0.0f32;
        let mut word_h = 0.0f32;
        let mut break_at: Option<usize> = None;

        let text: &'a AssembledText = self.text;
        let segment = &text.as_str()[start..end];
        for (rel, ch) in segment.char_indices() {
            let idx = start + rel;
            let (advance, height) = self.glyph(idx);

            if ch.is_whitespace() {
                committed_w += word_w + advance;
                committed_h = committed_h.max(word_h).max(height);
                word_w = 0.0;
                word_h = 0.0;
                break_at = Some(idx + ch.len_utf8());
                continue;
            }

            if idx > line_start && committed_w + word_w + advance > self.max_width {
                match break_at {
                    Some(at) if at > line_start => {
                        self.emit(line_start, committed_h);
                        line_start = at;
                        committed_w = 0.0;
                        committed_h = 0.0;
                        break_at = None;
                        if idx > line_start && word_w + advance > self.max_width {
                            self.emit(line_start, word_h);
                            line_start = idx;
                            word_w = 0.0;
                            word_h = 0.0;
                        }
                    }
                    _ => {
                        self.emit(line_start, committed_h.max(word_h));
                        line_start = idx;
                        committed_w = 0.0;
                        committed_h = 0.0;
                        word_w = 0.0;
                        word_h = 0.0;
                    }
                }
            }

            word_w += advance;
            word_h = word_h.max(height);
        }

        self.emit(line_start, committed_h.max(word_h));
    }
}

/// Greedily pack measured lines into pages under `page_height`.
///
/// A line whose start offset is a chapter start always opens a new page when
/// the current page already holds text. Otherwise a page closes when the
/// next line would push it past `page_height`. A line taller than the page is
/// never split; it sits alone on its page. Lines that carry no text of their
/// own (same start as the page, or starting at `text_len`) never open a page,
/// so every page covers at least one byte. The last page may therefore
/// exceed `page_height` by one textless line.
pub fn paginate_lines(
    text_len: usize,
    metrics: &LineMetrics,
    page_height: f32,
    chapter_starts: &BTreeSet<usize>,
) -> Vec<PageSlice> {
    let line_count = metrics.line_count();
    let mut pages = Vec::with_capacity(8);
    if text_len == 0 || line_count == 0 {
        return pages;
    }

    let mut page_start_line = 0usize;
    let mut page_start_offset = 0usize;
    let mut accumulated = 0.0f32;
    let mut prev_start = 0usize;

    for (line_index, line) in metrics.lines.iter().enumerate() {
        let line_start = clamp_line_start(line.start, prev_start, text_len, line_index);
        prev_start = line_start;
        let line_height = line.height();

        let is_chapter_start = chapter_starts.contains(&line_start);
        let can_break = line_start > page_start_offset && line_start < text_len;

        if can_break && (is_chapter_start || accumulated + line_height > page_height) {
            pages.push(PageSlice {
                start_index: page_start_offset,
                end_index: line_start,
                start_line: page_start_line,
                end_line: line_index,
                page_number: pages.len(),
            });
            page_start_line = line_index;
            page_start_offset = line_start;
            accumulated = line_height;
        } else {
            accumulated += line_height;
        }
    }

    if page_start_line < line_count {
        pages.push(PageSlice {
            start_index: page_start_offset,
            end_index: text_len,
            start_line: page_start_line,
            end_line: line_count,
            page_number: pages.len(),
        });
    }
    pages
}

fn clamp_line_start(start: usize, prev: usize, text_len: usize, line_index: usize) -> usize {
    let clamped = start.clamp(prev, text_len);
    if clamped != start {
        log::warn!(
            "line {} start {} out of order (prev={}, len={}); clamped to {}",
            line_index,
            start,
            prev,
            text_len,
            clamped
        );
    }
    clamped
}

/// Measure `text` at `page_width` and pack the lines into pages.
pub fn paginate(
    text: &AssembledText,
    measurer: &dyn LineMeasurer,
    style: &TextStyle,
    page_width: f32,
    page_height: f32,
) -> Result<Vec<PageSlice>, LineMeasureError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let metrics = measurer.measure_lines(text, style, page_width)?;
    let pages = paginate_lines(text.len(), &metrics, page_height, text.chapter_starts());
    log::debug!(
        "paginated {} bytes into {} lines / {} pages (width={} height={})",
        text.len(),
        metrics.line_count(),
        pages.len(),
        page_width,
        page_height
    );
    Ok(pages)
}
