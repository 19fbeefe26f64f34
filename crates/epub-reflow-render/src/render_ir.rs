use epub_reflow::{AssembledText, MarkerSpan, StyleTag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Minimum viewport change, in px, that triggers repagination.
pub const REPAGINATE_EPSILON_PX: f32 = 1.0;

/// Page viewport available to flowed text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Max line width in px.
    pub width: f32,
    /// Page height budget in px.
    pub height: f32,
}

impl Viewport {
    /// Create a viewport.
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Whether width or height moved by more than [`REPAGINATE_EPSILON_PX`].
    pub fn differs_from(&self, other: &Viewport) -> bool {
        (self.width - other.width).abs() > REPAGINATE_EPSILON_PX
            || (self.height - other.height).abs() > REPAGINATE_EPSILON_PX
    }
}

/// Base text style plus the per-tag overrides used for measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct TextStyle {
    /// Body font size in px.
    pub size_px: f32,
    /// Line height multiplier.
    pub line_height: f32,
    /// Body font weight.
    pub weight: u16,
    /// Average glyph advance as a fraction of font size.
    pub advance_ratio: f32,
    /// Heading sizes for levels 1, 2, 3 and 4 or deeper.
    pub heading_sizes_px: [f32; 4],
    /// Heading font weight.
    pub heading_weight: u16,
    /// ARGB color for resolved marker labels.
    pub resolved_marker_argb: u32,
    /// ARGB color for unresolved marker labels.
    pub unresolved_marker_argb: u32,
    /// BCP-47 language tag carried for host measurers (hyphenation, locale
    /// line breaking). The built-in measurer ignores it; it still feeds the
    /// layout profile id.
    pub language: Option<Arc<str>>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            size_px: 18.0,
            line_height: 1.4,
            weight: 400,
            advance_ratio: 0.55,
            heading_sizes_px: [28.0, 24.0, 22.0, 20.0],
            heading_weight: 700,
            resolved_marker_argb: 0xFF4C_AF50,
            unresolved_marker_argb: 0xFF00_0000,
            language: None,
        }
    }
}

impl TextStyle {
    /// Attach a document language hint (e.g. `"en"`, `"de-DE"`) for host
    /// measurers.
    pub fn with_language(mut self, language: Option<&str>) -> Self {
        self.language = language.map(Arc::from);
        self
    }

    /// Resolve the effective span style for a tag.
    pub fn span_style(&self, tag: StyleTag) -> SpanStyle {
        match tag {
            StyleTag::Default => SpanStyle {
                size_px: self.size_px,
                weight: self.weight,
                color_argb: None,
            },
            StyleTag::Heading(level) => {
                let idx = usize::from(level.clamp(1, 4)) - 1;
                SpanStyle {
                    size_px: self.heading_sizes_px[idx],
                    weight: self.heading_weight,
                    color_argb: None,
                }
            }
            StyleTag::Marker { resolved } => SpanStyle {
                size_px: self.size_px,
                weight: self.weight,
                color_argb: Some(if resolved {
                    self.resolved_marker_argb
                } else {
                    self.unresolved_marker_argb
                }),
            },
        }
    }

    /// Line height in px for text set in `tag`.
    pub fn line_height_px(&self, tag: StyleTag) -> f32 {
        self.span_style(tag).size_px * self.line_height
    }
}

/// Resolved style for one span of text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpanStyle {
    pub size_px: f32,
    pub weight: u16,
    /// Explicit color; `None` inherits the renderer's text color.
    pub color_argb: Option<u32>,
}

/// One measured line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutLine {
    /// Offset of the first byte on the line.
    pub start: usize,
    /// Top edge in px from the top of the text block.
    pub top: f32,
    /// Bottom edge in px from the top of the text block.
    pub bottom: f32,
}

impl LayoutLine {
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Ordered line metadata for a measured text buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineMetrics {
    pub lines: Vec<LayoutLine>,
}

impl LineMetrics {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Total measured height in px.
    pub fn total_height(&self) -> f32 {
        self.lines.last().map(|line| line.bottom).unwrap_or(0.0)
    }
}

/// One page: byte range `[start_index, end_index)` and line range
/// `[start_line, end_line)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageSlice {
    pub start_index: usize,
    pub end_index: usize,
    pub start_line: usize,
    pub end_line: usize,
    /// 0-based page number in emission order.
    pub page_number: usize,
}

impl PageSlice {
    /// Whether `offset` falls inside this page.
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start_index && offset < self.end_index
    }

    /// Byte range covered by this page.
    pub fn char_range(&self) -> core::ops::Range<usize> {
        self.start_index..self.end_index
    }

    /// Number of lines on this page.
    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line)
    }
}

/// Full output of one pagination run. Replaced wholesale on every run.
#[derive(Clone, Debug, PartialEq)]
pub struct PaginationResult {
    pub text: AssembledText,
    pub pages: Vec<PageSlice>,
    pub style: TextStyle,
}

impl PaginationResult {
    /// Result with no text and no pages.
    pub fn empty(style: TextStyle) -> Self {
        Self {
            text: AssembledText::default(),
            pages: Vec::new(),
            style,
        }
    }

    /// Complete flowed text.
    pub fn full_text(&self) -> &str {
        self.text.as_str()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn marker_spans(&self) -> &[MarkerSpan] {
        self.text.marker_spans()
    }

    pub fn chapter_starts(&self) -> &BTreeSet<usize> {
        self.text.chapter_starts()
    }

    /// Text shown on page `index`.
    pub fn page_text(&self, index: usize) -> Option<&str> {
        let page = self.pages.get(index)?;
        self.text.as_str().get(page.char_range())
    }

    /// Marker spans that start on page `index`.
    pub fn page_markers(&self, index: usize) -> impl Iterator<Item = &MarkerSpan> {
        let page = self.pages.get(index).copied();
        self.text
            .marker_spans()
            .iter()
            .filter(move |span| page.is_some_and(|p| p.contains(span.start)))
    }
}

/// Stable fingerprint for everything that affects page slices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayoutProfileId(pub [u8; 32]);

impl LayoutProfileId {
    /// Build a deterministic profile id from arbitrary payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_parts(&[bytes])
    }

    /// Build a profile id over several payload parts, in order.
    pub fn from_parts(parts: &[&[u8]]) -> Self {
        fn fnv64(seed: u64, parts: &[&[u8]]) -> u64 {
            let mut hash = seed;
            for part in parts {
                for b in *part {
                    hash ^= *b as u64;
                    hash = hash.wrapping_mul(0x100000001b3);
                }
                // Part separator keeps ("ab", "c") distinct from ("a", "bc").
                hash ^= 0xff;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            hash
        }
        let mut out = [0u8; 32];
        let seeds = [
            0xcbf29ce484222325,
            0x9e3779b97f4a7c15,
            0xd6e8feb86659fd93,
            0xa0761d6478bd642f,
        ];
        for (chunk, seed) in out.chunks_exact_mut(8).zip(seeds) {
            chunk.copy_from_slice(&fnv64(seed, parts).to_le_bytes());
        }
        Self(out)
    }

    /// Lowercase hex form, suitable for cache keys.
    pub fn to_hex(&self) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(64);
        for b in self.0 {
            let _ = write!(out, "{:02x}", b);
        }
        out
    }
}
