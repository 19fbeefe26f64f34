//! Concatenate flow tokens into one addressable text buffer.
//!
//! All offsets are UTF-8 byte offsets into [`AssembledText::as_str`] and
//! always fall on `char` boundaries.

use alloc::collections::BTreeSet;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::flow::FlowToken;

/// Label inserted at each marker position unless the caller overrides it.
pub const DEFAULT_MARKER_LABEL: &str = " [I find checkpoint] ";

/// Marker (checkpoint) placement inputs supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkerConfig {
    /// Marker keys; each key is also the buffer offset the marker targets.
    pub offsets: Vec<usize>,
    /// Keys already resolved by the reader.
    pub resolved: BTreeSet<usize>,
    /// Text inserted for every marker.
    pub label: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            offsets: Vec::new(),
            resolved: BTreeSet::new(),
            label: DEFAULT_MARKER_LABEL.to_string(),
        }
    }
}

impl MarkerConfig {
    /// Build marker inputs with the default label.
    pub fn new<I, R>(offsets: I, resolved: R) -> Self
    where
        I: IntoIterator<Item = usize>,
        R: IntoIterator<Item = usize>,
    {
        Self {
            offsets: offsets.into_iter().collect(),
            resolved: resolved.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Replace the inserted label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Whether `key` names one of the configured markers.
    pub fn contains(&self, key: usize) -> bool {
        self.offsets.contains(&key)
    }

    /// Whether `key` has been resolved.
    pub fn is_resolved(&self, key: usize) -> bool {
        self.resolved.contains(&key)
    }

    /// Mark `key` resolved.
    ///
    /// Returns `false` when `key` is unknown or already resolved.
    pub fn resolve(&mut self, key: usize) -> bool {
        if !self.contains(key) {
            return false;
        }
        self.resolved.insert(key)
    }

    fn sorted_offsets(&self) -> Vec<usize> {
        let mut offsets = self.offsets.clone();
        offsets.sort_unstable();
        offsets
    }
}

/// Style tag attached to a span of assembled text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StyleTag {
    /// Body text; never stored as a span.
    Default,
    /// Heading text by level (`1..=6`).
    Heading(u8),
    /// Inserted marker label.
    Marker { resolved: bool },
}

/// Non-overlapping styled range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StyleSpan {
    pub start: usize,
    pub end: usize,
    pub tag: StyleTag,
}

impl StyleSpan {
    fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// Clickable annotation carried by unresolved markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkerAnnotation {
    /// Original marker key, reported back when the marker is activated.
    pub key: usize,
}

/// Inserted marker label range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkerSpan {
    pub start: usize,
    pub end: usize,
    pub key: usize,
    pub resolved: bool,
    /// Present only for unresolved markers.
    pub annotation: Option<MarkerAnnotation>,
}

/// Position of an image token in the flowed text. Images occupy no text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageAnchor {
    pub offset: usize,
    pub src: String,
    pub alt: String,
}

/// Linear text buffer with style, chapter, marker and image side tables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssembledText {
    text: String,
    style_spans: Vec<StyleSpan>,
    chapter_starts: BTreeSet<usize>,
    marker_spans: Vec<MarkerSpan>,
    image_anchors: Vec<ImageAnchor>,
}

impl AssembledText {
    /// Full buffer text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the buffer holds no text.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Styled spans in ascending buffer order.
    pub fn style_spans(&self) -> &[StyleSpan] {
        &self.style_spans
    }

    /// Offsets where a heading's text begins.
    pub fn chapter_starts(&self) -> &BTreeSet<usize> {
        &self.chapter_starts
    }

    /// Whether `offset` begins a chapter.
    pub fn is_chapter_start(&self, offset: usize) -> bool {
        self.chapter_starts.contains(&offset)
    }

    /// Marker label spans in ascending buffer order.
    pub fn marker_spans(&self) -> &[MarkerSpan] {
        &self.marker_spans
    }

    /// Unresolved (clickable) marker spans.
    pub fn clickable_markers(&self) -> impl Iterator<Item = &MarkerSpan> {
        self.marker_spans.iter().filter(|m| m.annotation.is_some())
    }

    /// Image positions in ascending buffer order.
    pub fn image_anchors(&self) -> &[ImageAnchor] {
        &self.image_anchors
    }

    /// Style in effect at `offset`.
    pub fn style_at(&self, offset: usize) -> StyleTag {
        let idx = self.style_spans.partition_point(|span| span.end <= offset);
        match self.style_spans.get(idx) {
            Some(span) if span.contains(offset) => span.tag,
            _ => StyleTag::Default,
        }
    }

    /// Clickable marker annotation covering `offset`, if any.
    pub fn marker_at(&self, offset: usize) -> Option<MarkerAnnotation> {
        let idx = self.marker_spans.partition_point(|span| span.end <= offset);
        self.marker_spans
            .get(idx)
            .filter(|span| offset >= span.start && offset < span.end)
            .and_then(|span| span.annotation)
    }
}

/// Build the assembled buffer from tokens, inserting marker labels.
///
/// Markers are drained before every token whose start they precede; any
/// markers still pending after the last token are appended at the end, so
/// offsets at or beyond the end of content are still placed.
pub fn assemble(tokens: &[FlowToken], markers: &MarkerConfig) -> AssembledText {
    let offsets = markers.sorted_offsets();
    let state = Assembly::new(markers, &offsets);
    let mut state = tokens.iter().fold(state, Assembly::push_token);
    state.flush_markers();
    log::debug!(
        "assembled {} tokens into {} bytes ({} chapters, {} markers)",
        tokens.len(),
        state.out.text.len(),
        state.out.chapter_starts.len(),
        state.out.marker_spans.len()
    );
    state.out
}

struct Assembly<'a> {
    out: AssembledText,
    first_in_paragraph: bool,
    /// Newlines a heading left at the buffer tail that a directly following
    /// break reuses instead of repeating.
    heading_newlines: usize,
    markers: &'a MarkerConfig,
    pending: &'a [usize],
}

impl<'a> Assembly<'a> {
    fn new(markers: &'a MarkerConfig, pending: &'a [usize]) -> Self {
        Self {
            out: AssembledText::default(),
            first_in_paragraph: true,
            heading_newlines: 0,
            markers,
            pending,
        }
    }

    fn push_token(mut self, token: &FlowToken) -> Self {
        self.drain_markers();
        match token {
            FlowToken::Word { text } => {
                if !self.first_in_paragraph {
                    self.out.text.push(' ');
                }
                self.out.text.push_str(text);
                self.first_in_paragraph = false;
                self.heading_newlines = 0;
            }
            FlowToken::Heading { level, text } => {
                if !self.out.text.is_empty() {
                    self.out.text.push_str("\n\n");
                }
                let start = self.out.text.len();
                self.out.chapter_starts.insert(start);
                self.push_styled(text, StyleTag::Heading(*level));
                self.out.text.push_str("\n\n");
                self.first_in_paragraph = true;
                self.heading_newlines = 2;
            }
            FlowToken::ParagraphBreak { count } | FlowToken::LineBreak { count } => {
                let wanted = (*count).max(1);
                for _ in self.heading_newlines.min(wanted)..wanted {
                    self.out.text.push('\n');
                }
                self.first_in_paragraph = true;
                self.heading_newlines = 0;
            }
            FlowToken::Image { src, alt } => {
                self.out.image_anchors.push(ImageAnchor {
                    offset: self.out.text.len(),
                    src: src.clone(),
                    alt: alt.clone(),
                });
            }
        }
        self
    }

    fn drain_markers(&mut self) {
        while let Some((&key, rest)) = self.pending.split_first() {
            if key > self.out.text.len() {
                break;
            }
            self.pending = rest;
            self.insert_marker(key);
        }
    }

    fn flush_markers(&mut self) {
        for &key in core::mem::take(&mut self.pending) {
            self.insert_marker(key);
        }
    }

    fn insert_marker(&mut self, key: usize) {
        let markers = self.markers;
        let resolved = markers.is_resolved(key);
        let start = self.out.text.len();
        self.push_styled(&markers.label, StyleTag::Marker { resolved });
        let end = self.out.text.len();
        log::trace!(
            "marker {} placed at {}..{} (resolved={})",
            key,
            start,
            end,
            resolved
        );
        self.out.marker_spans.push(MarkerSpan {
            start,
            end,
            key,
            resolved,
            annotation: (!resolved).then_some(MarkerAnnotation { key }),
        });
    }

    fn push_styled(&mut self, text: &str, tag: StyleTag) {
        if text.is_empty() {
            return;
        }
        let start = self.out.text.len();
        self.out.text.push_str(text);
        self.out.style_spans.push(StyleSpan {
            start,
            end: self.out.text.len(),
            tag,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{tokenize, SemanticElement};
    use alloc::vec;

    fn word(text: &str) -> FlowToken {
        FlowToken::Word {
            text: text.to_string(),
        }
    }

    fn heading(level: u8, text: &str) -> FlowToken {
        FlowToken::Heading {
            level,
            text: text.to_string(),
        }
    }

    #[test]
    fn words_are_space_separated_within_paragraph() {
        let tokens = vec![
            word("one"),
            word("two"),
            FlowToken::ParagraphBreak { count: 1 },
            word("three"),
        ];
        let text = assemble(&tokens, &MarkerConfig::default());
        assert_eq!(text.as_str(), "one two\nthree");
    }

    #[test]
    fn break_counts_are_at_least_one() {
        let tokens = vec![
            word("a"),
            FlowToken::LineBreak { count: 0 },
            word("b"),
            FlowToken::ParagraphBreak { count: 3 },
            word("c"),
        ];
        let text = assemble(&tokens, &MarkerConfig::default());
        assert_eq!(text.as_str(), "a\nb\n\n\nc");
    }

    #[test]
    fn heading_records_chapter_start_and_style_span() {
        let tokens = vec![
            word("intro"),
            heading(1, "Chapter"),
            FlowToken::ParagraphBreak { count: 2 },
            word("body"),
        ];
        let text = assemble(&tokens, &MarkerConfig::default());
        assert_eq!(text.as_str(), "intro\n\nChapter\n\nbody");
        assert_eq!(text.chapter_starts().iter().copied().collect::<Vec<_>>(), vec![7]);
        assert_eq!(
            text.style_spans(),
            &[StyleSpan {
                start: 7,
                end: 14,
                tag: StyleTag::Heading(1)
            }]
        );
        assert_eq!(text.style_at(7), StyleTag::Heading(1));
        assert_eq!(text.style_at(13), StyleTag::Heading(1));
        assert_eq!(text.style_at(14), StyleTag::Default);
        assert_eq!(text.style_at(0), StyleTag::Default);
    }

    #[test]
    fn first_heading_starts_at_zero_without_leading_newlines() {
        let elements = vec![
            SemanticElement::heading(1, "Chapter One"),
            SemanticElement::paragraph("Hello world. Second sentence!"),
            SemanticElement::paragraph("Next para."),
        ];
        let text = assemble(&tokenize(&elements), &MarkerConfig::default());
        assert!(text
            .as_str()
            .starts_with("Chapter One\n\nHello world.\nSecond sentence!\nNext para.\n"));
        assert!(text.is_chapter_start(0));
    }

    #[test]
    fn markers_are_inserted_at_target_offsets() {
        let tokens = vec![word("aaaa"), word("bbbb"), word("cccc")];
        let markers = MarkerConfig::new([5], []).with_label("[M]");
        let text = assemble(&tokens, &markers);
        // "aaaa bbbb" reaches offset 9 before "cccc" is processed.
        assert_eq!(text.as_str(), "aaaa bbbb[M] cccc");
        let span = text.marker_spans()[0];
        assert_eq!((span.start, span.end, span.key), (9, 12, 5));
        assert_eq!(span.annotation, Some(MarkerAnnotation { key: 5 }));
        assert_eq!(text.style_at(10), StyleTag::Marker { resolved: false });
    }

    #[test]
    fn resolved_markers_are_styled_but_not_clickable() {
        let tokens = vec![word("alpha"), word("beta")];
        let markers = MarkerConfig::new([0, 3], [3]).with_label("*");
        let text = assemble(&tokens, &markers);
        assert_eq!(text.as_str(), "*alpha* beta");
        assert_eq!(text.marker_spans().len(), 2);
        assert_eq!(text.clickable_markers().count(), 1);
        assert_eq!(text.marker_at(0), Some(MarkerAnnotation { key: 0 }));
        assert_eq!(text.marker_at(6), None);
        assert_eq!(text.style_at(6), StyleTag::Marker { resolved: true });
    }

    #[test]
    fn markers_past_end_are_flushed() {
        let tokens = vec![word("short")];
        let markers = MarkerConfig::new([1000, 2], []).with_label("#");
        let text = assemble(&tokens, &markers);
        assert_eq!(text.as_str(), "short##");
        assert_eq!(
            text.marker_spans().iter().map(|m| m.key).collect::<Vec<_>>(),
            vec![2, 1000]
        );
    }

    #[test]
    fn marker_before_opening_heading_shifts_chapter_start() {
        let tokens = vec![
            heading(1, "Title"),
            FlowToken::ParagraphBreak { count: 2 },
            word("x"),
            word("y"),
        ];
        let plain = assemble(&tokens, &MarkerConfig::default());
        let marked = assemble(&tokens, &MarkerConfig::new([0], []).with_label("@"));
        assert_eq!(plain.as_str(), "Title\n\nx y");
        assert_eq!(marked.as_str(), "@\n\nTitle\n\nx y");
        assert_eq!(plain.chapter_starts().len(), marked.chapter_starts().len());
        assert!(marked.is_chapter_start(3));
    }

    #[test]
    fn break_after_heading_reuses_heading_newlines() {
        let tokens = vec![
            heading(3, "H"),
            FlowToken::LineBreak { count: 3 },
            word("a"),
            FlowToken::ParagraphBreak { count: 2 },
            word("b"),
        ];
        let text = assemble(&tokens, &MarkerConfig::default());
        assert_eq!(text.as_str(), "H\n\n\na\n\nb");
    }

    #[test]
    fn images_record_anchor_without_text() {
        let tokens = vec![
            word("before"),
            FlowToken::Image {
                src: "img/x.png".to_string(),
                alt: "x".to_string(),
            },
            word("after"),
        ];
        let text = assemble(&tokens, &MarkerConfig::default());
        assert_eq!(text.as_str(), "before after");
        assert_eq!(text.image_anchors()[0].offset, 6);
    }

    #[test]
    fn empty_tokens_with_markers_still_places_labels() {
        let text = assemble(&[], &MarkerConfig::new([0, 4], []).with_label("!"));
        assert_eq!(text.as_str(), "!!");
        assert!(assemble(&[], &MarkerConfig::default()).is_empty());
    }

    #[test]
    fn marker_config_resolve_rejects_unknown_and_repeat() {
        let mut cfg = MarkerConfig::new([10, 20], []);
        assert!(!cfg.resolve(15));
        assert!(cfg.resolve(10));
        assert!(!cfg.resolve(10));
        assert!(cfg.is_resolved(10));
    }

    #[test]
    fn assembly_is_deterministic() {
        let tokens = tokenize(&[
            SemanticElement::heading(2, "Two"),
            SemanticElement::paragraph("Some words here. And more."),
        ]);
        let markers = MarkerConfig::new([3, 12], [12]);
        assert_eq!(assemble(&tokens, &markers), assemble(&tokens, &markers));
    }
}
