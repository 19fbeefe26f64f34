//! Semantic document elements and the flow tokens they flatten into.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use smallvec::SmallVec;

/// Closing characters allowed between a sentence terminator and the
/// whitespace that ends the sentence.
const SENTENCE_CLOSERS: [char; 5] = ['"', '\u{00BB}', '\u{201D}', '\u{2019}', ')'];

/// Structured document element produced by a markup extractor.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SemanticElement {
    /// Heading by level (`1..=6`).
    Heading { level: u8, text: String },
    /// Paragraph of running text.
    Paragraph { text: String },
    /// Explicit line break(s).
    LineBreak { count: usize },
    /// Horizontal rule / scene separator.
    HorizontalRule,
    /// Ordered or unordered list.
    List { items: Vec<String>, ordered: bool },
    /// Block quotation.
    Quote { text: String },
    /// Image reference (archive-relative source path).
    Image { src: String, alt: String },
}

impl SemanticElement {
    /// Convenience constructor for a heading.
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::Heading {
            level,
            text: text.into(),
        }
    }

    /// Convenience constructor for a paragraph.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::Paragraph { text: text.into() }
    }

    /// Convenience constructor for a quote.
    pub fn quote(text: impl Into<String>) -> Self {
        Self::Quote { text: text.into() }
    }

    /// Convenience constructor for a list.
    pub fn list<I, S>(items: I, ordered: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List {
            items: items.into_iter().map(Into::into).collect(),
            ordered,
        }
    }

    /// Convenience constructor for an image.
    pub fn image(src: impl Into<String>, alt: impl Into<String>) -> Self {
        Self::Image {
            src: src.into(),
            alt: alt.into(),
        }
    }
}

/// Atomic unit of flowable content, in reading order.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlowToken {
    /// One whitespace-free word.
    Word { text: String },
    /// Heading text; starts a chapter.
    Heading { level: u8, text: String },
    /// Paragraph separation rendered as `count` newlines.
    ParagraphBreak { count: usize },
    /// Line separation rendered as `count` newlines.
    LineBreak { count: usize },
    /// Image placeholder. Not inlined into flowed text.
    Image { src: String, alt: String },
}

impl FlowToken {
    fn word(text: &str) -> Self {
        Self::Word {
            text: text.to_string(),
        }
    }

    /// Word text when this token is a word.
    pub fn as_word(&self) -> Option<&str> {
        match self {
            Self::Word { text } => Some(text.as_str()),
            _ => None,
        }
    }
}

/// Flatten semantic elements into flow tokens.
///
/// Empty input yields an empty token stream.
pub fn tokenize(elements: &[SemanticElement]) -> Vec<FlowToken> {
    let mut tokens = Vec::with_capacity(elements.len().saturating_mul(8));
    tokenize_with(elements, |token| tokens.push(token));
    tokens
}

/// Flatten semantic elements and stream each token to `on_token`.
pub fn tokenize_with<F>(elements: &[SemanticElement], mut on_token: F)
where
    F: FnMut(FlowToken),
{
    for element in elements {
        match element {
            SemanticElement::Heading { level, text } => {
                let clamped = (*level).clamp(1, 6);
                if clamped != *level {
                    log::warn!("heading level {} outside 1..=6; clamped to {}", level, clamped);
                }
                on_token(FlowToken::Heading {
                    level: clamped,
                    text: text.clone(),
                });
                on_token(FlowToken::ParagraphBreak { count: 2 });
            }
            SemanticElement::Paragraph { text } | SemanticElement::Quote { text } => {
                emit_prose(text, &mut on_token);
            }
            SemanticElement::LineBreak { count } => {
                on_token(FlowToken::LineBreak { count: *count });
            }
            SemanticElement::HorizontalRule => {
                on_token(FlowToken::ParagraphBreak { count: 2 });
            }
            SemanticElement::List { items, .. } => {
                for item in items {
                    for sentence in split_sentences(item) {
                        emit_words(sentence, &mut on_token);
                    }
                    on_token(FlowToken::LineBreak { count: 1 });
                }
                on_token(FlowToken::ParagraphBreak { count: 1 });
            }
            SemanticElement::Image { src, alt } => {
                on_token(FlowToken::Image {
                    src: src.clone(),
                    alt: alt.clone(),
                });
                on_token(FlowToken::ParagraphBreak { count: 1 });
            }
        }
    }
}

/// Each sentence becomes its own run of words closed by a paragraph break.
/// Blank prose still closes with a single break so block spacing survives.
fn emit_prose<F: FnMut(FlowToken)>(text: &str, on_token: &mut F) {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        on_token(FlowToken::ParagraphBreak { count: 1 });
        return;
    }
    for sentence in sentences {
        emit_words(sentence, on_token);
        on_token(FlowToken::ParagraphBreak { count: 1 });
    }
}

fn emit_words<F: FnMut(FlowToken)>(sentence: &str, on_token: &mut F) {
    for word in sentence.split(char::is_whitespace) {
        if !word.is_empty() {
            on_token(FlowToken::word(word));
        }
    }
}

/// Split text into sentences.
///
/// A sentence ends at a whitespace run that directly follows `.`, `!` or
/// `?`, optionally followed by one closing quote or parenthesis. Results are
/// trimmed and blank pieces are dropped. Abbreviations and decimals are not
/// special-cased.
pub fn split_sentences(text: &str) -> SmallVec<[&str; 8]> {
    let mut out = SmallVec::new();
    let mut sentence_start = 0usize;
    let mut prev: Option<char> = None;
    let mut prev2: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch.is_whitespace() && ends_sentence(prev, prev2) {
            push_trimmed(&mut out, &text[sentence_start..idx]);
            let mut run_end = idx + ch.len_utf8();
            while let Some(&(next_idx, next)) = chars.peek() {
                if !next.is_whitespace() {
                    break;
                }
                run_end = next_idx + next.len_utf8();
                chars.next();
            }
            sentence_start = run_end;
            prev = None;
            prev2 = None;
            continue;
        }
        prev2 = prev;
        prev = Some(ch);
    }
    push_trimmed(&mut out, &text[sentence_start..]);
    out
}

fn ends_sentence(prev: Option<char>, prev2: Option<char>) -> bool {
    match prev {
        Some(c) if is_terminator(c) => true,
        Some(c) if SENTENCE_CLOSERS.contains(&c) => prev2.is_some_and(is_terminator),
        _ => false,
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn push_trimmed<'a>(out: &mut SmallVec<[&'a str; 8]>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        out.push(piece);
    }
}
