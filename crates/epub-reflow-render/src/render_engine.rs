use epub_reflow::{assemble, AssembledText, FlowToken, MarkerAnnotation, MarkerConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::render_ir::{LayoutProfileId, PageSlice, PaginationResult, TextStyle, Viewport};
use crate::render_layout::{paginate, LineMeasureError, LineMeasurer};

const CACHE_SCHEMA_VERSION: u8 = 1;

/// Options bundle for a reflow run.
#[derive(Clone, Debug, PartialEq)]
pub struct ReflowOptions {
    /// Style used for measurement.
    pub style: TextStyle,
    /// Page viewport.
    pub viewport: Viewport,
}

impl ReflowOptions {
    /// Default style on a `width` x `height` viewport.
    pub fn for_viewport(width: f32, height: f32) -> Self {
        Self {
            style: TextStyle::default(),
            viewport: Viewport::new(width, height),
        }
    }
}

/// Stateless pagination engine: tokens + markers + viewport in, a fresh
/// [`PaginationResult`] out.
#[derive(Clone)]
pub struct PaginationEngine {
    style: TextStyle,
    measurer: Option<Arc<dyn LineMeasurer>>,
}

impl fmt::Debug for PaginationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginationEngine")
            .field("style", &self.style)
            .field("has_line_measurer", &self.measurer.is_some())
            .finish()
    }
}

impl PaginationEngine {
    /// Create an engine with no line measurer installed.
    pub fn new(style: TextStyle) -> Self {
        Self {
            style,
            measurer: None,
        }
    }

    /// Install the line-measurement capability.
    pub fn with_line_measurer(mut self, measurer: Arc<dyn LineMeasurer>) -> Self {
        self.measurer = Some(measurer);
        self
    }

    /// Engine for `options.style`; the viewport is supplied per call.
    pub fn from_options(options: &ReflowOptions) -> Self {
        Self::new(options.style.clone())
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    /// Assemble `tokens` with `markers` and paginate for `viewport`.
    pub fn paginate(
        &self,
        tokens: &[FlowToken],
        markers: &MarkerConfig,
        viewport: Viewport,
    ) -> Result<PaginationResult, PaginationEngineError> {
        self.paginate_assembled(assemble(tokens, markers), viewport)
    }

    /// Paginate an already assembled buffer for `viewport`.
    pub fn paginate_assembled(
        &self,
        text: AssembledText,
        viewport: Viewport,
    ) -> Result<PaginationResult, PaginationEngineError> {
        if text.is_empty() {
            return Ok(PaginationResult {
                text,
                ..PaginationResult::empty(self.style.clone())
            });
        }
        let measurer = self
            .measurer
            .as_deref()
            .ok_or(PaginationEngineError::MeasurementUnavailable)?;
        let pages = paginate(
            &text,
            measurer,
            &self.style,
            viewport.width,
            viewport.height,
        )?;
        Ok(PaginationResult {
            text,
            pages,
            style: self.style.clone(),
        })
    }

    /// Paginate, reusing `cached` page slices when they were produced for the
    /// same layout profile.
    ///
    /// Returns the result and, when the cache missed, a fresh payload for the
    /// caller to store.
    pub fn paginate_assembled_cached(
        &self,
        text: AssembledText,
        viewport: Viewport,
        cached: Option<&[u8]>,
    ) -> Result<(PaginationResult, Option<Vec<u8>>), PaginationEngineError> {
        let profile = self.layout_profile_id(&text, viewport);
        let hit = cached.and_then(|payload| decode_page_cache(profile, payload).ok().flatten());
        if let Some(pages) = hit {
            log::debug!("page cache hit for profile {}", profile.to_hex());
            let result = PaginationResult {
                text,
                pages,
                style: self.style.clone(),
            };
            return Ok((result, None));
        }
        log::debug!("page cache miss for profile {}", profile.to_hex());
        let result = self.paginate_assembled(text, viewport)?;
        let payload = encode_page_cache(profile, &result.pages)?;
        Ok((result, Some(payload)))
    }

    /// Fingerprint of text, side tables, style and viewport.
    pub fn layout_profile_id(&self, text: &AssembledText, viewport: Viewport) -> LayoutProfileId {
        let settings = format!(
            "{:?}|{:?}|{:?}|{:?}",
            self.style,
            viewport,
            text.style_spans(),
            text.chapter_starts()
        );
        LayoutProfileId::from_parts(&[settings.as_bytes(), text.as_str().as_bytes()])
    }
}

#[derive(Serialize, Deserialize)]
struct PageCacheEnvelope {
    schema_version: u8,
    profile: [u8; 32],
    pages: Vec<PageSlice>,
}

/// Encode page slices for `profile` into a compact cache payload.
pub fn encode_page_cache(
    profile: LayoutProfileId,
    pages: &[PageSlice],
) -> Result<Vec<u8>, PaginationEngineError> {
    let envelope = PageCacheEnvelope {
        schema_version: CACHE_SCHEMA_VERSION,
        profile: profile.0,
        pages: pages.to_vec(),
    };
    postcard::to_allocvec(&envelope).map_err(|err| PaginationEngineError::Cache(err.to_string()))
}

/// Decode a cache payload.
///
/// Returns `Ok(None)` when the payload was written for another profile or
/// schema version.
pub fn decode_page_cache(
    profile: LayoutProfileId,
    payload: &[u8],
) -> Result<Option<Vec<PageSlice>>, PaginationEngineError> {
    let envelope: PageCacheEnvelope = postcard::from_bytes(payload)
        .map_err(|err| PaginationEngineError::Cache(err.to_string()))?;
    if envelope.schema_version != CACHE_SCHEMA_VERSION || envelope.profile != profile.0 {
        return Ok(None);
    }
    Ok(Some(envelope.pages))
}

/// First page whose range contains `offset`.
pub fn page_index_for_offset(pages: &[PageSlice], offset: usize) -> Option<usize> {
    let idx = pages.partition_point(|page| page.end_index <= offset);
    pages
        .get(idx)
        .filter(|page| page.contains(offset))
        .map(|_| idx)
}

/// Reader position for the caller to persist.
///
/// `char_offset` is the durable identity; `page_index` and `total_pages` are
/// layout-dependent and informational only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingPosition {
    pub char_offset: usize,
    pub page_index: usize,
    pub total_pages: usize,
}

impl ReadingPosition {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A marker the reader just resolved; the caller persists it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkerResolved {
    pub key: usize,
}

/// Caller-owned reading session.
///
/// Holds the current pagination result and page index, repaginates on
/// viewport or marker changes while keeping the reader on the page that
/// contains the same character offset.
///
/// The reading offset only moves on navigation. Repagination remaps the page
/// index around it and never changes what the caller should persist.
#[derive(Clone, Debug)]
pub struct ReaderSession {
    engine: PaginationEngine,
    tokens: Vec<FlowToken>,
    markers: MarkerConfig,
    viewport: Viewport,
    result: PaginationResult,
    current_page: usize,
    offset: usize,
    last_reported: Option<usize>,
}

impl ReaderSession {
    /// Paginate `tokens` and restore the page containing `saved_offset`.
    ///
    /// A missing or out-of-range offset opens on page 0.
    pub fn open(
        engine: PaginationEngine,
        tokens: Vec<FlowToken>,
        markers: MarkerConfig,
        viewport: Viewport,
        saved_offset: Option<usize>,
    ) -> Result<Self, PaginationEngineError> {
        let result = engine.paginate(&tokens, &markers, viewport)?;
        let restored = saved_offset.and_then(|offset| {
            page_index_for_offset(&result.pages, offset).map(|page| (page, offset))
        });
        let (current_page, offset) = restored.unwrap_or((0, 0));
        log::debug!(
            "opened session: {} pages, restored page {} from offset {:?}",
            result.page_count(),
            current_page,
            saved_offset
        );
        Ok(Self {
            engine,
            tokens,
            markers,
            viewport,
            result,
            current_page,
            offset,
            last_reported: Some(offset),
        })
    }

    pub fn result(&self) -> &PaginationResult {
        &self.result
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn markers(&self) -> &MarkerConfig {
        &self.markers
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn total_pages(&self) -> usize {
        self.result.page_count()
    }

    /// Text of page `index`.
    pub fn page_text(&self, index: usize) -> Option<&str> {
        self.result.page_text(index)
    }

    /// Text of the current page.
    pub fn current_page_text(&self) -> Option<&str> {
        self.page_text(self.current_page)
    }

    /// Durable reading offset; always inside the current page.
    ///
    /// Set to the page start on navigation and kept across repagination.
    pub fn anchor_offset(&self) -> usize {
        self.offset
    }

    /// Current position, or `None` when the document has no pages.
    pub fn reading_position(&self) -> Option<ReadingPosition> {
        self.result.pages.get(self.current_page)?;
        Some(ReadingPosition {
            char_offset: self.offset,
            page_index: self.current_page,
            total_pages: self.result.page_count(),
        })
    }

    /// Clickable marker at `offset` on the current text, if any.
    pub fn marker_at(&self, offset: usize) -> Option<MarkerAnnotation> {
        self.result.text.marker_at(offset)
    }

    /// Repaginate for `viewport` when it differs by more than the epsilon.
    ///
    /// Returns `Ok(true)` when a new layout was installed. This is not a
    /// navigation event and produces no position update.
    pub fn resize(&mut self, viewport: Viewport) -> Result<bool, PaginationEngineError> {
        if !viewport.differs_from(&self.viewport) {
            return Ok(false);
        }
        let text = self.result.text.clone();
        let result = self.engine.paginate_assembled(text, viewport)?;
        log::debug!(
            "resize {:?} -> {:?}: {} -> {} pages",
            self.viewport,
            viewport,
            self.result.page_count(),
            result.page_count()
        );
        self.viewport = viewport;
        self.install(result);
        Ok(true)
    }

    /// Resolve the marker with `key` and repaginate.
    ///
    /// Unknown or already resolved keys are ignored. On error the session is
    /// left unchanged.
    pub fn resolve_marker(
        &mut self,
        key: usize,
    ) -> Result<Option<MarkerResolved>, PaginationEngineError> {
        let mut markers = self.markers.clone();
        if !markers.resolve(key) {
            log::debug!("ignoring resolve for unknown or resolved marker {}", key);
            return Ok(None);
        }
        let result = self.engine.paginate(&self.tokens, &markers, self.viewport)?;
        self.markers = markers;
        self.install(result);
        Ok(Some(MarkerResolved { key }))
    }

    fn install(&mut self, result: PaginationResult) {
        match page_index_for_offset(&result.pages, self.offset) {
            Some(page) => self.current_page = page,
            None => {
                log::debug!("offset {} past end after repagination; back to page 0", self.offset);
                self.current_page = 0;
                self.offset = 0;
            }
        }
        self.result = result;
    }

    fn navigate(&mut self, page: usize) -> Option<ReadingPosition> {
        let page = page.min(self.total_pages().saturating_sub(1));
        self.current_page = page;
        if let Some(slice) = self.result.pages.get(page) {
            self.offset = slice.start_index;
        }
        self.report_if_changed()
    }

    /// Advance one page. Returns the position to persist when it changed.
    pub fn next_page(&mut self) -> Option<ReadingPosition> {
        self.navigate(self.current_page.saturating_add(1))
    }

    /// Go back one page. Returns the position to persist when it changed.
    pub fn previous_page(&mut self) -> Option<ReadingPosition> {
        self.navigate(self.current_page.saturating_sub(1))
    }

    /// Jump to `page`, clamped to `[0, total_pages - 1]`.
    pub fn go_to_page(&mut self, page: usize) -> Option<ReadingPosition> {
        self.navigate(page)
    }

    /// Position to persist before closing, if the reading offset moved since
    /// the last report. Repagination alone never produces one.
    pub fn flush_position(&mut self) -> Option<ReadingPosition> {
        self.report_if_changed()
    }

    fn report_if_changed(&mut self) -> Option<ReadingPosition> {
        let position = self.reading_position()?;
        if self.last_reported == Some(position.char_offset) {
            return None;
        }
        self.last_reported = Some(position.char_offset);
        Some(position)
    }
}

/// Pagination engine error.
#[derive(Debug)]
pub enum PaginationEngineError {
    /// No line measurer is installed.
    MeasurementUnavailable,
    /// The installed line measurer failed.
    Measure(LineMeasureError),
    /// A page cache payload could not be encoded or decoded.
    Cache(String),
}

impl fmt::Display for PaginationEngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MeasurementUnavailable => write!(f, "line measurement unavailable"),
            Self::Measure(err) => write!(f, "line measurement failed: {}", err),
            Self::Cache(msg) => write!(f, "page cache codec failed: {}", msg),
        }
    }
}

impl std::error::Error for PaginationEngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Measure(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LineMeasureError> for PaginationEngineError {
    fn from(value: LineMeasureError) -> Self {
        Self::Measure(value)
    }
}
