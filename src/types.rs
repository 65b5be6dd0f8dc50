use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub filename: String,
    pub source_type: SourceType,
    pub created_at: String,
    pub total_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceType {
    LocalFile,
    Url,
}

/// Tunables for one segmentation run. No global state: callers build one of
/// these and pass it through the pipeline.
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// Page index assumed for everything seen before the first
    /// `PAGE_INDEX-<n>` marker.
    pub seed_page: usize,
    /// Maximum chunk length in characters for re-chunked leaf segments.
    pub max_chunk_len: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            seed_page: 0,
            max_chunk_len: 1500,
        }
    }
}

/// A maximal run of pipe-delimited lines lifted out of the prose stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableBlock {
    pub label: String,
    pub page_index: usize,
    pub lines: Vec<String>,
}

impl TableBlock {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PositionElement {
    Plain(String),
    TablePlaceholder(String),
}

impl PositionElement {
    /// Text form used when rendering a context window; placeholders stay as
    /// their literal label.
    pub fn as_text(&self) -> &str {
        match self {
            PositionElement::Plain(line) => line,
            PositionElement::TablePlaceholder(label) => label,
        }
    }
}

/// Lines of the window handed to the table interpreter: four before the
/// placeholder, the placeholder itself, and one after.
pub const CONTEXT_LINES_BEFORE: usize = 4;
pub const CONTEXT_LINES_AFTER: usize = 2;

/// Ordered record of every addressable unit (prose line or table
/// placeholder), with a prebuilt reverse lookup for context retrieval.
/// Page markers are not addressable and never appear here.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PositionIndex {
    elements: Vec<PositionElement>,
    #[serde(skip)]
    lookup: HashMap<String, usize>,
}

// The lookup is derived state, so it is rebuilt rather than serialized.
impl<'de> Deserialize<'de> for PositionIndex {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Repr {
            elements: Vec<PositionElement>,
        }

        let repr = Repr::deserialize(deserializer)?;
        let mut index = PositionIndex::new();
        for element in repr.elements {
            index.push(element);
        }
        Ok(index)
    }
}

impl PositionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element: PositionElement) {
        let key = element.as_text().to_string();
        // First occurrence wins; only placeholder labels are unique by
        // construction and only those are ever looked up.
        self.lookup.entry(key).or_insert(self.elements.len());
        self.elements.push(element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[PositionElement] {
        &self.elements
    }

    pub fn ordinal_of(&self, key: &str) -> Option<usize> {
        self.lookup.get(key).copied()
    }

    /// Bounded slice `[i-4, i+2)` around the element with the given key,
    /// rendered as newline-joined text. Clamped at both stream boundaries.
    pub fn context_window(&self, key: &str) -> Option<String> {
        let i = self.ordinal_of(key)?;
        let start = i.saturating_sub(CONTEXT_LINES_BEFORE);
        let end = (i + CONTEXT_LINES_AFTER).min(self.elements.len());
        let window: Vec<&str> = self.elements[start..end]
            .iter()
            .map(PositionElement::as_text)
            .collect();
        Some(window.join("\n"))
    }
}

/// Result of the single-pass segmentation scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentedDocument {
    /// Table catalogue in encounter order; labels are unique per run.
    pub tables: Vec<TableBlock>,
    pub positions: PositionIndex,
    /// Prose stream with tables removed and page markers retained.
    pub prose: Vec<String>,
}

impl SegmentedDocument {
    pub fn table_by_label(&self, label: &str) -> Option<&TableBlock> {
        self.tables.iter().find(|t| t.label == label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: usize,
    /// Unique key: header line plus page index, or a synthetic key for
    /// preamble/untitled segments.
    pub key: String,
    /// Raw header line (e.g. `## Emissions`); `None` for preamble and
    /// untitled segments.
    pub heading: Option<String>,
    pub page_index: usize,
    pub body: SectionBody,
}

/// Encounter order is carried by the surrounding `Vec`, not by key order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SectionBody {
    /// Level-1 container holding level-2 sections.
    Sections(Vec<Section>),
    /// Leaf: re-chunked text, each chunk bounded by `max_chunk_len`.
    Chunks(Vec<String>),
}

impl Section {
    /// Header text with the hash markers stripped, when the section has one.
    pub fn title(&self) -> Option<&str> {
        self.heading
            .as_deref()
            .map(|h| h.trim_start_matches('#').trim())
    }

    /// Raw lines of this section and all nested sections, headings included,
    /// in encounter order.
    pub fn raw_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.collect_lines(&mut lines);
        lines
    }

    fn collect_lines(&self, out: &mut Vec<String>) {
        if let Some(heading) = &self.heading {
            out.push(heading.clone());
        }
        match &self.body {
            SectionBody::Sections(children) => {
                for child in children {
                    child.collect_lines(out);
                }
            }
            SectionBody::Chunks(chunks) => {
                for chunk in chunks {
                    out.extend(chunk.lines().map(str::to_string));
                }
            }
        }
    }
}

/// Shared API configuration for both LLM collaborators. Built once by the
/// caller, never read from process-global state.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Structured form of a table-interpreter reply. `data` is required; rows may
/// be keyed records or positional value lists, so it stays a raw JSON value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredTable {
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_index: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InterpretationResult {
    Structured(StructuredTable),
    /// The reply was not valid JSON with a `data` field; kept verbatim.
    Raw(String),
    /// The call itself failed; sibling tables are unaffected.
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInterpretation {
    pub label: String,
    pub page_index: usize,
    pub result: InterpretationResult,
}

/// One page image handed to the page renderer, with any annotated region
/// images belonging to it.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page_index: usize,
    pub image_path: PathBuf,
    pub region_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PromptSet {
    pub main: String,
    pub region: String,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub workers: usize,
    pub attempt_timeout: Duration,
    pub max_retries: usize,
    pub prompts: PromptSet,
}

#[derive(Debug, Clone)]
pub struct RenderedDocument {
    /// All pages concatenated in page order, each prefixed by its
    /// `PAGE_INDEX-<n>` marker.
    pub content: String,
    /// Pages whose render failed after retries; their markers are still
    /// present in `content` with an empty body.
    pub failed_pages: Vec<(usize, String)>,
}
