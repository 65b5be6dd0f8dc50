use crate::types::{
    PositionElement, PositionIndex, SegmentConfig, SegmentedDocument, TableBlock,
};
use regex::Regex;
use tracing::{debug, info};

/// Single-pass segmentation over a page-annotated markdown stream: tracks the
/// current page index, lifts table blocks out of the prose, and records every
/// addressable unit in a position index.
pub struct Segmenter {
    marker_pattern: Regex,
    pipe_pattern: Regex,
}

impl Segmenter {
    pub fn new() -> Self {
        Self {
            marker_pattern: Regex::new(r"^PAGE_INDEX-(\d+)$").unwrap(),
            pipe_pattern: Regex::new(r"\|+").unwrap(),
        }
    }

    /// Scan `content` left to right. Never fails: malformed table shapes are
    /// still just pipe-bearing lines.
    pub fn segment(&self, content: &str, config: &SegmentConfig) -> SegmentedDocument {
        let lines: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let mut page_index = config.seed_page;
        let mut tables: Vec<TableBlock> = Vec::new();
        let mut positions = PositionIndex::new();
        let mut prose: Vec<String> = Vec::new();
        let mut buffer: Vec<String> = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            if let Some(index) = self.parse_marker(line) {
                // Markers stay in the prose stream for the header splitter but
                // are not addressable units.
                page_index = index;
                prose.push(line.to_string());
                continue;
            }

            if !self.has_pipe(line) {
                // A single non-pipe line does not close an open table block;
                // it is ordinary prose either way.
                prose.push(line.to_string());
                positions.push(PositionElement::Plain(line.to_string()));
                continue;
            }

            buffer.push(line.to_string());

            if self.block_closes(&lines, i) {
                let label = format!("markdown_tables[{}]", tables.len());
                debug!(
                    "closing table block {} on page {} ({} lines)",
                    label,
                    page_index,
                    buffer.len()
                );
                positions.push(PositionElement::TablePlaceholder(label.clone()));
                tables.push(TableBlock {
                    label,
                    page_index,
                    lines: std::mem::take(&mut buffer),
                });
            }
        }

        info!(
            "segmented {} lines into {} tables and {} position elements",
            lines.len(),
            tables.len(),
            positions.len()
        );

        SegmentedDocument {
            tables,
            positions,
            prose,
        }
    }

    fn parse_marker(&self, line: &str) -> Option<usize> {
        self.marker_pattern
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// An open block closes when neither of the next two lines contains a
    /// pipe. A line past the end of the stream counts as containing no pipe,
    /// so the lookahead never reads out of range and the last line always
    /// closes the block.
    fn block_closes(&self, lines: &[&str], i: usize) -> bool {
        !self.lookahead_has_pipe(lines, i + 1) && !self.lookahead_has_pipe(lines, i + 2)
    }

    fn lookahead_has_pipe(&self, lines: &[&str], i: usize) -> bool {
        lines.get(i).is_some_and(|line| self.has_pipe(line))
    }

    fn has_pipe(&self, line: &str) -> bool {
        self.pipe_pattern.is_match(line)
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}
