use crate::services::chunker::Rechunker;
use crate::types::{SegmentConfig, Section, SectionBody};
use regex::Regex;
use tracing::{debug, info};

/// Monotonic section id generator, scoped to one split invocation.
#[derive(Default)]
struct IdGen(usize);

impl IdGen {
    fn next_id(&mut self) -> usize {
        let id = self.0;
        self.0 += 1;
        id
    }
}

/// A segment produced by one splitting level, before chunking.
struct RawSegment {
    key: String,
    heading: Option<String>,
    page_index: usize,
    lines: Vec<String>,
}

/// Two-level recursive header split over a tables-removed prose stream with
/// page markers still embedded. The same walk runs at both levels,
/// parameterized by the header pattern; level-2 leaves are re-chunked.
pub struct HeaderSplitter {
    level1_pattern: Regex,
    level2_pattern: Regex,
    marker_pattern: Regex,
}

impl HeaderSplitter {
    pub fn new() -> Self {
        Self {
            // A single hash plus space; `## ` does not match.
            level1_pattern: Regex::new(r"^# ").unwrap(),
            level2_pattern: Regex::new(r"^## ").unwrap(),
            marker_pattern: Regex::new(r"^PAGE_INDEX-(\d+)$").unwrap(),
        }
    }

    pub fn split(&self, prose: &[String], config: &SegmentConfig) -> Vec<Section> {
        let chunker = Rechunker::new(config.max_chunk_len);
        let mut ids = IdGen::default();

        let level1 = self
            .split_level(prose, &self.level1_pattern, 1, config.seed_page)
            .unwrap_or_else(|| {
                // No level-1 header anywhere: the whole stream becomes one
                // untitled segment and still gets a level-2 pass.
                vec![RawSegment {
                    key: "ALL CONTENT AT LEVEL 1".to_string(),
                    heading: None,
                    page_index: config.seed_page,
                    lines: prose.to_vec(),
                }]
            });

        info!("split prose into {} level-1 segments", level1.len());

        level1
            .into_iter()
            .map(|seg| self.build_section(seg, &chunker, &mut ids))
            .collect()
    }

    /// Level-2 pass for one level-1 segment, seeded with that segment's page
    /// index. When no level-2 header exists the content goes straight to the
    /// re-chunker instead of being wrapped in another section layer.
    fn build_section(&self, seg: RawSegment, chunker: &Rechunker, ids: &mut IdGen) -> Section {
        let id = ids.next_id();
        let body = match self.split_level(&seg.lines, &self.level2_pattern, 2, seg.page_index) {
            None => SectionBody::Chunks(Self::chunk_lines(&seg.lines, chunker)),
            Some(subsegments) => SectionBody::Sections(
                subsegments
                    .into_iter()
                    .map(|sub| Section {
                        id: ids.next_id(),
                        key: sub.key,
                        heading: sub.heading,
                        page_index: sub.page_index,
                        body: SectionBody::Chunks(Self::chunk_lines(&sub.lines, chunker)),
                    })
                    .collect(),
            ),
        };

        Section {
            id,
            key: seg.key,
            heading: seg.heading,
            page_index: seg.page_index,
            body,
        }
    }

    /// One walk of the shared splitting algorithm. Returns `None` when the
    /// pattern never matches, handing the untouched lines back to the caller.
    fn split_level(
        &self,
        lines: &[String],
        pattern: &Regex,
        level: u8,
        seed_page: usize,
    ) -> Option<Vec<RawSegment>> {
        let mut page = seed_page;
        let mut last_match: Option<(usize, usize)> = None;
        let mut segments = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            if let Some(index) = self.parse_marker(line) {
                page = index;
            }

            if !pattern.is_match(line) {
                continue;
            }

            match last_match {
                // Content before the first header becomes a preamble segment,
                // tagged with the page index in effect just before the header.
                None if i > 0 => segments.push(RawSegment {
                    key: format!("SPLIT AT LEVEL {}, PAGE_{}", level, page),
                    heading: None,
                    page_index: page,
                    lines: lines[..i].to_vec(),
                }),
                None => {}
                Some((pos, header_page)) => {
                    segments.push(self.header_segment(lines, pos, header_page, &lines[pos + 1..i]))
                }
            }
            last_match = Some((i, page));
        }

        let (pos, header_page) = last_match?;
        // A header that is the very last line yields a segment holding just
        // that heading, with an empty body.
        segments.push(self.header_segment(lines, pos, header_page, &lines[pos + 1..]));

        debug!("level {} produced {} segments", level, segments.len());
        Some(segments)
    }

    fn header_segment(
        &self,
        lines: &[String],
        pos: usize,
        header_page: usize,
        body: &[String],
    ) -> RawSegment {
        let heading = lines[pos].clone();
        RawSegment {
            // Identical header text on different pages stays distinct.
            key: format!("{} _{}", heading, header_page),
            heading: Some(heading),
            page_index: header_page,
            lines: body.to_vec(),
        }
    }

    fn chunk_lines(lines: &[String], chunker: &Rechunker) -> Vec<String> {
        if lines.is_empty() {
            return Vec::new();
        }
        chunker.rechunk(&lines.join("\n"))
    }

    fn parse_marker(&self, line: &str) -> Option<usize> {
        self.marker_pattern
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

impl Default for HeaderSplitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| l.to_string()).collect()
    }

    fn split(raw: &[&str]) -> Vec<Section> {
        HeaderSplitter::new().split(&lines(raw), &SegmentConfig::default())
    }

    fn body_chunks(section: &Section) -> Vec<String> {
        match &section.body {
            SectionBody::Chunks(chunks) => chunks.clone(),
            SectionBody::Sections(_) => panic!("expected leaf section"),
        }
    }

    #[test]
    fn two_level_split_with_pages() {
        let sections = split(&[
            "PAGE_INDEX-0",
            "# Title",
            "par1",
            "## Sub",
            "par2",
            "end",
        ]);

        // Marker-only preamble plus the titled segment.
        assert_eq!(sections.len(), 2);
        assert!(sections[0].heading.is_none());
        assert_eq!(sections[0].page_index, 0);

        let title = &sections[1];
        assert_eq!(title.title(), Some("Title"));
        assert_eq!(title.key, "# Title _0");
        assert_eq!(title.page_index, 0);

        let SectionBody::Sections(subs) = &title.body else {
            panic!("expected level-2 sections");
        };
        assert_eq!(subs.len(), 2);
        // Level-2 preamble holds the content before the first subheader.
        assert!(subs[0].heading.is_none());
        assert_eq!(body_chunks(&subs[0]), vec!["par1"]);
        assert_eq!(subs[1].title(), Some("Sub"));
        assert_eq!(body_chunks(&subs[1]), vec!["par2\nend"]);
    }

    #[test]
    fn no_headers_yields_single_untitled_segment() {
        let sections = split(&["PAGE_INDEX-2", "just prose", "more prose"]);

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].key, "ALL CONTENT AT LEVEL 1");
        assert!(sections[0].heading.is_none());
        assert_eq!(
            body_chunks(&sections[0]),
            vec!["PAGE_INDEX-2\njust prose\nmore prose"]
        );
    }

    #[test]
    fn header_at_position_zero_emits_no_preamble() {
        let sections = split(&["# First", "body"]);

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title(), Some("First"));
    }

    #[test]
    fn trailing_header_yields_heading_only_segment() {
        let sections = split(&["# A", "body", "# B"]);

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].title(), Some("B"));
        assert!(body_chunks(&sections[1]).is_empty());
    }

    #[test]
    fn trailing_header_stream_reconstructs_without_duplication() {
        let input = lines(&["# A", "body", "# B"]);
        let sections = HeaderSplitter::new().split(&input, &SegmentConfig::default());

        let mut recovered = Vec::new();
        for section in &sections {
            recovered.extend(section.raw_lines());
        }
        assert_eq!(recovered, input);
    }

    #[test]
    fn identical_headers_on_different_pages_get_distinct_keys() {
        let sections = split(&[
            "PAGE_INDEX-1",
            "# Emissions",
            "scope one",
            "PAGE_INDEX-2",
            "# Emissions",
            "scope two",
        ]);

        // Marker-only preamble plus the two Emissions sections.
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[1].key, "# Emissions _1");
        assert_eq!(sections[2].key, "# Emissions _2");
        assert_eq!(sections[2].page_index, 2);
    }

    #[test]
    fn headers_capture_page_index_at_match_time() {
        let sections = split(&[
            "intro",
            "PAGE_INDEX-5",
            "# Late",
            "body",
        ]);

        assert_eq!(sections.len(), 2);
        // Preamble tagged with the index in effect just before the header.
        assert_eq!(sections[0].page_index, 5);
        assert_eq!(sections[1].page_index, 5);
    }

    #[test]
    fn level_two_seeded_with_segment_page() {
        let sections = split(&[
            "PAGE_INDEX-3",
            "# Outer",
            "lead",
            "## Inner",
            "body",
        ]);

        let SectionBody::Sections(subs) = &sections[1].body else {
            panic!("expected level-2 sections");
        };
        // No marker inside the segment: both subsections inherit page 3.
        assert_eq!(subs[0].page_index, 3);
        assert_eq!(subs[1].page_index, 3);
    }

    #[test]
    fn level_one_concatenation_reproduces_prose_stream() {
        let input = lines(&[
            "PAGE_INDEX-0",
            "preamble line",
            "# One",
            "alpha",
            "## Sub",
            "beta",
            "PAGE_INDEX-1",
            "# Two",
            "gamma",
        ]);
        let sections = HeaderSplitter::new().split(&input, &SegmentConfig::default());

        let mut recovered = Vec::new();
        for section in &sections {
            recovered.extend(section.raw_lines());
        }
        assert_eq!(recovered, input);
    }

    #[test]
    fn long_leaf_content_is_rechunked() {
        let config = SegmentConfig {
            max_chunk_len: 10,
            ..SegmentConfig::default()
        };
        let input = lines(&["# H", "aaaa", "bbbb", "cccc"]);
        let sections = HeaderSplitter::new().split(&input, &config);

        let chunks = body_chunks(&sections[0]);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }
}
