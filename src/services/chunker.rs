use tracing::debug;

/// Default separator priority: paragraph break, CJK sentence terminator,
/// page-marker token, plain whitespace.
const DEFAULT_SEPARATORS: [&str; 4] = ["\n", "\u{3002}", "PAGE_INDEX-", " "];

/// Splits oversized leaf segments into bounded sub-segments along a
/// prioritized separator list. Lengths are measured in characters, not bytes:
/// the corpus is largely CJK text.
pub struct Rechunker {
    max_len: usize,
    separators: Vec<String>,
}

impl Rechunker {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Content at or under the limit comes back as a single chunk; callers
    /// must handle both shapes.
    pub fn rechunk(&self, text: &str) -> Vec<String> {
        if char_len(text) <= self.max_len {
            return vec![text.to_string()];
        }
        let chunks = self.split_with(text, 0);
        debug!(
            "re-chunked {} chars into {} pieces",
            char_len(text),
            chunks.len()
        );
        chunks
    }

    fn split_with(&self, text: &str, sep_idx: usize) -> Vec<String> {
        if char_len(text) <= self.max_len {
            return vec![text.to_string()];
        }
        let Some(separator) = self.separators.get(sep_idx) else {
            // No separator left: a single unsplittable token passes through
            // whole rather than being cut mid-token.
            return vec![text.to_string()];
        };

        let pieces: Vec<&str> = text.split(separator.as_str()).collect();
        if pieces.len() == 1 {
            return self.split_with(text, sep_idx + 1);
        }

        self.merge_pieces(&pieces, separator, sep_idx)
    }

    /// Greedily re-merge split pieces (separator included) up to the limit;
    /// pieces that alone exceed it recurse on the next separator.
    fn merge_pieces(&self, pieces: &[&str], separator: &str, sep_idx: usize) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for piece in pieces {
            if char_len(piece) > self.max_len {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                chunks.extend(self.split_with(piece, sep_idx + 1));
                continue;
            }

            let joined_len = if current.is_empty() {
                char_len(piece)
            } else {
                char_len(&current) + char_len(separator) + char_len(piece)
            };

            if joined_len > self.max_len && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str(separator);
            }
            current.push_str(piece);
        }

        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_within_limit_is_returned_unchanged() {
        let chunker = Rechunker::new(100);
        let text = "short paragraph\nwith two lines";
        assert_eq!(chunker.rechunk(text), vec![text.to_string()]);
    }

    #[test]
    fn oversized_content_splits_on_paragraph_breaks_first() {
        let chunker = Rechunker::new(10);
        let chunks = chunker.rechunk("aaaa\nbbbb\ncccc");

        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        // Pieces that fit together stay together, separator included.
        assert_eq!(chunks, vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn falls_back_to_sentence_terminator() {
        let chunker = Rechunker::new(6);
        let chunks = chunker.rechunk("一二三。四五六。七八九。");

        assert!(chunks.iter().all(|c| c.chars().count() <= 6));
        assert!(chunks.len() >= 2);
        // No split lands inside a sentence.
        assert_eq!(chunks.join("。").replace("。。", "。"), "一二三。四五六。七八九。");
    }

    #[test]
    fn splits_on_page_marker_token() {
        let chunker = Rechunker::new(20);
        let text = "some leading prose PAGE_INDEX-4 trailing prose here";
        let chunks = chunker.rechunk(text);

        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
    }

    #[test]
    fn unsplittable_token_passes_through_whole() {
        let chunker = Rechunker::new(5);
        let token = "abcdefghij";
        assert_eq!(chunker.rechunk(token), vec![token.to_string()]);
    }

    #[test]
    fn oversized_word_inside_text_is_isolated() {
        let chunker = Rechunker::new(5);
        let chunks = chunker.rechunk("ab abcdefghij cd");

        assert!(chunks.contains(&"abcdefghij".to_string()));
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 5 || *chunk == "abcdefghij");
        }
    }

    #[test]
    fn lengths_are_counted_in_characters_not_bytes() {
        let chunker = Rechunker::new(4);
        // Four CJK chars: 12 bytes but 4 chars, so no split.
        assert_eq!(chunker.rechunk("一二三四"), vec!["一二三四".to_string()]);
    }
}
