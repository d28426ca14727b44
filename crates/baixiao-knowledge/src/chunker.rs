//! Text preprocessing and recursive character chunking.

use regex::Regex;
use std::sync::LazyLock;

/// Separators tried in order, coarsest first. `""` means a hard split.
const SEPARATORS: &[&str] = &["\n\n", "\n", "。", ". ", " ", ""];

static HORIZONTAL_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
static VERTICAL_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Collapse runs of spaces/tabs and 3+ blank lines, then trim.
pub fn preprocess(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = HORIZONTAL_WS.replace_all(&text, " ");
    let text = VERTICAL_WS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Splits text into chunks of at most `chunk_size` characters, preferring
/// paragraph, line and sentence boundaries.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.split_recursive(text, SEPARATORS, &mut out);
        out.into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        if char_len(text) <= self.chunk_size {
            out.push(text.to_string());
            return;
        }

        let idx = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(idx).copied().unwrap_or("");
        if separator.is_empty() {
            self.hard_split(text, out);
            return;
        }
        let finer = &separators[idx + 1..];

        let mut current = String::new();
        for piece in text.split_inclusive(separator) {
            let piece_len = char_len(piece);
            if piece_len > self.chunk_size {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                self.split_recursive(piece, finer, out);
                continue;
            }
            if char_len(&current) + piece_len > self.chunk_size {
                let tail = tail_chars(&current, self.chunk_overlap);
                out.push(std::mem::take(&mut current));
                if char_len(&tail) + piece_len <= self.chunk_size {
                    current = tail;
                }
            }
            current.push_str(piece);
        }
        if !current.is_empty() {
            out.push(current);
        }
    }

    fn hard_split(&self, text: &str, out: &mut Vec<String>) {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            out.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn tail_chars(s: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let len = char_len(s);
    s.chars().skip(len.saturating_sub(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_collapses_whitespace() {
        let raw = "  a \t\t b\n\n\n\n\nc  ";
        assert_eq!(preprocess(raw), "a b\n\nc");
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = Chunker::new(250, 0);
        assert_eq!(chunker.split("hello world"), vec!["hello world"]);
    }

    #[test]
    fn test_blank_text_yields_nothing() {
        let chunker = Chunker::new(10, 0);
        assert!(chunker.split("   \n\n  ").is_empty());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let chunker = Chunker::new(20, 0);
        let text = "first paragraph.\n\nsecond paragraph.\n\nthird one.";
        let chunks = chunker.split(text);
        assert_eq!(
            chunks,
            vec!["first paragraph.", "second paragraph.", "third one."]
        );
    }

    #[test]
    fn test_chunks_respect_size_in_chars() {
        let chunker = Chunker::new(8, 0);
        let text = "猫咪喜欢晒太阳。猫咪也喜欢吃鱼。小狗喜欢散步和玩球。";
        for chunk in chunker.split(text) {
            assert!(chunk.chars().count() <= 8, "chunk too long: {chunk}");
        }
    }

    #[test]
    fn test_hard_split_without_separators() {
        let chunker = Chunker::new(4, 0);
        let chunks = chunker.split("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_hard_split_with_overlap() {
        let chunker = Chunker::new(4, 2);
        let chunks = chunker.split("abcdefgh");
        assert_eq!(chunks, vec!["abcd", "cdef", "efgh"]);
    }

    #[test]
    fn test_overlap_is_clamped() {
        let chunker = Chunker::new(3, 10);
        // Overlap clamps to size-1, so progress is guaranteed.
        let chunks = chunker.split("abcdef");
        assert_eq!(chunks.first().map(String::as_str), Some("abc"));
        assert_eq!(chunks.last().map(String::as_str), Some("def"));
    }
}
