//! Character-based text splitter for reference documents.
//!
//! Text is split on paragraph breaks first, then line breaks, then into
//! fixed windows for anything still too long. The pieces are merged back
//! into chunks of at most `chunk_size` characters, with the tail of each
//! chunk repeated at the start of the next one up to `chunk_overlap`.

use std::collections::VecDeque;

const JOINER: &str = "\n\n";
const SEPARATORS: [&str; 2] = ["\n\n", "\n"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(500, 50)
    }
}

impl TextSplitter {
    /// Overlap is clamped below the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks. Blank input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        self.collect_pieces(text, 0, &mut pieces);
        self.merge(pieces)
    }

    fn collect_pieces(&self, text: &str, level: usize, out: &mut Vec<String>) {
        for part in text.split(SEPARATORS[level]) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if char_len(part) <= self.chunk_size {
                out.push(part.to_string());
            } else if level + 1 < SEPARATORS.len() {
                self.collect_pieces(part, level + 1, out);
            } else {
                out.extend(self.windows(part));
            }
        }
    }

    fn windows(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(chars.len());
            out.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start = end - self.chunk_overlap;
        }
        out
    }

    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let sep_len = char_len(JOINER);
        let mut chunks = Vec::new();
        let mut current: VecDeque<(String, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(&piece);
            let joiner = |current: &VecDeque<(String, usize)>| if current.is_empty() { 0 } else { sep_len };

            if total + len + joiner(&current) > self.chunk_size && !current.is_empty() {
                chunks.push(join(&current));
                while total > self.chunk_overlap
                    || (total > 0 && total + len + joiner(&current) > self.chunk_size)
                {
                    let Some((_, first_len)) = current.pop_front() else {
                        break;
                    };
                    total -= first_len + if current.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + joiner(&current);
            current.push_back((piece, len));
        }

        if !current.is_empty() {
            chunks.push(join(&current));
        }
        chunks
    }
}

fn join(pieces: &VecDeque<(String, usize)>) -> String {
    pieces
        .iter()
        .map(|(p, _)| p.as_str())
        .collect::<Vec<_>>()
        .join(JOINER)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
