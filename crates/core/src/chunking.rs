use crate::config::IngestionOptions;
use crate::error::IngestError;
use crate::models::{Chunk, NormalizedPage};
use sha2::{Digest, Sha256};
use std::ops::Range;

/// Split points, tried in order: paragraph, line, word, then any character.
pub const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            chunk_overlap: value.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A piece of a page together with its character offset in that page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub start: usize,
    pub text: String,
}

/// Splits `text` into spans of at most `chunk_size` characters.
///
/// Consecutive spans share up to `chunk_overlap` characters. Separators stay
/// attached to the front of the piece that follows them, and each span is
/// trimmed of surrounding whitespace.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<TextSpan> {
    let chars: Vec<char> = text.chars().collect();
    let separators: Vec<Vec<char>> = SEPARATORS.iter().map(|sep| sep.chars().collect()).collect();

    split_range(&chars, 0..chars.len(), &separators, config)
        .into_iter()
        .filter_map(|range| trim_range(&chars, range))
        .map(|range| TextSpan {
            start: range.start,
            text: chars[range].iter().collect(),
        })
        .collect()
}

fn split_range(
    chars: &[char],
    range: Range<usize>,
    separators: &[Vec<char>],
    config: ChunkingConfig,
) -> Vec<Range<usize>> {
    let Some(position) = separators
        .iter()
        .position(|sep| sep.is_empty() || contains(&chars[range.clone()], sep))
    else {
        return vec![range];
    };
    let separator = &separators[position];
    let finer = &separators[position + 1..];

    let mut output = Vec::new();
    let mut small = Vec::new();

    for piece in split_keep_separator(chars, range, separator) {
        if piece.len() < config.chunk_size {
            small.push(piece);
            continue;
        }

        if !small.is_empty() {
            output.extend(merge_pieces(&small, config));
            small.clear();
        }
        if finer.is_empty() {
            output.push(piece);
        } else {
            output.extend(split_range(chars, piece, finer, config));
        }
    }

    if !small.is_empty() {
        output.extend(merge_pieces(&small, config));
    }

    output
}

fn contains(haystack: &[char], needle: &[char]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Cuts `range` in front of every occurrence of `separator`.
fn split_keep_separator(
    chars: &[char],
    range: Range<usize>,
    separator: &[char],
) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return range.map(|index| index..index + 1).collect();
    }

    let mut cuts = vec![range.start];
    let mut index = range.start;
    while index + separator.len() <= range.end {
        if &chars[index..index + separator.len()] == separator {
            cuts.push(index);
            index += separator.len();
        } else {
            index += 1;
        }
    }
    cuts.push(range.end);

    cuts.windows(2)
        .map(|pair| pair[0]..pair[1])
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Greedily packs contiguous pieces into windows of at most `chunk_size`,
/// carrying up to `chunk_overlap` characters of trailing pieces forward.
fn merge_pieces(pieces: &[Range<usize>], config: ChunkingConfig) -> Vec<Range<usize>> {
    let mut merged = Vec::new();
    let mut window: Vec<Range<usize>> = Vec::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = piece.len();
        if total + len > config.chunk_size && !window.is_empty() {
            merged.push(span_of(&window));
            while total > config.chunk_overlap
                || (total + len > config.chunk_size && total > 0)
            {
                let dropped = window.remove(0);
                total -= dropped.len();
            }
        }
        window.push(piece.clone());
        total += len;
    }

    if !window.is_empty() {
        merged.push(span_of(&window));
    }

    merged
}

fn span_of(window: &[Range<usize>]) -> Range<usize> {
    let start = window.first().map(|piece| piece.start).unwrap_or_default();
    let end = window.last().map(|piece| piece.end).unwrap_or(start);
    start..end
}

fn trim_range(chars: &[char], range: Range<usize>) -> Option<Range<usize>> {
    let mut start = range.start;
    let mut end = range.end;
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    (start < end).then_some(start..end)
}

/// Chunks every page independently; chunk indices run across the whole corpus.
pub fn build_chunks(
    pages: &[NormalizedPage],
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in pages {
        for span in split_text(&page.text, config) {
            chunks.push(Chunk {
                chunk_id: make_chunk_id(&page.source, page.page, cursor, &span.text),
                source: page.source.clone(),
                page: page.page,
                chunk_index: cursor,
                start_offset: span.start,
                text: span.text,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}

fn make_chunk_id(source: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
