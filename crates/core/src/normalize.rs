//! Cleanup of raw text pulled out of RFP PDFs.
//!
//! Extracted pages are full of dotted leaders, ruled lines, "rest of page
//! blank" markers and words that the extractor emitted several times over
//! (overlapping text layers). [`TextNormalizer::normalize`] strips all of
//! that so the chunker and the embedder only see the real content.

use crate::error::IngestError;
use regex::Regex;

/// Fill-in phrases printed on otherwise empty pages ("below is blank").
const BOILERPLATE_PHRASES: [&str; 2] = ["- 이 하 여 백 -", "이 하 여 백"];

#[derive(Debug, Clone)]
pub struct TextNormalizer {
    separator_run: Regex,
    space_run: Regex,
    newline_run: Regex,
}

impl TextNormalizer {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            separator_run: Regex::new(r"[.\-=_]{3,}")?,
            space_run: Regex::new(r" {2,}")?,
            newline_run: Regex::new(r"\n{2,}")?,
        })
    }

    /// Cleans `text`; the result is stable under another call.
    pub fn normalize(&self, text: &str) -> String {
        let mut current = self.normalize_once(text);
        loop {
            let next = self.normalize_once(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn normalize_once(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut cleaned = text.replace("\r\n", "\n").replace('\t', " ");
        for phrase in BOILERPLATE_PHRASES {
            cleaned = cleaned.replace(phrase, "");
        }

        let cleaned = self.separator_run.replace_all(&cleaned, "");
        let cleaned = collapse_spaced_repeats(&cleaned);
        let cleaned = collapse_glued_repeats(&cleaned);
        let cleaned = self.space_run.replace_all(&cleaned, " ");
        let cleaned = self.newline_run.replace_all(&cleaned, "\n\n");

        cleaned.trim().to_string()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `"특성화 특성화 특성화"` -> `"특성화"`.
///
/// A whole word followed by at least two more copies, each preceded by a
/// single space, is reduced to one copy. Copies are matched as literal text,
/// so a trailing copy may end inside a longer word.
fn collapse_spaced_repeats(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut output = String::with_capacity(text.len());
    let mut index = 0;

    while index < chars.len() {
        let starts_word =
            is_word_char(chars[index]) && (index == 0 || !is_word_char(chars[index - 1]));
        if !starts_word {
            output.push(chars[index]);
            index += 1;
            continue;
        }

        let mut word_end = index;
        while word_end < chars.len() && is_word_char(chars[word_end]) {
            word_end += 1;
        }
        let word = &chars[index..word_end];

        let mut cursor = word_end;
        let mut copies = 0;
        while cursor + 1 + word.len() <= chars.len()
            && chars[cursor] == ' '
            && &chars[cursor + 1..cursor + 1 + word.len()] == word
        {
            cursor += 1 + word.len();
            copies += 1;
        }

        output.extend(word.iter());
        index = if copies >= 2 { cursor } else { word_end };
    }

    output
}

/// `"고도화고도화고도화"` -> `"고도화"`.
///
/// At each position the longest token of two or more word characters that is
/// immediately repeated at least twice more is reduced to one copy.
fn collapse_glued_repeats(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut output = String::with_capacity(text.len());
    let mut index = 0;

    while index < chars.len() {
        if !is_word_char(chars[index]) {
            output.push(chars[index]);
            index += 1;
            continue;
        }

        let mut run_end = index;
        while run_end < chars.len() && is_word_char(chars[run_end]) {
            run_end += 1;
        }
        let run = &chars[index..run_end];

        let token_len = (2..=run.len() / 3).rev().find(|&len| {
            run[len..2 * len] == run[..len] && run[2 * len..3 * len] == run[..len]
        });

        match token_len {
            Some(len) => {
                let mut cursor = 3 * len;
                while cursor + len <= run.len() && run[cursor..cursor + len] == run[..len] {
                    cursor += len;
                }
                output.extend(run[..len].iter());
                index += cursor;
            }
            None => {
                output.push(chars[index]);
                index += 1;
            }
        }
    }

    output
}
