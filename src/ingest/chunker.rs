//! Character splitter with overlap.
//!
//! Tiered splitting strategy, lengths measured in characters:
//! 1. Split at blank lines (paragraphs)
//! 2. Pieces still over budget are split at single newlines
//! 3. Then at spaces (words)
//! 4. Last resort: individual characters
//!
//! Pieces are merged back up to `chunk_size`; consecutive chunks share up to
//! `chunk_overlap` characters of trailing pieces.

use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, DocumentRecord};

const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Linearized text of one page. Formats without pages use a single
/// unlabelled page.
#[derive(Debug, Clone)]
pub struct PageText {
    pub label: Option<String>,
    pub text: String,
}

impl PageText {
    pub fn unpaged(text: impl Into<String>) -> Self {
        Self {
            label: None,
            text: text.into(),
        }
    }
}

/// Chunk a document page by page. `chunk_index` runs contiguously from 0
/// across all pages.
pub fn chunk_document(
    document: &DocumentRecord,
    pages: &[PageText],
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for page in pages {
        for content in split_text(&page.text, config) {
            chunks.push(Chunk {
                document_id: document.id.clone(),
                chunk_index: chunks.len(),
                path: document.path.clone(),
                page_label: page.label.clone(),
                content,
            });
        }
    }
    chunks
}

/// Split text into chunks of at most `chunk_size` characters.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(size.saturating_sub(1));
    split_recursive(text, SEPARATORS, size, overlap)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(text: &str, separators: &[&str], size: usize, overlap: usize) -> Vec<String> {
    // First separator present in the text; "" always applies
    let position = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(position).copied().unwrap_or("");
    let finer = separators.get(position + 1..).unwrap_or(&[]);

    let pieces: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split(separator).filter(|p| !p.is_empty()).collect()
    };

    let mut out = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();
    for piece in pieces {
        if char_len(piece) <= size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            out.extend(merge_pieces(&fitting, separator, size, overlap));
            fitting.clear();
        }
        if finer.is_empty() {
            out.push(piece.trim().to_string());
        } else {
            out.extend(split_recursive(piece, finer, size, overlap));
        }
    }
    if !fitting.is_empty() {
        out.extend(merge_pieces(&fitting, separator, size, overlap));
    }

    out.retain(|c| !c.trim().is_empty());
    out
}

/// Greedily join pieces up to `size`, carrying trailing pieces worth at most
/// `overlap` characters into the next chunk.
fn merge_pieces(pieces: &[&str], separator: &str, size: usize, overlap: usize) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);
        let joiner = if window.is_empty() { 0 } else { sep_len };

        if total + joiner + len > size && !window.is_empty() {
            push_joined(&mut chunks, &window, separator);
            // Shrink the window to the overlap and until the new piece fits
            while !window.is_empty() {
                if total <= overlap && total + sep_len + len <= size {
                    break;
                }
                let first = char_len(window[0]);
                let trailing_sep = if window.len() > 1 { sep_len } else { 0 };
                total -= first + trailing_sep;
                window.pop_front();
            }
        }

        let joiner = if window.is_empty() { 0 } else { sep_len };
        total += joiner + len;
        window.push_back(piece);
    }

    if !window.is_empty() {
        push_joined(&mut chunks, &window, separator);
    }
    chunks
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
