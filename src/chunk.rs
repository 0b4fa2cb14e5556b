//! Paragraph-boundary text chunker.
//!
//! Splits a document's text into [`Chunk`]s of at most `max_tokens`
//! (approximated as four characters per token). Splits happen on paragraph
//! boundaries (`\n\n`); a paragraph longer than the limit is cut at the
//! last newline or space before it.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into chunks with contiguous indices starting at 0.
///
/// Whitespace-only text yields no chunks.
pub fn chunk_text(document_path: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN).max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let joined_len = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };
        if joined_len > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if para.len() > max_chars {
            pieces.extend(hard_split(para, max_chars));
            continue;
        }
        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(para);
    }
    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(document_path, i as i64, piece))
        .collect()
}

/// Cut an oversized paragraph at the last newline or space before
/// `max_chars`, or at the nearest char boundary when there is none.
fn hard_split(para: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut remaining = para;
    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            let piece = remaining.trim();
            if !piece.is_empty() {
                out.push(piece.to_string());
            }
            break;
        }
        let mut limit = max_chars;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let window = &remaining[..limit];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|pos| pos + 1)
            .unwrap_or_else(|| {
                if limit == 0 {
                    remaining.chars().next().map_or(remaining.len(), char::len_utf8)
                } else {
                    limit
                }
            });
        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[cut..];
    }
    out
}

fn make_chunk(document_path: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_path: document_path.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("guide.md", "Hello, world!", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn blank_text_yields_no_chunks() {
        assert!(chunk_text("guide.md", "", 700).is_empty());
        assert!(chunk_text("guide.md", "  \n\n \n", 700).is_empty());
    }

    #[test]
    fn paragraphs_under_limit_merge() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text("guide.md", text, 700);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First paragraph."));
        assert!(chunks[0].text.contains("Third paragraph."));
    }

    #[test]
    fn paragraphs_over_limit_split() {
        // max_tokens=5 => max_chars=20
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text("guide.md", text, 5);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("guide.md", &text, 10);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn deterministic_text_and_hash() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text("guide.md", text, 5);
        let c2 = chunk_text("guide.md", text, 5);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.chunk_index, b.chunk_index);
        }
    }

    #[test]
    fn long_paragraph_split_on_spaces() {
        let text = "word ".repeat(100);
        let chunks = chunk_text("guide.md", &text, 5);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.len() <= 20));
        assert!(chunks.iter().all(|c| c.text.starts_with("word")));
    }

    #[test]
    fn multibyte_text_never_splits_a_char() {
        let text = "é".repeat(50);
        let chunks = chunk_text("guide.md", &text, 1);
        let rejoined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn chunks_carry_document_path() {
        let chunks = chunk_text("docs/guide.md", "Alpha\n\nBeta", 700);
        assert_eq!(chunks[0].document_path, "docs/guide.md");
    }

    #[test]
    fn huge_max_tokens_keeps_one_chunk() {
        let chunks = chunk_text("guide.md", "Alpha\n\nBeta", usize::MAX);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Alpha\n\nBeta");
    }
}
