//! Recursive separator text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `max_size` characters,
//! with consecutive chunks sharing exactly `overlap` characters. Cut points
//! prefer the largest semantic boundary that still fits, trying each level of
//! the separator hierarchy in turn:
//!
//! 1. paragraph breaks (`\n\n`)
//! 2. line breaks (`\n`)
//! 3. sentence ends (`. `, `! `, `? `)
//!
//! A sentence longer than `max_size` is emitted whole as one oversized chunk
//! instead of being cut mid-text. A shorter unit that only overflows because
//! of the carried overlap is cut at the character level.
//!
//! Every chunk's text is an exact slice of the source, so the document can be
//! rebuilt by concatenating the chunks after dropping the first `overlap`
//! characters of every chunk but the first. Each chunk receives a random
//! UUID plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, Document};

/// Separator hierarchy, coarsest first. A separator stays attached to the
/// piece it terminates.
const SEPARATORS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? "]];

/// Split a document into chunks, carrying its source and page onto each chunk.
///
/// Whitespace-only chunks carry nothing to retrieve and are dropped, so the
/// surviving chunk indices may have gaps.
pub fn chunk_document(doc: &Document, max_size: usize, overlap: usize) -> Vec<Chunk> {
    split(&doc.id, &doc.text, max_size, overlap)
        .into_iter()
        .filter(|chunk| !chunk.text.trim().is_empty())
        .map(|mut chunk| {
            chunk.source = doc.source.clone();
            chunk.page = doc.page;
            chunk
        })
        .collect()
}

/// Split text into overlapping chunks of at most `max_size` characters.
///
/// Returns chunks with contiguous indices starting at 0. Empty or
/// whitespace-only input yields no chunks. `overlap` is clamped below
/// `max_size`.
pub fn split(document_id: &str, text: &str, max_size: usize, overlap: usize) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let max_size = max_size.max(1);
    let overlap = overlap.min(max_size - 1);

    // Byte offset of every char position, plus the end of the text.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = offsets.len() - 1;

    // Units are sized so that a unit plus the carried-over overlap still fits.
    let mut unit_ends = Vec::new();
    collect_unit_ends(text, 0, 0, max_size - overlap, &mut unit_ends);
    let bounds: Vec<usize> = unit_ends
        .iter()
        .map(|&b| offsets.partition_point(|&o| o < b))
        .collect();

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = next_end(&bounds, start, max_size, overlap, n);
        let piece = &text[offsets[start]..offsets[end]];
        chunks.push(make_chunk(
            document_id,
            chunks.len() as i64,
            start,
            end,
            piece,
        ));
        if end == n {
            break;
        }
        start = end - overlap;
    }

    chunks
}

/// Pick the end of the chunk starting at `start`.
///
/// Takes the furthest unit boundary within `max_size` that moves past the
/// overlap region. When none does, a unit that is itself longer than
/// `max_size` is emitted whole; any other unit is cut at `start + max_size`.
fn next_end(bounds: &[usize], start: usize, max_size: usize, overlap: usize, n: usize) -> usize {
    let limit = start + max_size;
    let fitting = bounds.partition_point(|&b| b <= limit);
    if fitting > 0 {
        let candidate = bounds[fitting - 1];
        if candidate > start + overlap || (candidate == n && candidate > start) {
            return candidate;
        }
    }

    let next = bounds.get(fitting).copied().unwrap_or(n);
    let unit_start = if fitting > 0 { bounds[fitting - 1] } else { 0 };
    if next - unit_start > max_size {
        next
    } else {
        limit.min(n)
    }
}

/// Recursively break `text` into units no longer than `budget` characters,
/// descending the separator hierarchy only where a piece is too long.
/// Pushes the absolute byte end of every unit.
fn collect_unit_ends(text: &str, base: usize, level: usize, budget: usize, out: &mut Vec<usize>) {
    if level >= SEPARATORS.len() || text.chars().count() <= budget {
        out.push(base + text.len());
        return;
    }

    let mut offset = base;
    for piece in split_keeping_separators(text, SEPARATORS[level]) {
        collect_unit_ends(piece, offset, level + 1, budget, out);
        offset += piece.len();
    }
}

fn split_keeping_separators<'a>(text: &'a str, separators: &[&str]) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some((pos, len)) = separators
        .iter()
        .filter_map(|sep| rest.find(sep).map(|p| (p, sep.len())))
        .min_by_key(|&(p, _)| p)
    {
        let cut = pos + len;
        pieces.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

fn make_chunk(document_id: &str, index: i64, start: usize, end: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        source: String::new(),
        page: None,
        chunk_index: index,
        start,
        end,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rejoin(chunks: &[Chunk], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(&c.text);
            } else {
                out.extend(c.text.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split("doc1", "Hello, world!", 500, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 13));
    }

    #[test]
    fn test_empty_text() {
        assert!(split("doc1", "", 500, 50).is_empty());
        assert!(split("doc1", "  \n\n \t", 500, 50).is_empty());
    }

    #[test]
    fn test_paragraphs_become_separate_chunks() {
        let text = "Health is wealth.\n\nWHO defines health broadly.";
        let chunks = split("doc1", text, 30, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.trim(), "Health is wealth.");
        assert_eq!(chunks[1].text, "WHO defines health broadly.");
        assert_eq!(rejoin(&chunks, 0), text);
    }

    #[test]
    fn test_prefers_paragraph_over_sentence_cut() {
        let text = "One. Two. Three.\n\nFour. Five.";
        let chunks = split("doc1", text, 20, 0);
        assert_eq!(chunks[0].text, "One. Two. Three.\n\n");
        assert_eq!(chunks[1].text, "Four. Five.");
    }

    #[test]
    fn test_overlap_is_shared_between_neighbours() {
        let text = "Alpha beta. Gamma delta. Epsilon zeta. Eta theta. Iota kappa.";
        let overlap = 4;
        let chunks = split("doc1", text, 20, overlap);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let tail: String = pair[0]
                .text
                .chars()
                .skip(pair[0].char_len() - overlap)
                .collect();
            let head: String = pair[1].text.chars().take(overlap).collect();
            assert_eq!(tail, head);
            assert_eq!(pair[1].start, pair[0].end - overlap);
        }
        assert_eq!(rejoin(&chunks, overlap), text);
    }

    #[test]
    fn test_oversized_sentence_kept_whole() {
        let long = "x".repeat(60);
        let text = format!("Short one. {}. Tail.", long);
        let chunks = split("doc1", &text, 20, 0);
        let big = chunks
            .iter()
            .find(|c| c.text.contains(&long))
            .expect("long sentence must survive intact");
        assert!(big.char_len() > 20);
        assert_eq!(rejoin(&chunks, 0), text);
    }

    #[test]
    fn test_multibyte_text_uses_char_offsets() {
        let text = "Santé publique. Données mondiales. Espérance de vie. Âge médian.";
        let chunks = split("doc1", text, 24, 3);
        assert_eq!(chunks.len(), 4);
        for c in &chunks {
            let expected: String = text.chars().skip(c.start).take(c.char_len()).collect();
            assert_eq!(c.text, expected);
            assert!(c.char_len() <= 24);
        }
        assert_eq!(rejoin(&chunks, 3), text);
    }

    #[test]
    fn test_contiguous_indices_and_hashes() {
        let text = "a. b. c. d. e. f. g. h. i. j. k. l.";
        let chunks = split("doc1", text, 8, 2);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.document_id, "doc1");
            assert_eq!(c.hash.len(), 64);
        }
    }

    #[test]
    fn test_overlap_clamped_below_max_size() {
        let chunks = split("doc1", "abc. def. ghi. jkl.", 5, 50);
        assert!(!chunks.is_empty());
        assert_eq!(chunks.last().map(|c| c.end), Some(19));
    }

    #[test]
    fn test_chunk_document_carries_metadata() {
        let doc = Document {
            id: "d1".into(),
            source: "health_data.pdf".into(),
            page: Some(3),
            text: "Life expectancy rose.\n\nMortality fell.".into(),
        };
        let chunks = chunk_document(&doc, 25, 0);
        assert_eq!(chunks.len(), 2);
        assert!(chunks
            .iter()
            .all(|c| c.source == "health_data.pdf" && c.page == Some(3)));
        assert_eq!(chunks[0].citation(), "health_data.pdf p.3");
    }

    #[test]
    fn test_overlap_never_pushes_fitting_unit_over_limit() {
        let text = format!("{}. {}", "a".repeat(35), "b".repeat(45));
        let chunks = split("doc1", &text, 50, 10);
        for c in &chunks {
            assert!(c.char_len() <= 50, "chunk of {} chars", c.char_len());
        }
        assert_eq!(chunks[0].text, format!("{}. ", "a".repeat(35)));
        assert_eq!(rejoin(&chunks, 10), text);
    }

    #[test]
    fn test_blank_chunks_dropped_from_documents() {
        let doc = Document {
            id: "d1".into(),
            source: "gaps.txt".into(),
            page: None,
            text: "ab\n\n\n\n\n\n\n\ncd".into(),
        };
        let raw = split(&doc.id, &doc.text, 4, 0);
        assert!(raw.iter().any(|c| c.text.trim().is_empty()));

        let chunks = chunk_document(&doc, 4, 0);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| !c.text.trim().is_empty()));
        assert!(chunks.windows(2).all(|p| p[0].chunk_index < p[1].chunk_index));
    }

    fn segmented_text() -> impl Strategy<Value = String> {
        prop::collection::vec(
            (
                "[a-z ]{0,18}",
                prop::sample::select(vec!["\n\n", "\n", ". ", "! ", "? "]),
            ),
            0..40,
        )
        .prop_map(|parts| {
            parts
                .into_iter()
                .map(|(word, sep)| format!("{}{}", word, sep))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_chunks_bounded_overlapping_and_rejoinable(
            text in segmented_text(),
            max_size in 20usize..80,
            tenths in 0usize..10,
        ) {
            // Every generated sentence fits in `max_size`, but not always
            // together with the overlap.
            let overlap = (max_size - 1) * tenths / 10;
            let chunks = split("doc", &text, max_size, overlap);

            if text.trim().is_empty() {
                prop_assert!(chunks.is_empty());
            } else {
                prop_assert_eq!(rejoin(&chunks, overlap), text.clone());
                for c in &chunks {
                    prop_assert!(c.text.chars().count() <= max_size);
                }
                for pair in chunks.windows(2) {
                    let tail: String = pair[0]
                        .text
                        .chars()
                        .skip(pair[0].char_len() - overlap)
                        .collect();
                    let head: String = pair[1].text.chars().take(overlap).collect();
                    prop_assert_eq!(tail, head);
                }
            }
        }
    }
}
