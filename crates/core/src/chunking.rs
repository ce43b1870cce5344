use crate::config::ChunkingConfig;
use crate::models::{BookMetadata, Chapter, ChunkKind, TextChunk};

const TOKENS_PER_WORD: f64 = 1.3;

/// Cheap token estimate used for band checks: word count times a constant.
pub fn estimate_tokens(text: &str) -> usize {
    (text.split_whitespace().count() as f64 * TOKENS_PER_WORD) as usize
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Turns one chapter into zero or more chunks at two granularities.
///
/// A chapter whose token estimate falls inside the chapter band is emitted
/// whole as a single `Chapter` chunk. Independently, its paragraphs are
/// greedily grouped into `Paragraph` chunks bounded by the paragraph band.
/// Both granularities are stored and searched side by side.
///
/// Paragraphs are never split. A group that reaches the upper bound while
/// still under the lower bound is carried forward into further accumulation
/// instead of being emitted; a tail group under the lower bound is dropped.
/// Output is deterministic for a fixed chapter and fixed bands.
pub fn build_chunks(
    chapter: &Chapter,
    metadata: &BookMetadata,
    bands: &ChunkingConfig,
) -> Vec<TextChunk> {
    let make_chunk = |text: String, kind: ChunkKind, chunk_index: u32| TextChunk {
        word_count: word_count(&text),
        text,
        kind,
        book_title: metadata.title.clone(),
        book_author: metadata.author.clone(),
        chapter_title: Some(chapter.title.clone()),
        chapter_number: Some(chapter.number),
        chunk_index,
    };

    let mut chunks = Vec::new();

    let chapter_tokens = estimate_tokens(&chapter.body);
    if (bands.chapter_min_tokens..=bands.chapter_max_tokens).contains(&chapter_tokens) {
        chunks.push(make_chunk(chapter.body.clone(), ChunkKind::Chapter, 0));
    }

    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0usize;
    let mut chunk_index = 0u32;

    for paragraph in chapter.body.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let paragraph_tokens = estimate_tokens(paragraph);

        if !current.is_empty() && current_tokens + paragraph_tokens > bands.paragraph_max_tokens {
            let text = current.join(" ");
            if estimate_tokens(&text) >= bands.paragraph_min_tokens {
                let seed = overlap_seed(&current, bands.overlap_tokens);
                chunks.push(make_chunk(text, ChunkKind::Paragraph, chunk_index));
                chunk_index += 1;
                current.clear();
                current_tokens = 0;
                if let Some(tail) = seed {
                    current.push(tail);
                    current_tokens = estimate_tokens(tail);
                }
            }
            // under the lower bound the group keeps accumulating past the
            // upper bound rather than being emitted short
        }

        current.push(paragraph);
        current_tokens += paragraph_tokens;
    }

    if !current.is_empty() {
        let text = current.join(" ");
        if estimate_tokens(&text) >= bands.paragraph_min_tokens {
            chunks.push(make_chunk(text, ChunkKind::Paragraph, chunk_index));
        }
    }

    chunks
}

/// A short trailing paragraph is repeated at the head of the next group.
fn overlap_seed<'a>(group: &[&'a str], overlap_tokens: usize) -> Option<&'a str> {
    if overlap_tokens == 0 {
        return None;
    }
    group
        .last()
        .copied()
        .filter(|tail| estimate_tokens(tail) <= overlap_tokens)
}
