//! Token-aware sliding-window chunker.
//!
//! Splits a document into blocks of at most `chunk_size_tokens`, preferring
//! paragraph boundaries, then sentence boundaries, then hard word splits.
//! Each emitted chunk carries an overlap tail from the previous block so
//! extraction sees local context across block edges.
//!
//! Chunks are defined as char ranges over the original text: a chunk's span
//! includes its overlap prefix, and the non-overlap portions of consecutive
//! chunks tile the document exactly.

use crate::config::ChunkingConfig;
use crate::models::TextUnit;
use std::sync::LazyLock;
use tiktoken_rs::CoreBPE;

static BPE: LazyLock<Option<CoreBPE>> = LazyLock::new(|| match tiktoken_rs::cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        tracing::warn!(error = %e, "tokenizer unavailable, falling back to len/4 estimate");
        None
    },
});

/// Counts tokens with the reference BPE tokenizer, falling back to a
/// `len/4` estimate when the encoder cannot be constructed. Only the
/// monotonicity of counts matters to the chunker.
#[must_use]
pub fn count_tokens(text: &str) -> usize {
    BPE.as_ref().map_or_else(
        || text.len().div_ceil(4),
        |bpe| bpe.encode_with_special_tokens(text).len(),
    )
}

/// A half-open char range over the original document.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

/// Token-aware chunker.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Creates a chunker with the given parameters.
    #[must_use]
    pub const fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Chunks a document into text units with ids `{document_id}_chunk_{i}`.
    #[must_use]
    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<TextUnit> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let size = self.config.chunk_size_tokens.max(1);
        // Units are capped below the chunk size so a greedy block always
        // reaches the minimum before overflowing.
        let unit_cap = if size > 2 * self.config.min_chunk_size {
            size - self.config.min_chunk_size
        } else {
            size
        };

        let mut units: Vec<Span> = Vec::new();
        for paragraph in split_paragraphs(text) {
            if count_tokens(&text[paragraph.start..paragraph.end]) <= unit_cap {
                units.push(paragraph);
                continue;
            }
            for sentence in split_sentences(text, paragraph) {
                if count_tokens(&text[sentence.start..sentence.end]) <= unit_cap {
                    units.push(sentence);
                } else {
                    units.extend(hard_split(text, sentence, unit_cap));
                }
            }
        }

        // Greedy accumulation into blocks of at most `size` tokens.
        let mut blocks: Vec<Span> = Vec::new();
        let mut block_start: Option<usize> = None;
        let mut block_tokens = 0usize;
        for unit in &units {
            let unit_tokens = count_tokens(&text[unit.start..unit.end]);
            match block_start {
                None => {
                    block_start = Some(unit.start);
                    block_tokens = unit_tokens;
                },
                Some(start) => {
                    if block_tokens + unit_tokens > size {
                        blocks.push(Span {
                            start,
                            end: unit.start,
                        });
                        block_start = Some(unit.start);
                        block_tokens = unit_tokens;
                    } else {
                        block_tokens += unit_tokens;
                    }
                },
            }
        }
        if let Some(start) = block_start {
            blocks.push(Span {
                start,
                end: text.len(),
            });
        }
        // Blocks tile [first_unit_start, len); stretch the first block back to
        // 0 so leading whitespace is covered too.
        if let Some(first) = blocks.first_mut() {
            first.start = 0;
        }

        let mut chunks = Vec::with_capacity(blocks.len());
        for (i, block) in blocks.iter().enumerate() {
            let overlap_start = if i == 0 {
                block.start
            } else {
                self.overlap_start(text, blocks[i - 1])
            };
            chunks.push(TextUnit {
                id: format!("{document_id}_chunk_{i}"),
                document_id: document_id.to_string(),
                text: text[overlap_start..block.end].to_string(),
                start_char: overlap_start,
                end_char: block.end,
            });
        }
        chunks
    }

    /// Start offset of the overlap tail inside the previous block: whole
    /// sentences from the end totaling up to the overlap budget, or a raw
    /// char tail when even one sentence exceeds it.
    fn overlap_start(&self, text: &str, previous: Span) -> usize {
        let budget = self.config.chunk_overlap_tokens;
        if budget == 0 {
            return previous.end;
        }
        let sentences = split_sentences(text, previous);
        let mut start = previous.end;
        let mut taken = 0usize;
        for sentence in sentences.iter().rev() {
            let tokens = count_tokens(&text[sentence.start..sentence.end]);
            if taken + tokens > budget {
                break;
            }
            taken += tokens;
            start = sentence.start;
        }
        if taken == 0 {
            // No sentence fits; fall back to a char tail sized to the budget.
            let approx_chars = budget * 4;
            let mut candidate = previous.end.saturating_sub(approx_chars);
            candidate = candidate.max(previous.start);
            while !text.is_char_boundary(candidate) {
                candidate += 1;
            }
            return candidate;
        }
        start
    }
}

/// Splits text into paragraph spans at blank lines. Separator whitespace is
/// attached to the preceding paragraph so the spans tile the input.
fn split_paragraphs(text: &str) -> Vec<Span> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            // A blank line is \n followed by optional spaces and another \n.
            let mut j = i + 1;
            while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t' || bytes[j] == b'\r') {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'\n' {
                // Consume the whole run of blank lines.
                while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                spans.push(Span { start, end: j });
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    if start < bytes.len() {
        spans.push(Span {
            start,
            end: bytes.len(),
        });
    }
    spans
}

/// Splits a span into sentence spans at `.`, `!`, `?` followed by
/// whitespace. Trailing whitespace is attached to the preceding sentence so
/// the spans tile the span.
fn split_sentences(text: &str, span: Span) -> Vec<Span> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut start = span.start;
    let mut i = span.start;
    while i < span.end {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            let mut j = i + 1;
            while j < span.end && matches!(bytes[j], b'.' | b'!' | b'?') {
                j += 1;
            }
            if j >= span.end || bytes[j].is_ascii_whitespace() {
                while j < span.end && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                spans.push(Span { start, end: j });
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    if start < span.end {
        spans.push(Span {
            start,
            end: span.end,
        });
    }
    spans
}

/// Hard-splits a span into word-level pieces of at most `cap` tokens.
fn hard_split(text: &str, span: Span, cap: usize) -> Vec<Span> {
    let slice = &text[span.start..span.end];
    let mut pieces = Vec::new();
    let mut piece_start = span.start;
    let mut piece_tokens = 0usize;
    let mut word_start = span.start;
    let mut in_word = false;

    let mut flush_word = |word_end: usize,
                          pieces: &mut Vec<Span>,
                          piece_start: &mut usize,
                          piece_tokens: &mut usize,
                          word_start: usize| {
        let tokens = count_tokens(&text[word_start..word_end]);
        if *piece_tokens > 0 && *piece_tokens + tokens > cap {
            pieces.push(Span {
                start: *piece_start,
                end: word_start,
            });
            *piece_start = word_start;
            *piece_tokens = tokens;
        } else {
            *piece_tokens += tokens;
        }
    };

    for (offset, c) in slice.char_indices() {
        let absolute = span.start + offset;
        if c.is_whitespace() {
            if in_word {
                in_word = false;
            }
        } else if !in_word {
            // A word together with the whitespace run before the next word.
            if absolute > word_start {
                flush_word(
                    absolute,
                    &mut pieces,
                    &mut piece_start,
                    &mut piece_tokens,
                    word_start,
                );
            }
            word_start = absolute;
            in_word = true;
        }
    }
    if span.end > word_start {
        flush_word(
            span.end,
            &mut pieces,
            &mut piece_start,
            &mut piece_tokens,
            word_start,
        );
    }
    if piece_start < span.end {
        pieces.push(Span {
            start: piece_start,
            end: span.end,
        });
    }
    pieces
}
