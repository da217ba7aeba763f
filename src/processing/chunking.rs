//! Title-aware grouping of parsed elements into bounded chunks.
//!
//! Elements are grouped in document order:
//!
//! - A `Title` opens a new chunk; so does an element that would push the running chunk past
//!   `max_characters`. A running chunk is also closed once it grows past `split_after`.
//! - Oversized non-table elements are pre-split with `semchunk-rs` using a character counter.
//! - Tables are atomic: one table per chunk, never split, never merged, never given overlap.
//! - Chunks shorter than `combine_under` are merged into the next text chunk (the final one
//!   into the previous chunk) when the merged text still fits `max_characters`.
//! - With `overlap > 1`, up to `overlap - 1` trailing characters of the previous text chunk
//!   and a space are prepended, so text chunks never exceed `max_characters + overlap`.

use super::types::{Chunk, ChunkingError, ContentElement, ElementKind};
use semchunk_rs::Chunker as SemanticSplitter;

const ELEMENT_SEPARATOR: &str = "\n\n";

/// Size parameters for [`Chunker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingOptions {
    /// Upper bound for text chunks before overlap is applied.
    pub max_characters: usize,
    /// Characters of context carried from the previous chunk.
    pub overlap: usize,
    /// Chunks below this size are merged with a neighbor.
    pub combine_under: usize,
    /// Running chunks are closed once they exceed this size.
    pub split_after: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_characters: 500,
            overlap: 50,
            combine_under: 100,
            split_after: 1500,
        }
    }
}

/// Validated chunking configuration.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    options: ChunkingOptions,
}

#[derive(Debug)]
struct Section {
    text: String,
    is_table: bool,
}

impl Section {
    fn plain(text: String) -> Self {
        Self {
            text,
            is_table: false,
        }
    }
}

impl Chunker {
    /// Validate `options`; `max_characters` must be positive and exceed `overlap`.
    pub fn new(options: ChunkingOptions) -> Result<Self, ChunkingError> {
        if options.max_characters == 0 {
            return Err(ChunkingError::InvalidChunkConfig(
                "max_characters must be greater than zero".into(),
            ));
        }
        if options.overlap >= options.max_characters {
            return Err(ChunkingError::InvalidChunkConfig(format!(
                "overlap ({}) must be smaller than max_characters ({})",
                options.overlap, options.max_characters
            )));
        }
        Ok(Self { options })
    }

    /// Options this chunker was built with.
    pub fn options(&self) -> ChunkingOptions {
        self.options
    }

    /// Group `elements` into chunks attributed to `document_id`.
    pub fn chunk(&self, document_id: &str, elements: &[ContentElement]) -> Vec<Chunk> {
        let sections = self.group(elements);
        let sections = self.combine_small(sections);
        let sections = self.apply_overlap(sections);

        let chunks: Vec<Chunk> = sections
            .into_iter()
            .filter(|section| !section.text.trim().is_empty())
            .enumerate()
            .map(|(index, section)| Chunk {
                length: char_len(&section.text),
                text: section.text,
                document_id: document_id.to_string(),
                index,
                is_table: section.is_table,
            })
            .collect();

        tracing::debug!(
            document_id,
            elements = elements.len(),
            chunks = chunks.len(),
            max_characters = self.options.max_characters,
            overlap = self.options.overlap,
            "Chunked document"
        );
        chunks
    }

    fn group(&self, elements: &[ContentElement]) -> Vec<Section> {
        let max = self.options.max_characters;
        let mut sections = Vec::new();
        let mut current = String::new();

        for element in elements {
            let text = element.text.trim();
            if element.kind == ElementKind::PageBreak || text.is_empty() {
                continue;
            }

            match element.kind {
                ElementKind::Table => {
                    flush(&mut current, &mut sections);
                    sections.push(Section {
                        text: text.to_string(),
                        is_table: true,
                    });
                    continue;
                }
                ElementKind::Title => flush(&mut current, &mut sections),
                _ => {}
            }

            for piece in self.split_oversized(text) {
                if !current.is_empty()
                    && char_len(&current) + ELEMENT_SEPARATOR.len() + char_len(&piece) > max
                {
                    flush(&mut current, &mut sections);
                }
                if !current.is_empty() {
                    current.push_str(ELEMENT_SEPARATOR);
                }
                current.push_str(&piece);
                if char_len(&current) > self.options.split_after {
                    flush(&mut current, &mut sections);
                }
            }
        }
        flush(&mut current, &mut sections);
        sections
    }

    /// Pre-split a single element that cannot fit in one chunk.
    fn split_oversized(&self, text: &str) -> Vec<String> {
        let max = self.options.max_characters;
        if char_len(text) <= max {
            return vec![text.to_string()];
        }

        let splitter = SemanticSplitter::new(max, Box::new(|segment: &str| char_len(segment)));
        splitter
            .chunk(text)
            .into_iter()
            .flat_map(|piece| hard_split(piece.trim(), max))
            .filter(|piece| !piece.is_empty())
            .collect()
    }

    fn combine_small(&self, sections: Vec<Section>) -> Vec<Section> {
        let max = self.options.max_characters;
        let combine_under = self.options.combine_under;
        let mut combined: Vec<Section> = Vec::with_capacity(sections.len());
        let mut carry: Option<String> = None;

        for section in sections {
            if section.is_table {
                if let Some(pending) = carry.take() {
                    combined.push(Section::plain(pending));
                }
                combined.push(section);
                continue;
            }

            let text = match carry.take() {
                Some(pending) if fits_joined(&pending, &section.text, max) => {
                    join(&pending, &section.text)
                }
                Some(pending) => {
                    combined.push(Section::plain(pending));
                    section.text
                }
                None => section.text,
            };

            if char_len(&text) < combine_under {
                carry = Some(text);
            } else {
                combined.push(Section::plain(text));
            }
        }

        if let Some(last) = carry {
            match combined.last_mut() {
                Some(previous) if !previous.is_table && fits_joined(&previous.text, &last, max) => {
                    previous.text = join(&previous.text, &last);
                }
                _ => combined.push(Section::plain(last)),
            }
        }
        combined
    }

    fn apply_overlap(&self, sections: Vec<Section>) -> Vec<Section> {
        let width = self.options.overlap.saturating_sub(1);
        if width == 0 {
            return sections;
        }

        let mut output = Vec::with_capacity(sections.len());
        let mut previous: Option<String> = None;
        for section in sections {
            if section.is_table {
                previous = None;
                output.push(section);
                continue;
            }

            let original = section.text;
            let text = match previous.as_deref().map(|prev| tail(prev, width).trim_start()) {
                Some(carried) if !carried.is_empty() => format!("{carried} {original}"),
                _ => original.clone(),
            };
            previous = Some(original);
            output.push(Section::plain(text));
        }
        output
    }
}

/// Chunk `elements` with freshly validated `options`.
pub fn chunk_elements(
    document_id: &str,
    elements: &[ContentElement],
    options: ChunkingOptions,
) -> Result<Vec<Chunk>, ChunkingError> {
    Ok(Chunker::new(options)?.chunk(document_id, elements))
}

fn flush(current: &mut String, sections: &mut Vec<Section>) {
    if !current.trim().is_empty() {
        sections.push(Section::plain(std::mem::take(current)));
    } else {
        current.clear();
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn fits_joined(a: &str, b: &str, max: usize) -> bool {
    char_len(a) + ELEMENT_SEPARATOR.len() + char_len(b) <= max
}

fn join(a: &str, b: &str) -> String {
    format!("{a}{ELEMENT_SEPARATOR}{b}")
}

/// Last `width` characters of `text`.
fn tail(text: &str, width: usize) -> &str {
    let count = char_len(text);
    if count <= width {
        return text;
    }
    match text.char_indices().nth(count - width) {
        Some((offset, _)) => &text[offset..],
        None => text,
    }
}

/// Cut `text` into consecutive pieces of at most `max` characters.
fn hard_split(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max)
        .map(|piece| piece.iter().collect::<String>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrative(text: &str) -> ContentElement {
        ContentElement::new(ElementKind::NarrativeText, text)
    }

    fn title(text: &str) -> ContentElement {
        ContentElement::new(ElementKind::Title, text)
    }

    fn table(text: &str) -> ContentElement {
        ContentElement::new(ElementKind::Table, text)
    }

    fn options(max_characters: usize, overlap: usize) -> ChunkingOptions {
        ChunkingOptions {
            max_characters,
            overlap,
            combine_under: 0,
            split_after: 10_000,
        }
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(matches!(
            Chunker::new(options(0, 0)),
            Err(ChunkingError::InvalidChunkConfig(_))
        ));
        assert!(matches!(
            Chunker::new(options(10, 10)),
            Err(ChunkingError::InvalidChunkConfig(_))
        ));
        assert!(Chunker::new(options(10, 9)).is_ok());
    }

    #[test]
    fn titles_open_new_chunks() {
        let chunks = chunk_elements(
            "doc",
            &[
                title("Cats"),
                narrative("Cats are mammals."),
                title("Dogs"),
                narrative("Dogs are mammals."),
            ],
            options(200, 0),
        )
        .expect("chunks");

        let texts: Vec<_> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Cats\n\nCats are mammals.", "Dogs\n\nDogs are mammals."]
        );
        assert_eq!(chunks[1].index, 1);
        assert_eq!(chunks[1].document_id, "doc");
        assert_eq!(chunks[0].length, chunks[0].text.chars().count());
    }

    #[test]
    fn elements_that_do_not_fit_start_a_new_chunk() {
        let chunks = chunk_elements(
            "doc",
            &[narrative("aaaaaaaaaa"), narrative("bbbbbbbbbb"), narrative("cccccccccc")],
            options(25, 0),
        )
        .expect("chunks");

        let texts: Vec<_> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaaaaaaaa\n\nbbbbbbbbbb", "cccccccccc"]);
    }

    #[test]
    fn tables_are_never_split_or_merged() {
        let big_table = format!("| col |\n{}", "| value |\n".repeat(20));
        let chunks = chunk_elements(
            "doc",
            &[narrative("intro"), table(&big_table), narrative("outro")],
            ChunkingOptions {
                max_characters: 50,
                overlap: 10,
                combine_under: 20,
                split_after: 1000,
            },
        )
        .expect("chunks");

        let tables: Vec<_> = chunks.iter().filter(|chunk| chunk.is_table).collect();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].text, big_table.trim());
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].text, "outro");
    }

    #[test]
    fn oversized_elements_are_split_within_bounds() {
        let sentence = "The quick brown fox jumps over the lazy dog. ";
        let long_text = sentence.repeat(30);
        let max = 120;
        let overlap = 20;
        let chunks = chunk_elements(
            "doc",
            &[narrative(&long_text)],
            ChunkingOptions {
                max_characters: max,
                overlap,
                combine_under: 30,
                split_after: 1500,
            },
        )
        .expect("chunks");

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.length <= max + overlap, "chunk too long: {}", chunk.length);
            assert!(!chunk.text.trim().is_empty());
        }
    }

    #[test]
    fn small_chunks_merge_forward() {
        let chunks = chunk_elements(
            "doc",
            &[title("A"), title("B"), narrative("body text that is long enough")],
            ChunkingOptions {
                max_characters: 200,
                overlap: 0,
                combine_under: 10,
                split_after: 1500,
            },
        )
        .expect("chunks");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "A\n\nB\n\nbody text that is long enough");
    }

    #[test]
    fn trailing_small_chunk_merges_backward() {
        let chunks = chunk_elements(
            "doc",
            &[narrative("a reasonably sized paragraph"), title("End")],
            ChunkingOptions {
                max_characters: 200,
                overlap: 0,
                combine_under: 10,
                split_after: 1500,
            },
        )
        .expect("chunks");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "a reasonably sized paragraph\n\nEnd");
    }

    #[test]
    fn overlap_prepends_previous_tail() {
        let chunks = chunk_elements(
            "doc",
            &[title("first section"), title("second section")],
            options(100, 6),
        )
        .expect("chunks");

        assert_eq!(chunks[0].text, "first section");
        assert_eq!(chunks[1].text, "ction second section");
    }

    #[test]
    fn split_after_closes_running_chunks() {
        let chunks = chunk_elements(
            "doc",
            &[narrative("0123456789"), narrative("abcdefghij"), narrative("klmnopqrst")],
            ChunkingOptions {
                max_characters: 100,
                overlap: 0,
                combine_under: 0,
                split_after: 15,
            },
        )
        .expect("chunks");

        let texts: Vec<_> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["0123456789\n\nabcdefghij", "klmnopqrst"]);
    }

    #[test]
    fn blank_elements_and_page_breaks_are_dropped() {
        let chunks = chunk_elements(
            "doc",
            &[
                narrative("   "),
                ContentElement::new(ElementKind::PageBreak, ""),
                narrative("kept"),
            ],
            options(50, 0),
        )
        .expect("chunks");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "kept");
        assert_eq!(chunks[0].index, 0);
        assert!(chunk_elements("doc", &[], options(50, 0)).unwrap().is_empty());
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("héllo", 3), "llo");
        assert_eq!(tail("hi", 5), "hi");
        assert_eq!(hard_split("abcdefg", 3), vec!["abc", "def", "g"]);
    }
}
