use serde::{Deserialize, Serialize};

/// Text chunk produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position of the chunk within its document
    pub index: usize,
    /// Character offset of the first character
    pub start: usize,
    /// Character offset after the last character
    pub end: usize,
    /// Raw text of the chunk
    pub content: String,
}

/// Fixed-size character windows with overlap.
///
/// Chunk `i` covers `[i * (size - overlap), i * (size - overlap) + size)`,
/// clamped to the text length. Windows start while the start offset is
/// inside the text, so a text of `L` characters yields
/// `ceil(L / (size - overlap))` chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a new chunker. Overlap is clamped below the window size.
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size - 1),
        }
    }

    pub fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// Split text into overlapping chunks.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        // Byte offset of every char plus the end of the text.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(idx, _)| idx)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = boundaries.len() - 1;

        let step = self.step();
        let mut chunks = Vec::with_capacity(len.div_ceil(step));
        let mut start = 0;

        while start < len {
            let end = (start + self.size).min(len);
            chunks.push(Chunk {
                index: chunks.len(),
                start,
                end,
                content: text[boundaries[start]..boundaries[end]].to_string(),
            });
            start += step;
        }

        chunks
    }
}
