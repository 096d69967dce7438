use crate::chunking::{tidy_page_text, RecursiveSplitter};
use crate::error::Result;
use crate::extractor::{PageText, PdfExtractor};
use crate::models::Chunk;
use sha2::{Digest, Sha256};
use tracing::info;

/// Turns raw PDF bytes into page-tagged chunks.
#[derive(Debug, Clone)]
pub struct Ingestor<E> {
    extractor: E,
    splitter: RecursiveSplitter,
}

impl<E: PdfExtractor> Ingestor<E> {
    pub fn new(extractor: E, splitter: RecursiveSplitter) -> Self {
        Self {
            extractor,
            splitter,
        }
    }

    pub fn split(&self, bytes: &[u8]) -> Result<Vec<Chunk>> {
        let pages = self.extractor.extract_pages(bytes)?;
        info!(page_count = pages.len(), "loaded pages from pdf");

        let chunks = split_pages(&pages, &self.splitter);
        info!(chunk_count = chunks.len(), "split pdf into chunks");
        Ok(chunks)
    }
}

/// Splits each page separately so no chunk spans two pages.
pub fn split_pages(pages: &[PageText], splitter: &RecursiveSplitter) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in pages {
        let tidy = tidy_page_text(&page.text);
        for text in splitter.split_text(&tidy) {
            chunks.push(Chunk {
                text,
                source_page: page.number,
                chunk_index: cursor,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    chunks
}

/// Content fingerprint of an uploaded document.
pub fn document_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
