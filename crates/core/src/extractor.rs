use crate::error::{IngestionError, Result};
use lopdf::Document;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    /// Returns the text of every page that has any, in page order.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>> {
        if bytes.is_empty() {
            return Err(IngestionError::EmptyInput);
        }

        let document =
            Document::load_mem(bytes).map_err(|error| IngestionError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestionError::PdfParse(error.to_string()))?;

            if text.trim().is_empty() {
                debug!(page = page_no, "page has no extractable text");
                continue;
            }

            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        if pages.is_empty() {
            return Err(IngestionError::NoText);
        }

        Ok(pages)
    }
}
