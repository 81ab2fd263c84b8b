use crate::error::IngestError;
use crate::models::PdfUpload;
use lopdf::Document;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, name: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, name: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let parse_error = |details: String| IngestError::PdfParse {
            document: name.to_string(),
            details,
        };

        let document = Document::load_mem(bytes).map_err(|error| parse_error(error.to_string()))?;
        if document.is_encrypted() {
            return Err(parse_error("document is encrypted".to_string()));
        }

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| parse_error(format!("page {page_no}: {error}")))?;

            debug!(document = name, page = page_no, chars = text.len(), "extracted page");
            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

/// Extracted text of a whole document set.
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    pub text: String,
    pub pages: usize,
}

/// Concatenates every page of every document, in order, without separators.
pub fn extract_text(documents: &[PdfUpload]) -> Result<String, IngestError> {
    extract_with(&LopdfExtractor, documents).map(|extracted| extracted.text)
}

pub fn extract_with<X: PdfExtractor>(
    extractor: &X,
    documents: &[PdfUpload],
) -> Result<ExtractedText, IngestError> {
    if documents.is_empty() {
        return Err(IngestError::InvalidArgument(
            "no documents were uploaded".to_string(),
        ));
    }

    let mut extracted = ExtractedText::default();
    for document in documents {
        let pages = extractor.extract_pages(&document.name, &document.bytes)?;
        extracted.pages += pages.len();
        for page in pages {
            extracted.text.push_str(&page.text);
        }
    }

    info!(
        documents = documents.len(),
        pages = extracted.pages,
        chars = extracted.text.chars().count(),
        "extracted document text"
    );
    Ok(extracted)
}
