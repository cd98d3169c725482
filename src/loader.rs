//! Document loaders: turning ingest inputs into page text.
//!
//! The [`Loader`] trait is the seam for custom decoders. Built-ins cover
//! inline/plain text and digital-text PDFs (no OCR; a scanned PDF with no
//! extractable text loads as empty pages and is the caller's problem to
//! rasterize elsewhere).
//!
//! [`PageFilter`] is the hook for header/footer and text-normalization
//! heuristics, applied to loaded pages before chunking. The engine ships
//! no heuristic of its own; the default is the identity.

use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{DocumentInput, LoadedDocument, Page};

/// Decoder contract. The first loader whose `supports` accepts the input
/// wins; an input no loader accepts is an input fault.
pub trait Loader: Send + Sync + std::fmt::Debug {
    /// Whether this loader can decode the input.
    fn supports(&self, input: &DocumentInput) -> bool;

    /// Decode the input into pages.
    fn load(&self, input: &DocumentInput) -> Result<LoadedDocument>;
}

/// Header/footer normalization hook, applied between loading and chunking.
pub trait PageFilter: Send + Sync {
    fn apply(&self, doc: LoadedDocument) -> LoadedDocument;
}

/// Loader for inline text and plain-text files (`.txt`, `.md`, `.markdown`).
///
/// Inline text and file content both load as a single page 0.
#[derive(Debug, Default)]
pub struct TextLoader;

impl TextLoader {
    fn is_text_path(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
            Some("txt") | Some("md") | Some("markdown") | Some("text")
        )
    }
}

impl Loader for TextLoader {
    fn supports(&self, input: &DocumentInput) -> bool {
        match input {
            DocumentInput::Text { .. } => true,
            DocumentInput::File(path) => Self::is_text_path(path),
        }
    }

    fn load(&self, input: &DocumentInput) -> Result<LoadedDocument> {
        let (name, text) = match input {
            DocumentInput::Text { text, name } => (name.clone(), text.clone()),
            DocumentInput::File(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| Error::Loader(format!("read {}: {}", path.display(), e)))?;
                (input.display_name(), text)
            }
        };

        Ok(LoadedDocument {
            name,
            pages: vec![Page { index: 0, text }],
        })
    }
}

/// Loader for PDFs with embedded digital text.
#[derive(Debug, Default)]
pub struct PdfLoader;

impl Loader for PdfLoader {
    fn supports(&self, input: &DocumentInput) -> bool {
        match input {
            DocumentInput::Text { .. } => false,
            DocumentInput::File(path) => matches!(
                path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
                Some("pdf")
            ),
        }
    }

    fn load(&self, input: &DocumentInput) -> Result<LoadedDocument> {
        let path = match input {
            DocumentInput::File(path) => path,
            DocumentInput::Text { .. } => {
                return Err(Error::Loader("pdf loader needs a file input".into()))
            }
        };

        let bytes = std::fs::read(path)
            .map_err(|e| Error::Loader(format!("read {}: {}", path.display(), e)))?;
        let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
            .map_err(|e| Error::Loader(format!("pdf extraction failed: {}", e)))?;

        Ok(LoadedDocument {
            name: input.display_name(),
            pages: pages
                .into_iter()
                .enumerate()
                .map(|(i, text)| Page {
                    index: i as i64,
                    text,
                })
                .collect(),
        })
    }
}

/// Pick the first loader that accepts `input`.
pub fn select_loader<'a>(
    loaders: &'a [Box<dyn Loader>],
    input: &DocumentInput,
) -> Result<&'a dyn Loader> {
    loaders
        .iter()
        .find(|l| l.supports(input))
        .map(|l| l.as_ref())
        .ok_or_else(|| Error::Input(format!("no loader supports input '{}'", input.display_name())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_loader_inline() {
        let input = DocumentInput::Text {
            text: "hello".into(),
            name: "note.txt".into(),
        };
        assert!(TextLoader.supports(&input));
        let doc = TextLoader.load(&input).unwrap();
        assert_eq!(doc.name, "note.txt");
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].text, "hello");
    }

    #[test]
    fn test_loader_dispatch_by_extension() {
        let pdf = DocumentInput::File("paper.PDF".into());
        let md = DocumentInput::File("notes.md".into());
        assert!(PdfLoader.supports(&pdf));
        assert!(!PdfLoader.supports(&md));
        assert!(TextLoader.supports(&md));
        assert!(!TextLoader.supports(&pdf));
    }

    #[test]
    fn test_select_loader_unsupported_is_input_fault() {
        let loaders: Vec<Box<dyn Loader>> = vec![Box::new(TextLoader), Box::new(PdfLoader)];
        let input = DocumentInput::File("image.png".into());
        let err = select_loader(&loaders, &input).unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }
}
