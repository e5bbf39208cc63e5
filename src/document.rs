use anyhow::{Context, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text_from_mem;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Free-form metadata attached to documents and chunks
pub type Metadata = serde_json::Map<String, Value>;

/// Metadata key recording the originating file path
pub const SOURCE_KEY: &str = "source";

/// Represents a document with its content and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// The actual text content of the document
    pub content: String,
    /// Always carries a `source` entry
    pub metadata: Metadata,
}

impl Document {
    /// The file this document was loaded from
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(Value::as_str)
    }
}

/// A structural element (e.g. a titled section) returned by a partitioner
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub text: String,
    pub metadata: Metadata,
}

/// File formats the loader knows how to partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    SlideDeck,
}

impl FileKind {
    /// Classify a file by its extension, `None` for unsupported formats
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let mime = from_path(path.as_ref()).first()?;
        match mime.essence_str() {
            "application/pdf" => Some(FileKind::Pdf),
            "application/vnd.ms-powerpoint"
            | "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                Some(FileKind::SlideDeck)
            }
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            FileKind::Pdf => "application/pdf",
            FileKind::SlideDeck => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }
}

/// Turns a single file into structured text elements
#[allow(async_fn_in_trait)]
pub trait Partitioner {
    async fn partition(&self, path: &Path, kind: FileKind) -> Result<Vec<Element>>;
}

/// A file whose partitioning failed; the rest of the batch is unaffected
#[derive(Debug, Clone)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of loading a directory
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub failures: Vec<FileFailure>,
}

/// Load every supported file directly inside `dir`.
///
/// Unsupported files are skipped. A file the partitioner rejects is recorded in
/// [`LoadReport::failures`] and contributes no documents. Only an unreadable
/// directory is an error.
pub async fn load_documents<P: Partitioner>(dir: &Path, partitioner: &P) -> Result<LoadReport> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read source directory: {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        paths.push(entry.path());
    }
    paths.sort();

    let mut report = LoadReport::default();

    for path in paths {
        if !path.is_file() {
            continue;
        }

        let Some(kind) = FileKind::from_path(&path) else {
            debug!("Skipping unsupported file: {}", path.display());
            continue;
        };

        info!("Partitioning {:?} file: {}", kind, path.display());

        let elements = match partitioner.partition(&path, kind).await {
            Ok(elements) => elements,
            Err(e) => {
                warn!("Error partitioning file {}: {:#}", path.display(), e);
                report.failures.push(FileFailure {
                    path,
                    error: format!("{:#}", e),
                });
                continue;
            }
        };

        if elements.is_empty() {
            warn!("No elements extracted from {}", path.display());
        }

        let source = path.display().to_string();
        report
            .documents
            .extend(elements.into_iter().map(|element| {
                let mut metadata = element.metadata;
                metadata.insert(SOURCE_KEY.to_string(), Value::String(source.clone()));
                Document {
                    content: element.text,
                    metadata,
                }
            }));
    }

    info!(
        "Loaded {} documents ({} files failed)",
        report.documents.len(),
        report.failures.len()
    );

    Ok(report)
}

/// Partitions PDFs on this machine when no partition service is configured.
///
/// The whole file becomes a single element; slide decks are not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPartitioner;

impl Partitioner for LocalPartitioner {
    async fn partition(&self, path: &Path, kind: FileKind) -> Result<Vec<Element>> {
        match kind {
            FileKind::Pdf => {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read file: {}", path.display()))?;

                // Some malformed PDFs panic inside the extractor instead of erroring
                let content = tokio::task::spawn_blocking(move || extract_text_from_mem(&bytes))
                    .await
                    .map_err(|e| {
                        anyhow::anyhow!("PDF extraction aborted for {}: {}", path.display(), e)
                    })?
                    .with_context(|| {
                        format!("Failed to extract text from PDF: {}", path.display())
                    })?;

                // PDF extraction can sometimes include excessive whitespace
                let cleaned_content = normalize_whitespace(&content);

                if cleaned_content.is_empty() {
                    warn!("Extracted PDF content is empty or contains only whitespace");
                    return Ok(Vec::new());
                }

                let mut metadata = Metadata::new();
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    metadata.insert("filename".to_string(), Value::String(name.to_string()));
                }
                metadata.insert(
                    "filetype".to_string(),
                    Value::String(kind.mime_type().to_string()),
                );

                Ok(vec![Element {
                    text: cleaned_content,
                    metadata,
                }])
            }
            FileKind::SlideDeck => Err(anyhow::anyhow!(
                "Slide decks need the Unstructured partition service (set UNSTRUCTURED_API_KEY)"
            )),
        }
    }
}

/// Normalize whitespace in text (remove multiple consecutive spaces, newlines, etc.)
fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
        } else {
            if newline_count > 0 {
                // Add at most two newlines (paragraph break)
                if newline_count >= 2 {
                    normalized.push_str("\n\n");
                } else {
                    normalized.push('\n');
                }
                newline_count = 0;
            }

            if !(c == ' ' && prev_char == ' ') {
                normalized.push(c);
            }

            prev_char = c;
        }
    }

    normalized.trim().to_string()
}
