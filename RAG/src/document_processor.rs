use crate::config::{RagConfig, SUPPORTED_FILE_TYPES};
use crate::error::{RagError, Result};
use regex::Regex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Docx,
    Txt,
    Markdown,
}

impl FileType {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())?;

        match extension.as_str() {
            "pdf" => Some(FileType::Pdf),
            "docx" => Some(FileType::Docx),
            "txt" => Some(FileType::Txt),
            "md" => Some(FileType::Markdown),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Txt => "txt",
            FileType::Markdown => "md",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub file_type: FileType,
    pub chunks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    chunk_size: usize,
    chunk_overlap: usize,
    max_file_size: usize,
}

impl DocumentProcessor {
    pub fn new(chunk_size: usize, chunk_overlap: usize, max_file_size: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            max_file_size,
        }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap, config.max_file_size)
    }

    /// Checks type and size before anything touches the disk.
    pub fn validate(&self, filename: &str, size: usize) -> Result<FileType> {
        let file_type = FileType::from_filename(filename).ok_or_else(|| {
            RagError::UnsupportedFileType {
                extension: Path::new(filename)
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_else(|| "(none)".to_string()),
                supported: SUPPORTED_FILE_TYPES
                    .iter()
                    .map(|t| format!(".{}", t))
                    .collect::<Vec<_>>()
                    .join(", "),
            }
        })?;

        if size == 0 {
            return Err(RagError::EmptyDocument(filename.to_string()));
        }

        if size > self.max_file_size {
            return Err(RagError::FileTooLarge {
                size,
                max_mb: self.max_file_size as f64 / 1024.0 / 1024.0,
            });
        }

        Ok(file_type)
    }

    /// Validates, extracts and chunks an uploaded file. CPU bound; callers on
    /// the async runtime should run it through `spawn_blocking`.
    pub fn process(&self, filename: &str, bytes: &[u8]) -> Result<ProcessedDocument> {
        let file_type = self.validate(filename, bytes.len())?;

        log::info!("Processing {}: {} ({} bytes)", file_type.extension(), filename, bytes.len());

        let text = self.extract_text(filename, file_type, bytes)?;
        let chunks = self.split_text(&text);
        if chunks.is_empty() {
            return Err(RagError::EmptyDocument(filename.to_string()));
        }

        log::info!(
            "Created {} chunks from {} ({} characters)",
            chunks.len(),
            filename,
            text.chars().count()
        );

        Ok(ProcessedDocument { file_type, chunks })
    }

    pub fn extract_text(&self, filename: &str, file_type: FileType, bytes: &[u8]) -> Result<String> {
        let raw = match file_type {
            FileType::Pdf => pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
                RagError::Extraction {
                    filename: filename.to_string(),
                    reason: e.to_string(),
                }
            })?,
            FileType::Docx => extract_docx(filename, bytes)?,
            FileType::Txt | FileType::Markdown => decode_text(bytes),
        };

        let cleaned = clean_text(&raw);
        if cleaned.is_empty() {
            return Err(RagError::EmptyDocument(filename.to_string()));
        }
        Ok(cleaned)
    }

    /// Recursive character splitting: try paragraph breaks first, then line
    /// breaks, then spaces, then single graphemes.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, SEPARATORS)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators[separators.len() - 1];
        let mut remaining: &[&str] = &[];
        for (i, &candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = candidate;
                break;
            }
            if text.contains(candidate) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<&str> = if separator.is_empty() {
            text.graphemes(true).collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for split in splits {
            if char_len(split) < self.chunk_size {
                pending.push(split);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge_splits(&pending, separator));
                pending.clear();
            }
            if remaining.is_empty() {
                chunks.push(split.to_string());
            } else {
                chunks.extend(self.split_with(split, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge_splits(&pending, separator));
        }
        chunks
    }

    fn merge_splits(&self, splits: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &split in splits {
            let len = char_len(split);
            let joiner = if current.is_empty() { 0 } else { separator_len };

            if total + len + joiner > self.chunk_size && !current.is_empty() {
                let chunk = join(&current, separator);
                if !chunk.trim().is_empty() {
                    chunks.push(chunk);
                }
                // Keep a tail of at most `chunk_overlap` characters.
                while total > self.chunk_overlap
                    || (total > 0 && total + len + separator_len > self.chunk_size)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    let joiner = if current.is_empty() { 0 } else { separator_len };
                    total = total.saturating_sub(char_len(front) + joiner);
                }
            }

            let joiner = if current.is_empty() { 0 } else { separator_len };
            current.push_back(split);
            total += len + joiner;
        }

        let chunk = join(&current, separator);
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join(parts: &VecDeque<&str>, separator: &str) -> String {
    parts.iter().copied().collect::<Vec<_>>().join(separator)
}

fn extract_docx(filename: &str, bytes: &[u8]) -> Result<String> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| RagError::Extraction {
        filename: filename.to_string(),
        reason: e.to_string(),
    })?;

    let mut paragraphs = Vec::new();
    let mut table_rows = Vec::new();

    for child in docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(p) => {
                let text = paragraph_text(&p);
                if !text.trim().is_empty() {
                    paragraphs.push(text);
                }
            }
            docx_rs::DocumentChild::Table(table) => {
                for row in &table.rows {
                    #[allow(irrefutable_let_patterns)]
                    let docx_rs::TableChild::TableRow(row) = row
                    else {
                        continue;
                    };
                    let mut cells = Vec::new();
                    for cell in &row.cells {
                        #[allow(irrefutable_let_patterns)]
                        let docx_rs::TableRowChild::TableCell(cell) = cell
                        else {
                            continue;
                        };
                        let text = cell
                            .children
                            .iter()
                            .filter_map(|content| match content {
                                docx_rs::TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                                _ => None,
                            })
                            .collect::<Vec<_>>()
                            .join(" ");
                        let text = text.trim();
                        if !text.is_empty() {
                            cells.push(text.to_string());
                        }
                    }
                    if !cells.is_empty() {
                        table_rows.push(cells.join(" | "));
                    }
                }
            }
            _ => {}
        }
    }

    paragraphs.extend(table_rows);
    Ok(paragraphs.join("\n"))
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                match run_child {
                    docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                    docx_rs::RunChild::Tab(_) => text.push('\t'),
                    _ => {}
                }
            }
        }
    }
    text
}

/// UTF-8 first, then BOM-marked UTF-16, then Latin-1, which never fails.
fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    let utf16 = match bytes {
        [0xFF, 0xFE, rest @ ..] => Some((rest, u16::from_le_bytes as fn([u8; 2]) -> u16)),
        [0xFE, 0xFF, rest @ ..] => Some((rest, u16::from_be_bytes as fn([u8; 2]) -> u16)),
        _ => None,
    };
    if let Some((rest, to_unit)) = utf16 {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| to_unit([pair[0], pair[1]]))
            .collect();
        if let Ok(text) = String::from_utf16(&units) {
            return text;
        }
    }

    bytes.iter().map(|&b| b as char).collect()
}

fn clean_text(text: &str) -> String {
    static CONTROL: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();
    static BLANK_LINES: OnceLock<Regex> = OnceLock::new();

    let control = CONTROL.get_or_init(|| {
        Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("control character pattern")
    });
    let spaces = SPACES.get_or_init(|| Regex::new(r"[ \t\x{A0}]+").expect("whitespace pattern"));
    let blank_lines =
        BLANK_LINES.get_or_init(|| Regex::new(r"\n[ \t]*\n(\s*\n)*").expect("blank line pattern"));

    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = control.replace_all(&text, " ");
    let text = spaces.replace_all(&text, " ");
    let text = blank_lines.replace_all(&text, "\n\n");

    text.trim().to_string()
}
