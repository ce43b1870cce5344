use crate::error::IngestError;
use crate::models::{BookMetadata, Chapter, ParsedBook};
use std::fs;
use std::path::Path;

/// Document parser collaborator: turns a file into metadata plus ordered
/// chapters. Implementations fill missing optional metadata with defaults
/// instead of erroring.
pub trait BookParser {
    /// File extensions (lowercase, no dot) this parser accepts; used by
    /// library discovery.
    fn extensions(&self) -> &[&str];

    fn parse(&self, path: &Path) -> Result<ParsedBook, IngestError>;
}

/// Reference parser for plain-text books, one book per `.txt` file.
///
/// The file stem is read as `Author - Title`; a stem without the separator
/// becomes the title with an unknown author. Lines starting with `### `
/// open a new chapter whose title is the rest of the line; text before the
/// first heading (or a file without headings) forms a single chapter named
/// after the book.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextParser;

impl BookParser for PlainTextParser {
    fn extensions(&self) -> &[&str] {
        &["txt"]
    }

    fn parse(&self, path: &Path) -> Result<ParsedBook, IngestError> {
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

        let metadata = metadata_from_stem(stem);
        let raw = fs::read_to_string(path)
            .map_err(|error| IngestError::Parse(format!("{}: {error}", path.display())))?;

        let chapters = split_chapters(&raw, &metadata.title);
        Ok(ParsedBook { metadata, chapters })
    }
}

fn metadata_from_stem(stem: &str) -> BookMetadata {
    match stem.split_once(" - ") {
        Some((author, title)) if !author.trim().is_empty() && !title.trim().is_empty() => {
            BookMetadata {
                title: title.trim().to_string(),
                author: author.trim().to_string(),
                language: None,
                publisher: None,
            }
        }
        _ => BookMetadata {
            title: stem.trim().to_string(),
            author: "Unknown Author".to_string(),
            language: None,
            publisher: None,
        },
    }
}

fn split_chapters(raw: &str, book_title: &str) -> Vec<Chapter> {
    fn flush(title: &str, body_lines: &mut Vec<&str>, chapters: &mut Vec<Chapter>) {
        let body = body_lines.join("\n").trim().to_string();
        body_lines.clear();
        if body.is_empty() {
            return;
        }
        let number = chapters.len() as u32 + 1;
        chapters.push(Chapter {
            title: title.to_string(),
            word_count: body.split_whitespace().count(),
            body,
            number,
        });
    }

    let mut chapters = Vec::new();
    let mut title = book_title.to_string();
    let mut body_lines: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if let Some(heading) = line.strip_prefix("### ") {
            flush(&title, &mut body_lines, &mut chapters);
            title = heading.trim().to_string();
        } else {
            body_lines.push(line);
        }
    }
    flush(&title, &mut body_lines, &mut chapters);

    chapters
}
