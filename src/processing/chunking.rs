//! Sentence-window chunking of source documents.
//!
//! Documents are read line by line. Lines that are too short or use too few distinct
//! characters (separators, table rules, stray markup) are dropped. Surviving lines are split
//! into sentences, and every `sentences_per_embedding` consecutive sentences of one document
//! are joined with single spaces into a [`Chunk`]. The sentence counter restarts for each
//! document, so a chunk never mixes text from two files.

use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

use super::types::{Chunk, CorpusError};

/// Lines shorter than this many characters are skipped.
pub const MIN_LINE_LENGTH: usize = 5;
/// Lines with fewer distinct characters than this are skipped.
pub const MIN_DIFF_CHARACTERS_IN_LINE: usize = 5;

const DOCUMENT_EXTENSION: &str = "md";

static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[.!?…]+["'”’)\]]*\s+"#).expect("sentence boundary pattern is valid")
});

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "e.g", "i.e", "fig", "no", "inc",
    "ltd", "co", "approx", "dept", "est",
];

/// A document loaded from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// File name used to tag every chunk cut from this document.
    pub name: String,
    /// Full text.
    pub text: String,
}

impl SourceDocument {
    /// Build a document, naming it after the final component of `path`.
    pub fn new(path: &Path, text: String) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, text }
    }
}

/// Load every markdown file directly inside `dir`, ordered by file name.
pub fn load_documents(dir: &Path) -> Result<Vec<SourceDocument>, CorpusError> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let is_document = entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|extension| extension == DOCUMENT_EXTENSION);
        if is_document {
            paths.push(entry.into_path());
        }
    }

    let documents = paths
        .into_iter()
        .map(|path| {
            let text = std::fs::read_to_string(&path).map_err(|source| CorpusError::Io {
                path: path.display().to_string(),
                source,
            })?;
            Ok(SourceDocument::new(&path, text))
        })
        .collect::<Result<Vec<_>, CorpusError>>()?;

    tracing::debug!(dir = %dir.display(), documents = documents.len(), "Loaded source documents");
    Ok(documents)
}

/// Whether a stripped line carries enough signal to be embedded.
pub fn is_informative(line: &str) -> bool {
    if line.chars().count() < MIN_LINE_LENGTH {
        return false;
    }
    let distinct: HashSet<char> = line.chars().collect();
    distinct.len() >= MIN_DIFF_CHARACTERS_IN_LINE
}

/// Split one line into sentences.
///
/// A boundary is terminal punctuation (optionally followed by closing quotes or brackets) and
/// whitespace, where the next sentence opens with an uppercase letter, a digit, or an opening
/// quote. A period after a known abbreviation or a single-letter initial is not a boundary.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_END.find_iter(text) {
        let rest = &text[boundary.end()..];
        if !opens_sentence(rest) {
            continue;
        }
        let terminator = &text[boundary.start()..boundary.end()];
        if terminator.starts_with('.') && ends_with_abbreviation(&text[start..boundary.start()]) {
            continue;
        }

        let sentence = text[start..boundary.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn opens_sentence(rest: &str) -> bool {
    rest.chars().next().is_some_and(|first| {
        first.is_uppercase() || first.is_numeric() || matches!(first, '"' | '\'' | '“' | '‘' | '(' | '[')
    })
}

fn ends_with_abbreviation(before: &str) -> bool {
    let Some(word) = before.split_whitespace().next_back() else {
        return false;
    };
    let word = word
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    let mut chars = word.chars();
    let single_initial = matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic());
    single_initial || ABBREVIATIONS.contains(&word.as_str())
}

/// Cut documents into chunks of `sentences_per_embedding` sentences.
///
/// A value of zero is treated as one.
pub fn chunk_documents(documents: &[SourceDocument], sentences_per_embedding: usize) -> Vec<Chunk> {
    let window = sentences_per_embedding.max(1);
    let mut chunks: Vec<Chunk> = Vec::new();

    for document in documents {
        let mut sentence_index = 0usize;
        for line in document.text.lines() {
            let line = line.trim();
            if !is_informative(line) {
                continue;
            }
            for sentence in split_sentences(line) {
                if sentence_index % window == 0 {
                    chunks.push(Chunk {
                        text: sentence.to_string(),
                        source_document: document.name.clone(),
                    });
                } else if let Some(current) = chunks.last_mut() {
                    current.text.push(' ');
                    current.text.push_str(sentence);
                }
                sentence_index += 1;
            }
        }
        tracing::trace!(
            document = %document.name,
            sentences = sentence_index,
            "Document chunked"
        );
    }

    chunks
}
