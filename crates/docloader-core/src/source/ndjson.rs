//! Newline-delimited JSON source (one document per line)

use super::{DocumentSource, ReadError, SourceError, SourceItem};
use crate::{Document, SourceLocation};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Reads documents line by line from an NDJSON file
#[derive(Debug)]
pub struct NdjsonSource {
    path: PathBuf,
    reader: BufReader<File>,
    id_field: Option<String>,
}

impl NdjsonSource {
    pub fn open(path: impl AsRef<Path>, id_field: Option<String>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            id_field,
        })
    }

    /// Whether a file path looks like NDJSON
    pub fn handles(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("ndjson") | Some("jsonl")
        )
    }
}

impl DocumentSource for NdjsonSource {
    fn produce(self) -> Box<dyn Iterator<Item = SourceItem> + Send> {
        let NdjsonSource {
            path,
            reader,
            id_field,
        } = self;

        let items = reader
            .lines()
            .enumerate()
            .filter_map(move |(index, line)| {
                let location = SourceLocation::line(&path, index + 1);
                match line {
                    Ok(line) if line.trim().is_empty() => None,
                    Ok(line) => Some(Document::from_json(&line, location, id_field.as_deref())),
                    Err(source) => Some(Err(ReadError::Io { location, source })),
                }
            });

        Box::new(items)
    }
}
