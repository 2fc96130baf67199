//! Document sources
//!
//! A source yields documents one at a time, isolating per-item read errors
//! so that a single bad record never stops the stream.

pub mod directory;
pub mod ndjson;

pub use directory::{DirectorySource, DirectorySourceOptions};
pub use ndjson::NdjsonSource;

use crate::{Document, SourceLocation};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to read a single document
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Failed to read {location}: {source}")]
    Io {
        location: SourceLocation,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed JSON in {location}: {source}")]
    Malformed {
        location: SourceLocation,
        #[source]
        source: serde_json::Error,
    },
    #[error("Expected a JSON object in {location}")]
    NotAnObject { location: SourceLocation },
    #[error("Failed to walk {location}: {message}")]
    Walk {
        location: SourceLocation,
        message: String,
    },
}

impl ReadError {
    pub fn location(&self) -> &SourceLocation {
        match self {
            ReadError::Io { location, .. }
            | ReadError::Malformed { location, .. }
            | ReadError::NotAnObject { location }
            | ReadError::Walk { location, .. } => location,
        }
    }
}

/// Failure to open a source at all
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One item produced by a source
pub type SourceItem = Result<Document, ReadError>;

/// A finite, single-use sequence of documents.
///
/// `produce` consumes the source; scanning again needs a fresh instance.
pub trait DocumentSource: Send {
    fn produce(self) -> Box<dyn Iterator<Item = SourceItem> + Send>;
}

impl DocumentSource for Vec<SourceItem> {
    fn produce(self) -> Box<dyn Iterator<Item = SourceItem> + Send> {
        Box::new(self.into_iter())
    }
}

/// Source selected from a path on disk
#[derive(Debug)]
pub enum AnySource {
    Directory(DirectorySource),
    Ndjson(NdjsonSource),
}

impl DocumentSource for AnySource {
    fn produce(self) -> Box<dyn Iterator<Item = SourceItem> + Send> {
        match self {
            AnySource::Directory(source) => source.produce(),
            AnySource::Ndjson(source) => source.produce(),
        }
    }
}

/// Open a source for a path: NDJSON for `.ndjson`/`.jsonl` files, a directory
/// walk otherwise.
pub fn open_source(
    path: impl AsRef<Path>,
    options: DirectorySourceOptions,
) -> Result<AnySource, SourceError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(SourceError::NotFound(path.to_path_buf()));
    }

    if path.is_file() && NdjsonSource::handles(path) {
        let source = NdjsonSource::open(path, options.id_field)?;
        return Ok(AnySource::Ndjson(source));
    }

    Ok(AnySource::Directory(DirectorySource::new(path, options)?))
}
