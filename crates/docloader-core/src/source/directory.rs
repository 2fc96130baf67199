//! Directory source
//!
//! Uses the `ignore` crate to walk a data folder, one JSON document per file.

use super::{DocumentSource, ReadError, SourceError, SourceItem};
use crate::{Document, SourceLocation};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration for the directory source
#[derive(Debug, Clone)]
pub struct DirectorySourceOptions {
    /// File extensions to load
    pub extensions: Vec<String>,
    /// Maximum walk depth (1 = only files directly in the root)
    pub max_depth: Option<usize>,
    /// Payload field used as the document identifier
    pub id_field: Option<String>,
    /// Skip hidden files and directories
    pub skip_hidden: bool,
}

impl Default for DirectorySourceOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["json".to_string()],
            max_depth: Some(1),
            id_field: None,
            skip_hidden: true,
        }
    }
}

/// Reads every matching file under a root directory, sorted by file name
#[derive(Debug)]
pub struct DirectorySource {
    root: PathBuf,
    options: DirectorySourceOptions,
}

impl DirectorySource {
    pub fn new(root: impl AsRef<Path>, options: DirectorySourceOptions) -> Result<Self, SourceError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(SourceError::NotFound(root.to_path_buf()));
        }
        Ok(Self {
            root: root.to_path_buf(),
            options,
        })
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.options
                    .extensions
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

impl DocumentSource for DirectorySource {
    fn produce(self) -> Box<dyn Iterator<Item = SourceItem> + Send> {
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .standard_filters(false)
            .hidden(self.options.skip_hidden)
            .max_depth(self.options.max_depth)
            .sort_by_file_name(|a, b| a.cmp(b));

        let root = self.root.clone();
        let id_field = self.options.id_field.clone();

        let items = builder.build().filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    return Some(Err(ReadError::Walk {
                        location: walk_location(&root, &e),
                        message: e.to_string(),
                    }));
                }
            };

            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) || !self.matches_extension(path) {
                return None;
            }

            debug!("Reading {:?}", path);
            Some(read_document(path, id_field.as_deref()))
        });

        Box::new(items)
    }
}

/// Location of the entry a walk error is about, falling back to the root
fn walk_location(root: &Path, err: &ignore::Error) -> SourceLocation {
    fn entry_path(err: &ignore::Error) -> Option<&Path> {
        match err {
            ignore::Error::WithPath { path, .. } => Some(path.as_path()),
            ignore::Error::Loop { child, .. } => Some(child.as_path()),
            ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
                entry_path(err)
            }
            _ => None,
        }
    }
    SourceLocation::file(entry_path(err).unwrap_or(root))
}

fn read_document(path: &Path, id_field: Option<&str>) -> SourceItem {
    let location = SourceLocation::file(path);
    match std::fs::read_to_string(path) {
        Ok(raw) => Document::from_json(&raw, location, id_field),
        Err(source) => Err(ReadError::Io { location, source }),
    }
}
