//! Directory document loader.
//!
//! Turns the staging directory into [`Document`]s. Plain text files are read
//! as lossy UTF-8; PDF and DOCX go through [`crate::extract`]. A file whose
//! extraction fails is skipped with a warning rather than failing the load.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::LoaderConfig;
use crate::connector_archive::is_working_file;
use crate::extract::{extract_text, BinaryFormat};
use crate::models::Document;

/// Produces documents from a directory on disk.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, dir: &Path) -> Result<Vec<Document>>;
}

/// Walks a directory and applies include/exclude globs.
pub struct DirectoryReader {
    include: GlobSet,
    exclude: GlobSet,
    recursive: bool,
}

impl DirectoryReader {
    pub fn new(config: &LoaderConfig) -> Result<Self> {
        let mut excludes = vec!["**/.git/**".to_string()];
        excludes.extend(config.exclude_globs.iter().cloned());

        Ok(Self {
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&excludes)?,
            recursive: config.recursive,
        })
    }
}

impl DocumentLoader for DirectoryReader {
    fn load(&self, dir: &Path) -> Result<Vec<Document>> {
        if !dir.is_dir() {
            bail!("document directory does not exist: {}", dir.display());
        }

        let mut walker = WalkDir::new(dir);
        if !self.recursive {
            walker = walker.max_depth(1);
        }

        let mut documents = Vec::new();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(dir).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if is_working_file(path)
                || self.exclude.is_match(&rel_str)
                || !self.include.is_match(&rel_str)
            {
                continue;
            }

            match read_document(path) {
                Ok(text) => documents.push(Document {
                    title: entry.file_name().to_string_lossy().to_string(),
                    path: rel_str,
                    text,
                }),
                Err(e) => {
                    tracing::warn!(path = %rel_str, error = %e, "skipping unreadable document");
                }
            }
        }

        if documents.is_empty() {
            bail!("no documents found in {}", dir.display());
        }

        documents.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::info!(count = documents.len(), dir = %dir.display(), "loaded documents");
        Ok(documents)
    }
}

fn read_document(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(BinaryFormat::from_extension);

    match format {
        Some(format) => Ok(extract_text(&bytes, format)?),
        None => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
