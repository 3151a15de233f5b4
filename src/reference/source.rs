//! Where a static bundle comes from.
//!
//! A bundle is either a directory of pre-extracted `.txt` files or a zip
//! archive, the archive living on local disk or behind an `http(s)` URL.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, instrument};

use super::tables::Bundle;
use crate::error::{Error, Result};
use crate::fetch::{HttpClient, fetch_bytes};

#[async_trait]
pub trait BundleSource: Send + Sync {
    /// Reads all five table files. Fails if any of them is missing.
    async fn fetch(&self) -> Result<Bundle>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Picks a source from a configured location string: an `http(s)` URL or a
/// path ending in `.zip` is an archive, anything else a directory.
pub fn source_for_location(
    location: &str,
    client: Arc<dyn HttpClient>,
) -> Box<dyn BundleSource> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Box::new(ArchiveSource::Url {
            url: location.to_string(),
            client,
        })
    } else if location.to_ascii_lowercase().ends_with(".zip") {
        Box::new(ArchiveSource::File(PathBuf::from(location)))
    } else {
        Box::new(DirectorySource::new(location))
    }
}

/// Pre-extracted table files in one directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl BundleSource for DirectorySource {
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn fetch(&self) -> Result<Bundle> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || Bundle::try_from_fn(|name| read_table_file(&dir, name)))
            .await?
    }

    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }
}

fn read_table_file(dir: &Path, name: &'static str) -> Result<Vec<u8>> {
    match std::fs::read(dir.join(name)) {
        Ok(bytes) => {
            debug!(file = name, bytes = bytes.len(), "Read table file");
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::MissingTable { name }),
        Err(e) => Err(e.into()),
    }
}

/// A zip archive holding the table files, at the root or in a subfolder.
pub enum ArchiveSource {
    File(PathBuf),
    Url {
        url: String,
        client: Arc<dyn HttpClient>,
    },
}

#[async_trait]
impl BundleSource for ArchiveSource {
    #[instrument(skip(self), fields(source = %self.describe()))]
    async fn fetch(&self) -> Result<Bundle> {
        let bytes = match self {
            ArchiveSource::File(path) => Bytes::from(tokio::fs::read(path).await?),
            ArchiveSource::Url { url, client } => fetch_bytes(client.as_ref(), url).await?,
        };
        debug!(bytes = bytes.len(), "Bundle archive received");

        tokio::task::spawn_blocking(move || unpack_archive(bytes)).await?
    }

    fn describe(&self) -> String {
        match self {
            ArchiveSource::File(path) => format!("archive {}", path.display()),
            ArchiveSource::Url { url, .. } => format!("archive {url}"),
        }
    }
}

/// Extracts the table files from an in-memory zip.
pub fn unpack_archive(bytes: Bytes) -> Result<Bundle> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let entries: Vec<String> = archive.file_names().map(str::to_string).collect();

    Bundle::try_from_fn(|name| {
        let entry = entries
            .iter()
            .find(|entry| entry.as_str() == name)
            .or_else(|| entries.iter().find(|entry| entry.rsplit('/').next() == Some(name)))
            .ok_or(Error::MissingTable { name })?;

        let mut file = archive.by_name(entry)?;
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        debug!(file = name, entry = %entry, bytes = buf.len(), "Extracted table file");
        Ok(buf)
    })
}
