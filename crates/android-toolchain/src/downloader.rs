//! Toolchain Downloader
//!
//! Downloads, verifies and extracts the command-line tools archive.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use reqwest::{Client, Url};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::extract::extract_archive;
use crate::sources::SourceDescriptor;

/// Download progress callback: `(downloaded, total)`; total is 0 when unknown
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Retrieves an archive and materializes it, stripped, under `dest`
pub trait ArchiveFetcher {
    fn fetch(
        &self,
        source: &SourceDescriptor,
        dest: &Path,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;
}

/// Download configuration
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Directory for temporary archive files
    pub scratch_dir: PathBuf,
    /// Verify checksums when the source provides one
    pub verify_checksum: bool,
    /// Connection timeout in seconds
    pub timeout_secs: u64,
}

impl DownloadConfig {
    pub fn new(scratch_dir: PathBuf) -> Self {
        Self {
            scratch_dir,
            verify_checksum: true,
            timeout_secs: 300,
        }
    }
}

/// Where an archive comes from once its URL is understood
enum ArchiveLocation {
    Remote(Url),
    Local(PathBuf),
}

impl ArchiveLocation {
    fn parse(url: &str) -> Self {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "file" => parsed
                .to_file_path()
                .map(ArchiveLocation::Local)
                .unwrap_or_else(|_| ArchiveLocation::Local(PathBuf::from(url))),
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                ArchiveLocation::Remote(parsed)
            }
            // Plain paths, including Windows drive letters parsed as schemes
            _ => ArchiveLocation::Local(PathBuf::from(url)),
        }
    }
}

/// Toolchain downloader
pub struct ToolchainDownloader {
    client: Client,
    config: DownloadConfig,
    progress: Option<ProgressCallback>,
}

impl ToolchainDownloader {
    /// Create a new downloader
    pub fn new(config: DownloadConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            progress: None,
        })
    }

    /// Report download progress to `callback`
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Download a file with progress reporting
    pub async fn download_file(&self, url: Url, target: &Path) -> Result<(), FetchError> {
        info!("Downloading {} to {:?}", url, target);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let total_size = response.content_length().unwrap_or(0);
        let mut downloaded: u64 = 0;

        let mut file = tokio::fs::File::create(target).await?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(ref callback) = self.progress {
                callback(downloaded, total_size);
            }
        }

        file.flush().await?;

        debug!("Download complete: {:?} ({} bytes)", target, downloaded);
        Ok(())
    }

    /// SHA-256 of a file as lowercase hex
    pub async fn sha256_file(path: &Path) -> Result<String, FetchError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut file = std::fs::File::open(&path)?;
            let mut hasher = Sha256::new();
            std::io::copy(&mut file, &mut hasher)?;
            Ok::<_, FetchError>(hex::encode(hasher.finalize()))
        })
        .await
        .map_err(|e| FetchError::Join(e.to_string()))?
    }

    /// Verify file checksum
    pub async fn verify_checksum(path: &Path, expected: &str) -> Result<(), FetchError> {
        debug!("Verifying checksum for {:?}", path);

        let actual = Self::sha256_file(path).await?;
        if actual.eq_ignore_ascii_case(expected.trim()) {
            debug!("Checksum verified");
            Ok(())
        } else {
            warn!("Checksum mismatch: expected {}, got {}", expected, actual);
            Err(FetchError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            })
        }
    }

    async fn fetch_source(&self, source: &SourceDescriptor, dest: &Path) -> Result<(), FetchError> {
        let format = source.archive_format()?;

        // Keeps a downloaded archive alive until extraction is done
        let mut _scratch = None;
        let archive = match ArchiveLocation::parse(&source.url) {
            ArchiveLocation::Local(path) => {
                info!("Using local archive {:?}", path);
                path
            }
            ArchiveLocation::Remote(url) => {
                tokio::fs::create_dir_all(&self.config.scratch_dir).await?;
                let temp = tempfile::Builder::new()
                    .prefix("cmdline-tools-")
                    .tempfile_in(&self.config.scratch_dir)?
                    .into_temp_path();
                self.download_file(url, &temp).await?;
                let path = temp.to_path_buf();
                _scratch = Some(temp);
                path
            }
        };

        match (&source.sha256, self.config.verify_checksum) {
            (Some(expected), true) => Self::verify_checksum(&archive, expected).await?,
            (None, true) => warn!("No checksum known for {}; trusting the download", source.url),
            (_, false) => debug!("Checksum verification disabled"),
        }

        // A fresh run supersedes whatever a previous run extracted
        if tokio::fs::try_exists(dest).await? {
            tokio::fs::remove_dir_all(dest).await?;
        }

        let dest_owned = dest.to_path_buf();
        let strip_root = source.strip_root;
        let written = tokio::task::spawn_blocking(move || {
            extract_archive(&archive, format, &dest_owned, strip_root)
        })
        .await
        .map_err(|e| FetchError::Join(e.to_string()))??;

        info!("Extracted {} entries to {:?}", written, dest);
        Ok(())
    }
}

impl ArchiveFetcher for ToolchainDownloader {
    fn fetch(
        &self,
        source: &SourceDescriptor,
        dest: &Path,
    ) -> impl Future<Output = Result<(), FetchError>> + Send {
        self.fetch_source(source, dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ArchiveFormat;
    use std::io::Write;

    fn write_tools_zip(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        zip.start_file("cmdline-tools/bin/sdkmanager", options).unwrap();
        zip.write_all(b"#!/bin/sh\nexit 0\n").unwrap();
        zip.start_file("cmdline-tools/source.properties", options).unwrap();
        zip.write_all(b"Pkg.Revision=12.0\n").unwrap();
        zip.finish().unwrap();
    }

    fn downloader(dir: &Path) -> ToolchainDownloader {
        ToolchainDownloader::new(DownloadConfig::new(dir.join("downloads"))).unwrap()
    }

    #[test]
    fn test_location_parsing() {
        assert!(matches!(
            ArchiveLocation::parse("https://dl.google.com/a.zip"),
            ArchiveLocation::Remote(_)
        ));
        assert!(matches!(
            ArchiveLocation::parse("/srv/mirror/a.zip"),
            ArchiveLocation::Local(p) if p == Path::new("/srv/mirror/a.zip")
        ));
        assert!(matches!(
            ArchiveLocation::parse("relative/a.zip"),
            ArchiveLocation::Local(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_local_archive_with_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tools.zip");
        write_tools_zip(&archive);
        let checksum = ToolchainDownloader::sha256_file(&archive).await.unwrap();

        let dest = dir.path().join("sdk").join("tools");
        // Left over from an earlier run
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale"), b"old").unwrap();

        let source = SourceDescriptor::new(archive.to_string_lossy()).with_sha256(checksum);
        downloader(dir.path()).fetch(&source, &dest).await.unwrap();

        assert!(dest.join("bin").join("sdkmanager").is_file());
        assert!(dest.join("source.properties").is_file());
        assert!(!dest.join("stale").exists());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_stops_before_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tools.zip");
        write_tools_zip(&archive);

        let dest = dir.path().join("tools");
        let source = SourceDescriptor::new(archive.to_string_lossy()).with_sha256("00".repeat(32));
        let err = downloader(dir.path()).fetch(&source, &dest).await.unwrap_err();

        assert!(matches!(err, FetchError::ChecksumMismatch { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_declared_format_overrides_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tools.bin");
        write_tools_zip(&archive);

        let dest = dir.path().join("tools");
        let undeclared = SourceDescriptor::new(archive.to_string_lossy());
        assert!(matches!(
            downloader(dir.path()).fetch(&undeclared, &dest).await,
            Err(FetchError::UnsupportedFormat(_))
        ));

        let declared = undeclared.with_format(ArchiveFormat::Zip);
        downloader(dir.path()).fetch(&declared, &dest).await.unwrap();
        assert!(dest.join("bin/sdkmanager").is_file());
    }

    #[tokio::test]
    async fn test_missing_local_archive() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceDescriptor::new(dir.path().join("absent.zip").to_string_lossy());
        let err = downloader(dir.path())
            .fetch(&source, &dir.path().join("tools"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Io(_)));
    }
}
