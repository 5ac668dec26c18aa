// src/recipe/kitchen/fetch.rs

//! Source archive fetching

use crate::error::{Error, Result};
use crate::recipe::format::SourceSpec;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout for establishing a connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for a failed download
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 1000;

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Turns a source descriptor into a local archive
pub trait SourceFetcher: Send + Sync {
    /// Place the archive for `source` in `download_dir` and return its path
    ///
    /// The file must be named after [`SourceSpec::archive_name`], since the
    /// unpacker picks the archive format from the name.
    fn fetch(&self, source: &SourceSpec, download_dir: &Path) -> Result<PathBuf>;
}

/// Downloads sources over HTTPS
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("crossbake/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Download `url` to `dest`, returning the sha256 of what was written
    fn download(&self, url: &str, dest: &Path) -> Result<String> {
        let partial = dest.with_extension("part");
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_download(url, &partial) {
                Ok(digest) => {
                    fs::rename(&partial, dest)?;
                    return Ok(digest);
                }
                Err(e) => {
                    let _ = fs::remove_file(&partial);
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to fetch {url} after {attempt} attempts: {e}"
                        )));
                    }
                    warn!("Download attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    fn try_download(&self, url: &str, dest: &Path) -> Result<String> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let mut file = File::create(dest)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        let mut downloaded: u64 = 0;

        loop {
            let bytes_read = response
                .read(&mut buffer)
                .map_err(|e| Error::DownloadError(format!("Failed to read response: {e}")))?;
            if bytes_read == 0 {
                break;
            }
            file.write_all(&buffer[..bytes_read])
                .map_err(|e| Error::IoError(format!("Failed to write data: {e}")))?;
            hasher.update(&buffer[..bytes_read]);
            downloaded += bytes_read as u64;
        }
        file.flush()?;

        debug!("Downloaded {} bytes from {}", downloaded, url);
        Ok(hex::encode(hasher.finalize()))
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch(&self, source: &SourceSpec, download_dir: &Path) -> Result<PathBuf> {
        let url = source.url();
        let dest = download_dir.join(source.archive_name()?);
        // A verified archive from an earlier run is reused
        if let Some(expected) = source.checksum()
            && dest.is_file()
            && verify_checksum(&dest, expected).is_ok()
        {
            info!("Using downloaded {} for {}", dest.display(), source.describe());
            return Ok(dest);
        }
        info!("Fetching {} from {}", source.describe(), url);

        let digest = self.download(&url, &dest)?;
        if let Some(expected) = source.checksum() {
            check_digest(expected, &digest)?;
            debug!("Checksum verified for {}", dest.display());
        }
        Ok(dest)
    }
}

/// Compute the sha256 of a file as lowercase hex
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Verify file checksum
///
/// The expected checksum has the form `sha256:<hex>`.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    check_digest(expected, &actual)
}

fn check_digest(expected: &str, actual_hex: &str) -> Result<()> {
    let (algorithm, expected_hash) = expected
        .split_once(':')
        .ok_or_else(|| Error::ParseError("Invalid checksum format".to_string()))?;
    if algorithm != "sha256" {
        return Err(Error::ParseError(format!(
            "Unsupported checksum algorithm: {} (supported: sha256)",
            algorithm
        )));
    }
    if !expected_hash.eq_ignore_ascii_case(actual_hex) {
        return Err(Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual: format!("sha256:{}", actual_hex),
        });
    }
    Ok(())
}
