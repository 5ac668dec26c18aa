// src/compression/mod.rs
//! Decompression for tar-family source archives
//!
//! Upstream sdists arrive as `.tar.gz`, `.tar.bz2`, `.tar.xz`, `.tar.zst` or
//! plain `.tar`.
//! The format is taken from the file extension, falling back to the magic
//! bytes when the extension says nothing.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use thiserror::Error;

/// Compression-related errors
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Failed to create {format} decoder: {source}")]
    DecoderCreation {
        format: &'static str,
        source: io::Error,
    },

    #[error("Failed to open {path}: {source}")]
    Open { path: String, source: io::Error },
}

/// Supported compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// No compression (raw tar)
    None,
    /// Gzip compression (.gz)
    Gzip,
    /// Bzip2 compression (.bz2)
    Bzip2,
    /// XZ/LZMA compression (.xz)
    Xz,
    /// Zstandard compression (.zst)
    Zstd,
}

impl CompressionFormat {
    /// Detect compression format from file extension
    ///
    /// # Examples
    /// ```
    /// use crossbake::compression::CompressionFormat;
    ///
    /// assert_eq!(CompressionFormat::from_extension("pandas-1.5.0.tar.gz"), Some(CompressionFormat::Gzip));
    /// assert_eq!(CompressionFormat::from_extension("data.tar"), Some(CompressionFormat::None));
    /// assert_eq!(CompressionFormat::from_extension("download"), None);
    /// ```
    pub fn from_extension(name: &str) -> Option<Self> {
        if name.ends_with(".gz") || name.ends_with(".tgz") {
            Some(Self::Gzip)
        } else if name.ends_with(".bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
            Some(Self::Bzip2)
        } else if name.ends_with(".xz") || name.ends_with(".txz") {
            Some(Self::Xz)
        } else if name.ends_with(".zst") || name.ends_with(".zstd") {
            Some(Self::Zstd)
        } else if name.ends_with(".tar") {
            Some(Self::None)
        } else {
            None
        }
    }

    /// Detect compression format from magic bytes
    ///
    /// Magic bytes:
    /// - Gzip: `1f 8b`
    /// - Bzip2: `BZh`
    /// - XZ: `fd 37 7a 58 5a 00`
    /// - Zstd: `28 b5 2f fd`
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(b"BZh") {
            Self::Bzip2
        } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Self::Xz
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Detect the format of a file, by name first and by content second
    pub fn detect(path: &Path) -> Result<Self, CompressionError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(format) = Self::from_extension(&name) {
            return Ok(format);
        }

        let mut file = open(path)?;
        let mut magic = [0u8; 6];
        let mut filled = 0;
        while filled < magic.len() {
            match file.read(&mut magic[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(CompressionError::Open {
                        path: path.display().to_string(),
                        source: e,
                    });
                }
            }
        }
        Ok(Self::from_magic_bytes(&magic[..filled]))
    }

    /// Get a human-readable name for this format
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Create a decompressing reader for the given format
///
/// For `CompressionFormat::None`, returns the reader unchanged.
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>, CompressionError> {
    match format {
        CompressionFormat::None => Ok(Box::new(reader)),
        CompressionFormat::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        CompressionFormat::Bzip2 => Ok(Box::new(bzip2::read::BzDecoder::new(reader))),
        CompressionFormat::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        CompressionFormat::Zstd => {
            let decoder = zstd::Decoder::new(reader).map_err(|e| CompressionError::DecoderCreation {
                format: "zstd",
                source: e,
            })?;
            Ok(Box::new(decoder))
        }
    }
}

/// Open a file and wrap it in a decoder for `format`
pub fn open_decoded(
    path: &Path,
    format: CompressionFormat,
) -> Result<Box<dyn Read>, CompressionError> {
    let file = open(path)?;
    create_decoder(BufReader::new(file), format)
}

fn open(path: &Path) -> Result<File, CompressionError> {
    File::open(path).map_err(|e| CompressionError::Open {
        path: path.display().to_string(),
        source: e,
    })
}
