// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use crossbake::recipe::format::SourceSpec;
use crossbake::recipe::kitchen::SourceFetcher;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use zip::write::SimpleFileOptions;

/// Builds tar archives member by member, including malformed members
/// that `tar::Builder` refuses to write through its path API.
pub struct TarFixture {
    builder: Builder<Vec<u8>>,
}

impl TarFixture {
    pub fn new() -> Self {
        Self {
            builder: Builder::new(Vec::new()),
        }
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        let mut header = header(EntryType::Regular, data.len() as u64);
        self.builder.append_data(&mut header, name, data).unwrap();
        self
    }

    pub fn dir(mut self, name: &str) -> Self {
        let mut header = header(EntryType::Directory, 0);
        self.builder
            .append_data(&mut header, name, std::io::empty())
            .unwrap();
        self
    }

    pub fn symlink(mut self, name: &str, target: &str) -> Self {
        let mut header = header(EntryType::Symlink, 0);
        header.set_link_name(target).unwrap();
        self.builder
            .append_data(&mut header, name, std::io::empty())
            .unwrap();
        self
    }

    pub fn hard_link(mut self, name: &str, target: &str) -> Self {
        let mut header = header(EntryType::Link, 0);
        header.set_link_name(target).unwrap();
        self.builder
            .append_data(&mut header, name, std::io::empty())
            .unwrap();
        self
    }

    /// Regular file whose name is written into the header unchecked
    pub fn raw_file(mut self, name: &str, data: &[u8]) -> Self {
        let mut header = header(EntryType::Regular, data.len() as u64);
        let bytes = name.as_bytes();
        header.as_old_mut().name[..bytes.len()].copy_from_slice(bytes);
        header.set_cksum();
        self.builder.append(&header, data).unwrap();
        self
    }

    /// Write the archive, compressed according to the file name
    pub fn write(self, path: &Path) -> PathBuf {
        let bytes = self.builder.into_inner().unwrap();
        let name = path.to_string_lossy();
        let encoded = if name.ends_with(".gz") || name.ends_with(".tgz") {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&bytes).unwrap();
            encoder.finish().unwrap()
        } else if name.ends_with(".bz2") {
            let mut encoder =
                bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(&bytes).unwrap();
            encoder.finish().unwrap()
        } else if name.ends_with(".xz") {
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
            encoder.write_all(&bytes).unwrap();
            encoder.finish().unwrap()
        } else if name.ends_with(".zst") {
            zstd::encode_all(Cursor::new(bytes), 0).unwrap()
        } else {
            bytes
        };
        fs::write(path, encoded).unwrap();
        path.to_path_buf()
    }
}

fn header(kind: EntryType, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(kind);
    header.set_size(size);
    header.set_mode(if kind == EntryType::Directory { 0o755 } else { 0o644 });
    header
}

/// Write a zip file; members with `None` data are directories
pub fn write_zip(path: &Path, members: &[(&str, Option<&[u8]>)]) -> PathBuf {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o644);
    for (name, data) in members {
        match data {
            Some(data) => {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
            None => writer.add_directory(*name, options).unwrap(),
        }
    }
    fs::write(path, writer.finish().unwrap().into_inner()).unwrap();
    path.to_path_buf()
}

/// Count every entry below `dir`
pub fn count_entries(dir: &Path) -> usize {
    walkdir::WalkDir::new(dir).min_depth(1).into_iter().count()
}

/// Serves archives from a local directory instead of the network
pub struct LocalFetcher {
    pub dir: PathBuf,
}

impl SourceFetcher for LocalFetcher {
    fn fetch(&self, source: &SourceSpec, download_dir: &Path) -> crossbake::Result<PathBuf> {
        let name = source.archive_name()?;
        let dest = download_dir.join(&name);
        fs::copy(self.dir.join(&name), &dest)?;
        Ok(dest)
    }
}

/// Activation script for a fake SDK
///
/// It defines a `python` shell function standing in for venv, pip and
/// `setup.py`. `bdist_wheel` writes an empty wheel named after the source
/// directory and prints the `creating ...` line real builds print, plus a
/// `build-env` file with the variables the build saw. Sources whose
/// directory name contains `broken` fail every `setup.py` stage.
pub const FAKE_ENVIRONMENT_SETUP: &str = r#"
export CROSSBAKE_FAKE_SDK=1
python() {
    case "$1" in
        -m)
            case "$2" in
                venv) mkdir -p "$3/bin" && : > "$3/bin/activate" ;;
                pip) shift 2; echo "pip $* (PYTHONPATH=$PYTHONPATH)" ;;
            esac
            ;;
        setup.py)
            stage="$2"
            shift 2
            echo "running $stage"
            case "$PWD" in
                *broken*) echo "error: command 'arm-buildroot-linux-gnueabihf-gcc' failed"; return 1 ;;
            esac
            if [ "$stage" = bdist_wheel ]; then
                dist=""
                for arg in "$@"; do
                    case "$arg" in --dist-dir=*) dist="${arg#--dist-dir=}" ;; esac
                done
                wheel="$dist/${PWD##*/}-cp310-cp310-linux_armv7l.whl"
                : > "$wheel"
                {
                    echo "_PYTHON_HOST_PLATFORM=$_PYTHON_HOST_PLATFORM"
                    echo "_PYTHON_SYSCONFIGDATA_NAME=$_PYTHON_SYSCONFIGDATA_NAME"
                    echo "PYTHONPATH=$PYTHONPATH"
                    echo "CFLAGS=$CFLAGS"
                    echo "ARGS=$*"
                    echo "DEMO_FLAG=$DEMO_FLAG"
                } > "$dist/build-env"
                echo "creating '$wheel' and adding 'build' to it"
            fi
            ;;
    esac
}
"#;

/// Create an SDK directory with the fake activation script
pub fn fake_sdk(dir: &Path) -> PathBuf {
    let sdk = dir.join("sdk");
    fs::create_dir_all(&sdk).unwrap();
    fs::write(sdk.join("environment-setup"), FAKE_ENVIRONMENT_SETUP).unwrap();
    sdk
}

/// Write `packages/<name>/<version>/recipe.toml` for a url source
pub fn write_url_recipe(packages: &Path, name: &str, version: &str, extra_build: &str) {
    let dir = packages.join(name).join(version);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("recipe.toml"),
        format!(
            r#"[package]
name = "{name}"
version = "{version}"

[source]
type = "url"
url = "https://example.invalid/{name}-{version}.tar.gz"

[build]
{extra_build}
"#
        ),
    )
    .unwrap();
}

/// Write a minimal sdist `<dir>/<name>-<version>.tar.gz`
pub fn write_sdist(dir: &Path, name: &str, version: &str) -> PathBuf {
    let top = format!("{name}-{version}");
    TarFixture::new()
        .dir(&format!("{top}/"))
        .file(&format!("{top}/setup.py"), b"from setuptools import setup\nsetup()\n")
        .file(&format!("{top}/{name}/__init__.py"), b"")
        .write(&dir.join(format!("{top}.tar.gz")))
}
