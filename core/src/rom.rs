//! Game image loading: plain `.hex`/`.bin` files or `.arduboy` archives.
//!
//! An `.arduboy` file is a ZIP archive holding one or more binaries and an
//! `info.json` manifest. The binary listed first in the manifest is used;
//! without a manifest the first `.hex` entry wins, then the first `.bin`.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::LoadError;

/// Where the bytes of a [`RomImage`] came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RomSource {
    File,
    Archive { entry: String },
}

/// A game image ready to hand to a core.
#[derive(Clone, Debug)]
pub struct RomImage {
    path: PathBuf,
    name: String,
    data: Vec<u8>,
    source: RomSource,
}

impl RomImage {
    /// Wrap bytes that were not read through [`load_rom`].
    pub fn from_bytes(path: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        let path = path.into();
        Self {
            name: file_stem(&path),
            path,
            data,
            source: RomSource::File,
        }
    }

    /// Path the image was loaded from (the archive for archived images).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name: the manifest title, or the file stem.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn source(&self) -> &RomSource {
        &self.source
    }

    /// File stem of [`path`](Self::path), used for save files.
    pub fn stem(&self) -> String {
        file_stem(&self.path)
    }

    /// A path a core can open directly.
    ///
    /// Plain files are returned as-is. Archived images are written into
    /// `dir` under their entry's file name.
    pub fn materialize(&self, dir: &Path) -> io::Result<PathBuf> {
        match &self.source {
            RomSource::File => Ok(self.path.clone()),
            RomSource::Archive { entry } => {
                let file_name = Path::new(entry)
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_else(|| "game.hex".into());
                fs::create_dir_all(dir)?;
                let out = dir.join(file_name);
                fs::write(&out, &self.data)?;
                Ok(out)
            }
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "game".to_string())
}

/// Load a game image from `path`.
pub fn load_rom(path: &Path) -> Result<RomImage, LoadError> {
    if !path.exists() {
        return Err(LoadError::RomNotFound(path.to_path_buf()));
    }

    if is_archive(path) {
        return load_from_archive(path);
    }

    let data = fs::read(path).map_err(|source| LoadError::RomUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(RomImage::from_bytes(path, data))
}

fn is_archive(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        ext.eq_ignore_ascii_case("arduboy") || ext.eq_ignore_ascii_case("zip")
    })
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    binaries: Vec<ManifestBinary>,
}

#[derive(Debug, Deserialize)]
struct ManifestBinary {
    filename: String,
}

fn has_extension(name: &str, ext: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Entry names match either exactly or as the last path component, since
/// some archives wrap everything in a top-level folder.
fn entry_matches(entry: &str, wanted: &str) -> bool {
    entry == wanted || entry.rsplit('/').next() == Some(wanted)
}

fn load_from_archive(path: &Path) -> Result<RomImage, LoadError> {
    let invalid = |reason: String| LoadError::InvalidArchive {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|source| LoadError::RomUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive =
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| invalid(e.to_string()))?;

    let names: Vec<String> = archive
        .file_names()
        .filter(|n| !n.ends_with('/'))
        .map(str::to_string)
        .collect();

    let manifest = match names.iter().find(|n| entry_matches(n, "info.json")) {
        Some(name) => {
            let mut text = String::new();
            archive
                .by_name(name)
                .map_err(|e| invalid(e.to_string()))?
                .read_to_string(&mut text)
                .map_err(|e| invalid(format!("info.json: {e}")))?;
            serde_json::from_str::<Manifest>(&text)
                .map_err(|e| invalid(format!("info.json: {e}")))?
        }
        None => Manifest::default(),
    };

    let from_manifest = manifest
        .binaries
        .first()
        .and_then(|b| names.iter().find(|n| entry_matches(n, &b.filename)));
    let entry = from_manifest
        .or_else(|| names.iter().find(|n| has_extension(n, "hex")))
        .or_else(|| names.iter().find(|n| has_extension(n, "bin")))
        .cloned()
        .ok_or_else(|| LoadError::NoBinary(path.to_path_buf()))?;

    let mut data = Vec::new();
    archive
        .by_name(&entry)
        .map_err(|e| invalid(e.to_string()))?
        .read_to_end(&mut data)
        .map_err(|e| invalid(format!("{entry}: {e}")))?;

    log::debug!("loaded {entry} ({} bytes) from {}", data.len(), path.display());

    Ok(RomImage {
        name: manifest.title.unwrap_or_else(|| file_stem(path)),
        path: path.to_path_buf(),
        data,
        source: RomSource::Archive { entry },
    })
}
