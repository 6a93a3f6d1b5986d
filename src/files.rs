//! Source file discovery
//!
//! Turns the paths a user passes on the command line into the list of files to
//! convert: globs are expanded, directories are walked for source files, and
//! duplicates (including hard links) are removed.
//!
//! Before files are rewritten in place they can be backed up with
//! [`archive_files`] and put back with [`recover_files`].

use crate::error::RecoveryError;
use crate::misc::{IS_WINDOWS, UuidGenerator, current_time};
use crate::shared::glob::expand_file_patterns;
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, Header};
use uuid::Uuid;
use walkdir::WalkDir;

/// Extensions accepted when walking directories
pub const DEFAULT_EXTENSIONS: &[&str] = &["py", "pyw"];

/// Decides which files found inside directories are source files
#[derive(Debug, Clone)]
pub struct FileFilter {
    extensions: Vec<String>,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::with_extensions(DEFAULT_EXTENSIONS.iter().copied())
    }
}

impl FileFilter {
    /// Accept files with any of `extensions` (given without the leading dot).
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_string())
            .collect();
        Self { extensions }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Extension check only; the file does not need to exist.
    pub fn is_source_file(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        self.extensions.iter().any(|accepted| {
            if IS_WINDOWS {
                accepted.eq_ignore_ascii_case(ext)
            } else {
                accepted == ext
            }
        })
    }

    /// Resolve user-supplied `patterns` to a deduplicated list of real paths
    ///
    /// Files named directly are kept whatever their extension. Directories
    /// are walked recursively, following symbolic links, and only files
    /// passing [`is_source_file`](Self::is_source_file) under either their
    /// link name or their resolved name are kept. Paths that do not exist
    /// are skipped.
    pub fn detect(&self, patterns: &[String]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut directories = Vec::new();

        for candidate in expand_file_patterns(patterns)? {
            let Ok(real) = candidate.canonicalize() else {
                tracing::debug!("skipping unresolvable path {}", candidate.display());
                continue;
            };
            if real.is_file() {
                files.push(real);
            } else if real.is_dir() {
                directories.push(real);
            }
        }

        let mut visited = HashSet::new();
        for directory in directories {
            self.walk(&directory, &mut visited, &mut files);
        }

        dedupe(files)
    }

    fn walk(&self, root: &Path, visited: &mut HashSet<PathBuf>, files: &mut Vec<PathBuf>) {
        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if !entry.file_type().is_dir() {
                    return true;
                }
                // symlinked directories may lead back into a visited tree
                match entry.path().canonicalize() {
                    Ok(real) => visited.insert(real),
                    Err(_) => false,
                }
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("cannot read directory entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(real) = entry.path().canonicalize() else {
                continue;
            };
            if self.is_source_file(entry.path()) || self.is_source_file(&real) {
                files.push(real);
            }
        }
    }
}

/// [`FileFilter::detect`] with the default source extensions.
pub fn detect_files(patterns: &[String]) -> Result<Vec<PathBuf>> {
    FileFilter::default().detect(patterns)
}

#[cfg(unix)]
type FileKey = (u64, u64);

#[cfg(unix)]
fn file_key(path: &Path) -> Result<FileKey> {
    use std::os::unix::fs::MetadataExt;
    let metadata = fs::metadata(path)?;
    Ok((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
type FileKey = PathBuf;

#[cfg(not(unix))]
fn file_key(path: &Path) -> Result<FileKey> {
    fs::metadata(path)?;
    Ok(path.to_path_buf())
}

/// Keeps the position of the first occurrence of each file and the path of
/// the last one.
fn dedupe(files: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut positions: HashMap<FileKey, usize> = HashMap::new();
    let mut unique: Vec<PathBuf> = Vec::new();
    for file in files {
        let key = file_key(&file)?;
        match positions.get(&key) {
            Some(&at) => unique[at] = file,
            None => {
                positions.insert(key, unique.len());
                unique.push(file);
            }
        }
    }
    Ok(unique)
}

/// Name of the member mapping archive names back to original paths.
pub const LOOKUP_TABLE: &str = "_lookup_table.json";

/// What [`recover_files_with`] removes once the files are restored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cleanup {
    #[default]
    Keep,
    /// Delete the archive file.
    RemoveArchive,
    /// The path given is the archive directory, which must hold exactly one
    /// archive file; the whole directory is deleted.
    RemoveArchiveDir,
}

/// Back up `files` into a new gzipped tar archive under `archive_dir`
///
/// Members get fresh UUID names; a JSON lookup table member maps them back to
/// the absolute paths they came from. The archive is staged under a temporary
/// name and only appears under its final
/// `archive-<timestamp>-<random>.tar.gz` name once complete.
pub fn archive_files(files: &[PathBuf], archive_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let archive_dir = archive_dir.as_ref();
    let mut names = UuidGenerator::new(true);
    let mut lookup_table = BTreeMap::new();
    for file in files {
        lookup_table.insert(format!("{}.py", names.generate()), std::path::absolute(file)?);
    }

    fs::create_dir_all(archive_dir)
        .with_context(|| format!("cannot create archive directory {}", archive_dir.display()))?;
    let now = current_time();
    let random = Uuid::new_v4().simple().to_string();
    let archive_file = archive_dir.join(format!(
        "archive-{}-{}.tar.gz",
        now.format("%Y%m%d%H%M%S"),
        &random[..16]
    ));

    let staged = tempfile::Builder::new()
        .prefix(".bpc-archive-")
        .tempfile_in(archive_dir)?;
    let mut builder = Builder::new(GzEncoder::new(staged.as_file(), Compression::default()));
    for (arcname, realname) in &lookup_table {
        builder
            .append_path_with_name(realname, arcname)
            .with_context(|| format!("cannot archive {}", realname.display()))?;
    }

    let table = serde_json::to_vec_pretty(&lookup_table)?;
    let mut header = Header::new_gnu();
    header.set_size(table.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(u64::try_from(now.timestamp()).unwrap_or_default());
    builder.append_data(&mut header, LOOKUP_TABLE, table.as_slice())?;
    builder.into_inner()?.finish()?;

    staged.persist(&archive_file)?;
    tracing::debug!("archived {} files into {}", files.len(), archive_file.display());
    Ok(archive_file)
}

/// Restore the files backed up in `archive`, keeping the archive.
pub fn recover_files(archive: impl AsRef<Path>) -> Result<()> {
    recover_files_with(archive, Cleanup::Keep)
}

/// Restore the files backed up in an archive, then apply `cleanup`
///
/// Plain and gzipped tar archives are both accepted. Parent directories of
/// the original paths are recreated as needed.
pub fn recover_files_with(path: impl AsRef<Path>, cleanup: Cleanup) -> Result<()> {
    let path = path.as_ref();
    let archive_file = match cleanup {
        Cleanup::RemoveArchiveDir => single_archive_in(path)?,
        Cleanup::Keep | Cleanup::RemoveArchive => path.to_path_buf(),
    };

    let staging = tempfile::Builder::new()
        .prefix("bpc-archive-extract-")
        .tempdir()?;
    open_archive(&archive_file)?
        .unpack(staging.path())
        .with_context(|| format!("cannot extract {}", archive_file.display()))?;

    let table = fs::read(staging.path().join(LOOKUP_TABLE))
        .with_context(|| format!("{} has no lookup table", archive_file.display()))?;
    let lookup_table: BTreeMap<String, PathBuf> = serde_json::from_slice(&table)?;
    for (arcname, realname) in &lookup_table {
        if Path::new(arcname).file_name() != Some(OsStr::new(arcname)) {
            return Err(RecoveryError::InvalidMember(arcname.clone()).into());
        }
        if let Some(parent) = realname.parent() {
            fs::create_dir_all(parent)?;
        }
        move_file(&staging.path().join(arcname), realname)
            .with_context(|| format!("cannot restore {}", realname.display()))?;
    }
    tracing::debug!("recovered {} files from {}", lookup_table.len(), archive_file.display());

    match cleanup {
        Cleanup::Keep => {}
        Cleanup::RemoveArchive => fs::remove_file(&archive_file)?,
        Cleanup::RemoveArchiveDir => fs::remove_dir_all(path)?,
    }
    Ok(())
}

fn single_archive_in(dir: &Path) -> Result<PathBuf, RecoveryError> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    let entry = match entries.len() {
        0 => return Err(RecoveryError::NoArchive(dir.to_path_buf())),
        1 => entries.remove(0),
        _ => return Err(RecoveryError::MultipleItems(dir.to_path_buf())),
    };
    if !entry.file_type()?.is_file() {
        return Err(RecoveryError::NotAFile {
            item: entry.file_name().to_string_lossy().into_owned(),
            dir: dir.to_path_buf(),
        });
    }
    Ok(entry.path())
}

fn open_archive(path: &Path) -> Result<Archive<Box<dyn Read>>> {
    let mut file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut magic = [0u8; 2];
    let gzipped = file.read_exact(&mut magic).is_ok() && magic == [0x1f, 0x8b];
    file.rewind()?;
    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Archive::new(reader))
}

/// Rename, falling back to copy and delete across file systems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}
