// Dump input: turns an uploaded dump (plain, gzip or zip) into a plain-text file
// that can be read more than once (analysis, then extraction).

use crate::error::{DumpError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zip,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => Compression::Gzip,
            Some(ext) if ext.eq_ignore_ascii_case("zip") => Compression::Zip,
            _ => Compression::None,
        }
    }
}

// "shop.sql.gz" -> "shop.sql", "shop.zip" -> "shop.sql"
fn decompressed_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dump");
    if stem.to_ascii_lowercase().ends_with(".sql") {
        stem.to_string()
    } else {
        format!("{}.sql", stem)
    }
}

fn is_candidate(name: &str) -> bool {
    let base = name.rsplit('/').next().unwrap_or(name);
    !name.ends_with('/') && !base.is_empty() && !base.starts_with('.')
}

// Archive entry holding the dump: the first visible `.sql` file, else the first
// visible file of any kind. Directories and dot-files are never picked.
fn pick_entry(names: &[String]) -> Option<usize> {
    names
        .iter()
        .position(|n| is_candidate(n) && n.to_ascii_lowercase().ends_with(".sql"))
        .or_else(|| names.iter().position(|n| is_candidate(n)))
}

fn copy_zip_entry<R: Read + Seek, W: Write>(reader: R, out: &mut W) -> io::Result<u64> {
    let mut archive = ZipArchive::new(reader)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index(i)?.name().to_string());
    }
    let index = pick_entry(&names).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "no SQL file found in zip archive")
    })?;
    let mut entry = archive.by_index(index)?;
    tracing::debug!("input: using archive entry {}", entry.name());
    io::copy(&mut entry, out)
}

/// Return a path to plain dump text for `path`.
///
/// Uncompressed dumps are used in place. Gzip and zip dumps are streamed into
/// `work_dir`; a partial file is removed if decompression fails.
pub fn prepare_dump(path: &Path, work_dir: &Path) -> Result<PathBuf> {
    let compression = Compression::from_path(path);
    if compression == Compression::None {
        if !path.is_file() {
            return Err(DumpError::input(
                path,
                io::Error::new(io::ErrorKind::NotFound, "not a regular file"),
            ));
        }
        return Ok(path.to_path_buf());
    }

    std::fs::create_dir_all(work_dir).map_err(|e| DumpError::output(work_dir, e))?;
    let target = work_dir.join(decompressed_name(path));
    tracing::info!("Decompressing {} to {}", path.display(), target.display());

    let file = File::open(path).map_err(|e| DumpError::input(path, e))?;
    let out = File::create(&target).map_err(|e| DumpError::output(&target, e))?;
    let mut writer = BufWriter::with_capacity(64 * 1024, out);

    let copied = match compression {
        Compression::Zip => copy_zip_entry(BufReader::new(file), &mut writer),
        _ => io::copy(&mut GzDecoder::new(BufReader::new(file)), &mut writer),
    }
    .and_then(|n| writer.flush().map(|_| n));

    match copied {
        Ok(bytes) => {
            tracing::debug!("input: {} bytes decompressed", bytes);
            Ok(target)
        }
        Err(e) => {
            drop(writer);
            let _ = std::fs::remove_file(&target);
            Err(DumpError::Decompress {
                path: path.to_path_buf(),
                source: e,
            })
        }
    }
}
