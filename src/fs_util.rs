use std::fs;
use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::error::FetchError;

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<usize, FetchError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| FetchError::Archive(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| FetchError::Archive(err.to_string()))?;

    let mut extracted = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| FetchError::Archive(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(FetchError::Archive(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| FetchError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| FetchError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| FetchError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| FetchError::Archive(err.to_string()))?;
        extracted += 1;
    }
    Ok(extracted)
}

/// Reads every entry to the end so CRC mismatches surface before the file is kept.
pub fn validate_zip(zip_path: &Path) -> Result<(), FetchError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| FetchError::Archive(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| FetchError::Archive(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| FetchError::Archive(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink()).map_err(|err| FetchError::Archive(err.to_string()))?;
    }
    Ok(())
}

pub fn gunzip_file(source: &Path, destination: &Path) -> Result<u64, FetchError> {
    let input = fs::File::open(source)
        .map_err(|err| FetchError::Archive(format!("open gzip {}: {err}", source.display())))?;
    let mut decoder = GzDecoder::new(input);
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|err| FetchError::Filesystem(err.to_string()))?;
    }
    let mut output =
        fs::File::create(destination).map_err(|err| FetchError::Filesystem(err.to_string()))?;
    io::copy(&mut decoder, &mut output).map_err(|err| FetchError::Archive(err.to_string()))
}
