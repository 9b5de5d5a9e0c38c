use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{Error, Result};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// True when `bytes` start with a local-file-header signature.
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// Pull one CSV entry out of an in-memory archive.
///
/// Picks the entry whose file name equals `wanted` (case-insensitive), else the
/// first `.csv` entry in archive order. Returns the entry name and its bytes.
pub fn extract_csv(bytes: &[u8], wanted: Option<&str>) -> Result<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::fetch("zip archive", format!("unreadable archive: {e}")))?;

    let names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| (f.is_file(), f.name().to_string())))
        .filter(|(is_file, _)| *is_file)
        .map(|(_, name)| name)
        .collect();

    let base_name = |name: &str| {
        Path::new(name)
            .file_name()
            .map(|f| f.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    };

    let chosen = wanted
        .and_then(|w| {
            let w = w.to_lowercase();
            names.iter().find(|n| base_name(n) == w)
        })
        .or_else(|| names.iter().find(|n| n.to_lowercase().ends_with(".csv")))
        .cloned()
        .ok_or_else(|| {
            Error::NotFound(match wanted {
                Some(w) => format!("no entry `{w}` or other CSV in archive"),
                None => "no CSV entry in archive".to_string(),
            })
        })?;

    let mut entry = archive
        .by_name(&chosen)
        .map_err(|e| Error::fetch(chosen.clone(), e))?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;
    debug!(entry = %chosen, bytes = buf.len(), "extracted CSV from archive");
    Ok((chosen, buf))
}
