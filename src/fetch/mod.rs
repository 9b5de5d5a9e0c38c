// src/fetch/mod.rs

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{info, instrument};

use crate::error::{Error, Result};

pub mod kaggle;
pub mod zips;

/// Where the raw orders CSV comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DatasetSource {
    /// A CSV file, or a zip archive holding one.
    Local {
        path: PathBuf,
        /// Entry to pick when `path` is an archive.
        #[serde(default)]
        file: Option<String>,
    },
    /// A file of a Kaggle dataset, `owner/slug`.
    Kaggle { dataset: String, file: String },
}

impl std::fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetSource::Local { path, .. } => write!(f, "{}", path.display()),
            DatasetSource::Kaggle { dataset, file } => write!(f, "kaggle:{dataset}/{file}"),
        }
    }
}

/// Raw CSV bytes plus where they were read from.
#[derive(Debug)]
pub struct Dataset {
    pub origin: PathBuf,
    pub csv: Vec<u8>,
}

/// Resolve `source` to CSV bytes, downloading into `cache_dir` when remote.
#[instrument(level = "info", skip(client, cache_dir), fields(source = %source))]
pub async fn fetch_dataset(
    client: &Client,
    source: &DatasetSource,
    cache_dir: &Path,
    refresh: bool,
) -> Result<Dataset> {
    let (path, wanted) = match source {
        DatasetSource::Local { path, file } => (path.clone(), file.clone()),
        DatasetSource::Kaggle { dataset, file } => {
            let base = kaggle::api_base()?;
            let path =
                kaggle::download(client, &base, dataset, file, None, cache_dir, refresh).await?;
            (path, Some(file.clone()))
        }
    };
    read_dataset(&path, wanted.as_deref()).await
}

/// Read a local CSV or zip. A missing file is `NotFound`.
pub async fn read_dataset(path: &Path, wanted: Option<&str>) -> Result<Dataset> {
    let bytes = match fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let csv = if zips::is_zip(&bytes) {
        let wanted = wanted.map(str::to_string).or_else(|| {
            path.file_stem()
                .map(|s| format!("{}.csv", s.to_string_lossy()))
        });
        zips::extract_csv(&bytes, wanted.as_deref())?.1
    } else {
        bytes
    };

    info!(path = %path.display(), bytes = csv.len(), "dataset ready");
    Ok(Dataset {
        origin: path.to_path_buf(),
        csv,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    #[tokio::test]
    async fn reads_plain_csv() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("orders.csv");
        std::fs::write(&path, "order_id,sales\n1,10\n").unwrap();

        let source = DatasetSource::Local {
            path: path.clone(),
            file: None,
        };
        let ds = fetch_dataset(&Client::new(), &source, tmp.path(), false)
            .await
            .unwrap();
        assert_eq!(ds.origin, path);
        assert_eq!(ds.csv, b"order_id,sales\n1,10\n");
    }

    #[tokio::test]
    async fn unpacks_zip_by_stem() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("orders.zip");
        {
            let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
            zip.start_file("other.csv", SimpleFileOptions::default()).unwrap();
            zip.write_all(b"x\n").unwrap();
            zip.start_file("orders.csv", SimpleFileOptions::default()).unwrap();
            zip.write_all(b"order_id\n7\n").unwrap();
            zip.finish().unwrap();
        }
        let ds = read_dataset(&path, None).await.unwrap();
        assert_eq!(ds.csv, b"order_id\n7\n");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let tmp = tempdir().unwrap();
        let err = read_dataset(&tmp.path().join("nope.csv"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
    }
}
