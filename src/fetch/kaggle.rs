use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::{
    env,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::{Error, Result};

/// Public Kaggle API root used unless a caller supplies another base.
pub const API_BASE: &str = "https://www.kaggle.com/api/v1/";

/// API token pair, as stored in `kaggle.json`.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// `KAGGLE_USERNAME` + `KAGGLE_KEY`, when both are set and non-empty.
    pub fn from_env() -> Option<Self> {
        let username = env::var("KAGGLE_USERNAME").ok().filter(|v| !v.is_empty())?;
        let key = env::var("KAGGLE_KEY").ok().filter(|v| !v.is_empty())?;
        Some(Self { username, key })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::fetch("kaggle credentials", format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::fetch("kaggle credentials", format!("{}: {e}", path.display())))
    }

    /// `$KAGGLE_CONFIG_DIR/kaggle.json`, else `~/.kaggle/kaggle.json`.
    pub fn default_file() -> Option<PathBuf> {
        if let Ok(dir) = env::var("KAGGLE_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join("kaggle.json"));
        }
        env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".kaggle").join("kaggle.json"))
    }

    /// Environment first, then the credentials file.
    pub fn resolve() -> Result<Self> {
        Self::resolve_from(Self::from_env(), Self::default_file())
    }

    fn resolve_from(env: Option<Self>, file: Option<PathBuf>) -> Result<Self> {
        if let Some(creds) = env {
            return Ok(creds);
        }
        match file {
            Some(path) if path.is_file() => Self::from_file(path),
            _ => Err(Error::fetch(
                "kaggle credentials",
                "set KAGGLE_USERNAME and KAGGLE_KEY or provide ~/.kaggle/kaggle.json",
            )),
        }
    }
}

/// Split `owner/slug`, rejecting anything else.
fn split_dataset(dataset: &str) -> Result<(&str, &str)> {
    match dataset.split_once('/') {
        Some((owner, slug))
            if !owner.is_empty() && !slug.is_empty() && !slug.contains('/') =>
        {
            Ok((owner, slug))
        }
        _ => Err(Error::fetch(
            dataset,
            "dataset identifier must look like `owner/slug`",
        )),
    }
}

/// A dataset file name must be a single plain path component.
fn check_file_name<'a>(dataset: &str, file: &'a str) -> Result<&'a str> {
    let plain = !file.is_empty()
        && file != "."
        && file != ".."
        && !file.contains(['/', '\\']);
    if plain {
        Ok(file)
    } else {
        Err(Error::fetch(
            format!("{dataset}/{file}"),
            "file name must not contain path separators or `..`",
        ))
    }
}

/// Parsed [`API_BASE`].
pub fn api_base() -> Result<Url> {
    Url::parse(API_BASE).map_err(|e| Error::fetch(API_BASE, e))
}

/// Download endpoint for a single file of a dataset, relative to `base`.
pub fn download_url(base: &Url, dataset: &str, file: &str) -> Result<Url> {
    let (owner, slug) = split_dataset(dataset)?;
    let file = check_file_name(dataset, file)?;
    base.join(&format!("datasets/download/{owner}/{slug}/{file}"))
        .map_err(|e| Error::fetch(dataset, e))
}

/// Where a dataset file is cached under `cache_dir`.
pub fn cache_path(cache_dir: &Path, dataset: &str, file: &str) -> Result<PathBuf> {
    let (owner, slug) = split_dataset(dataset)?;
    let file = check_file_name(dataset, file)?;
    Ok(cache_dir.join(owner).join(slug).join(file))
}

/// Download `file` of `dataset` into the cache and return the cached path.
///
/// The body is stored as received; Kaggle zips larger files, which the caller
/// unpacks. An existing cached artifact is reused unless `refresh` is set.
#[instrument(level = "info", skip(client, creds, cache_dir), fields(base = %base))]
pub async fn download(
    client: &Client,
    base: &Url,
    dataset: &str,
    file: &str,
    creds: Option<&Credentials>,
    cache_dir: &Path,
    refresh: bool,
) -> Result<PathBuf> {
    let dest = cache_path(cache_dir, dataset, file)?;
    if !refresh && fs::try_exists(&dest).await.unwrap_or(false) {
        info!(path = %dest.display(), "using cached download");
        return Ok(dest);
    }

    let creds = match creds {
        Some(c) => c.clone(),
        None => Credentials::resolve()?,
    };
    let url = download_url(base, dataset, file)?;
    debug!(%url, user = %creds.username, "requesting dataset file");

    let resp = client
        .get(url.clone())
        .basic_auth(&creds.username, Some(&creds.key))
        .send()
        .await
        .map_err(|e| Error::fetch(url.as_str(), e))?;

    match resp.status() {
        s if s.is_success() => {}
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(Error::fetch(
                url.as_str(),
                format!("credentials rejected ({})", resp.status()),
            ))
        }
        StatusCode::NOT_FOUND => {
            return Err(Error::NotFound(format!("{dataset}/{file}")));
        }
        s => return Err(Error::fetch(url.as_str(), format!("HTTP {s}"))),
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| Error::fetch(url.as_str(), e))?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(&dest, &bytes).await?;
    info!(path = %dest.display(), bytes = bytes.len(), "downloaded");
    Ok(dest)
}
