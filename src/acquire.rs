//! Acquisition adapters: find archive links on the publication page, download archives into
//! the archive cache, and unpack their tables into the table cache.

use crate::error::StageError;
use crate::store::{ensure, ArtifactStore, DirStore, Ensured};
use crate::util::{open_with_backoff, remove_with_backoff};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;
use zip::ZipArchive;

/// Anything that can return the body behind a URL.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP(S) fetcher.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bnfmap/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build HTTP client")?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        Ok(resp.bytes().with_context(|| format!("read body of {url}"))?.to_vec())
    }
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)<a\s[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap())
}

/// `href` targets of `<a>` tags whose path ends in `.zip`, in document order, resolved against
/// the page they were found on.
pub fn discover_zip_links(html: &str, page: &Url) -> Vec<String> {
    href_re()
        .captures_iter(html)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .filter_map(|m| {
            let href = m.as_str().trim().replace("&amp;", "&");
            match page.join(&href) {
                Ok(u) => Some(u),
                Err(e) => {
                    tracing::debug!("ignoring link {href:?}: {e}");
                    None
                }
            }
        })
        .filter(|u| u.path().ends_with(".zip"))
        .map(String::from)
        .collect()
}

/// Cache key for an archive URL: its last path segment, as it appears in the URL.
pub fn archive_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path_segments()?.last()?.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Download `url` into `archives` unless it is already cached there.
pub fn fetch_archive(fetcher: &dyn Fetcher, archives: &DirStore, url: &str) -> Result<Ensured> {
    let name = archive_name(url).ok_or_else(|| StageError::Acquire {
        url: url.to_string(),
        reason: "no file name in the URL path".to_string(),
    })?;
    if !archives.exists(&name) {
        tracing::info!("Downloading {}", url);
    }
    ensure(archives, &name, |tmp| {
        let bytes = fetcher.fetch(url)?;
        std::fs::write(tmp, &bytes).with_context(|| format!("write {}", tmp.display()))
    })
}

/// One table taken from an archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedTable {
    pub path: PathBuf,
    pub cached: bool,
}

/// Unpack every entry of `archive` whose name ends with `extension` into `tables`, flattened
/// to its base name. Entries already present in `tables`, or already promoted into `latest`,
/// are not extracted again; their current location is returned instead.
///
/// An archive that cannot be opened as a zip is removed from the cache so the next run
/// downloads it again.
pub fn extract_tables(archive: &Path, tables: &DirStore, latest: &DirStore, extension: &str) -> Result<Vec<ExtractedTable>> {
    let file = open_with_backoff(archive).with_context(|| format!("open {}", archive.display()))?;
    let mut zip = match ZipArchive::new(file) {
        Ok(z) => z,
        Err(e) => {
            tracing::warn!("{} is not a readable archive, dropping it from the cache", archive.display());
            if let Err(err) = remove_with_backoff(archive) {
                tracing::warn!("could not evict {}: {:#}", archive.display(), err);
            }
            return Err(anyhow!(e).context(format!("open archive {}", archive.display())));
        }
    };

    let mut out = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).with_context(|| format!("read entry {i} of {}", archive.display()))?;
        if !entry.is_file() || !entry.name().ends_with(extension) {
            continue;
        }
        let Some(base) = Path::new(entry.name()).file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };

        if latest.exists(&base) {
            tracing::info!("{base} is the current latest snapshot, skipping extraction.");
            out.push(ExtractedTable { path: latest.path(&base), cached: true });
            continue;
        }
        if !tables.exists(&base) {
            tracing::info!("Extracting {}", entry.name());
        }
        let ensured = ensure(tables, &base, |tmp| {
            let mut w = BufWriter::new(File::create(tmp).with_context(|| format!("create {}", tmp.display()))?);
            io::copy(&mut entry, &mut w).with_context(|| format!("extract {base}"))?;
            w.flush()?;
            Ok(())
        })?;
        out.push(ExtractedTable { cached: ensured.was_cached(), path: ensured.into_path() });
    }
    Ok(out)
}
