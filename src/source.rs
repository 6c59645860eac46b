//! Source acquisition: turn a [`SourceConfig`] into a single compressed byte
//! stream, optionally persisting it to disk while it is consumed.
//!
//! A local file that already exists is always preferred over the network.
//! Downloads are torn through a tee so the bytes hit disk and the
//! decompressor at the same time; a guard removes the file again unless the
//! stream was fully consumed and matches the advertised content length.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::blocking::{Client, Response};
use reqwest::header::LAST_MODIFIED;
use tracing::{debug, info, warn};

use crate::cancel::Cancel;
use crate::config::{CANCEL_POLL_INTERVAL, HTTP_MAX_RETRIES, HTTP_RETRY_DELAY};
use crate::errors::{Error, Result};

/// Where a dump comes from and whether it is persisted.
///
/// One of `url` or `path` is required. An existing file at `path` is used
/// as-is; otherwise `url` is fetched and, when `path` (or a cache location)
/// is given, persisted while it streams. `client` is required whenever a
/// download can happen and should carry the caller's `User-Agent`.
#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
    pub url: Option<String>,
    pub path: Option<PathBuf>,
    pub cache: Option<CacheConfig>,
    pub client: Option<Client>,
}

/// Directory-based persistence used by the high-level dump entry points.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub naming: CacheNaming,
}

/// How a cached download is named inside [`CacheConfig::dir`].
#[derive(Debug, Clone)]
pub enum CacheNaming {
    /// Final URL path segment, for URLs that already carry a dated name.
    Basename,
    /// `<prefix>-YYYYMMDD-<suffix>`, dated from the `Last-Modified`
    /// response header. Lookup reuses the newest matching file.
    LastModified { prefix: String, suffix: String },
}

pub(crate) struct Acquired {
    pub reader: SharedReader,
    pub size: Option<u64>,
    pub guard: Option<DownloadGuard>,
}

impl std::fmt::Debug for Acquired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquired")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Resolve the configured source into a byte stream.
pub(crate) fn acquire(cancel: &Cancel, config: &SourceConfig) -> Result<Acquired> {
    if let Some(path) = &config.path {
        if path.exists() {
            return open_local(path);
        }
    } else if let Some(cache) = &config.cache {
        if let Some(path) = find_cached(cache, config.url.as_deref()) {
            info!(path = %path.display(), "using cached dump");
            return open_local(&path);
        }
    }

    let url = config.url.as_deref().ok_or_else(|| {
        Error::InvalidValue("either a url or an existing path is required".to_owned())
    })?;
    let client = config.client.as_ref().ok_or_else(|| {
        Error::InvalidValue("client is a required configuration option".to_owned())
    })?;

    let response = get_with_retry(cancel, client, url)?;
    let size = response.content_length();

    let target = match (&config.path, &config.cache) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(cache)) => Some(cache.dir.join(download_filename(cache, url, &response)?)),
        (None, None) => None,
    };

    let Some(path) = target else {
        debug!(url, "streaming dump without persisting");
        return Ok(Acquired {
            reader: SharedReader::new(Box::new(response)),
            size,
            guard: None,
        });
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::io("create directory", parent, e))?;
        }
    }
    let file = File::create(&path).map_err(|e| Error::io("create", &path, e))?;
    info!(url, path = %path.display(), "downloading dump");
    let written = Arc::new(AtomicU64::new(0));
    let tee = TeeReader {
        inner: response,
        file,
        written: Arc::clone(&written),
    };
    Ok(Acquired {
        reader: SharedReader::new(Box::new(tee)),
        size,
        guard: Some(DownloadGuard {
            path,
            expected: size,
            written,
            completed: AtomicBool::new(false),
        }),
    })
}

fn open_local(path: &Path) -> Result<Acquired> {
    let mut file = File::open(path).map_err(|e| Error::io("open", path, e))?;
    let size = file
        .seek(SeekFrom::End(0))
        .map_err(|e| Error::io("seek", path, e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| Error::io("seek", path, e))?;
    debug!(path = %path.display(), size, "reading local dump");
    Ok(Acquired {
        reader: SharedReader::new(Box::new(file)),
        size: Some(size),
        guard: None,
    })
}

fn find_cached(cache: &CacheConfig, url: Option<&str>) -> Option<PathBuf> {
    match &cache.naming {
        CacheNaming::Basename => {
            let name = basename(url?);
            let candidate = cache.dir.join(name);
            candidate.exists().then_some(candidate)
        }
        CacheNaming::LastModified { prefix, suffix } => {
            let entries = fs::read_dir(&cache.dir).ok()?;
            entries
                .flatten()
                .filter_map(|entry| {
                    let name = entry.file_name().into_string().ok()?;
                    dated_name(&name, prefix, suffix).map(|date| (date.to_owned(), entry.path()))
                })
                .max_by(|a, b| a.0.cmp(&b.0))
                .map(|(_, path)| path)
        }
    }
}

/// Match `<prefix>-YYYYMMDD-<suffix>` and return the date part.
fn dated_name<'a>(name: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    let date = name
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_suffix(suffix)?
        .strip_suffix('-')?;
    (date.len() == 8 && date.bytes().all(|b| b.is_ascii_digit())).then_some(date)
}

fn download_filename(cache: &CacheConfig, url: &str, response: &Response) -> Result<String> {
    match &cache.naming {
        CacheNaming::Basename => Ok(basename(url).to_owned()),
        CacheNaming::LastModified { prefix, suffix } => {
            let header = response
                .headers()
                .get(LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    Error::InvalidValue("missing Last-Modified header in response".to_owned())
                })?;
            let modified = chrono::DateTime::parse_from_rfc2822(header).map_err(|e| {
                Error::InvalidValue(format!("invalid Last-Modified header {header:?}: {e}"))
            })?;
            Ok(format!(
                "{prefix}-{}-{suffix}",
                modified.naive_utc().format("%Y%m%d")
            ))
        }
    }
}

fn basename(url: &str) -> &str {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
}

/// GET with a small bounded retry loop for transient failures.
pub(crate) fn get_with_retry(cancel: &Cancel, client: &Client, url: &str) -> Result<Response> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        cancel.check()?;
        match client.get(url).send().and_then(|r| r.error_for_status()) {
            Ok(response) => return Ok(response),
            Err(e) => {
                let transient = e.is_connect()
                    || e.is_timeout()
                    || e.status().is_some_and(|s| {
                        s.is_server_error() || s == reqwest::StatusCode::TOO_MANY_REQUESTS
                    });
                if transient && attempt < HTTP_MAX_RETRIES {
                    warn!(url, attempt, error = %e, "retrying dump request");
                    sleep_with_cancel(cancel, HTTP_RETRY_DELAY)?;
                    continue;
                }
                return Err(Error::network(url, e));
            }
        }
    }
}

/// HEAD existence probe used by the dump locators.
pub(crate) fn head_ok(cancel: &Cancel, client: &Client, url: &str) -> Result<bool> {
    cancel.check()?;
    match client.head(url).send() {
        Ok(response) => Ok(response.status() == reqwest::StatusCode::OK),
        Err(e) => Err(Error::network(url, e)),
    }
}

fn sleep_with_cancel(cancel: &Cancel, delay: std::time::Duration) -> Result<()> {
    let deadline = std::time::Instant::now() + delay;
    while std::time::Instant::now() < deadline {
        cancel.check()?;
        std::thread::sleep(CANCEL_POLL_INTERVAL);
    }
    Ok(())
}

/// Clonable handle over the compressed stream. The decompressor consumes it
/// while the pipeline keeps a clone to drain leftover bytes (TAR padding)
/// so a tee'd download is written out completely.
#[derive(Clone)]
pub(crate) struct SharedReader {
    inner: Arc<Mutex<Box<dyn Read + Send>>>,
}

impl SharedReader {
    pub(crate) fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(reader)),
        }
    }
}

impl Read for SharedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.inner.lock() {
            Ok(mut reader) => reader.read(buf),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "source reader lock poisoned",
            )),
        }
    }
}

struct TeeReader<R> {
    inner: R,
    file: File,
    written: Arc<AtomicU64>,
}

impl<R: Read> Read for TeeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.file.write_all(&buf[..n])?;
            self.written.fetch_add(n as u64, Ordering::Relaxed);
        }
        Ok(n)
    }
}

/// Deletes a partially persisted download on drop.
pub(crate) struct DownloadGuard {
    path: PathBuf,
    expected: Option<u64>,
    written: Arc<AtomicU64>,
    completed: AtomicBool,
}

impl DownloadGuard {
    /// Mark the download as fully consumed; called after the pipeline has
    /// drained the compressed stream without error.
    pub(crate) fn complete(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }
}

impl Drop for DownloadGuard {
    fn drop(&mut self) {
        let written = self.written.load(Ordering::SeqCst);
        let intact = self.completed.load(Ordering::SeqCst)
            && self.expected.map_or(true, |expected| expected == written);
        if !intact {
            warn!(path = %self.path.display(), written, "removing incomplete download");
            let _ = fs::remove_file(&self.path);
        }
    }
}
