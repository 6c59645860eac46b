//! Generic streaming pipeline: acquire, decompress, tokenize, decode, and
//! hand each record to the caller, all in parallel with bounded memory.
//!
//! ```text
//! acquirer → [tokenizer thread] ──records→ decoder pool ──items→ handler pool
//! ```
//!
//! The byte stream is inherently sequential, so acquisition and tokenizing
//! share one thread; decoding and handling each run on a pool of workers
//! fed through bounded channels, which lets a slow handler throttle the
//! whole pipeline instead of buffering a dump in memory. The first error
//! cancels the shared token; every worker winds down and the collected
//! errors are aggregated, dropping cancellation noise when a real failure
//! is present.

use std::io::BufRead;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Instant;

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::cancel::Cancel;
use crate::config::CANCEL_POLL_INTERVAL;
use crate::decompress::{decompressed_reader, Compression};
use crate::errors::{join_errors, snippet, Error, Result};
use crate::progress::{run_ticker, CountingReader, ProgressFn};
use crate::source::{acquire, CacheConfig, CacheNaming, SharedReader, SourceConfig};
use crate::sql::{parse_statement, row_to_json, SqlStatement};
use crate::tokenize::{FileType, Records};

/// Configuration for the low-level [`process`] entry point.
///
/// Worker counts of `0` use the number of available CPUs. Decoded items
/// reach the handler out of dump order whenever more than one decoding or
/// processing worker runs; set both to `1` for ordered delivery.
#[derive(Default)]
pub struct ProcessConfig {
    pub source: SourceConfig,
    pub file_type: FileType,
    pub compression: Compression,
    pub decompression_workers: usize,
    pub decoding_workers: usize,
    pub processing_workers: usize,
    pub progress: Option<ProgressFn>,
}

/// Configuration for the high-level `process_*_dump` entry points.
///
/// When `url` is empty the latest official dump is used. When `path` is
/// empty but `cache_dir` is set, the download is persisted there under a
/// dated name and reused by later runs.
#[derive(Default)]
pub struct DumpConfig {
    pub url: Option<String>,
    pub path: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub client: Option<Client>,
    pub decompression_workers: usize,
    pub decoding_workers: usize,
    pub processing_workers: usize,
    pub progress: Option<ProgressFn>,
}

impl DumpConfig {
    /// Resolve this high-level configuration against the dump-specific
    /// URL, cache naming, and wire format.
    pub(crate) fn into_process_config(
        self,
        url: String,
        naming: CacheNaming,
        file_type: FileType,
        compression: Compression,
    ) -> ProcessConfig {
        let cache = match (&self.path, self.cache_dir) {
            (None, Some(dir)) => Some(CacheConfig { dir, naming }),
            _ => None,
        };
        ProcessConfig {
            source: SourceConfig {
                url: Some(url),
                path: self.path,
                cache,
                client: self.client,
            },
            file_type,
            compression,
            decompression_workers: self.decompression_workers,
            decoding_workers: self.decoding_workers,
            processing_workers: self.processing_workers,
            progress: self.progress,
        }
    }
}

/// Stream one dump and call `handler` exactly once per record.
///
/// Records are decoded into `T` with strict JSON semantics; for SQL dumps
/// each `INSERT` row becomes one value map keyed by the `CREATE TABLE`
/// column names. The handler runs on `processing_workers` threads and may
/// cancel the shared token to stop early.
pub fn process<T, H>(cancel: &Cancel, config: &ProcessConfig, handler: H) -> Result<()>
where
    T: DeserializeOwned + Send,
    H: Fn(&Cancel, T) -> Result<()> + Sync,
{
    let decompression_workers = resolve_workers(config.decompression_workers);
    let decoding_workers = resolve_workers(config.decoding_workers);
    let processing_workers = resolve_workers(config.processing_workers);

    let cancel = cancel.clone();
    let started = Instant::now();
    let bytes_read = Arc::new(AtomicU64::new(0));
    let total_bytes = Mutex::new(None::<u64>);
    let done = AtomicBool::new(false);
    let handled = AtomicU64::new(0);

    let (rows_tx, rows_rx) = std::sync::mpsc::sync_channel::<Vec<u8>>(decoding_workers);
    let rows_rx = Arc::new(Mutex::new(rows_rx));
    let (items_tx, items_rx) = std::sync::mpsc::sync_channel::<T>(processing_workers);
    let items_rx = Arc::new(Mutex::new(items_rx));
    let (errs_tx, errs_rx) =
        std::sync::mpsc::sync_channel::<Error>(1 + decoding_workers + processing_workers);

    let columns = SharedColumns::new();

    info!(
        file_type = ?config.file_type,
        compression = ?config.compression,
        decoding_workers,
        processing_workers,
        "starting dump pipeline"
    );

    thread::scope(|scope| {
        if let Some(progress) = config.progress.as_deref() {
            let cancel = cancel.clone();
            let bytes_read = Arc::clone(&bytes_read);
            let total_bytes = &total_bytes;
            let done = &done;
            scope.spawn(move || {
                run_ticker(&cancel, done, &bytes_read, total_bytes, started, progress);
            });
        }

        let mut workers = Vec::with_capacity(1 + decoding_workers + processing_workers);

        {
            let cancel = cancel.clone();
            let errs_tx = errs_tx.clone();
            let bytes_read = Arc::clone(&bytes_read);
            let total_bytes = &total_bytes;
            workers.push(scope.spawn(move || {
                let result = run_tokenizer(
                    &cancel,
                    config,
                    decompression_workers,
                    rows_tx,
                    &bytes_read,
                    total_bytes,
                );
                if let Err(e) = result {
                    cancel.cancel();
                    let _ = errs_tx.send(e);
                }
            }));
        }

        for _ in 0..decoding_workers {
            let cancel = cancel.clone();
            let errs_tx = errs_tx.clone();
            let rows_rx = Arc::clone(&rows_rx);
            let items_tx = items_tx.clone();
            let columns = &columns;
            let file_type = config.file_type;
            workers.push(scope.spawn(move || {
                let result = run_decoder::<T>(&cancel, file_type, &rows_rx, &items_tx, columns);
                if let Err(e) = result {
                    cancel.cancel();
                    let _ = errs_tx.send(e);
                }
            }));
        }
        // The workers hold their own clones. Dropping the driver's lets each
        // channel actually disconnect once its pool exits, which is what
        // unblocks an upstream sender after a downstream failure.
        drop(items_tx);
        drop(rows_rx);

        for _ in 0..processing_workers {
            let cancel = cancel.clone();
            let errs_tx = errs_tx.clone();
            let items_rx = Arc::clone(&items_rx);
            let handler = &handler;
            let handled = &handled;
            workers.push(scope.spawn(move || {
                let result = run_handler(&cancel, &items_rx, handler, handled);
                if let Err(e) = result {
                    cancel.cancel();
                    let _ = errs_tx.send(e);
                }
            }));
        }
        drop(items_rx);

        let mut panic_payload = None;
        for worker in workers {
            if let Err(payload) = worker.join() {
                cancel.cancel();
                panic_payload.get_or_insert(payload);
            }
        }
        done.store(true, Ordering::Release);
        if let Some(payload) = panic_payload {
            std::panic::resume_unwind(payload);
        }
    });

    drop(errs_tx);
    let collected: Vec<Error> = errs_rx.try_iter().collect();
    match join_errors(collected) {
        Some(err) => Err(err),
        None => {
            info!(
                records = handled.load(Ordering::Relaxed),
                elapsed_secs = started.elapsed().as_secs_f64(),
                "dump pipeline finished"
            );
            Ok(())
        }
    }
}

fn resolve_workers(configured: usize) -> usize {
    if configured > 0 {
        configured
    } else {
        thread::available_parallelism().map_or(1, |n| n.get())
    }
}

fn run_tokenizer(
    cancel: &Cancel,
    config: &ProcessConfig,
    decompression_workers: usize,
    rows_tx: SyncSender<Vec<u8>>,
    bytes_read: &Arc<AtomicU64>,
    total_bytes: &Mutex<Option<u64>>,
) -> Result<()> {
    let acquired = acquire(cancel, &config.source)?;
    if let Ok(mut total) = total_bytes.lock() {
        *total = acquired.size;
    }

    let counting = CountingReader::new(acquired.reader, Arc::clone(bytes_read));
    let compressed = SharedReader::new(Box::new(counting));
    let decompressed = decompressed_reader(
        config.compression,
        compressed.clone(),
        decompression_workers,
        cancel,
    );

    if config.compression.is_tar() {
        let mut archive = tar::Archive::new(decompressed);
        let entries = archive.entries().map_err(Error::Decompression)?;
        for entry in entries {
            let entry = entry.map_err(Error::Decompression)?;
            debug!(member = ?entry.path().ok(), "tokenizing archive member");
            tokenize_stream(cancel, config.file_type, BufReader::new(entry), &rows_tx)?;
        }
    } else {
        tokenize_stream(cancel, config.file_type, BufReader::new(decompressed), &rows_tx)?;
    }

    // Drain the compressed stream so a tee'd download is written out
    // completely (TAR end-of-archive padding, trailing stream bytes).
    let mut drain = compressed;
    let _ = std::io::copy(&mut drain, &mut std::io::sink());
    if let Some(guard) = &acquired.guard {
        guard.complete();
    }
    Ok(())
}

fn tokenize_stream<R: BufRead>(
    cancel: &Cancel,
    file_type: FileType,
    reader: R,
    rows_tx: &SyncSender<Vec<u8>>,
) -> Result<()> {
    let mut records = Records::new(file_type, reader);
    while let Some(record) = records.next_record()? {
        cancel.check()?;
        if rows_tx.send(record).is_err() {
            // Every decoder exited; whatever stopped them is already in the
            // error channel.
            return Ok(());
        }
    }
    Ok(())
}

fn run_decoder<T: DeserializeOwned>(
    cancel: &Cancel,
    file_type: FileType,
    rows_rx: &Mutex<Receiver<Vec<u8>>>,
    items_tx: &SyncSender<T>,
    columns: &SharedColumns,
) -> Result<()> {
    loop {
        cancel.check()?;
        let row = match rows_rx.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => return Err(Error::Cancelled),
        };
        let Ok(row) = row else {
            return Ok(());
        };
        match file_type {
            FileType::SqlDump => decode_sql_record(cancel, &row, items_tx, columns)?,
            FileType::JsonArray | FileType::Ndjson => {
                let item = decode_json_record::<T>(&row)?;
                if items_tx.send(item).is_err() {
                    return Ok(());
                }
            }
        }
    }
}

fn decode_json_record<T: DeserializeOwned>(row: &[u8]) -> Result<T> {
    serde_json::from_slice(row).map_err(|e| Error::JsonDecode {
        record: snippet(row),
        source: e,
    })
}

fn decode_sql_record<T: DeserializeOwned>(
    cancel: &Cancel,
    row: &[u8],
    items_tx: &SyncSender<T>,
    columns: &SharedColumns,
) -> Result<()> {
    match parse_statement(row)? {
        SqlStatement::Set
        | SqlStatement::DropTable
        | SqlStatement::AlterTable
        | SqlStatement::LockTables
        | SqlStatement::UnlockTables => Ok(()),
        SqlStatement::CreateTable(cols) => {
            debug!(columns = cols.len(), "table columns published");
            columns.publish(cols)
        }
        SqlStatement::Insert(rows) => {
            let cols = columns.wait(cancel)?;
            for tuple in &rows {
                let object = row_to_json(&cols, tuple)?;
                let item: T =
                    serde_json::from_value(Value::Object(object)).map_err(|e| Error::JsonDecode {
                        record: snippet(row),
                        source: e,
                    })?;
                cancel.check()?;
                if items_tx.send(item).is_err() {
                    return Ok(());
                }
            }
            Ok(())
        }
    }
}

fn run_handler<T, H>(
    cancel: &Cancel,
    items_rx: &Mutex<Receiver<T>>,
    handler: &H,
    handled: &AtomicU64,
) -> Result<()>
where
    H: Fn(&Cancel, T) -> Result<()> + Sync,
{
    loop {
        cancel.check()?;
        let item = match items_rx.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => return Err(Error::Cancelled),
        };
        let Ok(item) = item else {
            return Ok(());
        };
        handler(cancel, item)?;
        handled.fetch_add(1, Ordering::Relaxed);
    }
}

/// Write-once cell carrying the `CREATE TABLE` column list from whichever
/// decoder parses it to every decoder handling `INSERT` statements.
struct SharedColumns {
    cell: Mutex<Option<Arc<Vec<String>>>>,
    ready: Condvar,
}

impl SharedColumns {
    fn new() -> Self {
        Self {
            cell: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn publish(&self, columns: Vec<String>) -> Result<()> {
        let mut cell = self
            .cell
            .lock()
            .map_err(|_| Error::InvalidValue("column cell poisoned".to_owned()))?;
        if cell.is_some() {
            return Err(Error::InvalidValue(
                "table columns already published".to_owned(),
            ));
        }
        *cell = Some(Arc::new(columns));
        self.ready.notify_all();
        Ok(())
    }

    /// Block until the columns are published, honoring cancellation.
    fn wait(&self, cancel: &Cancel) -> Result<Arc<Vec<String>>> {
        let mut cell = self
            .cell
            .lock()
            .map_err(|_| Error::InvalidValue("column cell poisoned".to_owned()))?;
        loop {
            if let Some(columns) = cell.as_ref() {
                return Ok(Arc::clone(columns));
            }
            cancel.check()?;
            let (next, _) = self
                .ready
                .wait_timeout(cell, CANCEL_POLL_INTERVAL)
                .map_err(|_| Error::InvalidValue("column cell poisoned".to_owned()))?;
            cell = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn shared_columns_deliver_to_waiters() {
        let columns = SharedColumns::new();
        let cancel = Cancel::new();
        thread::scope(|scope| {
            let waiter = scope.spawn(|| columns.wait(&cancel).unwrap());
            thread::sleep(std::time::Duration::from_millis(20));
            columns.publish(vec!["a".to_owned(), "b".to_owned()]).unwrap();
            assert_eq!(*waiter.join().unwrap(), vec!["a", "b"]);
        });
    }

    #[test]
    fn shared_columns_reject_second_publish() {
        let columns = SharedColumns::new();
        columns.publish(vec!["a".to_owned()]).unwrap();
        assert!(columns.publish(vec!["b".to_owned()]).is_err());
    }

    #[test]
    fn shared_columns_wait_observes_cancellation() {
        let columns = SharedColumns::new();
        let cancel = Cancel::new();
        cancel.cancel();
        assert!(columns.wait(&cancel).unwrap_err().is_cancelled());
    }

    #[test]
    fn resolve_workers_defaults_to_available_parallelism() {
        assert!(resolve_workers(0) >= 1);
        assert_eq!(resolve_workers(3), 3);
    }

    #[test]
    fn decode_json_record_wraps_payload_in_error() {
        let err = decode_json_record::<Value>(b"{broken").unwrap_err();
        match err {
            Error::JsonDecode { record, .. } => assert_eq!(record, "{broken"),
            other => panic!("expected JsonDecode, got {other:?}"),
        }
    }

    #[test]
    fn process_local_ndjson_counts_records() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        for i in 0..25 {
            writeln!(tmp, "{{\"n\":{i}}}").unwrap();
        }
        tmp.flush().unwrap();

        let seen = AtomicUsize::new(0);
        let config = ProcessConfig {
            source: SourceConfig {
                path: Some(tmp.path().to_path_buf()),
                ..SourceConfig::default()
            },
            file_type: FileType::Ndjson,
            compression: Compression::None,
            ..ProcessConfig::default()
        };
        process::<Value, _>(&Cancel::new(), &config, |_, _| {
            seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 25);
    }

    #[test]
    fn handler_error_cancels_and_surfaces() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        for i in 0..100 {
            writeln!(tmp, "{{\"n\":{i}}}").unwrap();
        }
        tmp.flush().unwrap();

        let config = ProcessConfig {
            source: SourceConfig {
                path: Some(tmp.path().to_path_buf()),
                ..SourceConfig::default()
            },
            file_type: FileType::Ndjson,
            compression: Compression::None,
            decoding_workers: 2,
            processing_workers: 2,
            ..ProcessConfig::default()
        };
        let err = process::<Value, _>(&Cancel::new(), &config, |_, _| {
            Err(Error::InvalidValue("refused".to_owned()))
        })
        .unwrap_err();
        match err {
            Error::InvalidValue(msg) => assert_eq!(msg, "refused"),
            Error::Multiple(errs) => assert!(errs
                .iter()
                .any(|e| matches!(e, Error::InvalidValue(m) if m == "refused"))),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cancellation_from_handler_stops_processing() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        for i in 0..10_000 {
            writeln!(tmp, "{{\"n\":{i}}}").unwrap();
        }
        tmp.flush().unwrap();

        let seen = AtomicUsize::new(0);
        let config = ProcessConfig {
            source: SourceConfig {
                path: Some(tmp.path().to_path_buf()),
                ..SourceConfig::default()
            },
            file_type: FileType::Ndjson,
            compression: Compression::None,
            ..ProcessConfig::default()
        };
        let err = process::<Value, _>(&Cancel::new(), &config, |cancel, _| {
            seen.fetch_add(1, Ordering::Relaxed);
            cancel.cancel();
            Ok(())
        })
        .unwrap_err();
        assert!(err.is_cancelled());
        assert!(seen.load(Ordering::Relaxed) >= 1);
    }
}
