//! Decompression layer between the compressed source and the tokenizer.
//!
//! BZIP2 and GZIP dumps may consist of several concatenated streams, so the
//! multi-stream decoders are used. Decompression is moved onto a dedicated
//! thread feeding a bounded chunk channel, which lets it overlap with
//! tokenizing and decoding; `decompression_workers` sizes the in-flight
//! window of chunks.

use std::io::Read;
use std::sync::mpsc::{Receiver, SyncSender};
use std::thread;

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use tracing::debug;

use crate::cancel::Cancel;
use crate::config::DECOMPRESSION_CHUNK_SIZE;
use crate::source::SharedReader;

/// Compression wrapping of a dump file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Plain, uncompressed bytes.
    #[default]
    None,
    /// Uncompressed TAR archive.
    Tar,
    Bzip2,
    /// BZIP2-compressed TAR archive.
    Bzip2Tar,
    Gzip,
    /// GZIP-compressed TAR archive (Wikipedia Enterprise HTML dumps).
    GzipTar,
}

impl Compression {
    /// Whether the decompressed stream is a TAR archive whose members each
    /// hold records.
    pub(crate) fn is_tar(self) -> bool {
        matches!(
            self,
            Compression::Tar | Compression::Bzip2Tar | Compression::GzipTar
        )
    }
}

/// Build the decompressed byte stream for the configured compression,
/// running the decoder on a background thread.
pub(crate) fn decompressed_reader(
    compression: Compression,
    source: SharedReader,
    workers: usize,
    cancel: &Cancel,
) -> BackgroundReader {
    let decoder: Box<dyn Read + Send> = match compression {
        Compression::None | Compression::Tar => Box::new(source),
        Compression::Bzip2 | Compression::Bzip2Tar => Box::new(MultiBzDecoder::new(source)),
        Compression::Gzip | Compression::GzipTar => Box::new(MultiGzDecoder::new(source)),
    };
    BackgroundReader::spawn(decoder, workers, cancel.clone())
}

enum Chunk {
    Data(Vec<u8>),
    End,
    Failed(std::io::Error),
}

/// Reader fed by a decoder thread through a bounded channel.
pub(crate) struct BackgroundReader {
    chunks: Option<Receiver<Chunk>>,
    current: Vec<u8>,
    offset: usize,
}

impl BackgroundReader {
    fn spawn(decoder: Box<dyn Read + Send>, window: usize, cancel: Cancel) -> Self {
        let (tx, rx) = std::sync::mpsc::sync_channel(window.max(1));
        // Detached on purpose: when the pipeline is cancelled the receiver
        // is dropped and the next send unblocks the thread, which then
        // exits on its own.
        let _ = thread::Builder::new()
            .name("dump-decompress".to_owned())
            .spawn(move || decode_loop(decoder, &tx, &cancel));
        Self {
            chunks: Some(rx),
            current: Vec::new(),
            offset: 0,
        }
    }
}

fn decode_loop(mut decoder: Box<dyn Read + Send>, tx: &SyncSender<Chunk>, cancel: &Cancel) {
    loop {
        if cancel.is_cancelled() {
            debug!("decompression thread observed cancellation");
            return;
        }
        let mut buf = vec![0u8; DECOMPRESSION_CHUNK_SIZE];
        match decoder.read(&mut buf) {
            Ok(0) => {
                let _ = tx.send(Chunk::End);
                return;
            }
            Ok(n) => {
                buf.truncate(n);
                if tx.send(Chunk::Data(buf)).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Chunk::Failed(e));
                return;
            }
        }
    }
}

impl Read for BackgroundReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            if self.offset < self.current.len() {
                let n = buf.len().min(self.current.len() - self.offset);
                buf[..n].copy_from_slice(&self.current[self.offset..self.offset + n]);
                self.offset += n;
                return Ok(n);
            }
            let Some(chunks) = &self.chunks else {
                return Ok(0);
            };
            match chunks.recv() {
                Ok(Chunk::Data(chunk)) => {
                    self.current = chunk;
                    self.offset = 0;
                }
                Ok(Chunk::End) => {
                    self.chunks = None;
                    return Ok(0);
                }
                Ok(Chunk::Failed(e)) => {
                    self.chunks = None;
                    return Err(e);
                }
                // Decoder thread exited without an end marker: it observed
                // cancellation.
                Err(_) => {
                    self.chunks = None;
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "decompression aborted",
                    ));
                }
            }
        }
    }
}
