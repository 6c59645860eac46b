//! Record tokenizers: turn the decompressed byte stream into raw records.
//!
//! Three container formats are supported. JSON array dumps (Wikidata and
//! Commons entities) and newline-delimited JSON dumps (Wikipedia Enterprise
//! HTML) share a byte-level JSON value scanner; SQL dumps are split into
//! whole statements on `;\n` boundaries. Tokenizers only frame records —
//! payload validity is checked later by the decoder stage.

use std::io::BufRead;

use crate::errors::{Error, Result};

/// Container format of a dump file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    /// One JSON array of objects (Wikidata/Commons entity dumps).
    #[default]
    JsonArray,
    /// Newline-delimited JSON (Wikipedia Enterprise HTML dumps).
    Ndjson,
    /// MySQL dump of `INSERT` statements following a `CREATE TABLE`.
    SqlDump,
}

/// Lazy sequence of raw record payloads read from a dump stream.
pub(crate) enum Records<R: BufRead> {
    Json(JsonRecords<R>),
    Sql(SqlRecords<R>),
}

impl<R: BufRead> Records<R> {
    pub(crate) fn new(file_type: FileType, reader: R) -> Self {
        match file_type {
            FileType::JsonArray => Records::Json(JsonRecords::new(reader, true)),
            FileType::Ndjson => Records::Json(JsonRecords::new(reader, false)),
            FileType::SqlDump => Records::Sql(SqlRecords { reader }),
        }
    }

    /// Next raw record, or `None` once the stream is exhausted.
    pub(crate) fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        match self {
            Records::Json(records) => records.next_record(),
            Records::Sql(records) => records.next_record(),
        }
    }
}

// --- JSON -----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
    /// Opening bracket not consumed yet.
    Begin,
    /// Inside the array, expecting the next element.
    Element,
    /// Closing bracket consumed and end-of-input verified.
    Finished,
}

pub(crate) struct JsonRecords<R> {
    scanner: Scanner<R>,
    array: bool,
    state: ArrayState,
}

impl<R: BufRead> JsonRecords<R> {
    fn new(reader: R, array: bool) -> Self {
        Self {
            scanner: Scanner {
                reader,
                peeked: None,
            },
            array,
            state: ArrayState::Begin,
        }
    }

    fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        if self.array {
            self.next_array_element()
        } else {
            self.next_top_level_value()
        }
    }

    fn next_top_level_value(&mut self) -> Result<Option<Vec<u8>>> {
        self.scanner.skip_whitespace()?;
        if self.scanner.peek()?.is_none() {
            return Ok(None);
        }
        let mut record = Vec::new();
        self.scanner.read_value(&mut record)?;
        Ok(Some(record))
    }

    fn next_array_element(&mut self) -> Result<Option<Vec<u8>>> {
        if self.state == ArrayState::Begin {
            self.scanner.skip_whitespace()?;
            match self.scanner.bump()? {
                Some(b'[') => {}
                Some(other) => {
                    return Err(Error::Tokenization(format!(
                        "expected '[' at start of dump, found {:?}",
                        char::from(other)
                    )))
                }
                None => {
                    return Err(Error::Tokenization(
                        "expected '[' at start of dump, found end of input".to_owned(),
                    ))
                }
            }
            self.state = ArrayState::Element;
            self.scanner.skip_whitespace()?;
            if self.scanner.peek()? == Some(b']') {
                self.scanner.bump()?;
                self.expect_end_of_input()?;
                self.state = ArrayState::Finished;
                return Ok(None);
            }
        }
        if self.state == ArrayState::Finished {
            return Ok(None);
        }

        self.scanner.skip_whitespace()?;
        let mut record = Vec::new();
        self.scanner.read_value(&mut record)?;
        self.scanner.skip_whitespace()?;
        match self.scanner.bump()? {
            Some(b',') => {}
            Some(b']') => {
                self.expect_end_of_input()?;
                self.state = ArrayState::Finished;
            }
            Some(other) => {
                return Err(Error::Tokenization(format!(
                    "expected ',' or ']' after array element, found {:?}",
                    char::from(other)
                )))
            }
            None => {
                return Err(Error::Tokenization(
                    "unterminated array at end of input".to_owned(),
                ))
            }
        }
        Ok(Some(record))
    }

    fn expect_end_of_input(&mut self) -> Result<()> {
        self.scanner.skip_whitespace()?;
        match self.scanner.peek()? {
            None => Ok(()),
            Some(_) => Err(Error::Tokenization(
                "invalid data after top-level value".to_owned(),
            )),
        }
    }
}

/// Byte-level JSON scanner. Extracts one balanced value at a time without
/// validating its contents; the decoder performs strict validation.
struct Scanner<R> {
    reader: R,
    peeked: Option<u8>,
}

impl<R: BufRead> Scanner<R> {
    fn peek(&mut self) -> Result<Option<u8>> {
        if self.peeked.is_none() {
            self.peeked = self.next_byte()?;
        }
        Ok(self.peeked)
    }

    fn bump(&mut self) -> Result<Option<u8>> {
        if let Some(byte) = self.peeked.take() {
            return Ok(Some(byte));
        }
        self.next_byte()
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Decompression(e)),
            }
        }
    }

    fn skip_whitespace(&mut self) -> Result<()> {
        while let Some(byte) = self.peek()? {
            if !byte.is_ascii_whitespace() {
                break;
            }
            self.bump()?;
        }
        Ok(())
    }

    fn read_value(&mut self, out: &mut Vec<u8>) -> Result<()> {
        match self.peek()? {
            Some(b'{') | Some(b'[') => self.read_composite(out),
            Some(b'"') => self.read_string(out),
            Some(_) => self.read_scalar(out),
            None => Err(unexpected_end()),
        }
    }

    fn read_composite(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let mut depth = 0usize;
        loop {
            let byte = self.bump()?.ok_or_else(unexpected_end)?;
            match byte {
                b'"' => {
                    out.push(byte);
                    self.copy_string_body(out)?;
                    continue;
                }
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        Error::Tokenization("unbalanced bracket in JSON value".to_owned())
                    })?;
                }
                _ => {}
            }
            out.push(byte);
            if depth == 0 {
                return Ok(());
            }
        }
    }

    fn read_string(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let quote = self.bump()?.ok_or_else(unexpected_end)?;
        out.push(quote);
        self.copy_string_body(out)
    }

    /// Copy string bytes after the opening quote up to and including the
    /// closing quote.
    fn copy_string_body(&mut self, out: &mut Vec<u8>) -> Result<()> {
        loop {
            let byte = self.bump()?.ok_or_else(unexpected_end)?;
            out.push(byte);
            match byte {
                b'\\' => {
                    let escaped = self.bump()?.ok_or_else(unexpected_end)?;
                    out.push(escaped);
                }
                b'"' => return Ok(()),
                _ => {}
            }
        }
    }

    /// Numbers, `true`, `false`, `null` — anything up to a delimiter.
    fn read_scalar(&mut self, out: &mut Vec<u8>) -> Result<()> {
        while let Some(byte) = self.peek()? {
            if byte.is_ascii_whitespace() || matches!(byte, b',' | b']' | b'}') {
                break;
            }
            out.push(byte);
            self.bump()?;
        }
        if out.is_empty() {
            return Err(unexpected_end());
        }
        Ok(())
    }
}

fn unexpected_end() -> Error {
    Error::Tokenization("unexpected end of JSON value".to_owned())
}

// --- SQL ------------------------------------------------------------------

/// Line-oriented statement accumulator. Blank lines and `--` comments are
/// skipped; continuation lines are buffered until one ends in `;\n`. A
/// non-terminated trailing statement is flushed at end of input.
pub(crate) struct SqlRecords<R> {
    reader: R,
}

impl<R: BufRead> SqlRecords<R> {
    fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut statement = Vec::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut line)
                .map_err(Error::Decompression)?;
            if n == 0 {
                return Ok((!statement.is_empty()).then_some(statement));
            }
            if line.iter().all(u8::is_ascii_whitespace) || line.starts_with(b"--") {
                continue;
            }
            statement.extend_from_slice(&line);
            if line.ends_with(b";\n") {
                return Ok(Some(statement));
            }
        }
    }
}
