//! Minimal decoder for PHP's `serialize()` format.
//!
//! MediaWiki stores the `img_metadata` column either as JSON or as a
//! PHP-serialized blob. Only the constructs that occur in those blobs are
//! supported: strings, integers, doubles, booleans, null, arrays, and
//! objects. Arrays with sequential integer keys decode as JSON lists;
//! every other array becomes a string-keyed map. Strings are framed by an
//! explicit byte length, which is why the whole parser works on raw bytes
//! and why invalid UTF-8 is repaired without changing byte offsets.

use serde_json::{Map, Number, Value};

use crate::errors::{Error, Result};
use crate::text::repair_utf8;

/// Decode one PHP-serialized value. Trailing bytes are rejected.
pub(crate) fn from_bytes(input: &[u8]) -> Result<Value> {
    let mut parser = Parser { input, pos: 0 };
    let value = parser.value()?;
    if parser.pos != parser.input.len() {
        return Err(Error::InvalidValue(format!(
            "trailing bytes after PHP value at offset {}",
            parser.pos
        )));
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn value(&mut self) -> Result<Value> {
        match self.bump()? {
            b's' => {
                self.expect(b':')?;
                let len = self.length()?;
                self.expect(b':')?;
                self.expect(b'"')?;
                let bytes = self.take(len)?;
                self.expect(b'"')?;
                self.expect(b';')?;
                Ok(Value::String(repair_utf8(bytes)))
            }
            b'i' => {
                self.expect(b':')?;
                let digits = self.take_until(b';')?;
                let n: i64 = parse_ascii(digits)?;
                self.expect(b';')?;
                Ok(Value::Number(Number::from(n)))
            }
            b'd' => {
                self.expect(b':')?;
                let digits = self.take_until(b';')?;
                let n: f64 = parse_ascii(digits)?;
                self.expect(b';')?;
                Number::from_f64(n)
                    .map(Value::Number)
                    .ok_or_else(|| Error::InvalidValue(format!("non-finite PHP double: {n}")))
            }
            b'b' => {
                self.expect(b':')?;
                let flag = self.bump()?;
                self.expect(b';')?;
                match flag {
                    b'0' => Ok(Value::Bool(false)),
                    b'1' => Ok(Value::Bool(true)),
                    other => Err(Error::InvalidValue(format!(
                        "invalid PHP boolean byte: {other:#04x}"
                    ))),
                }
            }
            b'N' => {
                self.expect(b';')?;
                Ok(Value::Null)
            }
            b'a' => {
                self.expect(b':')?;
                let count = self.length()?;
                self.expect(b':')?;
                let entries = self.entries(count)?;
                if is_list(&entries) {
                    Ok(Value::Array(
                        entries.into_iter().map(|(_, value)| value).collect(),
                    ))
                } else {
                    into_map(entries).map(Value::Object)
                }
            }
            b'O' => {
                // O:LEN:"Class":COUNT:{...} -- the class name is dropped and
                // the properties become a plain string-keyed map.
                self.expect(b':')?;
                let name_len = self.length()?;
                self.expect(b':')?;
                self.expect(b'"')?;
                self.take(name_len)?;
                self.expect(b'"')?;
                self.expect(b':')?;
                let count = self.length()?;
                self.expect(b':')?;
                self.entries(count).and_then(into_map).map(Value::Object)
            }
            other => Err(Error::InvalidValue(format!(
                "unknown PHP type marker: {:?}",
                char::from(other)
            ))),
        }
    }

    /// `{key;value; ...}` pairs in serialization order.
    fn entries(&mut self, count: usize) -> Result<Vec<(Value, Value)>> {
        self.expect(b'{')?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = self.value()?;
            let value = self.value()?;
            entries.push((key, value));
        }
        self.expect(b'}')?;
        Ok(entries)
    }

    fn length(&mut self) -> Result<usize> {
        parse_ascii(self.take_until(b':')?)
    }

    fn bump(&mut self) -> Result<u8> {
        let byte = *self
            .input
            .get(self.pos)
            .ok_or_else(|| Error::InvalidValue("truncated PHP value".to_owned()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect(&mut self, expected: u8) -> Result<()> {
        let got = self.bump()?;
        if got != expected {
            return Err(Error::InvalidValue(format!(
                "malformed PHP value: expected {:?} at offset {}, found {:?}",
                char::from(expected),
                self.pos - 1,
                char::from(got)
            )));
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| Error::InvalidValue("truncated PHP string".to_owned()))?;
        let bytes = &self.input[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn take_until(&mut self, stop: u8) -> Result<&'a [u8]> {
        let start = self.pos;
        while *self
            .input
            .get(self.pos)
            .ok_or_else(|| Error::InvalidValue("truncated PHP value".to_owned()))?
            != stop
        {
            self.pos += 1;
        }
        Ok(&self.input[start..self.pos])
    }
}

/// PHP serialize writes array keys in encounter order, so a list is exactly
/// the non-empty sequential-from-zero integer key case. An empty array is
/// kept as a map, matching how empty `img_metadata` blobs decode upstream.
fn is_list(entries: &[(Value, Value)]) -> bool {
    !entries.is_empty()
        && entries.iter().enumerate().all(|(index, (key, _))| {
            matches!(key, Value::Number(n) if n.as_i64() == Some(index as i64))
        })
}

/// PHP keys are integers or strings; both land as string keys so the result
/// can round-trip through JSON.
fn into_map(entries: Vec<(Value, Value)>) -> Result<Map<String, Value>> {
    let mut map = Map::with_capacity(entries.len());
    for (key, value) in entries {
        let key = match key {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => {
                return Err(Error::InvalidValue(format!(
                    "unsupported PHP map key: {other}"
                )))
            }
        };
        map.insert(key, value);
    }
    Ok(map)
}

fn parse_ascii<T: std::str::FromStr>(bytes: &[u8]) -> Result<T> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            Error::InvalidValue(format!(
                "invalid PHP number: {}",
                String::from_utf8_lossy(bytes)
            ))
        })
}
