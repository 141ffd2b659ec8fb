//! Readers for stream archives
//!
//! Both readers are plain iterators over any `Read`, so they work on files
//! and named pipes alike.

use crate::config::CsvOptions;
use crate::csv::CsvTileRecord;
use crate::error::{ArchiveError, ArchiveResult};
use crate::proto::Entry;
use prost::Message;
use std::io::{self, BufRead, Read};

/// Upper bound on one entry, guards against reading garbage lengths.
const MAX_ENTRY_LEN: u64 = 1 << 30;

/// Iterator over the entries of a length-delimited protobuf stream.
///
/// Ends cleanly at EOF on an entry boundary; EOF inside an entry is a
/// decode error.
#[derive(Debug)]
pub struct ProtoStreamReader<R> {
    inner: R,
    done: bool,
}

impl<R: Read> ProtoStreamReader<R> {
    /// Read entries from `inner`. Wrap unbuffered sources in a `BufReader`.
    pub fn new(inner: R) -> Self {
        ProtoStreamReader { inner, done: false }
    }

    /// Read the varint length prefix, `None` at a clean EOF.
    fn read_length(&mut self) -> ArchiveResult<Option<u64>> {
        let mut value = 0u64;
        for i in 0..10 {
            let mut byte = [0u8; 1];
            let n = loop {
                match self.inner.read(&mut byte) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            };
            if n == 0 {
                if i == 0 {
                    return Ok(None);
                }
                return Err(ArchiveError::decode("stream ends inside a length prefix"));
            }
            value |= u64::from(byte[0] & 0x7f) << (7 * i);
            if byte[0] & 0x80 == 0 {
                return Ok(Some(value));
            }
        }
        Err(ArchiveError::decode("length prefix longer than 10 bytes"))
    }

    fn read_entry(&mut self) -> ArchiveResult<Option<Entry>> {
        let Some(len) = self.read_length()? else {
            return Ok(None);
        };
        if len > MAX_ENTRY_LEN {
            return Err(ArchiveError::decode(format!("entry length {} too large", len)));
        }
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                ArchiveError::decode(format!("stream ends inside a {} byte entry", len))
            } else {
                ArchiveError::Io(e)
            }
        })?;
        Ok(Some(Entry::decode(buf.as_slice())?))
    }
}

impl<R: Read> Iterator for ProtoStreamReader<R> {
    type Item = ArchiveResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Iterator over the records of a CSV / TSV stream.
#[derive(Debug)]
pub struct CsvReader<R> {
    inner: R,
    options: CsvOptions,
    done: bool,
}

impl<R: BufRead> CsvReader<R> {
    /// Read records separated by `options.line_separator` from `inner`.
    pub fn new(inner: R, options: CsvOptions) -> Self {
        CsvReader {
            inner,
            options,
            done: false,
        }
    }

    fn read_line(&mut self) -> ArchiveResult<Option<String>> {
        let separator = self.options.line_separator.as_bytes();
        let Some(&last) = separator.last() else {
            return Err(ArchiveError::InvalidOption {
                name: "line_separator",
                value: String::new(),
            });
        };

        let mut line = Vec::new();
        loop {
            let n = self.inner.read_until(last, &mut line)?;
            if n == 0 || line.ends_with(separator) {
                break;
            }
        }
        if line.is_empty() {
            return Ok(None);
        }
        if line.ends_with(separator) {
            line.truncate(line.len() - separator.len());
        }
        String::from_utf8(line)
            .map(Some)
            .map_err(|e| ArchiveError::decode(format!("line is not UTF-8: {}", e)))
    }
}

impl<R: BufRead> Iterator for CsvReader<R> {
    type Item = ArchiveResult<CsvTileRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self
            .read_line()
            .and_then(|line| line.map(|l| CsvTileRecord::parse(&l, &self.options)).transpose());
        match result {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
