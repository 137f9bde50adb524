use std::io::{self, BufRead};
use std::path::Path;

use crate::decompression::ArtifactReader;
use crate::error::ExtractError;

/// Line iterator that tolerates invalid UTF-8
///
/// Console dumps routinely contain binary garbage. Bytes that are not valid
/// UTF-8 are replaced instead of aborting the scan, and both `\n` and `\r\n`
/// terminators are stripped.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(256),
        }
    }

    /// Read the next line, `Ok(None)` at end of stream.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let n = self.inner.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}

/// Open an artifact (plain or gzip) as a line stream.
pub fn open_artifact(path: &Path) -> Result<LineReader<ArtifactReader>, ExtractError> {
    let reader = ArtifactReader::open(path).map_err(|source| ExtractError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(LineReader::new(reader))
}

/// Open `path` and hand its line stream to `scan`, attaching the path to any read error.
pub fn scan_artifact<T, F>(path: &Path, scan: F) -> Result<T, ExtractError>
where
    F: FnOnce(&mut LineReader<ArtifactReader>) -> io::Result<T>,
{
    let mut lines = open_artifact(path)?;
    scan(&mut lines).map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })
}
