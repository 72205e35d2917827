//! Byte progress for a single transfer.

use std::fmt;
use std::io::{self, Read, Write};

use tracing::debug;

/// Render granularity, in percent
const RENDER_STEP: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => write!(f, "Uploading"),
            Direction::Download => write!(f, "Downloading"),
        }
    }
}

/// Counters for one file's transfer; lives only as long as the call.
#[derive(Debug)]
pub struct TransferSession {
    pub direction: Direction,
    pub expected: u64,
    pub transferred: u64,
    render: bool,
    last_step: Option<u64>,
}

impl TransferSession {
    pub fn new(direction: Direction, expected: u64, render: bool) -> Self {
        Self {
            direction,
            expected,
            transferred: 0,
            render,
            last_step: None,
        }
    }

    pub fn record(&mut self, bytes: usize) {
        self.transferred += bytes as u64;
        if !self.render {
            return;
        }
        let step = self.percent() / RENDER_STEP;
        if self.last_step != Some(step) {
            self.last_step = Some(step);
            eprint!(
                "\r{}: {:>3}% ({}/{} bytes)",
                self.direction,
                self.percent(),
                self.transferred,
                self.expected
            );
        }
    }

    pub fn percent(&self) -> u64 {
        if self.expected == 0 {
            return 100;
        }
        (self.transferred.saturating_mul(100) / self.expected).min(100)
    }

    pub fn finish(&self) {
        if self.render && self.last_step.is_some() {
            eprintln!();
        }
        debug!(
            direction = %self.direction,
            expected = self.expected,
            transferred = self.transferred,
            "transfer finished"
        );
    }
}

/// Writer that mirrors every byte written into a [`TransferSession`]
pub struct ProgressWriter<W> {
    inner: W,
    session: TransferSession,
}

impl<W: Write> ProgressWriter<W> {
    pub fn new(inner: W, session: TransferSession) -> Self {
        Self { inner, session }
    }

    pub fn into_parts(self) -> (W, TransferSession) {
        (self.inner, self.session)
    }
}

impl<W: Write> Write for ProgressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.session.record(n);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader that mirrors every byte read into a [`TransferSession`]
pub struct ProgressReader<R> {
    inner: R,
    session: TransferSession,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, session: TransferSession) -> Self {
        Self { inner, session }
    }

    pub fn into_session(self) -> TransferSession {
        self.session
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.session.record(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_counts_bytes() {
        let session = TransferSession::new(Direction::Download, 10, false);
        let mut writer = ProgressWriter::new(Vec::new(), session);
        writer.write_all(b"hello").unwrap();
        writer.write_all(b"world").unwrap();

        let (buf, session) = writer.into_parts();
        assert_eq!(buf, b"helloworld");
        assert_eq!(session.transferred, 10);
        assert_eq!(session.percent(), 100);
    }

    #[test]
    fn test_reader_counts_bytes() {
        let session = TransferSession::new(Direction::Upload, 8, false);
        let mut reader = ProgressReader::new(&b"abcd"[..], session);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        let session = reader.into_session();
        assert_eq!(session.transferred, 4);
        assert_eq!(session.percent(), 50);
    }

    #[test]
    fn test_percent_of_empty_transfer() {
        let session = TransferSession::new(Direction::Upload, 0, false);
        assert_eq!(session.percent(), 100);
    }

    #[test]
    fn test_percent_clamped_when_oversent() {
        let mut session = TransferSession::new(Direction::Download, 4, false);
        session.record(8);
        assert_eq!(session.percent(), 100);
    }
}
